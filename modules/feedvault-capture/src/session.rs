//! Transient per-run state for automated capture. Created when a run
//! starts, discarded when it completes or is cancelled; never persisted.

use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

use crate::page::PostLink;

#[derive(Debug)]
pub struct CaptureSession {
    pub run_id: Uuid,
    /// Source posts already expanded this run, so a re-enumeration never
    /// re-opens them.
    expanded: HashSet<String>,
    /// Remaining automation targets.
    queue: VecDeque<PostLink>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            expanded: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn enqueue(&mut self, targets: impl IntoIterator<Item = PostLink>) {
        self.queue.extend(targets);
    }

    pub fn next_target(&mut self) -> Option<PostLink> {
        self.queue.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Mark a post expanded. Returns false when it already was.
    pub fn mark_expanded(&mut self, source_id: &str) -> bool {
        self.expanded.insert(source_id.to_string())
    }

    pub fn already_expanded(&self, source_id: &str) -> bool {
        self.expanded.contains(source_id)
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expanded_posts_are_not_revisited() {
        let mut session = CaptureSession::new();
        assert!(session.mark_expanded("abc"));
        assert!(!session.mark_expanded("abc"));
        assert!(session.already_expanded("abc"));
        assert!(!session.already_expanded("xyz"));
    }

    #[test]
    fn queue_drains_in_order() {
        let mut session = CaptureSession::new();
        session.enqueue([PostLink::new("/p/a1/", 0.0, 0.0), PostLink::new("/p/b2/", 10.0, 0.0)]);
        assert_eq!(session.remaining(), 2);
        assert_eq!(session.next_target().unwrap().href, "/p/a1/");
        assert_eq!(session.next_target().unwrap().href, "/p/b2/");
        assert!(session.next_target().is_none());
    }
}
