pub mod driver;
pub mod export;
pub mod intercept;
pub mod messages;
pub mod page;
pub mod parse;
pub mod persist;
pub mod scan;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
