pub mod config;
pub mod error;
pub mod types;
pub mod urls;

pub use config::Config;
pub use error::FeedVaultError;
pub use types::*;
