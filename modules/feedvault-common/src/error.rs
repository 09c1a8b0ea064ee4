use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedVaultError {
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Interception error: {0}")]
    Interception(String),

    #[error("Automation error: {0}")]
    Automation(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
