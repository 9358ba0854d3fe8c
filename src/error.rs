use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("shutdown drain exceeded {timeout_secs}s with cycles still in flight")]
    ShutdownTimeout { timeout_secs: u64 },
}
