use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by exchange: {0}")]
    RateLimited(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("http error: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for CollectorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return CollectorError::Timeout(e.to_string());
        }
        if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            return CollectorError::RateLimited(e.to_string());
        }
        if e.is_decode() {
            return CollectorError::Malformed(e.to_string());
        }
        CollectorError::Http(e)
    }
}
