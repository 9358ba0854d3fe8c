pub mod client;
pub mod errors;
pub mod source;
pub mod types;

pub use client::BybitClient;
pub use errors::CollectorError;
pub use source::MarketDataSource;
pub use types::*;
