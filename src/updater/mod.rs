pub mod coordinator;
pub mod state;

pub use coordinator::{ShutdownOutcome, UpdateCoordinator, UpdaterConfig};
pub use state::UpdateState;

use thiserror::Error;

use crate::collector::errors::CollectorError;
use crate::indicators::IndicatorError;
use crate::storage::repository::StorageError;

/// Failure of one fetch-compute-store cycle. Always contained to the
/// symbol it occurred for; never stops the loop or other symbols.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] CollectorError),

    #[error("indicator input invalid: {0}")]
    Validation(#[from] IndicatorError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
}
