//! Core errors.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid job name '{name}': {reason}")]
    InvalidJobName { name: String, reason: String },

    #[error("Run {run_id} is already finalized")]
    AlreadyFinalized { run_id: Uuid },
}
