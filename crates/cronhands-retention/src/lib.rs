//! # cronhands retention
//!
//! Deletes run logs and scrape artifacts older than a [`RetentionPolicy`]
//! allows, skipping anything still being written.
//!
//! [`RetentionPolicy`]: cronhands_core::RetentionPolicy

mod error;
mod policy;
mod sweeper;

pub use error::SweepError;
pub use policy::{age, is_expired};
pub use sweeper::{RetentionSweeper, SweepReport};
