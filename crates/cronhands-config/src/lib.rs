//! # cronhands config
//!
//! TOML configuration for the cronhands daemon: paths, daemon timings,
//! health probe, logging and the job table.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
