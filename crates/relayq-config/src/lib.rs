//! # relayq config
//!
//! TOML configuration for relayq hosts, with `${VAR}` environment
//! substitution and validation.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
