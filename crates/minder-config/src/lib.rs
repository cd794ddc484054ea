//! # Minder Config
//!
//! Configuration reader for minder worker daemons.
//!
//! Settings are layered: built-in defaults, then a TOML file, then whatever
//! the caller applies on top (usually CLI flags).

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
