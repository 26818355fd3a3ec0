//! Configuration module
//!
//! Provides the CLI arguments, runtime settings and their defaults.

mod settings;

pub use settings::*;
