//! vectorkb core library
//!
//! Foundational utilities shared by the knowledge crate and the CLI:
//! - Error taxonomy (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Application configuration

pub mod config;
pub mod error;
pub mod logging;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
