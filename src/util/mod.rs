//! Utility types shared by every layer.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`PamConfig`] - Runtime configuration (`PAM_ENABLED`, `PAM_PROXY_DIR`)

mod error;
mod config;

pub use error::*;
pub use config::{PamConfig, parse_bool};
