//! Application configuration module
//!
//! Handles environment variables, the launch manifest and application-wide
//! constants.

mod constants;
mod database_url;
mod manifest;
mod settings;

pub use constants::*;
pub use database_url::DatabaseUrl;
pub use manifest::{EndpointSpec, Manifest, TargetSpec};
pub use settings::{Config, Environment, LogFormat};
