//! # DevMap Common Library
//!
//! Shared code for the DevMap device-mapping services including:
//! - Error and result types
//! - Configuration loading (TOML file + environment overrides)
//! - Database pool initialization helpers

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
