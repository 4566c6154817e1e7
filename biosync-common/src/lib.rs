//! # BioSync Common Library
//!
//! Shared code for the BioSync services:
//! - Configuration loading and resolution
//! - Error types
//! - Identifier and timestamp utilities

pub mod config;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
