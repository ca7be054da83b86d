//! Assetforge - asset store with background media compression
//!
//! This library crate exposes the core functionality for integration testing.

pub mod assets;
pub mod compression;
pub mod config;
