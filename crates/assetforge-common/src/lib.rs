//! Assetforge-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across assetforge:
//!
//! - **Typed IDs**: Type-safe UUID wrappers for assets, compression jobs and tags
//! - **Core Types**: Enums for file kinds and compression job status
//! - **Path Utilities**: Classification of uploads by extension
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use assetforge_common::{AssetId, FileKind, Error, Result};
//! use assetforge_common::paths::file_kind_for;
//! use std::path::Path;
//!
//! // Create typed IDs
//! let asset_id = AssetId::new();
//!
//! // Classify uploads
//! assert_eq!(file_kind_for(Path::new("photo.PNG")), FileKind::Image);
//!
//! // Use common error types
//! fn example(id: AssetId) -> Result<()> {
//!     Err(Error::not_found("asset", id))
//! }
//! # assert!(example(asset_id).is_err());
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
