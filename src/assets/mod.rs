//! Asset ingest and management.
//!
//! Uploaded files are copied into a managed store, recorded in the catalog
//! and, for images and videos, handed to the compression pipeline.

mod service;
mod storage;
mod validator;

pub use service::{AssetDetails, AssetService};
pub use storage::{AssetStorage, StoredFile};
pub use validator::{validate_tag_color, validate_tag_names, validate_upload};
