//! Background media compression.
//!
//! Uploaded images and videos are re-encoded in place by a small pool of
//! workers. The pieces:
//!
//! - [`CompressionService`] enqueues jobs and owns the [`WorkerPool`]
//! - [`JobProcessor`] drives one job `pending -> processing -> completed|failed`
//! - [`Transcoder`] runs the external encoder ([`FfmpegTranscoder`])
//! - [`FileSwapper`] replaces the active file with the compressed output and
//!   keeps the original as a backup
//! - [`recovery`] resolves work interrupted by a crash or restart
//! - [`StoreLock`] keeps a second process off a store that is being worked
//!
//! The asset row and the job row live in the catalog behind the [`Catalog`]
//! trait; [`SqliteCatalog`] is the production implementation.

pub mod catalog;
pub mod command;
pub mod error;
pub mod events;
pub mod job;
pub mod lock;
pub mod processor;
pub mod recovery;
pub mod service;
pub mod swap;
pub mod transcoder;
pub mod worker;

pub use catalog::{Catalog, CompressionUpdate, SqliteCatalog};
pub use error::{CompressionError, Result};
pub use events::JobEvent;
pub use job::{FinishedJob, JobResult, PendingJob, ProcessingJob};
pub use lock::StoreLock;
pub use processor::JobProcessor;
pub use recovery::RecoveryReport;
pub use service::CompressionService;
pub use swap::{FileSwapper, Filesystem, LocalFilesystem, SwapError, SwapPaths};
pub use transcoder::{FfmpegTranscoder, Transcoder};
pub use worker::{QueueHandle, WorkerPool};
