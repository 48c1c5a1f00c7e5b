//! Skyhook - high-throughput S3 object transfer engine
//!
//! A high-level transfer layer over a generic object-store client. Large
//! transfers are automatically split into concurrent requests while
//! per-bucket concurrency and total buffered memory stay bounded.
//!
//! # Features
//!
//! - Single-object upload: one `PutObject` below the multipart threshold,
//!   a concurrent multipart upload above it, with abort-on-failure
//! - Single-object download: part-number or byte-range fan-out behind a
//!   triage request, with strictly in-order sink writes
//! - Directory upload: lazy traversal feeding a bounded fan-out of
//!   per-file uploads
//! - Bucket download: progressive listing, temp-file writes, and atomic
//!   per-object finalization
//! - Per-bucket concurrency admission and a global in-memory byte budget
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use skyhook::client::AwsObjectClient;
//! use skyhook::config::TransferConfig;
//! use skyhook::upload::UploadObjectRequest;
//! use skyhook::io::BodySource;
//! use skyhook::TransferManager;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), skyhook::TransferError> {
//!     let client = Arc::new(AwsObjectClient::from_env().await);
//!     let manager = TransferManager::new(client, TransferConfig::default())?;
//!
//!     let body = BodySource::from_path("large-file.bin").await?;
//!     let handle = manager.upload_object(UploadObjectRequest::new(
//!         "my-bucket",
//!         "large-file.bin",
//!         body,
//!     ));
//!     let result = handle.join().await?;
//!     println!("uploaded {} bytes", result.transferred_bytes);
//!     Ok(())
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rustdoc::missing_crate_level_docs,
    unreachable_pub,
    rust_2018_idioms
)]

pub mod admission;
pub mod batch;
pub mod client;
pub mod config;
pub mod download;
pub mod fs;
pub mod io;
pub mod progress;
pub mod upload;

mod error;
mod header;
mod manager;

pub use batch::FailurePolicy;
pub use config::TransferConfig;
pub use error::{ClientError, TransferError, TransferResult};
pub use manager::{OperationHandle, TransferManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
