//! mediadex - storage-agnostic catalog builder for media test assets
//!
//! Builds a checksum-verified catalog of media test assets through a
//! four-stage pipeline, then validates published catalogs without
//! rebuilding them.
//!
//! # Architecture
//!
//! Data flows strictly downstream:
//! - media assets -> video manifests -> playlists -> catalog -> index
//! - every stage reads and writes through one storage interface
//!   (local disk, `file://` or `s3://`)
//! - documents reference each other by relative path only, so a whole
//!   catalog tree can be relocated between backends without rewriting
//!
//! # Modules
//!
//! - `adapters`: external collaborators (ffprobe media prober)
//! - `builder`: the four pipeline stages and batch machinery
//! - `checksum`: streaming SHA-256 and canonical document hashing
//! - `paths`: relative-reference algebra between storage locations
//! - `storage`: location classification and backend dispatch
//! - `validate`: transitive integrity verification
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Build manifests, playlists, catalog and index in one go
//! mediadex build --input-folder ~/media_test_vectors
//!
//! # Re-verify a published index
//! mediadex validate ~/media_test_vectors/catalog_index.json
//! ```

pub mod adapters;
pub mod builder;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod manifest;
pub mod paths;
pub mod storage;
pub mod validate;

// Re-export main types at crate root for convenience
pub use builder::{EmptyCatalogError, StageSummary};
pub use config::{S3Settings, Settings};
pub use manifest::{Catalog, Codec, FrameRate, Index, Playlist, VideoManifest};
pub use storage::{Location, Storage, StorageError};
pub use validate::{CheckOutcome, CheckRecord, ValidationReport, Validator};
