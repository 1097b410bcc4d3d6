//! Validation of published catalogs without rebuilding them.
//!
//! Walks every reference transitively from an index or catalog,
//! re-opens every media asset, recomputes checksums and compares them
//! against what the manifests recorded. Never mutates artifacts; the
//! structured report drives the CLI exit code.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument};

use crate::checksum;
use crate::manifest::{Catalog, Index, Playlist, VideoManifest};
use crate::paths::{self, PathError};
use crate::storage::{Location, Storage, StorageError};

/// Result of checking one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Entity resolved and its content matches its recorded checksum
    Pass,

    /// A referenced artifact is absent
    MissingArtifact,

    /// Content changed since the manifest was built; never
    /// auto-corrected
    ChecksumMismatch { expected: String, actual: String },

    /// A reference could not be resolved or led to an unusable
    /// document
    UnresolvableReference { reason: String },
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::MissingArtifact => write!(f, "missing artifact"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected}, got {actual}")
            }
            Self::UnresolvableReference { reason } => {
                write!(f, "unresolvable reference: {reason}")
            }
        }
    }
}

/// One checked entity.
#[derive(Debug, Clone, Serialize)]
pub struct CheckRecord {
    /// Location or reference that was checked
    pub entity: String,

    /// What the check found
    pub outcome: CheckOutcome,
}

/// Structured validation result for a whole walk.
#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub records: Vec<CheckRecord>,
}

impl ValidationReport {
    /// True when every checked entity passed.
    pub fn passed(&self) -> bool {
        self.records
            .iter()
            .all(|record| record.outcome == CheckOutcome::Pass)
    }

    /// Records that did not pass.
    pub fn failures(&self) -> impl Iterator<Item = &CheckRecord> {
        self.records
            .iter()
            .filter(|record| record.outcome != CheckOutcome::Pass)
    }

    fn record(&mut self, entity: impl Into<String>, outcome: CheckOutcome) {
        self.records.push(CheckRecord {
            entity: entity.into(),
            outcome,
        });
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            match &record.outcome {
                CheckOutcome::Pass => writeln!(f, "PASS {}", record.entity)?,
                outcome => writeln!(f, "FAIL {}: {}", record.entity, outcome)?,
            }
        }
        let failed = self.failures().count();
        write!(
            f,
            "{} checked, {} passed, {} failed",
            self.records.len(),
            self.records.len() - failed,
            failed
        )
    }
}

/// Walks published documents and re-verifies integrity.
pub struct Validator {
    storage: Arc<Storage>,
}

impl Validator {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Validate the document at `location` and everything it
    /// references, transitively. The root document itself must be
    /// readable; everything below it is reported per entity.
    #[instrument(skip(self))]
    pub async fn validate(&self, location: &Location) -> Result<ValidationReport> {
        let bytes = self
            .storage
            .read(location)
            .await
            .with_context(|| format!("cannot read document {location}"))?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).with_context(|| format!("unparseable JSON at {location}"))?;

        let mut report = ValidationReport::default();
        if value.get("catalog_refs").is_some() {
            let index = Index::from_json(&bytes)?;
            self.check_index(&mut report, location, &index).await;
        } else if value.get("playlist_refs").is_some() {
            let catalog = Catalog::from_json(&bytes)?;
            self.check_catalog(&mut report, location, &catalog).await;
        } else if value.get("manifest_refs").is_some() {
            let playlist = Playlist::from_json(&bytes)?;
            self.check_playlist(&mut report, location, &playlist).await;
        } else {
            anyhow::bail!("{location} is neither an index, catalog nor playlist");
        }

        info!(
            checked = report.records.len(),
            failed = report.failures().count(),
            "validation finished"
        );
        Ok(report)
    }

    async fn check_index(&self, report: &mut ValidationReport, location: &Location, index: &Index) {
        for reference in &index.catalog_refs {
            let Some(catalog_location) =
                self.resolve_reference(report, location, reference)
            else {
                continue;
            };
            match self.load::<Catalog>(report, reference, &catalog_location).await {
                Some(catalog) => {
                    report.record(reference.clone(), CheckOutcome::Pass);
                    self.check_catalog(report, &catalog_location, &catalog).await;
                }
                None => continue,
            }
        }
    }

    async fn check_catalog(
        &self,
        report: &mut ValidationReport,
        location: &Location,
        catalog: &Catalog,
    ) {
        for reference in &catalog.playlist_refs {
            let Some(playlist_location) =
                self.resolve_reference(report, location, reference)
            else {
                continue;
            };
            match self.load::<Playlist>(report, reference, &playlist_location).await {
                Some(playlist) => {
                    report.record(reference.clone(), CheckOutcome::Pass);
                    self.check_playlist(report, &playlist_location, &playlist).await;
                }
                None => continue,
            }
        }
    }

    async fn check_playlist(
        &self,
        report: &mut ValidationReport,
        location: &Location,
        playlist: &Playlist,
    ) {
        // The playlist's self-checksum covers its canonical content.
        match playlist.expected_checksum() {
            Ok(recomputed) if recomputed != playlist.checksum_sha256 => {
                report.record(
                    location.to_string(),
                    CheckOutcome::ChecksumMismatch {
                        expected: playlist.checksum_sha256.clone(),
                        actual: recomputed,
                    },
                );
            }
            Ok(_) => {}
            Err(e) => {
                report.record(
                    location.to_string(),
                    CheckOutcome::UnresolvableReference {
                        reason: format!("cannot canonicalize playlist: {e}"),
                    },
                );
            }
        }

        for reference in &playlist.manifest_refs {
            let Some(manifest_location) =
                self.resolve_reference(report, location, reference)
            else {
                continue;
            };
            match self
                .load::<VideoManifest>(report, reference, &manifest_location)
                .await
            {
                Some(manifest) => {
                    report.record(reference.clone(), CheckOutcome::Pass);
                    self.check_manifest(report, &manifest_location, &manifest).await;
                }
                None => continue,
            }
        }
    }

    /// Re-open the referenced media asset and compare its recomputed
    /// checksum against the one recorded at manifest-build time.
    async fn check_manifest(
        &self,
        report: &mut ValidationReport,
        location: &Location,
        manifest: &VideoManifest,
    ) {
        let Some(asset_location) =
            self.resolve_reference(report, location, &manifest.asset_path)
        else {
            return;
        };
        let entity = asset_location.to_string();

        let reader = match self.storage.open(&asset_location).await {
            Ok(reader) => reader,
            Err(StorageError::NotFound(_)) => {
                report.record(entity, CheckOutcome::MissingArtifact);
                return;
            }
            Err(e) => {
                report.record(
                    entity,
                    CheckOutcome::UnresolvableReference {
                        reason: e.to_string(),
                    },
                );
                return;
            }
        };

        match checksum::hash_reader(reader).await {
            Ok(actual) if actual == manifest.checksum_sha256 => {
                report.record(entity, CheckOutcome::Pass);
            }
            Ok(actual) => {
                report.record(
                    entity,
                    CheckOutcome::ChecksumMismatch {
                        expected: manifest.checksum_sha256.clone(),
                        actual,
                    },
                );
            }
            Err(e) => {
                report.record(
                    entity,
                    CheckOutcome::UnresolvableReference {
                        reason: format!("cannot hash asset: {e}"),
                    },
                );
            }
        }
    }

    /// Resolve a stored reference against the referencing document's
    /// directory, recording a failure when it cannot be expressed.
    fn resolve_reference(
        &self,
        report: &mut ValidationReport,
        document: &Location,
        reference: &str,
    ) -> Option<Location> {
        let base = match document.parent() {
            Some(base) => base,
            None => {
                report.record(
                    reference.to_string(),
                    CheckOutcome::UnresolvableReference {
                        reason: format!("{document} has no parent directory"),
                    },
                );
                return None;
            }
        };
        match paths::resolve(&base, reference) {
            Ok(location) => Some(location),
            Err(e @ (PathError::Unrelocatable { .. } | PathError::EscapesRoot { .. })) => {
                report.record(
                    reference.to_string(),
                    CheckOutcome::UnresolvableReference {
                        reason: e.to_string(),
                    },
                );
                None
            }
        }
    }

    /// Read and parse a referenced document, recording missing or
    /// unusable artifacts.
    async fn load<T: serde::de::DeserializeOwned>(
        &self,
        report: &mut ValidationReport,
        reference: &str,
        location: &Location,
    ) -> Option<T> {
        let bytes = match self.storage.read(location).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => {
                report.record(reference.to_string(), CheckOutcome::MissingArtifact);
                return None;
            }
            Err(e) => {
                report.record(
                    reference.to_string(),
                    CheckOutcome::UnresolvableReference {
                        reason: e.to_string(),
                    },
                );
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(document) => Some(document),
            Err(e) => {
                report.record(
                    reference.to_string(),
                    CheckOutcome::UnresolvableReference {
                        reason: format!("unparseable document: {e}"),
                    },
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_passes_only_when_every_record_passes() {
        let mut report = ValidationReport::default();
        report.record("a", CheckOutcome::Pass);
        assert!(report.passed());

        report.record("b", CheckOutcome::MissingArtifact);
        assert!(!report.passed());
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn outcomes_serialize_with_a_kind_tag() {
        let json = serde_json::to_value(CheckOutcome::ChecksumMismatch {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "checksum_mismatch");
        assert_eq!(json["expected"], "aa");
    }
}
