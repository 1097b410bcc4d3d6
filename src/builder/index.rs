//! Index stage: top-level pointer to one or more catalogs.
//!
//! Catalogs are either passed explicitly or discovered as
//! `*_catalog.json` files directly under the output root; JSON files
//! that do not parse as catalogs are skipped, matching the discovery
//! semantics of the catalog chain.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use glob::Pattern;
use tracing::{info, instrument, warn};

use super::{discover, fold_outcomes, run_bounded, ItemOutcome, StageSummary};
use crate::config::Settings;
use crate::manifest::{Catalog, Index, CATALOG_SUFFIX, FORMAT_VERSION};
use crate::paths;
use crate::storage::{Location, Storage, StorageError};

/// Build the index over the given catalogs, or over every catalog
/// discovered at the output root when `explicit` is empty.
#[instrument(skip_all, fields(index = %settings.index_location()))]
pub async fn build(
    storage: Arc<Storage>,
    settings: &Settings,
    explicit: &[Location],
) -> Result<StageSummary> {
    let root = settings.input_root.clone();

    let candidates = if explicit.is_empty() {
        let pattern =
            Pattern::new(&format!("*{CATALOG_SUFFIX}")).context("invalid catalog pattern")?;
        match discover(&storage, &root, &pattern, true).await {
            Ok(found) => found,
            Err(StorageError::NotFound(_)) => Vec::new(),
            Err(e) => {
                return Err(
                    anyhow::Error::new(e).context(format!("cannot list output root {root}"))
                )
            }
        }
    } else {
        explicit.to_vec()
    };

    let reader = storage.clone();
    let index_root = root.clone();
    let outcomes = run_bounded(candidates, settings.concurrency, move |catalog| {
        let storage = reader.clone();
        let root = index_root.clone();
        async move { verify_one(storage, root, catalog).await }
    })
    .await?;

    let (mut summary, values) = fold_outcomes("index", outcomes);

    let mut catalog_refs: Vec<String> = values.into_iter().map(|(_, reference)| reference).collect();
    catalog_refs.sort();
    catalog_refs.dedup();
    if catalog_refs.is_empty() {
        warn!("index will reference no catalogs");
    }

    let index = Index {
        format_version: FORMAT_VERSION,
        catalog_refs,
        created_at: Utc::now(),
    };
    let location = settings.index_location();
    storage
        .write(&location, &index.to_json_vec()?)
        .await
        .with_context(|| format!("cannot write index {location}"))?;

    info!(index = %location, catalogs = index.catalog_refs.len(), "wrote index");
    summary.succeeded.push(settings.index_filename.clone());
    Ok(summary)
}

/// Check one candidate parses as a catalog and compute its
/// index-relative reference.
async fn verify_one(
    storage: Arc<Storage>,
    root: Location,
    catalog_location: Location,
) -> ItemOutcome<String> {
    let item = match catalog_location.file_name() {
        Some(name) => name.to_string(),
        None => {
            return ItemOutcome::Failed {
                item: catalog_location.to_string(),
                error: "catalog has no file name".to_string(),
            }
        }
    };

    let bytes = match storage.read(&catalog_location).await {
        Ok(bytes) => bytes,
        Err(StorageError::AccessDenied(reason)) => {
            return ItemOutcome::Fatal {
                error: anyhow::anyhow!("access denied: {reason}"),
            }
        }
        Err(e) => {
            return ItemOutcome::Failed {
                item,
                error: e.to_string(),
            }
        }
    };
    if let Err(e) = Catalog::from_json(&bytes) {
        // Not a catalog; other JSON may legitimately share the suffix.
        return ItemOutcome::Skipped {
            item,
            reason: format!("not a catalog document: {e}"),
        };
    }

    match paths::relativize(&root, &catalog_location) {
        Ok(reference) => ItemOutcome::Done {
            item,
            value: reference,
        },
        Err(e) => ItemOutcome::Failed {
            item,
            error: e.to_string(),
        },
    }
}
