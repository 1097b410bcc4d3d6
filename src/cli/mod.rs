//! Command-line interface for mediadex.
//!
//! Provides one command per pipeline stage, a combined `build` that
//! runs all four in order, and `validate` for re-verifying a published
//! catalog or index. Exit code is 0 only on full success.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::adapters::{FfprobeProber, MediaProber};
use crate::builder::{self, StageSummary};
use crate::config::{self, Overrides, Settings};
use crate::storage::{Location, Storage};
use crate::validate::Validator;

/// mediadex - storage-agnostic catalog builder for media test assets
#[derive(Parser, Debug)]
#[command(name = "mediadex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments shared by every stage.
#[derive(Args, Debug, Clone)]
pub struct StageArgs {
    /// Folder (or s3:// root) containing the media/ subfolder;
    /// manifests and catalogs are written under the same root
    /// [default: ~/media_test_vectors]
    #[arg(long)]
    pub input_folder: Option<String>,

    /// Catalog file name written at the input root
    /// [default: playlist_catalog.json]
    #[arg(long)]
    pub catalog_filename: Option<String>,

    /// Catalog description
    #[arg(long)]
    pub description: Option<String>,

    /// Recorded as the creator of manifests and catalogs
    /// [default: mediadex]
    #[arg(long, env = "MEDIADEX_CREATED_BY")]
    pub created_by: Option<String>,

    /// Only process media/<codec> and derive a codec-specific catalog
    #[arg(long)]
    pub codec: Option<String>,

    /// Worker pool size for per-item stages [default: 8]
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl From<StageArgs> for Overrides {
    fn from(args: StageArgs) -> Self {
        Self {
            input_folder: args.input_folder,
            catalog_filename: args.catalog_filename,
            description: args.description,
            created_by: args.created_by,
            codec: args.codec,
            concurrency: args.concurrency,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a video manifest for every media asset
    Video {
        #[command(flatten)]
        args: StageArgs,
    },

    /// Wrap each video manifest in a playlist
    Playlist {
        #[command(flatten)]
        args: StageArgs,
    },

    /// Aggregate playlists into a catalog
    Catalog {
        #[command(flatten)]
        args: StageArgs,
    },

    /// Aggregate catalogs into an index
    Index {
        #[command(flatten)]
        args: StageArgs,

        /// Explicit catalog locations (discovered under the input
        /// root when omitted)
        #[arg(long = "catalog")]
        catalogs: Vec<String>,
    },

    /// Run video, playlist, catalog and index stages in order
    Build {
        #[command(flatten)]
        args: StageArgs,
    },

    /// Re-verify checksums and referential integrity of a published
    /// catalog or index
    Validate {
        /// Catalog or index location (local path, file:// or s3://)
        location: String,

        #[command(flatten)]
        args: StageArgs,

        /// Emit the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Video { args } => {
                let (settings, storage) = prepare(args)?;
                let prober = prober_for(&settings);
                let summary = builder::video::build(storage, prober, &settings).await?;
                finish(vec![summary])
            }
            Commands::Playlist { args } => {
                let (settings, storage) = prepare(args)?;
                let summary = builder::playlist::build(storage, &settings).await?;
                finish(vec![summary])
            }
            Commands::Catalog { args } => {
                let (settings, storage) = prepare(args)?;
                let summary = builder::catalog::build(storage, &settings).await?;
                finish(vec![summary])
            }
            Commands::Index { args, catalogs } => {
                let (settings, storage) = prepare(args)?;
                let catalogs = parse_locations(&catalogs)?;
                let summary = builder::index::build(storage, &settings, &catalogs).await?;
                finish(vec![summary])
            }
            Commands::Build { args } => {
                let (settings, storage) = prepare(args)?;
                let prober = prober_for(&settings);

                let mut summaries = Vec::new();
                summaries
                    .push(builder::video::build(storage.clone(), prober, &settings).await?);
                summaries.push(builder::playlist::build(storage.clone(), &settings).await?);
                summaries.push(builder::catalog::build(storage.clone(), &settings).await?);
                summaries.push(builder::index::build(storage, &settings, &[]).await?);
                finish(summaries)
            }
            Commands::Validate { location, args, json } => {
                let (_, storage) = prepare(args)?;
                let location = Location::parse(&location)
                    .with_context(|| format!("invalid location: {location}"))?;

                let report = Validator::new(storage).validate(&location).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("{report}");
                }

                if report.passed() {
                    Ok(())
                } else {
                    anyhow::bail!("validation failed: {} failing entries", report.failures().count())
                }
            }
        }
    }
}

/// Resolve settings once and construct the storage router.
fn prepare(args: StageArgs) -> Result<(Settings, Arc<Storage>)> {
    let settings = config::resolve(args.into())?;
    let storage = Arc::new(Storage::new(settings.s3.clone()));
    Ok((settings, storage))
}

fn prober_for(settings: &Settings) -> Arc<dyn MediaProber> {
    Arc::new(FfprobeProber::new(settings.probe_timeout))
}

fn parse_locations(raw: &[String]) -> Result<Vec<Location>> {
    raw.iter()
        .map(|s| Location::parse(s).with_context(|| format!("invalid location: {s}")))
        .collect()
}

/// Print every stage summary, then map any item failure to a non-zero
/// exit.
fn finish(summaries: Vec<StageSummary>) -> Result<()> {
    let mut failed = 0usize;
    for summary in &summaries {
        print!("{summary}");
        failed += summary.failed.len();
    }
    if failed > 0 {
        anyhow::bail!("{failed} item(s) failed");
    }
    Ok(())
}
