//! elicit binary.
//!
//! Reads `elicit.toml` (or the path specified with `--config`), opens the
//! SQLite evidence store, and either serves the curation API over HTTP or runs
//! one batch step: preparing documents, running the keyword labelling
//! function, recalibrating confidences, or exporting validated values.

mod settings;

use std::{
  fs,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use axum::Router;
use clap::{Parser, Subcommand};
use elicit_core::{
  Curation, Estimator, Policy, Runner, Schema, SourceDocument,
  labelling::KeywordMatch,
};
use elicit_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

#[derive(Parser)]
#[command(author, version, about = "Elicit evidence store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "elicit.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the curation API under `/api`.
  Serve,
  /// Create the declared variable rows for every document in a directory.
  Prepare {
    /// Directory of `.txt` documents; each file stem is a document name.
    documents: PathBuf,
  },
  /// Run the keyword labelling function over a directory of documents.
  Label { documents: PathBuf },
  /// Recompute confidences for every variable under one policy.
  Estimate {
    /// `agreement`, `supervised` or `generative`.
    policy: Policy,
  },
  /// Write validated values as CSV.
  Export {
    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;
  let store = open_store(&settings).await?;

  match cli.command {
    Command::Serve => serve(store, &settings).await,
    Command::Prepare { documents } => {
      let documents = load_documents(&documents)?;
      Runner::new(&store).prepare(&documents).await?;
      Ok(())
    }
    Command::Label { documents } => {
      let path = settings
        .keywords_path
        .as_deref()
        .context("keywords_path is not set")?;
      let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read keywords at {path:?}"))?;
      let function = KeywordMatch::from_toml_str(&source, settings.window)
        .with_context(|| format!("invalid keywords file {path:?}"))?;

      let documents = load_documents(&documents)?;
      let report = Runner::new(&store).run(&function, &documents).await?;
      println!("{}", serde_json::to_string_pretty(&report)?);
      Ok(())
    }
    Command::Estimate { policy } => {
      let summary = Estimator::new(&store, settings.estimator()).run(policy).await?;
      println!("{}", serde_json::to_string_pretty(&summary)?);
      Ok(())
    }
    Command::Export { output } => {
      let csv = Curation::new(&store).export_csv().await?;
      match output {
        Some(path) => fs::write(&path, csv)
          .with_context(|| format!("failed to write {path:?}"))?,
        None => print!("{csv}"),
      }
      Ok(())
    }
  }
}

async fn open_store(settings: &Settings) -> anyhow::Result<SqliteStore> {
  let schema = load_schema(&settings.schema_path)?;

  if let Some(parent) = settings.store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;
  Ok(store.with_schema(schema).with_dedup(settings.dedup))
}

/// A missing schema file means every push is accepted as-is.
fn load_schema(path: &Path) -> anyhow::Result<Schema> {
  if !path.exists() {
    tracing::warn!(?path, "schema file not found; categorical values are unchecked");
    return Ok(Schema::new());
  }
  let source = fs::read_to_string(path)
    .with_context(|| format!("failed to read schema at {path:?}"))?;
  toml::from_str(&source).with_context(|| format!("invalid schema file {path:?}"))
}

/// Every `.txt` file directly inside `dir`, ordered by name.
fn load_documents(dir: &Path) -> anyhow::Result<Vec<SourceDocument>> {
  let mut paths = Vec::new();
  for entry in fs::read_dir(dir).with_context(|| format!("failed to read {dir:?}"))? {
    let path = entry?.path();
    if path.extension().is_some_and(|ext| ext == "txt") {
      paths.push(path);
    }
  }
  paths.sort();

  paths
    .into_iter()
    .map(|path| {
      let name = path
        .file_stem()
        .context("document path has no file name")?
        .to_string_lossy()
        .into_owned();
      let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read document {path:?}"))?;
      Ok(SourceDocument::new(name, text))
    })
    .collect()
}

async fn serve(store: SqliteStore, settings: &Settings) -> anyhow::Result<()> {
  let app = Router::new()
    .nest("/api", elicit_api::api_router(Arc::new(store), settings.estimator()))
    .layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", settings.host, settings.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
