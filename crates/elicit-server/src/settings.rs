//! Runtime configuration, read from `elicit.toml` (or the path given with
//! `--config`) and overridden by `ELICIT_*` environment variables.
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `ELICIT_DEDUP__IGNORE_CASE=true`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use elicit_core::{
  DedupPolicy, EstimatorConfig, EvidenceWindow,
  confidence::{GenerativeConfig, SupervisedConfig},
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub host:          String,
  pub port:          u16,
  pub store_path:    PathBuf,
  pub schema_path:   PathBuf,
  /// Keyword lists for the `keyword` labelling function.
  pub keywords_path: Option<PathBuf>,
  pub dedup:         DedupPolicy,
  pub window:        EvidenceWindow,
  pub supervised:    SupervisedConfig,
  pub generative:    GenerativeConfig,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      host:          "127.0.0.1".to_owned(),
      port:          8080,
      store_path:    PathBuf::from("~/.local/share/elicit/elicit.db"),
      schema_path:   PathBuf::from("schema.toml"),
      keywords_path: None,
      dedup:         DedupPolicy::default(),
      window:        EvidenceWindow::default(),
      supervised:    SupervisedConfig::default(),
      generative:    GenerativeConfig::default(),
    }
  }
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("ELICIT")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config file")?;

    let mut settings: Settings = settings
      .try_deserialize()
      .context("failed to deserialise Settings")?;

    settings.store_path = expand_tilde(&settings.store_path);
    settings.schema_path = expand_tilde(&settings.schema_path);
    settings.keywords_path = settings.keywords_path.as_deref().map(expand_tilde);
    Ok(settings)
  }

  pub fn estimator(&self) -> EstimatorConfig {
    EstimatorConfig { supervised: self.supervised, generative: self.generative }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
