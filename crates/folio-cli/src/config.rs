//! Runtime configuration for the `folio` binary.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use folio_store_sqlite::StoreOptions;
use serde::Deserialize;

/// Deserialised from `folio.toml` (or `--config`) layered with `FOLIO_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct FolioConfig {
  #[serde(default = "default_store_path")]
  pub store_path:            PathBuf,
  #[serde(default = "default_lock_timeout")]
  pub lock_timeout_secs:     u64,
  #[serde(default = "default_stale_after")]
  pub lock_stale_after_secs: u64,
  #[serde(default = "default_busy_timeout")]
  pub busy_timeout_ms:       u64,
}

fn default_store_path() -> PathBuf { PathBuf::from("folio.db") }

fn default_lock_timeout() -> u64 { 10 }

fn default_stale_after() -> u64 { 300 }

fn default_busy_timeout() -> u64 { 5000 }

impl FolioConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("FOLIO"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise FolioConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }

  pub fn store_options(&self) -> StoreOptions {
    StoreOptions {
      lock_timeout: Duration::from_secs(self.lock_timeout_secs),
      lock_stale_after: Duration::from_secs(self.lock_stale_after_secs),
      busy_timeout: Duration::from_millis(self.busy_timeout_ms),
      ..StoreOptions::default()
    }
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

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = FolioConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(cfg.lock_timeout_secs, 10);
    assert_eq!(cfg.lock_stale_after_secs, 300);
    assert_eq!(cfg.store_options().busy_timeout, Duration::from_millis(5000));
  }

  #[test]
  fn file_values_reach_store_options() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("folio.toml");
    std::fs::write(&path, "store_path = \"/srv/folio.db\"\nlock_timeout_secs = 3\n").unwrap();

    let cfg = FolioConfig::load(&path).unwrap();
    assert_eq!(cfg.store_path, PathBuf::from("/srv/folio.db"));
    let options = cfg.store_options();
    assert_eq!(options.lock_timeout, Duration::from_secs(3));
    assert_eq!(options.lock_stale_after, Duration::from_secs(300));
  }
}
