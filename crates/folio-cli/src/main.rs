//! `folio`: administration CLI for a Folio publication store.
//!
//! Reads `folio.toml` (or the path given with `--config`), opens the SQLite
//! store, and runs one command on behalf of an acting user. Entity graphs
//! are read from JSON files in the same shape clients submit; results are
//! printed as JSON.
//!
//! ```
//! folio init
//! folio user add --mail ada@example.org --name "Ada"
//! folio edition add --actor 1 --title "Correspondence"
//! folio publication import --actor 1 letters.json
//! folio sections merge --actor 1 --publication 3 sections.json --replace
//! folio check --user 2 --target section/8 --role EDITOR
//! ```

mod config;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use folio_core::{
  entity::{Edition, OutlineRef, Permission, Publication, Rule, Section, User},
  reference::{EntityUri, TargetRef},
  role::Role,
  schema::Catalog,
  store::PublicationStore,
};
use folio_store_sqlite::SqliteStore;
use serde::{Serialize, de::DeserializeOwned};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::FolioConfig;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "folio", version, about = "Folio publication store administration")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "folio.toml")]
  config: PathBuf,

  /// Override the configured store path.
  #[arg(long, value_name = "FILE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Create the store file and its schema.
  Init,
  #[command(subcommand)]
  User(UserCommand),
  #[command(subcommand)]
  Edition(EditionCommand),
  #[command(subcommand)]
  Publication(PublicationCommand),
  #[command(subcommand)]
  Sections(MergeCommand),
  #[command(subcommand)]
  Rules(MergeCommand),
  #[command(subcommand)]
  Sources(MergeCommand),
  #[command(subcommand)]
  Permissions(MergeCommand),
  /// Resolve a user's role on a target and fail below `--role`.
  Check {
    #[arg(long)]
    user:   i64,
    /// A `kind/id` reference, e.g. `publication/3`.
    #[arg(long)]
    target: EntityUri,
    #[arg(long, default_value = "VIEWER")]
    role:   Role,
  },
  /// Apply a sparse JSON object of attributes to one entity.
  Patch {
    #[arg(long)]
    actor:  i64,
    #[arg(long)]
    target: EntityUri,
    file:   PathBuf,
  },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
  Add {
    #[arg(long)]
    mail: String,
    #[arg(long)]
    name: String,
  },
}

#[derive(Subcommand, Debug)]
enum EditionCommand {
  Add {
    #[arg(long)]
    actor: i64,
    #[arg(long)]
    title: String,
  },
}

#[derive(Subcommand, Debug)]
enum PublicationCommand {
  /// Insert a publication graph from a JSON file.
  Import {
    #[arg(long)]
    actor: i64,
    file:  PathBuf,
  },
  Show {
    #[arg(long)]
    actor:   i64,
    id:      i64,
    /// Skip sections and permissions.
    #[arg(long)]
    shallow: bool,
  },
  Delete {
    #[arg(long)]
    actor: i64,
    id:    i64,
  },
}

#[derive(Subcommand, Debug)]
enum MergeCommand {
  /// Merge a JSON array of children into the stored collection.
  Merge {
    #[arg(long)]
    actor:   i64,
    /// The owning entity: a publication id for sections, a section id for
    /// rules and sources, a `kind/id` target for permissions.
    #[arg(long)]
    parent:  String,
    file:    PathBuf,
    /// Delete stored children the file does not mention.
    #[arg(long)]
    replace: bool,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let mut cfg = FolioConfig::load(&cli.config)?;
  if let Some(store) = cli.store {
    cfg.store_path = store;
  }

  let catalog = Catalog::standard().context("invalid entity catalog")?;
  let store = SqliteStore::open(&cfg.store_path, catalog, cfg.store_options())
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  run(&store, cli.command).await
}

async fn run(store: &SqliteStore, command: Command) -> anyhow::Result<()> {
  match command {
    Command::Init => {
      tracing::info!("store ready");
      Ok(())
    }
    Command::User(UserCommand::Add { mail, name }) => {
      print(&store.add_user(User::new(mail, name)).await?)
    }
    Command::Edition(EditionCommand::Add { actor, title }) => {
      print(&store.add_edition(actor, Edition::new(title)).await?)
    }
    Command::Publication(PublicationCommand::Import { actor, file }) => {
      let publication: Publication = read_json(&file)?;
      print(&store.insert_publication(actor, publication).await?)
    }
    Command::Publication(PublicationCommand::Show { actor, id, shallow }) => {
      print(&store.load_publication(actor, id, !shallow).await?)
    }
    Command::Publication(PublicationCommand::Delete { actor, id }) => {
      store.delete_publication(actor, id).await?;
      tracing::info!(publication = id, "deleted");
      Ok(())
    }
    Command::Sections(MergeCommand::Merge { actor, parent, file, replace }) => {
      let sections: Vec<Section> = read_json(&file)?;
      print(&store.merge_sections(actor, parse_id(&parent)?, sections, replace).await?)
    }
    Command::Rules(MergeCommand::Merge { actor, parent, file, replace }) => {
      let rules: Vec<Rule> = read_json(&file)?;
      print(&store.merge_rules(actor, parse_id(&parent)?, rules, replace).await?)
    }
    Command::Sources(MergeCommand::Merge { actor, parent, file, replace }) => {
      let sources: Vec<OutlineRef> = read_json(&file)?;
      print(&store.merge_sources(actor, parse_id(&parent)?, sources, replace).await?)
    }
    Command::Permissions(MergeCommand::Merge { actor, parent, file, replace }) => {
      let target: TargetRef = parent
        .parse()
        .with_context(|| format!("{parent:?} is not a permission target"))?;
      let permissions: Vec<Permission> = read_json(&file)?;
      print(&store.merge_permissions(actor, target, permissions, replace).await?)
    }
    Command::Check { user, target, role } => {
      let granted = store.check_permission(target, user, role).await?;
      println!("{granted}");
      Ok(())
    }
    Command::Patch { actor, target, file } => {
      let sparse: serde_json::Map<String, serde_json::Value> = read_json(&file)?;
      let applied = store.modify(actor, target, sparse).await?;
      println!("{applied}");
      Ok(())
    }
  }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading {}", path.display()))?;
  serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn parse_id(raw: &str) -> anyhow::Result<i64> {
  raw.parse().with_context(|| format!("{raw:?} is not an id"))
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory as _;

  use super::*;

  #[test]
  fn cli_definition_is_consistent() { Cli::command().debug_assert(); }

  #[test]
  fn parses_a_replacing_merge() {
    let cli = Cli::try_parse_from([
      "folio", "sections", "merge", "--actor", "1", "--parent", "3", "s.json", "--replace",
    ])
    .unwrap();
    let Command::Sections(MergeCommand::Merge { actor, parent, replace, .. }) = cli.command else {
      panic!("unexpected command");
    };
    assert_eq!((actor, parent.as_str(), replace), (1, "3", true));
  }

  #[test]
  fn check_parses_references_and_roles() {
    let cli = Cli::try_parse_from([
      "folio", "check", "--user", "2", "--target", "section/8", "--role", "REVIEW_EDITOR",
    ])
    .unwrap();
    let Command::Check { target, role, .. } = cli.command else {
      panic!("unexpected command");
    };
    assert_eq!(target.to_string(), "section/8");
    assert_eq!(role, Role::ReviewEditor);
  }

  #[test]
  fn unknown_reference_kinds_are_refused() {
    assert!(Cli::try_parse_from(["folio", "check", "--user", "2", "--target", "chapter/1"]).is_err());
  }
}
