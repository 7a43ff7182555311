//! CLI module for flowlens.
//!
//! Commands:
//! - Overview: analyze, entries, graph, cycles
//! - Risk: hotspots, impact, errors
//! - Behavior: journey, features, dataflow

use clap::{Parser, Subcommand};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::dataflow::TraceDirection;
use crate::error::Result;
use crate::parser::{normalize_path, SourceLanguage};
use crate::pipeline::SourceFile;

#[derive(Parser)]
#[command(name = "flowlens")]
#[command(about = "Behavior-centric static analysis for TypeScript and JavaScript")]
pub struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Config file (default: <root>/flowlens.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // ─── Overview ─────────────────────────────────────────────────
    /// Analyze the project and print a summary
    Analyze,

    /// List entry points and what triggers them
    Entries,

    /// Dump the call graph (nodes, edges, external calls)
    Graph,

    /// List call cycles
    Cycles,

    // ─── Risk ─────────────────────────────────────────────────────
    /// Most connected declarations
    Hotspots {
        /// Max results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// What is affected if a declaration changes
    Impact {
        /// Declaration id, name, or Class.method
        target: String,
    },

    /// Error handling per declaration, or where one declaration's errors go
    Errors {
        /// Declaration id, name, or Class.method
        target: Option<String>,
    },

    // ─── Behavior ─────────────────────────────────────────────────
    /// Step-by-step journey from an entry point (all entry points if omitted)
    Journey {
        /// Declaration id, name, or Class.method
        entry: Option<String>,
    },

    /// Features a file path or declaration name belongs to
    Features {
        /// File path or declaration name
        identifier: String,
    },

    /// Where a variable's value comes from and where it goes
    Dataflow {
        /// File path relative to the root
        file: String,
        /// Variable or parameter name
        identifier: String,
        /// Restrict to the declaration containing this line
        #[arg(short, long)]
        line: Option<usize>,
        /// backward, forward or both
        #[arg(short, long, default_value = "both")]
        direction: TraceDirection,
    },
}

/// `--config` when given, otherwise `<root>/flowlens.toml` or defaults.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<AnalysisConfig> {
    match explicit {
        Some(path) => AnalysisConfig::load(path),
        None => AnalysisConfig::discover(root),
    }
}

/// Read every JavaScript/TypeScript file under `root`.
///
/// Respects .gitignore (also outside git repositories), skips hidden files
/// and `node_modules`. Paths are relative to `root` with forward slashes,
/// sorted. Files that cannot be read as UTF-8 are logged and left out.
pub fn collect_sources(root: &Path) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    for entry in WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .require_git(false)
        .filter_entry(|e| e.file_name() != "node_modules")
        .build()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|e| SourceLanguage::from_path(e.path()).is_some())
    {
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let relative = normalize_path(&relative.to_string_lossy());
        match fs::read_to_string(path) {
            Ok(content) => files.push(SourceFile::new(relative, content)),
            Err(e) => warn!(file = %relative, error = %e, "unreadable file"),
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(root = %root.display(), files = files.len(), "sources collected");
    Ok(files)
}
