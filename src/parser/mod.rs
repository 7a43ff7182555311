//! Parser adapter: source text in, per-file extraction out.
//!
//! tree-sitter does the parsing; [`extract::Extractor`] turns the tree into
//! declarations, imports and call sites.

pub mod calls;
pub mod extract;
pub mod language;

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tree_sitter::{Node, Parser, Tree};

use crate::config::ExtractionConfig;
use crate::error::{FlowError, Result};
use crate::graph::types::FileAnalysis;

pub use extract::{Extraction, Extractor};
pub use language::SourceLanguage;

/// Parse source text with the grammar for `language`.
pub fn parse_source(path: &str, source: &str, language: SourceLanguage) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&language.tree_sitter_language())
        .map_err(|e| FlowError::skipped(path, format!("grammar failed to load: {e}")))?;
    parser
        .parse(source, None)
        .ok_or_else(|| FlowError::skipped(path, "parser produced no tree"))
}

/// Parse and extract one file. The result is unclassified (`Layer::Utility`).
pub fn extract_file(path: &str, source: &str, config: &ExtractionConfig) -> Result<FileAnalysis> {
    let path = normalize_path(path);
    let language = SourceLanguage::from_path(Path::new(&path))
        .ok_or_else(|| FlowError::UnsupportedLanguage(PathBuf::from(&path)))?;
    if source.len() > config.max_file_bytes {
        return Err(FlowError::skipped(
            &path,
            format!(
                "{} bytes exceeds the {} byte limit",
                source.len(),
                config.max_file_bytes
            ),
        ));
    }

    let tree = parse_source(&path, source, language)?;
    if tree.root_node().has_error() {
        debug!(file = %path, "syntax errors, extracting well-formed subtrees only");
    }
    let extraction = Extractor::new(&path, source, config).extract(&tree);

    let mut analysis = FileAnalysis::new(&path);
    analysis.declarations = extraction.declarations;
    analysis.imports = extraction.imports;
    analysis.calls = extraction.calls;
    analysis.has_jsx = extraction.has_jsx;
    analysis.truncated = extraction.depth_limited;
    if analysis.truncated {
        warn!(
            file = %path,
            max_depth = extract::MAX_TREE_DEPTH,
            "nesting limit reached, deeper code not analyzed"
        );
    }
    Ok(analysis)
}

/// Forward slashes, no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

pub(crate) fn node_text(node: Node<'_>, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or_default().to_string()
}

/// 1-indexed start line.
pub(crate) fn line(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

pub(crate) fn end_line(node: Node<'_>) -> usize {
    node.end_position().row + 1
}
