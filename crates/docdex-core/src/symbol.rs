//! Symbol records - the unit the documentation index is made of.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Kind of symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Interface,
    Trait,
    Module,
    Constant,
    Variable,
}

/// One documentation record for one source symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
    /// Stable identifier: `<relative path>#<name>` with forward slashes
    pub id: String,
    /// Symbol name
    pub name: String,
    /// Kind of symbol
    pub kind: SymbolKind,
    /// Rendered type signature if available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Documentation comment if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// Project-relative path of the defining file (forward slashes)
    pub file: String,
    /// Start line (1-indexed)
    pub start_line: usize,
    /// End line (1-indexed)
    pub end_line: usize,
}

impl SymbolRecord {
    /// Rewrite this record to reference a different defining file,
    /// regenerating the identifier from that path.
    ///
    /// Used when symbols were extracted under a synthetic path and must be
    /// attributed back to the file they actually came from.
    pub fn rebase(&mut self, rel_path: &str) {
        self.file = rel_path.to_string();
        self.id = symbol_id(rel_path, &self.name);
    }
}

/// Build the stable identifier for a symbol.
pub fn symbol_id(rel_path: &str, name: &str) -> String {
    format!("{}#{}", rel_path, name)
}

/// Normalize a path to a project-relative string with forward slashes.
///
/// Absolute paths are stripped of the project root prefix; a path outside
/// the root is kept as-is (lossy) so callers still get a usable key.
pub fn normalize_rel_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let s = rel.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
