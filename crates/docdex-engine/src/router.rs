//! File routing between the native extraction path and plugin handlers.
//!
//! One recursive walk is shared across all plugins; each project file ends
//! up in the native set, in one or more plugin buckets, or nowhere at all
//! when an exclusion pattern matches it.

use crate::EngineError;
use docdex_core::normalize_rel_path;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Patterns excluded from every build: vendor and build-output directories,
/// declaration-only files, and the engine's own output directory.
const BUILT_IN_EXCLUDES: &[&str] = &[
    "**/node_modules/**",
    "**/.git/**",
    "**/dist/**",
    "**/build/**",
    "**/*.d.ts",
    "**/.docdex/**",
];

/// Compiled exclusion pattern set, matched against relative paths.
#[derive(Debug)]
pub struct ExcludeSet {
    set: GlobSet,
}

impl ExcludeSet {
    /// Compile the built-in patterns plus any extra ones.
    pub fn new(extra: &[String]) -> Result<Self, EngineError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in BUILT_IN_EXCLUDES.iter().copied().chain(extra.iter().map(String::as_str)) {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| EngineError::Pattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| EngineError::Pattern {
            pattern: String::new(),
            message: e.to_string(),
        })?;
        Ok(Self { set })
    }

    /// Whether a relative path matches any exclusion pattern.
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        self.set.is_match(rel_path)
    }
}

/// The partition produced by routing.
#[derive(Debug, Default)]
pub struct RoutedFiles {
    /// Config-declared files handled by the native extractor, sorted
    pub native: Vec<String>,
    /// Plugin name -> claimed files discovered by the walk, each sorted
    pub claimed: BTreeMap<String, Vec<String>>,
}

/// Route project files between the native path and plugin buckets.
///
/// `claims` is the registered plugin set as `(name, lowercased extensions)`.
/// Files whose extension is claimed by any plugin never reach the native
/// set, so nothing is processed twice; a file may appear in several buckets
/// when plugins claim overlapping extensions.
pub fn route(
    root: &Path,
    config_files: &[String],
    claims: &[(String, Vec<String>)],
    excludes: &ExcludeSet,
) -> Result<RoutedFiles, EngineError> {
    let mut routed = RoutedFiles::default();

    let claimed_exts: Vec<&str> = claims
        .iter()
        .flat_map(|(_, exts)| exts.iter().map(String::as_str))
        .collect();

    let mut native: Vec<String> = config_files
        .iter()
        .filter(|rel| !excludes.is_excluded(rel))
        .filter(|rel| {
            extension_of(rel)
                .map(|ext| !claimed_exts.contains(&ext.as_str()))
                .unwrap_or(true)
        })
        .cloned()
        .collect();
    native.sort();
    native.dedup();
    routed.native = native;

    // No handlers registered: skip the walk entirely.
    if claims.is_empty() {
        return Ok(routed);
    }

    for (name, _) in claims {
        routed.claimed.insert(name.clone(), Vec::new());
    }

    // The one walk shared across all plugins.
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "Walk error");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        let rel = normalize_rel_path(root, entry.path());
        if excludes.is_excluded(&rel) {
            continue;
        }

        let ext = match extension_of(&rel) {
            Some(e) => e,
            None => continue,
        };

        for (name, exts) in claims {
            if exts.iter().any(|c| c == &ext) {
                if let Some(bucket) = routed.claimed.get_mut(name) {
                    bucket.push(rel.clone());
                }
            }
        }
    }

    for bucket in routed.claimed.values_mut() {
        bucket.sort();
    }

    debug!(
        native = routed.native.len(),
        plugins = routed.claimed.len(),
        "Routed project files"
    );

    Ok(routed)
}

/// Lowercased extension of a relative path, without the dot.
fn extension_of(rel_path: &str) -> Option<String> {
    Path::new(rel_path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_extra() -> ExcludeSet {
        ExcludeSet::new(&[]).unwrap()
    }

    #[test]
    fn test_built_in_excludes() {
        let excludes = no_extra();
        assert!(excludes.is_excluded("node_modules/pkg/index.ts"));
        assert!(excludes.is_excluded("src/types.d.ts"));
        assert!(excludes.is_excluded(".docdex/index.json"));
        assert!(!excludes.is_excluded("src/index.ts"));
    }

    #[test]
    fn test_extra_patterns() {
        let excludes = ExcludeSet::new(&["generated/**".to_string()]).unwrap();
        assert!(excludes.is_excluded("generated/api.ts"));
        assert!(!excludes.is_excluded("src/api.ts"));
    }

    #[test]
    fn test_invalid_pattern_is_fatal() {
        let result = ExcludeSet::new(&["a{b".to_string()]);
        assert!(matches!(result, Err(EngineError::Pattern { .. })));
    }

    #[test]
    fn test_native_routing_filters_claimed_and_excluded() {
        let dir = tempdir().unwrap();
        let files = vec![
            "src/b.ts".to_string(),
            "src/a.ts".to_string(),
            "src/widget.vue".to_string(),
            "node_modules/x.ts".to_string(),
        ];
        let claims = vec![("vue".to_string(), vec!["vue".to_string()])];

        let routed = route(dir.path(), &files, &claims, &no_extra()).unwrap();

        // Sorted, without the claimed or excluded entries
        assert_eq!(routed.native, vec!["src/a.ts", "src/b.ts"]);
    }

    #[test]
    fn test_claimed_extension_case_insensitive() {
        let dir = tempdir().unwrap();
        let files = vec!["src/Widget.VUE".to_string(), "src/a.ts".to_string()];
        let claims = vec![("vue".to_string(), vec!["vue".to_string()])];

        let routed = route(dir.path(), &files, &claims, &no_extra()).unwrap();
        assert_eq!(routed.native, vec!["src/a.ts"]);
    }

    #[test]
    fn test_walk_buckets_per_plugin() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("b.vue"), "x").unwrap();
        std::fs::write(src.join("a.vue"), "x").unwrap();
        std::fs::write(src.join("c.svelte"), "x").unwrap();
        std::fs::write(src.join("plain.ts"), "x").unwrap();

        let claims = vec![
            ("vue".to_string(), vec!["vue".to_string()]),
            ("svelte".to_string(), vec!["svelte".to_string()]),
        ];
        let routed = route(dir.path(), &[], &claims, &no_extra()).unwrap();

        assert_eq!(routed.claimed["vue"], vec!["src/a.vue", "src/b.vue"]);
        assert_eq!(routed.claimed["svelte"], vec!["src/c.svelte"]);
    }

    #[test]
    fn test_overlapping_claims_land_in_both_buckets() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("doc.md"), "x").unwrap();

        let claims = vec![
            ("markdown".to_string(), vec!["md".to_string()]),
            ("docs".to_string(), vec!["md".to_string()]),
        ];
        let routed = route(dir.path(), &[], &claims, &no_extra()).unwrap();

        assert_eq!(routed.claimed["markdown"], vec!["doc.md"]);
        assert_eq!(routed.claimed["docs"], vec!["doc.md"]);
    }

    #[test]
    fn test_excluded_files_reach_no_bucket() {
        let dir = tempdir().unwrap();
        let vendored = dir.path().join("node_modules");
        std::fs::create_dir_all(&vendored).unwrap();
        std::fs::write(vendored.join("dep.vue"), "x").unwrap();

        let claims = vec![("vue".to_string(), vec!["vue".to_string()])];
        let routed = route(dir.path(), &[], &claims, &no_extra()).unwrap();

        assert!(routed.claimed["vue"].is_empty());
    }

    #[test]
    fn test_no_claims_skips_walk() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.vue"), "x").unwrap();

        let routed = route(dir.path(), &["a.ts".to_string()], &[], &no_extra()).unwrap();
        assert!(routed.claimed.is_empty());
        assert_eq!(routed.native, vec!["a.ts"]);
    }
}
