//! Build orchestration.
//!
//! One build: load the project configuration, route files, diff against the
//! cache, re-extract only what changed, run the plugin pass, and publish the
//! snapshot and cache artifacts. Publication happens only at the very end -
//! a failed build leaves prior on-disk artifacts untouched.

use crate::cache::{config_fingerprint, CacheManifest, CacheStore, FileEntry, CACHE_VERSION};
use crate::diff::{diff, hash_bytes, mtime_millis, DiffResult};
use crate::extract::{ExtractorFactory, SymbolExtractor};
use crate::plugin::{DocPlugin, PluginContext, PluginOutput, PluginRegistry};
use crate::progress::{BuildObserver, BuildPhase, BuildProgress};
use crate::router::{route, ExcludeSet};
use crate::snapshot::{IndexSnapshot, INDEX_VERSION};
use crate::EngineError;
use docdex_core::{normalize_rel_path, BuildOptions, ProjectConfig, SymbolRecord};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Suffix appended to a plugin-claimed path when its translated output is
/// fed through the symbol extractor. Never escapes the build: records are
/// rebased onto the origin path before merging.
const SYNTHETIC_SUFFIX: &str = ".__docdex__.ts";

/// Summary of one completed build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Total symbol records in the published snapshot
    pub symbol_count: usize,
    /// Files re-extracted this build (native + plugin-claimed)
    pub changed: usize,
    /// Files carried forward from the cache
    pub unchanged: usize,
    /// Cache entries dropped because their files disappeared
    pub deleted: usize,
    /// Wall-clock build duration in milliseconds
    pub elapsed_ms: u64,
}

/// The extraction context, owned for the duration of a build and recreated
/// on a batch cadence to bound the collaborator's internal caches.
struct ExtractionCx {
    extractor: Box<dyn SymbolExtractor>,
    since_reset: usize,
}

/// Drives full builds of the documentation index.
pub struct BuildOrchestrator {
    options: BuildOptions,
    factory: Arc<dyn ExtractorFactory>,
    registry: PluginRegistry,
    observer: Arc<dyn BuildObserver>,
}

impl BuildOrchestrator {
    /// Create an orchestrator for a project.
    pub fn new(
        options: BuildOptions,
        factory: Arc<dyn ExtractorFactory>,
        registry: PluginRegistry,
        observer: Arc<dyn BuildObserver>,
    ) -> Self {
        Self {
            options,
            factory,
            registry,
            observer,
        }
    }

    /// Build options in use.
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Run one full build, publishing the snapshot (and cache manifest when
    /// incremental mode is on) at the end.
    pub async fn build(&mut self) -> Result<BuildReport, EngineError> {
        let started = Instant::now();
        self.observer.on_build_start().await;

        let result = self.build_inner(started).await;

        match &result {
            Ok(report) => {
                info!(
                    symbols = report.symbol_count,
                    changed = report.changed,
                    unchanged = report.unchanged,
                    deleted = report.deleted,
                    elapsed_ms = report.elapsed_ms,
                    "Build complete"
                );
                self.observer
                    .on_build_complete(report.symbol_count, report.elapsed_ms)
                    .await;
            }
            Err(e) => {
                self.observer.on_build_error(e).await;
            }
        }

        result
    }

    async fn build_inner(&mut self, started: Instant) -> Result<BuildReport, EngineError> {
        let root = self.options.project_root.clone();

        // 1. Configuration: malformed config aborts before any extraction.
        let config = ProjectConfig::load(&self.options.config_path)?;
        let fingerprint = config_fingerprint(&self.options.config_path).await?;
        let excludes = self.build_exclude_set(&config)?;

        // 2. One walk, shared across plugins; native set from the config.
        let claims = self.registry.claims();
        let mut routed = route(&root, &config.files, &claims, &excludes)?;

        // Resolve the declared list against disk: files that no longer
        // exist drop out of the current set (and show up as deleted).
        let mut resolved = Vec::with_capacity(routed.native.len());
        for rel in routed.native {
            if tokio::fs::try_exists(root.join(&rel)).await.unwrap_or(false) {
                resolved.push(rel);
            }
        }
        routed.native = resolved;

        // 3. Cache + native diff.
        let cache = if self.options.incremental {
            CacheStore::load(
                &self.options.cache_path(),
                CACHE_VERSION,
                INDEX_VERSION,
                &self.registry.names_sorted(),
                &fingerprint,
            )
            .await
        } else {
            None
        };

        let native_diff = diff(
            &root,
            &routed.native,
            cache.as_ref(),
            self.options.hash_concurrency,
        )
        .await?;

        let mut manifest = CacheManifest::new(
            INDEX_VERSION,
            fingerprint,
            self.registry.names_sorted(),
        );
        let mut symbols: Vec<SymbolRecord> = Vec::new();
        let mut cx = ExtractionCx {
            extractor: self.factory.create(),
            since_reset: 0,
        };

        // 4-6. Native pass: carry unchanged forward, re-extract changed.
        carry_forward(&native_diff, cache.as_ref(), &mut manifest, &mut symbols);

        let total = native_diff.changed.len();
        for (i, rel) in native_diff.changed.iter().enumerate() {
            refresh_context(&mut cx, &*self.factory, self.options.extract_batch);

            let content = read_source(&root, rel).await?;
            let records = cx.extractor.extract(rel, &content).await?;
            cx.since_reset += 1;

            record_entry(&root, rel, &content, records.clone(), &native_diff, &mut manifest)
                .await;
            symbols.extend(records);

            self.observer
                .on_progress(&BuildProgress {
                    phase: BuildPhase::Indexing,
                    plugin: None,
                    current: i + 1,
                    total,
                    file: rel,
                })
                .await;
        }

        // 7-8. Plugin pass, with disposal on success and failure alike.
        let mut changed = native_diff.changed.len();
        let mut unchanged = native_diff.unchanged.len();

        if !self.registry.is_empty() {
            let claimed_union: Vec<String> = routed
                .claimed
                .values()
                .flatten()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let plugin_diff = diff(
                &root,
                &claimed_union,
                cache.as_ref(),
                self.options.hash_concurrency,
            )
            .await?;

            carry_forward(&plugin_diff, cache.as_ref(), &mut manifest, &mut symbols);

            let mut initialized = 0usize;
            let pass = plugin_pass(
                &mut self.registry,
                &mut initialized,
                &*self.factory,
                &self.observer,
                &self.options,
                &root,
                &routed.claimed,
                &plugin_diff,
                &mut cx,
                &mut manifest,
                &mut symbols,
            )
            .await;

            // Dispose exactly the plugins that initialized, in init order.
            for plugin in self.registry.plugins_mut()[..initialized].iter_mut() {
                if let Err(e) = plugin.dispose().await {
                    warn!(plugin = plugin.name(), error = %e, "Plugin dispose failed");
                }
            }

            pass?;

            changed += plugin_diff.changed.len();
            unchanged += plugin_diff.unchanged.len();
        }

        // Removal is by omission: whatever the old cache knew that did not
        // make it into the new manifest is gone.
        let deleted = cache
            .as_ref()
            .map(|c| {
                c.files
                    .keys()
                    .filter(|k| !manifest.files.contains_key(k.as_str()))
                    .count()
            })
            .unwrap_or(0);

        // 9. Publish. Snapshot and cache are independent artifacts, so the
        // writes proceed concurrently.
        let snapshot = IndexSnapshot::new(root.to_string_lossy().into_owned(), symbols);
        let snapshot_path = self.options.snapshot_path();
        if self.options.incremental {
            let cache_path = self.options.cache_path();
            let (a, b) = tokio::join!(
                snapshot.write(&snapshot_path),
                CacheStore::write(&cache_path, &manifest)
            );
            a?;
            b?;
        } else {
            snapshot.write(&snapshot_path).await?;
        }

        Ok(BuildReport {
            symbol_count: snapshot.symbols.len(),
            changed,
            unchanged,
            deleted,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Built-in patterns, config patterns, option patterns, and the output
    /// directory itself when it lives inside the project root.
    fn build_exclude_set(&self, config: &ProjectConfig) -> Result<ExcludeSet, EngineError> {
        let mut patterns = config.exclude.clone();
        patterns.extend(self.options.exclude.iter().cloned());
        if self.options.out_dir.starts_with(&self.options.project_root) {
            let rel = normalize_rel_path(&self.options.project_root, &self.options.out_dir);
            patterns.push(format!("{}/**", rel));
        }
        ExcludeSet::new(&patterns)
    }
}

/// Recreate the extraction context once the batch cadence is reached.
fn refresh_context(cx: &mut ExtractionCx, factory: &dyn ExtractorFactory, batch: usize) {
    if cx.since_reset >= batch {
        debug!(batch, "Recreating extraction context");
        cx.extractor = factory.create();
        cx.since_reset = 0;
    }
}

/// Copy unchanged entries forward verbatim, refreshing only a drifted mtime.
fn carry_forward(
    diff: &DiffResult,
    cache: Option<&CacheManifest>,
    manifest: &mut CacheManifest,
    symbols: &mut Vec<SymbolRecord>,
) {
    let cache = match cache {
        Some(c) => c,
        None => return,
    };
    for rel in &diff.unchanged {
        if let Some(cached) = cache.files.get(rel) {
            let mut entry = cached.clone();
            if let Some(m) = diff.mtimes.get(rel) {
                entry.mtime_ms = Some(*m);
            }
            symbols.extend(entry.symbols.iter().cloned());
            manifest.files.insert(rel.clone(), entry);
        }
    }
}

async fn read_source(root: &Path, rel: &str) -> Result<String, EngineError> {
    tokio::fs::read_to_string(root.join(rel))
        .await
        .map_err(|e| EngineError::Extract {
            path: rel.to_string(),
            message: e.to_string(),
        })
}

/// Record a fresh cache entry for a re-extracted file, reusing any
/// fingerprint/mtime the diff already computed.
async fn record_entry(
    root: &Path,
    rel: &str,
    content: &str,
    records: Vec<SymbolRecord>,
    diff: &DiffResult,
    manifest: &mut CacheManifest,
) {
    let fingerprint = diff
        .fingerprints
        .get(rel)
        .cloned()
        .unwrap_or_else(|| hash_bytes(content.as_bytes()));
    let mtime_ms = match diff.mtimes.get(rel) {
        Some(m) => Some(*m),
        None => tokio::fs::metadata(root.join(rel))
            .await
            .ok()
            .as_ref()
            .and_then(mtime_millis),
    };
    manifest.files.insert(
        rel.to_string(),
        FileEntry {
            fingerprint,
            symbols: records,
            mtime_ms,
        },
    );
}

/// Initialize every plugin, process the changed claimed files per plugin in
/// registration order, and merge per-file contributions into single cache
/// entries. `initialized` is updated as plugins come up so the caller can
/// dispose exactly those on any exit path.
#[allow(clippy::too_many_arguments)]
async fn plugin_pass(
    registry: &mut PluginRegistry,
    initialized: &mut usize,
    factory: &dyn ExtractorFactory,
    observer: &Arc<dyn BuildObserver>,
    options: &BuildOptions,
    root: &Path,
    buckets: &BTreeMap<String, Vec<String>>,
    plugin_diff: &DiffResult,
    cx: &mut ExtractionCx,
    manifest: &mut CacheManifest,
    symbols: &mut Vec<SymbolRecord>,
) -> Result<(), EngineError> {
    let ctx = PluginContext {
        project_root: root.to_path_buf(),
    };

    // Every plugin initializes before any file is processed.
    for plugin in registry.plugins_mut().iter_mut() {
        plugin.init(&ctx).await?;
        *initialized += 1;
    }

    let changed: BTreeSet<&str> = plugin_diff.changed.iter().map(String::as_str).collect();
    // Contributions merge per underlying file across plugins.
    let mut contributions: BTreeMap<String, Vec<SymbolRecord>> = BTreeMap::new();

    let plugin_count = registry.plugins_mut().len();
    for idx in 0..plugin_count {
        let name = registry.plugins_mut()[idx].name().to_string();
        let files: Vec<String> = buckets
            .get(&name)
            .map(|b| {
                b.iter()
                    .filter(|f| changed.contains(f.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let total = files.len();
        for (i, rel) in files.iter().enumerate() {
            // Same cadence as the native pass: recreate the extractor and
            // cycle every initialized plugin to bound per-plugin caches.
            if cx.since_reset >= options.extract_batch {
                cx.extractor = factory.create();
                cx.since_reset = 0;
                reinit_plugins(registry, *initialized, &ctx).await?;
            }

            let content = read_source(root, rel).await?;
            let output = registry.plugins_mut()[idx].extract(rel, &content).await?;
            cx.since_reset += 1;

            let mut records = match output {
                PluginOutput::Symbols(mut records) => {
                    for record in &mut records {
                        let norm = normalize_rel_path(root, Path::new(&record.file));
                        if norm != record.file {
                            record.rebase(&norm);
                        }
                    }
                    records
                }
                PluginOutput::Translated(text) => {
                    let synthetic = format!("{}{}", rel, SYNTHETIC_SUFFIX);
                    let mut records = cx.extractor.extract(&synthetic, &text).await?;
                    for record in &mut records {
                        record.rebase(rel);
                    }
                    records
                }
                PluginOutput::Skip => Vec::new(),
            };

            contributions.entry(rel.clone()).or_default().append(&mut records);

            observer
                .on_progress(&BuildProgress {
                    phase: BuildPhase::Plugin,
                    plugin: Some(&name),
                    current: i + 1,
                    total,
                    file: rel,
                })
                .await;
        }
    }

    // One cache entry per underlying file, fingerprinted from its content.
    for (rel, records) in contributions {
        let content = read_source(root, &rel).await?;
        record_entry(root, &rel, &content, records.clone(), plugin_diff, manifest).await;
        symbols.extend(records);
    }

    Ok(())
}

/// Dispose-then-init every already-initialized plugin, in order.
async fn reinit_plugins(
    registry: &mut PluginRegistry,
    initialized: usize,
    ctx: &PluginContext,
) -> Result<(), EngineError> {
    debug!("Recycling plugin contexts");
    for plugin in registry.plugins_mut()[..initialized].iter_mut() {
        if let Err(e) = plugin.dispose().await {
            warn!(plugin = plugin.name(), error = %e, "Plugin dispose failed");
        }
        plugin.init(ctx).await?;
    }
    Ok(())
}
