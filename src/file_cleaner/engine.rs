#[cfg(feature = "parallel-scan")]
use rayon::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::decision::DecisionEngine;
use super::duplicate_detector::{DuplicateDetector, DuplicateGroup, DuplicateIndex};
use super::executor;
use super::safety::risk_level;
use super::stats::{RunStatistics, StatsSnapshot};
use super::types::{Category, CleanEvent};
use super::walker::{
    dedupe_overlapping, drop_covered, walk_root, walk_roots, ScanRoot, WalkResult,
};
use crate::config::RunConfig;
use crate::error::{CleanError, Result};
use crate::ops::{ProgressEvent, RunControl, RunObserver, RunPhase};

/// Per-run state passed explicitly to every stage. Built once per run and
/// never shared between runs.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    /// Frozen for the whole run; every age is measured against it.
    pub started_at: DateTime<Utc>,
    pub simulate: bool,
    pub stats: RunStatistics,
    pub control: RunControl,
}

impl RunContext {
    pub fn new(simulate: bool, control: RunControl) -> Self {
        RunContext {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            simulate,
            stats: RunStatistics::new(),
            control,
        }
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootSummary {
    pub category: Category,
    pub path: PathBuf,
    pub entries: usize,
    pub enumeration_errors: usize,
    pub bytes_enumerated: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub simulated: bool,
    pub cancelled: bool,
    pub roots: Vec<RootSummary>,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub stats: StatsSnapshot,
}

/// Walk every root, run the duplicate pre-pass, then decide and act on each
/// candidate in traversal order.
pub struct FileCleaner {
    config: RunConfig,
}

impl FileCleaner {
    pub fn new(config: RunConfig) -> Self {
        FileCleaner { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn run(
        &self,
        simulate: bool,
        control: &RunControl,
        observer: &dyn RunObserver,
    ) -> Result<RunReport> {
        self.run_with_context(RunContext::new(simulate, control.clone()), observer)
    }

    /// Runs on tokio's blocking pool so async callers are not stalled.
    pub async fn run_async(
        self: Arc<Self>,
        simulate: bool,
        control: RunControl,
        observer: Arc<dyn RunObserver>,
    ) -> Result<RunReport> {
        tokio::task::spawn_blocking(move || self.run(simulate, &control, observer.as_ref()))
            .await
            .map_err(|err| CleanError::Join(err.to_string()))?
    }

    pub fn run_with_context(
        &self,
        ctx: RunContext,
        observer: &dyn RunObserver,
    ) -> Result<RunReport> {
        let timer = Instant::now();
        let roots = self.resolve_roots()?;

        log::info!(
            "Run {} started: {} roots, {} protection rules, {}",
            ctx.run_id,
            roots.len(),
            self.config.rules.len(),
            if ctx.simulate { "simulation" } else { "delete mode" }
        );

        #[cfg(feature = "parallel-scan")]
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.parallelism.max(1))
            .build()
            .map_err(|err| CleanError::WorkerPool(err.to_string()))?;

        #[cfg(feature = "parallel-scan")]
        let (summaries, groups) = pool.install(|| self.process(&roots, &ctx, observer));

        #[cfg(not(feature = "parallel-scan"))]
        let (summaries, groups) = self.process(&roots, &ctx, observer);

        let stats = ctx.stats.snapshot();
        let cancelled = ctx.control.is_cancelled();
        if cancelled {
            log::warn!("Run {} cancelled; statistics are partial", ctx.run_id);
        }
        log::info!(
            "Run {} finished: analyzed {}, cleaned {} ({}), protected {}, skipped {}, errors {}",
            ctx.run_id,
            stats.analyzed,
            stats.cleaned,
            bytesize::ByteSize(stats.bytes_reclaimed),
            stats.protected,
            stats.skipped,
            stats.errors
        );

        Ok(RunReport {
            run_id: ctx.run_id,
            started_at: ctx.started_at,
            finished_at: Utc::now(),
            duration_ms: timer.elapsed().as_millis() as u64,
            simulated: ctx.simulate,
            cancelled,
            roots: summaries,
            duplicate_groups: groups,
            stats,
        })
    }

    fn resolve_roots(&self) -> Result<Vec<ScanRoot>> {
        let roots: Vec<ScanRoot> = self
            .config
            .roots
            .iter()
            .filter(|root| {
                let exists = root.path.exists();
                if !exists {
                    log::warn!("Skipping missing root {}", root.path.display());
                }
                exists
            })
            .cloned()
            .collect();
        if roots.is_empty() {
            return Err(CleanError::NoRoots);
        }
        Ok(roots)
    }

    fn process(
        &self,
        roots: &[ScanRoot],
        ctx: &RunContext,
        observer: &dyn RunObserver,
    ) -> (Vec<RootSummary>, Vec<DuplicateGroup>) {
        if self.config.thresholds.detect_duplicates {
            return self.process_with_duplicates(roots, ctx, observer);
        }

        // No cross-root pass: a stuck root only holds up its own worker
        let index = DuplicateIndex::empty();
        let engine = self.decision_engine(ctx, &index);
        let clean = |position: usize, root: &ScanRoot| {
            let mut batch = walk_root(root, Some(&ctx.control));
            let dropped = drop_covered(&mut batch, &roots[..position]);
            if dropped > 0 {
                log::debug!(
                    "Dropped {} entries under {} already covered by an earlier root",
                    dropped,
                    root.path.display()
                );
            }
            observer.on_progress(&progress(&batch.root, RunPhase::Discovery, 100.0, None));
            let summary = RootSummary::from(&batch);
            clean_root(batch, &engine, ctx, observer);
            summary
        };

        #[cfg(feature = "parallel-scan")]
        let summaries: Vec<RootSummary> = roots
            .par_iter()
            .enumerate()
            .map(|(position, root)| clean(position, root))
            .collect();

        #[cfg(not(feature = "parallel-scan"))]
        let summaries: Vec<RootSummary> = roots
            .iter()
            .enumerate()
            .map(|(position, root)| clean(position, root))
            .collect();

        (summaries, Vec::new())
    }

    /// Duplicate groups span roots, so every root is walked and hashed
    /// before the first deletion.
    fn process_with_duplicates(
        &self,
        roots: &[ScanRoot],
        ctx: &RunContext,
        observer: &dyn RunObserver,
    ) -> (Vec<RootSummary>, Vec<DuplicateGroup>) {
        // Phase 1: materialize every root
        let mut batches = walk_roots(roots, Some(&ctx.control), |batch| {
            observer.on_progress(&progress(&batch.root, RunPhase::Discovery, 100.0, None));
        });
        let dropped = dedupe_overlapping(&mut batches);
        if dropped > 0 {
            log::debug!("Dropped {} entries already covered by an earlier root", dropped);
        }
        let summaries: Vec<RootSummary> = batches.iter().map(RootSummary::from).collect();

        if ctx.control.is_cancelled() {
            return (summaries, Vec::new());
        }

        // Phase 2: duplicate groups are complete before any deletion
        for batch in &batches {
            observer.on_progress(&progress(&batch.root, RunPhase::Duplicates, 0.0, None));
        }
        let detector = DuplicateDetector::new()
            .with_min_size(self.config.thresholds.min_duplicate_size)
            .with_buffer_size(self.config.hash_buffer_bytes);
        let scan = detector.group(
            batches.iter().flat_map(|batch| batch.entries.iter()),
            Some(&ctx.control),
        );
        ctx.stats.record_duplicates(&scan);
        log::info!(
            "Duplicate scan: {} groups over {} hashed files ({} unreadable)",
            scan.groups.len(),
            scan.analyzed_files,
            scan.failures.len()
        );
        for batch in &batches {
            observer.on_progress(&progress(&batch.root, RunPhase::Duplicates, 100.0, None));
        }
        let index = DuplicateIndex::from_groups(&scan.groups);
        let groups = scan.groups;

        if ctx.control.is_cancelled() {
            return (summaries, groups);
        }

        // Phase 3: decide and act, one worker per root
        let engine = self.decision_engine(ctx, &index);

        #[cfg(feature = "parallel-scan")]
        batches
            .into_par_iter()
            .for_each(|batch| clean_root(batch, &engine, ctx, observer));

        #[cfg(not(feature = "parallel-scan"))]
        for batch in batches {
            clean_root(batch, &engine, ctx, observer);
        }

        (summaries, groups)
    }

    fn decision_engine<'a>(
        &'a self,
        ctx: &RunContext,
        index: &'a DuplicateIndex,
    ) -> DecisionEngine<'a> {
        DecisionEngine::new(
            &self.config.rules,
            self.config.thresholds,
            ctx.started_at,
            index,
            ctx.simulate,
        )
    }
}

impl From<&WalkResult> for RootSummary {
    fn from(batch: &WalkResult) -> Self {
        RootSummary {
            category: batch.root.category,
            path: batch.root.path.clone(),
            entries: batch.entries.len(),
            enumeration_errors: batch.errors,
            bytes_enumerated: batch.bytes,
        }
    }
}

fn progress(
    root: &ScanRoot,
    phase: RunPhase,
    percent: f32,
    current_path: Option<PathBuf>,
) -> ProgressEvent {
    ProgressEvent {
        root: root.path.clone(),
        category: root.category,
        phase,
        percent,
        current_path,
        risk: risk_level(&root.path),
    }
}

fn clean_root(
    batch: WalkResult,
    engine: &DecisionEngine<'_>,
    ctx: &RunContext,
    observer: &dyn RunObserver,
) {
    let WalkResult { root, entries, .. } = batch;
    let total = entries.len().max(1);

    for (index, entry) in entries.into_iter().enumerate() {
        if !ctx.control.wait_if_paused() {
            log::debug!("Stopping {} at candidate boundary", root.path.display());
            return;
        }

        observer.on_progress(&progress(
            &root,
            RunPhase::Cleaning,
            (index as f32 / total as f32) * 100.0,
            Some(entry.path.clone()),
        ));

        // decide and act back to back on this worker
        let verdict = engine.decide(entry);
        ctx.stats.record_verdict(&verdict);
        let outcome = executor::execute(&verdict, ctx.simulate);
        ctx.stats.record_outcome(&verdict, &outcome);
        observer.on_event(&CleanEvent::new(&verdict, &outcome));
    }

    observer.on_progress(&progress(&root, RunPhase::Complete, 100.0, None));
}
