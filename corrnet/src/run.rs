//! Run driver.
//!
//! An [`AnnotationRun`] executes the stages in order:
//!
//! 1. pair pass: every row pair within the RT tolerance is correlated and matched
//!    against the ion library (parallel over the outer row)
//! 2. grouping of correlated rows
//! 3. MS/MS corroboration of links
//! 4. annotation networks
//! 5. refinement, followed by a network rebuild
//!
//! Cancellation is polled once per outer row of the pair pass and between stages.
//! A canceled run returns whatever was finished so far; nothing is rolled back.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};
use mscorr::chemistry::library::IonLibrary;
use mscorr::data::feature::FeatureRow;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::annotation::link::{LinkGraph, LinkStore};
use crate::annotation::matcher::AnnotationMatcher;
use crate::annotation::msms::{check_links, MsMsSummary};
use crate::annotation::network::{build_networks, AnnotationNetwork};
use crate::annotation::refine::{AnnotationRefiner, RefineSummary};
use crate::config::RunConfig;
use crate::correlation::map::{pair_key, CorrelationMap};
use crate::correlation::pair::{correlate_rows, PairCorrelation};
use crate::error::{CorrNetError, Result};
use crate::grouping::group::{build_groups, Grouping};

/// Shared cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    Pending = 0,
    PairPass = 1,
    Grouping = 2,
    MsMsCheck = 3,
    Networks = 4,
    Refinement = 5,
    Done = 6,
}

impl Stage {
    fn from_u8(v: u8) -> Stage {
        match v {
            1 => Stage::PairPass,
            2 => Stage::Grouping,
            3 => Stage::MsMsCheck,
            4 => Stage::Networks,
            5 => Stage::Refinement,
            6 => Stage::Done,
            _ => Stage::Pending,
        }
    }
}

/// Stage and fractional progress within the stage, readable from any thread.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    stage: AtomicU8,
    done: AtomicUsize,
    total: AtomicUsize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, stage: Stage, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
        self.stage.store(stage as u8, Ordering::Relaxed);
    }

    pub fn tick(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stage(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::Relaxed))
    }

    /// Fraction of the current stage, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return if self.stage() == Stage::Pending { 0.0 } else { 1.0 };
        }
        (self.done.load(Ordering::Relaxed) as f64 / total as f64).min(1.0)
    }
}

/// Everything a run produced.
#[derive(Debug, Default)]
pub struct RunResults {
    pub correlations: CorrelationMap,
    pub grouping: Grouping,
    pub links: LinkGraph,
    pub networks: Vec<AnnotationNetwork>,
    /// row pairs with an ion identity match
    pub matched_pairs: usize,
    pub msms: MsMsSummary,
    pub refinement: RefineSummary,
}

#[derive(Debug)]
pub enum RunOutcome {
    Finished(RunResults),
    /// partial results up to the last completed step
    Canceled(RunResults),
}

impl RunOutcome {
    pub fn is_canceled(&self) -> bool {
        matches!(self, RunOutcome::Canceled(_))
    }

    pub fn results(&self) -> &RunResults {
        match self {
            RunOutcome::Finished(r) | RunOutcome::Canceled(r) => r,
        }
    }

    pub fn into_results(self) -> RunResults {
        match self {
            RunOutcome::Finished(r) | RunOutcome::Canceled(r) => r,
        }
    }
}

type PairOutput = (Vec<((u32, u32), PairCorrelation)>, usize);

/// Called after every progress tick with the current stage and its fraction.
pub type ProgressObserver = Arc<dyn Fn(Stage, f64) + Send + Sync>;

pub struct AnnotationRun {
    config: RunConfig,
    matcher: AnnotationMatcher,
    progress: Arc<ProgressTracker>,
    cancel: CancelToken,
    observer: Option<ProgressObserver>,
}

impl AnnotationRun {
    /// Validates the configuration and enumerates the ion library.
    pub fn new(config: RunConfig) -> Result<Self> {
        let library: IonLibrary = config.validate()?;
        let matcher = AnnotationMatcher::new(library, config.annotation.clone());
        Ok(AnnotationRun {
            config,
            matcher,
            progress: Arc::new(ProgressTracker::new()),
            cancel: CancelToken::new(),
            observer: None,
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn library(&self) -> &IonLibrary {
        self.matcher.library()
    }

    /// Runs on a dedicated pool of `num_threads` threads.
    pub fn execute_with_threads(&self, rows: &[FeatureRow], num_threads: usize) -> Result<RunOutcome> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| CorrNetError::InvalidConfig(format!("thread pool: {e}")))?;
        pool.install(|| self.execute(rows))
    }

    /// Runs on the current rayon pool.
    pub fn execute(&self, rows: &[FeatureRow]) -> Result<RunOutcome> {
        check_rows(rows)?;
        let by_id: HashMap<u32, &FeatureRow> = rows.iter().map(|r| (r.id, r)).collect();
        let lookup = |id: u32| by_id.get(&id).copied();
        let mut results = RunResults::default();

        // ---- 1) PAIR PASS ----
        let t0 = Instant::now();
        let store = LinkStore::new(rows.iter().map(|r| r.id));
        let pairs = match self.pair_pass(rows, &store) {
            Ok(p) => p,
            Err(e) => {
                if e.is_fatal() {
                    error!("aborting run: {e}");
                }
                return Err(e);
            }
        };
        for (edges, matched) in pairs {
            results.correlations.extend(edges);
            results.matched_pairs += matched;
        }
        results.links = store.freeze();
        info!(
            "pair pass: {} correlated pairs, {} matched pairs, {} links in {:.2?}",
            results.correlations.len(), results.matched_pairs, results.links.live_count(), t0.elapsed()
        );
        if self.cancel.is_canceled() {
            return Ok(RunOutcome::Canceled(results));
        }

        // ---- 2) GROUPING ----
        self.progress.start(Stage::Grouping, 1);
        results.grouping = build_groups(rows, &results.correlations, &self.config.feature_filter);
        self.tick();
        if self.cancel.is_canceled() {
            return Ok(RunOutcome::Canceled(results));
        }

        // ---- 3) MS/MS CHECK ----
        self.progress.start(Stage::MsMsCheck, 1);
        results.msms = check_links(&mut results.links, &lookup, &self.config.msms);
        self.tick();
        if self.cancel.is_canceled() {
            return Ok(RunOutcome::Canceled(results));
        }

        // ---- 4) NETWORKS ----
        self.progress.start(Stage::Networks, 1);
        results.networks = build_networks(&mut results.links, &lookup);
        self.tick();
        if self.cancel.is_canceled() {
            return Ok(RunOutcome::Canceled(results));
        }

        // ---- 5) REFINEMENT ----
        self.progress.start(Stage::Refinement, 1);
        let refiner = AnnotationRefiner::new(self.config.refinement.clone());
        results.refinement = refiner.refine(&mut results.links, &mut results.networks);
        if results.refinement.links_deleted > 0 {
            results.networks = build_networks(&mut results.links, &lookup);
        }
        self.tick();
        self.progress.start(Stage::Done, 0);

        info!(
            "run finished: {} groups, {} networks, {} links",
            results.grouping.len(), results.networks.len(), results.links.live_count()
        );
        Ok(RunOutcome::Finished(results))
    }

    fn tick(&self) {
        self.progress.tick();
        if let Some(observer) = &self.observer {
            observer(self.progress.stage(), self.progress.fraction());
        }
    }

    /// O(n²) pass over RT-sorted rows. Each outer row is compared with all later rows
    /// until the RT gap exceeds the tolerance.
    fn pair_pass(&self, rows: &[FeatureRow], store: &LinkStore) -> Result<Vec<PairOutput>> {
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| rows[a].rt.total_cmp(&rows[b].rt).then(rows[a].id.cmp(&rows[b].id)));
        let rt_tol = self.config.rt_tolerance;
        let params = &self.config.correlation;
        self.progress.start(Stage::PairPass, order.len());

        order
            .par_iter()
            .enumerate()
            .map(|(i, &ai)| -> Result<PairOutput> {
                let mut edges = Vec::new();
                let mut matched = 0;
                if self.cancel.is_canceled() {
                    return Ok((edges, matched));
                }
                let a = &rows[ai];
                for &bi in &order[i + 1..] {
                    let b = &rows[bi];
                    if b.rt - a.rt > rt_tol {
                        break;
                    }
                    if let Some(pair) = correlate_rows(a, b, params)? {
                        edges.push((pair_key(a.id, b.id), pair));
                    }
                    if let Some(m) = self.matcher.find_match(a, b) {
                        store.link(a.id, &m.ion_a, b.id, &m.ion_b)?;
                        matched += 1;
                    }
                }
                self.tick();
                Ok((edges, matched))
            })
            .collect()
    }
}

/// Rejects duplicate ids and malformed traces.
fn check_rows(rows: &[FeatureRow]) -> Result<()> {
    let mut seen = HashSet::with_capacity(rows.len());
    for row in rows {
        if !seen.insert(row.id) {
            return Err(CorrNetError::DuplicateRow(row.id));
        }
        row.validate()?;
        if row.features.is_empty() {
            warn!("row {} has no features and takes no part in correlation", row.id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_canceled());
        clone.cancel();
        assert!(token.is_canceled());
    }

    #[test]
    fn test_progress_fraction() {
        let p = ProgressTracker::new();
        assert_eq!(p.stage(), Stage::Pending);
        assert_eq!(p.fraction(), 0.0);
        p.start(Stage::PairPass, 4);
        p.tick();
        assert!((p.fraction() - 0.25).abs() < 1e-12);
        p.start(Stage::Done, 0);
        assert_eq!(p.fraction(), 1.0);
    }

    #[test]
    fn test_observer_sees_every_stage() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let run = AnnotationRun::new(RunConfig::default())
            .unwrap()
            .with_observer(Arc::new(move |stage: Stage, _: f64| sink.lock().unwrap().push(stage)));
        let rows = vec![FeatureRow::new(1, 100.0, 1.0, 1), FeatureRow::new(2, 200.0, 1.0, 1)];
        assert!(!run.execute_with_threads(&rows, 1).unwrap().is_canceled());

        let mut stages = seen.lock().unwrap().clone();
        stages.dedup();
        assert_eq!(
            stages,
            vec![Stage::PairPass, Stage::Grouping, Stage::MsMsCheck, Stage::Networks, Stage::Refinement]
        );
    }

    #[test]
    fn test_duplicate_rows_are_rejected() {
        let rows = vec![FeatureRow::new(1, 100.0, 1.0, 1), FeatureRow::new(1, 200.0, 1.0, 1)];
        let run = AnnotationRun::new(RunConfig::default()).unwrap();
        assert!(matches!(run.execute(&rows), Err(CorrNetError::DuplicateRow(1))));
    }

    #[test]
    fn test_empty_input_finishes() {
        let run = AnnotationRun::new(RunConfig::default()).unwrap();
        let outcome = run.execute_with_threads(&[], 2).unwrap();
        assert!(!outcome.is_canceled());
        assert!(outcome.results().networks.is_empty());
        assert_eq!(run.progress().stage(), Stage::Done);
    }
}
