//! Batch generation: walks from every start label, round after round.

use crate::corpus::{CollectSink, WalkSink};
use crate::error::{Result, WalkError};
use crate::graph::{LabelId, PushdownGraph};
use crate::random_walk::{Walk, WalkConfig, Walker};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub rounds: usize,
    pub walks: usize,
    pub written: usize,
    pub degenerate: usize,
}

pub struct BatchOrchestrator<'g> {
    walker: Walker<'g>,
    config: WalkConfig,
    cancel: Option<Arc<AtomicBool>>,
    #[cfg(feature = "parallel")]
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl<'g> BatchOrchestrator<'g> {
    pub fn new(graph: &'g PushdownGraph, config: WalkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            walker: Walker::from_config(graph, &config),
            config,
            cancel: None,
            #[cfg(feature = "parallel")]
            pool: None,
        })
    }

    /// Runs parallel batches on `pool` instead of the global rayon pool.
    #[cfg(feature = "parallel")]
    pub fn with_thread_pool(mut self, pool: Arc<rayon::ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Stops dispatching new rounds once `flag` is set. Walks already in
    /// flight finish normally.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &WalkConfig {
        &self.config
    }

    /// Sequential generation from a single RNG seeded with `config.seed`.
    /// Output is byte-identical across runs for the same graph and seed.
    pub fn generate_all<S: WalkSink + ?Sized>(&self, sink: &mut S) -> Result<BatchStats> {
        let graph = self.walker.graph();
        let rounds = self.config.walks_per_label;
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut labels: Vec<LabelId> = graph.start_labels().to_vec();
        let mut stats = BatchStats::default();

        for round in 0..rounds {
            self.check_cancelled()?;
            tracing::info!(round = round + 1, rounds, "starting walk round");
            labels.shuffle(&mut rng);
            for &label in &labels {
                tracing::debug!(label = graph.labels().get(label).unwrap_or("?"), "walking");
                let walk = self.walker.walk(Some(label), self.config.max_edges, &mut rng)?;
                self.emit(sink, &walk, &mut stats)?;
            }
            stats.rounds += 1;
        }
        Ok(stats)
    }

    /// In-memory variant of [`Self::generate_all`].
    pub fn collect_all(&self) -> Result<Vec<Vec<String>>> {
        let mut sink = CollectSink::default();
        self.generate_all(&mut sink)?;
        Ok(sink.walks)
    }

    /// Parallel generation on the rayon pool.
    ///
    /// Each round owns an RNG seeded from `(seed, round)` only, so the walks
    /// of a round do not depend on the thread count. Finished rounds are
    /// written in completion order; a round's walks keep their order.
    #[cfg(feature = "parallel")]
    pub fn generate_all_parallel<S: WalkSink + ?Sized>(&self, sink: &mut S) -> Result<BatchStats> {
        use rayon::prelude::*;
        use std::sync::mpsc;

        let rounds = self.config.walks_per_label;
        let workers = match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        };
        let (tx, rx) = mpsc::sync_channel::<Vec<Walk>>(workers * 2);
        let mut stats = BatchStats::default();

        std::thread::scope(|scope| {
            let producer = scope.spawn(move || {
                let produce = move || {
                    (0..rounds)
                        .into_par_iter()
                        .try_for_each_with(tx, |tx, round| {
                            self.check_cancelled()?;
                            tracing::info!(round = round + 1, rounds, "starting walk round");
                            let walks = self.run_round(round)?;
                            // A closed receiver means the collector gave up.
                            tx.send(walks).map_err(|_| WalkError::Cancelled)
                        })
                };
                match &self.pool {
                    Some(pool) => pool.install(produce),
                    None => produce(),
                }
            });

            let mut sink_result = Ok(());
            for walks in rx.iter() {
                sink_result = walks
                    .iter()
                    .try_for_each(|walk| self.emit(sink, walk, &mut stats));
                if sink_result.is_err() {
                    break;
                }
                stats.rounds += 1;
            }
            drop(rx);

            let produced = match producer.join() {
                Ok(r) => r,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            sink_result?;
            produced
        })?;
        Ok(stats)
    }

    #[cfg(feature = "parallel")]
    fn run_round(&self, round: usize) -> Result<Vec<Walk>> {
        let mut rng = ChaCha8Rng::seed_from_u64(mix64(self.config.seed ^ round as u64));
        let mut labels: Vec<LabelId> = self.walker.graph().start_labels().to_vec();
        labels.shuffle(&mut rng);
        labels
            .iter()
            .map(|&label| self.walker.walk(Some(label), self.config.max_edges, &mut rng))
            .collect()
    }

    fn emit<S: WalkSink + ?Sized>(&self, sink: &mut S, walk: &Walk, stats: &mut BatchStats) -> Result<()> {
        stats.walks += 1;
        sink.record_max_distance(walk.max_stack_distance)?;
        if walk.is_degenerate() {
            stats.degenerate += 1;
            return Ok(());
        }
        sink.write_walk(&walk.labels(self.walker.graph().labels()))?;
        stats.written += 1;
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(WalkError::Cancelled),
            _ => Ok(()),
        }
    }
}

#[cfg(feature = "parallel")]
fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x ^= x >> 31;
    x
}
