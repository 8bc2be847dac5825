//! Resource-aware scheduling of game pairs.
//!
//! A batch runs `concurrency` game pairs at a time until the planned number
//! of pairs has completed. Workers talk to the supervising task only through
//! two channels, one for results and one for fatal errors, so the
//! [`ResultAggregate`] and the worker counters have a single owner.
//!
//! The first fatal error aborts every running worker and is returned; results
//! of pairs still in flight are discarded.

use crate::game_pair::{EngineSetup, GamePair, GameRecord, GameResult, Launcher};
use crate::session::SessionError;
use crate::AdapterError;
use engine_com::test_flow::GameLogs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Memory reserved per running pair on top of both hash tables, in MiB.
pub const FIXED_OVERHEAD_MB: u64 = 512;

/// What the host can offer to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    /// Logical cores.
    pub cores: usize,
    /// Usable memory in MiB.
    pub memory_mb: u64,
}

/// Number of game pairs that fit side by side on `capacity`.
///
/// The smaller of the CPU bound (`cores / max threads`) and the memory bound
/// (`memory / (hash A + hash B + overhead)`) wins. Never less than one.
pub fn concurrency(engines: &[EngineSetup; 2], capacity: Capacity) -> usize {
    let max_threads = engines[0].threads.max(engines[1].threads).max(1) as usize;
    let per_slot_mb =
        u64::from(engines[0].hash) + u64::from(engines[1].hash) + FIXED_OVERHEAD_MB;

    let cpu_bound = capacity.cores / max_threads;
    let memory_bound = usize::try_from(capacity.memory_mb / per_slot_mb).unwrap_or(usize::MAX);

    cpu_bound.min(memory_bound).max(1)
}

/// Smallest multiple of `concurrency` that covers `batch_size`, at least
/// one full round.
pub fn planned_pairs(concurrency: usize, batch_size: usize) -> usize {
    let concurrency = concurrency.max(1);
    batch_size.div_ceil(concurrency).max(1) * concurrency
}

/// Everything a batch needs, fixed when the batch starts.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub session: String,
    pub engines: Arc<[EngineSetup; 2]>,
    concurrency: usize,
}

impl BatchContext {
    /// Create the context, computing its concurrency from `capacity` once.
    pub fn new(session: impl Into<String>, engines: [EngineSetup; 2], capacity: Capacity) -> Self {
        let concurrency = concurrency(&engines, capacity);
        Self {
            session: session.into(),
            engines: Arc::new(engines),
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

/// Running totals of a batch.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregate {
    /// Completed game pairs.
    pub pairs: usize,
    /// Completed games, two per pair.
    pub games: usize,
    pub records: Vec<GameRecord>,
    /// Engine transcripts, parallel to `records`.
    pub logs: Vec<GameLogs>,
}

impl ResultAggregate {
    fn merge(&mut self, pair: [GameResult; 2]) {
        self.pairs += 1;
        for game in pair {
            self.games += 1;
            self.records.push(game.record);
            self.logs.push(game.logs);
        }
    }
}

/// Runs batches of game pairs.
pub struct Dispatcher {
    launcher: Arc<dyn Launcher>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            timeout: None,
        }
    }

    /// Read timeout for every engine session of every batch.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Play at least `batch_size` pairs, rounded up to full rounds.
    pub async fn run(
        &self,
        batch: &BatchContext,
        batch_size: usize,
    ) -> Result<ResultAggregate, AdapterError> {
        let target = planned_pairs(batch.concurrency, batch_size);
        tracing::info!(
            "Batch {}: {} pairs, {} at a time",
            batch.session,
            target,
            batch.concurrency
        );

        let pair = GamePair::new(self.launcher.clone(), batch.engines.clone())
            .with_timeout(self.timeout);
        let (result_tx, mut result_rx) = mpsc::channel::<[GameResult; 2]>(1);
        let (error_tx, mut error_rx) = mpsc::channel::<SessionError>(1);

        let mut workers = JoinSet::new();
        let spawn_worker = |workers: &mut JoinSet<()>| {
            let pair = pair.clone();
            let result_tx = result_tx.clone();
            let error_tx = error_tx.clone();
            workers.spawn(async move {
                match pair.play().await {
                    Ok(result) => {
                        let _ = result_tx.send(result).await;
                    }
                    Err(e) => {
                        let _ = error_tx.send(e).await;
                    }
                }
            });
        };

        let mut active = 0;
        let mut finished = 0;
        let mut aggregate = ResultAggregate::default();

        for _ in 0..batch.concurrency.min(target) {
            spawn_worker(&mut workers);
            active += 1;
        }

        while active > 0 {
            tokio::select! {
                Some(result) = result_rx.recv() => {
                    active -= 1;
                    finished += 1;
                    aggregate.merge(result);
                    tracing::debug!("Pair {}/{} finished", finished, target);

                    if finished + active < target {
                        spawn_worker(&mut workers);
                        active += 1;
                    }
                }
                Some(error) = error_rx.recv() => {
                    tracing::error!("Batch {} aborted: {}", batch.session, error);
                    workers.abort_all();
                    return Err(AdapterError::Session(error));
                }
                Some(joined) = workers.join_next() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!("Batch {} aborted: worker panicked", batch.session);
                            workers.abort_all();
                            return Err(AdapterError::WorkerPanicked(e.to_string()));
                        }
                    }
                }
            }
        }

        tracing::info!(
            "Batch {} complete: {} games",
            batch.session,
            aggregate.games
        );
        Ok(aggregate)
    }
}
