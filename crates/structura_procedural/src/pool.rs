//! # Generation Pool
//!
//! Runs many structure placements in parallel.
//!
//! ## Architecture
//!
//! ```text
//!   submit() ──> [Job Queue] ──> Worker 0 (generator + cache) ──┐
//!                 (FIFO)     ──> Worker 1 (generator + cache) ──┼──> results()
//!                            ──> Worker N (generator + cache) ──┘
//! ```
//!
//! A generator is not `Send`, so every worker builds its own from the shared
//! grammar and provider. Each worker also owns its value cache; nothing mutable
//! is shared between workers except the job queue.
//!
//! Results arrive in completion order. Their content does not depend on which
//! worker ran the job.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use structura_core::{BlockPos, Grammar, RuleId, Seed};

use crate::config::{GeneratorConfig, StructuraConfig};
use crate::error::SearchFailure;
use crate::eval::FieldProvider;
use crate::generator::StructureGenerator;
use crate::output::StructureOutput;

/// One placement request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacementJob {
    /// Caller-chosen identifier, echoed in the result.
    pub id: u64,
    /// Entry rule.
    pub rule: RuleId,
    /// World origin.
    pub origin: BlockPos,
    /// Placement seed.
    pub seed: Seed,
}

/// Outcome of one placement.
#[derive(Debug)]
pub struct PlacementResult {
    /// The job.
    pub job: PlacementJob,
    /// Generated blocks, or why the search gave up.
    pub outcome: Result<StructureOutput, SearchFailure>,
    /// Expansion attempts the search made.
    pub expansion_count: u32,
    /// Components placed.
    pub component_count: usize,
    /// Worker that ran the job.
    pub worker: usize,
}

/// Pending jobs plus the count of jobs not yet finished.
struct JobQueue {
    jobs: Mutex<VecDeque<PlacementJob>>,
    not_empty: Condvar,
    outstanding: Mutex<usize>,
    idle: Condvar,
}

impl JobQueue {
    fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            outstanding: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    fn push(&self, job: PlacementJob) {
        *self.outstanding.lock() += 1;
        self.jobs.lock().push_back(job);
        self.not_empty.notify_one();
    }

    /// Blocks for the next job; `None` once shut down and drained.
    fn pop(&self, shutdown: &AtomicBool) -> Option<PlacementJob> {
        let mut jobs = self.jobs.lock();
        loop {
            if let Some(job) = jobs.pop_front() {
                return Some(job);
            }
            if shutdown.load(Ordering::Acquire) {
                return None;
            }
            self.not_empty.wait(&mut jobs);
        }
    }

    fn finish(&self) {
        let mut outstanding = self.outstanding.lock();
        *outstanding -= 1;
        if *outstanding == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut outstanding = self.outstanding.lock();
        while *outstanding > 0 {
            self.idle.wait(&mut outstanding);
        }
    }
}

/// Fixed-size pool of generation workers.
pub struct GenerationPool {
    queue: Arc<JobQueue>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    results: Receiver<PlacementResult>,
    thread_count: usize,
}

impl GenerationPool {
    /// Spawns the workers.
    #[must_use]
    pub fn new(grammar: Arc<Grammar>, provider: Arc<dyn FieldProvider>, config: StructuraConfig) -> Self {
        let thread_count = config.pool.resolved_threads();
        let queue = Arc::new(JobQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let (sender, results) = unbounded();

        let workers = (0..thread_count)
            .map(|worker| {
                let queue = Arc::clone(&queue);
                let shutdown = Arc::clone(&shutdown);
                let grammar = Arc::clone(&grammar);
                let provider = Arc::clone(&provider);
                let sender = sender.clone();
                let generator_config = config.generator;

                thread::spawn(move || {
                    Self::worker_loop(worker, &queue, &shutdown, grammar, provider, generator_config, &sender);
                })
            })
            .collect();

        tracing::info!(threads = thread_count, "generation pool started");

        Self {
            queue,
            shutdown,
            workers,
            results,
            thread_count,
        }
    }

    fn worker_loop(
        worker: usize,
        queue: &JobQueue,
        shutdown: &AtomicBool,
        grammar: Arc<Grammar>,
        provider: Arc<dyn FieldProvider>,
        config: GeneratorConfig,
        results: &Sender<PlacementResult>,
    ) {
        let mut generator = StructureGenerator::new(grammar, provider, config);

        while let Some(job) = queue.pop(shutdown) {
            // setup() resets all search state, so the generator is reusable after a panic
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                generator.generate(job.rule, job.origin, job.seed)
            }))
            .unwrap_or_else(|_| {
                tracing::error!(worker, job = job.id, "structure search panicked");
                Err(SearchFailure::Panicked)
            });
            let result = PlacementResult {
                job,
                outcome,
                expansion_count: generator.expansion_count(),
                component_count: generator.components().len(),
                worker,
            };

            // The receiver lives as long as the pool; a send only fails during teardown
            let _ = results.send(result);
            queue.finish();
        }

        let stats = generator.cache_stats();
        tracing::debug!(
            worker,
            hits = stats.hits,
            misses = stats.misses,
            evictions = stats.evictions,
            "generation worker stopped"
        );
    }

    /// Queues a placement.
    pub fn submit(&self, job: PlacementJob) {
        self.queue.push(job);
    }

    /// Results in completion order.
    #[must_use]
    pub fn results(&self) -> &Receiver<PlacementResult> {
        &self.results
    }

    /// Blocks until every submitted job has produced its result.
    pub fn wait_idle(&self) {
        self.queue.wait_idle();
    }

    /// Number of workers.
    #[must_use]
    pub const fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Finishes queued jobs, then stops and joins the workers. Idempotent.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.shutdown.store(true, Ordering::Release);
        {
            // Hold the lock so no worker misses the wakeup between check and wait
            let _jobs = self.queue.jobs.lock();
            self.queue.not_empty.notify_all();
        }

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("generation worker panicked");
            }
        }
        tracing::info!("generation pool stopped");
    }
}

impl Drop for GenerationPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::demo::{settlement_grammar, DemoTerrain, SETTLEMENT_RULE};
    use std::time::Duration;
    use structura_core::{Dimensionality, ExternalId, Sample};

    fn pool(threads: usize) -> (GenerationPool, Arc<Grammar>, RuleId) {
        let grammar = Arc::new(settlement_grammar().expect("demo grammar"));
        let rule = grammar.find_rule(SETTLEMENT_RULE).expect("entry rule");
        let config = StructuraConfig {
            pool: PoolConfig {
                threads: Some(threads),
                ..PoolConfig::default()
            },
            ..StructuraConfig::default()
        };
        let pool = GenerationPool::new(Arc::clone(&grammar), Arc::new(DemoTerrain::default()), config);
        (pool, grammar, rule)
    }

    #[test]
    fn test_every_job_reports() {
        let (pool, _, rule) = pool(3);
        assert_eq!(pool.thread_count(), 3);

        for id in 0..12 {
            pool.submit(PlacementJob {
                id,
                rule,
                origin: BlockPos::new(id as i32 * 64, 66, 0),
                seed: 5,
            });
        }
        pool.wait_idle();

        let mut ids: Vec<u64> = pool.results().try_iter().map(|r| r.job.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
    }

    struct BrokenTerrain;

    impl FieldProvider for BrokenTerrain {
        fn dimensionality(&self, _field: ExternalId) -> Dimensionality {
            Dimensionality::Varying
        }

        fn sample(&self, _field: ExternalId, _pos: BlockPos) -> Sample {
            panic!("terrain unavailable");
        }
    }

    #[test]
    fn test_panicking_job_still_reports() {
        let grammar = Arc::new(settlement_grammar().expect("demo grammar"));
        let rule = grammar.find_rule(SETTLEMENT_RULE).expect("entry rule");
        let config = StructuraConfig {
            pool: PoolConfig {
                threads: Some(1),
                ..PoolConfig::default()
            },
            ..StructuraConfig::default()
        };
        let pool = Arc::new(GenerationPool::new(grammar, Arc::new(BrokenTerrain), config));

        for id in 0..2 {
            pool.submit(PlacementJob {
                id,
                rule,
                origin: BlockPos::new(0, 64, 0),
                seed: 1,
            });
        }

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let waiter = Arc::clone(&pool);
        thread::spawn(move || {
            waiter.wait_idle();
            let _ = done_tx.send(());
        });
        assert!(
            done_rx.recv_timeout(Duration::from_secs(10)).is_ok(),
            "wait_idle did not return"
        );

        let outcomes: Vec<_> = pool.results().try_iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(o, Err(SearchFailure::Panicked))));
    }

    #[test]
    fn test_wait_idle_without_jobs() {
        let (pool, _, _) = pool(1);
        pool.wait_idle();
        assert!(pool.results().is_empty());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (mut pool, _, rule) = pool(2);
        pool.submit(PlacementJob {
            id: 1,
            rule,
            origin: BlockPos::new(0, 68, 0),
            seed: 1,
        });
        pool.shutdown();
        pool.shutdown();

        // Queued work is finished before the workers exit
        assert_eq!(pool.results().try_iter().count(), 1);
    }
}
