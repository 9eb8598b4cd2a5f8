//! Stage pipeline backed by a tokio worker pool

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{mpsc, Semaphore};

use crate::chunk::{ChunkAccess, ChunkRef, LevelChunk, ProtoChunk};
use crate::core::config::LoadConfig;
use crate::core::error::LoadError;
use crate::core::types::ChunkPos;
use crate::holder::promise::Promise;
use crate::holder::status::{Stage, StageResult, Tier};
use crate::pipeline::{StageFuture, StageGenerator, StagePipeline};

/// State shared between the pipeline handle and its in-flight tasks
struct Shared {
    /// Runtime that generation tasks are spawned on
    handle: Handle,
    generator: Arc<dyn StageGenerator>,
    /// Bounds concurrent generations
    permits: Arc<Semaphore>,
    /// In-progress chunk per column, shared by all of its stages
    protos: Mutex<HashMap<ChunkPos, Arc<ProtoChunk>>>,
    /// Finalized unit per column until the column is released
    finalized: Mutex<HashMap<ChunkPos, ChunkRef>>,
    /// Sender for finalized units awaiting `drain_finalized`
    finalized_tx: mpsc::UnboundedSender<ChunkRef>,
    /// Generations that returned an error
    failures: AtomicUsize,
    /// Tier demotions of loaded units
    teardowns: AtomicUsize,
    /// Generations finished after their column was released or demoted
    discarded: AtomicUsize,
}

impl Shared {
    fn proto(&self, pos: ChunkPos) -> Arc<ProtoChunk> {
        self.protos
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(pos)
            .or_insert_with(|| Arc::new(ProtoChunk::new(pos)))
            .clone()
    }

    fn finalized_unit(&self, pos: ChunkPos) -> Option<ChunkRef> {
        self.finalized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pos)
            .cloned()
    }

    /// Generate `stage` for `pos` on the pool, unless already satisfied
    fn schedule(self: &Arc<Self>, pos: ChunkPos, stage: Stage, target: StageFuture) {
        if target.is_done() {
            return;
        }
        if let Some(unit) = self.finalized_unit(pos) {
            target.complete(StageResult::Loaded(unit));
            return;
        }
        let proto = self.proto(pos);
        if stage < Stage::Full && proto.stage().is_or_after(stage) {
            target.complete(StageResult::Loaded(proto));
            return;
        }

        let shared = Arc::clone(self);
        self.handle.spawn(async move {
            let Ok(_permit) = Arc::clone(&shared.permits).acquire_owned().await else {
                target.complete(StageResult::Unloaded);
                return;
            };
            // Demoted while queued
            if target.is_done() {
                return;
            }

            let generator = Arc::clone(&shared.generator);
            let chunk = Arc::clone(&proto);
            let outcome = tokio::task::spawn_blocking(move || generator.generate(&chunk, stage)).await;
            match outcome {
                Ok(Ok(())) => shared.finish(pos, stage, proto, &target),
                Ok(Err(err)) => shared.fail(&target, err),
                Err(join_err) => shared.fail(
                    &target,
                    LoadError::Generation {
                        pos,
                        stage,
                        reason: join_err.to_string(),
                    },
                ),
            }
        });
    }

    fn finish(&self, pos: ChunkPos, stage: Stage, proto: Arc<ProtoChunk>, target: &StageFuture) {
        // Held until the finalized unit is cached so `release` cannot interleave
        let protos = self.protos.lock().unwrap_or_else(PoisonError::into_inner);
        let released = !protos.get(&pos).is_some_and(|current| Arc::ptr_eq(current, &proto));
        if released || (stage == Stage::Full && target.is_done()) {
            drop(protos);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            log::debug!("Discarded {:?} for {:?} (released: {})", stage, pos, released);
            target.complete(StageResult::Unloaded);
            return;
        }

        proto.advance_to(stage);
        if stage != Stage::Full {
            drop(protos);
            target.complete(StageResult::Loaded(proto));
            return;
        }

        let unit: ChunkRef = Arc::new(LevelChunk::from_proto(&proto));
        self.finalized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pos, unit.clone());
        drop(protos);
        // Receiver lives as long as the pipeline; a closed channel means shutdown
        let _ = self.finalized_tx.send(unit.clone());
        log::debug!("Finalized {:?}", pos);
        target.complete(StageResult::Loaded(unit));
    }

    fn fail(&self, target: &StageFuture, err: LoadError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        log::warn!("{}", err);
        target.complete(StageResult::Unloaded);
    }
}

/// Runs a [`StageGenerator`] for each requested stage on a tokio pool.
///
/// Stage work starts once the parent stage resolves loaded, at most
/// `max_concurrent_generations` at a time. Finalized units are queued for
/// [`StagePipeline::drain_finalized`].
pub struct WorkerPipeline {
    shared: Arc<Shared>,
    finalized_rx: Mutex<mpsc::UnboundedReceiver<ChunkRef>>,
    /// Runtime owned by this pipeline, if it was not given a handle
    runtime: Option<Runtime>,
}

impl WorkerPipeline {
    /// Create a pipeline with its own runtime of `worker_threads` threads
    pub fn new(config: &LoadConfig, generator: Arc<dyn StageGenerator>) -> Result<Self, LoadError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("stagehold-worker")
            .build()?;
        let mut pipeline = Self::with_handle(config, generator, runtime.handle().clone());
        pipeline.runtime = Some(runtime);
        log::info!(
            "Worker pipeline started with {} threads, {} concurrent generations",
            config.worker_threads,
            config.max_concurrent_generations
        );
        Ok(pipeline)
    }

    /// Create a pipeline that spawns onto an existing runtime
    pub fn with_handle(config: &LoadConfig, generator: Arc<dyn StageGenerator>, handle: Handle) -> Self {
        let (finalized_tx, finalized_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                handle,
                generator,
                permits: Arc::new(Semaphore::new(config.max_concurrent_generations)),
                protos: Mutex::new(HashMap::new()),
                finalized: Mutex::new(HashMap::new()),
                finalized_tx,
                failures: AtomicUsize::new(0),
                teardowns: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
            }),
            finalized_rx: Mutex::new(finalized_rx),
            runtime: None,
        }
    }

    /// Generations that ended in an error
    pub fn failures(&self) -> usize {
        self.shared.failures.load(Ordering::Relaxed)
    }

    /// Tier demotions of loaded units
    pub fn teardowns(&self) -> usize {
        self.shared.teardowns.load(Ordering::Relaxed)
    }

    /// Generations whose result was dropped because the column was released,
    /// or because a full stage was no longer wanted when it finished
    pub fn discarded(&self) -> usize {
        self.shared.discarded.load(Ordering::Relaxed)
    }

    /// Columns with cached generation state
    pub fn cached_count(&self) -> usize {
        self.shared
            .protos
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn follow(prerequisite: &StageFuture) -> StageFuture {
        prerequisite.map(StageResult::clone)
    }
}

impl StagePipeline for WorkerPipeline {
    fn request_stage(&self, pos: ChunkPos, stage: Stage, parent: Option<&StageFuture>) -> StageFuture {
        let Some(parent) = parent else {
            return Promise::completed(StageResult::Loaded(self.shared.proto(pos)));
        };

        let target = Promise::new();
        let shared = Arc::clone(&self.shared);
        let pending = target.clone();
        parent.on_complete(move |result| {
            if result.is_loaded() {
                shared.schedule(pos, stage, pending);
            } else {
                pending.complete(StageResult::Unloaded);
            }
        });
        target
    }

    fn request_accessible(&self, _pos: ChunkPos, full: &StageFuture) -> StageFuture {
        Self::follow(full)
    }

    fn request_ticking(&self, _pos: ChunkPos, accessible: &StageFuture) -> StageFuture {
        Self::follow(accessible)
    }

    fn request_entity_ticking(&self, _pos: ChunkPos, ticking: &StageFuture) -> StageFuture {
        Self::follow(ticking)
    }

    fn teardown(&self, pos: ChunkPos, tier: Tier, _unit: &ChunkRef) {
        self.shared.teardowns.fetch_add(1, Ordering::Relaxed);
        log::debug!("{:?} left {:?}", pos, tier);
    }

    fn drain_finalized(&self) -> Vec<ChunkRef> {
        let mut rx = self.finalized_rx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut units = Vec::new();
        while let Ok(unit) = rx.try_recv() {
            units.push(unit);
        }
        units
    }

    fn release(&self, pos: ChunkPos) {
        let mut protos = self.shared.protos.lock().unwrap_or_else(PoisonError::into_inner);
        protos.remove(&pos);
        self.shared
            .finalized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pos);
    }
}

impl Drop for WorkerPipeline {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::same_unit;
    use crate::holder::table::unloaded_future;
    use crate::holder::test_support::{wait_until, GatedGenerator, MARKER};
    use crate::pipeline::FlatGenerator;
    use std::time::Duration;

    const POS: ChunkPos = ChunkPos { x: 2, z: -1 };

    struct FailAt(Stage);

    impl StageGenerator for FailAt {
        fn generate(&self, chunk: &ProtoChunk, stage: Stage) -> Result<(), LoadError> {
            if stage == self.0 {
                return Err(LoadError::Generation {
                    pos: chunk.pos(),
                    stage,
                    reason: "test failure".into(),
                });
            }
            Ok(())
        }
    }

    fn pipeline(generator: Arc<dyn StageGenerator>) -> WorkerPipeline {
        WorkerPipeline::new(&LoadConfig::default(), generator).expect("runtime")
    }

    fn flat() -> Arc<dyn StageGenerator> {
        Arc::new(FlatGenerator::new(&LoadConfig::default(), 64).expect("valid ground"))
    }

    fn wait_for(future: &StageFuture) -> StageResult {
        for _ in 0..500 {
            if let Some(result) = future.peek() {
                return result;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("future did not resolve");
    }

    fn request_chain(pipeline: &WorkerPipeline, up_to: Stage) -> Vec<StageFuture> {
        let mut futures: Vec<StageFuture> = Vec::new();
        for stage in Stage::ALL.into_iter().take(up_to.index() + 1) {
            let future = pipeline.request_stage(POS, stage, futures.last());
            futures.push(future);
        }
        futures
    }

    #[test]
    fn test_empty_resolves_immediately() {
        let pipeline = pipeline(flat());
        let empty = pipeline.request_stage(POS, Stage::Empty, None);
        let unit = empty.peek().and_then(|r| r.unit().cloned()).expect("loaded");
        assert_eq!(unit.pos(), POS);
        assert_eq!(pipeline.cached_count(), 1);
    }

    #[test]
    fn test_full_chain_finalizes() {
        let pipeline = pipeline(flat());
        let futures = request_chain(&pipeline, Stage::Full);

        let surface = wait_for(&futures[Stage::Surface.index()]);
        assert!(surface.unit().is_some_and(|unit| unit.stage().is_or_after(Stage::Surface)));

        let full = wait_for(&futures[Stage::Full.index()]);
        let unit = full.unit().cloned().expect("loaded");
        assert!(unit.is_finalized());

        let finalized = pipeline.drain_finalized();
        assert_eq!(finalized.len(), 1);
        assert!(same_unit(&finalized[0], &unit));
        assert!(pipeline.drain_finalized().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_with_handle_on_current_runtime() {
        let pipeline = WorkerPipeline::with_handle(&LoadConfig::default(), flat(), Handle::current());
        let futures = request_chain(&pipeline, Stage::Surface);
        let surface = &futures[Stage::Surface.index()];
        for _ in 0..500 {
            if surface.is_done() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(surface.peek().is_some_and(|result| result.is_loaded()));
    }

    #[test]
    fn test_unloaded_parent_skips_generation() {
        let pipeline = pipeline(flat());
        let future = pipeline.request_stage(POS, Stage::Biomes, Some(&unloaded_future()));
        assert!(matches!(future.peek(), Some(StageResult::Unloaded)));
        assert_eq!(pipeline.cached_count(), 0);
    }

    #[test]
    fn test_failure_resolves_unloaded_and_counts_once() {
        let pipeline = pipeline(Arc::new(FailAt(Stage::Noise)));
        let futures = request_chain(&pipeline, Stage::Carvers);

        assert!(wait_for(&futures[Stage::Biomes.index()]).is_loaded());
        assert!(!wait_for(&futures[Stage::Noise.index()]).is_loaded());
        assert!(!wait_for(&futures[Stage::Carvers.index()]).is_loaded());
        assert_eq!(pipeline.failures(), 1);
    }

    #[test]
    fn test_tier_requests_follow_prerequisite() {
        let pipeline = pipeline(flat());
        let unit: ChunkRef = Arc::new(ProtoChunk::new(POS));
        let prerequisite = Promise::new();

        let accessible = pipeline.request_accessible(POS, &prerequisite);
        assert!(!accessible.is_done());
        prerequisite.complete(StageResult::Loaded(unit.clone()));
        let result = accessible.peek().and_then(|r| r.unit().cloned()).expect("loaded");
        assert!(same_unit(&result, &unit));

        let ticking = pipeline.request_ticking(POS, &unloaded_future());
        assert!(matches!(ticking.peek(), Some(StageResult::Unloaded)));
    }

    #[test]
    fn test_teardown_counts() {
        let pipeline = pipeline(flat());
        let unit: ChunkRef = Arc::new(ProtoChunk::new(POS));
        pipeline.teardown(POS, Tier::Ticking, &unit);
        pipeline.teardown(POS, Tier::Border, &unit);
        assert_eq!(pipeline.teardowns(), 2);
    }

    #[test]
    fn test_rerequest_after_finalization_reuses_unit() {
        let pipeline = pipeline(flat());
        let futures = request_chain(&pipeline, Stage::Full);
        let full = wait_for(&futures[Stage::Full.index()]).unit().cloned().expect("loaded");
        pipeline.drain_finalized();

        let again = pipeline.request_stage(POS, Stage::Surface, Some(&futures[Stage::Noise.index()]));
        let unit = wait_for(&again).unit().cloned().expect("loaded");
        assert!(same_unit(&unit, &full));
        assert!(pipeline.drain_finalized().is_empty());

        pipeline.release(POS);
        assert_eq!(pipeline.cached_count(), 0);
    }

    #[test]
    fn test_full_finished_after_release_is_discarded() {
        let gate = Arc::new(GatedGenerator::new(Stage::Full));
        let pipeline = pipeline(gate.clone());
        let futures = request_chain(&pipeline, Stage::Full);
        wait_until(|| gate.entered());

        pipeline.release(POS);
        gate.open();
        assert!(!wait_for(&futures[Stage::Full.index()]).is_loaded());
        assert_eq!(pipeline.discarded(), 1);
        assert!(pipeline.drain_finalized().is_empty());
        assert!(pipeline.shared.finalized.lock().unwrap().is_empty());
        assert_eq!(pipeline.cached_count(), 0);

        // A new run at the same column starts from scratch
        let empty = pipeline.request_stage(POS, Stage::Empty, None);
        let unit = empty.peek().and_then(|r| r.unit().cloned()).expect("loaded");
        assert!(!unit.is_finalized());
        assert_eq!(unit.stage(), Stage::Empty);
    }

    #[test]
    fn test_full_finished_after_demotion_is_not_finalized() {
        let gate = Arc::new(GatedGenerator::new(Stage::Full));
        let pipeline = pipeline(gate.clone());
        let futures = request_chain(&pipeline, Stage::Full);
        wait_until(|| gate.entered());

        futures[Stage::Full.index()].complete(StageResult::Unloaded);
        gate.open();
        wait_until(|| pipeline.discarded() == 1);
        assert!(pipeline.drain_finalized().is_empty());

        let proto = pipeline.request_stage(POS, Stage::Empty, None);
        let proto = proto.peek().and_then(|r| r.unit().cloned()).expect("loaded");
        assert_eq!(proto.stage(), Stage::Spawn);
        assert_eq!(proto.block_state(GatedGenerator::marker_pos(POS)), MARKER);

        // Promoted again: full is generated afresh
        let again = pipeline.request_stage(POS, Stage::Full, Some(&futures[Stage::Spawn.index()]));
        let full = wait_for(&again).unit().cloned().expect("loaded");
        assert!(full.is_finalized());
        assert_eq!(full.block_state(GatedGenerator::marker_pos(POS)), MARKER);
        assert_eq!(pipeline.drain_finalized().len(), 1);
    }
}
