//! Loading simulator: walks a viewer across a flat world and drives the
//! holders through the real worker pipeline.
//!
//! Usage: cargo run --release --bin simulate_loading -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>   JSON LoadConfig (default: built-in defaults)
//!   --steps <N>       Chunks the viewer walks along x (default: 8)
//!   --radius <R>      Ticket radius in chunks (default: 6)
//!   --ground <Y>      Flat ground height (default: 64)
//!   --settle <N>      Ticks per step (default: 20)
//!   --verbose         Log at debug level unless RUST_LOG is set

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use stagehold::core::{logging, ChunkPos, IVec3, LoadConfig, LoadError};
use stagehold::holder::{Tier, ENTITY_TICKING_LEVEL, UNLOADED_LEVEL};
use stagehold::net::{Viewer, ViewerSet};
use stagehold::pipeline::{FlatGenerator, ImmediateTracker, WorkerPipeline};
use stagehold::world::HolderMap;

/// Chunks within this distance of the viewer tick entities
const ENTITY_TICKING_RADIUS: u32 = 2;

fn main() -> Result<(), LoadError> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--verbose") {
        logging::init_with("debug");
    } else {
        logging::init();
    }

    let config = match parse_arg::<PathBuf>(&args, "--config") {
        Some(path) => LoadConfig::from_json_file(&path)?,
        None => LoadConfig::default(),
    };
    let steps: i32 = parse_arg(&args, "--steps").unwrap_or(8);
    let radius: u32 = parse_arg(&args, "--radius").unwrap_or(6);
    let ground: i32 = parse_arg(&args, "--ground").unwrap_or(64);
    let settle: usize = parse_arg(&args, "--settle").unwrap_or(20);

    let generator = Arc::new(FlatGenerator::new(&config, ground)?);
    let pipeline = Arc::new(WorkerPipeline::new(&config, generator)?);
    let mut map = HolderMap::new(config, pipeline.clone())?;
    let mut tracker = ImmediateTracker::new();

    log::info!("Simulating {} steps with ticket radius {}", steps, radius);
    let start = Instant::now();

    for step in 0..=steps {
        let center = ChunkPos::new(step, 0);
        assign_levels(&mut map, center, radius)?;
        run_ticks(&mut map, &mut tracker, settle);

        let mut viewers = ViewerSet::new();
        viewers.add(Viewer::new(0, center, radius));
        let block = IVec3::new(center.x * 16 + 3, ground + 1, 5);
        map.block_changed(block);
        let sent = map.broadcast_changes(&viewers);

        let ticking = count_tier(&map, center, radius, Tier::Ticking);
        log::info!(
            "Step {}: {} holders, {} ticking, {} messages sent",
            step,
            map.len(),
            ticking,
            sent
        );
    }

    // Walk away so every holder unloads and retires
    for pos in map.positions() {
        map.set_level(pos, UNLOADED_LEVEL)?;
    }
    let mut retired = Vec::new();
    for _ in 0..settle {
        map.tick(&mut tracker);
        retired.extend(map.drain_retired());
        if map.is_empty() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    let saved = retired
        .iter()
        .filter(|holder| holder.saving.peek().flatten().is_some_and(|unit| unit.is_unsaved()))
        .count();
    log::info!(
        "Retired {} holders ({} with unsaved units) in {:.2?}; {} failures, {} teardowns, {} discarded",
        retired.len(),
        saved,
        start.elapsed(),
        pipeline.failures(),
        pipeline.teardowns(),
        pipeline.discarded()
    );
    if !map.is_empty() {
        log::warn!("{} holders still loaded", map.len());
    }
    Ok(())
}

/// Ticket level for a chunk `distance` chunks from the viewer
fn level_for(distance: u32, radius: u32) -> u32 {
    if distance > radius {
        return UNLOADED_LEVEL;
    }
    (ENTITY_TICKING_LEVEL + distance.saturating_sub(ENTITY_TICKING_RADIUS)).min(UNLOADED_LEVEL)
}

fn assign_levels(map: &mut HolderMap, center: ChunkPos, radius: u32) -> Result<(), LoadError> {
    let mut positions: BTreeSet<ChunkPos> = map.positions().into_iter().collect();
    let reach = radius as i32;
    for x in -reach..=reach {
        for z in -reach..=reach {
            positions.insert(ChunkPos::new(center.x + x, center.z + z));
        }
    }
    for pos in positions {
        map.set_level(pos, level_for(center.chessboard_distance(pos), radius))?;
    }
    Ok(())
}

fn run_ticks(map: &mut HolderMap, tracker: &mut ImmediateTracker, ticks: usize) {
    for _ in 0..ticks {
        let stats = map.tick(tracker);
        log::debug!("{:?}", stats);
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn count_tier(map: &HolderMap, center: ChunkPos, radius: u32, tier: Tier) -> usize {
    let reach = radius as i32;
    let mut count = 0;
    for x in -reach..=reach {
        for z in -reach..=reach {
            let pos = ChunkPos::new(center.x + x, center.z + z);
            if map.holder(pos).is_some_and(|holder| holder.loaded_tier() >= tier) {
                count += 1;
            }
        }
    }
    count
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
