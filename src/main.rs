//! # Room Allocation Main Entry Point
//!
//! Builds a play area, packs the initial room and lets a synthetic observer
//! walk through the generated layout on the scheduler's tick interval.

use clap::{Parser, ValueEnum};
use log::{error, info};
use room_allocation::{
    run_timed, AllocationConfig, AllocationResult, AreaShape, ArchetypeCatalog, RoomAllocator,
    RoomCatalog, StartPosition, Walkthrough,
};
use std::path::PathBuf;
#[cfg(feature = "dev-tools")]
use tracing::Level;

/// Play area shapes selectable from the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ShapeArg {
    Rect,
    Square,
    Triangle,
}

impl From<ShapeArg> for AreaShape {
    fn from(shape: ShapeArg) -> Self {
        match shape {
            ShapeArg::Rect => AreaShape::Rect,
            ShapeArg::Square => AreaShape::Square,
            ShapeArg::Triangle => AreaShape::Triangle,
        }
    }
}

/// Command line arguments for the room allocation engine.
#[derive(Parser, Debug)]
#[command(name = "room-allocation")]
#[command(about = "Just-in-time procedural room allocation inside a bounded play area")]
#[command(version)]
struct Args {
    /// Random seed for generation
    #[arg(short, long)]
    seed: Option<u64>,

    /// Engine configuration as JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Archetype catalog as JSON
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Room catalog as JSON
    #[arg(long)]
    rooms: Option<PathBuf>,

    /// Maximum scheduler ticks for the walkthrough
    #[arg(long, default_value_t = 500)]
    ticks: usize,

    /// Play area shape
    #[arg(long, value_enum)]
    shape: Option<ShapeArg>,

    /// Play area width in metres
    #[arg(long)]
    width: Option<f64>,

    /// Play area depth in metres
    #[arg(long)]
    depth: Option<f64>,

    /// Start the observer at the centre of the area instead of a corner
    #[arg(long)]
    centre: bool,

    /// Skip decorated rooms and walk bare archetypes
    #[arg(long)]
    archetypes_only: bool,

    /// Print every emitted event as a JSON line
    #[arg(long)]
    events: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> AllocationResult<()> {
    let args = Args::parse();

    initialize_logging(&args.log_level)?;

    info!("Starting room allocation v{}", room_allocation::VERSION);

    let config = build_config(&args)?;
    if args.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let catalog = match &args.catalog {
        Some(path) => ArchetypeCatalog::load(path)?,
        None => ArchetypeCatalog::standard(),
    };
    let rooms = match &args.rooms {
        Some(path) => RoomCatalog::load(path)?,
        None => RoomCatalog::standard(),
    };
    info!(
        "Loaded {} archetypes and {} rooms",
        catalog.len(),
        rooms.templates().len()
    );

    let seed = config.seed;
    let mut allocator = RoomAllocator::new(config, catalog, rooms);
    if let Err(e) = allocator.setup_area() {
        error!("Area setup failed: {}", e);
        return Err(e);
    }

    let mut walkthrough = Walkthrough::new(seed);
    let summary = run_timed(&mut allocator, &mut walkthrough, args.ticks).await?;

    if args.events {
        for event in allocator.drain_events() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    println!("{}", allocator.tree().describe());
    let tree = allocator.tree();
    let depth = tree
        .reachable()
        .into_iter()
        .filter_map(|node| tree.depth(node).ok())
        .max()
        .unwrap_or(0);
    let dead_ends: usize = allocator.registry().iter().map(|i| i.dead_end_count()).sum();
    info!(
        "Walkthrough {} after {} ticks: {} transitions, {} backtracks, {} rooms visited",
        if summary.finished { "finished" } else { "stopped" },
        summary.steps,
        summary.transitions,
        summary.backtracks,
        summary.rooms_visited
    );
    info!(
        "Tree has {} nodes, depth {}, {} dead ends",
        tree.node_count(),
        depth,
        dead_ends
    );
    Ok(())
}

/// Loads the configuration file, if any, and applies command line overrides.
fn build_config(args: &Args) -> AllocationResult<AllocationConfig> {
    let mut config = match &args.config {
        Some(path) => AllocationConfig::load(path)?,
        None => AllocationConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(shape) = args.shape {
        config.area.shape = shape.into();
    }
    if let Some(width) = args.width {
        config.area.width = width;
    }
    if let Some(depth) = args.depth {
        config.area.depth = depth;
    }
    if args.centre {
        config.start_position = StartPosition::Centre;
    }
    if args.archetypes_only {
        config.force_archetype_rendering = true;
    }
    Ok(config)
}

/// Initializes the logging system based on the specified log level.
fn initialize_logging(log_level: &str) -> AllocationResult<()> {
    #[cfg(feature = "dev-tools")]
    {
        let level = match log_level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .init();
    }

    #[cfg(not(feature = "dev-tools"))]
    {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .format_target(false)
            .init();
    }

    Ok(())
}
