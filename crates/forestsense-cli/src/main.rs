//! `forestsense` – random pillar-field sensing simulator.
//!
//! This binary wires the whole stack together:
//!
//! 1. Initialises tracing and loads `~/.forestsense/config.toml` (defaults
//!    when absent), rejecting invalid configurations.
//! 2. Generates the random pillar field once and indexes it.
//! 3. Starts the pose listener and the WebSocket bridge.
//! 4. Runs the sensing loop until **Ctrl-C**.

mod config;

use colored::Colorize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use forestsense_middleware::{EventBus, Topic, WsBridge};
use forestsense_perception::{FieldGenerator, ObserverState, SpatialIndex};
use forestsense_runtime::{SensingLoop, init_tracing, run_pose_listener};
use forestsense_types::SenseError;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); FORESTSENSE_LOG_FORMAT=json switches
    // to newline-delimited JSON. The guard flushes OTLP spans on exit.
    let tracing_guard = init_tracing("forestsense");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load().and_then(|cfg| cfg.validate().map(|()| cfg)) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, path = %config::config_path().display(), "invalid configuration");
            std::process::exit(1);
        }
    };
    info!(
        path = %config::config_path().display(),
        span_export = tracing_guard.is_exporting(),
        ?cfg,
        "configuration loaded"
    );

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the sensing loop …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Async runtime ─────────────────────────────────────────────────────
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build Tokio runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(cfg, shutdown)) {
        error!(error = %e, "simulator stopped with an error");
        std::process::exit(1);
    }
    println!("{}", "  ✓ Exiting forestsense.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// Bootstrap
// ─────────────────────────────────────────────────────────────────────────────

async fn serve(cfg: config::Config, shutdown: Arc<AtomicBool>) -> Result<(), SenseError> {
    // Generate-then-serve: the field is complete before any task starts.
    let params = cfg.to_field_params();
    let generator = match cfg.seed {
        Some(seed) => FieldGenerator::with_seed(params, seed),
        None => FieldGenerator::new(params),
    };
    info!(seed = generator.seed(), obstacles = cfg.obstacle_num, "generating random map");
    let field = Arc::new(generator.generate());
    let index = Arc::new(SpatialIndex::build(field));

    let bus = EventBus::default();

    // Subscribe before the bridge accepts clients so no pose is missed.
    let observer = ObserverState::new(cfg.excluded_frames.iter().cloned());
    let reader = observer.reader();
    tokio::spawn(run_pose_listener(bus.subscribe_to(Topic::Odometry), observer));

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.bridge_port));
    println!("  Bridge listening on {}", format!("ws://{addr}").bold());
    let bridge = WsBridge::new(bus.clone());
    let sensing = SensingLoop::new(cfg.to_loop_config(), Some(index), reader, bus);

    // The bridge only returns on a bind failure; the loop returns on Ctrl-C.
    tokio::select! {
        result = bridge.run_ws_server(addr) => result?,
        ticks = sensing.run(shutdown) => info!(ticks, "simulator shut down"),
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}",
        "forestsense".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Random pillar-field sensing simulator");
    println!();
}
