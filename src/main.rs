//! tilemap-cache - A caching tile server for vector map clients.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilemap_cache::{
    config::Config,
    server::{create_router, RouterConfig},
    store::{ByteStore, DiskStore, MemoryStore},
    tile::{BitmapTable, CacheStore, SyntheticOrigin, TileService},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("tilemap-cache v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Server prefix: {}", config.server_prefix);
    info!(
        "  Memory tier: {}MB, {} groups",
        config.memory_bytes / (1024 * 1024),
        config.memory_entries
    );
    match config.cache_dir {
        Some(ref dir) => info!("  Disk tier: {}", dir.display()),
        None => warn!("  Disk tier: DISABLED - cache is lost on restart"),
    }
    info!(
        "  Batches: groups of {}, {}ms budget, {} origin attempts",
        config.group_size, config.time_budget_ms, config.max_attempts
    );

    // Cache tiers, fastest first
    let mut tiers: Vec<Arc<dyn ByteStore>> = vec![Arc::new(MemoryStore::with_capacity_and_entries(
        config.memory_bytes,
        config.memory_entries,
    ))];
    if let Some(ref dir) = config.cache_dir {
        match DiskStore::open(dir) {
            Ok(disk) => tiers.push(Arc::new(disk)),
            Err(e) => {
                error!("Failed to open disk tier at {}: {}", dir.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }
    let cache = Arc::new(CacheStore::new(tiers));

    let bitmaps = load_bitmaps(&config);

    let rights = match config.rights_table() {
        Ok(rights) => rights,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let tile_service = TileService::new(
        config.service_config(),
        cache,
        Arc::new(SyntheticOrigin::new(config.importances)),
        bitmaps,
        Arc::new(rights),
    );

    let router = create_router(tile_service, build_router_config(&config));

    let addr = config.bind_address();
    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    printf 'G{}_0_2_0_5_5\\n' | curl --data-binary @- http://{}/tiles", config.server_prefix, addr);
    info!("    curl http://{}/cache/stats", addr);
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Load bitmaps and report required ones that are missing. A missing bitmap
/// is a deployment fault; the server still starts and answers those
/// descriptors as failed.
fn load_bitmaps(config: &Config) -> BitmapTable {
    let Some(ref dir) = config.bitmap_dir else {
        return BitmapTable::new();
    };

    let table = match BitmapTable::load_dir(dir) {
        Ok(table) => table,
        Err(e) => {
            error!("Failed to load bitmaps: {}", e);
            BitmapTable::new()
        }
    };

    let missing = table.missing(&config.required_bitmaps);
    if !missing.is_empty() {
        error!(missing = ?missing, "Required bitmaps are missing");
    }
    table
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilemap_cache=debug,tower_http=debug"
    } else {
        "tilemap_cache=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new();

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}
