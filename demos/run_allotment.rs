//! Example: Running scheduled IPO draws against the application service
//!
//! This example demonstrates how to:
//! 1. Load configuration from YAML with environment overrides
//! 2. Connect to the application service over HTTP
//! 3. Build the allotment engine and outcome notifier
//! 4. Finish draws left unpublished by a previous run
//! 5. Run the draw scheduler until interrupted
//!
//! Usage: `cargo run --example run_allotment -- [config.yaml]`

use std::sync::Arc;

use chrono::Utc;
use ipo_allotment::{
    adapters::{ChannelPublisher, HttpApplicationDirectory, InMemoryAllotmentStore},
    notifier::OutcomeNotifier,
    AllotmentConfig, AllotmentEngine, AllotmentEngineConfig, AllotmentScheduler,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    ipo_allotment::init_tracing();

    println!("=== IPO Allotment Example ===\n");

    // 1. Load configuration
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/allotment.yaml".to_string());
    println!("1. Loading configuration from {}...", path);
    let config = AllotmentConfig::from_yaml_file(&path)?.apply_env_overrides()?;
    println!("   ✓ Application service: {}", config.directory.base_url);
    println!("   ✓ Scheduled draws: {}\n", config.scheduler.draws.len());

    // 2. Application service client
    println!("2. Connecting to application service...");
    let directory = Arc::new(HttpApplicationDirectory::new(config.directory.clone())?);
    println!(
        "   ✓ Breaker opens after {} failures for {}ms\n",
        config.directory.breaker_failure_threshold, config.directory.breaker_cooldown_ms
    );

    // 3. Engine and notifier
    println!("3. Creating allotment engine...");
    let (publisher, outcomes) = ChannelPublisher::new();
    let notifier = OutcomeNotifier::new(outcomes).spawn();
    let engine = Arc::new(AllotmentEngine::new(
        AllotmentEngineConfig::from(&config),
        directory.clone(),
        Arc::new(InMemoryAllotmentStore::new()),
        Arc::new(publisher),
    ));
    println!("   ✓ Engine ready\n");

    // 4. Recover unpublished draws
    println!("4. Recovering unpublished draws...");
    let recovered = engine.recover_unpublished().await?;
    println!("   ✓ Recovered {} draws\n", recovered);

    // 5. Scheduler
    println!("5. Running scheduler...");
    let scheduler = AllotmentScheduler::new(engine.clone(), directory, config.scheduler.clone());

    let report = scheduler.run_once(Utc::now()).await?;
    println!("   - Drawn: {:?}", report.drawn);
    println!("   - Already drawn: {:?}", report.already_drawn);
    println!("   - Failed: {:?}", report.failed);
    println!("   - Backfilled: {}\n", report.backfilled);

    for draw in &config.scheduler.draws {
        if let Some(record) = engine.get_allotment(&draw.ipo_id).await? {
            println!(
                "   IPO {}: {} winners, {} non-winners, verified: {}",
                draw.ipo_id,
                record.winner_application_ids.len(),
                record.non_winner_application_ids.len(),
                engine.verify_allotment(&draw.ipo_id).await?
            );
        }
    }

    println!("\nScheduler running, press Ctrl-C to stop");
    tokio::select! {
        _ = scheduler.start() => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down");
        }
    }

    drop(engine);
    notifier.abort();

    println!("\n=== Example completed ===");
    Ok(())
}
