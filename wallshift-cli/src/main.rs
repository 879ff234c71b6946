use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::Parser;
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use wallshift_engine::fetch::ProgressSample;
use wallshift_engine::{EngineConfig, EngineError, Rotator, Scheduler};

mod apply;
mod cli;

use apply::CommandApplier;
use cli::{CliArgs, Command};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {}", e.user_message());
        if let Some(suggestion) = e.recovery_suggestion() {
            eprintln!("{suggestion}");
        }
        error!(error = ?e, "command failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), EngineError> {
    let args = CliArgs::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(true)
        .finish();
    // A second invocation in tests may already have a subscriber installed.
    let _ = tracing::subscriber::set_global_default(subscriber);

    let config = EngineConfig::load(&args.config).await;
    info!(
        cache_dir = ?config.cache_dir,
        max_cache_size_mb = config.max_cache_size_mb,
        catalog = %config.catalog_base_url,
        "configuration loaded"
    );

    let applier = Arc::new(CommandApplier::new(args.apply_cmd.clone()));
    let rotator = Arc::new(Rotator::from_config(&config, applier).await?);
    let cancel = CancellationToken::new();

    match args.command {
        Command::Set { identifier } => {
            let path = rotator
                .set_from_identifier(&identifier, Some(&progress_logger()), &cancel)
                .await?;
            println!("{}", path.display());
        }
        Command::Random => {
            let identifier = rotator.catalog().pick_random(&cancel).await?;
            info!(identifier = %identifier, "catalog picked");
            let path = rotator
                .set_from_identifier(&identifier, Some(&progress_logger()), &cancel)
                .await?;
            println!("{}", path.display());
        }
        Command::Rotate { source } => {
            let scheduler = Scheduler::new(Arc::clone(&rotator), &config);
            scheduler.force_rotation(source.map(Into::into)).await?;
        }
        Command::Watch => {
            let mut watch_config = config.clone();
            watch_config.scheduler_enabled = true;
            let mut scheduler = Scheduler::new(Arc::clone(&rotator), &watch_config);
            let mut next = scheduler.subscribe_next_rotation();
            scheduler.start();
            if let Some(at) = *next.borrow_and_update() {
                info!(next_rotation = %at.format("%Y-%m-%d %H:%M:%S UTC"), "scheduler running, press Ctrl-C to stop");
            }
            tokio::signal::ctrl_c().await.map_err(|e| {
                EngineError::unknown(e).with_context("operation", "waiting for interrupt")
            })?;
            scheduler.stop();
        }
        Command::History => {
            let mut items = rotator.store().history().await;
            items.sort_by(|a, b| b.last_access_at.cmp(&a.last_access_at));
            if items.is_empty() {
                println!("cache is empty");
            }
            for item in items {
                println!(
                    "{:<24} {:>10}  last used {}",
                    item.identifier,
                    format_size(item.size_bytes),
                    item.last_access_at.format("%Y-%m-%d %H:%M:%S UTC"),
                );
            }
        }
        Command::Cleanup => {
            rotator
                .store()
                .cleanup_to_limit(config.max_cache_size_bytes())
                .await;
        }
        Command::Clear => {
            rotator.store().clear_all().await;
        }
    }

    Ok(())
}

/// Progress observer logging at every completed decile when the total size
/// is known, and every 5 MiB otherwise.
fn progress_logger() -> impl Fn(ProgressSample) + Send + Sync {
    let last_reported = AtomicU64::new(0);
    move |sample: ProgressSample| {
        let milestone = match sample.bytes_total {
            Some(total) if total > 0 => sample.bytes_received * 10 / total,
            _ => sample.bytes_received / (5 * 1024 * 1024),
        };
        if milestone > last_reported.swap(milestone, Ordering::Relaxed) {
            match sample.bytes_total {
                Some(total) => info!(
                    "downloaded {} of {}",
                    format_size(sample.bytes_received),
                    format_size(total)
                ),
                None => info!("downloaded {}", format_size(sample.bytes_received)),
            }
        }
    }
}

fn format_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
