use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use ulid::Ulid;

use daybook::auth::Principal;
use daybook::dispatch::{self, LogMailer};
use daybook::engine::{Engine, EngineError};
use daybook::notify::NotifyHub;
use daybook::store::MemoryStore;

const DAY_MS: i64 = 86_400_000;
/// 2024-11-03T00:00:00Z, opening day of the seed festival.
const OPENING_DAY_MS: i64 = 1_730_592_000_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("DAYBOOK_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    daybook::observability::init(metrics_port);

    let data_dir = std::env::var("DAYBOOK_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: u64 = std::env::var("DAYBOOK_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let seed = std::env::var("DAYBOOK_SEED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(true);

    std::fs::create_dir_all(&data_dir)?;
    let journal_path = PathBuf::from(&data_dir).join("daybook.journal");

    let store = Arc::new(MemoryStore::open(&journal_path)?);
    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(store.clone(), notify.clone()));

    tokio::spawn(dispatch::run_mailer(notify.clone(), Arc::new(LogMailer)));
    tokio::spawn(dispatch::run_compactor(store.clone(), compact_threshold));

    if seed {
        seed_if_empty(&engine).await?;
    }

    info!("daybook engine ready");
    info!("  data_dir: {data_dir}");
    info!("  compact_threshold: {compact_threshold}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );
    for entry in engine.day_overview().await? {
        info!(
            "  day {}: {} ({}/{} booked)",
            entry.day.id, entry.day.theme, entry.tickets_sold, entry.day.capacity
        );
    }

    // Park until the host asks us to stop, then leave a compact journal.
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    shutdown.await;

    info!("shutdown signal received");
    store.compact().await?;
    info!("daybook stopped");
    Ok(())
}

/// Provision the demo festival on first start. A journal that already holds
/// a festival is left untouched.
async fn seed_if_empty(engine: &Engine) -> Result<(), EngineError> {
    match engine.festival().await {
        Ok(_) => return Ok(()),
        Err(EngineError::FestivalNotFound) => {}
        Err(e) => return Err(e),
    }

    // Bootstrap-local administrative actor; never stored.
    let bootstrap = Principal {
        user_id: Ulid::nil(),
        is_admin: true,
    };

    engine
        .provision_festival(
            &bootstrap,
            "Food & Friends Festival",
            OPENING_DAY_MS,
            OPENING_DAY_MS + 5 * DAY_MS - 1,
            "Guldbergsgade 51A, 4. tv., 2200 København N",
            50.0,
            6,
        )
        .await?;

    let program: [(&str, &str); 5] = [
        (
            "Autumn Harvest",
            "Seasonal vegetables, roasted meats, and warm spices",
        ),
        (
            "Mediterranean Night",
            "Fresh seafood, olive oil, and Mediterranean herbs",
        ),
        ("Asian Fusion", "Sushi, stir-fries, and exotic spices"),
        (
            "Comfort Classics",
            "Homestyle cooking, comfort foods, and hearty portions",
        ),
        ("Sweet Finale", "Pastries, chocolate, and sparkling wine"),
    ];
    for (offset, (theme, menu)) in program.iter().enumerate() {
        engine
            .create_day(
                &bootstrap,
                OPENING_DAY_MS + offset as i64 * DAY_MS,
                theme,
                menu,
                None,
            )
            .await?;
    }

    info!("seeded festival with {} days", program.len());
    Ok(())
}
