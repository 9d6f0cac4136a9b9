//! Check-in station binary.
//!
//! Reads codes and commands from stdin, one per line.
//!
//! Run with:
//! ```bash
//! DATABASE_URL=postgres://localhost/checkin cargo run -p checkin-scanner
//! ```

use checkin_core::environment::SystemClock;
use checkin_guests::{
    ChangeFeed, CheckInService, FileSnapshotCache, GuestEnvironment, RandomIdGenerator,
    ServiceConfig,
};
use checkin_postgres::{PostgresChangeFeed, PostgresGuestBackend};
use checkin_scanner::{render_guest, render_scan, Command, ScannerConfig, HELP};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays readable at the station.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ScannerConfig::from_env();
    info!(
        station = %config.station,
        remote = config.database_url.is_some(),
        cache_dir = %config.cache_dir.display(),
        "Starting check-in station"
    );

    let cache = Arc::new(FileSnapshotCache::new(&config.cache_dir));
    let mut env = GuestEnvironment::new(Arc::new(SystemClock), Arc::new(RandomIdGenerator), cache);
    let mut feed: Option<Arc<dyn ChangeFeed>> = None;

    if let Some(url) = &config.database_url {
        let backend = PostgresGuestBackend::connect_lazy(url, config.max_connections)?;
        if let Err(e) = backend.migrate().await {
            warn!(error = %e, "Could not prepare the guest table, starting degraded");
        }
        feed = Some(Arc::new(PostgresChangeFeed::new(backend.pool().clone())));
        env = env.with_backend(Arc::new(backend));
    }

    let service = CheckInService::new(
        env,
        ServiceConfig {
            request_timeout: config.request_timeout(),
            ..ServiceConfig::default()
        },
    );

    let report = service.fetch_all().await;
    println!("{} guests loaded from {:?}", report.guests.len(), report.source);
    if let Some(reason) = &report.degraded_reason {
        println!("offline: {reason}");
    }

    let listener = feed.map(|feed| service.listen(feed, config.listener_retry()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            },
        };

        match command {
            Command::Scan(code) => {
                let result = service.check_in(&code).await;
                println!("{}", render_scan(&result));
            },
            Command::Register { first_name, last_name, email } => {
                match service.register(&first_name, &last_name, &email).await {
                    Ok(guest) => {
                        println!("registered {} ({})", guest.full_name(), guest.id.short_code());
                    },
                    Err(e) => println!("registration failed: {e}"),
                }
            },
            Command::List => {
                for guest in service.snapshot().await {
                    println!("{}", render_guest(&guest));
                }
            },
            Command::Refresh => {
                let report = service.fetch_all().await;
                println!("{} guests loaded from {:?}", report.guests.len(), report.source);
                if let Some(reason) = &report.degraded_reason {
                    println!("offline: {reason}");
                }
            },
            Command::Status => {
                let online = service.is_online().await;
                let mode = if online { "online" } else { "offline" };
                println!("station {}: {mode}", config.station);
                if let Some(reason) = service.last_error().await {
                    println!("last error: {reason}");
                }
                let check_ins = service.unsynced_check_ins().await;
                let registrations = service.unsynced_registrations().await;
                if !check_ins.is_empty() || !registrations.is_empty() {
                    println!(
                        "unsynced: {} check-ins, {} registrations",
                        check_ins.len(),
                        registrations.len()
                    );
                }
                if let Some(scan) = service.last_scan().await {
                    println!("last scan: {}", render_scan(&scan));
                }
            },
            Command::Clear => service.clear_scan_result().await,
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    info!("Shutting down check-in station");
    if let Some(listener) = listener {
        listener.cancel().await;
    }
    if let Err(e) = service.shutdown(Duration::from_secs(5)).await {
        error!(error = %e, "Pending work did not finish before shutdown");
    }

    Ok(())
}
