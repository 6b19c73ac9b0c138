use std::env;

use anyhow::Result;
use geofact::{ClientConfig, Coordinate, LookupOutcome, connect};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <lat> <lng>", program);
    eprintln!("       {} search <query...>", program);
    eprintln!("  lat, lng: decimal degrees (e.g., 48.8566 2.3522)");
    eprintln!("  query: free-text place name (e.g., \"Reykjavik\")");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geofact=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("geofact");

    let session = connect(&ClientConfig::from_env())?;

    let outcome = match args.get(1).map(String::as_str) {
        Some("search") => {
            let query = args[2..].join(" ");
            if query.is_empty() {
                usage(program);
            }
            session.search(&query).await
        }
        Some(lat) => {
            let (Ok(latitude), Some(Ok(longitude))) =
                (lat.parse::<f64>(), args.get(2).map(|s| s.parse::<f64>()))
            else {
                usage(program);
            };
            session.click(Coordinate::new(latitude, longitude)).await
        }
        None => usage(program),
    };

    for alert in session.take_alerts().await {
        eprintln!("Alert: {}", alert.message);
    }

    if outcome == LookupOutcome::NotFound {
        std::process::exit(1);
    }

    let snapshot = session.snapshot().await;
    println!("{}", snapshot.display);

    if outcome == LookupOutcome::Failed {
        std::process::exit(1);
    }

    Ok(())
}
