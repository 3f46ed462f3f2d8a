use radarapi::{RadarApi, DEFAULT_BASE_URL};
use std::env;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <command> [args...]", args[0]);
        eprintln!("Commands:");
        eprintln!("  latest [base_url] - Fetch the latest radar snapshot and print a summary");
        eprintln!("");
        eprintln!("Examples:");
        eprintln!("  {} latest", args[0]);
        eprintln!("  {} latest http://localhost:8000", args[0]);
        std::process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "latest" => {
            let base_url = args.get(2).map(|s| s.as_str()).unwrap_or(DEFAULT_BASE_URL);
            let api = RadarApi::new(base_url)?;

            println!("Fetching latest radar snapshot from {}...", base_url);
            let response = api.fetch_latest().await?;

            println!("Features: {}", response.data.features.len());
            println!("Last updated: {}", response.last_updated);
            match response.data_timestamp {
                Some(ts) => println!("Data timestamp: {}", ts),
                None => println!("Data timestamp: not available yet"),
            }

            let max_dbz = response
                .data
                .features
                .iter()
                .map(|f| f.reflectivity())
                .fold(f64::NEG_INFINITY, f64::max);
            if max_dbz.is_finite() {
                println!("Max reflectivity: {:.1} dBZ", max_dbz);
            }
        }

        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }

    Ok(())
}
