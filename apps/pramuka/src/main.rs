//! # Pramuka - Skill-Badge Progression Server
//!
//! The main binary: HTTP server and CLI over the Pramuka rule engine.
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! pramuka server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! pramuka status
//! pramuka promote-b --member 3 --category 7 --tier 1 --examiner "Kak Wahyu"
//! pramuka award --member 3 --evaluate
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // PRAMUKA_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("PRAMUKA_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pramuka=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = pramuka::cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = pramuka::cli::execute(cli).await {
        tracing::error!(code = e.code(), "Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Pramuka startup banner.
fn print_banner() {
    println!(
        r#"
  ┌─┐┬─┐┌─┐┌┬┐┬ ┬┬┌─┌─┐
  ├─┘├┬┘├─┤││││ │├┴┐├─┤
  ┴  ┴└─┴ ┴┴ ┴└─┘┴ ┴┴ ┴

  Skill-Badge Progression Server v{}

  TKU • TKK • Garuda
"#,
        env!("CARGO_PKG_VERSION")
    );
}
