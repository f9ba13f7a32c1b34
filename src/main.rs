use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use projector::api::{Cli, Command, run_http_server, run_projection};

#[tokio::main]
async fn main() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("projector=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Serve { port } => {
            if let Err(e) = run_http_server(port).await {
                error!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Command::Project(args) => match run_projection(args) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("Projection failed: {e}");
                std::process::exit(1);
            }
        },
    }
}
