use std::fs;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fortress::config::ServerConfig;
use fortress::server::{AppState, create_router};
use fortress::store::{SqliteStore, Store};

#[derive(Parser)]
#[command(name = "fortress")]
#[command(about = "A metered gateway for text-generation workloads", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for the database and downloaded models
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Base URL of the text-generation engine
        #[arg(long, env = "MODEL_SERVER_URL", default_value = "http://127.0.0.1:8188")]
        model_server_url: String,

        /// Base URL of the model hub used by download jobs
        #[arg(long, env = "HUB_BASE_URL", default_value = "https://huggingface.co")]
        hub_base_url: String,

        /// HMAC secret for session tokens. Required; the server refuses to
        /// start without one.
        #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
        session_secret: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fortress=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            data_dir,
            model_server_url,
            hub_base_url,
            session_secret,
        } => {
            let config = ServerConfig {
                host,
                port,
                data_dir: data_dir.into(),
                model_server_url,
                hub_base_url,
                session_secret,
            };

            fs::create_dir_all(&config.data_dir)?;

            let store = SqliteStore::new(config.db_path())?;
            store.initialize()?;

            let metrics_handle = fortress::metrics::install()?;

            let addr = config.socket_addr()?;
            let state = Arc::new(AppState::new(Arc::new(store), config, metrics_handle)?);
            let app = create_router(state);

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
