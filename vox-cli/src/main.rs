//! The `vox` executable.

mod app;
mod config;
mod telepathist;

use app::{App, AppError};
use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "vox", version, about = "LLM strategic decision layer for a 4X game")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the tool catalog over line-delimited stdio and run the
    /// turn pipeline.
    ServeStdio,
    /// Serve the tool catalog over HTTP and run the turn pipeline.
    ServeHttp {
        /// Port for the RPC endpoint.
        #[arg(long, default_value_t = 4080)]
        port: u16,
    },
    /// Dump the rules-database schema as JSON.
    ExportSchemas {
        /// Output directory.
        #[arg(long)]
        out: PathBuf,
    },
    /// Summarize a recorded session and review its decisions.
    Telepathist {
        /// Session span database.
        #[arg(long)]
        db: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "text".to_string()
        } else {
            "json".to_string()
        }
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ AppError::Init(_)) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("vox: {e}");
            ExitCode::from(1)
        }
        Err(e @ AppError::Internal(_)) => {
            tracing::error!(error = %e, "unhandled");
            eprintln!("vox: {e}");
            ExitCode::from(2)
        }
    }
}

async fn run(command: Command) -> Result<(), AppError> {
    let config = Config::from_env();
    match command {
        Command::ServeStdio => {
            let app = App::build(&config).await?;
            let pipeline = app.start_pipeline();
            vox_rpc::serve_stdio(app.rpc.clone())
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;
            app.shutdown().await;
            pipeline.abort();
            Ok(())
        }
        Command::ServeHttp { port } => {
            let app = App::build(&config).await?;
            let pipeline = app.start_pipeline();

            // Ctrl-C takes the graceful path: stop accepting, drain,
            // flush.
            let token = app.rpc.shutdown_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, shutting down");
                    token.cancel();
                }
            });

            vox_rpc::serve_http(app.rpc.clone(), port)
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;
            app.shutdown().await;
            pipeline.abort();
            Ok(())
        }
        Command::ExportSchemas { out } => {
            let gateway = vox_db::DbGateway::open(
                &config.rules_db,
                &config.localization_db,
                config.language.clone(),
            )
            .map_err(|e| AppError::Init(e.to_string()))?;
            let schema = gateway
                .schema()
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;
            std::fs::create_dir_all(&out).map_err(|e| AppError::Internal(e.to_string()))?;
            let path = out.join("rules-schema.json");
            let pretty = serde_json::to_string_pretty(&schema)
                .map_err(|e| AppError::Internal(e.to_string()))?;
            std::fs::write(&path, pretty).map_err(|e| AppError::Internal(e.to_string()))?;
            tracing::info!(path = %path.display(), "schema exported");
            Ok(())
        }
        Command::Telepathist { db } => {
            let api_key = config
                .api_key
                .ok_or_else(|| AppError::Init("ANTHROPIC_API_KEY is not set".into()))?;
            telepathist::run(&db, &api_key).await
        }
    }
}
