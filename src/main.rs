use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use study_planner::{api, config::Settings, mcp, scheduler::Scheduler};

const DEFAULT_PORT: u16 = 8080;

#[derive(Parser)]
#[command(name = "study-planner")]
#[command(about = "AI study notes and quizzes with scheduled study plans")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and the study plan scheduler
    Serve {
        /// Port for HTTP API
        #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Process due study plans once and exit
    Tick,
    /// Start MCP server via stdio
    Mcp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "study_planner=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port }) => serve(&cli.settings, port).await?,
        Some(Commands::Tick) => {
            let db = cli.settings.open_database()?;
            let generator = cli.settings.build_generator()?;
            let scheduler = Scheduler::new(Arc::new(db.clone()), Arc::new(db), generator)
                .with_config(cli.settings.scheduler_config()?);

            let report = scheduler.tick().await?;
            println!(
                "due: {}, completed: {}, failed: {}, skipped: {}",
                report.due, report.completed, report.failed, report.skipped
            );
        }
        Some(Commands::Mcp) => {
            let db = cli.settings.open_database()?;
            mcp::run_stdio_server(db).await?;
        }
        None => serve(&cli.settings, DEFAULT_PORT).await?,
    }

    Ok(())
}

async fn serve(settings: &Settings, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting study planner server on port {}", port);

    let db = settings.open_database()?;
    let generator = settings.build_generator()?;

    let scheduler = Scheduler::new(Arc::new(db.clone()), Arc::new(db.clone()), generator.clone())
        .with_config(settings.scheduler_config()?);
    let scheduler = scheduler.start();

    let state = api::AppState::new(db, generator)
        .with_generation_timeout(settings.generation_timeout()?);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Study planner listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    scheduler.stop().await;
    Ok(())
}
