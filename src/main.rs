use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prd_testgen::api::{self, AppState, SecurityConfig};
use prd_testgen::client::TestGenClient;
use prd_testgen::config::{ServeArgs, ServerConfig};
use prd_testgen::models::FullPipelineInput;
use prd_testgen::render;

#[derive(Parser)]
#[command(name = "testgen")]
#[command(about = "Generate features, test points and test cases from a PRD")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve(ServeArgs),
    /// Show the session status of a running service
    Status,
    /// Initialize a running service against an inference engine
    Init {
        /// Served model name (server default when omitted)
        #[arg(short, long)]
        model: Option<String>,

        /// OpenAI-compatible engine URL (server default when omitted)
        #[arg(long)]
        engine_url: Option<String>,
    },
    /// Run the full pipeline on a PRD file through a running service
    Run {
        /// Path to the PRD text
        prd: PathBuf,

        /// Extra instruction appended to every prompt
        #[arg(long)]
        requirement: Option<String>,

        /// Keep only the first N features
        #[arg(long)]
        max_features: Option<usize>,

        /// Keep only the first N test points of each feature
        #[arg(long)]
        max_test_points: Option<usize>,

        /// Attach quality scores
        #[arg(long)]
        evaluate: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Tree,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "prd_testgen=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Serve(args)) => serve(args).await?,
        Some(Commands::Status) => {
            let status = TestGenClient::from_env().status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Some(Commands::Init { model, engine_url }) => {
            let response = TestGenClient::from_env()
                .init(engine_url.as_deref(), model.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Some(Commands::Run {
            prd,
            requirement,
            max_features,
            max_test_points,
            evaluate,
            format,
        }) => {
            let prd_text = std::fs::read_to_string(&prd)
                .with_context(|| format!("failed to read {}", prd.display()))?;
            let input = FullPipelineInput {
                prd_text,
                additional_requirement: requirement,
                max_features,
                max_test_points_per_feature: max_test_points,
                evaluate,
            };
            let report = TestGenClient::from_env().run_full_pipeline(&input).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Tree => {
                    print!("{}", render::render_tree(&report));
                    if let Some(quality) = &report.quality {
                        for (title, evaluation) in [
                            ("Features", &quality.features),
                            ("Test points", &quality.test_points),
                            ("Test cases", &quality.test_cases),
                        ] {
                            if let Some(evaluation) = evaluation {
                                println!("\n{}", render::render_evaluation(title, evaluation));
                            }
                        }
                    }
                }
            }
        }
        None => serve(ServeArgs::try_parse_from(["testgen"])?).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = ServerConfig::from_args(&args)?;
    let state = AppState::from_config(&config)?;
    let security = SecurityConfig::from_env();

    if let Some(limiter) = security.rate_limiter.clone() {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                limiter.cleanup();
            }
        });
    }

    if config.auto_init {
        let sessions = state.sessions.clone();
        let model = config.default_model.clone();
        tokio::spawn(async move {
            if let Err(e) = sessions.init(model).await {
                tracing::error!("Auto-init failed: {}", e);
            }
        });
    }

    let app = api::create_router_with_security(state, security);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!("Test generation service listening on http://{}", config.bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
