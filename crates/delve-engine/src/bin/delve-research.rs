//! Delve research runner.
//!
//! Run one research session from the command line and stream its activity
//! feed to stderr, printing the final report to stdout.
//!
//! Usage:
//!   cargo run --bin delve-research -- "rust async runtimes"
//!   cargo run --bin delve-research -- "rust async runtimes" --provider hybrid --rag
//!   cargo run --bin delve-research -- "topic" --clarify "focus on 2024" --visualize mermaid

use std::env;
use std::process::ExitCode;
use std::str::FromStr;

use delve_core::{
    ActivityStatus, ActivityTracker, EmbeddingProvider, ModelProvider, ResearchEvent,
    ResearchState, VisualizationKind, VisualizationOptions,
};
use delve_engine::{run_research, ResearchDeps};

#[derive(Debug)]
struct Args {
    topic: String,
    provider: ModelProvider,
    embedding_provider: EmbeddingProvider,
    use_rag: bool,
    clarifications: Vec<String>,
    visualization: Option<VisualizationOptions>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            topic: String::new(),
            provider: ModelProvider::Google,
            embedding_provider: EmbeddingProvider::OpenAi,
            use_rag: false,
            clarifications: Vec::new(),
            visualization: None,
        }
    }
}

fn print_usage() {
    eprintln!(
        "Usage: delve-research <topic> [options]\n\n\
         Options:\n\
         \x20 --provider <google|openai|groq|hybrid>   chat provider (default: google)\n\
         \x20 --embedding <openai|google>              embedding provider (default: openai)\n\
         \x20 --rag                                    use stored knowledge (needs DATABASE_URL)\n\
         \x20 --clarify <text>                         add a clarification (repeatable)\n\
         \x20 --visualize <mermaid|chartjs|d3|all>     request visualizations in the report"
    );
}

fn parse_args() -> Option<Args> {
    let argv: Vec<String> = env::args().collect();
    let mut args = Args::default();

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--provider" | "-p" => {
                i += 1;
                let value = argv.get(i)?;
                args.provider = ModelProvider::from_str(value).ok()?;
            }
            "--embedding" | "-e" => {
                i += 1;
                let value = argv.get(i)?;
                args.embedding_provider = EmbeddingProvider::from_str(value).ok()?;
            }
            "--rag" => args.use_rag = true,
            "--clarify" | "-c" => {
                i += 1;
                args.clarifications.push(argv.get(i)?.clone());
            }
            "--visualize" | "-v" => {
                i += 1;
                let kind = match argv.get(i)?.to_lowercase().as_str() {
                    "mermaid" => VisualizationKind::Mermaid,
                    "chartjs" => VisualizationKind::ChartJs,
                    "d3" => VisualizationKind::D3,
                    "all" => VisualizationKind::All,
                    _ => return None,
                };
                args.visualization = Some(VisualizationOptions {
                    enabled: true,
                    kind,
                });
            }
            "--help" | "-h" => return None,
            topic if args.topic.is_empty() => args.topic = topic.to_string(),
            _ => return None,
        }
        i += 1;
    }

    if args.topic.is_empty() {
        return None;
    }
    Some(args)
}

fn status_label(status: ActivityStatus) -> &'static str {
    match status {
        ActivityStatus::Pending => "pending",
        ActivityStatus::Complete => "complete",
        ActivityStatus::Warning => "warning",
        ActivityStatus::Error => "error",
        ActivityStatus::Info => "info",
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let deps = ResearchDeps::from_env(args.embedding_provider).await?;

    let mut state = ResearchState::new(args.topic, args.provider)
        .with_clarifications(args.clarifications);
    state.use_rag = args.use_rag;
    state.embedding_provider = args.embedding_provider;
    state.visualization = args.visualization;

    let (tracker, mut sink) = ActivityTracker::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = sink.recv().await {
            match event {
                ResearchEvent::Activity(a) => {
                    eprintln!(
                        "[{}] {:<8} {}",
                        a.timestamp.format("%H:%M:%S"),
                        status_label(a.status),
                        a.message
                    );
                }
                ResearchEvent::RagDocuments { documents } => {
                    for doc in documents {
                        eprintln!(
                            "         knowledge {} (similarity {:.2})",
                            doc.id, doc.similarity
                        );
                    }
                }
                ResearchEvent::Report { .. } => {}
            }
        }
    });

    let report = run_research(&deps, state, &tracker).await?;
    drop(tracker);
    let _ = printer.await;

    println!("{report}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(args) = parse_args() else {
        print_usage();
        return ExitCode::FAILURE;
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
