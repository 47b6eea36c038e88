use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mentor_cogbench::{
    config::{Config, LogFormat},
    metrics::MetricAggregator,
    session::{Arm, Proficiency},
    CoreContext, Orchestrator,
};

#[derive(Parser)]
#[command(name = "mentor-cogbench", version, about = "Socratic design tutor and cognitive benchmark")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a tutoring session, one learner message per stdin line
    Chat {
        /// Study arm: mentor, generic_ai or control
        #[arg(long, default_value = "mentor")]
        arm: Arm,
        /// beginner, intermediate, advanced or expert
        #[arg(long, default_value = "intermediate")]
        proficiency: Proficiency,
        /// Short description of the design project
        #[arg(long, default_value = "")]
        project: String,
        /// Continue a stored session instead of starting a new one
        #[arg(long)]
        resume: Option<String>,
    },
    /// Write the master session and aggregate metric tables
    Aggregate {
        /// Output directory; defaults to OUTPUT_DIR
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print a session's JSON report
    Report {
        session_id: String,
    },
    /// List stored sessions
    Sessions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "MENTOR cognitive benchmark starting...");

    let core = match CoreContext::from_config(config).await {
        Ok(core) => core,
        Err(e) => {
            error!(error = %e, "Failed to initialize core services");
            return Err(e.into());
        }
    };
    let orchestrator = Orchestrator::new(core);

    match cli.command {
        Command::Chat {
            arm,
            proficiency,
            project,
            resume,
        } => chat(&orchestrator, arm, proficiency, project, resume).await,
        Command::Aggregate { out } => {
            let dir = out.unwrap_or_else(|| orchestrator.core().config.output.dir.clone());
            let aggregator = MetricAggregator::new(orchestrator.analyzer().clone());
            let paths = aggregator
                .run(orchestrator.core().store.as_ref(), &dir)
                .await?;
            println!("{}", paths.sessions.display());
            println!("{}", paths.aggregate.display());
            Ok(())
        }
        Command::Report { session_id } => {
            let report = orchestrator.report(&session_id).await?;
            println!("{}", report.to_json()?);
            Ok(())
        }
        Command::Sessions => {
            for session in orchestrator.core().store.list_sessions().await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    session.id,
                    session.arm,
                    session.proficiency,
                    session.updated_at.to_rfc3339(),
                    session.project_context
                );
            }
            Ok(())
        }
    }
}

async fn chat(
    orchestrator: &Orchestrator,
    arm: Arm,
    proficiency: Proficiency,
    project: String,
    resume: Option<String>,
) -> anyhow::Result<()> {
    let mut session = match resume {
        Some(id) => orchestrator.resume_session(&id).await?,
        None => orchestrator.start_session(arm, proficiency, project).await?,
    };
    eprintln!("Session {} ({}). Empty line or EOF ends it.", session.id(), session.record().arm);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            break;
        }
        let reply = session.process_turn(input).await;
        stdout.write_all(reply.text.as_bytes()).await?;
        stdout.write_all(b"\n\n").await?;
        stdout.flush().await?;
    }

    let report = session.finalize().await?;
    eprintln!(
        "Session {} closed: {} turns, overall cognitive score {:.3}",
        report.session.id,
        report.transcript.len(),
        report.cognitive.overall
    );
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
