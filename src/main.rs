use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use cfa_mock_exam::models::exam::ExamSession;
use cfa_mock_exam::models::SelfScores;
use cfa_mock_exam::orchestrator::{is_missing_config, App, BuildOptions};
use cfa_mock_exam::utils::logging;
use cfa_mock_exam::{Config, Session};

#[derive(Parser)]
#[command(name = "cfa-mock-exam")]
#[command(about = "Generate, time and grade CFA Level III mock exams from curriculum PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug logs
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, chunk and classify curriculum books
    Ingest {
        /// Files to ingest (defaults to every PDF/TXT in the books directory)
        files: Vec<PathBuf>,
    },

    /// Generate a mock exam
    Build {
        /// AM (constructed response) or PM (item sets)
        #[arg(long)]
        session: Session,

        /// Number of questions (AM) or item sets (PM)
        #[arg(long)]
        count: Option<usize>,

        /// Random seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Start a timed attempt
    Start {
        #[arg(long)]
        exam_id: String,

        #[arg(long, default_value = "candidate")]
        candidate: String,
    },

    /// Show the remaining time of an attempt
    Status {
        #[arg(long)]
        session_id: String,
    },

    /// Submit answers for an attempt
    Submit {
        #[arg(long)]
        session_id: String,

        /// JSON answers file
        #[arg(long)]
        answers: PathBuf,
    },

    /// Write the self-assessment rubric for an AM submission
    Rubric {
        #[arg(long)]
        submission: PathBuf,
    },

    /// Grade a submission and write the performance report
    Grade {
        #[arg(long)]
        submission: PathBuf,

        /// AM self-assessed points JSON
        #[arg(long)]
        self_scores: Option<PathBuf>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ingest { .. } => "ingest",
            Commands::Build { .. } => "build",
            Commands::Start { .. } => "start",
            Commands::Status { .. } => "status",
            Commands::Submit { .. } => "submit",
            Commands::Rubric { .. } => "rubric",
            Commands::Grade { .. } => "grade",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let mut config = Config::from_env();
    config.verbose_logging |= cli.verbose;

    // 初始化日志
    logging::init(config.verbose_logging);
    let command = cli.command.name();
    logging::init_log_file(&config.output_log_file, command)?;
    logging::log_startup(command, &config.llm_model_name);

    let app = App::initialize(config).await?;

    match run(&app, cli.command).await {
        Err(e) if is_missing_config(&e) => {
            warn!("⚠️ {}，请在 .env 中设置 OPENAI_API_KEY 后重试", e);
            Ok(())
        }
        other => other,
    }
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest { files } => {
            app.ingest(files).await?;
        }
        Commands::Build {
            session,
            count,
            seed,
        } => {
            let exam = app.build(session, BuildOptions { count, seed }).await?;
            println!("{}", exam.exam_id);
        }
        Commands::Start {
            exam_id,
            candidate,
        } => {
            let session = app.start(&exam_id, &candidate)?;
            println!("{}", session.session_id);
        }
        Commands::Status { session_id } => {
            let status = app.status(&session_id)?;
            print_status(
                &status.session,
                &status.remaining,
                status.elapsed_fraction,
                status.expired,
            );
        }
        Commands::Submit {
            session_id,
            answers,
        } => {
            let session = app.load_session(&session_id)?;
            let answers = app.read_answers_file(session.session, &answers)?;
            let (_, path) = app.submit(&session_id, answers)?;
            println!("{}", path.display());
        }
        Commands::Rubric { submission } => {
            let submission = app.load_submission(&submission)?;
            let (_, path) = app.rubric(&submission)?;
            println!("{}", path.display());
        }
        Commands::Grade {
            submission,
            self_scores,
        } => {
            let submission = app.load_submission(&submission)?;
            let scores: Option<SelfScores> = match self_scores {
                Some(path) => Some(app.storage().read_json(&path)?),
                None => None,
            };
            let output = app.grade(&submission, scores.as_ref())?;
            println!("{}", output.report);
            info!("结果已保存: {}", output.result_file.display());
        }
    }

    Ok(())
}

fn print_status(session: &ExamSession, remaining: &str, elapsed: f64, expired: bool) {
    println!("Session : {}", session.session_id);
    println!("Exam    : {}", session.exam_id);
    let state = if session.submitted {
        "submitted"
    } else if expired {
        "time expired"
    } else {
        "in progress"
    };
    println!("Status  : {}", state);
    println!("Remaining: {} ({:.0}% elapsed)", remaining, elapsed * 100.0);
}
