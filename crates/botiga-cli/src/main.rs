use botiga_core::engine::simulator::Simulator;
use botiga_core::judge::Judge;
use botiga_core::model::{BatchRow, BenchConfig, Goal, RunStatus};
use botiga_core::providers::llm::openai::OpenAiChatClient;
use botiga_core::providers::llm::ChatClient;
use botiga_core::report::{analysis, console};
use botiga_core::storage::RunStore;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "botiga",
    version,
    about = "Buyer/store conversation benchmark: simulate dialogues, judge them, aggregate scores"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    Init(InitArgs),
    Simulate(SimulateArgs),
    Judge(JudgeArgs),
    Analyze(AnalyzeArgs),
    Version,
}

#[derive(Parser, Clone)]
struct InitArgs {
    #[arg(long, default_value = "botiga.yaml")]
    config: PathBuf,

    /// generate .gitignore for the data directory
    #[arg(long)]
    gitignore: bool,
}

#[derive(Parser, Clone)]
struct SimulateArgs {
    #[arg(long, default_value = "botiga.yaml")]
    config: PathBuf,
}

#[derive(Parser, Clone)]
struct JudgeArgs {
    #[arg(long, default_value = "botiga.yaml")]
    config: PathBuf,

    /// re-judge runs that already have a judgement
    #[arg(long)]
    refresh: bool,
}

#[derive(Parser, Clone)]
struct AnalyzeArgs {
    #[arg(long, default_value = "botiga.yaml")]
    config: PathBuf,

    /// output directory (defaults to <data_dir>/analysis)
    #[arg(long)]
    out: Option<PathBuf>,
}

mod exit_codes {
    pub const OK: i32 = 0;
    pub const RUN_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e:?}");
            exit_codes::CONFIG_ERROR
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(args),
        Command::Simulate(args) => cmd_simulate(args).await,
        Command::Judge(args) => cmd_judge(args).await,
        Command::Analyze(args) => cmd_analyze(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    if !args.config.exists() {
        if let Some(parent) = args.config.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        botiga_core::config::write_sample_config(&args.config)
            .map_err(|e| anyhow::anyhow!(e))?;
        eprintln!("created {}", args.config.display());
    } else {
        eprintln!("note: {} already exists", args.config.display());
    }

    if args.gitignore {
        let gi_path = Path::new(".gitignore");
        if !gi_path.exists() {
            std::fs::write(gi_path, "/.botiga/\n")?;
            eprintln!("created .gitignore");
        } else {
            eprintln!("note: .gitignore already exists (skipped)");
        }
    }

    Ok(exit_codes::OK)
}

async fn cmd_simulate(args: SimulateArgs) -> anyhow::Result<i32> {
    let cfg = load(&args.config)?;
    let store = RunStore::open(Path::new(&cfg.data_dir))?;

    let mut pairs: Vec<(Goal, Arc<dyn ChatClient>)> = Vec::new();
    for ep in cfg.simulation_endpoints() {
        let client: Arc<dyn ChatClient> = Arc::new(OpenAiChatClient::from_endpoint(ep)?);
        for goal in &cfg.goals {
            pairs.push((goal.clone(), client.clone()));
        }
    }

    let simulator = Simulator {
        store,
        max_turns: cfg.max_turns,
        language: cfg.language.clone(),
        parallel: cfg.simulate.parallel,
    };
    let rows = simulator.run_batch(pairs).await?;

    console::print_batch_summary("simulate", &rows);
    Ok(decide_exit_code(&rows))
}

async fn cmd_judge(args: JudgeArgs) -> anyhow::Result<i32> {
    let cfg = load(&args.config)?;
    let store = RunStore::open(Path::new(&cfg.data_dir))?;

    let endpoint = cfg
        .judge_endpoint()
        .ok_or_else(|| anyhow::anyhow!("judge model '{}' not configured", cfg.judge.model))?;
    let client: Arc<dyn ChatClient> = Arc::new(OpenAiChatClient::from_endpoint(endpoint)?);

    let judge = Judge {
        client,
        store,
        language: cfg.language.clone(),
        parallel: cfg.judge.parallel,
        max_retries: cfg.judge.max_retries,
        backoff: Duration::from_millis(500),
    };
    let rows = judge.judge_all(args.refresh).await?;

    console::print_batch_summary("judge", &rows);
    Ok(decide_exit_code(&rows))
}

fn cmd_analyze(args: AnalyzeArgs) -> anyhow::Result<i32> {
    let cfg = load(&args.config)?;
    let store = RunStore::open(Path::new(&cfg.data_dir))?;
    let out_dir = args.out.unwrap_or_else(|| store.analysis_dir());

    let judged = store.load_judgements()?;
    if judged.is_empty() {
        anyhow::bail!(
            "no judgements found in {} (run `botiga judge` first)",
            store.judgements_dir().display()
        );
    }

    let flat = analysis::flatten(&judged);
    let per_model = analysis::filter_scored_models(analysis::aggregate_by_model(&flat))?;
    analysis::write_tables(&out_dir, &flat, &per_model)?;
    let summary = analysis::build_summary(&per_model)?;
    analysis::write_summary(&out_dir, &summary)?;

    console::print_analysis(&summary);
    eprintln!("analysis written to {}", out_dir.display());
    Ok(exit_codes::OK)
}

fn load(path: &Path) -> anyhow::Result<BenchConfig> {
    botiga_core::config::load_config(path).map_err(|e| anyhow::anyhow!(e))
}

fn decide_exit_code(rows: &[BatchRow]) -> i32 {
    if rows.iter().any(|r| r.status == RunStatus::Failed) {
        exit_codes::RUN_FAILED
    } else {
        exit_codes::OK
    }
}
