#![forbid(unsafe_code)]

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use trace_prover::backend::{MockConfig, MockEngine};
use trace_prover::config::EngineChoice;
use trace_prover::core::HashKind;
use trace_prover::engine::HostRequest;
use trace_prover::engine::host::execute_contained;
use trace_prover::prove_cmd::ProveOptions;
use trace_prover::{ProverError, ProverResult, batch_cmd, prove_cmd};

#[derive(Parser, Debug)]
#[command(name = "trace-prover", version)]
#[command(about = "Run hash-trace proofs in isolated engine hosts", long_about = None)]
struct Cli {
    /// Enable verbose logging (or set TRACE_PROVER_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prove and verify one request
    Prove {
        /// Hash circuit to run
        #[arg(long, value_enum)]
        kind: HashKind,
        /// Single input (sha2, sha3)
        #[arg(long, conflicts_with = "inputs")]
        input: Option<String>,
        /// Comma-separated batch inputs (keccak)
        #[arg(long, value_delimiter = ',')]
        inputs: Vec<String>,
        /// Engine binding
        #[arg(long, value_enum, default_value_t = EngineChoice::Mock)]
        engine: EngineChoice,
        /// Path to the engine executable (command engine)
        #[arg(long)]
        engine_path: Option<PathBuf>,
        /// Extra arguments for the engine executable, shell-quoted
        #[arg(long, allow_hyphen_values = true)]
        engine_args: Option<String>,
        /// Job timeout in seconds, 0 waits forever
        #[arg(long, default_value_t = 300)]
        timeout: u64,
        /// Write the job record as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
        /// Append the job record to this JSONL history
        #[arg(long)]
        jsonl: Option<PathBuf>,
        /// Append the job record to this CSV log
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Run every job in a TOML batch file
    Batch {
        /// Path to the batch file
        #[arg(long)]
        config: PathBuf,
        /// Append job records to this JSONL history
        #[arg(long)]
        jsonl: Option<PathBuf>,
        /// Append job records to this CSV log
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Write a JSON summary with all records to this file
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Speak the engine wire protocol backed by the mock engine
    #[command(hide = true)]
    MockEngine {
        /// Fail every proof with this message
        #[arg(long)]
        fail: Option<String>,
        /// Sleep this many milliseconds before each proof
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
        #[command(subcommand)]
        action: MockAction,
    },
}

#[derive(Subcommand, Debug)]
enum MockAction {
    /// Read one request from stdin and print one response
    Prove,
}

fn init_tracing(verbose: bool) {
    let env = std::env::var("TRACE_PROVER_LOG").unwrap_or_else(|_| {
        if verbose { "trace_prover=debug".to_string() } else { "trace_prover=info".to_string() }
    });
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_env_filter(EnvFilter::new(env))
        .try_init();
}

fn mock_engine(fail: Option<String>, delay_ms: u64) -> ProverResult<()> {
    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .map_err(|e| ProverError::Communication(e.to_string()))?;
    let request: HostRequest = serde_json::from_str(&body)
        .map_err(|e| ProverError::Communication(format!("bad request: {e}")))?;
    let request = HostRequest::from(&request.into_request()?);

    let mut config = MockConfig::default().with_delay(Duration::from_millis(delay_ms));
    if let Some(message) = fail {
        config = config.exec_fails(message);
    }
    let response = execute_contained(&MockEngine::new(config), &request);
    let out = serde_json::to_string(&response).map_err(|e| ProverError::Message(e.to_string()))?;
    println!("{out}");
    Ok(())
}

fn main() {
    color_eyre::install().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Prove {
            kind,
            input,
            inputs,
            engine,
            engine_path,
            engine_args,
            timeout,
            json,
            jsonl,
            csv,
        } => prove_cmd::run(ProveOptions {
            kind: Some(kind),
            input,
            inputs,
            engine,
            engine_path,
            engine_args,
            timeout,
            json,
            jsonl,
            csv,
        }),
        Commands::Batch { config, jsonl, csv, summary } => batch_cmd::run(config, jsonl, csv, summary),
        Commands::MockEngine { fail, delay_ms, action: MockAction::Prove } => mock_engine(fail, delay_ms),
    };

    if let Err(e) = result {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
