use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use printcheck_cli::{format_summary, init_thread_pool, run_disk_session, CliConfig, CliError};
use tracing::error;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "printcheck.toml";

#[derive(Parser, Debug)]
#[command(author, version, about = "Garment print defect detection against a golden sample")]
struct Cli {
    /// Golden (reference) image
    golden: Option<PathBuf>,
    /// Test image to inspect
    test: Option<PathBuf>,
    /// TOML or JSON configuration file (defaults to ./printcheck.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Base directory for session folders
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,
    /// Print the summary as JSON instead of text
    #[arg(long)]
    json: bool,
    /// Worker threads (defaults to the number of CPUs)
    #[arg(short = 'j', long)]
    threads: Option<usize>,
    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", error_chain(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    if cli.print_config {
        print!("{}", CliConfig::default().to_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    let config = match cli.config.as_deref() {
        Some(path) => CliConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG).is_file() => CliConfig::load(DEFAULT_CONFIG)?,
        None => CliConfig::default(),
    };

    let Some((golden, test)) = config.resolve_inputs(cli.golden, cli.test) else {
        eprintln!("Usage: printcheck <golden_path> <test_path>");
        return Ok(ExitCode::FAILURE);
    };
    if !golden.exists() || !test.exists() {
        eprintln!(
            "Error: image not found (golden: {}, test: {})",
            golden.display(),
            test.display()
        );
        return Ok(ExitCode::FAILURE);
    }

    init_thread_pool(cli.threads.unwrap_or_else(|| num_cpus::get().max(1)))?;

    let output = cli.output.unwrap_or_else(|| config.output_dir.clone());
    let outcome = run_disk_session(&golden, &test, &config.detection, &output)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", format_summary(&outcome.summary, Some(&outcome.session_dir)));
    }
    Ok(ExitCode::SUCCESS)
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
