//! Monohost CLI
//!
//! Runs a managed application inside an embedded Mono/CoreCLR runtime.
//! The application directory holds the runtime library, the assemblies the
//! runtime may load, and the entry assembly.

mod config;
mod runner;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::{parse_property, HostConfig, Overrides};

#[derive(Parser)]
#[command(name = "monohost")]
#[command(about = "Run a managed application in an embedded runtime", long_about = None)]
#[command(version)]
struct Cli {
    /// Application directory
    app_dir: PathBuf,

    /// Configuration file (default: APP_DIR/monohost.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Runtime library, relative to APP_DIR or absolute
    #[arg(long)]
    runtime_lib: Option<String>,

    /// Root domain name
    #[arg(long)]
    domain: Option<String>,

    /// Runtime version string
    #[arg(long)]
    runtime_version: Option<String>,

    /// Entry assembly, relative to APP_DIR or absolute
    #[arg(short, long)]
    assembly: Option<String>,

    /// Extra initialization property (repeatable)
    #[arg(short = 'p', long = "prop", value_name = "KEY=VALUE", value_parser = parse_property)]
    props: Vec<(String, String)>,

    /// Arguments to pass to the entry assembly
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env("MONOHOST_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = HostConfig::discover(&cli.app_dir, cli.config.as_deref())?;
    config.apply(Overrides {
        runtime_library: cli.runtime_lib,
        domain_name: cli.domain,
        runtime_version: cli.runtime_version,
        entry_assembly: cli.assembly,
        properties: cli.props,
        args: cli.args,
    });
    runner::run(&cli.app_dir, &config)
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
