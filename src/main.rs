// SHOREBENCH -- MULTI-INSTANCE SHORE-KITS BENCHMARK DRIVER
//
// EACH RUN STARTS ONE shore_kits SERVER PER AFFINITY GROUP, PINS IT TO ITS
// CORES, SENDS THE RUN'S COMMANDS OVER A CONTROL SOCKET AND COLLECTS TPS
// FROM THE SERVER LOGS INTO THE OUTPUT LOG.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cli::mock_engine::MockEngineArgs;
use cli::{CatalogArgs, RunArgs};

#[derive(Parser)]
#[command(name = "shorebench")]
#[command(about = "SHOREBENCH -- MULTI-INSTANCE SHORE-KITS BENCHMARK DRIVER")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // EXECUTE EVERY RUN IN THE CATALOG
    Run(RunArgs),
    // PRINT THE CATALOG
    List(CatalogArgs),
    // VERIFY TOOLS, FILES AND PORTS
    Check(RunArgs),
    // STAND-IN ENGINE FOR DRY RUNS
    MockEngine(MockEngineArgs),
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        // THE MOCK ENGINE'S OUTPUT IS PARSED BY THE DRIVER: NO LOG LINES
        Commands::MockEngine(args) => cli::mock_engine::run_mock_engine(&args),
        Commands::Run(args) => {
            init_logging();
            cli::run::run_bench(&args)
        }
        Commands::List(args) => cli::list::run_list(&args),
        Commands::Check(args) => cli::check::run_check(&args),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = dispatch(cli) {
        println!();
        println!("ERROR: {:#}", e);
        println!("       (RUN WITH --help TO VIEW CONFIGURATION OPTIONS.)");
        std::process::exit(1);
    }
}
