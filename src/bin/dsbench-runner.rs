//! Benchmark driver
//!
//! Usage:
//!   1. Start the server: cargo run --release
//!   2. Run the driver: cargo run --release --bin dsbench-runner -- http://localhost:8080

use clap::Parser;
use dsbench::runner::{Runner, DEFAULT_ITERATIONS, DEFAULT_ROUND};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dsbench-runner")]
#[command(about = "Time the dsbench test endpoints over many iterations", long_about = None)]
struct Args {
    /// Base URL of a running dsbench server
    base_url: String,

    /// Timed calls per test (after one warm-up call)
    #[arg(short = 'n', long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,

    /// Decimals kept in the averages
    #[arg(long, default_value_t = DEFAULT_ROUND)]
    round: u32,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dsbench=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runner = Runner::new(&args.base_url, args.iterations, args.round)?.with_progress(!args.quiet);
    runner.run_suite(|line| println!("{}", line)).await?;

    Ok(())
}
