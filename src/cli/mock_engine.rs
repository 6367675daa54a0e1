// MOCK ENGINE -- STANDS IN FOR shore_kits
// SAME INVOCATION (-n -p PORT), SAME READINESS LINE, SAME CONTROL PROTOCOL.
// USED FOR DRY RUNS OF THE HARNESS AND BY THE LIFECYCLE TESTS.
//
// NOTHING BUT THE ENGINE'S OWN LINES MAY REACH STDOUT/STDERR: THE DRIVER
// READS THE LAST LINE OF THE CAPTURE FILE TO DETECT READINESS.

use std::io::{BufRead, BufReader};
use std::net::TcpListener;

use anyhow::{Context, Result};
use clap::Args;

use shorebench::instance::READY_MARKER;

#[derive(Args, Clone)]
pub struct MockEngineArgs {
    // NON-INTERACTIVE (ACCEPTED FOR COMPATIBILITY, ALWAYS ON)
    #[arg(short = 'n')]
    pub non_interactive: bool,

    #[arg(short = 'p')]
    pub port: u16,

    // THROUGHPUT REPORTED FOR EVERY MEASURED TRIAL
    #[arg(long, default_value_t = 1000.0)]
    pub tps: f64,
}

// measure <threads> <iterations> <scale> <duration> <warmup> <trials>
fn trials(cmd: &str) -> usize {
    cmd.split_whitespace()
        .nth(6)
        .and_then(|t| t.parse().ok())
        .unwrap_or(1)
}

pub fn run_mock_engine(args: &MockEngineArgs) -> Result<()> {
    println!("mock shore-kits on port {}", args.port);
    let listener = TcpListener::bind(("127.0.0.1", args.port))
        .with_context(|| format!("binding port {}", args.port))?;
    println!("{}...", READY_MARKER);

    let (stream, peer) = listener.accept().context("accepting control connection")?;
    println!("client {} connected", peer);

    for line in BufReader::new(stream).lines() {
        let line = line.context("reading control connection")?;
        let cmd = line.trim();
        match cmd.split_whitespace().next() {
            None => continue,
            Some("quit") => {
                println!("quit received, shutting down");
                break;
            }
            Some("measure") => {
                for t in 0..trials(cmd) {
                    println!("trial {}: TPS: ({:.2})", t, args.tps);
                }
            }
            Some(other) => println!("{} enabled", other),
        }
    }
    Ok(())
}
