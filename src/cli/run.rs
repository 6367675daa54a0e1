use std::sync::Arc;

use anyhow::{Context, Result};

use shorebench::affinity::AffinityBinder;
use shorebench::config::Template;
use shorebench::instance::WaitPolicy;
use shorebench::results::{ResultLog, THROUGHPUT};
use shorebench::runner::{RunReport, Runner, RunnerSettings};
use shorebench::supervisor::Supervisor;

use super::RunArgs;

pub fn run_bench(args: &RunArgs) -> Result<()> {
    let exe_dir = args.exe_dir();
    let temp_root = args.temp_root();
    let kind = args.binder_kind();

    println!("RUNNING WITH SETTINGS:");
    println!("  OUTPUT LOG FILE:   {}", args.output.display());
    println!("  TEMPLATE FILE:     {}", args.template.display());
    println!("  SHORE_KITS DIR:    {}", exe_dir.display());
    println!("  TEMP DIRECTORY:    {}", temp_root.display());
    println!("  START PORT:        {}", args.start_port);
    println!("  BINDER:            {:?}", kind);
    println!();

    let catalog = args.catalog.load()?.select(&args.runs)?;
    let template = Template::load(&args.template)?;
    let binder: Arc<dyn AffinityBinder> = Arc::from(kind.build());

    let supervisor = Supervisor::new();
    supervisor.install().context("installing ctrl-c handler")?;

    let settings = RunnerSettings {
        exe_dir,
        temp_root,
        start_port: args.start_port,
        start_wait: WaitPolicy {
            poll: args.poll_interval.into(),
            timeout: args.start_timeout.map(Into::into),
        },
        stop_wait: WaitPolicy {
            poll: args.poll_interval.into(),
            timeout: args.stop_timeout.map(Into::into),
        },
        abort_on_failure: args.kill_on_failure,
    };

    let output = ResultLog::new(&args.output);
    let mut runner = Runner::new(settings, &template, binder, &supervisor, output);
    let reports = runner.run_all(&catalog)?;
    summary(&reports);
    Ok(())
}

fn summary(reports: &[RunReport]) {
    if reports.is_empty() {
        return;
    }

    println!("\n{}", "=".repeat(60));
    println!("SHOREBENCH SUMMARY");
    println!("{}", "=".repeat(60));
    println!("{:<16} {:>9} {:>9} {:>14}", "RUN", "INSTANCES", "SAMPLES", "TOTAL TPS");
    println!("{}", "-".repeat(60));
    for r in reports {
        let samples: Vec<&String> = r
            .instances
            .iter()
            .flat_map(|i| i.results.samples(THROUGHPUT))
            .collect();
        // SUM OF PER-INSTANCE MEANS: AGGREGATE THROUGHPUT OF THE MACHINE
        let total: f64 = r
            .instances
            .iter()
            .filter_map(|i| {
                let vals: Vec<f64> = i
                    .results
                    .samples(THROUGHPUT)
                    .iter()
                    .filter_map(|s| s.parse::<f64>().ok())
                    .collect();
                if vals.is_empty() {
                    None
                } else {
                    Some(vals.iter().sum::<f64>() / vals.len() as f64)
                }
            })
            .sum();
        println!("{:<16} {:>9} {:>9} {:>14.1}", r.name, r.instances.len(), samples.len(), total);
    }
}
