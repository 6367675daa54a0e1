// CATALOG LISTING -- WHAT `run` WOULD EXECUTE, IN ORDER

use anyhow::Result;

use super::CatalogArgs;

pub fn run_list(args: &CatalogArgs) -> Result<()> {
    let catalog = args.load()?;

    println!("CONFIGURATIONS");
    println!(
        "{:<12} {:>4} {:>10} {:>10} {:>10} {:>10} {:<10} {:<10} {:<8}",
        "NAME",
        "SF",
        "QUOTA_KB",
        "BUFPOOL_KB",
        "LOG_KB",
        "LOGBUF_KB",
        "SYSTEM",
        "BENCHMARK",
        "DESIGN",
    );
    println!("{}", "-".repeat(94));
    for (name, c) in &catalog.configurations {
        println!(
            "{:<12} {:>4} {:>10} {:>10} {:>10} {:>10} {:<10} {:<10} {:<8}",
            name,
            c.scale_factor,
            c.device_quota,
            c.buffer_pool_size,
            c.log_size,
            c.log_buffer_size,
            c.system,
            c.benchmark,
            c.design
        );
    }
    println!();

    println!("RUNS");
    for (name, run) in catalog.runs() {
        println!("  {} ({}, {} INSTANCES)", name, run.configuration, run.affinity.len());
        for group in &run.affinity {
            println!("    CORES {}", group);
        }
        println!("    COMMANDS {:?}", run.commands);
    }

    Ok(())
}
