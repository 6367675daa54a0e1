// PREREQUISITE CHECK -- EVERYTHING `run` NEEDS, WITHOUT STARTING ANYTHING

use std::net::TcpListener;
use std::process::Command;

use anyhow::Result;

use shorebench::affinity::BinderKind;
use shorebench::instance::ENGINE_BINARY;

use super::RunArgs;

fn check_tool(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn report(label: &str, ok: bool, detail: &str) -> bool {
    println!("  {:<24}{}{}", label, if ok { "OK" } else { "MISSING" }, detail);
    ok
}

pub fn run_check(args: &RunArgs) -> Result<()> {
    println!("SHOREBENCH PREREQUISITE CHECK");
    println!();

    let mut ok = true;
    let kind = args.binder_kind();
    let tools: &[&str] = match kind {
        BinderKind::Taskset => &["taskset"],
        BinderKind::Psrset => &["sudo", "psrset"],
        BinderKind::Sched | BinderKind::None => &[],
    };
    println!("BINDER: {:?}", kind);
    for tool in tools {
        ok &= report(tool, check_tool(tool), "");
    }
    println!();

    println!("FILES:");
    let exe = args.exe_dir().join(ENGINE_BINARY);
    ok &= report(ENGINE_BINARY, exe.exists(), &format!("  ({})", exe.display()));
    ok &= report("template", args.template.exists(), &format!("  ({})", args.template.display()));
    let temp = args.temp_root();
    ok &= report("temp directory", temp.is_dir(), &format!("  ({})", temp.display()));
    println!();

    // EVERY PORT THE WHOLE CATALOG WILL CLAIM MUST BE FREE RIGHT NOW
    println!("PORTS:");
    let catalog = args.catalog.load()?.select(&args.runs)?;
    let needed: usize = catalog.runs().map(|(_, r)| r.affinity.len()).sum();
    let busy: Vec<u16> = (0..needed)
        .filter_map(|i| u16::try_from(i).ok().and_then(|i| args.start_port.checked_add(i)))
        .filter(|&p| TcpListener::bind(("127.0.0.1", p)).is_err())
        .collect();
    let range = format!(
        "  ({}..{}, {} PORTS)",
        args.start_port,
        args.start_port as usize + needed,
        needed
    );
    if busy.is_empty() {
        report("port range", true, &range);
    } else {
        println!("  {:<24}BUSY {:?}", "port range", busy);
        ok = false;
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        std::process::exit(1);
    }
    Ok(())
}
