// SHOREBENCH RUN SCHEDULER
// DRIVES ONE RUN'S INSTANCES THROUGH THE LIFECYCLE IN LOCK-STEP.
//
// PHASES 1-5 ARE BARRIERS: EVERY INSTANCE FINISHES A PHASE BEFORE ANY
// INSTANCE STARTS THE NEXT ONE.
//   1. PROVISION   2. SPAWN   3. WAIT-START   4. CONNECT   5. COMMANDS + STOP
// PHASE 6 (WAIT-STOP, HARVEST, APPEND, CLEAN) IS PER INSTANCE: ONE INSTANCE
// FAILING TO HARVEST DOES NOT KEEP THE OTHERS FROM BEING HARVESTED.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

use tracing::{info, warn};

use crate::affinity::{AffinityBinder, CoreSet};
use crate::catalog::{Catalog, Configuration, Run};
use crate::config::Template;
use crate::error::{BenchError, Result};
use crate::instance::{Instance, WaitPolicy, FAILED_MARKER};
use crate::results::{parse_log, ResultLog, ResultSet};
use crate::supervisor::Supervisor;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    // DIRECTORY HOLDING THE shore_kits EXECUTABLE
    pub exe_dir: PathBuf,
    pub temp_root: PathBuf,
    pub start_port: u16,
    pub start_wait: WaitPolicy,
    pub stop_wait: WaitPolicy,
    // KILL AND CLEAN EVERY INSTANCE OF A RUN THAT FAILS BEFORE HARVEST
    pub abort_on_failure: bool,
}

#[derive(Debug, Clone)]
pub struct InstanceReport {
    pub port: u16,
    pub cores: CoreSet,
    pub exit: Option<ExitStatus>,
    pub results: ResultSet,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub name: String,
    pub instances: Vec<InstanceReport>,
}

pub struct Runner<'a> {
    settings: RunnerSettings,
    template: &'a Template,
    binder: Arc<dyn AffinityBinder>,
    supervisor: &'a Supervisor,
    output: ResultLog,
    // u32: ONE PAST 65535 IS A VALID "NEXT" AFTER THE LAST PORT IS HANDED OUT
    next_port: u32,
}

impl<'a> Runner<'a> {
    pub fn new(
        settings: RunnerSettings,
        template: &'a Template,
        binder: Arc<dyn AffinityBinder>,
        supervisor: &'a Supervisor,
        output: ResultLog,
    ) -> Self {
        let next_port = u32::from(settings.start_port);
        Self { settings, template, binder, supervisor, output, next_port }
    }

    // FIRST PORT THE NEXT RUN WILL USE. PORTS ARE NEVER REUSED ACROSS RUNS.
    pub fn next_port(&self) -> u32 {
        self.next_port
    }

    fn allocate_ports(&mut self, count: usize) -> Result<Vec<u16>> {
        let base = self.next_port;
        let ports: Option<Vec<u16>> = (0..count)
            .map(|i| {
                u32::try_from(i)
                    .ok()
                    .and_then(|i| base.checked_add(i))
                    .and_then(|p| u16::try_from(p).ok())
            })
            .collect();
        let ports = ports.ok_or_else(|| {
            BenchError::Provision(format!("cannot allocate {} ports starting at {}", count, base))
        })?;
        if let Some(&last) = ports.last() {
            self.next_port = u32::from(last) + 1;
        }
        Ok(ports)
    }

    // EVERY RUN IN THE CATALOG, ASCENDING BY NAME. THE FIRST FAILURE STOPS EVERYTHING.
    pub fn run_all(&mut self, catalog: &Catalog) -> Result<Vec<RunReport>> {
        let mut reports = Vec::new();
        for (name, run) in catalog.runs() {
            let configuration = catalog.configuration(&run.configuration)?;
            reports.push(self.execute(name, run, configuration)?);
        }
        Ok(reports)
    }

    pub fn execute(
        &mut self,
        name: &str,
        run: &Run,
        configuration: &Configuration,
    ) -> Result<RunReport> {
        println!("RUN {}", name);
        self.supervisor.live().begin_run();

        let ports = self.allocate_ports(run.affinity.len())?;
        info!(run = name, ports = ?ports, instances = run.affinity.len(), "starting run");

        let mut instances = Vec::with_capacity(run.affinity.len());
        if let Err(e) = self.drive(name, run, configuration, ports, &mut instances) {
            if self.settings.abort_on_failure {
                abort(&mut instances);
            }
            return Err(e);
        }

        let mut reports = Vec::with_capacity(instances.len());
        let mut first_err = None;
        for inst in instances.iter_mut() {
            println!("WAITING FOR SERVER AT CORES {} TO FINISH...", inst.cores());
            match self.harvest(inst) {
                Ok(report) => {
                    inst.clean();
                    reports.push(report);
                }
                Err(e) => {
                    // KEEP THE DIRECTORY: shore.log IS THE ONLY DIAGNOSTIC
                    warn!(port = inst.port(), error = %e, "harvest failed");
                    inst.kill();
                    first_err.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }
        Ok(RunReport { name: name.to_string(), instances: reports })
    }

    fn drive(
        &self,
        name: &str,
        run: &Run,
        configuration: &Configuration,
        ports: Vec<u16>,
        instances: &mut Vec<Instance>,
    ) -> Result<()> {
        let cancel = self.supervisor.cancel_token();
        let live = self.supervisor.live();

        // 1. PROVISION
        for (port, cores) in ports.into_iter().zip(run.affinity.iter()) {
            instances.push(Instance::provision(
                self.template,
                &self.settings.exe_dir,
                port,
                &run.configuration,
                configuration,
                cores.clone(),
                &self.settings.temp_root,
            )?);
        }

        // 2. SPAWN
        for inst in instances.iter_mut() {
            println!("STARTING SERVER AT CORES {}...", inst.cores());
            inst.spawn(&self.binder, live)?;
        }

        // 3. WAIT-START (BARRIER)
        for inst in instances.iter_mut() {
            println!("WAITING FOR SERVER AT CORES {} TO INITIALIZE...", inst.cores());
            inst.wait_start(&self.settings.start_wait, cancel)?;
        }

        // 4. CONNECT
        for inst in instances.iter_mut() {
            println!("CONNECTING TO SERVER AT CORES {}...", inst.cores());
            inst.connect()?;
        }

        // 5. COMMANDS, THEN STOP
        println!("SENDING COMMANDS TO SERVERS...");
        for inst in instances.iter_mut() {
            for cmd in &run.commands {
                inst.send(cmd)?;
            }
            inst.stop()?;
        }

        self.output.begin_run(name)
    }

    fn harvest(&self, inst: &mut Instance) -> Result<InstanceReport> {
        let exit = inst.wait_stop(&self.settings.stop_wait, self.supervisor.cancel_token())?;
        let results = parse_log(&inst.output()?);
        self.output.append_results(&results)?;
        Ok(InstanceReport { port: inst.port(), cores: inst.cores().clone(), exit, results })
    }
}

// TEAR DOWN A FAILED RUN. SURFACE THE FAILED LINES BEFORE THE LOGS ARE REMOVED.
fn abort(instances: &mut [Instance]) {
    for inst in instances.iter_mut() {
        if let Some(pid) = inst.kill() {
            warn!(pid, port = inst.port(), "killed after run failure");
        }
        if let Ok(lines) = inst.output() {
            for line in lines.iter().filter(|l| l.contains(FAILED_MARKER)) {
                warn!(port = inst.port(), "{}", line);
            }
        }
        inst.clean();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    use crate::affinity::UnpinnedBinder;

    fn engine_dir(script: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join(crate::instance::ENGINE_BINARY);
        fs::write(&exe, format!("#!/bin/sh\n{}\n", script)).unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        dir
    }

    fn settings(exe: &Path, temp: &Path, abort_on_failure: bool) -> RunnerSettings {
        let wait =
            WaitPolicy { poll: Duration::from_millis(20), timeout: Some(Duration::from_secs(10)) };
        RunnerSettings {
            exe_dir: exe.to_path_buf(),
            temp_root: temp.to_path_buf(),
            start_port: 7100,
            start_wait: wait,
            stop_wait: wait,
            abort_on_failure,
        }
    }

    fn three_way() -> Run {
        Run {
            configuration: "tpcc-1".to_string(),
            affinity: vec![CoreSet::new(vec![0]), CoreSet::new(vec![1]), CoreSet::new(vec![2])],
            commands: vec!["sli".to_string()],
        }
    }

    fn dirs(temp: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(temp)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n != "output.log")
            .collect();
        names.sort();
        names
    }

    #[test]
    fn ports_consecutive_across_runs() {
        let template = Template::from_bytes("");
        let sup = Supervisor::new();
        let temp = tempfile::tempdir().unwrap();
        let mut r = Runner::new(
            settings(temp.path(), temp.path(), false),
            &template,
            Arc::new(UnpinnedBinder),
            &sup,
            ResultLog::new(temp.path().join("output.log")),
        );
        assert_eq!(r.allocate_ports(3).unwrap(), [7100, 7101, 7102]);
        assert_eq!(r.allocate_ports(1).unwrap(), [7103]);
        assert_eq!(r.next_port(), 7104);
        r.next_port = u32::from(u16::MAX) - 1;
        assert!(r.allocate_ports(3).is_err());
        assert_eq!(r.next_port(), 65534);
    }

    #[test]
    fn last_port_65535_is_usable() {
        let template = Template::from_bytes("");
        let sup = Supervisor::new();
        let temp = tempfile::tempdir().unwrap();
        let mut s = settings(temp.path(), temp.path(), false);
        s.start_port = u16::MAX;
        let mut r =
            Runner::new(s, &template, Arc::new(UnpinnedBinder), &sup, ResultLog::new(temp.path()));
        assert_eq!(r.allocate_ports(1).unwrap(), [65535]);
        assert_eq!(r.next_port(), 65536);
        assert!(r.allocate_ports(1).is_err());

        r.next_port = 65534;
        assert_eq!(r.allocate_ports(2).unwrap(), [65534, 65535]);
    }

    #[test]
    fn failed_spawn_aborts_run_after_provisioning_all() {
        let exe = engine_dir("echo 'FAILED shore_kits'\nexit 1");
        let temp = tempfile::tempdir().unwrap();
        let template = Template::from_bytes("");
        let sup = Supervisor::new();
        let mut r = Runner::new(
            settings(exe.path(), temp.path(), false),
            &template,
            Arc::new(UnpinnedBinder),
            &sup,
            ResultLog::new(temp.path().join("output.log")),
        );
        let err = r.execute("r", &three_way(), &Configuration::default()).unwrap_err();
        assert!(matches!(err, BenchError::Spawn { .. }));
        assert_eq!(dirs(temp.path()), ["tpcc-1-7100", "tpcc-1-7101", "tpcc-1-7102"]);
        assert_eq!(r.next_port(), 7103);
        // NOTHING IS WRITTEN FOR A RUN THAT NEVER GOT ITS COMMANDS OUT
        assert!(!temp.path().join("output.log").exists());
    }

    #[test]
    fn abort_on_failure_kills_and_cleans_peers() {
        // FIRST INSTANCE FAILS, THE OTHERS WOULD RUN FOREVER
        let exe = engine_dir(concat!(
            "case \"$3\" in\n",
            "  7100) echo 'FAILED device'; exit 1 ;;\n",
            "  *) echo 'Waiting for client connection'; sleep 30 ;;\n",
            "esac",
        ));
        let temp = tempfile::tempdir().unwrap();
        let template = Template::from_bytes("");
        let sup = Supervisor::new();
        let mut r = Runner::new(
            settings(exe.path(), temp.path(), true),
            &template,
            Arc::new(UnpinnedBinder),
            &sup,
            ResultLog::new(temp.path().join("output.log")),
        );
        let err = r.execute("r", &three_way(), &Configuration::default()).unwrap_err();
        assert!(matches!(err, BenchError::Spawn { .. }));
        assert!(dirs(temp.path()).is_empty());
        assert!(sup.live().is_empty());
    }

    #[test]
    fn provision_failure_names_prerequisite() {
        let temp = tempfile::tempdir().unwrap();
        let template = Template::from_bytes("");
        let sup = Supervisor::new();
        let mut r = Runner::new(
            settings(temp.path(), temp.path(), false),
            &template,
            Arc::new(UnpinnedBinder),
            &sup,
            ResultLog::new(temp.path().join("output.log")),
        );
        let err = r.execute("r", &three_way(), &Configuration::default()).unwrap_err();
        assert!(err.to_string().contains("Cannot find shore_kits"));
        assert!(dirs(temp.path()).is_empty());
    }
}
