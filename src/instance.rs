// SHOREBENCH INSTANCE
// ONE ENGINE PROCESS, ITS WORKING DIRECTORY AND ITS CONTROL CONNECTION.
//
// LIFECYCLE:
//   provision -> spawn -> wait_start -> connect -> send* -> stop
//             -> wait_stop -> output -> clean
// kill() IS VALID AT ANY POINT AFTER spawn.
//
// LAYOUT UNDER <temp-root>/<config>-<port>/:
//   shore.conf      GENERATED CONFIG
//   shore.log       ENGINE STDOUT + STDERR
//   databases/      DEVICE DIRECTORY
//   log-<config>/   ENGINE LOG DIRECTORY

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::affinity::{AffinityBinder, CoreSet};
use crate::catalog::Configuration;
use crate::config::{self, ConfigInputs, Template};
use crate::control::ControlConnection;
use crate::error::{BenchError, Result};
use crate::supervisor::{kill_group, CancelToken, LiveSet};

pub const ENGINE_BINARY: &str = "shore_kits";
pub const READY_MARKER: &str = "Waiting for client connection";
pub const FAILED_MARKER: &str = "FAILED";

// ---------------------------------------------------------------------------
// LAYOUT
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub dir: PathBuf,
    pub device_dir: PathBuf,
    pub log_dir: PathBuf,
    pub config_file: PathBuf,
    pub capture_file: PathBuf,
}

impl Layout {
    pub fn new(temp_root: &Path, config_name: &str, port: u16) -> Self {
        let dir = temp_root.join(format!("{}-{}", config_name, port));
        Self {
            device_dir: dir.join("databases"),
            log_dir: dir.join(format!("log-{}", config_name)),
            config_file: dir.join("shore.conf"),
            capture_file: dir.join("shore.log"),
            dir,
        }
    }
}

// ---------------------------------------------------------------------------
// WAITING
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub poll: Duration,
    // None: WAIT FOREVER (ONLY CTRL-C ENDS IT)
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self { poll: Duration::from_secs(1), timeout: None }
    }
}

fn poll_until<T>(
    policy: &WaitPolicy,
    cancel: &CancelToken,
    what: &str,
    mut step: impl FnMut() -> Result<Option<T>>,
) -> Result<T> {
    let start = Instant::now();
    loop {
        if let Some(v) = step()? {
            return Ok(v);
        }
        if cancel.is_cancelled() {
            return Err(BenchError::Cancelled(what.to_string()));
        }
        if let Some(limit) = policy.timeout {
            if start.elapsed() >= limit {
                return Err(BenchError::Timeout { what: what.to_string(), after: limit });
            }
        }
        std::thread::sleep(policy.poll);
    }
}

// ---------------------------------------------------------------------------
// INSTANCE
// ---------------------------------------------------------------------------

pub struct Instance {
    config_name: String,
    port: u16,
    cores: CoreSet,
    executable: PathBuf,
    layout: Layout,
    child: Option<Child>,
    pid: Option<u32>,
    live: Option<LiveSet>,
    binding: Option<(Arc<dyn AffinityBinder>, String)>,
    control: Option<ControlConnection>,
}

impl Instance {
    pub fn provision(
        template: &Template,
        exe_dir: &Path,
        port: u16,
        config_name: &str,
        configuration: &Configuration,
        cores: CoreSet,
        temp_root: &Path,
    ) -> Result<Self> {
        if !temp_root.exists() {
            return Err(BenchError::Provision(format!(
                "Temporary directory {} does not exist",
                temp_root.display()
            )));
        }
        let executable = exe_dir.join(ENGINE_BINARY);
        if !executable.exists() {
            return Err(BenchError::Provision(format!(
                "Cannot find {} in {}",
                ENGINE_BINARY,
                exe_dir.display()
            )));
        }

        let layout = Layout::new(temp_root, config_name, port);
        if layout.dir.exists() {
            let mut entries =
                fs::read_dir(&layout.dir).map_err(|e| BenchError::io(&layout.dir, e))?;
            if entries.next().is_some() {
                return Err(BenchError::Provision(format!(
                    "Temporary directory {} is not empty",
                    layout.dir.display()
                )));
            }
        } else {
            fs::create_dir_all(&layout.dir).map_err(|e| BenchError::io(&layout.dir, e))?;
        }
        fs::create_dir(&layout.device_dir).map_err(|e| BenchError::io(&layout.device_dir, e))?;
        fs::create_dir(&layout.log_dir).map_err(|e| BenchError::io(&layout.log_dir, e))?;

        config::materialize(
            template,
            &ConfigInputs {
                config_name,
                configuration,
                device_dir: &layout.device_dir,
                log_dir: &layout.log_dir,
                workers: cores.len(),
            },
            &layout.config_file,
        )?;

        debug!(dir = %layout.dir.display(), port, cores = %cores, "provisioned");
        Ok(Self {
            config_name: config_name.to_string(),
            port,
            cores,
            executable,
            layout,
            child: None,
            pid: None,
            live: None,
            binding: None,
            control: None,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn cores(&self) -> &CoreSet {
        &self.cores
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn label(&self) -> String {
        format!("{}:{} cores {}", self.config_name, self.port, self.cores)
    }

    // APPEND A LINE TO THE CAPTURE FILE. wait_start PICKS FAILED LINES UP.
    fn note(&self, line: &str) -> Result<()> {
        let path = &self.layout.capture_file;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| BenchError::io(path, e))?;
        writeln!(f, "\n{}", line).map_err(|e| BenchError::io(path, e))
    }

    // START THE ENGINE. BINDING OR EXEC FAILURES LAND IN THE CAPTURE FILE
    // AS A FAILED LINE AND SURFACE FROM wait_start.
    pub fn spawn(&mut self, binder: &Arc<dyn AffinityBinder>, live: &LiveSet) -> Result<()> {
        let capture = File::create(&self.layout.capture_file)
            .map_err(|e| BenchError::io(&self.layout.capture_file, e))?;
        let stderr = capture
            .try_clone()
            .map_err(|e| BenchError::io(&self.layout.capture_file, e))?;

        let mut binding = match binder.bind(&self.executable, &self.cores) {
            Ok(b) => b,
            Err(e) => {
                warn!(port = self.port, error = %e, "affinity binding failed");
                return self.note(&format!("{} {}", FAILED_MARKER, e));
            }
        };

        let spawned = binding
            .command
            .current_dir(&self.layout.dir)
            .arg("-n")
            .arg("-p")
            .arg(self.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(capture))
            .stderr(Stdio::from(stderr))
            .process_group(0)
            .spawn();

        match spawned {
            Ok(child) => {
                let pid = child.id();
                info!(
                    pid,
                    port = self.port,
                    cores = %self.cores,
                    binder = binder.name(),
                    "spawned"
                );
                live.register(pid, self.label());
                self.pid = Some(pid);
                self.child = Some(child);
                self.live = Some(live.clone());
                if let Some(handle) = binding.handle {
                    self.binding = Some((Arc::clone(binder), handle));
                }
                Ok(())
            }
            Err(e) => {
                warn!(port = self.port, error = %e, "spawn failed");
                if let Some(handle) = binding.handle.take() {
                    if let Err(e) = binder.release(&handle) {
                        warn!(error = %e, "release failed");
                    }
                }
                self.note(&format!("{} {}: {}", FAILED_MARKER, ENGINE_BINARY, e))
            }
        }
    }

    // CHILD IS GONE: DROP IT FROM THE LIVE SET AND RELEASE PLATFORM STATE
    fn reaped(&mut self, status: ExitStatus) {
        self.child = None;
        if let (Some(live), Some(pid)) = (&self.live, self.pid) {
            live.unregister(pid);
        }
        if let Some((binder, handle)) = self.binding.take() {
            if let Err(e) = binder.release(&handle) {
                warn!(port = self.port, error = %e, "release failed");
            }
        }
        debug!(port = self.port, %status, "reaped");
    }

    fn check_started(&mut self) -> Result<Option<()>> {
        let capture = self.layout.capture_file.clone();
        // ENGINE TRACE OUTPUT IS NOT GUARANTEED UTF-8
        let bytes = match fs::read(&capture) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(BenchError::io(&capture, e)),
        };
        if let Some(last) = String::from_utf8_lossy(&bytes).lines().last() {
            if last.contains(READY_MARKER) {
                return Ok(Some(()));
            }
            if last.contains(FAILED_MARKER) {
                return Err(BenchError::Spawn { capture });
            }
        }

        // ENGINE DIED BEFORE IT EVER BECAME READY
        let exited = match self.child.as_mut() {
            Some(child) => child.try_wait().map_err(|e| BenchError::io(&capture, e))?,
            None => None,
        };
        if let Some(status) = exited {
            self.reaped(status);
            self.note(&format!("{} {} exited with {}", FAILED_MARKER, ENGINE_BINARY, status))?;
            return Err(BenchError::Spawn { capture });
        }
        Ok(None)
    }

    pub fn wait_start(&mut self, policy: &WaitPolicy, cancel: &CancelToken) -> Result<()> {
        let what = format!("server at cores {} to initialize", self.cores);
        poll_until(policy, cancel, &what, || self.check_started())
    }

    pub fn connect(&mut self) -> Result<()> {
        self.control = Some(ControlConnection::open(self.port)?);
        Ok(())
    }

    fn control(&mut self) -> Result<&mut ControlConnection> {
        let port = self.port;
        self.control.as_mut().ok_or_else(|| BenchError::Connect {
            port,
            source: io::Error::new(io::ErrorKind::NotConnected, "not connected"),
        })
    }

    pub fn send(&mut self, cmd: &str) -> Result<()> {
        self.control()?.send(cmd)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.control()?;
        if let Some(conn) = self.control.take() {
            conn.stop()?;
        }
        Ok(())
    }

    // REAP THE ENGINE. None IF IT WAS NEVER STARTED OR IS ALREADY REAPED.
    pub fn wait_stop(
        &mut self,
        policy: &WaitPolicy,
        cancel: &CancelToken,
    ) -> Result<Option<ExitStatus>> {
        if self.child.is_none() {
            return Ok(None);
        }
        let capture = self.layout.capture_file.clone();
        let what = format!("server at cores {} to finish", self.cores);
        let status = poll_until(policy, cancel, &what, || match self.child.as_mut() {
            Some(child) => child.try_wait().map_err(|e| BenchError::io(&capture, e)),
            None => Ok(None),
        })?;
        self.reaped(status);
        if !status.success() {
            warn!(port = self.port, %status, "engine exited abnormally");
            self.note(&format!("{} {} exited with {}", FAILED_MARKER, ENGINE_BINARY, status))?;
        }
        Ok(Some(status))
    }

    pub fn output(&self) -> Result<Vec<String>> {
        let path = &self.layout.capture_file;
        let bytes = fs::read(path).map_err(|e| BenchError::io(path, e))?;
        Ok(String::from_utf8_lossy(&bytes).lines().map(str::to_string).collect())
    }

    // BEST EFFORT: A LEFTOVER DIRECTORY MUST NOT STOP THE REMAINING RUNS
    pub fn clean(&self) {
        if let Err(e) = fs::remove_dir_all(&self.layout.dir) {
            warn!(dir = %self.layout.dir.display(), error = %e, "clean failed");
        }
    }

    // SIGKILL THE ENGINE'S PROCESS GROUP AND REAP IT. RETURNS THE PID.
    pub fn kill(&mut self) -> Option<u32> {
        self.control = None;
        let pid = self.pid?;
        let mut child = self.child.take()?;
        kill_group(pid);
        match child.wait() {
            Ok(status) => self.reaped(status),
            Err(e) => warn!(pid, error = %e, "wait after kill failed"),
        }
        Some(pid)
    }
}
