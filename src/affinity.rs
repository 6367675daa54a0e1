// SHOREBENCH AFFINITY BINDERS
// TURN (PROGRAM, CORE SET) INTO A COMMAND WHOSE PROCESS RUNS ONLY ON THOSE CORES.
//
// ONE TRAIT, ONE IMPLEMENTATION PER PLATFORM MECHANISM:
//   taskset  -- LINUX, WRAPS THE ENGINE IN `taskset -c`
//   sched    -- LINUX, sched_setaffinity() IN THE CHILD BEFORE EXEC
//   psrset   -- SOLARIS/ILLUMOS, CREATES A PROCESSOR SET, DELETES IT ON RELEASE
//   none     -- NO PINNING (UNSUPPORTED PLATFORMS, DRY RUNS)

use std::fmt;
use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::error::{BenchError, Result};

// ---------------------------------------------------------------------------
// CORE SET
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct CoreSet(Vec<u32>);

impl CoreSet {
    pub fn new(cores: Vec<u32>) -> Self {
        Self(cores)
    }

    pub fn cores(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // CONTIGUOUS RANGE [start, start + count)
    pub fn range(start: u32, count: u32) -> Self {
        Self((start..start + count).collect())
    }
}

// "0,1,2" -- taskset LIST FORM
impl fmt::Display for CoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", list.join(","))
    }
}

// ---------------------------------------------------------------------------
// BINDER INTERFACE
// ---------------------------------------------------------------------------

// A COMMAND READY FOR THE CALLER TO ADD ARGUMENTS, CWD AND STDIO.
// `handle` IDENTIFIES PLATFORM STATE THAT MUST BE RELEASED AFTER THE PROCESS EXITS.
pub struct Binding {
    pub command: Command,
    pub handle: Option<String>,
}

impl Binding {
    fn plain(command: Command) -> Self {
        Self { command, handle: None }
    }
}

pub trait AffinityBinder: Send + Sync {
    fn name(&self) -> &'static str;

    fn bind(&self, program: &Path, cores: &CoreSet) -> Result<Binding>;

    fn release(&self, _handle: &str) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TASKSET
// ---------------------------------------------------------------------------

pub struct TasksetBinder;

impl AffinityBinder for TasksetBinder {
    fn name(&self) -> &'static str {
        "taskset"
    }

    fn bind(&self, program: &Path, cores: &CoreSet) -> Result<Binding> {
        if cores.is_empty() {
            return Err(BenchError::Bind { binder: self.name(), reason: "empty core set".into() });
        }
        let mut cmd = Command::new("taskset");
        cmd.arg("-c").arg(cores.to_string()).arg(program);
        Ok(Binding::plain(cmd))
    }
}

// ---------------------------------------------------------------------------
// SCHED_SETAFFINITY
// ---------------------------------------------------------------------------

pub struct SchedAffinityBinder;

#[cfg(target_os = "linux")]
impl AffinityBinder for SchedAffinityBinder {
    fn name(&self) -> &'static str {
        "sched"
    }

    fn bind(&self, program: &Path, cores: &CoreSet) -> Result<Binding> {
        use std::os::unix::process::CommandExt;

        if cores.is_empty() {
            return Err(BenchError::Bind { binder: self.name(), reason: "empty core set".into() });
        }
        // cpu_set_t HOLDS CPU_SETSIZE (1024) BITS
        let max = (std::mem::size_of::<libc::cpu_set_t>() * 8) as u32;
        if let Some(&bad) = cores.cores().iter().find(|&&c| c >= max) {
            return Err(BenchError::Bind {
                binder: self.name(),
                reason: format!("core {} exceeds cpu_set_t capacity {}", bad, max),
            });
        }

        let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        for &cpu in cores.cores() {
            unsafe { libc::CPU_SET(cpu as usize, &mut set) };
        }

        let mut cmd = Command::new(program);
        // RUNS IN THE FORKED CHILD: ONLY ASYNC-SIGNAL-SAFE CALLS
        unsafe {
            cmd.pre_exec(move || {
                if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        Ok(Binding::plain(cmd))
    }
}

#[cfg(not(target_os = "linux"))]
impl AffinityBinder for SchedAffinityBinder {
    fn name(&self) -> &'static str {
        "sched"
    }

    fn bind(&self, _program: &Path, _cores: &CoreSet) -> Result<Binding> {
        Err(BenchError::Bind {
            binder: self.name(),
            reason: "sched_setaffinity is only available on linux".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// PSRSET (SOLARIS / ILLUMOS)
// ---------------------------------------------------------------------------

pub struct PsrsetBinder {
    user: String,
    library_path: String,
}

impl PsrsetBinder {
    pub fn from_env() -> Self {
        Self {
            user: std::env::var("USER").unwrap_or_default(),
            library_path: std::env::var("LD_LIBRARY_PATH").unwrap_or_default(),
        }
    }
}

// `psrset -c` PRINTS "created processor set N" -- THE SET ID IS THE LAST WORD
// OF THE FIRST LINE
pub fn parse_psrset_id(output: &str) -> Option<String> {
    let first = output.lines().next()?.trim();
    let id = first.rsplit(' ').next()?.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

impl AffinityBinder for PsrsetBinder {
    fn name(&self) -> &'static str {
        "psrset"
    }

    fn bind(&self, program: &Path, cores: &CoreSet) -> Result<Binding> {
        let out = Command::new("sudo")
            .arg("psrset")
            .arg("-c")
            .args(cores.cores().iter().map(|c| c.to_string()))
            .output()
            .map_err(|e| BenchError::Bind { binder: self.name(), reason: e.to_string() })?;
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        );
        if !out.status.success() {
            return Err(BenchError::Bind { binder: self.name(), reason: text.trim().to_string() });
        }
        let set = parse_psrset_id(&text).ok_or_else(|| BenchError::Bind {
            binder: self.name(),
            reason: format!("unrecognized psrset output: {}", text.trim()),
        })?;

        // psrset -e NEEDS ROOT; DROP BACK TO THE INVOKING USER FOR THE ENGINE
        let mut cmd = Command::new("sudo");
        cmd.args(["psrset", "-e", &set, "sudo", "-u", &self.user])
            .arg(format!("LD_LIBRARY_PATH={}", self.library_path))
            .arg(program);
        Ok(Binding { command: cmd, handle: Some(set) })
    }

    fn release(&self, handle: &str) -> Result<()> {
        let status = Command::new("sudo")
            .args(["psrset", "-d", handle])
            .status()
            .map_err(|e| BenchError::Bind { binder: self.name(), reason: e.to_string() })?;
        if !status.success() {
            return Err(BenchError::Bind {
                binder: self.name(),
                reason: format!("psrset -d {} exited with {}", handle, status),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// UNPINNED
// ---------------------------------------------------------------------------

pub struct UnpinnedBinder;

impl AffinityBinder for UnpinnedBinder {
    fn name(&self) -> &'static str {
        "none"
    }

    fn bind(&self, program: &Path, _cores: &CoreSet) -> Result<Binding> {
        Ok(Binding::plain(Command::new(program)))
    }
}

// ---------------------------------------------------------------------------
// SELECTION
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum BinderKind {
    Taskset,
    Sched,
    Psrset,
    None,
}

impl BinderKind {
    pub fn platform_default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Taskset
        } else if cfg!(any(target_os = "solaris", target_os = "illumos")) {
            Self::Psrset
        } else {
            Self::None
        }
    }

    pub fn build(self) -> Box<dyn AffinityBinder> {
        match self {
            Self::Taskset => Box::new(TasksetBinder),
            Self::Sched => Box::new(SchedAffinityBinder),
            Self::Psrset => Box::new(PsrsetBinder::from_env()),
            Self::None => Box::new(UnpinnedBinder),
        }
    }
}
