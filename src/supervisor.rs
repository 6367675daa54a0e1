// SHOREBENCH SIGNAL SUPERVISOR
// TRACKS EVERY LIVE ENGINE PROCESS OF THE CURRENT RUN SO CTRL-C CAN SIGKILL THEM.
//
// THE RUNNER REGISTERS/UNREGISTERS FROM THE MAIN THREAD. THE CTRLC HANDLER
// THREAD READS THE SAME SET. A MUTEX GUARDS IT; THE CANCEL TOKEN IS A BARE ATOMIC.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveProcess {
    pub pid: u32,
    pub label: String,
}

// SIGKILL THE PROCESS GROUP LED BY pid. ENGINES ARE SPAWNED AS GROUP LEADERS
// SO WRAPPERS (taskset, sudo, psrset) AND THE ENGINE DIE TOGETHER.
pub fn kill_group(pid: u32) -> bool {
    let pgid = pid as libc::pid_t;
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        return true;
    }
    // NOT A GROUP LEADER (OR ALREADY GONE): FALL BACK TO THE PID
    unsafe { libc::kill(pgid, libc::SIGKILL) == 0 }
}

#[derive(Clone, Default)]
pub struct LiveSet {
    inner: Arc<Mutex<Vec<LiveProcess>>>,
}

impl LiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LiveProcess>> {
        // A PANIC WHILE HOLDING THE LOCK LEAVES A VALID Vec; KEEP USING IT
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    // FORGET EVERYTHING FROM THE PREVIOUS RUN
    pub fn begin_run(&self) {
        self.lock().clear();
    }

    pub fn register(&self, pid: u32, label: impl Into<String>) {
        self.lock().push(LiveProcess { pid, label: label.into() });
    }

    pub fn unregister(&self, pid: u32) {
        self.lock().retain(|p| p.pid != pid);
    }

    pub fn snapshot(&self) -> Vec<LiveProcess> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // SIGKILL EVERY REGISTERED PROCESS. RETURNS THE PIDS SIGNALLED.
    pub fn kill_all(&self) -> Vec<u32> {
        let live = self.snapshot();
        let mut killed = Vec::with_capacity(live.len());
        for p in &live {
            if kill_group(p.pid) {
                killed.push(p.pid);
            } else {
                warn!(pid = p.pid, label = %p.label, "kill failed");
            }
        }
        killed
    }
}

#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct Supervisor {
    live: LiveSet,
    cancel: CancelToken,
    controller: u32,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            live: LiveSet::new(),
            cancel: CancelToken::new(),
            controller: std::process::id(),
        }
    }

    pub fn live(&self) -> &LiveSet {
        &self.live
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    // WHAT THE CTRL-C HANDLER DOES, MINUS THE EXIT. RETURNS None WHEN CALLED
    // OUTSIDE THE CONTROLLING PROCESS: A CHILD NEVER TOUCHES ITS SIBLINGS.
    pub fn interrupt(&self) -> Option<Vec<u32>> {
        interrupt(self.controller, &self.live, &self.cancel)
    }

    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let live = self.live.clone();
        let cancel = self.cancel.clone();
        let controller = self.controller;
        ctrlc::set_handler(move || {
            if let Some(killed) = interrupt(controller, &live, &cancel) {
                println!("CTRL-C CAUGHT");
                for pid in killed {
                    println!("SENT SIGKILL TO {}", pid);
                }
            }
            std::process::exit(130);
        })
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

fn interrupt(controller: u32, live: &LiveSet, cancel: &CancelToken) -> Option<Vec<u32>> {
    if std::process::id() != controller {
        return None;
    }
    cancel.cancel();
    let killed = live.kill_all();
    info!(count = killed.len(), "killed live instances");
    Some(killed)
}
