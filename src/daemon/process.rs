use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    /// `None` when the name could not be read.
    pub name: Option<String>,
}

/// Enumerates and terminates running processes.
pub trait ProcessLister {
    fn processes(&mut self) -> Result<Vec<ProcessInfo>>;

    fn current_pid(&self) -> u32;

    fn terminate(&mut self, pid: u32) -> Result<()>;
}

/// Terminates every process called `name` except the current one.
///
/// Failing to enumerate is an error; a process that cannot be terminated is
/// logged and skipped. Returns how many processes were signalled.
pub fn stop_all_instances<L: ProcessLister>(lister: &mut L, name: &str) -> Result<usize> {
    let processes = lister
        .processes()
        .context("failed to enumerate processes")?;
    let own_pid = lister.current_pid();
    let mut stopped = 0;

    for process in processes {
        let Some(process_name) = process.name.as_deref() else {
            continue;
        };
        if process_name != name || process.pid == own_pid {
            continue;
        }

        match lister.terminate(process.pid) {
            Ok(()) => {
                info!("terminated {name} process (pid={})", process.pid);
                stopped += 1;
            }
            Err(err) => warn!("failed to terminate {name} process (pid={}): {err:#}", process.pid),
        }
    }

    Ok(stopped)
}

pub struct SysinfoProcessLister {
    system: System,
}

impl SysinfoProcessLister {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProcessLister {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLister for SysinfoProcessLister {
    fn processes(&mut self) -> Result<Vec<ProcessInfo>> {
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::new());

        let processes: Vec<ProcessInfo> = self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| {
                let name = process.name().to_string_lossy();
                ProcessInfo {
                    pid: pid.as_u32(),
                    name: (!name.is_empty()).then(|| name.into_owned()),
                }
            })
            .collect();

        debug!("enumerated {} processes", processes.len());
        if processes.is_empty() {
            return Err(anyhow!("process table is empty"));
        }
        Ok(processes)
    }

    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn terminate(&mut self, pid: u32) -> Result<()> {
        let process = self
            .system
            .process(Pid::from_u32(pid))
            .ok_or_else(|| anyhow!("process {pid} is gone"))?;

        // Platforms without SIGTERM fall back to a hard kill.
        let delivered = process
            .kill_with(Signal::Term)
            .unwrap_or_else(|| process.kill());
        if delivered {
            Ok(())
        } else {
            Err(anyhow!("signal was not delivered to process {pid}"))
        }
    }
}
