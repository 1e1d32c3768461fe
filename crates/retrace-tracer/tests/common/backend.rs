use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use retrace_tracer::backend::{Symbol, SymbolTable, TraceBackend};
use retrace_tracer::{Command, Event, ProcessId};
use tokio::sync::mpsc;

pub const SIGSTOP: i32 = 19;
pub const SYS_WRITE: u64 = 1;
pub const SYS_FORK: u64 = 57;
pub const SYS_EXECVE: u64 = 59;

pub const DEFAULT_EXE: &str = "/usr/bin/mock";

/// Backend primitive invoked by the tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Attach(ProcessId),
    Launch(ProcessId),
    Detach(ProcessId),
    SendSignal(ProcessId, i32),
    Resume(ProcessId),
    ResumeAfterSignal(ProcessId, i32),
    ResumeAfterBreakpoint(ProcessId, u64),
    FinishReinstall(ProcessId, u64),
    Install(ProcessId, u64),
    Remove(ProcessId, u64),
    Reset(ProcessId),
    DisableAll(ProcessId),
    EnableAll(ProcessId),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("process {0} refused attachment")]
    AttachRefused(ProcessId),

    #[error("no breakpoint at {1:#x} in process {0}")]
    NoBreakpoint(ProcessId, u64),

    #[error("process {0} is gone")]
    Gone(ProcessId),

    #[error("unreadable image of process {0}")]
    UnreadableImage(ProcessId),
}

#[derive(Debug, Default)]
struct Breakpoints {
    entries: BTreeSet<u64>,
    returns: BTreeMap<u64, usize>,
    enabled: bool,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    breakpoints: HashMap<ProcessId, Breakpoints>,
    images: HashMap<PathBuf, Vec<Symbol>>,
    exe_paths: HashMap<ProcessId, PathBuf>,
    return_addrs: HashMap<ProcessId, u64>,
    syscall_returns: HashMap<ProcessId, i64>,
    acknowledging: HashSet<ProcessId>,
    refusing: HashSet<ProcessId>,
    unreadable: HashSet<ProcessId>,
    failing_signals: HashSet<ProcessId>,
    failing_detaches: HashSet<ProcessId>,
    next_pid: ProcessId,
}

/// Scripted backend: events are queued by the test, and every primitive
/// invoked by the tracer is recorded.
pub struct MockBackend {
    state: Arc<Mutex<State>>,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl MockBackend {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let state = State {
            next_pid: 100,
            ..Default::default()
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            tx,
            rx,
        }
    }

    /// Returns a handle to script and inspect the backend once it is owned
    /// by the tracer.
    pub fn controller(&self) -> MockController {
        MockController {
            state: Arc::clone(&self.state),
            tx: self.tx.clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }
}

impl TraceBackend for MockBackend {
    type Error = Error;

    const QUIESCING_SIGNAL: i32 = SIGSTOP;

    async fn wait_event(&mut self) -> Result<Event, Self::Error> {
        match self.rx.recv().await {
            Some(event) => Ok(event),
            None => std::future::pending().await,
        }
    }

    fn attach(&mut self, pid: ProcessId) -> Result<(), Self::Error> {
        self.record(Call::Attach(pid));

        if self.state().refusing.contains(&pid) {
            return Err(Error::AttachRefused(pid));
        }

        Ok(())
    }

    fn launch(&mut self, _command: &Command) -> Result<ProcessId, Self::Error> {
        let pid = {
            let mut state = self.state();
            let pid = state.next_pid;
            state.next_pid += 1;
            pid
        };

        self.record(Call::Launch(pid));

        Ok(pid)
    }

    fn detach(&mut self, pid: ProcessId) -> Result<(), Self::Error> {
        self.record(Call::Detach(pid));

        if self.state().failing_detaches.contains(&pid) {
            return Err(Error::Gone(pid));
        }

        Ok(())
    }

    fn send_signal(&mut self, pid: ProcessId, signal: i32) -> Result<(), Self::Error> {
        self.record(Call::SendSignal(pid, signal));

        if self.state().failing_signals.contains(&pid) {
            return Err(Error::Gone(pid));
        }

        if signal == SIGSTOP && self.state().acknowledging.contains(&pid) {
            let _ = self.tx.send(Event::Signal { pid, signal });
        }

        Ok(())
    }

    fn resume(&mut self, pid: ProcessId) -> Result<(), Self::Error> {
        self.record(Call::Resume(pid));
        Ok(())
    }

    fn resume_after_signal(&mut self, pid: ProcessId, signal: i32) -> Result<(), Self::Error> {
        self.record(Call::ResumeAfterSignal(pid, signal));
        Ok(())
    }

    fn resume_after_breakpoint(&mut self, pid: ProcessId, addr: u64) -> Result<bool, Self::Error> {
        self.record(Call::ResumeAfterBreakpoint(pid, addr));

        let state = self.state();
        let still_installed = state.breakpoints.get(&pid).is_some_and(|bps| {
            bps.enabled && (bps.entries.contains(&addr) || bps.returns.contains_key(&addr))
        });

        Ok(still_installed)
    }

    fn finish_breakpoint_reinstall(
        &mut self,
        pid: ProcessId,
        addr: u64,
    ) -> Result<(), Self::Error> {
        self.record(Call::FinishReinstall(pid, addr));
        Ok(())
    }

    fn install_breakpoint(&mut self, pid: ProcessId, addr: u64) -> Result<(), Self::Error> {
        self.record(Call::Install(pid, addr));

        *self
            .state()
            .breakpoints
            .entry(pid)
            .or_default()
            .returns
            .entry(addr)
            .or_default() += 1;

        Ok(())
    }

    fn remove_breakpoint(&mut self, pid: ProcessId, addr: u64) -> Result<(), Self::Error> {
        self.record(Call::Remove(pid, addr));

        let mut state = self.state();
        let returns = &mut state.breakpoints.entry(pid).or_default().returns;

        let count = returns
            .get_mut(&addr)
            .ok_or(Error::NoBreakpoint(pid, addr))?;
        *count -= 1;

        if *count == 0 {
            returns.remove(&addr);
        }

        Ok(())
    }

    fn reset_breakpoints(
        &mut self,
        pid: ProcessId,
        entry_addrs: impl IntoIterator<Item = u64>,
    ) -> Result<(), Self::Error> {
        self.record(Call::Reset(pid));

        self.state().breakpoints.insert(
            pid,
            Breakpoints {
                entries: entry_addrs.into_iter().collect(),
                ..Default::default()
            },
        );

        Ok(())
    }

    fn disable_all_breakpoints(&mut self, pid: ProcessId) -> Result<(), Self::Error> {
        self.record(Call::DisableAll(pid));
        self.state().breakpoints.entry(pid).or_default().enabled = false;
        Ok(())
    }

    fn enable_all_breakpoints(&mut self, pid: ProcessId) -> Result<(), Self::Error> {
        self.record(Call::EnableAll(pid));
        self.state().breakpoints.entry(pid).or_default().enabled = true;
        Ok(())
    }

    fn stack_pointer(&mut self, _pid: ProcessId) -> Result<u64, Self::Error> {
        Ok(0x7ffc_0000)
    }

    fn return_address(&mut self, pid: ProcessId, _stack_pointer: u64) -> Result<u64, Self::Error> {
        Ok(self.state().return_addrs.get(&pid).copied().unwrap_or(0))
    }

    fn syscall_return_value(&mut self, pid: ProcessId) -> Result<i64, Self::Error> {
        Ok(self.state().syscall_returns.get(&pid).copied().unwrap_or(0))
    }

    fn is_fork_syscall(&self, number: u64) -> bool {
        number == SYS_FORK
    }

    fn is_exec_syscall(&self, number: u64) -> bool {
        number == SYS_EXECVE
    }

    fn syscall_name(&self, number: u64) -> Cow<'static, str> {
        match number {
            SYS_WRITE => Cow::Borrowed("SYS_write"),
            SYS_FORK => Cow::Borrowed("SYS_fork"),
            SYS_EXECVE => Cow::Borrowed("SYS_execve"),
            n => Cow::Owned(format!("SYS_{n}")),
        }
    }

    fn executable_path(&mut self, pid: ProcessId) -> Result<PathBuf, Self::Error> {
        Ok(self
            .state()
            .exe_paths
            .get(&pid)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXE)))
    }

    fn symbol_table(&mut self, pid: ProcessId, path: &Path) -> Result<SymbolTable, Self::Error> {
        if self.state().unreadable.contains(&pid) {
            return Err(Error::UnreadableImage(pid));
        }

        Ok(self
            .state()
            .images
            .get(path)
            .into_iter()
            .flatten()
            .cloned()
            .collect())
    }
}

/// Handle to script and inspect a [MockBackend].
#[derive(Clone)]
pub struct MockController {
    state: Arc<Mutex<State>>,
    tx: mpsc::UnboundedSender<Event>,
}

impl MockController {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn push_event(&self, event: Event) {
        self.tx.send(event).unwrap();
    }

    pub fn set_image(&self, path: impl Into<PathBuf>, symbols: Vec<Symbol>) {
        self.state().images.insert(path.into(), symbols);
    }

    pub fn set_exe_path(&self, pid: ProcessId, path: impl Into<PathBuf>) {
        self.state().exe_paths.insert(pid, path.into());
    }

    pub fn set_return_address(&self, pid: ProcessId, addr: u64) {
        self.state().return_addrs.insert(pid, addr);
    }

    pub fn set_syscall_return(&self, pid: ProcessId, value: i64) {
        self.state().syscall_returns.insert(pid, value);
    }

    /// The process stops as soon as it is sent the quiescing signal.
    pub fn acknowledge_quiesce(&self, pid: ProcessId) {
        self.state().acknowledging.insert(pid);
    }

    pub fn refuse_attach(&self, pid: ProcessId) {
        self.state().refusing.insert(pid);
    }

    /// Reading the symbols of the process fails.
    pub fn unreadable_image(&self, pid: ProcessId) {
        self.state().unreadable.insert(pid);
    }

    /// Sending a signal to the process fails.
    pub fn fail_signals(&self, pid: ProcessId) {
        self.state().failing_signals.insert(pid);
    }

    /// Detaching from the process fails.
    pub fn fail_detach(&self, pid: ProcessId) {
        self.state().failing_detaches.insert(pid);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Installed return breakpoints, with their usage count.
    pub fn return_breakpoints(&self, pid: ProcessId) -> Vec<(u64, usize)> {
        self.state()
            .breakpoints
            .get(&pid)
            .map(|bps| bps.returns.iter().map(|(&a, &c)| (a, c)).collect())
            .unwrap_or_default()
    }

    pub fn entry_breakpoints(&self, pid: ProcessId) -> Vec<u64> {
        self.state()
            .breakpoints
            .get(&pid)
            .map(|bps| bps.entries.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn breakpoints_enabled(&self, pid: ProcessId) -> bool {
        self.state()
            .breakpoints
            .get(&pid)
            .is_some_and(|bps| bps.enabled)
    }
}
