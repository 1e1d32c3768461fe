mod builder;
mod callstack;
mod config;
mod process;
mod registry;
mod shutdown;

use std::path::Path;
use std::sync::Arc;

pub use self::builder::{Builder, NeedsBackend, NeedsHandler, Ready};
pub use self::callstack::{CallFrame, CallStack, CallStackError};
use self::config::TraceConfig;
pub use self::config::{DEFAULT_CALL_DEPTH, DEFAULT_SHUTDOWN_DEADLINE, SymbolFilter};
pub use self::process::{BreakpointActivation, TrackedProcess};
pub use self::registry::ProcessRegistry;
pub use self::shutdown::{ControlMessage, ShutdownHandle, ShutdownState};
use self::shutdown::{ShutdownSequencer, ShutdownStep};
use crate::backend::{SymbolTable, TraceBackend};
use crate::error::{BackendError, HandlerError};
use crate::handler::{CallKind, EventHandler, Notice};
use crate::{Command, Error, Event, ProcessId};

/// Call tracer.
///
/// It turns the raw events reported by its [backend](TraceBackend) into
/// matched call entries and returns, reported to its [event handler](EventHandler).
pub struct Tracer<B, H> {
    /// Backend controlling the traced processes.
    pub(super) backend: B,

    /// Trace event handler.
    pub(super) handler: H,

    pub(super) config: TraceConfig,

    /// Observers of the raw events.
    pub(super) observers: Vec<Box<dyn Fn(&Event)>>,

    /// Processes currently traced.
    pub(super) registry: ProcessRegistry,

    pub(super) shutdown: ShutdownSequencer,
}

impl Tracer<(), ()> {
    /// Creates a tracer builder.
    pub const fn builder() -> Builder<NeedsBackend> {
        Builder::new()
    }
}

impl<B: TraceBackend, H: EventHandler> Tracer<B, H> {
    /// Attaches to the running process with the given ID and starts tracing it.
    ///
    /// The process is considered explicitly traced: it is the first to be
    /// detached on interruption.
    #[tracing::instrument(name = "Attach", skip(self))]
    pub fn attach(&mut self, pid: ProcessId) -> crate::Result<(), B::Error, H::Error> {
        if self.registry.contains(pid) {
            return Err(Error::AlreadyTraced(pid));
        }

        self.backend.attach(pid).map_err(BackendError)?;

        tracing::info!("attached");

        self.track(pid, true).inspect_err(|_| self.release(pid))
    }

    /// Launches the given command and starts tracing the new process.
    ///
    /// On success, the process ID is returned.
    #[tracing::instrument(name = "Launch", skip_all, fields(program = %command.program.display()))]
    pub fn launch(&mut self, command: &Command) -> crate::Result<ProcessId, B::Error, H::Error> {
        let pid = self.backend.launch(command).map_err(BackendError)?;

        tracing::info!(pid, "launched");

        self.track(pid, false)?;

        Ok(pid)
    }

    /// Registers a stopped process and arms its entry breakpoints, then
    /// resumes it.
    fn track(&mut self, pid: ProcessId, explicit: bool) -> crate::Result<(), B::Error, H::Error> {
        if self.registry.contains(pid) {
            return Err(Error::AlreadyTraced(pid));
        }

        let exe_path = self.backend.executable_path(pid).map_err(BackendError)?;
        let symbols = load_symbols(&mut self.backend, &self.config, pid, &exe_path)?;

        tracing::info!(
            pid,
            path = %exe_path.display(),
            symbols = symbols.len(),
            "tracking process"
        );

        self.backend
            .reset_breakpoints(pid, symbols.entry_addrs())
            .map_err(BackendError)?;
        self.backend
            .enable_all_breakpoints(pid)
            .map_err(BackendError)?;

        let mut process = TrackedProcess::new(
            pid,
            exe_path,
            Arc::new(symbols),
            self.config.call_depth,
            explicit,
        );
        process.activation = BreakpointActivation::Enabled;

        self.registry
            .add(process)
            .map_err(|process| Error::AlreadyTraced(process.pid()))?;

        self.backend.resume(pid).map_err(BackendError)?;

        Ok(())
    }

    /// Lets go of an attached process which could not be tracked, so it does
    /// not stay stopped.
    fn release(&mut self, pid: ProcessId) {
        tracing::warn!(pid, "releasing untracked process");

        self.registry.remove(pid);

        if let Err(e) = self.backend.disable_all_breakpoints(pid) {
            tracing::warn!(pid, error = %e, "failed to remove breakpoints");
        }

        if let Err(e) = self.backend.detach(pid) {
            tracing::warn!(pid, error = %e, "failed to detach");
        }
    }

    /// Returns a handle allowing to interrupt [run](Self::run).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.handle()
    }

    /// Returns the state of the shutdown sequence.
    pub const fn shutdown_state(&self) -> ShutdownState {
        self.shutdown.state()
    }

    /// Returns the processes currently traced.
    pub const fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Returns the backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the event handler.
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Consumes the tracer, returning its event handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Traces the processes until none is left.
    ///
    /// Every process is either traced until it exits, or detached after an
    /// interruption requested through a [ShutdownHandle].
    #[tracing::instrument(name = "Trace", skip_all)]
    pub async fn run(&mut self) -> crate::Result<(), B::Error, H::Error> {
        if self.registry.is_empty() {
            return Err(Error::NothingToTrace);
        }

        let result = self.event_loop().await;

        self.shutdown.finish();

        result
    }

    async fn event_loop(&mut self) -> crate::Result<(), B::Error, H::Error> {
        while !self.registry.is_empty() {
            let next = tokio::select! {
                biased;

                msg = self.shutdown.recv() => Next::Control(msg),
                event = self.backend.wait_event() => Next::Event(event.map_err(BackendError)?),
            };

            match next {
                Next::Control(msg) => self.handle_control_message(msg),
                Next::Event(event) => self.dispatch(event).await?,
            }
        }

        tracing::info!("no process left to trace");

        Ok(())
    }

    /// Broadcasts an event to the observers, then processes it.
    ///
    /// This is called by [run](Self::run) for every event received from the
    /// backend.
    pub async fn dispatch(&mut self, event: Event) -> crate::Result<(), B::Error, H::Error> {
        for observer in &self.observers {
            observer(&event);
        }

        let Some(pid) = event.pid() else {
            return Ok(());
        };

        if !self.registry.contains(pid) {
            tracing::debug!(pid, event = event.label(), "event from untraced process ignored");
            return Ok(());
        }

        tracing::trace!(?event, "processing event");

        match event {
            Event::None => Ok(()),
            Event::Signal { pid, signal } => self.handle_signal(pid, signal).await,
            Event::Exit { pid, code } => {
                tracing::info!(pid, code, "process exited");
                self.handle_termination(pid, Notice::Exited(code)).await
            }
            Event::ExitSignal { pid, signal } => {
                tracing::info!(pid, signal, "process killed");
                self.handle_termination(pid, Notice::Killed(signal)).await
            }
            Event::Syscall { pid, number } => self.handle_syscall(pid, number).await,
            Event::Sysret { pid, number } => self.handle_sysret(pid, number).await,
            Event::Breakpoint { pid, addr } => self.handle_breakpoint(pid, addr).await,
        }
    }

    fn handle_control_message(&mut self, msg: ControlMessage) {
        match self.shutdown.on_message(msg) {
            ShutdownStep::Ignore => (),
            ShutdownStep::QuiesceExplicit => self.quiesce(TrackedProcess::is_explicit),
            ShutdownStep::QuiesceOthers => self.quiesce(|process| !process.is_explicit()),
        }
    }

    /// Sends the quiescing signal to every process matching `pred`.
    fn quiesce(&mut self, pred: impl FnMut(&TrackedProcess) -> bool) {
        for pid in self.registry.pids_where(pred) {
            tracing::debug!(pid, "quiescing process");

            if let Err(e) = self.backend.send_signal(pid, B::QUIESCING_SIGNAL) {
                tracing::warn!(pid, error = %e, "failed to quiesce process");
            }
        }
    }

    async fn handle_signal(
        &mut self,
        pid: ProcessId,
        signal: i32,
    ) -> crate::Result<(), B::Error, H::Error> {
        if self.shutdown.is_shutting_down() && signal == B::QUIESCING_SIGNAL {
            self.detach(pid, signal);
            return Ok(());
        }

        self.handler
            .notice(Some(pid), Notice::Signal(signal))
            .await
            .map_err(HandlerError)?;

        self.backend
            .resume_after_signal(pid, signal)
            .map_err(BackendError)?;

        Ok(())
    }

    /// Detaches from a process stopped by the quiescing signal.
    fn detach(&mut self, pid: ProcessId, signal: i32) {
        tracing::info!(pid, "detaching");

        if let Err(e) = self.backend.disable_all_breakpoints(pid) {
            tracing::warn!(pid, error = %e, "failed to remove breakpoints");
        }

        if let Err(e) = self.backend.detach(pid) {
            tracing::warn!(pid, error = %e, "failed to detach");
        }

        self.registry.remove(pid);

        if let Err(e) = self.backend.resume_after_signal(pid, signal) {
            tracing::warn!(pid, error = %e, "failed to redeliver signal");
        }
    }

    async fn handle_termination(
        &mut self,
        pid: ProcessId,
        notice: Notice,
    ) -> crate::Result<(), B::Error, H::Error> {
        self.handler
            .notice(Some(pid), notice)
            .await
            .map_err(HandlerError)?;

        self.registry.remove(pid);

        Ok(())
    }

    async fn handle_syscall(
        &mut self,
        pid: ProcessId,
        number: u64,
    ) -> crate::Result<(), B::Error, H::Error> {
        let Some(process) = self.registry.find_mut(pid) else {
            return Ok(());
        };

        if self.config.trace_syscalls {
            let name = self.backend.syscall_name(number);

            self.handler
                .call_entered(CallKind::Syscall, pid, &name)
                .await
                .map_err(HandlerError)?;
        }

        if let Err(e) = process.callstack.push_syscall(number) {
            let name = self.backend.syscall_name(number).into_owned();

            tracing::warn!(pid, name = %name, error = %e, "system call not tracked");

            self.handler
                .notice(Some(pid), Notice::CallNestingTooDeep { name })
                .await
                .map_err(HandlerError)?;
        }

        if self.backend.is_fork_syscall(number) || self.backend.is_exec_syscall(number) {
            // the process image is about to be duplicated or replaced
            self.backend
                .disable_all_breakpoints(pid)
                .map_err(BackendError)?;
            process.activation = BreakpointActivation::Disabled;
        } else if process.activation != BreakpointActivation::Enabled {
            self.backend
                .enable_all_breakpoints(pid)
                .map_err(BackendError)?;
            process.activation = BreakpointActivation::Enabled;
        }

        self.backend.resume(pid).map_err(BackendError)?;

        Ok(())
    }

    async fn handle_sysret(
        &mut self,
        pid: ProcessId,
        number: u64,
    ) -> crate::Result<(), B::Error, H::Error> {
        if self.backend.is_exec_syscall(number) {
            if self.backend.syscall_return_value(pid).map_err(BackendError)? == 0 {
                self.reload_image(pid)?;
            }
        } else if self.backend.is_fork_syscall(number) {
            let ret = self.backend.syscall_return_value(pid).map_err(BackendError)?;

            if self.config.follow_forks && ret > 0 {
                self.track_child(ret.unsigned_abs());
            }

            if let Some(process) = self.registry.find_mut(pid) {
                self.backend
                    .enable_all_breakpoints(pid)
                    .map_err(BackendError)?;
                process.activation = BreakpointActivation::Enabled;
            }
        }

        let Some(process) = self.registry.find_mut(pid) else {
            return Ok(());
        };

        match process.callstack.top() {
            Some(CallFrame::Syscall(top)) if *top == number => {
                process.callstack.pop();
            }
            top => tracing::debug!(pid, number, ?top, "no frame for returning system call"),
        }

        if self.config.trace_syscalls {
            let name = self.backend.syscall_name(number);

            self.handler
                .call_returned(CallKind::Syscall, pid, &name)
                .await
                .map_err(HandlerError)?;
        }

        self.backend.resume(pid).map_err(BackendError)?;

        Ok(())
    }

    /// Rebuilds the process's state after its image was replaced.
    fn reload_image(&mut self, pid: ProcessId) -> crate::Result<(), B::Error, H::Error> {
        let exe_path = self.backend.executable_path(pid).map_err(BackendError)?;
        let symbols = load_symbols(&mut self.backend, &self.config, pid, &exe_path)?;

        self.backend
            .reset_breakpoints(pid, symbols.entry_addrs())
            .map_err(BackendError)?;

        tracing::info!(
            pid,
            path = %exe_path.display(),
            symbols = symbols.len(),
            "process image replaced"
        );

        let Some(process) = self.registry.find_mut(pid) else {
            return Ok(());
        };

        // frames of the replaced image will never return, except for the
        // system call itself
        let dropped = process
            .callstack
            .drain_for_exec(|number| self.backend.is_exec_syscall(number));
        if !dropped.is_empty() {
            tracing::debug!(pid, frames = dropped.len(), "call frames dropped");
        }

        process.exe_path = exe_path;
        process.symbols = Arc::new(symbols);
        process.reinstalling = None;
        process.activation = BreakpointActivation::PendingAfterExec;

        Ok(())
    }

    /// Starts tracing a child of a traced process.
    fn track_child(&mut self, pid: ProcessId) {
        if self.registry.contains(pid) {
            tracing::debug!(pid, "child process already traced");
            return;
        }

        tracing::info!(pid, "following child process");

        if let Err(e) = self.backend.attach(pid) {
            tracing::warn!(pid, error = %e, "failed to attach to child process");
            return;
        }

        if let Err(e) = self.track(pid, false) {
            tracing::warn!(pid, error = %e, "failed to trace child process");
            self.release(pid);
            return;
        }

        // non-explicit processes were already asked to stop
        if self.shutdown.state() == (ShutdownState::ShuttingDown { escalated: true }) {
            self.quiesce(|process| process.pid() == pid);
        }
    }

    async fn handle_breakpoint(
        &mut self,
        pid: ProcessId,
        addr: u64,
    ) -> crate::Result<(), B::Error, H::Error> {
        let Some(process) = self.registry.find_mut(pid) else {
            return Ok(());
        };

        // first stop in a new process image
        if process.activation == BreakpointActivation::PendingAfterExec {
            tracing::debug!(pid, "arming breakpoints of the new image");

            self.backend
                .enable_all_breakpoints(pid)
                .map_err(BackendError)?;
            process.activation = BreakpointActivation::Enabled;

            self.backend.resume(pid).map_err(BackendError)?;
            return Ok(());
        }

        // end of a single-step over a breakpoint's original instruction
        if let Some(reinstalled) = process.reinstalling.take() {
            self.backend
                .finish_breakpoint_reinstall(pid, reinstalled)
                .map_err(BackendError)?;
            return Ok(());
        }

        if let Some(depth) = process.callstack.find_return(addr) {
            // frames above the returning one are discarded silently
            let mut returned = None;

            while process.callstack.depth() > depth {
                if let Some(CallFrame::LibraryCall {
                    symbol,
                    return_addr,
                }) = process.callstack.pop()
                {
                    self.backend
                        .remove_breakpoint(pid, return_addr)
                        .map_err(BackendError)?;
                    returned = Some(symbol);
                }
            }

            process.return_addr = addr;

            if let Some(symbol) = returned {
                tracing::debug!(pid, name = %symbol.name, "function returned");

                self.handler
                    .call_returned(CallKind::Function, pid, &symbol.name)
                    .await
                    .map_err(HandlerError)?;
            }

            if self
                .backend
                .resume_after_breakpoint(pid, addr)
                .map_err(BackendError)?
            {
                process.reinstalling = Some(addr);
            }

            return Ok(());
        }

        if let Some(symbol) = process.symbols.find_by_addr(addr).cloned() {
            let stack_pointer = self.backend.stack_pointer(pid).map_err(BackendError)?;
            let return_addr = self
                .backend
                .return_address(pid, stack_pointer)
                .map_err(BackendError)?;

            process.stack_pointer = stack_pointer;
            process.return_addr = return_addr;

            tracing::debug!(
                pid,
                name = %symbol.name,
                ret = format_args!("{return_addr:#x}"),
                "function entered"
            );

            self.handler
                .call_entered(CallKind::Function, pid, &symbol.name)
                .await
                .map_err(HandlerError)?;

            match process.callstack.push_call(Arc::clone(&symbol), return_addr) {
                Ok(()) => self
                    .backend
                    .install_breakpoint(pid, return_addr)
                    .map_err(BackendError)?,
                Err(e) => {
                    tracing::warn!(pid, name = %symbol.name, error = %e, "function call not tracked");

                    self.handler
                        .notice(
                            Some(pid),
                            Notice::CallNestingTooDeep {
                                name: symbol.name.clone(),
                            },
                        )
                        .await
                        .map_err(HandlerError)?;
                }
            }

            if self
                .backend
                .resume_after_breakpoint(pid, addr)
                .map_err(BackendError)?
            {
                process.reinstalling = Some(addr);
            }

            return Ok(());
        }

        tracing::debug!(pid, addr = format_args!("{addr:#x}"), "unknown breakpoint");

        self.handler
            .notice(Some(pid), Notice::UnknownBreakpoint(addr))
            .await
            .map_err(HandlerError)?;

        self.backend.resume(pid).map_err(BackendError)?;

        Ok(())
    }
}

/// Builds the table of the traced symbols of a process image.
fn load_symbols<B: TraceBackend>(
    backend: &mut B,
    config: &TraceConfig,
    pid: ProcessId,
    exe_path: &Path,
) -> Result<SymbolTable, BackendError<B::Error>> {
    let symbols = backend
        .symbol_table(pid, exe_path)
        .map_err(BackendError)?
        .filtered(|symbol| config.symbols.matches(symbol));

    Ok(symbols)
}

enum Next {
    Control(ControlMessage),
    Event(Event),
}
