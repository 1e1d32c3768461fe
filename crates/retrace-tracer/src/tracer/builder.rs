use std::time::Duration;

use super::Tracer;
use super::config::TraceConfig;
use super::registry::ProcessRegistry;
use super::shutdown::ShutdownSequencer;
use crate::Event;
use crate::backend::TraceBackend;
use crate::handler::EventHandler;

/// Builder for [Tracer].
///
/// It is usually created by calling [Tracer::builder], and allows to
/// specify which backend and event handler to use for tracing processes, as
/// well as the tracing options.
pub struct Builder<S> {
    state: S,
}

impl Builder<NeedsBackend> {
    pub(super) const fn new() -> Self {
        Self {
            state: NeedsBackend,
        }
    }

    /// Specifies the backend to use for controlling the traced processes.
    pub const fn with_backend<B: TraceBackend>(self, backend: B) -> Builder<NeedsHandler<B>> {
        Builder {
            state: NeedsHandler { backend },
        }
    }
}

impl<B: TraceBackend> Builder<NeedsHandler<B>> {
    /// Specifies the handler of the calls and notices reported by the tracer.
    pub fn with_event_handler<H: EventHandler>(self, handler: H) -> Builder<Ready<B, H>> {
        Builder {
            state: Ready {
                backend: self.state.backend,
                handler,
                config: TraceConfig::default(),
                observers: Vec::new(),
            },
        }
    }
}

impl<B, H> Builder<Ready<B, H>> {
    /// Specifies whether system calls are reported as calls.
    pub fn trace_syscalls(mut self, enabled: bool) -> Self {
        self.state.config.trace_syscalls = enabled;
        self
    }

    /// Specifies whether the children created by traced processes are traced
    /// as well.
    pub fn follow_forks(mut self, enabled: bool) -> Self {
        self.state.config.follow_forks = enabled;
        self
    }

    /// Specifies the maximum depth of the call stack of each process.
    ///
    /// Calls beyond this depth are reported with a notice, but not tracked.
    pub fn call_depth(mut self, depth: usize) -> Self {
        self.state.config.call_depth = depth;
        self
    }

    /// Restricts tracing to the symbol with the given name.
    ///
    /// It can be called multiple times. By default, every symbol is traced.
    pub fn trace_symbol(mut self, name: impl Into<String>) -> Self {
        self.state.config.symbols.add_name(name);
        self
    }

    /// Specifies whether functions defined in the traced executable itself
    /// are traced (in addition to library calls).
    pub fn local_symbols(mut self, enabled: bool) -> Self {
        self.state.config.symbols.set_local(enabled);
        self
    }

    /// Specifies the delay, after an interruption, before the processes which
    /// were not attached explicitly are detached as well.
    pub fn shutdown_deadline(mut self, deadline: Duration) -> Self {
        self.state.config.shutdown_deadline = deadline;
        self
    }

    /// Registers an observer of the raw events.
    ///
    /// Observers are called in registration order, before each event is
    /// processed.
    pub fn observer(mut self, observer: impl Fn(&Event) + 'static) -> Self {
        self.state.observers.push(Box::new(observer));
        self
    }
}

impl<B: TraceBackend, H: EventHandler> Builder<Ready<B, H>> {
    /// Builds the tracer.
    pub fn build(self) -> Tracer<B, H> {
        let Ready {
            backend,
            handler,
            config,
            observers,
        } = self.state;

        Tracer {
            backend,
            handler,
            shutdown: ShutdownSequencer::new(config.shutdown_deadline),
            registry: ProcessRegistry::new(),
            observers,
            config,
        }
    }
}

/// Initial state of the [Builder].
pub struct NeedsBackend;

/// [Builder] state waiting for an event handler.
pub struct NeedsHandler<B> {
    backend: B,
}

/// [Builder] state ready to build.
pub struct Ready<B, H> {
    backend: B,
    handler: H,
    config: TraceConfig,
    observers: Vec<Box<dyn Fn(&Event)>>,
}
