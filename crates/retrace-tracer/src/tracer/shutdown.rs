use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Message driving the shutdown sequence of the tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// The operator asked to stop tracing (e.g., SIGINT, SIGTERM).
    Interrupt,

    /// The deadline armed at interruption has expired.
    DeadlineExpired,
}

/// Handle allowing to interrupt a running [Tracer](super::Tracer).
///
/// It can be cloned and moved to a signal-listening task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ShutdownHandle {
    /// Asks the tracer to detach from every traced process and stop.
    ///
    /// Returns `false` if the tracer is gone.
    pub fn interrupt(&self) -> bool {
        self.tx.send(ControlMessage::Interrupt).is_ok()
    }
}

/// State of the shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Tracing normally.
    Running,

    /// Quiescing traced processes before detaching from them.
    ShuttingDown {
        /// Whether the deadline has expired (and non-explicit processes were
        /// asked to stop as well).
        escalated: bool,
    },
}

/// Action the tracer must carry out after a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShutdownStep {
    /// Nothing to do.
    Ignore,

    /// Quiesce every explicitly traced process.
    QuiesceExplicit,

    /// Quiesce every process which is not explicitly traced.
    QuiesceOthers,
}

/// State machine of the shutdown sequence.
///
/// Control messages are received from an internal channel, so the sequence
/// runs on the tracer's own task, never concurrently with event processing.
pub(crate) struct ShutdownSequencer {
    state: ShutdownState,
    deadline: Duration,
    tx: mpsc::UnboundedSender<ControlMessage>,
    rx: mpsc::UnboundedReceiver<ControlMessage>,
    cancel: CancellationToken,
}

impl ShutdownSequencer {
    pub(crate) fn new(deadline: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            state: ShutdownState::Running,
            deadline,
            tx,
            rx,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.tx.clone(),
        }
    }

    pub(crate) const fn state(&self) -> ShutdownState {
        self.state
    }

    pub(crate) const fn is_shutting_down(&self) -> bool {
        matches!(self.state, ShutdownState::ShuttingDown { .. })
    }

    /// Receives the next control message.
    ///
    /// This is cancel-safe.
    pub(crate) async fn recv(&mut self) -> ControlMessage {
        match self.rx.recv().await {
            Some(msg) => msg,
            // unreachable in practice, since `self.tx` keeps the channel open
            None => std::future::pending().await,
        }
    }

    /// Updates the state with the given control message.
    pub(crate) fn on_message(&mut self, msg: ControlMessage) -> ShutdownStep {
        match (msg, self.state) {
            (ControlMessage::Interrupt, ShutdownState::Running) => {
                tracing::info!("interrupted, detaching from traced processes");

                self.state = ShutdownState::ShuttingDown { escalated: false };
                self.arm_deadline();

                ShutdownStep::QuiesceExplicit
            }
            (ControlMessage::Interrupt, ShutdownState::ShuttingDown { .. }) => {
                tracing::debug!("already shutting down");
                ShutdownStep::Ignore
            }
            (ControlMessage::DeadlineExpired, ShutdownState::ShuttingDown { escalated: false }) => {
                tracing::info!("shutdown deadline expired");

                self.state = ShutdownState::ShuttingDown { escalated: true };

                ShutdownStep::QuiesceOthers
            }
            (ControlMessage::DeadlineExpired, _) => ShutdownStep::Ignore,
        }
    }

    /// Cancels the pending deadline, if any.
    pub(crate) fn finish(&self) {
        self.cancel.cancel();
    }

    fn arm_deadline(&self) {
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let deadline = self.deadline;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => (),
                _ = tokio::time::sleep(deadline) => {
                    let _ = tx.send(ControlMessage::DeadlineExpired);
                }
            }
        });
    }
}

impl Drop for ShutdownSequencer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
