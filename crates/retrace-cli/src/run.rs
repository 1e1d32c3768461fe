use std::fs::File;
use std::io::{BufWriter, LineWriter, Write};

use miette::IntoDiagnostic;
use tokio::signal::unix::{SignalKind, signal};

use retrace_debugger::Backend;
use retrace_tracer::Command;
use retrace_tracer::tracer::{ShutdownHandle, Tracer};

use crate::{CliOpts, TextOutput, TraceSettings};

/// Runs a tracing session as described by the CLI options.
pub fn evaluate_run(opts: CliOpts) -> miette::Result<()> {
    let settings = TraceSettings::load(&opts)?;

    let out: Box<dyn Write> = match &opts.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).into_diagnostic()?)),
        // one write per line, to interleave with the program's own output
        None => Box::new(LineWriter::new(std::io::stderr())),
    };

    let output = if settings.summary {
        TextOutput::with_summary(out, settings.call_depth)
    } else {
        TextOutput::new(out)
    };

    // every ptrace request must come from the thread which attached
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    runtime.block_on(async move {
        let mut tracer = settings
            .symbols
            .into_iter()
            .fold(
                Tracer::builder()
                    .with_backend(Backend::new())
                    .with_event_handler(output),
                |tracer, symbol| tracer.trace_symbol(symbol),
            )
            .trace_syscalls(settings.trace_syscalls)
            .follow_forks(settings.follow_forks)
            .call_depth(settings.call_depth)
            .local_symbols(settings.local_symbols)
            .build();

        if let Some((program, args)) = opts.command.split_first() {
            let command = Command::new(program).args(args.iter().cloned());
            tracer.launch(&command).into_diagnostic()?;
        }

        for &pid in &opts.pids {
            if let Err(e) = tracer.attach(pid) {
                tracing::warn!(pid, error = %e, "cannot attach to process");
            }
        }

        let interrupts = tokio::spawn(forward_interrupts(tracer.shutdown_handle()));

        let res = tracer.run().await;

        interrupts.abort();

        res.into_diagnostic()?;

        tracer.into_handler().finish().into_diagnostic()
    })
}

/// Requests the tracer to detach on `SIGINT` or `SIGTERM`.
async fn forward_interrupts(handle: ShutdownHandle) -> std::io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = interrupt.recv() => (),
            _ = terminate.recv() => (),
        }

        tracing::info!("interrupted, detaching from traced processes");

        if !handle.interrupt() {
            return Ok(());
        }
    }
}
