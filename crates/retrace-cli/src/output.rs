use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;

use retrace_tracer::ProcessId;
use retrace_tracer::handler::{CallKind, EventHandler, Notice};

/// Event handler writing the trace as text lines.
///
/// In summary mode, calls are counted and timed instead of being written,
/// and the summary table is written by [finish](Self::finish).
pub struct TextOutput<W: Write> {
    out: W,

    /// Calls in progress, per process (summary mode only).
    pending: HashMap<ProcessId, VecDeque<(String, Instant)>>,

    /// Maximum number of calls in progress kept per process.
    max_pending: usize,

    summary: Option<Summary>,
}

impl<W: Write> TextOutput<W> {
    /// Creates a handler writing each call.
    pub fn new(out: W) -> Self {
        Self {
            out,
            pending: HashMap::new(),
            max_pending: 0,
            summary: None,
        }
    }

    /// Creates a handler writing a summary of the calls.
    ///
    /// At most `call_depth` calls in progress are remembered per process,
    /// the oldest being forgotten first (e.g., calls of a replaced process
    /// image, which never return).
    pub fn with_summary(out: W, call_depth: usize) -> Self {
        Self {
            out,
            pending: HashMap::new(),
            max_pending: call_depth,
            summary: Some(Summary::default()),
        }
    }

    /// Writes the summary table (if any) and flushes the output.
    pub fn finish(mut self) -> io::Result<()> {
        if let Some(summary) = self.summary.take() {
            summary.write_table(&mut self.out)?;
        }

        self.out.flush()
    }

    /// Drops the calls in progress of a terminated process.
    fn forget(&mut self, pid: Option<ProcessId>) {
        if let Some(pid) = pid {
            self.pending.remove(&pid);
        }
    }

    fn line(&mut self, pid: Option<ProcessId>, args: std::fmt::Arguments<'_>) -> io::Result<()> {
        match pid {
            Some(pid) => writeln!(self.out, "[pid {pid}] {args}"),
            None => writeln!(self.out, "{args}"),
        }
    }
}

impl<W: Write> Drop for TextOutput<W> {
    fn drop(&mut self) {
        if let Some(summary) = self.summary.take() {
            let _ = summary.write_table(&mut self.out);
        }

        let _ = self.out.flush();
    }
}

impl<W: Write> EventHandler for TextOutput<W> {
    type Error = io::Error;

    async fn call_entered(
        &mut self,
        _kind: CallKind,
        pid: ProcessId,
        name: &str,
    ) -> Result<(), Self::Error> {
        if self.summary.is_some() {
            let calls = self.pending.entry(pid).or_default();

            if calls.len() >= self.max_pending {
                calls.pop_front();
            }
            calls.push_back((name.to_owned(), Instant::now()));

            return Ok(());
        }

        self.line(Some(pid), format_args!("{name}(...)"))
    }

    async fn call_returned(
        &mut self,
        _kind: CallKind,
        pid: ProcessId,
        name: &str,
    ) -> Result<(), Self::Error> {
        if self.summary.is_none() {
            return self.line(Some(pid), format_args!("<... {name} resumed>"));
        }

        let Some(calls) = self.pending.get_mut(&pid) else {
            return Ok(());
        };

        // calls entered after this one returned along with it
        if let Some(index) = calls.iter().rposition(|(entered, _)| entered == name) {
            let elapsed = calls[index].1.elapsed();
            calls.truncate(index);

            if let Some(summary) = &mut self.summary {
                summary.record(name, elapsed);
            }
        }

        Ok(())
    }

    async fn notice(&mut self, pid: Option<ProcessId>, notice: Notice) -> Result<(), Self::Error> {
        match notice {
            Notice::Signal(signal) => {
                self.line(pid, format_args!("--- {} ---", signal_name(signal)))
            }
            Notice::Exited(code) => {
                self.forget(pid);
                self.line(pid, format_args!("+++ exited (status {code}) +++"))
            }
            Notice::Killed(signal) => {
                self.forget(pid);
                self.line(pid, format_args!("+++ killed by {} +++", signal_name(signal)))
            }
            Notice::UnknownBreakpoint(addr) => {
                self.line(pid, format_args!("breakpointed at {addr:#010x} (?)"))
            }
            Notice::CallNestingTooDeep { name } => {
                // the call was counted as entered but will never return
                if let Some(calls) = pid.and_then(|pid| self.pending.get_mut(&pid)) {
                    if calls.back().is_some_and(|(entered, _)| *entered == name) {
                        calls.pop_back();
                    }
                }

                self.line(
                    pid,
                    format_args!("call nesting too deep, {name} not tracked"),
                )
            }
        }
    }
}

/// Name of a signal (e.g., `SIGSEGV`).
pub fn signal_name(signal: i32) -> String {
    Signal::try_from(signal)
        .map(|signal| signal.as_str().to_owned())
        .unwrap_or_else(|_| format!("SIG{signal}"))
}

/// Call counts and cumulative times, per function name.
#[derive(Debug, Default)]
pub struct Summary {
    calls: HashMap<String, CallStats>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CallStats {
    count: u64,
    time: Duration,
}

impl Summary {
    /// Records a call that lasted `elapsed`.
    pub fn record(&mut self, name: &str, elapsed: Duration) {
        let stats = self.calls.entry(name.to_owned()).or_default();
        stats.count += 1;
        stats.time += elapsed;
    }

    /// Writes the summary table, slowest functions first.
    pub fn write_table(&self, out: &mut impl Write) -> io::Result<()> {
        let mut rows: Vec<_> = self.calls.iter().collect();
        rows.sort_by(|(a_name, a), (b_name, b)| b.time.cmp(&a.time).then(a_name.cmp(b_name)));

        let total_time: Duration = rows.iter().map(|(_, stats)| stats.time).sum();
        let total_count: u64 = rows.iter().map(|(_, stats)| stats.count).sum();

        let percent = |time: Duration| {
            if total_time.is_zero() {
                0.0
            } else {
                100.0 * time.as_secs_f64() / total_time.as_secs_f64()
            }
        };

        let separator = "------ ----------- --------- --------------------";

        writeln!(out, "% time     seconds     calls function")?;
        writeln!(out, "{separator}")?;

        for (name, stats) in rows {
            writeln!(
                out,
                "{:6.2} {:11.6} {:9} {}",
                percent(stats.time),
                stats.time.as_secs_f64(),
                stats.count,
                name
            )?;
        }

        writeln!(out, "{separator}")?;
        writeln!(
            out,
            "{:6.2} {:11.6} {:9} total",
            percent(total_time),
            total_time.as_secs_f64(),
            total_count
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use indoc::indoc;
    use retrace_tracer::handler::{CallKind, EventHandler, Notice};

    use super::{Summary, TextOutput, signal_name};

    #[tokio::test]
    async fn call_lines() {
        let mut buf = Vec::new();
        let mut output = TextOutput::new(&mut buf);

        output
            .call_entered(CallKind::Function, 42, "puts")
            .await
            .unwrap();
        output
            .call_returned(CallKind::Function, 42, "puts")
            .await
            .unwrap();
        output
            .call_entered(CallKind::Syscall, 42, "SYS_write")
            .await
            .unwrap();
        output.finish().unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            indoc! {"
                [pid 42] puts(...)
                [pid 42] <... puts resumed>
                [pid 42] SYS_write(...)
            "}
        );
    }

    #[tokio::test]
    async fn notice_lines() {
        let mut buf = Vec::new();
        let mut output = TextOutput::new(&mut buf);

        output.notice(Some(7), Notice::Signal(11)).await.unwrap();
        output
            .notice(Some(7), Notice::UnknownBreakpoint(0x401000))
            .await
            .unwrap();
        output
            .notice(
                Some(7),
                Notice::CallNestingTooDeep {
                    name: "deep".to_owned(),
                },
            )
            .await
            .unwrap();
        output.notice(Some(7), Notice::Exited(3)).await.unwrap();
        output.notice(Some(8), Notice::Killed(9)).await.unwrap();
        output.finish().unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            indoc! {"
                [pid 7] --- SIGSEGV ---
                [pid 7] breakpointed at 0x00401000 (?)
                [pid 7] call nesting too deep, deep not tracked
                [pid 7] +++ exited (status 3) +++
                [pid 8] +++ killed by SIGKILL +++
            "}
        );
    }

    #[test]
    fn unknown_signal_name() {
        assert_eq!(signal_name(2), "SIGINT");
        assert_eq!(signal_name(200), "SIG200");
    }

    #[test]
    fn summary_sorted_by_time() {
        let mut summary = Summary::default();
        summary.record("malloc", Duration::from_millis(1));
        summary.record("puts", Duration::from_millis(2));
        summary.record("malloc", Duration::from_millis(2));

        let mut buf = Vec::new();
        summary.write_table(&mut buf).unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            indoc! {"
                % time     seconds     calls function
                ------ ----------- --------- --------------------
                 60.00    0.003000         2 malloc
                 40.00    0.002000         1 puts
                ------ ----------- --------- --------------------
                100.00    0.005000         3 total
            "}
        );
    }

    #[test]
    fn summary_written_on_drop() {
        let mut buf = Vec::new();
        drop(TextOutput::with_summary(&mut buf, 8));

        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("% time"));
        assert!(text.ends_with("         0 total\n"));
    }

    #[tokio::test]
    async fn summary_mode_counts_calls() {
        let mut buf = Vec::new();
        let mut output = TextOutput::with_summary(&mut buf, 8);

        output
            .call_entered(CallKind::Function, 1, "outer")
            .await
            .unwrap();
        output
            .call_entered(CallKind::Function, 1, "inner")
            .await
            .unwrap();
        // discards `inner`, returned along with `outer`
        output
            .call_returned(CallKind::Function, 1, "outer")
            .await
            .unwrap();
        output.finish().unwrap();

        let text = String::from_utf8(buf).unwrap();

        assert!(!text.contains("outer(...)"));
        assert!(text.lines().any(|line| line.ends_with(" 1 outer")));
        assert!(!text.contains("inner"));
        assert!(text.lines().last().unwrap().ends_with(" 1 total"));
    }

    #[tokio::test]
    async fn terminated_process_calls_are_forgotten() {
        let mut output = TextOutput::with_summary(Vec::new(), 8);

        output
            .call_entered(CallKind::Function, 1, "exit")
            .await
            .unwrap();
        output
            .call_entered(CallKind::Function, 2, "abort")
            .await
            .unwrap();
        output.notice(Some(1), Notice::Exited(0)).await.unwrap();
        output.notice(Some(2), Notice::Killed(6)).await.unwrap();

        assert!(output.pending.is_empty());
    }

    #[tokio::test]
    async fn calls_in_progress_are_bounded() {
        let mut output = TextOutput::with_summary(Vec::new(), 2);

        // `execve` replaced the image of `stale`, which never returns
        for name in ["stale", "execve", "puts"] {
            output
                .call_entered(CallKind::Function, 1, name)
                .await
                .unwrap();
        }

        let names: Vec<_> = output.pending[&1]
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, ["execve", "puts"]);

        output
            .call_returned(CallKind::Function, 1, "puts")
            .await
            .unwrap();
        assert_eq!(output.pending[&1].len(), 1);
    }
}
