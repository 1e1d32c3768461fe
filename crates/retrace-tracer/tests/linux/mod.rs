use retrace_debugger::Backend;
use retrace_tracer::handler::{CallKind, Notice};
use retrace_tracer::tracer::Tracer;
use retrace_tracer::Command;
use test_log::test;

use crate::common::{Record, RecordingHandler};

#[test(tokio::test)]
async fn shell_exit_status() {
    let mut tracer = Tracer::builder()
        .with_backend(Backend::new())
        .with_event_handler(RecordingHandler::default())
        .trace_syscalls(true)
        .build();

    let pid = tracer
        .launch(&Command::new("sh").args(["-c", "exit 3"]))
        .expect("launch sh");

    tracer.run().await.expect("trace sh");

    assert!(tracer.registry().is_empty());

    let handler = tracer.into_handler();

    assert!(handler.records.contains(&Record::Entered(
        CallKind::Syscall,
        pid,
        "SYS_exit_group".to_owned()
    )));

    assert_eq!(
        handler.records.last(),
        Some(&Record::Notice(Some(pid), Notice::Exited(3)))
    );
}
