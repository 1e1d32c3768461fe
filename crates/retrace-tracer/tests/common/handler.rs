use retrace_tracer::ProcessId;
use retrace_tracer::handler::{CallKind, EventHandler, Notice};

#[derive(Debug, thiserror::Error)]
pub enum Error {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Entered(CallKind, ProcessId, String),
    Returned(CallKind, ProcessId, String),
    Notice(Option<ProcessId>, Notice),
}

/// Event handler recording everything it is reported.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub records: Vec<Record>,
}

impl RecordingHandler {
    pub fn notices(&self) -> Vec<&Notice> {
        self.records
            .iter()
            .filter_map(|record| match record {
                Record::Notice(_, notice) => Some(notice),
                _ => None,
            })
            .collect()
    }
}

impl EventHandler for RecordingHandler {
    type Error = Error;

    async fn call_entered(
        &mut self,
        kind: CallKind,
        pid: ProcessId,
        name: &str,
    ) -> Result<(), Self::Error> {
        self.records.push(Record::Entered(kind, pid, name.to_owned()));
        Ok(())
    }

    async fn call_returned(
        &mut self,
        kind: CallKind,
        pid: ProcessId,
        name: &str,
    ) -> Result<(), Self::Error> {
        self.records
            .push(Record::Returned(kind, pid, name.to_owned()));
        Ok(())
    }

    async fn notice(&mut self, pid: Option<ProcessId>, notice: Notice) -> Result<(), Self::Error> {
        self.records.push(Record::Notice(pid, notice));
        Ok(())
    }
}
