use indexmap::IndexMap;

use super::process::TrackedProcess;
use crate::ProcessId;

/// Set of the processes currently traced, keyed by process ID.
///
/// The registry is the sole owner of every [TrackedProcess]; anything else
/// refers to a process by its ID and resolves it here.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    processes: IndexMap<ProcessId, TrackedProcess>,
}

impl ProcessRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a process.
    ///
    /// The process is handed back if another one with the same ID is already
    /// registered.
    pub fn add(&mut self, process: TrackedProcess) -> Result<(), TrackedProcess> {
        if self.processes.contains_key(&process.pid()) {
            return Err(process);
        }

        self.processes.insert(process.pid(), process);
        Ok(())
    }

    /// Removes a process.
    ///
    /// Returns `false` if no process has this ID.
    pub fn remove(&mut self, pid: ProcessId) -> bool {
        let removed = self.processes.swap_remove(&pid).is_some();

        if removed {
            tracing::debug!(pid, "process removed");
        }

        removed
    }

    /// Returns the process with the given ID.
    pub fn find(&self, pid: ProcessId) -> Option<&TrackedProcess> {
        self.processes.get(&pid)
    }

    /// Returns the process with the given ID.
    pub fn find_mut(&mut self, pid: ProcessId) -> Option<&mut TrackedProcess> {
        self.processes.get_mut(&pid)
    }

    /// Calls `visitor` on every process.
    pub fn for_each(&self, visitor: impl FnMut(&TrackedProcess)) {
        self.processes.values().for_each(visitor);
    }

    /// Returns the IDs of every process, in insertion order.
    pub fn pids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.processes.keys().copied()
    }

    /// Returns the IDs of the processes matching `pred`.
    pub fn pids_where(&self, mut pred: impl FnMut(&TrackedProcess) -> bool) -> Vec<ProcessId> {
        self.processes
            .values()
            .filter(|process| pred(process))
            .map(TrackedProcess::pid)
            .collect()
    }

    /// Returns whether a process with the given ID is registered.
    pub fn contains(&self, pid: ProcessId) -> bool {
        self.processes.contains_key(&pid)
    }

    /// Number of registered processes.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Returns whether no process is registered.
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::ProcessRegistry;
    use crate::tracer::process::TrackedProcess;

    fn process(pid: u64, explicit: bool) -> TrackedProcess {
        TrackedProcess::new(pid, "/bin/true".into(), Arc::default(), 16, explicit)
    }

    #[test]
    fn add_find_remove() {
        let mut registry = ProcessRegistry::new();

        registry.add(process(10, true)).unwrap();
        registry.add(process(11, false)).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.find(10).is_some_and(|p| p.is_explicit()));
        assert!(registry.find(12).is_none());

        assert!(registry.remove(10));
        assert!(!registry.contains(10));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut registry = ProcessRegistry::new();
        registry.add(process(10, true)).unwrap();

        assert!(registry.remove(10));
        assert!(!registry.remove(10));
        assert!(!registry.remove(42));
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_pid_is_rejected() {
        let mut registry = ProcessRegistry::new();
        registry.add(process(10, true)).unwrap();

        let rejected = registry.add(process(10, false)).unwrap_err();

        assert_eq!(rejected.pid(), 10);
        assert_eq!(registry.len(), 1);
        assert!(registry.find(10).is_some_and(|p| p.is_explicit()));
    }

    #[test]
    fn enumerate_and_filter() {
        let mut registry = ProcessRegistry::new();
        registry.add(process(10, true)).unwrap();
        registry.add(process(11, false)).unwrap();
        registry.add(process(12, false)).unwrap();

        let mut visited = Vec::new();
        registry.for_each(|p| visited.push(p.pid()));
        assert_eq!(visited, [10, 11, 12]);
        assert_eq!(registry.pids().collect::<Vec<_>>(), [10, 11, 12]);

        assert_eq!(registry.pids_where(|p| p.is_explicit()), [10]);
        assert_eq!(registry.pids_where(|p| !p.is_explicit()), [11, 12]);
    }
}
