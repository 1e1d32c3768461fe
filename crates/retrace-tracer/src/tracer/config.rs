use std::collections::HashSet;
use std::time::Duration;

use crate::backend::{Symbol, SymbolKind};

/// Default maximum depth of a process's call stack.
pub const DEFAULT_CALL_DEPTH: usize = 64;

/// Default delay before non-explicit processes are quiesced during shutdown.
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(1);

/// Selection of the symbols whose calls are traced.
#[derive(Debug, Clone, Default)]
pub struct SymbolFilter {
    /// Names to trace (every name if empty).
    names: HashSet<String>,

    /// Whether functions defined in the executable itself are traced.
    local: bool,
}

impl SymbolFilter {
    /// Restricts tracing to the given symbol name (cumulative).
    pub fn add_name(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// Enables or disables tracing of functions defined in the executable.
    pub const fn set_local(&mut self, local: bool) {
        self.local = local;
    }

    /// Returns whether calls to `symbol` must be traced.
    pub fn matches(&self, symbol: &Symbol) -> bool {
        let kind_selected = match symbol.kind {
            SymbolKind::Plt => true,
            SymbolKind::Local => self.local,
        };

        kind_selected && (self.names.is_empty() || self.names.contains(&symbol.name))
    }
}

/// Tracing options.
#[derive(Debug, Clone)]
pub(crate) struct TraceConfig {
    pub(crate) trace_syscalls: bool,
    pub(crate) follow_forks: bool,
    pub(crate) call_depth: usize,
    pub(crate) symbols: SymbolFilter,
    pub(crate) shutdown_deadline: Duration,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            trace_syscalls: false,
            follow_forks: false,
            call_depth: DEFAULT_CALL_DEPTH,
            symbols: SymbolFilter::default(),
            shutdown_deadline: DEFAULT_SHUTDOWN_DEADLINE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SymbolFilter;
    use crate::backend::{Symbol, SymbolKind};

    #[test]
    fn default_filter_keeps_plt_only() {
        let filter = SymbolFilter::default();

        assert!(filter.matches(&Symbol::new("puts", 0x1030, SymbolKind::Plt)));
        assert!(!filter.matches(&Symbol::new("main", 0x1140, SymbolKind::Local)));
    }

    #[test]
    fn names_restrict_every_kind() {
        let mut filter = SymbolFilter::default();
        filter.add_name("malloc");
        filter.add_name("helper");
        filter.set_local(true);

        assert!(filter.matches(&Symbol::new("malloc", 0x1030, SymbolKind::Plt)));
        assert!(!filter.matches(&Symbol::new("free", 0x1040, SymbolKind::Plt)));
        assert!(filter.matches(&Symbol::new("helper", 0x1140, SymbolKind::Local)));
        assert!(!filter.matches(&Symbol::new("main", 0x1180, SymbolKind::Local)));
    }
}
