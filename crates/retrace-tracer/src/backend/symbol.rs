use std::collections::HashMap;
use std::sync::Arc;

/// Origin of a traced symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// Stub of the procedure linkage table (call into a shared library).
    Plt,

    /// Function defined in the executable itself.
    Local,
}

/// Function symbol whose entry can be trapped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    /// Symbol name.
    pub name: String,

    /// Entry address in the process's address space (relocated).
    pub entry_addr: u64,

    /// Origin of the symbol.
    pub kind: SymbolKind,
}

impl Symbol {
    /// Creates a new symbol.
    pub fn new(name: impl Into<String>, entry_addr: u64, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            entry_addr,
            kind,
        }
    }
}

/// Ordered collection of symbols resolved from an executable.
///
/// Symbols are shared with the call frames referencing them, so a frame
/// outlives the table of the image it was pushed from (e.g., across `exec`).
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Arc<Symbol>>,
    by_addr: HashMap<u64, usize>,
}

impl SymbolTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a symbol.
    ///
    /// If another symbol already has the same entry address, the first one
    /// wins the address lookup.
    pub fn push(&mut self, symbol: Symbol) {
        let index = self.symbols.len();
        self.by_addr.entry(symbol.entry_addr).or_insert(index);
        self.symbols.push(Arc::new(symbol));
    }

    /// Returns the symbol whose entry address is `addr`.
    pub fn find_by_addr(&self, addr: u64) -> Option<&Arc<Symbol>> {
        self.by_addr.get(&addr).map(|&index| &self.symbols[index])
    }

    /// Iterates over the symbols, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Symbol>> {
        self.symbols.iter()
    }

    /// Distinct entry addresses of the symbols.
    pub fn entry_addrs(&self) -> impl Iterator<Item = u64> + '_ {
        self.by_addr.keys().copied()
    }

    /// Keeps only the symbols matching `keep`.
    pub fn filtered(self, mut keep: impl FnMut(&Symbol) -> bool) -> Self {
        self.symbols
            .into_iter()
            .filter(|symbol| keep(symbol))
            .fold(Self::new(), |mut table, symbol| {
                let index = table.symbols.len();
                table.by_addr.entry(symbol.entry_addr).or_insert(index);
                table.symbols.push(symbol);
                table
            })
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl FromIterator<Symbol> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |mut table, symbol| {
            table.push(symbol);
            table
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Symbol, SymbolKind, SymbolTable};

    #[test]
    fn lookup_by_entry_address() {
        let table: SymbolTable = [
            Symbol::new("puts", 0x1030, SymbolKind::Plt),
            Symbol::new("main", 0x1140, SymbolKind::Local),
            Symbol::new("main_alias", 0x1140, SymbolKind::Local),
        ]
        .into_iter()
        .collect();

        assert_eq!(table.len(), 3);
        assert_eq!(table.find_by_addr(0x1030).map(|s| s.name.as_str()), Some("puts"));
        assert_eq!(table.find_by_addr(0x1140).map(|s| s.name.as_str()), Some("main"));
        assert!(table.find_by_addr(0x1031).is_none());

        let mut addrs: Vec<_> = table.entry_addrs().collect();
        addrs.sort_unstable();
        assert_eq!(addrs, [0x1030, 0x1140]);
    }

    #[test]
    fn filter_rebuilds_index() {
        let table: SymbolTable = [
            Symbol::new("puts", 0x1030, SymbolKind::Plt),
            Symbol::new("main", 0x1140, SymbolKind::Local),
        ]
        .into_iter()
        .collect();

        let table = table.filtered(|s| s.kind == SymbolKind::Plt);

        assert_eq!(table.len(), 1);
        assert!(table.find_by_addr(0x1140).is_none());
        assert_eq!(table.find_by_addr(0x1030).map(|s| s.name.as_str()), Some("puts"));
    }
}
