use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::sys;

pub const TRAP_OPCODES: [u8; 1] = [0xcc];

/// Memory of a traced process.
pub trait ProcessMemory {
    /// Reads `buf.len()` bytes at `addr`.
    fn read(&self, addr: u64, buf: &mut [u8]) -> sys::Result<()>;

    /// Writes `buf` at `addr`.
    fn write(&mut self, addr: u64, buf: &[u8]) -> sys::Result<()>;
}

/// Breakpoints of a single traced process.
///
/// Entry breakpoints live as long as the process image. Return breakpoints
/// are reference counted: each usage must be removed before the original
/// instruction is restored.
///
/// Trap instructions are only in memory while the manager is enabled.
#[derive(Debug, Default)]
pub struct BreakpointManager {
    bks: IndexMap<u64, BreakpointContext>,
    enabled: bool,
}

#[derive(Debug)]
struct BreakpointContext {
    /// Instruction bytes overwritten by the trap (valid while inserted).
    orig_opcodes: [u8; TRAP_OPCODES.len()],

    /// Whether the trap is currently written in memory.
    inserted: bool,

    /// Whether this is the entry breakpoint of a symbol.
    entry: bool,

    /// Number of call frames returning to this address.
    ref_count: usize,
}

impl BreakpointContext {
    const fn new(entry: bool) -> Self {
        Self {
            orig_opcodes: [0; TRAP_OPCODES.len()],
            inserted: false,
            entry,
            ref_count: 0,
        }
    }

    fn insert(&mut self, mem: &mut impl ProcessMemory, addr: u64) -> sys::Result<()> {
        if !self.inserted {
            mem.read(addr, &mut self.orig_opcodes)?;
            mem.write(addr, &TRAP_OPCODES)?;
            self.inserted = true;
        }

        Ok(())
    }

    fn lift(&mut self, mem: &mut impl ProcessMemory, addr: u64) -> sys::Result<()> {
        if self.inserted {
            mem.write(addr, &self.orig_opcodes)?;
            self.inserted = false;
        }

        Ok(())
    }
}

impl BreakpointManager {
    /// Forgets every breakpoint and registers the given entry breakpoints.
    ///
    /// Memory is left untouched, and breakpoints are disabled.
    pub fn reset(&mut self, entry_addrs: impl IntoIterator<Item = u64>) {
        self.enabled = false;
        self.bks = entry_addrs
            .into_iter()
            .map(|addr| (addr, BreakpointContext::new(true)))
            .collect();
    }

    /// Number of registered breakpoints.
    pub fn len(&self) -> usize {
        self.bks.len()
    }

    pub fn enable_all(&mut self, mem: &mut impl ProcessMemory) -> sys::Result<()> {
        self.enabled = true;

        for (&addr, cx) in &mut self.bks {
            cx.insert(mem, addr)?;
        }

        Ok(())
    }

    pub fn disable_all(&mut self, mem: &mut impl ProcessMemory) -> sys::Result<()> {
        self.enabled = false;

        for (&addr, cx) in &mut self.bks {
            cx.lift(mem, addr)?;
        }

        Ok(())
    }

    pub fn add_breakpoint_or_increment_usage(
        &mut self,
        mem: &mut impl ProcessMemory,
        addr: u64,
    ) -> sys::Result<()> {
        let cx = match self.bks.entry(addr) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => v.insert(BreakpointContext::new(false)),
        };

        cx.ref_count = cx.ref_count.saturating_add(1);

        if self.enabled {
            cx.insert(mem, addr)?;
        }

        Ok(())
    }

    pub fn remove_breakpoint_or_decrement_usage(
        &mut self,
        mem: &mut impl ProcessMemory,
        addr: u64,
    ) -> sys::Result<()> {
        let Some(cx) = self.bks.get_mut(&addr) else {
            return Ok(());
        };

        cx.ref_count = cx.ref_count.saturating_sub(1);

        if cx.ref_count == 0 && !cx.entry {
            cx.lift(mem, addr)?;
            self.bks.shift_remove(&addr);
        }

        Ok(())
    }

    /// Restores the original instruction at `addr` so it can be executed.
    ///
    /// Returns `false` if no trap was in memory there.
    pub fn lift_for_step(&mut self, mem: &mut impl ProcessMemory, addr: u64) -> sys::Result<bool> {
        match self.bks.get_mut(&addr) {
            Some(cx) if cx.inserted => {
                cx.lift(mem, addr)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Writes back the trap at `addr` after a single-step, if the breakpoint
    /// still exists.
    pub fn reinsert(&mut self, mem: &mut impl ProcessMemory, addr: u64) -> sys::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        match self.bks.get_mut(&addr) {
            Some(cx) => cx.insert(mem, addr),
            None => Ok(()),
        }
    }
}
