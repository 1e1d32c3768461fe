use std::sync::Arc;

use crate::backend::Symbol;

/// In-progress call of a traced process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFrame {
    /// System call, by number.
    Syscall(u64),

    /// Call of a function resolved from the symbol table.
    ///
    /// A breakpoint is installed at `return_addr` for as long as the frame is
    /// on the stack.
    LibraryCall {
        /// Called function.
        symbol: Arc<Symbol>,

        /// Address the function returns to.
        return_addr: u64,
    },
}

impl CallFrame {
    /// Returns the return address of a library call frame.
    pub const fn return_addr(&self) -> Option<u64> {
        match self {
            Self::Syscall(_) => None,
            Self::LibraryCall { return_addr, .. } => Some(*return_addr),
        }
    }
}

/// Error returned when pushing onto a full call stack.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStackError {
    /// The maximum call depth is reached.
    #[error("call nesting too deep (max depth {max_depth})")]
    Overflow {
        /// Configured maximum depth.
        max_depth: usize,
    },
}

/// Bounded stack of the calls a process is currently in.
///
/// Unlike a fixed-capacity array, the storage grows on demand, but pushing
/// beyond `max_depth` frames is refused with [CallStackError::Overflow].
#[derive(Debug, Clone)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    max_depth: usize,
}

impl CallStack {
    /// Creates an empty call stack holding at most `max_depth` frames.
    pub const fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            max_depth,
        }
    }

    /// Pushes a system call frame.
    pub fn push_syscall(&mut self, number: u64) -> Result<(), CallStackError> {
        self.push(CallFrame::Syscall(number))
    }

    /// Pushes a library call frame.
    ///
    /// The caller is responsible for installing the breakpoint on
    /// `return_addr` once the frame is accepted.
    pub fn push_call(
        &mut self,
        symbol: Arc<Symbol>,
        return_addr: u64,
    ) -> Result<(), CallStackError> {
        self.push(CallFrame::LibraryCall {
            symbol,
            return_addr,
        })
    }

    fn push(&mut self, frame: CallFrame) -> Result<(), CallStackError> {
        if self.frames.len() >= self.max_depth {
            return Err(CallStackError::Overflow {
                max_depth: self.max_depth,
            });
        }

        self.frames.push(frame);
        Ok(())
    }

    /// Pops the most recently pushed frame.
    ///
    /// The caller is responsible for removing the breakpoint on the return
    /// address of a popped library call frame.
    pub fn pop(&mut self) -> Option<CallFrame> {
        debug_assert!(!self.frames.is_empty(), "pop on empty call stack");
        self.frames.pop()
    }

    /// Returns the most recently pushed frame.
    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Returns the depth (counted from the bottom) of the topmost library call
    /// frame returning to `addr`.
    pub fn find_return(&self, addr: u64) -> Option<usize> {
        self.frames
            .iter()
            .rposition(|frame| frame.return_addr() == Some(addr))
    }

    /// Returns the frame at the given depth (counted from the bottom).
    pub fn get(&self, depth: usize) -> Option<&CallFrame> {
        self.frames.get(depth)
    }

    /// Drops the frames of a replaced process image, returning them.
    ///
    /// Only the topmost frame may be kept, if it is the system call which
    /// replaced the image (as told by `is_exec`).
    pub fn drain_for_exec(&mut self, is_exec: impl Fn(u64) -> bool) -> Vec<CallFrame> {
        let keep_top = matches!(self.frames.last(), Some(&CallFrame::Syscall(n)) if is_exec(n));

        let keep_from = if keep_top {
            self.frames.len().saturating_sub(1)
        } else {
            self.frames.len()
        };

        self.frames.drain(..keep_from).collect()
    }

    /// Iterates over the frames, from bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &CallFrame> {
        self.frames.iter()
    }

    /// Current depth.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Maximum depth.
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns whether the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{CallFrame, CallStack, CallStackError};
    use crate::backend::{Symbol, SymbolKind};

    fn symbol(name: &str) -> Arc<Symbol> {
        Arc::new(Symbol::new(name, 0x1000, SymbolKind::Plt))
    }

    #[test]
    fn pop_is_lifo() {
        let mut stack = CallStack::new(8);

        stack.push_syscall(1).unwrap();
        stack.push_call(symbol("foo"), 0x2000).unwrap();
        stack.push_syscall(2).unwrap();

        assert_eq!(stack.pop(), Some(CallFrame::Syscall(2)));
        assert_eq!(stack.pop().and_then(|f| f.return_addr()), Some(0x2000));
        assert_eq!(stack.pop(), Some(CallFrame::Syscall(1)));
        assert!(stack.is_empty());
    }

    #[test]
    fn push_beyond_bound_is_refused() {
        let mut stack = CallStack::new(3);

        for n in 0..3 {
            stack.push_syscall(n).unwrap();
        }

        assert_eq!(
            stack.push_call(symbol("foo"), 0x2000),
            Err(CallStackError::Overflow { max_depth: 3 })
        );
        assert_eq!(stack.push_syscall(3), Err(CallStackError::Overflow { max_depth: 3 }));
        assert_eq!(stack.depth(), 3);
        assert_eq!(stack.top(), Some(&CallFrame::Syscall(2)));
    }

    #[test]
    fn depth_never_exceeds_bound() {
        let mut stack = CallStack::new(4);

        // deterministic mix of pushes and pops
        for step in 0u64..64 {
            if step % 3 == 2 && !stack.is_empty() {
                stack.pop();
            } else {
                let _ = stack.push_syscall(step);
            }
            assert!(stack.depth() <= stack.max_depth());
        }
    }

    #[test]
    fn find_return_picks_topmost_match() {
        let mut stack = CallStack::new(8);

        stack.push_call(symbol("outer"), 0x2000).unwrap();
        stack.push_call(symbol("inner"), 0x3000).unwrap();
        stack.push_call(symbol("recursive"), 0x2000).unwrap();
        stack.push_syscall(60).unwrap();

        assert_eq!(stack.find_return(0x2000), Some(2));
        assert_eq!(stack.find_return(0x3000), Some(1));
        assert_eq!(stack.find_return(0x4000), None);
    }

    #[test]
    fn drain_for_exec_keeps_exec_frame() {
        let mut stack = CallStack::new(8);

        stack.push_call(symbol("foo"), 0x2000).unwrap();
        stack.push_syscall(59).unwrap();

        let dropped = stack.drain_for_exec(|n| n == 59);

        assert_eq!(dropped.len(), 1);
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.top(), Some(&CallFrame::Syscall(59)));
    }

    #[test]
    fn drain_for_exec_drops_stale_top_frame() {
        let mut stack = CallStack::new(2);

        stack.push_syscall(1).unwrap();
        stack.push_call(symbol("foo"), 0x2000).unwrap();
        // the exec frame itself did not fit
        assert!(stack.push_syscall(59).is_err());

        let dropped = stack.drain_for_exec(|n| n == 59);

        assert_eq!(dropped.len(), 2);
        assert!(stack.is_empty());
    }
}
