use nix::errno::Errno;
use nix::libc::{iovec, process_vm_readv};
use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::common::breakpoint::ProcessMemory;

/// Memory of a traced process, accessed with `ptrace`.
pub struct TraceeMemory {
    pid: Pid,
}

impl TraceeMemory {
    pub const fn new(pid: u64) -> Self {
        Self {
            pid: Pid::from_raw(pid as i32),
        }
    }
}

impl ProcessMemory for TraceeMemory {
    fn read(&self, addr: u64, buf: &mut [u8]) -> crate::sys::Result<()> {
        read_process_memory(self.pid, addr, buf)
    }

    fn write(&mut self, addr: u64, buf: &[u8]) -> crate::sys::Result<()> {
        write_process_memory(self.pid, addr, buf)
    }
}

/// Reads a little-endian 64-bit word from memory of the given process.
pub fn read_u64(pid: Pid, addr: u64) -> crate::sys::Result<u64> {
    let mut buf = [0u8; 8];
    read_process_memory(pid, addr, &mut buf)?;

    Ok(u64::from_le_bytes(buf))
}

/// Reads memory from the given process.
pub fn read_process_memory(pid: Pid, addr: u64, buf: &mut [u8]) -> crate::sys::Result<()> {
    let local_iov = iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };

    let remote_iov = iovec {
        iov_base: addr as *mut _,
        iov_len: buf.len(),
    };

    let len = unsafe {
        Errno::result(process_vm_readv(
            pid.as_raw(),
            &local_iov as *const _,
            1,
            &remote_iov as *const _,
            1,
            0,
        ))
        .inspect_err(
            |e| tracing::error!(error = %e, addr = format_args!("{addr:#x}"), "process_vm_readv"),
        )
        .map(|len| len as usize)?
    };

    if len != buf.len() {
        Err(crate::sys::Error::PartialMemOp(len, buf.len()))
    } else {
        Ok(())
    }
}

/// Writes memory into the given process.
///
/// Text pages are usually read-only, so the data is poked word by word.
pub fn write_process_memory(pid: Pid, addr: u64, buf: &[u8]) -> crate::sys::Result<()> {
    let mut words = buf.chunks_exact(size_of::<u64>());
    let mut write_addr = addr;

    for chunk in &mut words {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);

        poke(pid, write_addr, i64::from_le_bytes(word))?;

        write_addr += chunk.len() as u64;
    }

    let remainder = words.remainder();

    if !remainder.is_empty() {
        // merge the trailing bytes into the word already in memory
        let mut word = ptrace::read(pid, write_addr as *mut _)
            .inspect_err(|e| tracing::error!(error = %e, addr = format_args!("{write_addr:#x}"), "ptrace(PTRACE_PEEKDATA)"))?
            .to_le_bytes();

        word[..remainder.len()].copy_from_slice(remainder);

        poke(pid, write_addr, i64::from_le_bytes(word))?;
    }

    Ok(())
}

fn poke(pid: Pid, addr: u64, data: i64) -> crate::sys::Result<()> {
    ptrace::write(pid, addr as *mut _, data).inspect_err(
        |e| tracing::error!(error = %e, addr = format_args!("{addr:#x}"), "ptrace(PTRACE_POKEDATA)"),
    )?;

    Ok(())
}
