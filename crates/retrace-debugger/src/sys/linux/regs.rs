use nix::libc::user_regs_struct;
use nix::sys::ptrace;
use nix::unistd::Pid;

pub fn get_registers(pid: Pid) -> crate::sys::Result<user_regs_struct> {
    let regs = ptrace::getregs(pid)
        .inspect_err(|e| tracing::error!(error = %e, "ptrace(PTRACE_GETREGS)"))?;

    Ok(regs)
}

pub fn stack_pointer(pid: Pid) -> crate::sys::Result<u64> {
    get_registers(pid).map(|regs| regs.rsp)
}

/// Number of the system call being entered or returned from.
pub fn syscall_number(pid: Pid) -> crate::sys::Result<u64> {
    get_registers(pid).map(|regs| regs.orig_rax)
}

pub fn syscall_return_value(pid: Pid) -> crate::sys::Result<i64> {
    get_registers(pid).map(|regs| regs.rax as i64)
}

/// Moves the instruction pointer to `addr`.
pub fn set_instruction_pointer(pid: Pid, addr: u64) -> crate::sys::Result<()> {
    let mut regs = get_registers(pid)?;
    regs.rip = addr;

    ptrace::setregs(pid, regs)
        .inspect_err(|e| tracing::error!(error = %e, "ptrace(PTRACE_SETREGS)"))?;

    Ok(())
}
