use std::borrow::Cow;

use syscalls::Sysno;

fn sysno(number: u64) -> Option<Sysno> {
    usize::try_from(number).ok().and_then(Sysno::new)
}

/// Returns whether the system call creates a new process.
pub fn is_fork(number: u64) -> bool {
    matches!(
        sysno(number),
        Some(Sysno::fork | Sysno::vfork | Sysno::clone | Sysno::clone3)
    )
}

/// Returns whether the system call replaces the process image.
pub fn is_exec(number: u64) -> bool {
    matches!(sysno(number), Some(Sysno::execve | Sysno::execveat))
}

/// Printable name of a system call (e.g., `SYS_write`).
pub fn name(number: u64) -> Cow<'static, str> {
    match sysno(number) {
        Some(sysno) => Cow::Owned(format!("SYS_{}", sysno.name())),
        None => Cow::Owned(format!("SYS_{number}")),
    }
}
