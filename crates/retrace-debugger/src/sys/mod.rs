#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod linux;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use self::linux::*;

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
compile_error!("No tracing backend is available for this platform.");
