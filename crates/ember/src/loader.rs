//! Privileged loader boundary — hands the assembled payload to the kernel.
//!
//! The pipeline talks to [`ModuleLoader`]; [`KernelLoader`] is the Linux
//! implementation over the module syscalls. The loader is given the buffer
//! and its exact length and the buffer stays untouched until the call
//! returns; on success ownership reverts to the caller for release.

use std::ffi::CString;

use thiserror::Error;

pub trait ModuleLoader {
    /// Install the payload image into the running kernel.
    fn deliver(&self, image: &[u8]) -> Result<(), LoadError>;

    /// Whether a module with this name is currently loaded.
    fn is_loaded(&self, name: &str) -> Result<bool, LoadError>;

    /// Remove a loaded module by name.
    fn unload(&self, name: &str) -> Result<(), LoadError>;
}

/// Loads modules via `init_module(2)` / `delete_module(2)`.
pub struct KernelLoader;

impl ModuleLoader for KernelLoader {
    fn deliver(&self, image: &[u8]) -> Result<(), LoadError> {
        // NUL-terminated empty parameter string for init_module.
        const NO_PARAMS: &[u8] = b"\0";
        let rc = unsafe {
            libc::syscall(
                libc::SYS_init_module,
                image.as_ptr(),
                image.len() as libc::c_ulong,
                NO_PARAMS.as_ptr(),
            )
        };
        if rc != 0 {
            return Err(LoadError::Kernel(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn is_loaded(&self, name: &str) -> Result<bool, LoadError> {
        let modules =
            std::fs::read_to_string("/proc/modules").map_err(LoadError::ModuleList)?;
        Ok(modules
            .lines()
            .any(|line| line.split_whitespace().next() == Some(name)))
    }

    fn unload(&self, name: &str) -> Result<(), LoadError> {
        let cname = CString::new(name).map_err(|_| LoadError::BadName)?;
        let rc = unsafe {
            libc::syscall(
                libc::SYS_delete_module,
                cname.as_ptr(),
                libc::O_NONBLOCK as libc::c_ulong,
            )
        };
        if rc != 0 {
            return Err(LoadError::Kernel(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Deliberately generic: the caller learns that the load failed, not why the
/// kernel disliked the image beyond the OS error.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("kernel rejected the operation: {0}")]
    Kernel(#[source] std::io::Error),

    #[error("module name contains a NUL byte")]
    BadName,

    #[error("failed to read the module list: {0}")]
    ModuleList(#[source] std::io::Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
