//! Best-effort close of open device handles at process end.
//!
//! Controllers register the raw handle of every device they open; a signal
//! handler installed once per process closes whatever is still registered
//! before the process dies. Orderly teardown goes through
//! `SerialController::close_device` / `Drop`, which unregister first.

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

/// Raw OS handle widened to a plain integer so the registry is `Send`.
type RawDevice = usize;

static OPEN_DEVICES: Lazy<Mutex<HashMap<u64, RawDevice>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static EXIT_HANDLER: OnceCell<()> = OnceCell::new();

/// Install the process-wide interrupt handler. Idempotent.
pub(crate) fn install_exit_handler() {
    EXIT_HANDLER.get_or_init(|| {
        if let Err(err) = ctrlc::set_handler(|| {
            close_all();
            std::process::exit(130);
        }) {
            // Another handler may already own the signal; the Drop path
            // still covers orderly exits.
            log::warn!("could not install device close handler: {err}");
        }
    });
}

pub(crate) fn register(raw: RawDevice) -> u64 {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    OPEN_DEVICES.lock().insert(id, raw);
    id
}

pub(crate) fn unregister(id: u64) {
    OPEN_DEVICES.lock().remove(&id);
}

fn close_all() {
    let devices = std::mem::take(&mut *OPEN_DEVICES.lock());
    for (_, raw) in devices {
        if let Err(err) = close_raw(raw) {
            log::warn!("closing device handle at exit failed: {err}");
        }
    }
}

/// Close a raw handle previously detached from its owning `File`.
pub(crate) fn close_raw(raw: RawDevice) -> std::io::Result<()> {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            if unsafe { libc::close(raw as libc::c_int) } == 0 {
                Ok(())
            } else {
                Err(std::io::Error::last_os_error())
            }
        } else if #[cfg(windows)] {
            use windows::Win32::Foundation::{CloseHandle, HANDLE};
            unsafe { CloseHandle(HANDLE(raw as *mut core::ffi::c_void)) }
                .map_err(|err| std::io::Error::other(err.to_string()))
        } else {
            let _ = raw;
            Ok(())
        }
    }
}

#[cfg(test)]
pub(crate) fn registered_count() -> usize {
    OPEN_DEVICES.lock().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_unregister_bookkeeping() {
        let before = registered_count();
        let id = register(42);
        assert_eq!(registered_count(), before + 1);
        unregister(id);
        assert_eq!(registered_count(), before);
        // Unregistering twice is harmless.
        unregister(id);
        assert_eq!(registered_count(), before);
    }

    #[cfg(unix)]
    #[test]
    fn close_raw_closes_a_real_descriptor() {
        use std::os::unix::io::IntoRawFd;

        let path = std::env::temp_dir().join("ttygate-shutdown-test");
        let file = std::fs::File::create(&path).unwrap();
        let raw = file.into_raw_fd() as RawDevice;
        assert!(close_raw(raw).is_ok());
        let _ = std::fs::remove_file(&path);
    }
}
