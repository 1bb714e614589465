//! Interrupt-driven cleanup of the in-flight destination artefact.
//!
//! A process-wide single slot holds the path of the currently-open
//! destination file. On SIGINT the handler unlinks that artefact, prints a
//! newline, and exits with status 2. The handler only performs
//! async-signal-safe operations: an atomic load, `unlink`, `write`, and
//! `_exit`. No locks, no allocation.
//!
//! The slot must only be armed after the destination has been successfully
//! opened, and must be cleared before the destination is closed; that window
//! is the only one during which an interrupt may delete a file. The batch
//! driver also clears the slot before removing a source (`--rm`), so an
//! interrupt between success and source removal cannot delete the
//! destination.
//!
//! [`ArmedDestination`] scopes the arm/disarm pair: construction arms,
//! [`ArmedDestination::disarm`] (or drop) restores the default handler.

use std::ffi::CString;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::util::is_reg_file;

static ARTEFACT: AtomicPtr<libc::c_char> = AtomicPtr::new(ptr::null_mut());

#[cfg(unix)]
extern "C" fn int_handler(sig: libc::c_int) {
    unsafe {
        libc::signal(sig, libc::SIG_IGN);
        let path = ARTEFACT.load(Ordering::SeqCst);
        if !path.is_null() {
            libc::unlink(path);
        }
        let nl = b"\n";
        libc::write(2, nl.as_ptr() as *const libc::c_void, 1);
        libc::_exit(2);
    }
}

fn install_handler() {
    #[cfg(unix)]
    unsafe {
        let handler = int_handler as extern "C" fn(libc::c_int);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

fn restore_default_handler() {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
    }
}

/// Records `dst_file_name` in the artefact slot and installs the interrupt
/// handler. Non-regular destinations (stdout, /dev/null) leave the slot
/// empty: there is nothing to unlink for them.
fn arm(dst_file_name: &str) {
    if is_reg_file(Path::new(dst_file_name)) {
        if let Ok(c) = CString::new(dst_file_name) {
            let old = ARTEFACT.swap(c.into_raw(), Ordering::SeqCst);
            if !old.is_null() {
                // The batch driver never arms over a live arm; free anyway.
                unsafe { drop(CString::from_raw(old)) };
            }
            install_handler();
            return;
        }
    }
    clear_slot();
}

fn clear_slot() {
    let old = ARTEFACT.swap(ptr::null_mut(), Ordering::SeqCst);
    if !old.is_null() {
        unsafe { drop(CString::from_raw(old)) };
    }
}

/// Clears the slot and restores the default SIGINT disposition.
/// Safe to call repeatedly.
fn disarm() {
    clear_slot();
    restore_default_handler();
}

#[cfg(test)]
pub(crate) fn armed_path() -> Option<String> {
    let p = ARTEFACT.load(Ordering::SeqCst);
    if p.is_null() {
        None
    } else {
        unsafe {
            Some(
                std::ffi::CStr::from_ptr(p)
                    .to_string_lossy()
                    .into_owned(),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Scoped arming
// ---------------------------------------------------------------------------

/// Scopes the artefact slot around a destination's open lifetime.
///
/// Created right after the destination opens; [`disarm`](Self::disarm) is
/// called before the destination closes (drop covers early error returns).
pub struct ArmedDestination {
    armed: bool,
}

impl ArmedDestination {
    /// Arms the slot for `dst_file_name`.
    pub fn arm(dst_file_name: &str) -> Self {
        arm(dst_file_name);
        ArmedDestination { armed: true }
    }

    /// Explicitly clears the slot ahead of scope end.
    pub fn disarm(mut self) {
        self.armed = false;
        disarm();
    }
}

impl Drop for ArmedDestination {
    fn drop(&mut self) {
        if self.armed {
            disarm();
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
