//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Mailview.
//
// Mailview is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Mailview is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailview. If not, see <http://www.gnu.org/licenses/>.

//! Process-wide cancellation flag.
//!
//! Long scans over messages, threads or query results poll this at the head
//! of each iteration. Raising it (normally from the SIGINT handler) makes the
//! scan abort with `Error::Interrupted`; the flag is cleared when the abort is
//! observed so that the next scan starts clean.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal;

use crate::support::error::Error;

#[cfg(not(test))]
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(not(test))]
fn with_flag<R>(f: impl FnOnce(&AtomicBool) -> R) -> R {
    f(&INTERRUPTED)
}

// Tests run concurrently on separate threads and must not cancel each
// other's scans.
#[cfg(test)]
thread_local! {
    static INTERRUPTED: AtomicBool = AtomicBool::new(false);
}

#[cfg(test)]
fn with_flag<R>(f: impl FnOnce(&AtomicBool) -> R) -> R {
    INTERRUPTED.with(f)
}

pub fn raise() {
    with_flag(|flag| flag.store(true, Ordering::SeqCst));
}

pub fn is_raised() -> bool {
    with_flag(|flag| flag.load(Ordering::SeqCst))
}

/// Fail with `Error::Interrupted` if the flag is raised, clearing it.
pub fn check() -> Result<(), Error> {
    if with_flag(|flag| flag.swap(false, Ordering::SeqCst)) {
        Err(Error::Interrupted)
    } else {
        Ok(())
    }
}

extern "C" fn on_sigint(_: nix::libc::c_int) {
    raise();
}

/// Route SIGINT into the interrupt flag instead of killing the process.
pub fn install_handler() -> nix::Result<()> {
    let action = signal::SigAction::new(
        signal::SigHandler::Handler(on_sigint),
        signal::SaFlags::empty(),
        signal::SigSet::empty(),
    );
    // Safe since the handler only touches an atomic.
    unsafe { signal::sigaction(signal::SIGINT, &action) }.map(|_| ())
}
