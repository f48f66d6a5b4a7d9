//! Tokio runtime helpers shared by fibers and dispatchers.

use std::io;

use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

use crate::domain::BoxFuture;

/// Build the single-threaded runtime a fiber uses to drive async payloads.
///
/// `block_on` on a current-thread runtime never leaves the calling thread,
/// so async payloads keep the fiber's thread affinity.
pub fn fiber_runtime() -> io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}

/// Drive a fire-and-forget future to completion.
///
/// Inside a multi-thread tokio runtime the future is spawned on it. Otherwise
/// a short-lived thread with its own runtime runs it, so the caller never
/// blocks. A current-thread runtime (a fiber's) only polls spawned tasks while
/// something is inside `block_on`, so it gets the thread path too.
pub(crate) fn drive_detached(fut: BoxFuture<()>) {
    if let Ok(handle) = Handle::try_current() {
        if handle.runtime_flavor() == RuntimeFlavor::MultiThread {
            handle.spawn(fut);
            return;
        }
    }

    let spawned = std::thread::Builder::new()
        .name("spindle-detached".to_string())
        .spawn(move || match fiber_runtime() {
            Ok(rt) => rt.block_on(fut),
            Err(e) => tracing::error!(error = %e, "failed to build runtime for detached dispatch"),
        });
    if let Err(e) = spawned {
        tracing::error!(error = %e, "failed to spawn thread for detached dispatch");
    }
}
