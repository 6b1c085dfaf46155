use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation flag shared between the CLI and running work.
///
/// Work checks it between steps only; a collaborator already started is
/// always awaited.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT into `token`.
///
/// The signal handler only flips a static flag; a watcher thread forwards it
/// to the token. A second Ctrl-C falls through to the default disposition.
pub fn install_interrupt_handler(token: &CancelToken) {
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    let previous = unsafe {
        libc::signal(
            libc::SIGINT,
            on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t,
        )
    };
    if previous == libc::SIG_ERR {
        tracing::warn!("could not install SIGINT handler; Ctrl-C will abort the run");
        return;
    }

    let token = token.clone();
    std::thread::spawn(move || loop {
        if INTERRUPTED.load(Ordering::SeqCst) {
            tracing::warn!("interrupt received; finishing in-flight work and checkpointing");
            token.cancel();
            // SAFETY: restoring the default disposition has no preconditions.
            unsafe {
                libc::signal(libc::SIGINT, libc::SIG_DFL);
            }
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    });
}
