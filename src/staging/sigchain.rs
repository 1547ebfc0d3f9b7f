//! Per-signal stacks of previously installed signal actions.
//!
//! Installing a handler pushes the action it replaces; popping restores that
//! action. A handler that wants to hand the signal on calls [`pop`] and then
//! re-raises, so whatever was installed before (another library's handler, or
//! the default disposition) sees the signal next.
//!
//! [`pop`] runs inside signal handlers. It only reads preallocated static
//! storage and calls `sigaction(2)`, both of which are async-signal-safe.

use std::cell::UnsafeCell;
use std::io;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use libc::c_int;

/// Signals that normally terminate a process and should trigger cleanup.
pub(crate) const COMMON_SIGNALS: [c_int; 5] = [
    libc::SIGINT,
    libc::SIGHUP,
    libc::SIGTERM,
    libc::SIGQUIT,
    libc::SIGPIPE,
];

const MAX_SIGNAL: usize = 65;
const MAX_DEPTH: usize = 4;

/// Saved actions for one signal number.
struct Chain {
    depth: AtomicUsize,
    saved: [UnsafeCell<MaybeUninit<libc::sigaction>>; MAX_DEPTH],
}

// SAFETY: `saved[i]` is written only by `push` before `depth` is raised past
// `i` (Release), and read only after observing `depth > i` (Acquire). Pushes
// happen from the registry's one-time initialisation, never concurrently.
unsafe impl Sync for Chain {}

impl Chain {
    const fn new() -> Self {
        Self {
            depth: AtomicUsize::new(0),
            saved: [const { UnsafeCell::new(MaybeUninit::uninit()) }; MAX_DEPTH],
        }
    }
}

static CHAINS: [Chain; MAX_SIGNAL] = [const { Chain::new() }; MAX_SIGNAL];

fn chain_for(signo: c_int) -> Option<&'static Chain> {
    usize::try_from(signo).ok().and_then(|i| CHAINS.get(i))
}

/// Whether `signo` is currently ignored (`SIG_IGN`).
pub(crate) fn is_ignored(signo: c_int) -> io::Result<bool> {
    // SAFETY: a zeroed sigaction is a valid out-parameter.
    let mut current: libc::sigaction = unsafe { std::mem::zeroed() };
    // SAFETY: querying only; `act` is null.
    if unsafe { libc::sigaction(signo, ptr::null(), &mut current) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(current.sa_sigaction == libc::SIG_IGN)
}

/// Install `handler` for `signo`, remembering the action it replaces.
pub(crate) fn push(signo: c_int, handler: extern "C" fn(c_int)) -> io::Result<()> {
    let chain = chain_for(signo)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "signal out of range"))?;
    let depth = chain.depth.load(Ordering::Acquire);
    if depth == MAX_DEPTH {
        return Err(io::Error::other("signal chain is full"));
    }

    // SAFETY: zeroed sigaction structs are valid; the mask is initialised below.
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    let mut previous: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = handler as *const () as libc::sighandler_t;
    action.sa_flags = 0;
    // SAFETY: `action.sa_mask` is a valid sigset_t.
    unsafe { libc::sigemptyset(&mut action.sa_mask) };

    // SAFETY: both pointers reference live, initialised structs.
    if unsafe { libc::sigaction(signo, &action, &mut previous) } != 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: slot `depth` is not visible to `pop` until `depth` is bumped.
    unsafe { (*chain.saved[depth].get()).write(previous) };
    chain.depth.store(depth + 1, Ordering::Release);
    Ok(())
}

/// Install `handler` for every signal in [`COMMON_SIGNALS`] that is not
/// already ignored. Returns how many handlers were installed.
pub(crate) fn push_common(handler: extern "C" fn(c_int)) -> usize {
    let mut installed = 0;
    for signo in COMMON_SIGNALS {
        // An ignored signal never terminates the process, so there is
        // nothing to clean up when it arrives.
        if is_ignored(signo).unwrap_or(false) {
            continue;
        }
        if push(signo, handler).is_ok() {
            installed += 1;
        }
    }
    installed
}

/// Restore the action that was in place before the most recent [`push`] for
/// `signo`. With nothing saved, the default disposition is restored.
///
/// Async-signal-safe.
pub(crate) fn pop(signo: c_int) {
    let Some(chain) = chain_for(signo) else {
        return;
    };
    let depth = chain.depth.load(Ordering::Acquire);
    if depth == 0 {
        // SAFETY: zeroed sigaction with SIG_DFL (0) and an empty mask.
        let mut default: libc::sigaction = unsafe { std::mem::zeroed() };
        default.sa_sigaction = libc::SIG_DFL;
        unsafe { libc::sigaction(signo, &default, ptr::null_mut()) };
        return;
    }
    // SAFETY: slot `depth - 1` was initialised by `push` before `depth` was
    // published.
    let previous = unsafe { (*chain.saved[depth - 1].get()).assume_init_ref() };
    unsafe { libc::sigaction(signo, previous, ptr::null_mut()) };
    chain.depth.store(depth - 1, Ordering::Release);
}

/// Number of saved actions for `signo`.
#[cfg(test)]
pub(crate) fn depth(signo: c_int) -> usize {
    chain_for(signo).map_or(0, |c| c.depth.load(Ordering::Acquire))
}
