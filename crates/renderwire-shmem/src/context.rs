//! Shared state threaded through blob encode/decode.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{default_backend, ShmemBackend};
use crate::flow::{FlowControlLedger, SenderId};

/// Forces inline marshalling on one thread regardless of blob size.
///
/// Capture and replay paths serialize command lists into flat buffers where
/// external regions make no sense. A scope guard marks the current thread;
/// the hot-path check is a single relaxed load, writes take the mutex.
#[derive(Debug, Default)]
pub struct InlineOverride {
    active_thread: AtomicU64,
    write_lock: Mutex<()>,
}

impl InlineOverride {
    /// Force inline marshalling on the calling thread until the returned
    /// scope drops.
    pub fn begin_no_shared_mem(self: &Arc<Self>) -> InlineScope {
        let token = current_thread_token();
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.active_thread.store(token, Ordering::Relaxed);
        InlineScope {
            override_flag: Arc::clone(self),
            token,
        }
    }

    /// Whether the calling thread must marshal blobs inline.
    pub fn is_active(&self) -> bool {
        let active = self.active_thread.load(Ordering::Relaxed);
        active != 0 && active == current_thread_token()
    }

    fn end(&self, token: u64) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        // Another scope on another thread may have taken over; only clear
        // our own mark.
        if self.active_thread.load(Ordering::Relaxed) == token {
            self.active_thread.store(0, Ordering::Relaxed);
        }
    }
}

/// Scope during which the owning thread marshals blobs inline.
#[derive(Debug)]
pub struct InlineScope {
    override_flag: Arc<InlineOverride>,
    token: u64,
}

impl Drop for InlineScope {
    fn drop(&mut self) {
        self.override_flag.end(self.token);
    }
}

fn current_thread_token() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TOKEN: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|t| *t)
}

/// Everything blob transport needs besides the parcel itself.
#[derive(Clone)]
pub struct CodecContext {
    backend: Arc<dyn ShmemBackend>,
    ledger: Arc<FlowControlLedger>,
    inline_override: Arc<InlineOverride>,
    sender: SenderId,
}

impl std::fmt::Debug for CodecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecContext")
            .field("sender", &self.sender)
            .field("budget", &self.ledger.budget())
            .finish_non_exhaustive()
    }
}

impl Default for CodecContext {
    fn default() -> Self {
        Self::new(default_backend(), Arc::new(FlowControlLedger::default()))
    }
}

impl CodecContext {
    pub fn new(backend: Arc<dyn ShmemBackend>, ledger: Arc<FlowControlLedger>) -> Self {
        Self {
            backend,
            ledger,
            inline_override: Arc::new(InlineOverride::default()),
            sender: 0,
        }
    }

    /// The same context attributed to a different sending process.
    pub fn with_sender(&self, sender: SenderId) -> Self {
        Self {
            sender,
            ..self.clone()
        }
    }

    pub fn sender(&self) -> SenderId {
        self.sender
    }

    pub fn backend(&self) -> &Arc<dyn ShmemBackend> {
        &self.backend
    }

    pub fn ledger(&self) -> &Arc<FlowControlLedger> {
        &self.ledger
    }

    pub fn inline_override(&self) -> &Arc<InlineOverride> {
        &self.inline_override
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_scoped_to_guard_lifetime() {
        let flag = Arc::new(InlineOverride::default());
        assert!(!flag.is_active());
        {
            let _scope = flag.begin_no_shared_mem();
            assert!(flag.is_active());
        }
        assert!(!flag.is_active());
    }

    #[test]
    fn override_does_not_leak_to_other_threads() {
        let flag = Arc::new(InlineOverride::default());
        let _scope = flag.begin_no_shared_mem();
        assert!(flag.is_active());

        let other = Arc::clone(&flag);
        std::thread::spawn(move || assert!(!other.is_active()))
            .join()
            .unwrap();
    }

    #[test]
    fn context_sender_rebinding() {
        let ctx = CodecContext::default();
        assert_eq!(ctx.sender(), 0);
        let bound = ctx.with_sender(42);
        assert_eq!(bound.sender(), 42);
        // Ledger is shared, not cloned.
        assert!(Arc::ptr_eq(ctx.ledger(), bound.ledger()));
    }
}
