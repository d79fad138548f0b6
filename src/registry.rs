//! The context registry: the bridge between opaque native tokens and typed
//! client state.
//!
//! The native library communicates only through an address-sized context
//! token. Handing it a real reference is unsound: the referent may move or
//! be dropped while the native layer still holds the address. Instead, every
//! value that must survive a native round trip is registered here against a
//! minted 64-bit token; the trampolines resolve the token back to the value
//! with a checked map lookup. The registry is the single owner of registered
//! state and the single authority on its lifetime: no other component may
//! synthesize or dereference a token.
//!
//! Tokens are minted from a monotonically increasing counter and are never
//! reused for the life of the process, so a stale token held by the native
//! layer can only ever miss the table; it can never alias a newer entry.
//!
//! Entry lifetime is bound to the operation: one-shot completions are removed
//! at resolution (`take_*`), watch entries on cancellation, fire-once firing
//! or a terminal event, and the session entry on disconnect.

use crate::client::SessionShared;
use crate::error::{Error, Result};
use crate::native::Ctx;
use crate::types::Stat;
use crate::watch::WatchDescriptor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// One-shot completion for an asynchronous data read.
pub type DataCompletion = Box<dyn FnOnce(Result<(Vec<u8>, Stat)>) + Send>;

/// One-shot completion for an asynchronous status write.
pub type StatusCompletion = Box<dyn FnOnce(Result<Stat>) + Send>;

/// Everything a context token may stand for.
///
/// A tagged variant resolved by pattern match; there is deliberately no way
/// to get a payload out without naming its kind.
pub enum Payload {
    DataCompletion(DataCompletion),
    StatusCompletion(StatusCompletion),
    Watch(Arc<WatchDescriptor>),
    Session(Arc<SessionShared>),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::DataCompletion(_) => "data-completion",
            Payload::StatusCompletion(_) => "status-completion",
            Payload::Watch(_) => "watch",
            Payload::Session(_) => "session",
        }
    }
}

/// Process-wide table reuniting context tokens with typed values.
///
/// Shared between caller threads (registering) and the native I/O thread
/// (resolving); all access goes through the interior lock.
pub struct Registry {
    next: AtomicU64,
    entries: Mutex<HashMap<Ctx, Payload>>,
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

impl Registry {
    pub fn new() -> Self {
        Self {
            // Token 0 is reserved as the null context.
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide instance the trampolines resolve against.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::new)
    }

    /// Store a payload and mint a token for it. Tokens are unique among all
    /// tokens ever minted by this registry.
    pub fn register(&self, payload: Payload) -> Ctx {
        let ctx = self.next.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(ctx, payload);
        ctx
    }

    /// Remove an entry. Stale, already-released or forged tokens yield
    /// [`Error::UnknownHandle`].
    pub fn release(&self, ctx: Ctx) -> Result<()> {
        match self.lock().remove(&ctx) {
            Some(_) => Ok(()),
            None => Err(Error::UnknownHandle(ctx)),
        }
    }

    /// Remove and return an entry, whatever its kind.
    pub fn take(&self, ctx: Ctx) -> Result<Payload> {
        self.lock().remove(&ctx).ok_or(Error::UnknownHandle(ctx))
    }

    /// Remove and return a one-shot data completion.
    pub fn take_data_completion(&self, ctx: Ctx) -> Result<DataCompletion> {
        let mut entries = self.lock();
        let entry = entries.remove(&ctx).ok_or(Error::UnknownHandle(ctx))?;
        match entry {
            Payload::DataCompletion(cb) => Ok(cb),
            other => {
                tracing::warn!(ctx, kind = other.kind(), "context kind mismatch");
                entries.insert(ctx, other);
                Err(Error::InvalidCallback)
            }
        }
    }

    /// Remove and return a one-shot status completion.
    pub fn take_status_completion(&self, ctx: Ctx) -> Result<StatusCompletion> {
        let mut entries = self.lock();
        let entry = entries.remove(&ctx).ok_or(Error::UnknownHandle(ctx))?;
        match entry {
            Payload::StatusCompletion(cb) => Ok(cb),
            other => {
                tracing::warn!(ctx, kind = other.kind(), "context kind mismatch");
                entries.insert(ctx, other);
                Err(Error::InvalidCallback)
            }
        }
    }

    /// Resolve a watch descriptor without removing it.
    pub fn watch(&self, ctx: Ctx) -> Result<Arc<WatchDescriptor>> {
        match self.lock().get(&ctx) {
            Some(Payload::Watch(desc)) => Ok(desc.clone()),
            Some(_) => Err(Error::InvalidCallback),
            None => Err(Error::UnknownHandle(ctx)),
        }
    }

    /// Resolve a session reference without removing it.
    pub fn session(&self, ctx: Ctx) -> Result<Arc<SessionShared>> {
        match self.lock().get(&ctx) {
            Some(Payload::Session(shared)) => Ok(shared.clone()),
            Some(_) => Err(Error::InvalidCallback),
            None => Err(Error::UnknownHandle(ctx)),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Ctx, Payload>> {
        self.entries.lock().expect("context registry lock poisoned")
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::Aspect;
    use std::sync::mpsc;
    use std::thread;

    fn noop_status() -> Payload {
        Payload::StatusCompletion(Box::new(|_| {}))
    }

    #[test]
    fn register_take_round_trips_completions() {
        let reg = Registry::new();
        let (tx, rx) = mpsc::channel();

        let ctx = reg.register(Payload::DataCompletion(Box::new(move |res| {
            tx.send(res).unwrap();
        })));
        let cb = reg.take_data_completion(ctx).unwrap();
        cb(Ok((b"payload".to_vec(), Stat::default())));

        let got = rx.recv().unwrap().unwrap();
        assert_eq!(got.0, b"payload");
        // One-shot: the entry is gone after take.
        assert!(matches!(
            reg.take_data_completion(ctx),
            Err(Error::UnknownHandle(c)) if c == ctx
        ));
    }

    #[test]
    fn resolve_watch_returns_same_descriptor() {
        let reg = Registry::new();
        let native = Arc::new(crate::sim::SimServer::new());
        let desc = Arc::new(WatchDescriptor::new(
            "/a",
            Aspect::Both,
            true,
            Box::new(|_| {}),
            native,
        ));
        let ctx = reg.register(Payload::Watch(desc.clone()));

        let resolved = reg.watch(ctx).unwrap();
        assert!(Arc::ptr_eq(&desc, &resolved));
        // Non-destructive: resolving again still works.
        assert!(reg.watch(ctx).is_ok());
        reg.release(ctx).unwrap();
        assert!(matches!(
            reg.watch(ctx),
            Err(Error::UnknownHandle(c)) if c == ctx
        ));
    }

    #[test]
    fn unknown_and_released_handles_are_rejected() {
        let reg = Registry::new();
        assert!(matches!(reg.take(0), Err(Error::UnknownHandle(0))));
        assert!(matches!(reg.take(12345), Err(Error::UnknownHandle(12345))));

        let ctx = reg.register(noop_status());
        reg.release(ctx).unwrap();
        assert_eq!(reg.release(ctx), Err(Error::UnknownHandle(ctx)));
    }

    #[test]
    fn kind_mismatch_is_rejected_and_preserved() {
        let reg = Registry::new();
        let ctx = reg.register(noop_status());

        // Wrong accessor: rejected, but the entry survives.
        assert!(matches!(
            reg.take_data_completion(ctx),
            Err(Error::InvalidCallback)
        ));
        assert!(matches!(reg.watch(ctx), Err(Error::InvalidCallback)));
        assert!(reg.take_status_completion(ctx).is_ok());
    }

    #[test]
    fn tokens_unique_across_threads() {
        let reg = Arc::new(Registry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let reg = reg.clone();
            handles.push(thread::spawn(move || {
                (0..100)
                    .map(|_| reg.register(Payload::StatusCompletion(Box::new(|_| {}))))
                    .collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<Ctx> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let count = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), count);
        assert_eq!(reg.len(), count);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_tokens_never_reused(registrations in 1usize..200) {
                let reg = Registry::new();
                let mut seen = std::collections::HashSet::new();
                for _ in 0..registrations {
                    let ctx = reg.register(noop_status());
                    prop_assert!(seen.insert(ctx));
                    // Releasing does not make the token eligible again.
                    reg.release(ctx).unwrap();
                }
                prop_assert!(reg.is_empty());
            }

            #[test]
            fn prop_release_order_irrelevant(keep in proptest::collection::vec(any::<bool>(), 1..64)) {
                let reg = Registry::new();
                let mut live = Vec::new();
                for &k in &keep {
                    let ctx = reg.register(noop_status());
                    if k {
                        live.push(ctx);
                    } else {
                        reg.release(ctx).unwrap();
                    }
                }
                prop_assert_eq!(reg.len(), live.len());
                for ctx in live {
                    prop_assert!(reg.take_status_completion(ctx).is_ok());
                }
                prop_assert!(reg.is_empty());
            }
        }
    }
}
