//! The node operation facade.
//!
//! [`Client`] is the caller-facing surface: connect/disconnect, node CRUD in
//! blocking and non-blocking forms, ACL access, watches and a leader-election
//! helper. Each operation validates the session handle first and fails fast
//! with [`Error::ConnectionLoss`] when there is none, then translates
//! arguments to native call shapes and routes results either as direct return
//! values or through the context registry into a completion.
//!
//! Blocking operations block the calling thread until the native call
//! returns; they must not be issued from inside a native callback, where they
//! could deadlock the native I/O thread. Non-blocking operations return after
//! enqueueing; everything past enqueue-time validation is delivered exactly
//! once through the completion, on the native I/O thread.

use crate::error::{check, Error, Result};
use crate::event::{classify, ChangeKind, EventKind, SessionState, WatchedEvent};
use crate::native::{Ctx, LogLevel, NativeClient, NativeHandle};
use crate::path;
use crate::registry::{Payload, Registry};
use crate::types::{Acl, AclTemplate, Election, NodeType, Stat};
use crate::watch::{self, Aspect, WatchDescriptor, WatcherId};
use std::sync::{Arc, Mutex};

/// Fixed capacity of the synchronous read buffer, matching the service's
/// documented maximum node payload. Larger payloads surface
/// [`Error::PayloadOverflow`] instead of being truncated.
pub const MAX_PAYLOAD: usize = 10_240;

/// Default session timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: i32 = 10_000;

/// Callbacks shared with the default watcher for the life of one session.
///
/// Registered in the context registry at connect time; the session trampoline
/// resolves it on every session-level or unclassified node event.
pub struct SessionShared {
    pub(crate) on_state: Box<dyn Fn(SessionState) + Send + Sync>,
    pub(crate) on_change: Box<dyn Fn(ChangeKind) + Send + Sync>,
}

struct Session {
    zh: NativeHandle,
    ctx: Ctx,
    /// Context tokens of watches armed during this session. Closing the
    /// native handle kills every armed subscription, so these entries must be
    /// reclaimed with the session or they would sit in the registry with no
    /// trampoline left to ever resolve them.
    watches: Vec<Ctx>,
}

/// A client instance over one logical session.
///
/// At most one native connection handle is live per instance; establishing a
/// new connection first closes any existing one.
pub struct Client {
    native: Arc<dyn NativeClient>,
    timeout_ms: i32,
    session: Mutex<Option<Session>>,
}

impl Client {
    /// Create an unconnected client over the given native library binding.
    pub fn new(native: Arc<dyn NativeClient>, timeout_ms: i32) -> Self {
        Self {
            native,
            timeout_ms,
            session: Mutex::new(None),
        }
    }

    /// [`Client::new`] with [`DEFAULT_TIMEOUT_MS`].
    pub fn with_defaults(native: Arc<dyn NativeClient>) -> Self {
        Self::new(native, DEFAULT_TIMEOUT_MS)
    }

    /// Connect to the service. Connection progress arrives asynchronously
    /// through `on_state`: expect `Connected`, then possibly `Disconnected`
    /// or `Expired` over the session's life.
    pub fn connect(
        &self,
        hosts: &str,
        on_state: impl Fn(SessionState) + Send + Sync + 'static,
    ) -> Result<()> {
        self.connect_with(hosts, on_state, |_| {})
    }

    /// [`Client::connect`] with an additional per-event-type change callback
    /// for node events that reach the default watcher unclassified.
    pub fn connect_with(
        &self,
        hosts: &str,
        on_state: impl Fn(SessionState) + Send + Sync + 'static,
        on_change: impl Fn(ChangeKind) + Send + Sync + 'static,
    ) -> Result<()> {
        let mut session = self.lock_session();

        // One live native handle per client: drop any prior session first.
        if let Some(old) = session.take() {
            self.teardown(old);
        }

        let shared = Arc::new(SessionShared {
            on_state: Box::new(on_state),
            on_change: Box::new(on_change),
        });
        let ctx = Registry::global().register(Payload::Session(shared));

        match self.native.init(hosts, session_watcher, self.timeout_ms, ctx) {
            Ok(zh) => {
                *session = Some(Session {
                    zh,
                    ctx,
                    watches: Vec::new(),
                });
                Ok(())
            }
            Err(rc) => {
                let _ = Registry::global().release(ctx);
                Err(Error::from_code(rc))
            }
        }
    }

    /// Close the native connection and release every registry entry the
    /// session owns: its live watches and the session entry itself. A no-op
    /// when already disconnected.
    pub fn disconnect(&self) {
        let mut session = self.lock_session();
        if let Some(s) = session.take() {
            self.teardown(s);
        }
    }

    fn teardown(&self, session: Session) {
        // Reclaim watch entries before closing so any in-flight firing
        // resolves to a released entry and is dropped. Entries already ended
        // by a terminal event are simply gone.
        for ctx in session.watches {
            if let Ok(desc) = Registry::global().watch(ctx) {
                desc.cancel();
            }
            let _ = Registry::global().release(ctx);
        }
        let rc = self.native.close(session.zh);
        if let Err(err) = check(rc) {
            tracing::warn!(error = %err, "native close failed");
        }
        let _ = Registry::global().release(session.ctx);
    }

    /// Read a node's payload and stat.
    pub fn load(&self, node: &str) -> Result<(Vec<u8>, Stat)> {
        let zh = self.handle()?;
        path::validate(node)?;
        let (data, stat) = self.native.get(zh, node).map_err(Error::from_code)?;
        if data.len() > MAX_PAYLOAD {
            return Err(Error::PayloadOverflow);
        }
        Ok((data, stat))
    }

    /// Non-blocking [`Client::load`]. Only enqueue-time failures are returned
    /// here; every other outcome reaches `completion` exactly once.
    pub fn load_async(
        &self,
        node: &str,
        completion: impl FnOnce(Result<(Vec<u8>, Stat)>) + Send + 'static,
    ) -> Result<()> {
        let zh = self.handle()?;
        path::validate(node)?;
        let ctx = Registry::global().register(Payload::DataCompletion(Box::new(completion)));
        let rc = self.native.aget(zh, node, data_completion, ctx);
        if let Err(err) = check(rc) {
            let _ = Registry::global().take(ctx);
            return Err(err);
        }
        Ok(())
    }

    /// Write a node's payload. `version` of `Some(v)` demands that exact data
    /// version and fails with [`Error::BadVersion`] on mismatch; `None` skips
    /// the check.
    pub fn save(&self, node: &str, data: &[u8], version: Option<i32>) -> Result<Stat> {
        let zh = self.handle()?;
        path::validate(node)?;
        if data.len() > MAX_PAYLOAD {
            return Err(Error::PayloadOverflow);
        }
        self.native
            .set(zh, node, data, version.unwrap_or(-1))
            .map_err(Error::from_code)
    }

    /// Non-blocking [`Client::save`].
    pub fn save_async(
        &self,
        node: &str,
        data: &[u8],
        version: Option<i32>,
        completion: impl FnOnce(Result<Stat>) + Send + 'static,
    ) -> Result<()> {
        let zh = self.handle()?;
        path::validate(node)?;
        if data.len() > MAX_PAYLOAD {
            return Err(Error::PayloadOverflow);
        }
        let ctx = Registry::global().register(Payload::StatusCompletion(Box::new(completion)));
        let rc = self
            .native
            .aset(zh, node, data, version.unwrap_or(-1), status_completion, ctx);
        if let Err(err) = check(rc) {
            let _ = Registry::global().take(ctx);
            return Err(err);
        }
        Ok(())
    }

    /// Stat a node. Absence is a normal negative result, not a failure.
    pub fn exists(&self, node: &str) -> Result<Option<Stat>> {
        let zh = self.handle()?;
        path::validate(node)?;
        match self.native.exists(zh, node) {
            Ok(stat) => Ok(Some(stat)),
            Err(rc) => match Error::from_code(rc) {
                Error::NoNode => Ok(None),
                err => Err(err),
            },
        }
    }

    /// List a node's children, in the order the service returned them (not
    /// guaranteed sorted).
    pub fn children(&self, node: &str) -> Result<Vec<String>> {
        let zh = self.handle()?;
        path::validate(node)?;
        self.native.get_children(zh, node).map_err(Error::from_code)
    }

    /// Create a node and return its server-assigned path; for sequential
    /// types that is the requested path plus a numeric suffix.
    pub fn create(
        &self,
        node: &str,
        data: &[u8],
        node_type: NodeType,
        acl: AclTemplate,
    ) -> Result<String> {
        let zh = self.handle()?;
        path::validate(node)?;
        if data.len() > MAX_PAYLOAD {
            return Err(Error::PayloadOverflow);
        }
        self.native
            .create(zh, node, data, &acl.entries(), node_type.flags())
            .map_err(Error::from_code)
    }

    /// Delete a node, optionally guarded by an expected data version.
    pub fn delete(&self, node: &str, version: Option<i32>) -> Result<()> {
        let zh = self.handle()?;
        path::validate(node)?;
        check(self.native.delete(zh, node, version.unwrap_or(-1)))
    }

    /// Read a node's ACL list and stat.
    pub fn get_acl(&self, node: &str) -> Result<(Vec<Acl>, Stat)> {
        let zh = self.handle()?;
        path::validate(node)?;
        self.native.get_acl(zh, node).map_err(Error::from_code)
    }

    /// Replace a node's ACL list, optionally guarded by an expected ACL
    /// version.
    pub fn set_acl(&self, node: &str, version: Option<i32>, acl: &[Acl]) -> Result<()> {
        let zh = self.handle()?;
        path::validate(node)?;
        check(self.native.set_acl(zh, node, version.unwrap_or(-1), acl))
    }

    /// Subscribe to change events on a node.
    ///
    /// Arms one native subscription per requested aspect; with `renew` the
    /// fired side is re-armed after every non-terminal event, without it the
    /// watch fires once. Watching the same path twice creates two independent
    /// subscriptions. A side that fails to arm after enqueue is reported to
    /// the callback as [`EventKind::NotWatching`]; once no side remains
    /// armed the watch ends. Cancel with [`Client::unwatch`]; any watch still
    /// live at disconnect ends with the session.
    pub fn watch(
        &self,
        node: &str,
        aspect: Aspect,
        renew: bool,
        on_event: impl Fn(WatchedEvent) + Send + Sync + 'static,
    ) -> Result<WatcherId> {
        path::validate(node)?;
        let mut session = self.lock_session();
        let s = session.as_mut().ok_or(Error::ConnectionLoss)?;

        let desc = Arc::new(WatchDescriptor::new(
            node,
            aspect,
            renew,
            Box::new(on_event),
            self.native.clone(),
        ));
        let ctx = Registry::global().register(Payload::Watch(desc.clone()));

        if aspect.includes_data() {
            let rc = self
                .native
                .awget(s.zh, node, watch::node_watcher, ctx, watch::arm_data_note, ctx);
            if let Err(err) = check(rc) {
                let _ = Registry::global().release(ctx);
                return Err(err);
            }
            desc.note_armed();
        }
        if aspect.includes_children() {
            let rc = self.native.awget_children(
                s.zh,
                node,
                watch::node_watcher,
                ctx,
                watch::arm_children_note,
                ctx,
            );
            if let Err(err) = check(rc) {
                // Any already-armed data subscription now resolves to an
                // unknown handle and is dropped by the trampoline.
                let _ = Registry::global().release(ctx);
                return Err(err);
            }
            desc.note_armed();
        }
        s.watches.push(ctx);
        Ok(WatcherId(ctx))
    }

    /// Cancel a watch: no further events are delivered and nothing is
    /// re-armed. There is no native cancellation of the armed subscription;
    /// its next (last) firing resolves to a released entry and is dropped.
    pub fn unwatch(&self, id: WatcherId) -> Result<()> {
        let desc = Registry::global().watch(id.0)?;
        desc.cancel();
        let mut session = self.lock_session();
        if let Some(s) = session.as_mut() {
            s.watches.retain(|&ctx| ctx != id.0);
        }
        drop(session);
        Registry::global().release(id.0)
    }

    /// Run one leader-election round under `node`.
    ///
    /// Registers this client as a candidate with an ephemeral sequential
    /// child, then reads back the live candidate set; the lowest sequence
    /// number wins. Dropping the session withdraws the candidacy.
    pub fn elect(&self, node: &str) -> Result<Election> {
        let me_path = self.create(
            &format!("{}/candidate", node),
            &[],
            NodeType::EphemeralSequential,
            AclTemplate::Open,
        )?;
        let me = path::sequence_suffix(&me_path).ok_or(Error::MarshallingError)?;

        let mut candidates: Vec<u64> = self
            .children(node)?
            .iter()
            .filter_map(|name| path::sequence_suffix(name))
            .collect();
        candidates.sort_unstable();
        let leader = *candidates.first().ok_or(Error::MarshallingError)?;

        Ok(Election {
            me,
            leader,
            candidates,
        })
    }

    /// Pass-through for the native library's log verbosity.
    pub fn set_log_level(&self, level: LogLevel) {
        self.native.set_log_level(level);
    }

    /// Whether a session is currently established.
    pub fn is_connected(&self) -> bool {
        self.lock_session().is_some()
    }

    fn handle(&self) -> Result<NativeHandle> {
        self.lock_session()
            .as_ref()
            .map(|s| s.zh)
            .ok_or(Error::ConnectionLoss)
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().expect("client session lock poisoned")
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Default watcher trampoline registered at connect time.
///
/// Session events drive the connection-state callback; node events that land
/// here (rather than at a node watcher) drive the per-event-type change
/// callback. Lookup only, no closure state.
fn session_watcher(_handle: NativeHandle, event_type: i32, state: i32, path: &str, ctx: Ctx) {
    let shared = match Registry::global().session(ctx) {
        Ok(shared) => shared,
        Err(err) => {
            tracing::warn!(ctx, error = %err, event_type, "session event dropped");
            return;
        }
    };
    match classify(event_type, state, path).kind {
        EventKind::Session(session_state) => {
            tracing::debug!(?session_state, "session state change");
            (shared.on_state)(session_state);
        }
        EventKind::DataChanged => (shared.on_change)(ChangeKind::Data),
        EventKind::ChildrenChanged => (shared.on_change)(ChangeKind::Children),
        kind => {
            tracing::debug!(?kind, path, "unclassified event at default watcher");
        }
    }
}

/// Trampoline for asynchronous data reads. Resolves and consumes the one-shot
/// completion; a stale token is logged and the event dropped.
fn data_completion(rc: i32, data: Option<&[u8]>, stat: Option<&Stat>, ctx: Ctx) {
    let cb = match Registry::global().take_data_completion(ctx) {
        Ok(cb) => cb,
        Err(err) => {
            tracing::warn!(ctx, error = %err, "data completion dropped");
            return;
        }
    };
    if let Err(err) = check(rc) {
        cb(Err(err));
        return;
    }
    let bytes = data.map(<[u8]>::to_vec).unwrap_or_default();
    if bytes.len() > MAX_PAYLOAD {
        cb(Err(Error::PayloadOverflow));
        return;
    }
    cb(Ok((bytes, stat.copied().unwrap_or_default())));
}

/// Trampoline for asynchronous status writes.
fn status_completion(rc: i32, stat: Option<&Stat>, ctx: Ctx) {
    let cb = match Registry::global().take_status_completion(ctx) {
        Ok(cb) => cb,
        Err(err) => {
            tracing::warn!(ctx, error = %err, "status completion dropped");
            return;
        }
    };
    match check(rc) {
        Ok(()) => cb(Ok(stat.copied().unwrap_or_default())),
        Err(err) => cb(Err(err)),
    }
}
