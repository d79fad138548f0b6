//! In-memory simulation of the native client library.
//!
//! [`SimServer`] implements [`NativeClient`] against a process-local node
//! tree with the semantics the facade relies on: versioned writes, ephemeral
//! nodes tied to a session, per-parent sequential suffixes, one-shot data and
//! child watches, and ACL storage.
//!
//! A dedicated dispatcher thread plays the role of the native I/O thread:
//! async completions and watch events are delivered there, asynchronously
//! with respect to the calling thread, in FIFO order. Synchronous primitives
//! run on the caller's thread but still deliver any watch events they trigger
//! through the dispatcher.

use crate::native::{
    codes, Ctx, DataCompletionFn, LogLevel, NativeClient, NativeHandle, StatCompletionFn,
    StringsCompletionFn, WatcherFn, CHANGED_EVENT, CHILD_EVENT, CONNECTED_STATE, DELETED_EVENT,
    EPHEMERAL_FLAG, EXPIRED_SESSION_STATE, SEQUENCE_FLAG, SESSION_EVENT,
};
use crate::path;
use crate::types::{Acl, AclTemplate, Stat};
use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

type Job = Box<dyn FnOnce() + Send>;

/// A watch event ready for delivery: `(watcher, handle, event_type, state,
/// path, ctx)`.
type Firing = (WatcherFn, NativeHandle, i32, i32, String, Ctx);

struct NodeRec {
    data: Vec<u8>,
    acl: Vec<Acl>,
    ephemeral_owner: NativeHandle,
    version: i32,
    cversion: i32,
    aversion: i32,
    czxid: i64,
    mzxid: i64,
    pzxid: i64,
    ctime: i64,
    mtime: i64,
    /// Next sequential suffix handed to a child.
    next_seq: u64,
    /// One-shot watchers, drained at fire time.
    data_watchers: Vec<(WatcherFn, Ctx, NativeHandle)>,
    child_watchers: Vec<(WatcherFn, Ctx, NativeHandle)>,
}

impl NodeRec {
    fn new(data: Vec<u8>, acl: Vec<Acl>, owner: NativeHandle, zxid: i64, now: i64) -> Self {
        Self {
            data,
            acl,
            ephemeral_owner: owner,
            version: 0,
            cversion: 0,
            aversion: 0,
            czxid: zxid,
            mzxid: zxid,
            pzxid: zxid,
            ctime: now,
            mtime: now,
            next_seq: 0,
            data_watchers: Vec::new(),
            child_watchers: Vec::new(),
        }
    }
}

struct SessionRec {
    watcher: WatcherFn,
    ctx: Ctx,
    ephemerals: Vec<String>,
}

struct SimState {
    nodes: HashMap<String, NodeRec>,
    sessions: HashMap<NativeHandle, SessionRec>,
    next_handle: NativeHandle,
    next_zxid: i64,
    log_level: LogLevel,
}

impl SimState {
    fn bump_zxid(&mut self) -> i64 {
        self.next_zxid += 1;
        self.next_zxid
    }
}

/// The in-memory coordination service.
pub struct SimServer {
    state: Arc<Mutex<SimState>>,
    queue: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SimServer {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            "/".to_string(),
            NodeRec::new(Vec::new(), AclTemplate::Open.entries(), 0, 0, now_ms()),
        );
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name("sim-io".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
            })
            .expect("failed to spawn sim dispatcher");
        Self {
            state: Arc::new(Mutex::new(SimState {
                nodes,
                sessions: HashMap::new(),
                next_handle: 1,
                next_zxid: 0,
                log_level: LogLevel::Warn,
            })),
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Force-expire a session: its armed watchers receive a session-expired
    /// event, its ephemerals are removed (firing other sessions' watches),
    /// and finally the default watcher is told. Test helper.
    pub fn expire_session(&self, handle: NativeHandle) {
        let mut firings = Vec::new();
        let default = {
            let mut st = self.lock();
            let session = match st.sessions.remove(&handle) {
                Some(session) => session,
                None => return,
            };

            // The dying session's node watchers learn of the expiry first and
            // never fire again.
            for node in st.nodes.values_mut() {
                for (w, ctx, zh) in drain_owned(&mut node.data_watchers, handle) {
                    firings.push((w, zh, SESSION_EVENT, EXPIRED_SESSION_STATE, String::new(), ctx));
                }
                for (w, ctx, zh) in drain_owned(&mut node.child_watchers, handle) {
                    firings.push((w, zh, SESSION_EVENT, EXPIRED_SESSION_STATE, String::new(), ctx));
                }
            }

            for node_path in session.ephemerals.iter() {
                firings.extend(remove_node_locked(&mut st, node_path));
            }
            (session.watcher, session.ctx)
        };
        self.fire(firings);
        let (watcher, ctx) = default;
        self.enqueue(Box::new(move || {
            watcher(handle, SESSION_EVENT, EXPIRED_SESSION_STATE, "", ctx)
        }));
    }

    /// Insert a node directly, creating missing parents. Test fixture helper;
    /// bypasses session and payload checks.
    pub fn seed(&self, node: &str, data: &[u8]) {
        let mut st = self.lock();
        let mut prefix = String::new();
        for segment in node.split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);
            if !st.nodes.contains_key(&prefix) {
                let zxid = st.bump_zxid();
                st.nodes.insert(
                    prefix.clone(),
                    NodeRec::new(Vec::new(), AclTemplate::Open.entries(), 0, zxid, now_ms()),
                );
            }
        }
        if let Some(rec) = st.nodes.get_mut(node) {
            rec.data = data.to_vec();
        }
    }

    /// Block until every job enqueued so far has been dispatched. Lets tests
    /// sequence against watch arming and completion delivery. Must not be
    /// called from a callback (it would wait on its own thread).
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        if self.enqueue(Box::new(move || {
            let _ = tx.send(());
        })) == codes::ZOK
        {
            let _ = rx.recv();
        }
    }

    /// Handles of the currently live sessions, ascending. Test helper.
    pub fn sessions(&self) -> Vec<NativeHandle> {
        let mut handles: Vec<NativeHandle> = self.lock().sessions.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// The currently configured native log verbosity.
    pub fn log_level(&self) -> LogLevel {
        self.lock().log_level
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("sim state lock poisoned")
    }

    fn enqueue(&self, job: Job) -> i32 {
        let queue = self.queue.lock().expect("sim queue lock poisoned");
        match queue.as_ref() {
            Some(tx) if tx.send(job).is_ok() => codes::ZOK,
            _ => codes::ZCLOSING,
        }
    }

    fn fire(&self, firings: Vec<Firing>) {
        for (watcher, zh, event_type, state, node_path, ctx) in firings {
            self.enqueue(Box::new(move || {
                watcher(zh, event_type, state, &node_path, ctx)
            }));
        }
    }
}

impl Default for SimServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimServer {
    fn drop(&mut self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.take();
        }
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                // The last reference can be dropped from a dispatcher job;
                // joining ourselves would deadlock.
                if handle.thread().id() != thread::current().id() {
                    let _ = handle.join();
                }
            }
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn drain_owned(
    watchers: &mut Vec<(WatcherFn, Ctx, NativeHandle)>,
    handle: NativeHandle,
) -> Vec<(WatcherFn, Ctx, NativeHandle)> {
    let mut owned = Vec::new();
    watchers.retain(|&(w, ctx, zh)| {
        if zh == handle {
            owned.push((w, ctx, zh));
            false
        } else {
            true
        }
    });
    owned
}

fn build_stat(st: &SimState, node_path: &str) -> Stat {
    let rec = &st.nodes[node_path];
    let num_children = st
        .nodes
        .keys()
        .filter(|k| k.as_str() != "/" && path::parent(k) == node_path)
        .count() as i32;
    Stat {
        czxid: rec.czxid,
        mzxid: rec.mzxid,
        ctime: rec.ctime,
        mtime: rec.mtime,
        version: rec.version,
        cversion: rec.cversion,
        aversion: rec.aversion,
        ephemeral_owner: rec.ephemeral_owner as i64,
        data_length: rec.data.len() as i32,
        num_children,
        pzxid: rec.pzxid,
    }
}

/// Remove a node and collect the watch events the removal produces: deleted
/// for the node's own data watchers, child-changed for the parent's.
fn remove_node_locked(st: &mut SimState, node_path: &str) -> Vec<Firing> {
    let mut firings = Vec::new();
    let mut rec = match st.nodes.remove(node_path) {
        Some(rec) => rec,
        None => return firings,
    };
    for (w, ctx, zh) in rec.data_watchers.drain(..) {
        firings.push((
            w,
            zh,
            DELETED_EVENT,
            CONNECTED_STATE,
            node_path.to_string(),
            ctx,
        ));
    }
    let zxid = st.bump_zxid();
    let parent_path = path::parent(node_path).to_string();
    if let Some(parent) = st.nodes.get_mut(&parent_path) {
        parent.cversion += 1;
        parent.pzxid = zxid;
        for (w, ctx, zh) in parent.child_watchers.drain(..) {
            firings.push((w, zh, CHILD_EVENT, CONNECTED_STATE, parent_path.clone(), ctx));
        }
    }
    firings
}

fn check_session(st: &SimState, handle: NativeHandle) -> Result<(), i32> {
    if st.sessions.contains_key(&handle) {
        Ok(())
    } else {
        Err(codes::ZINVALIDSTATE)
    }
}

fn get_locked(st: &SimState, handle: NativeHandle, node: &str) -> Result<(Vec<u8>, Stat), i32> {
    check_session(st, handle)?;
    if !st.nodes.contains_key(node) {
        return Err(codes::ZNONODE);
    }
    Ok((st.nodes[node].data.clone(), build_stat(st, node)))
}

fn set_locked(
    st: &mut SimState,
    handle: NativeHandle,
    node: &str,
    data: &[u8],
    version: i32,
) -> Result<(Stat, Vec<Firing>), i32> {
    check_session(st, handle)?;
    {
        let rec = st.nodes.get(node).ok_or(codes::ZNONODE)?;
        if version >= 0 && version != rec.version {
            return Err(codes::ZBADVERSION);
        }
    }
    // Only a write that passes the guards consumes a transaction id.
    let zxid = st.bump_zxid();
    let rec = st.nodes.get_mut(node).ok_or(codes::ZNONODE)?;
    rec.data = data.to_vec();
    rec.version += 1;
    rec.mzxid = zxid;
    rec.mtime = now_ms();
    let firings = rec
        .data_watchers
        .drain(..)
        .map(|(w, ctx, zh)| {
            (
                w,
                zh,
                CHANGED_EVENT,
                CONNECTED_STATE,
                node.to_string(),
                ctx,
            )
        })
        .collect();
    Ok((build_stat(st, node), firings))
}

fn create_locked(
    st: &mut SimState,
    handle: NativeHandle,
    node: &str,
    data: &[u8],
    acl: &[Acl],
    flags: i32,
) -> Result<(String, Vec<Firing>), i32> {
    check_session(st, handle)?;
    if path::validate(node).is_err() || node == "/" {
        return Err(codes::ZBADARGUMENTS);
    }
    let parent_path = path::parent(node).to_string();
    match st.nodes.get(&parent_path) {
        None => return Err(codes::ZNONODE),
        Some(parent) if parent.ephemeral_owner != 0 => {
            return Err(codes::ZNOCHILDRENFOREPHEMERALS)
        }
        Some(_) => {}
    }

    let sequential = flags & SEQUENCE_FLAG != 0;
    let ephemeral = flags & EPHEMERAL_FLAG != 0;
    let actual = if sequential {
        let parent = st.nodes.get_mut(&parent_path).ok_or(codes::ZNONODE)?;
        let seq = parent.next_seq;
        parent.next_seq += 1;
        format!("{}{:010}", node, seq)
    } else {
        node.to_string()
    };
    if st.nodes.contains_key(&actual) {
        return Err(codes::ZNODEEXISTS);
    }

    let zxid = st.bump_zxid();
    let owner = if ephemeral { handle } else { 0 };
    st.nodes.insert(
        actual.clone(),
        NodeRec::new(data.to_vec(), acl.to_vec(), owner, zxid, now_ms()),
    );
    if ephemeral {
        if let Some(session) = st.sessions.get_mut(&handle) {
            session.ephemerals.push(actual.clone());
        }
    }

    let mut firings = Vec::new();
    if let Some(parent) = st.nodes.get_mut(&parent_path) {
        parent.cversion += 1;
        parent.pzxid = zxid;
        for (w, ctx, zh) in parent.child_watchers.drain(..) {
            firings.push((w, zh, CHILD_EVENT, CONNECTED_STATE, parent_path.clone(), ctx));
        }
    }
    Ok((actual, firings))
}

fn delete_locked(
    st: &mut SimState,
    handle: NativeHandle,
    node: &str,
    version: i32,
) -> Result<Vec<Firing>, i32> {
    check_session(st, handle)?;
    if node == "/" {
        return Err(codes::ZBADARGUMENTS);
    }
    let rec = st.nodes.get(node).ok_or(codes::ZNONODE)?;
    if version >= 0 && version != rec.version {
        return Err(codes::ZBADVERSION);
    }
    let has_children = st
        .nodes
        .keys()
        .any(|k| k.as_str() != "/" && path::parent(k) == node);
    if has_children {
        return Err(codes::ZNOTEMPTY);
    }
    let owner = rec.ephemeral_owner;
    if owner != 0 {
        if let Some(session) = st.sessions.get_mut(&owner) {
            session.ephemerals.retain(|p| p != node);
        }
    }
    Ok(remove_node_locked(st, node))
}

impl NativeClient for SimServer {
    fn init(
        &self,
        hosts: &str,
        watcher: WatcherFn,
        _timeout_ms: i32,
        ctx: Ctx,
    ) -> Result<NativeHandle, i32> {
        if hosts.is_empty() {
            return Err(codes::ZCONNECTIONLOSS);
        }
        let handle = {
            let mut st = self.lock();
            let handle = st.next_handle;
            st.next_handle += 1;
            st.sessions.insert(
                handle,
                SessionRec {
                    watcher,
                    ctx,
                    ephemerals: Vec::new(),
                },
            );
            handle
        };
        self.enqueue(Box::new(move || {
            watcher(handle, SESSION_EVENT, CONNECTED_STATE, "", ctx)
        }));
        Ok(handle)
    }

    fn close(&self, handle: NativeHandle) -> i32 {
        let mut firings = Vec::new();
        {
            let mut st = self.lock();
            let session = match st.sessions.remove(&handle) {
                Some(session) => session,
                None => return codes::ZBADARGUMENTS,
            };
            // A deliberate close delivers nothing to the closing session's
            // own watchers; they are simply dropped.
            for node in st.nodes.values_mut() {
                drain_owned(&mut node.data_watchers, handle);
                drain_owned(&mut node.child_watchers, handle);
            }
            for node_path in session.ephemerals.iter() {
                firings.extend(remove_node_locked(&mut st, node_path));
            }
        }
        self.fire(firings);
        codes::ZOK
    }

    fn get(&self, handle: NativeHandle, node: &str) -> Result<(Vec<u8>, Stat), i32> {
        get_locked(&self.lock(), handle, node)
    }

    fn set(
        &self,
        handle: NativeHandle,
        node: &str,
        data: &[u8],
        version: i32,
    ) -> Result<Stat, i32> {
        let (stat, firings) = set_locked(&mut self.lock(), handle, node, data, version)?;
        self.fire(firings);
        Ok(stat)
    }

    fn exists(&self, handle: NativeHandle, node: &str) -> Result<Stat, i32> {
        let st = self.lock();
        check_session(&st, handle)?;
        if st.nodes.contains_key(node) {
            Ok(build_stat(&st, node))
        } else {
            Err(codes::ZNONODE)
        }
    }

    fn get_children(&self, handle: NativeHandle, node: &str) -> Result<Vec<String>, i32> {
        let st = self.lock();
        check_session(&st, handle)?;
        if !st.nodes.contains_key(node) {
            return Err(codes::ZNONODE);
        }
        Ok(st
            .nodes
            .keys()
            .filter(|k| k.as_str() != "/" && path::parent(k) == node)
            .map(|k| path::basename(k).to_string())
            .collect())
    }

    fn create(
        &self,
        handle: NativeHandle,
        node: &str,
        data: &[u8],
        acl: &[Acl],
        flags: i32,
    ) -> Result<String, i32> {
        let (actual, firings) = create_locked(&mut self.lock(), handle, node, data, acl, flags)?;
        self.fire(firings);
        Ok(actual)
    }

    fn delete(&self, handle: NativeHandle, node: &str, version: i32) -> i32 {
        match delete_locked(&mut self.lock(), handle, node, version) {
            Ok(firings) => {
                self.fire(firings);
                codes::ZOK
            }
            Err(rc) => rc,
        }
    }

    fn get_acl(&self, handle: NativeHandle, node: &str) -> Result<(Vec<Acl>, Stat), i32> {
        let st = self.lock();
        check_session(&st, handle)?;
        if !st.nodes.contains_key(node) {
            return Err(codes::ZNONODE);
        }
        Ok((st.nodes[node].acl.clone(), build_stat(&st, node)))
    }

    fn set_acl(&self, handle: NativeHandle, node: &str, version: i32, acl: &[Acl]) -> i32 {
        let mut st = self.lock();
        if let Err(rc) = check_session(&st, handle) {
            return rc;
        }
        let rec = match st.nodes.get_mut(node) {
            Some(rec) => rec,
            None => return codes::ZNONODE,
        };
        if version >= 0 && version != rec.aversion {
            return codes::ZBADVERSION;
        }
        rec.acl = acl.to_vec();
        rec.aversion += 1;
        codes::ZOK
    }

    fn aget(
        &self,
        handle: NativeHandle,
        node: &str,
        completion: DataCompletionFn,
        ctx: Ctx,
    ) -> i32 {
        let state = Arc::clone(&self.state);
        let node = node.to_string();
        self.enqueue(Box::new(move || {
            let result = {
                let st = state.lock().expect("sim state lock poisoned");
                get_locked(&st, handle, &node)
            };
            match result {
                Ok((data, stat)) => completion(codes::ZOK, Some(&data), Some(&stat), ctx),
                Err(rc) => completion(rc, None, None, ctx),
            }
        }))
    }

    fn aset(
        &self,
        handle: NativeHandle,
        node: &str,
        data: &[u8],
        version: i32,
        completion: StatCompletionFn,
        ctx: Ctx,
    ) -> i32 {
        let state = Arc::clone(&self.state);
        let node = node.to_string();
        let data = data.to_vec();
        self.enqueue(Box::new(move || {
            let result = {
                let mut st = state.lock().expect("sim state lock poisoned");
                set_locked(&mut st, handle, &node, &data, version)
            };
            match result {
                Ok((stat, firings)) => {
                    completion(codes::ZOK, Some(&stat), ctx);
                    // Already on the dispatcher thread: deliver in place to
                    // keep FIFO order with the completion.
                    for (w, zh, event_type, st_code, node_path, wctx) in firings {
                        w(zh, event_type, st_code, &node_path, wctx);
                    }
                }
                Err(rc) => completion(rc, None, ctx),
            }
        }))
    }

    fn awget(
        &self,
        handle: NativeHandle,
        node: &str,
        watcher: WatcherFn,
        watcher_ctx: Ctx,
        completion: DataCompletionFn,
        completion_ctx: Ctx,
    ) -> i32 {
        let state = Arc::clone(&self.state);
        let node = node.to_string();
        self.enqueue(Box::new(move || {
            let result = {
                let mut st = state.lock().expect("sim state lock poisoned");
                match check_session(&st, handle) {
                    Err(rc) => Err(rc),
                    Ok(()) => match st.nodes.get_mut(&node) {
                        None => Err(codes::ZNONODE),
                        Some(rec) => {
                            rec.data_watchers.push((watcher, watcher_ctx, handle));
                            let data = rec.data.clone();
                            let stat = build_stat(&st, &node);
                            Ok((data, stat))
                        }
                    },
                }
            };
            match result {
                Ok((data, stat)) => completion(codes::ZOK, Some(&data), Some(&stat), completion_ctx),
                Err(rc) => completion(rc, None, None, completion_ctx),
            }
        }))
    }

    fn awget_children(
        &self,
        handle: NativeHandle,
        node: &str,
        watcher: WatcherFn,
        watcher_ctx: Ctx,
        completion: StringsCompletionFn,
        completion_ctx: Ctx,
    ) -> i32 {
        let state = Arc::clone(&self.state);
        let node = node.to_string();
        self.enqueue(Box::new(move || {
            let result = {
                let mut st = state.lock().expect("sim state lock poisoned");
                match check_session(&st, handle) {
                    Err(rc) => Err(rc),
                    Ok(()) => {
                        if !st.nodes.contains_key(&node) {
                            Err(codes::ZNONODE)
                        } else {
                            let children: Vec<String> = st
                                .nodes
                                .keys()
                                .filter(|k| k.as_str() != "/" && path::parent(k) == node)
                                .map(|k| path::basename(k).to_string())
                                .collect();
                            if let Some(rec) = st.nodes.get_mut(&node) {
                                rec.child_watchers.push((watcher, watcher_ctx, handle));
                            }
                            Ok(children)
                        }
                    }
                }
            };
            match result {
                Ok(children) => completion(codes::ZOK, &children, completion_ctx),
                Err(rc) => completion(rc, &[], completion_ctx),
            }
        }))
    }

    fn set_log_level(&self, level: LogLevel) {
        self.lock().log_level = level;
    }
}
