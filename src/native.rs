//! The native client library boundary.
//!
//! The coordination service's native access layer is a C-style API: handles
//! are opaque, asynchronous calls accept an address-sized context token, and
//! results and watch events arrive later through callbacks invoked with that
//! same token, usually on the library's own I/O thread.
//!
//! [`NativeClient`] mirrors those call shapes one-for-one so a real binding
//! or an in-process simulation ([`crate::sim::SimServer`]) can sit behind it.
//! Callbacks are plain `fn` pointers carrying no closure state; all typed
//! state travels through the context token and is reunited with it by the
//! [`crate::registry::Registry`].

use crate::types::{Acl, Stat};
use serde::{Deserialize, Serialize};

/// Opaque native connection handle, as handed back by [`NativeClient::init`].
pub type NativeHandle = u64;

/// Opaque context token passed through the native layer and back.
pub type Ctx = u64;

/// Watcher trampoline signature: `(handle, event_type, state, path, ctx)`.
pub type WatcherFn = fn(handle: NativeHandle, event_type: i32, state: i32, path: &str, ctx: Ctx);

/// Completion for an asynchronous data read.
pub type DataCompletionFn = fn(rc: i32, data: Option<&[u8]>, stat: Option<&Stat>, ctx: Ctx);

/// Completion for an asynchronous status-only write.
pub type StatCompletionFn = fn(rc: i32, stat: Option<&Stat>, ctx: Ctx);

/// Completion for an asynchronous child-list read.
pub type StringsCompletionFn = fn(rc: i32, children: &[String], ctx: Ctx);

// Event types delivered to watcher trampolines.
pub const CREATED_EVENT: i32 = 1;
pub const DELETED_EVENT: i32 = 2;
pub const CHANGED_EVENT: i32 = 3;
pub const CHILD_EVENT: i32 = 4;
pub const SESSION_EVENT: i32 = -1;
pub const NOT_WATCHING_EVENT: i32 = -2;

// Session states carried alongside `SESSION_EVENT`.
pub const CONNECTING_STATE: i32 = 1;
pub const ASSOCIATING_STATE: i32 = 2;
pub const CONNECTED_STATE: i32 = 3;
pub const EXPIRED_SESSION_STATE: i32 = -112;
pub const AUTH_FAILED_STATE: i32 = -113;

// Node create flags.
pub const EPHEMERAL_FLAG: i32 = 1;
pub const SEQUENCE_FLAG: i32 = 2;

/// Native status codes, as the C header defines them.
pub mod codes {
    pub const ZOK: i32 = 0;
    pub const ZCONNECTIONLOSS: i32 = -4;
    pub const ZMARSHALLINGERROR: i32 = -5;
    pub const ZOPERATIONTIMEOUT: i32 = -7;
    pub const ZBADARGUMENTS: i32 = -8;
    pub const ZINVALIDSTATE: i32 = -9;
    pub const ZNONODE: i32 = -101;
    pub const ZNOAUTH: i32 = -102;
    pub const ZBADVERSION: i32 = -103;
    pub const ZNOCHILDRENFOREPHEMERALS: i32 = -108;
    pub const ZNODEEXISTS: i32 = -110;
    pub const ZNOTEMPTY: i32 = -111;
    pub const ZSESSIONEXPIRED: i32 = -112;
    pub const ZINVALIDCALLBACK: i32 = -113;
    pub const ZINVALIDACL: i32 = -114;
    pub const ZAUTHFAILED: i32 = -115;
    pub const ZCLOSING: i32 = -116;
    pub const ZNOTHING: i32 = -117;
    pub const ZSESSIONMOVED: i32 = -118;
    /// Client-local: payload exceeds the fixed node buffer.
    pub const ZOVERFLOW: i32 = 1;
}

/// Native log verbosity, passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogLevel {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

/// The primitives the facade needs from the native library.
///
/// Synchronous calls return raw native status codes (`Err(i32)`); translation
/// into [`crate::Error`] is the facade's job. Asynchronous calls return the
/// enqueue-time status code and deliver everything else through the supplied
/// completion, exactly once, on the native I/O thread.
///
/// The context tokens given to `init`, `aget`, `aset`, `awget` and
/// `awget_children` are opaque to the implementation: it must hand them back
/// unchanged to the matching callback and must never dereference them.
pub trait NativeClient: Send + Sync {
    /// Establish a connection and register the single default watcher that
    /// receives session events and unclassified node events.
    fn init(
        &self,
        hosts: &str,
        watcher: WatcherFn,
        timeout_ms: i32,
        ctx: Ctx,
    ) -> Result<NativeHandle, i32>;

    /// Close a connection. The handle and every watch armed on it are dead
    /// afterwards.
    fn close(&self, handle: NativeHandle) -> i32;

    /// Read a node's payload and stat.
    fn get(&self, handle: NativeHandle, path: &str) -> Result<(Vec<u8>, Stat), i32>;

    /// Write a node's payload. `version >= 0` demands that exact data
    /// version; `-1` skips the check.
    fn set(&self, handle: NativeHandle, path: &str, data: &[u8], version: i32)
        -> Result<Stat, i32>;

    /// Stat a node without reading its payload.
    fn exists(&self, handle: NativeHandle, path: &str) -> Result<Stat, i32>;

    /// List a node's children, in service order.
    fn get_children(&self, handle: NativeHandle, path: &str) -> Result<Vec<String>, i32>;

    /// Create a node; returns the server-assigned path (sequential types get
    /// a numeric suffix appended).
    fn create(
        &self,
        handle: NativeHandle,
        path: &str,
        data: &[u8],
        acl: &[Acl],
        flags: i32,
    ) -> Result<String, i32>;

    /// Delete a node, optionally guarded by an expected data version.
    fn delete(&self, handle: NativeHandle, path: &str, version: i32) -> i32;

    /// Read a node's ACL list and stat.
    fn get_acl(&self, handle: NativeHandle, path: &str) -> Result<(Vec<Acl>, Stat), i32>;

    /// Replace a node's ACL list, optionally guarded by an expected ACL
    /// version.
    fn set_acl(&self, handle: NativeHandle, path: &str, version: i32, acl: &[Acl]) -> i32;

    /// Asynchronous read; the completion fires later with the payload.
    fn aget(&self, handle: NativeHandle, path: &str, completion: DataCompletionFn, ctx: Ctx)
        -> i32;

    /// Asynchronous write; the completion fires later with the new stat.
    fn aset(
        &self,
        handle: NativeHandle,
        path: &str,
        data: &[u8],
        version: i32,
        completion: StatCompletionFn,
        ctx: Ctx,
    ) -> i32;

    /// Read a node's payload and arm a one-shot data watch on it.
    #[allow(clippy::too_many_arguments)]
    fn awget(
        &self,
        handle: NativeHandle,
        path: &str,
        watcher: WatcherFn,
        watcher_ctx: Ctx,
        completion: DataCompletionFn,
        completion_ctx: Ctx,
    ) -> i32;

    /// List a node's children and arm a one-shot child watch on it.
    #[allow(clippy::too_many_arguments)]
    fn awget_children(
        &self,
        handle: NativeHandle,
        path: &str,
        watcher: WatcherFn,
        watcher_ctx: Ctx,
        completion: StringsCompletionFn,
        completion_ctx: Ctx,
    ) -> i32;

    /// Pass-through for the native library's log verbosity.
    fn set_log_level(&self, level: LogLevel);
}
