//! Watch descriptors and the re-arming state machine.
//!
//! Native watches are one-shot: after an event fires, the subscription is
//! gone until someone arms it again. The state machine here decides, for
//! every event delivered through the context bridge, whether to re-arm and
//! which side (data, children) to re-arm.
//!
//! A descriptor with aspect [`Aspect::Both`] owns two independent native
//! subscriptions. They fire and re-arm independently, possibly out of order;
//! nothing here assumes joint delivery. Re-arming is per fired side only;
//! the other side's subscription is still armed natively and re-arming it
//! again would duplicate it.

use crate::error::check;
use crate::event::{classify, EventKind, SessionState, WatchedEvent};
use crate::native::{Ctx, NativeClient, NativeHandle};
use crate::registry::Registry;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

/// Which side(s) of a node a watch observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aspect {
    Data,
    Children,
    Both,
}

impl Aspect {
    pub fn includes_data(&self) -> bool {
        matches!(self, Aspect::Data | Aspect::Both)
    }

    pub fn includes_children(&self) -> bool {
        matches!(self, Aspect::Children | Aspect::Both)
    }
}

/// User-facing callback invoked with each classified event.
pub type WatchCallback = Box<dyn Fn(WatchedEvent) + Send + Sync>;

/// One live watch registration.
///
/// Owned by the registry; the native layer holds only the context token. The
/// descriptor carries the native client so the trampoline can re-arm without
/// any access to the issuing `Client`.
pub struct WatchDescriptor {
    pub(crate) path: String,
    pub(crate) aspect: Aspect,
    pub(crate) renew: bool,
    pub(crate) callback: WatchCallback,
    pub(crate) native: Arc<dyn NativeClient>,
    cancelled: AtomicBool,
    /// Number of native subscriptions currently believed armed. When a side
    /// fails to arm (or re-arm) it is lost; at zero the watch can never fire
    /// again and its registry entry is reclaimed.
    armed: AtomicI32,
}

impl WatchDescriptor {
    pub fn new(
        path: impl Into<String>,
        aspect: Aspect,
        renew: bool,
        callback: WatchCallback,
        native: Arc<dyn NativeClient>,
    ) -> Self {
        Self {
            path: path.into(),
            aspect,
            renew,
            callback,
            native,
            cancelled: AtomicBool::new(false),
            armed: AtomicI32::new(0),
        }
    }

    /// Record one successfully enqueued native subscription.
    pub(crate) fn note_armed(&self) {
        self.armed.fetch_add(1, Ordering::SeqCst);
    }

    /// Record the loss of one armed side; true when none remain.
    pub(crate) fn side_lost(&self) -> bool {
        self.armed.fetch_sub(1, Ordering::SeqCst) <= 1
    }

    /// Stop delivery and re-arming. Late events for this descriptor are
    /// dropped by the trampoline.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Identifier for a live watch, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherId(pub(crate) Ctx);

/// What the state machine decided for one delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub rearm_data: bool,
    pub rearm_children: bool,
    /// Whether the registry entry's lifetime ends with this event.
    pub release: bool,
}

const KEEP: Outcome = Outcome {
    rearm_data: false,
    rearm_children: false,
    release: false,
};

const RELEASE: Outcome = Outcome {
    rearm_data: false,
    rearm_children: false,
    release: true,
};

/// Decide re-arming and lifetime for one event against a watch's declared
/// aspect and renewal policy.
pub(crate) fn plan(aspect: Aspect, renew: bool, kind: &EventKind) -> Outcome {
    match kind {
        // Session events are global, not path-scoped: node watches are never
        // re-armed on them. Expiry kills the session and with it the watch.
        EventKind::Session(SessionState::Expired) => RELEASE,
        EventKind::Session(_) => KEEP,

        // Deletion is terminal for the descriptor.
        EventKind::Deleted => RELEASE,

        // An event type we cannot attribute to either side: deliver it but
        // make no re-arm guess. Any still-armed subscription stays live.
        EventKind::Unknown(_) => KEEP,

        // A side that could not be armed, or was dropped natively. Nothing to
        // re-arm; entry lifetime is decided by the armed-side count.
        EventKind::NotWatching => KEEP,

        // Fire-once: the descriptor transitions to fired and is released; a
        // sibling subscription that fires later resolves to an unknown
        // handle and is dropped.
        _ if !renew => RELEASE,

        EventKind::Created | EventKind::DataChanged => Outcome {
            rearm_data: aspect.includes_data(),
            rearm_children: false,
            release: false,
        },
        EventKind::ChildrenChanged => Outcome {
            rearm_data: false,
            rearm_children: aspect.includes_children(),
            release: false,
        },
    }
}

/// Node watcher trampoline registered with `awget`/`awget_children`.
///
/// Performs a registry lookup and forwards a plain event value to the
/// resolved descriptor; it holds no closure state itself. Dispatches the user
/// callback first, then re-arms per the plan, reusing the same context token.
pub(crate) fn node_watcher(
    handle: NativeHandle,
    event_type: i32,
    state: i32,
    path: &str,
    ctx: Ctx,
) {
    let desc = match Registry::global().watch(ctx) {
        Ok(desc) => desc,
        Err(err) => {
            tracing::warn!(ctx, error = %err, event_type, path, "watch event dropped");
            return;
        }
    };
    if desc.is_cancelled() {
        if Registry::global().release(ctx).is_ok() {
            tracing::debug!(ctx, path = %desc.path, "cancelled watch reclaimed");
        }
        return;
    }

    let event = classify(event_type, state, path);
    let kind = event.kind;
    let outcome = plan(desc.aspect, desc.renew, &kind);
    tracing::debug!(ctx, path = %desc.path, ?kind, ?outcome, "watch event");

    (desc.callback)(event);

    if matches!(kind, EventKind::NotWatching) {
        if desc.side_lost() {
            let _ = Registry::global().release(ctx);
        }
        return;
    }

    if outcome.rearm_data {
        let rc = desc
            .native
            .awget(handle, &desc.path, node_watcher, ctx, arm_data_note, ctx);
        if let Err(err) = check(rc) {
            tracing::warn!(path = %desc.path, error = %err, "data watch re-arm failed");
            if desc.side_lost() {
                let _ = Registry::global().release(ctx);
            }
        }
    }
    if outcome.rearm_children {
        let rc = desc.native.awget_children(
            handle,
            &desc.path,
            node_watcher,
            ctx,
            arm_children_note,
            ctx,
        );
        if let Err(err) = check(rc) {
            tracing::warn!(path = %desc.path, error = %err, "child watch re-arm failed");
            if desc.side_lost() {
                let _ = Registry::global().release(ctx);
            }
        }
    }
    if outcome.release {
        let _ = Registry::global().release(ctx);
    }
}

/// Completion for the read half of a data watch arm. The read result is
/// discarded; only the arm outcome matters.
pub(crate) fn arm_data_note(
    rc: i32,
    _data: Option<&[u8]>,
    _stat: Option<&crate::types::Stat>,
    ctx: Ctx,
) {
    note_arm_outcome(rc, ctx);
}

/// Completion for the list half of a child watch arm.
pub(crate) fn arm_children_note(rc: i32, _children: &[String], ctx: Ctx) {
    note_arm_outcome(rc, ctx);
}

/// A failed arm means that side will never fire. The caller learns through
/// the descriptor callback as [`EventKind::NotWatching`], and the entry is
/// reclaimed once no armed side remains.
fn note_arm_outcome(rc: i32, ctx: Ctx) {
    let err = match check(rc) {
        Ok(()) => return,
        Err(err) => err,
    };
    let desc = match Registry::global().watch(ctx) {
        Ok(desc) => desc,
        // The entry already ended (cancelled or terminal); nothing to notify.
        Err(_) => return,
    };
    tracing::warn!(ctx, path = %desc.path, error = %err, "watch arm failed");
    if !desc.is_cancelled() {
        (desc.callback)(WatchedEvent {
            kind: EventKind::NotWatching,
            path: desc.path.clone(),
        });
    }
    if desc.side_lost() {
        let _ = Registry::global().release(ctx);
    }
}
