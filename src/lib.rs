//! # zkbridge
//!
//! A typed client facade over a coordination service whose native access
//! layer is a C-style API: opaque handles, caller-supplied opaque context
//! pointers, and results/events delivered later through callbacks carrying
//! that pointer back.
//!
//! ## Design Principles
//!
//! - **Checked identity**: the native layer only ever holds minted 64-bit
//!   tokens; the [`registry::Registry`] is the single place where a token is
//!   reunited with typed state, by checked lookup, never by pointer cast
//! - **Bounded lifetimes**: every registry entry lives exactly as long as its
//!   operation: one-shot completions are consumed at resolution, watches end
//!   on cancellation or a terminal event, sessions end at disconnect
//! - **Stateless trampolines**: the callbacks handed to the native layer are
//!   plain `fn` pointers that look up and forward; all state travels through
//!   the token
//! - **Total translation**: every native status code and event integer maps
//!   to a closed, typed taxonomy
//!
//! ## Core Concepts
//!
//! ### Nodes
//!
//! The service namespace is a tree of nodes, each holding a byte payload and
//! a [`Stat`] (version counters and timestamps). Nodes may be ephemeral
//! (removed when the owning session ends) and/or sequential (the server
//! appends a monotonically increasing suffix to the name).
//!
//! ### Watches
//!
//! A native watch is a one-shot subscription to the next change on a node's
//! data or child set. [`Client::watch`] layers a renewal policy on top: with
//! `renew` the fired side is re-armed after every non-terminal event, so the
//! caller sees a continuous event stream until the node is deleted or the
//! watch is cancelled with [`Client::unwatch`].
//!
//! ### Sessions
//!
//! A [`Client`] holds at most one native connection. Session-level events
//! (connected, disconnected, expired) arrive through the state callback given
//! to [`Client::connect`], asynchronously, on the native I/O thread.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use zkbridge::{AclTemplate, Client, NodeType, SimServer};
//!
//! let sim = Arc::new(SimServer::new());
//! let client = Client::with_defaults(sim);
//! client.connect("localhost:2181", |state| {
//!     println!("session state: {state:?}");
//! }).unwrap();
//!
//! client.create("/app", b"config", NodeType::Persistent, AclTemplate::Open).unwrap();
//! let stat = client.save("/app", b"v2", None).unwrap();
//! assert_eq!(stat.version, 1);
//!
//! let (data, _stat) = client.load("/app").unwrap();
//! assert_eq!(data, b"v2");
//! ```
//!
//! ## The native boundary
//!
//! The crate never links the native library; the [`native::NativeClient`]
//! trait mirrors its call shapes so a real binding can be dropped in.
//! [`sim::SimServer`] is an in-process implementation with a dispatcher
//! thread standing in for the native I/O thread; the whole test suite runs
//! against it.

pub mod client;
pub mod error;
pub mod event;
pub mod native;
pub mod path;
pub mod registry;
pub mod sim;
pub mod types;
pub mod watch;

// Re-export main types at crate root
pub use client::{Client, SessionShared, DEFAULT_TIMEOUT_MS, MAX_PAYLOAD};
pub use error::{Error, Result};
pub use event::{ChangeKind, EventKind, SessionState, WatchedEvent};
pub use native::{Ctx, LogLevel, NativeClient, NativeHandle};
pub use registry::{Payload, Registry};
pub use sim::SimServer;
pub use types::{Acl, AclTemplate, Election, NodeType, Stat};
pub use watch::{Aspect, WatchDescriptor, WatcherId};
