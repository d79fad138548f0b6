//! Error types for the zkbridge client.
//!
//! The native library reports failures as raw `i32` status codes. This module
//! owns the closed failure taxonomy the rest of the crate works with and the
//! total translation from the native status space into it: every possible
//! code value resolves to a defined condition, never to undefined behavior.

use thiserror::Error;

/// All possible errors from the zkbridge client.
///
/// Most variants mirror a native status code; [`Error::PayloadOverflow`] is a
/// client-local condition raised when a node payload exceeds the fixed read
/// buffer, and [`Error::UnknownHandle`] / [`Error::Unrecognized`] cover the
/// context bridge's own failure modes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("connection to the server has been lost")]
    ConnectionLoss,

    #[error("error while marshalling or unmarshalling data")]
    MarshallingError,

    #[error("operation timeout")]
    OperationTimeout,

    #[error("invalid arguments")]
    BadArguments,

    #[error("invalid handle state")]
    InvalidState,

    #[error("node does not exist")]
    NoNode,

    #[error("not authenticated")]
    NoAuth,

    #[error("version conflict")]
    BadVersion,

    #[error("ephemeral nodes may not have children")]
    NoChildrenForEphemerals,

    #[error("the node already exists")]
    NodeExists,

    #[error("the node has children")]
    NotEmpty,

    #[error("the session has been expired by the server")]
    SessionExpired,

    #[error("invalid callback specified")]
    InvalidCallback,

    #[error("invalid ACL specified")]
    InvalidAcl,

    #[error("client authentication failed")]
    AuthFailed,

    #[error("the client is closing")]
    Closing,

    #[error("no server responses to process")]
    Nothing,

    #[error("session moved to another server")]
    SessionMoved,

    #[error("payload exceeds the maximum node buffer")]
    PayloadOverflow,

    #[error("unknown context handle: {0}")]
    UnknownHandle(u64),

    #[error("unrecognized native status code: {0}")]
    Unrecognized(i32),
}

impl Error {
    /// Translate a native status code into a failure condition.
    ///
    /// The mapping is total: codes outside the documented enumeration,
    /// including the C header's range markers (`-1`, `-100`), resolve to
    /// [`Error::Unrecognized`]. Code `0` is success and should be gated with
    /// [`check`] before translation ever happens; translating it anyway
    /// yields `Unrecognized(0)`.
    pub fn from_code(code: i32) -> Error {
        use crate::native::codes;
        match code {
            codes::ZCONNECTIONLOSS => Error::ConnectionLoss,
            codes::ZMARSHALLINGERROR => Error::MarshallingError,
            codes::ZOPERATIONTIMEOUT => Error::OperationTimeout,
            codes::ZBADARGUMENTS => Error::BadArguments,
            codes::ZINVALIDSTATE => Error::InvalidState,
            codes::ZNONODE => Error::NoNode,
            codes::ZNOAUTH => Error::NoAuth,
            codes::ZBADVERSION => Error::BadVersion,
            codes::ZNOCHILDRENFOREPHEMERALS => Error::NoChildrenForEphemerals,
            codes::ZNODEEXISTS => Error::NodeExists,
            codes::ZNOTEMPTY => Error::NotEmpty,
            codes::ZSESSIONEXPIRED => Error::SessionExpired,
            codes::ZINVALIDCALLBACK => Error::InvalidCallback,
            codes::ZINVALIDACL => Error::InvalidAcl,
            codes::ZAUTHFAILED => Error::AuthFailed,
            codes::ZCLOSING => Error::Closing,
            codes::ZNOTHING => Error::Nothing,
            codes::ZSESSIONMOVED => Error::SessionMoved,
            codes::ZOVERFLOW => Error::PayloadOverflow,
            other => Error::Unrecognized(other),
        }
    }

    /// The native status code for this condition, if one exists.
    ///
    /// Client-local conditions with no native counterpart return `None`.
    pub fn code(&self) -> Option<i32> {
        use crate::native::codes;
        match self {
            Error::ConnectionLoss => Some(codes::ZCONNECTIONLOSS),
            Error::MarshallingError => Some(codes::ZMARSHALLINGERROR),
            Error::OperationTimeout => Some(codes::ZOPERATIONTIMEOUT),
            Error::BadArguments => Some(codes::ZBADARGUMENTS),
            Error::InvalidState => Some(codes::ZINVALIDSTATE),
            Error::NoNode => Some(codes::ZNONODE),
            Error::NoAuth => Some(codes::ZNOAUTH),
            Error::BadVersion => Some(codes::ZBADVERSION),
            Error::NoChildrenForEphemerals => Some(codes::ZNOCHILDRENFOREPHEMERALS),
            Error::NodeExists => Some(codes::ZNODEEXISTS),
            Error::NotEmpty => Some(codes::ZNOTEMPTY),
            Error::SessionExpired => Some(codes::ZSESSIONEXPIRED),
            Error::InvalidCallback => Some(codes::ZINVALIDCALLBACK),
            Error::InvalidAcl => Some(codes::ZINVALIDACL),
            Error::AuthFailed => Some(codes::ZAUTHFAILED),
            Error::Closing => Some(codes::ZCLOSING),
            Error::Nothing => Some(codes::ZNOTHING),
            Error::SessionMoved => Some(codes::ZSESSIONMOVED),
            Error::PayloadOverflow => Some(codes::ZOVERFLOW),
            Error::UnknownHandle(_) => None,
            Error::Unrecognized(code) => Some(*code),
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Gate a native return code: `0` is success, anything else translates.
pub fn check(rc: i32) -> Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::from_code(rc))
    }
}
