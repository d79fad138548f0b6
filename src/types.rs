//! Plain value types exchanged with the coordination service.

use serde::{Deserialize, Serialize};

/// Version and timestamp metadata for a node.
///
/// An immutable snapshot returned by the service; the client never mutates
/// one. Field meanings follow the native library's stat structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
    /// Transaction id of the create.
    pub czxid: i64,
    /// Transaction id of the last modification.
    pub mzxid: i64,
    /// Creation time, milliseconds since the epoch.
    pub ctime: i64,
    /// Last-modification time, milliseconds since the epoch.
    pub mtime: i64,
    /// Data version, bumped on every write.
    pub version: i32,
    /// Child-list version, bumped on child create/delete.
    pub cversion: i32,
    /// ACL version.
    pub aversion: i32,
    /// Owning session id for ephemeral nodes, zero otherwise.
    pub ephemeral_owner: i64,
    /// Length of the node payload in bytes.
    pub data_length: i32,
    /// Number of children.
    pub num_children: i32,
    /// Transaction id of the last child-list change.
    pub pzxid: i64,
}

/// Lifetime and naming behavior of a created node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    /// Survives the creating session.
    Persistent,
    /// Removed automatically when the owning session ends.
    Ephemeral,
    /// Persistent, with a server-assigned monotonically increasing suffix.
    Sequential,
    /// Ephemeral and sequential.
    EphemeralSequential,
}

impl NodeType {
    /// The native create flags for this node type.
    pub fn flags(&self) -> i32 {
        match self {
            NodeType::Persistent => 0,
            NodeType::Ephemeral => crate::native::EPHEMERAL_FLAG,
            NodeType::Sequential => crate::native::SEQUENCE_FLAG,
            NodeType::EphemeralSequential => {
                crate::native::EPHEMERAL_FLAG | crate::native::SEQUENCE_FLAG
            }
        }
    }

    /// Whether nodes of this type are removed when the session ends.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, NodeType::Ephemeral | NodeType::EphemeralSequential)
    }

    /// Whether the server assigns a numeric suffix to the node name.
    pub fn is_sequential(&self) -> bool {
        matches!(self, NodeType::Sequential | NodeType::EphemeralSequential)
    }
}

/// Permission bits for an ACL entry.
pub mod perms {
    pub const READ: u32 = 1 << 0;
    pub const WRITE: u32 = 1 << 1;
    pub const CREATE: u32 = 1 << 2;
    pub const DELETE: u32 = 1 << 3;
    pub const ADMIN: u32 = 1 << 4;
    pub const ALL: u32 = READ | WRITE | CREATE | DELETE | ADMIN;
}

/// A single access-control entry on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acl {
    /// Permission bits, see [`perms`].
    pub perms: u32,
    /// Authentication scheme, e.g. `world` or `auth`.
    pub scheme: String,
    /// Scheme-specific identity, e.g. `anyone`.
    pub id: String,
}

impl Acl {
    pub fn new(perms: u32, scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            perms,
            scheme: scheme.into(),
            id: id.into(),
        }
    }
}

/// The stock ACL shapes the facade offers at create time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AclTemplate {
    /// World-readable and writable.
    Open,
    /// World-readable only.
    ReadOnly,
    /// Full access for the creator's identity only.
    CreatorAll,
}

impl AclTemplate {
    /// Expand the template into concrete ACL entries.
    pub fn entries(&self) -> Vec<Acl> {
        match self {
            AclTemplate::Open => vec![Acl::new(perms::ALL, "world", "anyone")],
            AclTemplate::ReadOnly => vec![Acl::new(perms::READ, "world", "anyone")],
            AclTemplate::CreatorAll => vec![Acl::new(perms::ALL, "auth", "")],
        }
    }
}

/// Outcome of a leader-election round.
///
/// Candidates are identified by the numeric suffix of their ephemeral
/// sequential node; the lowest live suffix is the leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    /// This client's candidate number.
    pub me: u64,
    /// The winning candidate number.
    pub leader: u64,
    /// All live candidate numbers, ascending.
    pub candidates: Vec<u64>,
}

impl Election {
    /// Whether this client won the round.
    pub fn is_leader(&self) -> bool {
        self.me == self.leader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_flags() {
        assert_eq!(NodeType::Persistent.flags(), 0);
        assert_eq!(NodeType::Ephemeral.flags(), 1);
        assert_eq!(NodeType::Sequential.flags(), 2);
        assert_eq!(NodeType::EphemeralSequential.flags(), 3);
        assert!(NodeType::EphemeralSequential.is_ephemeral());
        assert!(NodeType::EphemeralSequential.is_sequential());
        assert!(!NodeType::Persistent.is_ephemeral());
    }

    #[test]
    fn acl_templates() {
        let open = AclTemplate::Open.entries();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].perms, perms::ALL);
        assert_eq!(open[0].scheme, "world");

        let ro = AclTemplate::ReadOnly.entries();
        assert_eq!(ro[0].perms, perms::READ);

        let creator = AclTemplate::CreatorAll.entries();
        assert_eq!(creator[0].scheme, "auth");
    }

    #[test]
    fn election_leader() {
        let e = Election {
            me: 3,
            leader: 1,
            candidates: vec![1, 3, 7],
        };
        assert!(!e.is_leader());

        let e = Election {
            me: 1,
            leader: 1,
            candidates: vec![1, 3],
        };
        assert!(e.is_leader());
    }
}
