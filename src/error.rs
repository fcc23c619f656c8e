use crate::types::RemoteNodeMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable outcome of a single join RPC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JoinStatus {
    /// The contacted node cannot apply the join itself, usually because it
    /// is not the leader.
    ResourceExhausted,
    Unavailable,
    NotFound,
    InvalidArgument,
    DeadlineExceeded,
    Cancelled,
    Internal,
}

impl fmt::Display for JoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinStatus::ResourceExhausted => "resource exhausted",
            JoinStatus::Unavailable => "unavailable",
            JoinStatus::NotFound => "not found",
            JoinStatus::InvalidArgument => "invalid argument",
            JoinStatus::DeadlineExceeded => "deadline exceeded",
            JoinStatus::Cancelled => "cancelled",
            JoinStatus::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Failure of one join RPC. `leader` is set when the contacted node knows
/// who the current leader is.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct PeerJoinError {
    #[serde(rename = "code")]
    pub status: JoinStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,
}

impl PeerJoinError {
    pub fn new(status: JoinStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            leader: None,
        }
    }

    pub fn with_leader(mut self, leader: impl Into<String>) -> Self {
        self.leader = Some(leader.into());
        self
    }

    pub fn not_leader(leader: impl Into<String>) -> Self {
        Self::new(JoinStatus::ResourceExhausted, "node is not the leader").with_leader(leader)
    }

    /// Leader to redirect to, only for resource-exhausted failures with a
    /// non-empty hint.
    pub fn redirect(&self) -> Option<&str> {
        match (self.status, self.leader.as_deref()) {
            (JoinStatus::ResourceExhausted, Some(leader)) if !leader.is_empty() => Some(leader),
            _ => None,
        }
    }
}

/// One recorded failure inside a join pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinFailure {
    Peer {
        name: String,
        address: String,
        error: PeerJoinError,
    },
    Leader {
        address: String,
        error: PeerJoinError,
    },
}

impl fmt::Display for JoinFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinFailure::Peer {
                name,
                address,
                error,
            } => write!(f, "{}({}): {}", name, address, error),
            JoinFailure::Leader { address, error } => write!(f, "leader({}): {}", address, error),
        }
    }
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("join cancelled")]
    Cancelled,

    #[error("could not join a cluster from {candidates:?}: no candidates besides the local node")]
    NoCandidates { candidates: RemoteNodeMap },

    #[error("could not join a cluster from {candidates:?}: {}", join_failures(.failures))]
    Exhausted {
        candidates: RemoteNodeMap,
        failures: Vec<JoinFailure>,
    },
}

impl JoinError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JoinError::Cancelled)
    }

    pub fn failures(&self) -> &[JoinFailure] {
        match self {
            JoinError::Exhausted { failures, .. } => failures,
            _ => &[],
        }
    }
}

fn join_failures(failures: &[JoinFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Join(#[from] JoinError),

    #[error("consensus bootstrap failed: {0}")]
    Consensus(#[source] anyhow::Error),
}

impl BootstrapError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BootstrapError::Join(e) if e.is_cancelled())
    }
}
