//! Messages exchanged with an authority
//!
//! Two channels exist per client:
//! - request/reply: `Command` in, a oneshot reply out
//! - direct: `Offer` pushed into the client's mailbox during a handoff,
//!   answered with `Acknowledge`, settled with `Confirmed`

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{mpsc, oneshot};

use super::state::AuthoritySnapshot;

/// Opaque, stable identity of a client
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random identity for clients that do not bring their own
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// What to do when the key is held by someone else
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Answer `denied`
    NonBlocking,
    /// Join the key's waiter queue and answer `queued`
    Queue,
}

/// Authority answer to a lock request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReply {
    Ok,
    Denied,
    Queued,
}

/// Authority answer to an unlock request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockReply {
    Ok,
    NotYours,
    NotLocked,
}

/// Final outcome of a client-side lock call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acquire {
    Ok,
    Locked,
}

impl Acquire {
    pub fn is_ok(&self) -> bool {
        matches!(self, Acquire::Ok)
    }
}

/// Sent by the authority once the acknowledging waiter owns the key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmed {
    pub key: String,
}

/// Waiter's answer to an offer. `confirm` is where `Confirmed` will land.
#[derive(Debug)]
pub struct Acknowledge {
    pub waiter: ClientId,
    pub confirm: oneshot::Sender<Confirmed>,
}

/// A vacated key offered to a waiter. Dropping it declines the offer.
#[derive(Debug)]
pub struct Offer {
    key: String,
    shard: usize,
    reply_to: oneshot::Sender<Acknowledge>,
}

impl Offer {
    pub(crate) fn new(key: String, shard: usize, reply_to: oneshot::Sender<Acknowledge>) -> Self {
        Self {
            key,
            shard,
            reply_to,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Shard of the offering authority
    pub fn shard(&self) -> usize {
        self.shard
    }

    /// Acknowledge liveness to the offering authority.
    ///
    /// Returns `None` when the authority already gave up on this offer.
    /// Otherwise the receiver resolves with `Confirmed` once ownership is
    /// transferred, or errors if the authority abandoned the transfer.
    pub fn acknowledge(self, waiter: ClientId) -> Option<oneshot::Receiver<Confirmed>> {
        let (confirm, confirmed) = oneshot::channel();
        self.reply_to
            .send(Acknowledge { waiter, confirm })
            .ok()
            .map(|_| confirmed)
    }
}

/// Per-client channel the authority pushes offers into
pub type Mailbox = mpsc::UnboundedSender<Offer>;

/// Requests processed by an authority, strictly in arrival order
#[derive(Debug)]
pub(crate) enum Command {
    Register {
        client: ClientId,
        mailbox: Mailbox,
        reply: oneshot::Sender<()>,
    },
    Lock {
        key: String,
        client: ClientId,
        mode: LockMode,
        reply: oneshot::Sender<LockReply>,
    },
    Unlock {
        key: String,
        client: ClientId,
        reply: oneshot::Sender<UnlockReply>,
    },
    UnlockAll {
        client: ClientId,
    },
    ClientDown {
        client: ClientId,
        reason: String,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Inspect {
        reply: oneshot::Sender<AuthoritySnapshot>,
    },
}
