//! Authority task and its handle

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::protocol::{ClientId, Command, LockMode, LockReply, Mailbox, UnlockReply};
use super::state::{AuthoritySnapshot, LockState};
use crate::common::{AuthorityMetrics, Config, Result};

/// The single serialized owner of lock state for one shard.
///
/// Runs as one task; every request is handled to completion, handoff
/// negotiation included, before the next one is looked at.
pub struct Authority {
    pub(super) shard: usize,
    pub(super) state: LockState,
    pub(super) mailboxes: HashMap<ClientId, Mailbox>,
    pub(super) handoff_timeout: Duration,
    pub(super) metrics: Arc<AuthorityMetrics>,
}

impl Authority {
    pub fn new(shard: usize, config: &Config, metrics: Arc<AuthorityMetrics>) -> Self {
        Self {
            shard,
            state: LockState::new(),
            mailboxes: HashMap::new(),
            handoff_timeout: config.handoff_timeout(),
            metrics,
        }
    }

    /// Start the request loop on the current runtime. The task ends once
    /// every handle has been dropped.
    pub fn spawn(self, request_buffer: usize) -> AuthorityHandle {
        let (tx, rx) = mpsc::channel(request_buffer);
        let shard = self.shard;
        tokio::spawn(self.run(rx));
        AuthorityHandle { tx, shard }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        tracing::info!(
            shard = self.shard,
            handoff_timeout_ms = self.handoff_timeout.as_millis() as u64,
            "Authority started"
        );

        while let Some(command) = rx.recv().await {
            self.dispatch(command).await;
        }

        tracing::info!(
            shard = self.shard,
            held = self.state.held_count(),
            "Authority stopped"
        );
    }
}

/// Cheap, cloneable request channel to one authority
#[derive(Debug, Clone)]
pub struct AuthorityHandle {
    tx: mpsc::Sender<Command>,
    shard: usize,
}

impl AuthorityHandle {
    pub fn shard(&self) -> usize {
        self.shard
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).await?;
        Ok(rx.await?)
    }

    /// Tell the authority where to deliver offers for `client`
    pub async fn register(&self, client: &ClientId, mailbox: Mailbox) -> Result<()> {
        let client = client.clone();
        self.request(|reply| Command::Register {
            client,
            mailbox,
            reply,
        })
        .await
    }

    pub async fn lock(&self, key: &str, client: &ClientId, mode: LockMode) -> Result<LockReply> {
        let key = key.to_string();
        let client = client.clone();
        self.request(|reply| Command::Lock {
            key,
            client,
            mode,
            reply,
        })
        .await
    }

    pub async fn unlock(&self, key: &str, client: &ClientId) -> Result<UnlockReply> {
        let key = key.to_string();
        let client = client.clone();
        self.request(|reply| Command::Unlock { key, client, reply })
            .await
    }

    /// Fire-and-forget: returns once the request is queued, not processed
    pub async fn unlock_all(&self, client: &ClientId) -> Result<()> {
        self.tx
            .send(Command::UnlockAll {
                client: client.clone(),
            })
            .await?;
        Ok(())
    }

    /// Report that `client` terminated. Never waits; returns false when the
    /// notice could not be queued.
    pub fn notify_down(&self, client: &ClientId, reason: impl Into<String>) -> bool {
        self.tx
            .try_send(Command::ClientDown {
                client: client.clone(),
                reason: reason.into(),
            })
            .is_ok()
    }

    /// Wipe all locks and queues
    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub async fn snapshot(&self) -> Result<AuthoritySnapshot> {
        self.request(|reply| Command::Inspect { reply }).await
    }
}
