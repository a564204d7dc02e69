//! Request dispatch
//!
//! One decision per request, in arrival order. Contention and misuse come
//! back as reply values; nothing in here fails.

use tracing::{debug, info, warn};

use super::handoff::Handoff;
use super::protocol::{ClientId, Command, LockMode, LockReply, UnlockReply};
use super::server::Authority;

impl Authority {
    pub(super) async fn dispatch(&mut self, command: Command) {
        match command {
            Command::Register {
                client,
                mailbox,
                reply,
            } => {
                if self.mailboxes.insert(client.clone(), mailbox).is_some() {
                    warn!(
                        shard = self.shard,
                        client = %client,
                        "Client id registered twice, earlier mailbox replaced"
                    );
                } else {
                    debug!(shard = self.shard, client = %client, "Client registered");
                }
                let _ = reply.send(());
            }
            Command::Lock {
                key,
                client,
                mode,
                reply,
            } => {
                let decision = self.handle_lock(&key, &client, mode);
                if reply.send(decision).is_err() {
                    debug!(shard = self.shard, key = %key, client = %client, "Lock caller went away");
                }
            }
            Command::Unlock { key, client, reply } => {
                let decision = self.handle_unlock(&key, &client).await;
                if reply.send(decision).is_err() {
                    debug!(shard = self.shard, key = %key, client = %client, "Unlock caller went away");
                }
            }
            Command::UnlockAll { client } => self.handle_unlock_all(&client).await,
            Command::ClientDown { client, reason } => self.handle_client_down(&client, &reason),
            Command::Reset { reply } => {
                self.reset();
                let _ = reply.send(());
            }
            Command::Inspect { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
        }
    }

    pub(super) fn handle_lock(&mut self, key: &str, client: &ClientId, mode: LockMode) -> LockReply {
        self.metrics.lock_requests.inc();

        match self.state.holder(key) {
            Some(holder) if holder == client => {
                debug!(shard = self.shard, key, client = %client, "Reentrant lock");
                LockReply::Ok
            }
            Some(holder) => match mode {
                LockMode::NonBlocking => {
                    debug!(shard = self.shard, key, client = %client, holder = %holder, "Lock denied");
                    self.metrics.denials.inc();
                    LockReply::Denied
                }
                LockMode::Queue => {
                    if !self.state.enqueue_waiter(key, client) {
                        debug!(shard = self.shard, key, client = %client, "Already queued");
                    }
                    self.metrics.queued.inc();
                    LockReply::Queued
                }
            },
            None => {
                self.state.grant(key, client);
                self.metrics.grants.inc();
                self.metrics.held_keys.inc();
                debug!(shard = self.shard, key, client = %client, "Lock granted");
                LockReply::Ok
            }
        }
    }

    pub(super) async fn handle_unlock(&mut self, key: &str, client: &ClientId) -> UnlockReply {
        match self.state.holder(key) {
            None => {
                self.metrics.rejected_unlocks.inc();
                UnlockReply::NotLocked
            }
            Some(holder) if holder != client => {
                self.metrics.rejected_unlocks.inc();
                UnlockReply::NotYours
            }
            Some(_) => {
                self.metrics.unlocks.inc();
                self.hand_off(key, client).await;
                UnlockReply::Ok
            }
        }
    }

    /// Release everything `client` holds, as if unlocked one key at a time
    pub(super) async fn handle_unlock_all(&mut self, client: &ClientId) {
        let keys = self.state.holdings(client).to_vec();
        if keys.is_empty() {
            return;
        }

        let mut handed = 0usize;
        for key in &keys {
            self.metrics.unlocks.inc();
            if let Handoff::Granted(_) = self.hand_off(key, client).await {
                handed += 1;
            }
        }
        info!(
            shard = self.shard,
            client = %client,
            released = keys.len(),
            handed,
            "Released all keys"
        );
    }

    /// Termination notices are only logged. Keys stay held until an explicit
    /// unlock or unlock-all, but no more offers are sent to the client.
    pub(super) fn handle_client_down(&mut self, client: &ClientId, reason: &str) {
        self.metrics.client_down.inc();
        self.mailboxes.remove(client);

        let held = self.state.holdings(client).len();
        if held > 0 {
            warn!(
                shard = self.shard,
                client = %client,
                reason,
                held,
                "Client terminated while holding keys"
            );
        } else {
            debug!(shard = self.shard, client = %client, reason, "Client terminated");
        }
    }

    pub(super) fn reset(&mut self) {
        self.metrics.held_keys.sub(self.state.held_count() as u64);
        self.metrics.resets.inc();
        self.state.clear();
        info!(shard = self.shard, "Authority state reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::protocol::Offer;
    use crate::common::{AuthorityMetrics, Config};
    use std::sync::Arc;
    use tokio::sync::{mpsc, oneshot};

    fn authority() -> Authority {
        Authority::new(0, &Config::default(), Arc::new(AuthorityMetrics::new()))
    }

    fn id(s: &str) -> ClientId {
        ClientId::from(s)
    }

    #[test]
    fn test_lock_free_key_then_reentrant() {
        let mut authority = authority();
        let a = id("a");

        assert_eq!(authority.handle_lock("alpha", &a, LockMode::NonBlocking), LockReply::Ok);
        assert_eq!(authority.handle_lock("alpha", &a, LockMode::NonBlocking), LockReply::Ok);
        assert_eq!(authority.handle_lock("alpha", &a, LockMode::Queue), LockReply::Ok);

        assert_eq!(authority.state.holdings(&a), ["alpha"]);
        assert!(authority.state.waiters("alpha").is_empty());
        assert_eq!(authority.metrics.grants.get(), 1);
    }

    #[test]
    fn test_contended_lock_denied_or_queued() {
        let mut authority = authority();
        authority.handle_lock("alpha", &id("a"), LockMode::NonBlocking);

        assert_eq!(
            authority.handle_lock("alpha", &id("b"), LockMode::NonBlocking),
            LockReply::Denied
        );
        assert!(authority.state.waiters("alpha").is_empty());

        assert_eq!(authority.handle_lock("alpha", &id("b"), LockMode::Queue), LockReply::Queued);
        assert_eq!(authority.handle_lock("alpha", &id("b"), LockMode::Queue), LockReply::Queued);
        assert_eq!(authority.state.waiters("alpha"), vec![id("b")]);
        assert_eq!(authority.state.holder("alpha"), Some(&id("a")));
    }

    #[tokio::test]
    async fn test_unlock_authorization() {
        let mut authority = authority();
        assert_eq!(authority.handle_unlock("alpha", &id("a")).await, UnlockReply::NotLocked);

        authority.handle_lock("alpha", &id("a"), LockMode::NonBlocking);
        assert_eq!(authority.handle_unlock("alpha", &id("b")).await, UnlockReply::NotYours);
        assert_eq!(authority.state.holder("alpha"), Some(&id("a")));

        assert_eq!(authority.handle_unlock("alpha", &id("a")).await, UnlockReply::Ok);
        assert!(authority.state.holder("alpha").is_none());
        assert_eq!(authority.metrics.rejected_unlocks.get(), 2);
        assert_eq!(authority.metrics.held_keys.get(), 0);
    }

    #[tokio::test]
    async fn test_unlock_all_releases_in_holding_order() {
        let mut authority = authority();
        for key in ["k1", "k2", "k3"] {
            authority.handle_lock(key, &id("c"), LockMode::NonBlocking);
        }
        authority.handle_lock("k4", &id("other"), LockMode::NonBlocking);

        authority.handle_unlock_all(&id("c")).await;

        assert!(authority.state.holdings(&id("c")).is_empty());
        for key in ["k1", "k2", "k3"] {
            assert!(authority.state.holder(key).is_none());
        }
        assert_eq!(authority.state.holder("k4"), Some(&id("other")));
    }

    #[test]
    fn test_client_down_keeps_holdings() {
        let mut authority = authority();
        let (tx, _rx) = mpsc::unbounded_channel::<Offer>();
        authority.mailboxes.insert(id("a"), tx);
        authority.handle_lock("alpha", &id("a"), LockMode::NonBlocking);

        authority.handle_client_down(&id("a"), "crashed");

        assert_eq!(authority.state.holder("alpha"), Some(&id("a")));
        assert!(!authority.mailboxes.contains_key(&id("a")));
        assert_eq!(authority.metrics.client_down.get(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_replaces_mailbox() {
        let mut authority = authority();
        let (first, mut first_rx) = mpsc::unbounded_channel::<Offer>();
        let (second, mut second_rx) = mpsc::unbounded_channel::<Offer>();

        for mailbox in [first, second] {
            let (reply, done) = oneshot::channel();
            authority
                .dispatch(Command::Register {
                    client: id("a"),
                    mailbox,
                    reply,
                })
                .await;
            done.await.unwrap();
        }
        assert_eq!(authority.mailboxes.len(), 1);

        let (reply_to, _ack) = oneshot::channel();
        authority.mailboxes[&id("a")]
            .send(Offer::new("alpha".into(), 0, reply_to))
            .unwrap();
        assert_eq!(second_rx.try_recv().unwrap().key(), "alpha");
        // Only the registry held the first sender
        assert!(matches!(
            first_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_reset_via_dispatch() {
        let mut authority = authority();
        authority.handle_lock("alpha", &id("a"), LockMode::NonBlocking);
        authority.handle_lock("alpha", &id("b"), LockMode::Queue);

        let (reply, done) = oneshot::channel();
        authority.dispatch(Command::Reset { reply }).await;
        done.await.unwrap();

        let (reply, snapshot) = oneshot::channel();
        authority.dispatch(Command::Inspect { reply }).await;
        assert!(snapshot.await.unwrap().is_empty());
        assert_eq!(authority.metrics.held_keys.get(), 0);
    }
}
