//! Handoff negotiation
//!
//! When a key is vacated it goes to the first waiter that proves it is still
//! there: the waiter is sent an `Offer`, must `Acknowledge` within the
//! handoff timeout, and only then is sent `Confirmed` and granted the key.
//! Waiters that miss the window are dropped from the queue for good and the
//! next one is tried, until someone takes the key or the queue runs out.
//!
//! The authority processes nothing else while this runs. Worst case is
//! `handoff_timeout × queue length`.

use std::time::Instant;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::protocol::{ClientId, Confirmed, Offer};
use super::server::Authority;

/// Where a vacated key ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handoff {
    /// No live waiter, the key is unheld
    Freed,
    /// Ownership moved to this waiter
    Granted(ClientId),
}

impl Authority {
    /// Release `key` held by `owner` and negotiate its next owner.
    pub(super) async fn hand_off(&mut self, key: &str, owner: &ClientId) -> Handoff {
        let started = Instant::now();
        self.state.release(key, owner);
        self.metrics.held_keys.dec();

        let outcome = loop {
            let Some(waiter) = self.state.dequeue_waiter(key) else {
                debug!(shard = self.shard, key, "Key freed, no waiters");
                break Handoff::Freed;
            };

            match self.offer(key, &waiter).await {
                Ok(()) => {
                    self.state.grant(key, &waiter);
                    self.metrics.grants.inc();
                    self.metrics.held_keys.inc();
                    self.metrics.handoffs.inc();
                    info!(
                        shard = self.shard,
                        key,
                        from = %owner,
                        to = %waiter,
                        "Lock handed off"
                    );
                    break Handoff::Granted(waiter);
                }
                Err(reason) => {
                    self.metrics.waiters_dropped.inc();
                    warn!(
                        shard = self.shard,
                        key,
                        waiter = %waiter,
                        reason,
                        "Dropping waiter"
                    );
                }
            }
        };

        self.metrics.record_handoff(started.elapsed());
        outcome
    }

    /// Offer `key` to `waiter` and wait for its acknowledgement.
    /// `Ok` means the waiter has been sent `Confirmed`.
    async fn offer(&self, key: &str, waiter: &ClientId) -> Result<(), &'static str> {
        let mailbox = self.mailboxes.get(waiter).ok_or("no mailbox registered")?;

        let (reply_to, acked) = oneshot::channel();
        mailbox
            .send(Offer::new(key.to_string(), self.shard, reply_to))
            .map_err(|_| "mailbox closed")?;

        let ack = match timeout(self.handoff_timeout, acked).await {
            Ok(Ok(ack)) => ack,
            Ok(Err(_)) => return Err("offer declined"),
            Err(_) => return Err("acknowledge timed out"),
        };
        if &ack.waiter != waiter {
            return Err("acknowledged by another client");
        }

        ack.confirm
            .send(Confirmed {
                key: key.to_string(),
            })
            .map_err(|_| "confirmation undeliverable")
    }
}
