//! Client side of the lock service
//!
//! A `Client` owns the mailbox the authorities push offers into. Lock calls
//! that may wait take `&mut self`, so one client runs at most one bounded
//! wait at a time.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::authority::{Acquire, ClientId, LockMode, LockReply, Offer, UnlockReply};
use crate::common::{Error, Result};
use crate::service::LockService;

/// Longest wait a bounded lock honours (`u32::MAX` milliseconds)
pub const MAX_WAIT: Duration = Duration::from_millis(u32::MAX as u64);

pub struct Client {
    id: ClientId,
    service: LockService,
    offers: mpsc::UnboundedReceiver<Offer>,
}

impl Client {
    pub(crate) fn new(
        id: ClientId,
        service: LockService,
        offers: mpsc::UnboundedReceiver<Offer>,
    ) -> Self {
        Self {
            id,
            service,
            offers,
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn service(&self) -> &LockService {
        &self.service
    }

    /// Take `key` if it is free or already ours; `Denied` otherwise
    pub async fn try_lock(&self, key: &str) -> Result<LockReply> {
        self.service
            .authority_for(key)
            .lock(key, &self.id, LockMode::NonBlocking)
            .await
    }

    /// Take `key`, waiting up to `wait` for the current holder to let go.
    ///
    /// A zero `wait` never queues. Waits longer than [`MAX_WAIT`] are capped.
    pub async fn lock(&mut self, key: &str, wait: Duration) -> Result<Acquire> {
        if wait.is_zero() {
            return Ok(match self.try_lock(key).await? {
                LockReply::Ok => Acquire::Ok,
                LockReply::Denied | LockReply::Queued => Acquire::Locked,
            });
        }

        self.decline_stale_offers();

        match self.queue(key).await? {
            LockReply::Ok => Ok(Acquire::Ok),
            LockReply::Denied => Ok(Acquire::Locked),
            LockReply::Queued => {
                let wait = wait.min(MAX_WAIT);
                debug!(
                    client = %self.id,
                    key,
                    wait_ms = wait.as_millis() as u64,
                    "Queued, waiting for handoff"
                );
                self.await_handoff(key, Instant::now() + wait).await
            }
        }
    }

    async fn queue(&self, key: &str) -> Result<LockReply> {
        self.service
            .authority_for(key)
            .lock(key, &self.id, LockMode::Queue)
            .await
    }

    /// Wait for an offer of `key`, acknowledge it, then wait for the
    /// confirmation. Only the offer wait is bounded.
    ///
    /// An offer the authority already gave up on means our queue entry is
    /// gone, so the request is sent again against the same deadline.
    async fn await_handoff(&mut self, key: &str, deadline: Instant) -> Result<Acquire> {
        loop {
            let offer = match timeout_at(deadline, self.offers.recv()).await {
                Err(_) => {
                    debug!(client = %self.id, key, "Gave up waiting");
                    return Ok(Acquire::Locked);
                }
                Ok(None) => {
                    return Err(Error::AuthorityUnavailable("offer mailbox closed".into()));
                }
                Ok(Some(offer)) => offer,
            };

            if offer.key() != key {
                debug!(client = %self.id, key, offered = offer.key(), "Declining stale offer");
                continue;
            }

            let Some(confirmed) = offer.acknowledge(self.id.clone()) else {
                debug!(client = %self.id, key, "Offer expired before acknowledgement, queueing again");
                match self.queue(key).await? {
                    LockReply::Ok => return Ok(Acquire::Ok),
                    LockReply::Denied => return Ok(Acquire::Locked),
                    LockReply::Queued => continue,
                }
            };

            return match confirmed.await {
                Ok(_) => Ok(Acquire::Ok),
                Err(_) => {
                    debug!(client = %self.id, key, "Authority abandoned the handoff");
                    Ok(Acquire::Locked)
                }
            };
        }
    }

    /// Offers left over from an abandoned wait. Dropping one declines it.
    fn decline_stale_offers(&mut self) {
        while let Ok(offer) = self.offers.try_recv() {
            debug!(client = %self.id, key = offer.key(), "Declining stale offer");
        }
    }

    pub async fn unlock(&self, key: &str) -> Result<UnlockReply> {
        self.service.authority_for(key).unlock(key, &self.id).await
    }

    /// Release every key this client holds, on every shard. Returns once the
    /// requests are queued.
    pub async fn unlock_all(&self) -> Result<()> {
        for shard in self.service.authorities() {
            shard.unlock_all(&self.id).await?;
        }
        Ok(())
    }
}

impl Drop for Client {
    /// Held keys stay held: only explicit unlocks release them.
    fn drop(&mut self) {
        for shard in self.service.authorities() {
            if !shard.notify_down(&self.id, "client dropped") {
                debug!(client = %self.id, shard = shard.shard(), "Termination notice not delivered");
            }
        }
    }
}
