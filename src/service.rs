//! Lock service: one or more authorities, keys routed by hash
//!
//! Every key belongs to exactly one shard, so each shard keeps its own
//! consistent view without talking to the others. With one shard this is
//! the plain single-authority service.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::authority::{Authority, AuthorityHandle, AuthoritySnapshot, ClientId};
use crate::client::Client;
use crate::common::{shard_key, AuthorityMetrics, Config, Result};

#[derive(Debug, Clone)]
pub struct LockService {
    shards: Arc<[AuthorityHandle]>,
    metrics: Arc<AuthorityMetrics>,
}

impl LockService {
    /// Spawn `config.shards` authorities on the current runtime
    pub fn start(config: &Config) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(AuthorityMetrics::new());
        let shards: Vec<AuthorityHandle> = (0..config.shards)
            .map(|shard| Authority::new(shard, config, metrics.clone()).spawn(config.request_buffer))
            .collect();

        tracing::info!(
            shards = config.shards,
            handoff_timeout_ms = config.handoff_timeout_ms,
            "Lock service started"
        );

        Ok(Self {
            shards: shards.into(),
            metrics,
        })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Authority owning `key`
    pub fn authority_for(&self, key: &str) -> &AuthorityHandle {
        &self.shards[shard_key(key, self.shards.len())]
    }

    pub fn authorities(&self) -> &[AuthorityHandle] {
        &self.shards
    }

    pub fn metrics(&self) -> &AuthorityMetrics {
        &self.metrics
    }

    /// Connect a client under a caller-supplied identity.
    ///
    /// `id` must be unique among live clients. Connecting a second client
    /// under the same id replaces the first one's mailbox, and dropping
    /// either of them unregisters the id.
    pub async fn connect(&self, id: ClientId) -> Result<Client> {
        let (mailbox, offers) = mpsc::unbounded_channel();
        for shard in self.shards.iter() {
            shard.register(&id, mailbox.clone()).await?;
        }
        tracing::debug!(client = %id, "Client connected");
        Ok(Client::new(id, self.clone(), offers))
    }

    /// Connect a client under a fresh random identity
    pub async fn connect_new(&self) -> Result<Client> {
        self.connect(ClientId::generate()).await
    }

    pub async fn holder(&self, key: &str) -> Result<Option<ClientId>> {
        let snapshot = self.authority_for(key).snapshot().await?;
        Ok(snapshot.locks.get(key).cloned())
    }

    pub async fn waiters(&self, key: &str) -> Result<Vec<ClientId>> {
        let mut snapshot = self.authority_for(key).snapshot().await?;
        Ok(snapshot.waiters.remove(key).unwrap_or_default())
    }

    /// Keys held by `client` across all shards
    pub async fn holdings(&self, client: &ClientId) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for shard in self.shards.iter() {
            let mut snapshot = shard.snapshot().await?;
            keys.extend(snapshot.holdings.remove(client).unwrap_or_default());
        }
        Ok(keys)
    }

    pub async fn snapshot(&self) -> Result<AuthoritySnapshot> {
        let mut merged = AuthoritySnapshot::default();
        for shard in self.shards.iter() {
            merged.merge(shard.snapshot().await?);
        }
        Ok(merged)
    }

    /// Clear every shard back to empty. Waiters in the middle of a bounded
    /// wait simply time out.
    pub async fn reset(&self) -> Result<()> {
        for shard in self.shards.iter() {
            shard.reset().await?;
        }
        tracing::warn!(shards = self.shards.len(), "Lock service reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{LockMode, LockReply};
    use crate::Error;

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = Config {
            shards: 0,
            ..Default::default()
        };
        assert!(matches!(
            LockService::start(&config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_keys_route_to_a_single_shard() {
        let config = Config {
            shards: 4,
            ..Default::default()
        };
        let service = LockService::start(&config).unwrap();
        let a = ClientId::from("a");

        for i in 0..32 {
            let key = format!("key_{}", i);
            let reply = service
                .authority_for(&key)
                .lock(&key, &a, LockMode::NonBlocking)
                .await
                .unwrap();
            assert_eq!(reply, LockReply::Ok);
        }

        let mut per_shard = 0;
        for shard in service.authorities() {
            per_shard += shard.snapshot().await.unwrap().locks.len();
        }
        assert_eq!(per_shard, 32);
        assert_eq!(service.holdings(&a).await.unwrap().len(), 32);
        assert_eq!(service.metrics().held_keys.get(), 32);
    }

    #[tokio::test]
    async fn test_reset_clears_all_shards() {
        let config = Config {
            shards: 3,
            ..Default::default()
        };
        let service = LockService::start(&config).unwrap();
        let a = ClientId::from("a");
        for key in ["x", "y", "z"] {
            service
                .authority_for(key)
                .lock(key, &a, LockMode::NonBlocking)
                .await
                .unwrap();
        }

        service.reset().await.unwrap();

        assert!(service.snapshot().await.unwrap().is_empty());
        assert_eq!(service.metrics().held_keys.get(), 0);
    }
}
