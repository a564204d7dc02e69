//! # keylock
//!
//! A named-key mutual-exclusion service:
//! - One serialized authority per shard decides every lock and unlock
//! - Contended keys are queued per key, first come first served
//! - Vacated keys are handed to the first waiter that proves it is alive
//! - Clients wait locally, with a timeout, for a handoff
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────┐  lock/unlock   ┌──────────────────────────┐
//!   │ Client A │ ─────────────▶ │ Authority (shard 0)      │
//!   └──────────┘ ◀───────────── │  locks   key → owner     │
//!                 ok/denied/    │  waiters key → [client]  │
//!                 queued        │  holdings owner → [key]  │
//!   ┌──────────┐                └────────────┬─────────────┘
//!   │ Client B │ ◀── Offer ──────────────────┤
//!   │ (queued) │ ── Acknowledge ────────────▶│ handoff negotiation
//!   │          │ ◀── Confirmed ──────────────┘
//!   └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use keylock::{Acquire, Config, LockService};
//! use std::time::Duration;
//!
//! # async fn run() -> keylock::Result<()> {
//! let service = LockService::start(&Config::default())?;
//! let mut client = service.connect_new().await?;
//!
//! if client.lock("alpha", Duration::from_secs(5)).await? == Acquire::Ok {
//!     // exclusive section
//!     client.unlock("alpha").await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod authority;
pub mod client;
pub mod common;
pub mod service;

// Re-export commonly used types
pub use authority::{Acquire, ClientId, LockReply, UnlockReply};
pub use client::Client;
pub use common::{Config, Error, Result};
pub use service::LockService;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
