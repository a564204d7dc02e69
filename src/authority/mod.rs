//! Lock authority
//!
//! The authority is responsible for:
//! - Ownership bookkeeping (key → holder, holder → keys)
//! - Per-key FIFO waiter queues
//! - Lock/unlock decisions, one request at a time
//! - Handoff negotiation with queued waiters

mod dispatch;
pub mod handoff;
pub mod protocol;
pub mod server;
pub mod state;

pub use handoff::Handoff;
pub use protocol::{
    Acknowledge, Acquire, ClientId, Confirmed, LockMode, LockReply, Mailbox, Offer, UnlockReply,
};
pub use server::{Authority, AuthorityHandle};
pub use state::{AuthoritySnapshot, LockState};
