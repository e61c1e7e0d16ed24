//! # rollcall-token
//!
//! Presence token lifecycle for Rollcall.
//!
//! This crate provides:
//! - The [`TokenStore`] capability set (get / set-with-TTL / swap / delete / atomic append /
//!   atomic increment) and an in-memory implementation
//! - The [`TokenManager`]: issue, rotate, invalidate, redeem and usage tracking
//!
//! ## Token Model
//!
//! | Key | Holds | Lifetime |
//! |-----|-------|----------|
//! | `{prefix}:token:{token}` | Token record (JSON) | Token TTL |
//! | `{prefix}:token:{token}:redemptions` | Redemption list | Remaining token TTL |
//! | `{prefix}:session:{id}:current` | Current token of the session | Token TTL |
//! | `{prefix}:session:{id}:generation` | Rotation counter | Unbounded |
//!
//! A token is valid exactly as long as its record is in the store; the store's TTL does the
//! reaping. Redemptions never invalidate a token: one token redeemed by several users is left to
//! the risk engine to flag.

pub mod error;
pub mod manager;
pub mod store;

pub use error::{StoreError, TokenError};
pub use manager::{IssuedToken, ScannedToken, TokenManager, TokenUsage, parse_scanned};
pub use store::{MemoryTokenStore, TokenStore};
