//! Domain logic for the Agora marketplace.
//!
//! Everything in this crate is pure: no database access, no network calls.
//! The `db`, `events` and `api` crates build on these types and rules.

pub mod account;
pub mod automation;
pub mod chat;
pub mod crypto;
pub mod drive;
pub mod error;
pub mod hashing;
pub mod listing;
pub mod otp;
pub mod payments;
pub mod payouts;
pub mod plans;
pub mod roles;
pub mod schedule;
pub mod search;
pub mod storage;
pub mod types;
pub mod workflow;
