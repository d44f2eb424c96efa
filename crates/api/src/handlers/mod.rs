//! Request handlers, one submodule per resource.
//!
//! Handlers delegate storage to the repositories in `agora_db`, business
//! rules to `agora_core`, and map failures through [`AppError`](crate::error::AppError).

pub mod admin;
pub mod ai;
pub mod auth;
pub mod automations;
pub mod conversations;
pub mod form;
pub mod models;
pub mod notifications;
pub mod payments;
pub mod user;
pub mod withdrawals;
