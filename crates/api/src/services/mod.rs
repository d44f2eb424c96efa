//! Outbound collaborators and the chat pipeline.

pub mod ai;
pub mod chat;
pub mod drive;
pub mod execution;
pub mod file_store;
pub mod http;
pub mod lemon;
pub mod mailer;
pub mod n8n;
pub mod runner;
pub mod validator;
