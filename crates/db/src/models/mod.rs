//! Row structs and DTOs.
//!
//! Each submodule holds a `FromRow` entity matching its table plus the
//! create DTOs the repositories accept.

pub mod automation;
pub mod conversation;
pub mod earning;
pub mod model;
pub mod notification;
pub mod otp;
pub mod purchase;
pub mod session;
pub mod user;
pub mod withdrawal;
