//! Request extractors for authentication and role checks.
//!
//! - [`auth::AuthUser`] reads the Bearer token.
//! - [`rbac::RequireAdmin`] additionally requires the `admin` role.

pub mod auth;
pub mod rbac;
