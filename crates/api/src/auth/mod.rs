//! Token primitives. Sign-in itself is passwordless; see `handlers::auth`.

pub mod jwt;
