//! Role names carried in access-token claims.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// Whether a role string grants access to the moderation and payout panels.
pub fn is_admin(role: &str) -> bool {
    role == ROLE_ADMIN
}
