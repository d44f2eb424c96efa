//! One-time passcodes for passwordless sign-in and sign-up.
//!
//! Codes are six random digits. Only a salted digest is persisted; the
//! plaintext leaves the process exactly once, in the email to the user.

use chrono::Duration;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::hashing::{constant_time_eq, sha256_hex};
use crate::types::Timestamp;

pub const CODE_LENGTH: usize = 6;

/// How long an issued code stays valid.
pub const CODE_TTL_MINS: i64 = 10;

/// Wrong guesses allowed before a code is burned.
pub const MAX_ATTEMPTS: i32 = 5;

/// Minimum delay between two codes for the same address.
pub const RESEND_COOLDOWN_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    SignIn,
    SignUp,
}

impl OtpPurpose {
    pub fn name(self) -> &'static str {
        match self {
            Self::SignIn => "sign_in",
            Self::SignUp => "sign_up",
        }
    }
}

/// A freshly generated code and the digest to store for it.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub code_hash: String,
    pub expires_at: Timestamp,
}

/// Generate a zero-padded six-digit code for `email`.
pub fn issue_code(email: &str, now: Timestamp) -> IssuedCode {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    let code = format!("{n:0width$}", width = CODE_LENGTH);
    IssuedCode {
        code_hash: hash_code(email, &code),
        code,
        expires_at: now + Duration::minutes(CODE_TTL_MINS),
    }
}

/// Digest stored for a code. The email acts as the salt.
pub fn hash_code(email: &str, code: &str) -> String {
    sha256_hex(format!("{email}:{code}").as_bytes())
}

/// Why a submitted code was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpRejection {
    Malformed,
    Expired,
    TooManyAttempts,
    Mismatch,
}

impl OtpRejection {
    pub fn message(self) -> &'static str {
        match self {
            Self::Malformed => "Verification code must be 6 digits",
            Self::Expired => "Verification code has expired. Please request a new one.",
            Self::TooManyAttempts => "Too many attempts. Please request a new code.",
            Self::Mismatch => "Invalid verification code",
        }
    }
}

/// The stored state of an outstanding code.
#[derive(Debug, Clone)]
pub struct StoredCode<'a> {
    pub code_hash: &'a str,
    pub expires_at: Timestamp,
    pub attempts: i32,
}

/// Check a submitted code against the stored digest.
pub fn verify_code(
    email: &str,
    submitted: &str,
    stored: &StoredCode<'_>,
    now: Timestamp,
) -> Result<(), OtpRejection> {
    let submitted = submitted.trim();
    if submitted.len() != CODE_LENGTH || !submitted.bytes().all(|b| b.is_ascii_digit()) {
        return Err(OtpRejection::Malformed);
    }
    if stored.attempts >= MAX_ATTEMPTS {
        return Err(OtpRejection::TooManyAttempts);
    }
    if now >= stored.expires_at {
        return Err(OtpRejection::Expired);
    }
    let candidate = hash_code(email, submitted);
    if !constant_time_eq(candidate.as_bytes(), stored.code_hash.as_bytes()) {
        return Err(OtpRejection::Mismatch);
    }
    Ok(())
}

/// Whether enough time has passed since `last_issued_at` to send another code.
pub fn can_resend(last_issued_at: Option<Timestamp>, now: Timestamp) -> bool {
    last_issued_at.is_none_or(|at| now - at >= Duration::seconds(RESEND_COOLDOWN_SECS))
}
