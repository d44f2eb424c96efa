//! Seller earnings, balances and withdrawal requests.
//!
//! All amounts are integer cents.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::account::is_valid_email;
use crate::error::CoreError;
use crate::types::Timestamp;

/// Marketplace commission taken from every sale.
pub const PLATFORM_FEE: f64 = 0.2;

/// Delay before an earning becomes withdrawable.
pub const EARNING_RELEASE_DELAY_MINS: i64 = 5;

// ---------------------------------------------------------------------------
// Earnings
// ---------------------------------------------------------------------------

/// Seller share of a sale, rounded down to the cent.
pub fn seller_cut(total_cents: i64, fee: f64) -> i64 {
    (total_cents as f64 * (1.0 - fee)).floor() as i64
}

/// When an earning recorded at `earned_at` can be withdrawn.
pub fn release_at(earned_at: Timestamp) -> Timestamp {
    earned_at + Duration::minutes(EARNING_RELEASE_DELAY_MINS)
}

/// Render cents as `$x.xx`.
pub fn format_currency(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

/// Balance summary shown on the seller dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub total_earnings: i64,
    pub withdrawn: i64,
    pub pending_withdrawals: i64,
    pub available: i64,
}

impl Balance {
    /// `released` counts only earnings past their release delay.
    pub fn compute(total_earnings: i64, released: i64, withdrawn: i64, pending: i64) -> Self {
        Self {
            total_earnings,
            withdrawn,
            pending_withdrawals: pending,
            available: available_balance(released, withdrawn + pending),
        }
    }
}

/// Released earnings minus everything already paid out or promised.
pub fn available_balance(released_earnings: i64, committed: i64) -> i64 {
    (released_earnings - committed).max(0)
}

// ---------------------------------------------------------------------------
// Withdrawal requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn parse(status: &str) -> Result<Self, CoreError> {
        match status {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(CoreError::Validation(
                "Invalid status. Must be pending, approved, or rejected".into(),
            )),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Validate a payout request against the requester's available balance.
pub fn validate_withdrawal(
    paypal_email: Option<&str>,
    amount_cents: Option<i64>,
    available: i64,
) -> Result<(String, i64), CoreError> {
    let email = paypal_email.map(str::trim).unwrap_or_default();
    let (true, Some(amount)) = (!email.is_empty(), amount_cents) else {
        return Err(CoreError::Validation(
            "Missing required fields: paypal_email and amount are required".into(),
        ));
    };
    if !is_valid_email(email) {
        return Err(CoreError::Validation(
            "Please enter a valid email address".into(),
        ));
    }
    if amount <= 0 {
        return Err(CoreError::Validation("Amount must be greater than 0".into()));
    }
    if amount > available {
        return Err(CoreError::Validation(format!(
            "Amount exceeds available balance of {}",
            format_currency(available)
        )));
    }
    Ok((email.to_string(), amount))
}

/// Outcome of an admin status change on a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalDecision {
    /// Same status as before; nothing to write.
    Unchanged,
    /// Pay out: mark approved and add the amount to the user's withdrawn total.
    Approve,
    Reject { reason: Option<String> },
}

/// Resolve a status change. Only pending requests can be decided.
pub fn decide_withdrawal(
    current: WithdrawalStatus,
    requested: WithdrawalStatus,
    rejected_reason: Option<&str>,
) -> Result<WithdrawalDecision, CoreError> {
    if current == requested {
        return Ok(WithdrawalDecision::Unchanged);
    }
    if current != WithdrawalStatus::Pending {
        return Err(CoreError::Conflict(format!(
            "Withdrawal request is already {}",
            current.name()
        )));
    }
    Ok(match requested {
        WithdrawalStatus::Approved => WithdrawalDecision::Approve,
        WithdrawalStatus::Rejected => WithdrawalDecision::Reject {
            reason: rejected_reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        },
        WithdrawalStatus::Pending => WithdrawalDecision::Unchanged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    #[test]
    fn seller_keeps_eighty_percent_rounded_down() {
        assert_eq!(seller_cut(1000, PLATFORM_FEE), 800);
        assert_eq!(seller_cut(999, PLATFORM_FEE), 799);
        assert_eq!(seller_cut(0, PLATFORM_FEE), 0);
    }

    #[test]
    fn currency_formatting() {
        assert_eq!(format_currency(500), "$5.00");
        assert_eq!(format_currency(1234), "$12.34");
        assert_eq!(format_currency(7), "$0.07");
        assert_eq!(format_currency(-150), "-$1.50");
    }

    #[test]
    fn release_delay_is_five_minutes() {
        let now = Utc::now();
        assert_eq!(release_at(now) - now, Duration::minutes(5));
    }

    #[test]
    fn balance_subtracts_withdrawn_and_pending() {
        let b = Balance::compute(5000, 4000, 1000, 500);
        assert_eq!(b.available, 2500);
        assert_eq!(Balance::compute(100, 100, 500, 0).available, 0);
    }

    #[test]
    fn withdrawal_validation_messages() {
        assert_matches!(
            validate_withdrawal(None, Some(100), 1000),
            Err(CoreError::Validation(m)) if m.starts_with("Missing required fields")
        );
        assert_matches!(
            validate_withdrawal(Some("nope"), Some(100), 1000),
            Err(CoreError::Validation(m)) if m == "Please enter a valid email address"
        );
        assert_matches!(
            validate_withdrawal(Some("a@b.co"), Some(0), 1000),
            Err(CoreError::Validation(m)) if m == "Amount must be greater than 0"
        );
        assert_matches!(
            validate_withdrawal(Some("a@b.co"), Some(1001), 1000),
            Err(CoreError::Validation(m)) if m.contains("$10.00")
        );
        assert_eq!(
            validate_withdrawal(Some(" a@b.co "), Some(1000), 1000).unwrap(),
            ("a@b.co".to_string(), 1000)
        );
    }

    #[test]
    fn status_parse() {
        assert_eq!(
            WithdrawalStatus::parse("approved").unwrap(),
            WithdrawalStatus::Approved
        );
        assert_matches!(
            WithdrawalStatus::parse("paid"),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn only_pending_requests_can_be_decided() {
        use WithdrawalStatus::*;
        assert_eq!(
            decide_withdrawal(Pending, Approved, None).unwrap(),
            WithdrawalDecision::Approve
        );
        assert_eq!(
            decide_withdrawal(Pending, Rejected, Some(" bad email ")).unwrap(),
            WithdrawalDecision::Reject {
                reason: Some("bad email".into())
            }
        );
        assert_eq!(
            decide_withdrawal(Approved, Approved, None).unwrap(),
            WithdrawalDecision::Unchanged
        );
        assert_matches!(
            decide_withdrawal(Approved, Rejected, None),
            Err(CoreError::Conflict(_))
        );
    }
}
