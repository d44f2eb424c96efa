//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod automation_repo;
pub mod conversation_repo;
pub mod earning_repo;
pub mod model_repo;
pub mod notification_repo;
pub mod otp_repo;
pub mod purchase_repo;
pub mod session_repo;
pub mod user_repo;
pub mod withdrawal_repo;

pub use automation_repo::{AutomationRepo, AutomationRunRepo, UserAutomationRepo};
pub use conversation_repo::ConversationRepo;
pub use earning_repo::EarningRepo;
pub use model_repo::ModelRepo;
pub use notification_repo::NotificationRepo;
pub use otp_repo::OtpRepo;
pub use purchase_repo::PurchaseRepo;
pub use session_repo::SessionRepo;
pub use user_repo::UserRepo;
pub use withdrawal_repo::{WithdrawalRepo, WithdrawalUpdate};
