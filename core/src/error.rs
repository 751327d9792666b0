use thiserror::Error;

use crate::types::{PaymentStatus, Platform};

#[derive(Error, Debug)]
pub enum PayrollError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Weekly record '{record_id}' not found")]
    RecordNotFound { record_id: String },

    #[error("Record '{record_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        record_id: String,
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("No active ledger entry for record '{record_id}'")]
    LedgerNotFound { record_id: String },

    #[error("Driver '{driver_id}' not found")]
    DriverNotFound { driver_id: String },

    #[error("Invite code '{code}' not found")]
    InviteNotFound { code: String },

    #[error("Invite code '{code}' was already used")]
    InviteAlreadyUsed { code: String },

    #[error("Invite code '{code}' has expired")]
    InviteExpired { code: String },

    #[error("Invalid referral: {reason}")]
    InvalidReferral { reason: String },

    #[error("Platform {platform} failed to parse: {message}")]
    PlatformParse { platform: Platform, message: String },

    #[error("Invalid week identifier '{0}'")]
    InvalidWeek(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PayrollResult<T> = Result<T, PayrollError>;
