//! Service error taxonomy

use crate::ledger::LedgerError;
use crate::storage::StoreError;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Lookup miss: the key never existed or its request expired
    #[error("request not found or expired")]
    RequestNotFound,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("malformed callback payload: {0}")]
    CallbackPayloadMalformed(String),

    #[error("payout submission failed: {0}")]
    LedgerSubmissionFailed(String),

    #[error("request key already in use")]
    DuplicateRequestKey,

    /// Direct-sign flows need the signer's public key from a prior login
    #[error("unknown signer {0}")]
    UnknownSigner(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
