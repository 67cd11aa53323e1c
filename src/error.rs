//! Error types for the settlement ledger.

use crate::money::{Currency, Money};
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur during ledger operation.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The payer's account is suspended
    #[error("account {0} is suspended")]
    AccountSuspended(u64),

    /// The recipient's account is suspended
    #[error("recipient account {0} is suspended")]
    RecipientAccountSuspended(u64),

    /// Ledger state contradicts an invariant. Never retried.
    #[error("invariant violation: {message}")]
    InvariantViolation { message: String },

    /// Arithmetic between two different currencies
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    /// No conversion rate is known for the pair
    #[error("no conversion rate from {from} to {to}")]
    MissingRate { from: Currency, to: Currency },

    /// Amount rejected by a precondition
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Money, reason: &'static str },

    /// Route does not belong to the payer
    #[error("route {route} belongs to participant {owner}, not {payer}")]
    RouteMismatch { route: u64, owner: u64, payer: u64 },

    /// Route cannot be charged in its current state
    #[error("route {route} is not chargeable (status: {status})")]
    RouteNotChargeable { route: u64, status: String },

    /// Destination does not belong to the recipient
    #[error("destination {destination} belongs to participant {owner}, not {recipient}")]
    DestinationMismatch {
        destination: u64,
        owner: u64,
        recipient: u64,
    },

    #[error("unknown status: {0:?}")]
    InvalidStatus(String),

    #[error("unknown period: {0:?}")]
    InvalidPeriod(String),

    #[error("invalid currency code: {0:?}")]
    InvalidCurrency(String),

    #[error("invalid money value: {0:?}")]
    InvalidMoney(String),

    #[error("payin {0} not found")]
    PayinNotFound(u64),

    #[error("payin transfer {0} not found")]
    TransferNotFound(u64),

    #[error("participant {0} not found")]
    ParticipantNotFound(u64),

    #[error("route {0} not found")]
    RouteNotFound(u64),

    #[error("destination {0} not found")]
    DestinationNotFound(u64),

    /// Failed to open or read the input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid command record
    #[error("Invalid command at row {row}: {message}")]
    InvalidRecord { row: usize, message: String },

    /// Missing input file argument
    #[error("Missing input file argument. Usage: payin-ledger <commands.csv>")]
    MissingArgument,
}

impl LedgerError {
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        LedgerError::InvariantViolation {
            message: message.into(),
        }
    }

    /// Returns `true` for errors that indicate a bug or corrupted data.
    ///
    /// Callers must not retry past these.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::InvariantViolation { .. })
    }
}
