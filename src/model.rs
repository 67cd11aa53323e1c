//! Ledger entities and the external records the ledger reads or patches.

use crate::error::LedgerError;
use crate::money::{Currency, Money};
use crate::status::{RouteStatus, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifies a user or a team.
    ParticipantId
);
id_type!(
    /// Identifies a payer's payment instrument.
    RouteId
);
id_type!(
    /// Identifies a recipient's payment account.
    DestinationId
);
id_type!(PayinId);
id_type!(PayinTransferId);
id_type!(TipId);

/// A user or team, with the aggregates this ledger keeps cached on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub main_currency: Currency,
    /// Fixed base added to `receiving` (income taken from teams).
    pub taking: Money,
    /// `taking` plus the sum of currently funded incoming tips.
    pub receiving: Money,
    /// Number of currently funded incoming tips.
    pub npatrons: u32,
    /// Sum of currently funded outgoing tips.
    pub giving: Money,
    pub is_suspended: bool,
}

impl Participant {
    pub fn new(id: ParticipantId, main_currency: Currency, taking: Money) -> Self {
        Participant {
            id,
            main_currency,
            taking,
            receiving: taking,
            npatrons: 0,
            giving: Money::zero(main_currency),
            is_suspended: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRoute {
    pub id: RouteId,
    pub participant: ParticipantId,
    pub status: RouteStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentAccount {
    pub id: DestinationId,
    pub participant: ParticipantId,
}

/// A charge attempted against a payer through a route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payin {
    pub id: PayinId,
    pub payer: ParticipantId,
    /// Presentment amount.
    pub amount: Money,
    pub route: RouteId,
    pub status: Status,
    /// Identifier on the payment processor's side.
    pub remote_id: Option<String>,
    pub error: Option<String>,
    pub amount_settled: Option<Money>,
    pub fee: Option<Money>,
    pub ctime: DateTime<Utc>,
}

/// One observed status of a payin. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayinEvent {
    pub payin: PayinId,
    pub status: Status,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Period of a recurring donation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Weekly,
    Monthly,
    Yearly,
}

impl FromStr for Period {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            "yearly" => Ok(Period::Yearly),
            other => Err(LedgerError::InvalidPeriod(other.to_string())),
        }
    }
}

/// An allocation of a payin's funds to a recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayinTransfer {
    pub id: PayinTransferId,
    pub payin: PayinId,
    /// Copied from the payin.
    pub payer: ParticipantId,
    pub recipient: ParticipantId,
    pub destination: DestinationId,
    /// Free-form classification, e.g. `"personal-donation"`.
    pub context: String,
    /// Amount the recipient receives.
    pub amount: Money,
    /// Per-period amount of the recurring donation this transfer funds.
    pub unit_amount: Option<Money>,
    pub n_units: Option<i64>,
    pub period: Option<Period>,
    /// Project this transfer is credited to, if any.
    pub team: Option<ParticipantId>,
    pub status: Status,
    pub remote_id: Option<String>,
    pub error: Option<String>,
    pub fee: Option<Money>,
    pub ctime: DateTime<Utc>,
}

impl PayinTransfer {
    /// The tippee of the donation this transfer funds: the team if set, else the recipient.
    pub fn beneficiary(&self) -> ParticipantId {
        self.team.unwrap_or(self.recipient)
    }
}

/// One observed status of a payin transfer. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayinTransferEvent {
    pub payin_transfer: PayinTransferId,
    pub status: Status,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The current recurring pledge from `tipper` to `tippee`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tip {
    pub id: TipId,
    pub tipper: ParticipantId,
    pub tippee: ParticipantId,
    /// Rate per period.
    pub amount: Money,
    /// Prepaid balance, consumed over future periods.
    pub paid_in_advance: Option<Money>,
    pub is_funded: bool,
    pub mtime: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_participant_has_zero_aggregates() {
        let taking: Money = "3.00 EUR".parse().unwrap();
        let p = Participant::new(ParticipantId(1), Currency::EUR, taking);

        assert_eq!(p.receiving, taking);
        assert_eq!(p.npatrons, 0);
        assert!(p.giving.is_zero());
        assert_eq!(p.giving.currency, Currency::EUR);
        assert!(!p.is_suspended);
    }

    #[test]
    fn test_period_parse() {
        assert_eq!("Monthly".parse::<Period>().unwrap(), Period::Monthly);
        assert!("daily".parse::<Period>().is_err());
    }
}
