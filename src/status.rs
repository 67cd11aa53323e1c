//! Status vocabularies for ledger rows and payment routes.

use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a payin or payin transfer.
///
/// Every row starts as `Pre`. Only `Succeeded` and "unchanged" drive behavior;
/// the intermediate states are whatever the payment processor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pre,
    AwaitingPayerAction,
    Pending,
    AwaitingReview,
    Suspended,
    Failed,
    Succeeded,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pre => "pre",
            Status::AwaitingPayerAction => "awaiting_payer_action",
            Status::Pending => "pending",
            Status::AwaitingReview => "awaiting_review",
            Status::Suspended => "suspended",
            Status::Failed => "failed",
            Status::Succeeded => "succeeded",
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Status::Succeeded)
    }
}

impl FromStr for Status {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pre" => Ok(Status::Pre),
            "awaiting_payer_action" => Ok(Status::AwaitingPayerAction),
            "pending" => Ok(Status::Pending),
            "awaiting_review" => Ok(Status::AwaitingReview),
            "suspended" => Ok(Status::Suspended),
            "failed" => Ok(Status::Failed),
            "succeeded" => Ok(Status::Succeeded),
            other => Err(LedgerError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a payer's payment instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Pending,
    Chargeable,
    Consumed,
    Failed,
    Canceled,
}

impl RouteStatus {
    /// Whether a payin may be prepared against a route in this state.
    pub fn is_usable(&self) -> bool {
        matches!(self, RouteStatus::Pending | RouteStatus::Chargeable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Pending => "pending",
            RouteStatus::Chargeable => "chargeable",
            RouteStatus::Consumed => "consumed",
            RouteStatus::Failed => "failed",
            RouteStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for RouteStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(RouteStatus::Pending),
            "chargeable" => Ok(RouteStatus::Chargeable),
            "consumed" => Ok(RouteStatus::Consumed),
            "failed" => Ok(RouteStatus::Failed),
            "canceled" => Ok(RouteStatus::Canceled),
            other => Err(LedgerError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            Status::Pre,
            Status::AwaitingPayerAction,
            Status::Pending,
            Status::AwaitingReview,
            Status::Suspended,
            Status::Failed,
            Status::Succeeded,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_parse_handles_whitespace_and_case() {
        assert_eq!(" Succeeded ".parse::<Status>().unwrap(), Status::Succeeded);
        assert!(matches!(
            "refunded".parse::<Status>(),
            Err(LedgerError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_is_succeeded() {
        assert!(Status::Succeeded.is_succeeded());
        assert!(!Status::Failed.is_succeeded());
    }

    #[test]
    fn test_route_usability() {
        assert!(RouteStatus::Pending.is_usable());
        assert!(RouteStatus::Chargeable.is_usable());
        assert!(!RouteStatus::Consumed.is_usable());
        assert!(!RouteStatus::Canceled.is_usable());
    }
}
