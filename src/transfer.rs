//! Payin transfer lifecycle.
//!
//! A transfer reaching `succeeded` runs the funding cascade in the same unit of work:
//!
//! 1. credit the funded tip ([`aggregates::credit_tip`])
//! 2. recompute the beneficiary's `receiving` and `npatrons`
//! 3. recompute the payer's `giving`, unless the caller batches it
//!
//! Each step reads what the previous one wrote, so they run in order.

use crate::aggregates;
use crate::convert::Converter;
use crate::error::{LedgerError, Result};
use crate::guard::ensure_recipient_active;
use crate::model::{DestinationId, ParticipantId, PayinId, PayinTransfer, PayinTransferId, Period};
use crate::money::Money;
use crate::status::Status;
use crate::store::{LedgerState, NewPayinTransfer};
use log::{debug, info};

/// Parameters of [`prepare`].
#[derive(Debug, Clone)]
pub struct PreparePayinTransfer {
    pub payin: PayinId,
    pub recipient: ParticipantId,
    pub destination: DestinationId,
    pub context: String,
    /// Amount the recipient receives.
    pub amount: Money,
    /// Per-period amount of the recurring donation, if any.
    pub unit_amount: Option<Money>,
    pub period: Option<Period>,
    pub team: Option<ParticipantId>,
}

/// Parameters of [`update`].
#[derive(Debug, Clone)]
pub struct PayinTransferUpdate {
    pub transfer: PayinTransferId,
    pub remote_id: Option<String>,
    pub status: Status,
    pub error: Option<String>,
    /// Left unchanged when `None`.
    pub amount: Option<Money>,
    /// Left unchanged when `None`.
    pub fee: Option<Money>,
    /// Recompute the payer's `giving` on success. Callers updating many
    /// transfers of one payer turn this off and recompute once at the end.
    pub update_donor: bool,
}

impl PayinTransferUpdate {
    pub fn new(transfer: PayinTransferId, status: Status) -> Self {
        PayinTransferUpdate {
            transfer,
            remote_id: None,
            status,
            error: None,
            amount: None,
            fee: None,
            update_donor: true,
        }
    }
}

/// Creates a transfer in status `pre` along with its first event.
///
/// `n_units` is the number of whole `unit_amount`s in `amount`, after
/// converting `unit_amount` into the transfer's currency.
///
/// # Errors
///
/// - `InvalidAmount` if the amount is not positive
/// - `DestinationMismatch` if the destination isn't the recipient's
/// - `ParticipantNotFound` if `team` is not a participant
/// - `RecipientAccountSuspended` if the recipient is suspended
pub fn prepare(
    state: &mut LedgerState,
    converter: &dyn Converter,
    params: PreparePayinTransfer,
) -> Result<PayinTransfer> {
    let PreparePayinTransfer {
        payin,
        recipient,
        destination,
        context,
        amount,
        unit_amount,
        period,
        team,
    } = params;

    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount {
            amount,
            reason: "transfer amount must be positive",
        });
    }

    let owner = state.destination(destination)?.participant;
    if owner != recipient {
        return Err(LedgerError::DestinationMismatch {
            destination: destination.0,
            owner: owner.0,
            recipient: recipient.0,
        });
    }
    let payer = state.payin(payin)?.payer;
    if let Some(team) = team {
        state.participant(team)?;
    }

    ensure_recipient_active(&*state, recipient)?;

    let n_units = match unit_amount {
        Some(unit) => Some(amount.div_units(&converter.convert(unit, amount.currency)?)?),
        None => None,
    };

    let transfer = state.insert_payin_transfer(NewPayinTransfer {
        payin,
        payer,
        recipient,
        destination,
        context,
        amount,
        unit_amount,
        n_units,
        period,
        team,
    });
    state.append_transfer_event(transfer.id, transfer.status, None);

    debug!(
        "Prepared transfer {} of {} from payin {} to participant {}",
        transfer.id, amount, payin, recipient
    );
    Ok(transfer)
}

/// Records a status reported for a transfer and, on success, runs the funding cascade.
///
/// When the transfer is already in `status` nothing is written, the cascade
/// does not run, and the current row is returned. Two callers racing to report
/// the same success therefore credit the tip once.
pub fn update(
    state: &mut LedgerState,
    converter: &dyn Converter,
    params: PayinTransferUpdate,
) -> Result<PayinTransfer> {
    let PayinTransferUpdate {
        transfer: id,
        remote_id,
        status,
        error,
        amount,
        fee,
        update_donor,
    } = params;

    let event_error = error.clone();
    let updated = state.update_transfer_unless_status(id, status, |pt| {
        pt.error = error;
        pt.remote_id = remote_id;
        if let Some(amount) = amount {
            pt.amount = amount;
        }
        if fee.is_some() {
            pt.fee = fee;
        }
    })?;

    let transfer = match updated {
        Some(transfer) => transfer,
        None => {
            debug!("Transfer {} already {}, nothing to do", id, status);
            return Ok(state.payin_transfer(id)?.clone());
        }
    };

    state.append_transfer_event(id, status, event_error);

    if !status.is_succeeded() {
        debug!("Transfer {} is now {}", id, status);
        return Ok(transfer);
    }

    aggregates::credit_tip(state, converter, &transfer)?;
    aggregates::recompute_receiving(state, converter, transfer.beneficiary())?;
    if update_donor {
        aggregates::recompute_giving(state, converter, transfer.payer)?;
    }

    info!(
        "Transfer {} succeeded: {} from {} to {}",
        id,
        transfer.amount,
        transfer.payer,
        transfer.beneficiary()
    );
    Ok(transfer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::FixedRates;
    use crate::money::Currency;
    use crate::payin::{self, PreparePayin};
    use crate::status::RouteStatus;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    struct Fixture {
        state: LedgerState,
        rates: FixedRates,
        donor: ParticipantId,
        creator: ParticipantId,
        destination: DestinationId,
        payin: PayinId,
    }

    fn fixture() -> Fixture {
        let mut state = LedgerState::new();
        let rate = Decimal::from_str("1.25").unwrap();
        let rates = FixedRates::new().with_rate(Currency::EUR, Currency::USD, rate);
        let donor = state.insert_participant(Currency::USD, money("0 USD")).id;
        let creator = state.insert_participant(Currency::USD, money("0 USD")).id;
        let route = state.insert_route(donor, RouteStatus::Chargeable).unwrap().id;
        let destination = state.insert_destination(creator).unwrap().id;
        state.set_tip(donor, creator, money("1.00 USD")).unwrap();
        let payin = payin::prepare(
            &mut state,
            PreparePayin {
                payer: donor,
                amount: money("5.00 USD"),
                route,
            },
        )
        .unwrap()
        .id;
        Fixture {
            state,
            rates,
            donor,
            creator,
            destination,
            payin,
        }
    }

    fn prepare_five(f: &mut Fixture, unit: Option<&str>) -> Result<PayinTransfer> {
        prepare(
            &mut f.state,
            &f.rates,
            PreparePayinTransfer {
                payin: f.payin,
                recipient: f.creator,
                destination: f.destination,
                context: "personal-donation".to_string(),
                amount: money("5.00 USD"),
                unit_amount: unit.map(money),
                period: Some(Period::Weekly),
                team: None,
            },
        )
    }

    #[test]
    fn test_prepare_computes_units_and_logs_pre() {
        let mut f = fixture();
        let pt = prepare_five(&mut f, Some("1.00 USD")).unwrap();

        assert_eq!(pt.n_units, Some(5));
        assert_eq!(pt.payer, f.donor);
        assert_eq!(pt.status, Status::Pre);
        let events = f.state.transfer_events(pt.id);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, Status::Pre);
    }

    #[test]
    fn test_prepare_converts_unit_amount() {
        let mut f = fixture();
        // 0.80 EUR is 1.00 USD
        let pt = prepare_five(&mut f, Some("0.80 EUR")).unwrap();
        assert_eq!(pt.n_units, Some(5));

        let pt = prepare_five(&mut f, None).unwrap();
        assert_eq!(pt.n_units, None);
    }

    #[test]
    fn test_prepare_checks_destination_and_suspension() {
        let mut f = fixture();
        let stranger = f.state.insert_participant(Currency::USD, money("0 USD")).id;
        let their_account = f.state.insert_destination(stranger).unwrap().id;

        let err = prepare(
            &mut f.state,
            &f.rates,
            PreparePayinTransfer {
                payin: f.payin,
                recipient: f.creator,
                destination: their_account,
                context: "personal-donation".to_string(),
                amount: money("5.00 USD"),
                unit_amount: None,
                period: None,
                team: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::DestinationMismatch { .. }));

        f.state.participant_mut(f.creator).unwrap().is_suspended = true;
        let err = prepare_five(&mut f, None).unwrap_err();
        assert!(matches!(err, LedgerError::RecipientAccountSuspended(_)));
        assert!(f.state.payin_transfer(PayinTransferId(1)).is_err());
    }

    #[test]
    fn test_prepare_rejects_unknown_team() {
        let mut f = fixture();
        let err = prepare(
            &mut f.state,
            &f.rates,
            PreparePayinTransfer {
                payin: f.payin,
                recipient: f.creator,
                destination: f.destination,
                context: "team-donation".to_string(),
                amount: money("5.00 USD"),
                unit_amount: None,
                period: None,
                team: Some(ParticipantId(99)),
            },
        )
        .unwrap_err();

        assert!(matches!(err, LedgerError::ParticipantNotFound(99)));
        assert!(!err.is_fatal());
        assert!(f.state.payin_transfer(PayinTransferId(1)).is_err());
    }

    #[test]
    fn test_non_success_update_does_not_cascade() {
        let mut f = fixture();
        let pt = prepare_five(&mut f, Some("1.00 USD")).unwrap();

        let params = PayinTransferUpdate::new(pt.id, Status::Pending);
        let row = update(&mut f.state, &f.rates, params).unwrap();

        assert_eq!(row.status, Status::Pending);
        let tip = f.state.tip(f.donor, f.creator).unwrap();
        assert_eq!(tip.paid_in_advance, None);
        assert!(!tip.is_funded);
        assert_eq!(f.state.participant(f.creator).unwrap().npatrons, 0);
    }

    #[test]
    fn test_success_runs_cascade_once() {
        let mut f = fixture();
        let pt = prepare_five(&mut f, Some("1.00 USD")).unwrap();

        let mut params = PayinTransferUpdate::new(pt.id, Status::Succeeded);
        params.remote_id = Some("tr_1".to_string());
        let first = update(&mut f.state, &f.rates, params.clone()).unwrap();
        let second = update(&mut f.state, &f.rates, params).unwrap();

        assert_eq!(first, second);
        let tip = f.state.tip(f.donor, f.creator).unwrap();
        assert_eq!(tip.paid_in_advance, Some(money("5.00 USD")));
        assert!(tip.is_funded);

        let creator = f.state.participant(f.creator).unwrap();
        assert_eq!(creator.receiving, money("1.00 USD"));
        assert_eq!(creator.npatrons, 1);
        assert_eq!(f.state.participant(f.donor).unwrap().giving, money("1.00 USD"));
        assert_eq!(f.state.transfer_events(pt.id).len(), 2);
    }

    #[test]
    fn test_update_donor_can_be_deferred() {
        let mut f = fixture();
        let pt = prepare_five(&mut f, None).unwrap();

        let mut params = PayinTransferUpdate::new(pt.id, Status::Succeeded);
        params.update_donor = false;
        update(&mut f.state, &f.rates, params).unwrap();

        assert!(f.state.participant(f.donor).unwrap().giving.is_zero());
        assert_eq!(f.state.participant(f.creator).unwrap().npatrons, 1);
    }

    #[test]
    fn test_success_without_tip_is_fatal() {
        let mut f = fixture();
        let team = f.state.insert_participant(Currency::USD, money("0 USD")).id;
        let pt = prepare(
            &mut f.state,
            &f.rates,
            PreparePayinTransfer {
                payin: f.payin,
                recipient: f.creator,
                destination: f.destination,
                context: "team-donation".to_string(),
                amount: money("5.00 USD"),
                unit_amount: None,
                period: None,
                team: Some(team),
            },
        )
        .unwrap();

        let params = PayinTransferUpdate::new(pt.id, Status::Succeeded);
        let err = update(&mut f.state, &f.rates, params).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_amount_override_applies_before_credit() {
        let mut f = fixture();
        let pt = prepare_five(&mut f, None).unwrap();

        let mut params = PayinTransferUpdate::new(pt.id, Status::Succeeded);
        params.amount = Some(money("4.50 USD"));
        params.fee = Some(money("0.50 USD"));
        let row = update(&mut f.state, &f.rates, params).unwrap();

        assert_eq!(row.amount, money("4.50 USD"));
        assert_eq!(row.fee, Some(money("0.50 USD")));
        assert_eq!(
            f.state.tip(f.donor, f.creator).unwrap().paid_in_advance,
            Some(money("4.50 USD"))
        );
    }
}
