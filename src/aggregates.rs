//! Cached aggregates derived from the current tips.
//!
//! `receiving`, `npatrons` and `giving` are always recomputed from the full set
//! of currently funded tips, never patched by a delta, so a missed or
//! duplicated event is corrected by the next recomputation.

use crate::convert::Converter;
use crate::error::{LedgerError, Result};
use crate::model::{Participant, ParticipantId, PayinTransfer, Tip};
use crate::money::{Currency, Money};
use crate::store::LedgerState;
use log::{debug, error};

fn counts_toward_aggregates(tip: &Tip) -> bool {
    tip.is_funded && tip.amount.is_positive()
}

fn sum_in(converter: &dyn Converter, amounts: &[Money], currency: Currency) -> Result<Money> {
    amounts.iter().try_fold(Money::zero(currency), |total, amount| {
        total.checked_add(&converter.convert(*amount, currency)?)
    })
}

/// Credits a succeeded transfer to the tip it funds.
///
/// The tip is the current one from the transfer's payer to its beneficiary.
/// Its `paid_in_advance` grows by the transfer amount converted into the tip's
/// currency, and it becomes funded.
///
/// # Errors
///
/// `InvariantViolation` if no such tip exists or if the resulting prepaid
/// balance is not positive. Both mean the caller let a bad transfer through.
pub fn credit_tip(
    state: &mut LedgerState,
    converter: &dyn Converter,
    transfer: &PayinTransfer,
) -> Result<Tip> {
    let tippee = transfer.beneficiary();
    let tip = match state.tip_mut(transfer.payer, tippee) {
        Some(tip) => tip,
        None => {
            error!(
                "Transfer {} succeeded but participant {} has no tip to {}",
                transfer.id, transfer.payer, tippee
            );
            return Err(LedgerError::invariant(format!(
                "no current tip from {} to {} for transfer {}",
                transfer.payer, tippee, transfer.id
            )));
        }
    };

    let currency = tip.amount.currency;
    let previous = match tip.paid_in_advance {
        Some(prepaid) => converter.convert(prepaid, currency)?,
        None => Money::zero(currency),
    };
    let paid_in_advance = previous.checked_add(&converter.convert(transfer.amount, currency)?)?;

    if !paid_in_advance.is_positive() {
        error!(
            "Transfer {} left tip {} with paid_in_advance {}",
            transfer.id, tip.id, paid_in_advance
        );
        return Err(LedgerError::invariant(format!(
            "paid_in_advance of tip {} would be {} after transfer {}",
            tip.id, paid_in_advance, transfer.id
        )));
    }

    tip.paid_in_advance = Some(paid_in_advance);
    tip.is_funded = true;
    debug!(
        "Tip {} from {} to {}: paid_in_advance {} -> {}",
        tip.id, tip.tipper, tip.tippee, previous, paid_in_advance
    );
    Ok(tip.clone())
}

/// Recomputes `receiving` and `npatrons` of `participant`.
///
/// `receiving = taking + sum(funded incoming tips)` in the participant's main currency.
pub fn recompute_receiving(
    state: &mut LedgerState,
    converter: &dyn Converter,
    participant: ParticipantId,
) -> Result<Participant> {
    let main_currency = state.participant(participant)?.main_currency;
    let amounts: Vec<Money> = state
        .tips_to(participant)
        .filter(|t| counts_toward_aggregates(t))
        .map(|t| t.amount)
        .collect();

    let tips_total = sum_in(converter, &amounts, main_currency)?;
    let npatrons = u32::try_from(amounts.len())
        .map_err(|_| LedgerError::invariant(format!("too many patrons for {}", participant)))?;

    let p = state.participant_mut(participant)?;
    let taking = converter.convert(p.taking, main_currency)?;
    p.receiving = taking.checked_add(&tips_total)?;
    p.npatrons = npatrons;

    debug!(
        "Participant {}: receiving {} from {} patrons",
        participant, p.receiving, p.npatrons
    );
    Ok(p.clone())
}

/// Recomputes `giving` of `participant` from its funded outgoing tips.
pub fn recompute_giving(
    state: &mut LedgerState,
    converter: &dyn Converter,
    participant: ParticipantId,
) -> Result<Participant> {
    let main_currency = state.participant(participant)?.main_currency;
    let amounts: Vec<Money> = state
        .tips_from(participant)
        .filter(|t| counts_toward_aggregates(t))
        .map(|t| t.amount)
        .collect();

    let giving = sum_in(converter, &amounts, main_currency)?;
    let p = state.participant_mut(participant)?;
    p.giving = giving;

    debug!("Participant {}: giving {}", participant, p.giving);
    Ok(p.clone())
}

/// Recomputes every cached aggregate of `participant`.
pub fn recompute_all(
    state: &mut LedgerState,
    converter: &dyn Converter,
    participant: ParticipantId,
) -> Result<Participant> {
    recompute_receiving(state, converter, participant)?;
    recompute_giving(state, converter, participant)
}
