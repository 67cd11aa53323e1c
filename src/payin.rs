//! Payin lifecycle: preparing a charge and recording processor-reported statuses.
//!
//! A payin's own success touches no cached aggregate; only its transfers do.

use crate::error::{LedgerError, Result};
use crate::guard::ensure_payer_active;
use crate::model::{ParticipantId, Payin, PayinId, RouteId};
use crate::money::Money;
use crate::status::Status;
use crate::store::LedgerState;
use log::{debug, info};

/// Parameters of [`prepare`].
#[derive(Debug, Clone)]
pub struct PreparePayin {
    pub payer: ParticipantId,
    /// Presentment amount of the charge.
    pub amount: Money,
    pub route: RouteId,
}

/// Parameters of [`update`].
#[derive(Debug, Clone)]
pub struct PayinUpdate {
    pub payin: PayinId,
    pub remote_id: Option<String>,
    pub status: Status,
    pub error: Option<String>,
    /// Left unchanged when `None`.
    pub amount_settled: Option<Money>,
    /// Left unchanged when `None`.
    pub fee: Option<Money>,
}

impl PayinUpdate {
    pub fn new(payin: PayinId, status: Status) -> Self {
        PayinUpdate {
            payin,
            remote_id: None,
            status,
            error: None,
            amount_settled: None,
            fee: None,
        }
    }
}

/// Creates a payin in status `pre` along with its first event.
///
/// # Errors
///
/// - `InvalidAmount` if the amount is not positive
/// - `RouteMismatch` / `RouteNotChargeable` if the route can't be charged for this payer
/// - `AccountSuspended` if the payer is suspended
pub fn prepare(state: &mut LedgerState, params: PreparePayin) -> Result<Payin> {
    let PreparePayin {
        payer,
        amount,
        route,
    } = params;

    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount {
            amount,
            reason: "payin amount must be positive",
        });
    }

    let route = state.route(route)?;
    if route.participant != payer {
        return Err(LedgerError::RouteMismatch {
            route: route.id.0,
            owner: route.participant.0,
            payer: payer.0,
        });
    }
    if !route.status.is_usable() {
        return Err(LedgerError::RouteNotChargeable {
            route: route.id.0,
            status: route.status.to_string(),
        });
    }
    let route = route.id;

    ensure_payer_active(&*state, payer)?;

    let payin = state.insert_payin(payer, amount, route);
    state.append_payin_event(payin.id, payin.status, None);

    debug!(
        "Prepared payin {} of {} for participant {} via route {}",
        payin.id, amount, payer, route
    );
    Ok(payin)
}

/// Records a status reported for a payin.
///
/// When the payin is already in `status` nothing is written and the current row
/// is returned, so duplicate callbacks are harmless. Otherwise the row is
/// updated and one event appended.
pub fn update(state: &mut LedgerState, params: PayinUpdate) -> Result<Payin> {
    let PayinUpdate {
        payin: id,
        remote_id,
        status,
        error,
        amount_settled,
        fee,
    } = params;

    let event_error = error.clone();
    let updated = state.update_payin_unless_status(id, status, |payin| {
        payin.error = error;
        payin.remote_id = remote_id;
        if amount_settled.is_some() {
            payin.amount_settled = amount_settled;
        }
        if fee.is_some() {
            payin.fee = fee;
        }
    })?;

    let payin = match updated {
        Some(payin) => payin,
        None => {
            debug!("Payin {} already {}, nothing to do", id, status);
            return Ok(state.payin(id)?.clone());
        }
    };

    state.append_payin_event(id, status, event_error);

    if status.is_succeeded() {
        info!("Payin {} succeeded ({})", id, payin.amount);
    } else {
        debug!("Payin {} is now {}", id, status);
    }
    Ok(payin)
}
