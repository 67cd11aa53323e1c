//! The ledger facade exposed to the processor-integration and web layers.
//!
//! Each operation runs as exactly one atomic unit on the store. The ledger
//! itself keeps no state between calls.

use crate::aggregates;
use crate::convert::Converter;
use crate::error::Result;
use crate::model::{
    DestinationId, Participant, ParticipantId, Payin, PayinEvent, PayinId, PayinTransfer,
    PayinTransferEvent, PayinTransferId, RouteId, Tip,
};
use crate::money::{Currency, Money};
use crate::payin::{self, PayinUpdate, PreparePayin};
use crate::status::RouteStatus;
use crate::store::Store;
use crate::transfer::{self, PayinTransferUpdate, PreparePayinTransfer};
use log::debug;

/// Settlement ledger over a store `S`, converting currencies with `C`.
///
/// # Example
///
/// ```
/// use payin_ledger::{Currency, FixedRates, Ledger, MemoryStore, PayinUpdate, RouteStatus, Status};
///
/// let ledger = Ledger::new(MemoryStore::new(), FixedRates::new());
/// let payer = ledger.add_participant(Currency::USD, "0 USD".parse().unwrap()).unwrap();
/// let route = ledger.add_route(payer, RouteStatus::Pending).unwrap();
///
/// let payin = ledger.prepare_payin(payer, "10.00 USD".parse().unwrap(), route).unwrap();
/// let payin = ledger.update_payin(PayinUpdate::new(payin.id, Status::Succeeded)).unwrap();
/// assert_eq!(payin.status, Status::Succeeded);
/// assert_eq!(ledger.payin_events(payin.id).len(), 2);
/// ```
pub struct Ledger<S, C> {
    store: S,
    converter: C,
}

impl<S: Store, C: Converter> Ledger<S, C> {
    pub fn new(store: S, converter: C) -> Self {
        Ledger { store, converter }
    }

    pub fn converter_mut(&mut self) -> &mut C {
        &mut self.converter
    }

    // ----- ledger operations -----

    /// Prepares a charge of `amount` against `payer` through `route`.
    pub fn prepare_payin(
        &self,
        payer: ParticipantId,
        amount: Money,
        route: RouteId,
    ) -> Result<Payin> {
        self.store.atomically(|state| {
            payin::prepare(
                state,
                PreparePayin {
                    payer,
                    amount,
                    route,
                },
            )
        })
    }

    /// Records a processor-reported payin status. Safe to repeat.
    pub fn update_payin(&self, params: PayinUpdate) -> Result<Payin> {
        self.store.atomically(|state| payin::update(state, params))
    }

    /// Prepares the allocation of part of a payin to a recipient.
    pub fn prepare_payin_transfer(&self, params: PreparePayinTransfer) -> Result<PayinTransfer> {
        let converter = &self.converter;
        self.store.atomically(|state| transfer::prepare(state, converter, params))
    }

    /// Records a processor-reported transfer status. Safe to repeat.
    ///
    /// On success the tip and the cached aggregates are updated in the same unit.
    pub fn update_payin_transfer(&self, params: PayinTransferUpdate) -> Result<PayinTransfer> {
        let converter = &self.converter;
        self.store.atomically(|state| transfer::update(state, converter, params))
    }

    /// Recomputes `receiving`, `npatrons` and `giving` of a participant from scratch.
    pub fn recompute_aggregates(&self, participant: ParticipantId) -> Result<Participant> {
        let converter = &self.converter;
        self.store.atomically(|state| aggregates::recompute_all(state, converter, participant))
    }

    /// Recomputes `giving` only, for callers that deferred it with `update_donor = false`.
    pub fn recompute_giving(&self, participant: ParticipantId) -> Result<Participant> {
        let converter = &self.converter;
        self.store.atomically(|state| aggregates::recompute_giving(state, converter, participant))
    }

    // ----- collaborator records -----

    pub fn add_participant(&self, main_currency: Currency, taking: Money) -> Result<ParticipantId> {
        self.store.atomically(|state| {
            let participant = state.insert_participant(main_currency, taking);
            debug!("Added participant {} ({})", participant.id, main_currency);
            Ok(participant.id)
        })
    }

    pub fn set_suspended(&self, participant: ParticipantId, suspended: bool) -> Result<()> {
        self.store.atomically(|state| {
            state.participant_mut(participant)?.is_suspended = suspended;
            debug!("Participant {} suspended: {}", participant, suspended);
            Ok(())
        })
    }

    pub fn add_route(&self, owner: ParticipantId, status: RouteStatus) -> Result<RouteId> {
        self.store.atomically(|state| Ok(state.insert_route(owner, status)?.id))
    }

    pub fn add_destination(&self, owner: ParticipantId) -> Result<DestinationId> {
        self.store.atomically(|state| Ok(state.insert_destination(owner)?.id))
    }

    /// Sets the current tip from `tipper` to `tippee`, keeping any prepaid balance.
    pub fn set_tip(
        &self,
        tipper: ParticipantId,
        tippee: ParticipantId,
        amount: Money,
    ) -> Result<Tip> {
        self.store.atomically(|state| state.set_tip(tipper, tippee, amount))
    }

    // ----- reads -----

    pub fn payin(&self, id: PayinId) -> Result<Payin> {
        self.store.read(|state| state.payin(id).cloned())
    }

    pub fn payin_transfer(&self, id: PayinTransferId) -> Result<PayinTransfer> {
        self.store.read(|state| state.payin_transfer(id).cloned())
    }

    pub fn payin_events(&self, id: PayinId) -> Vec<PayinEvent> {
        self.store.read(|state| state.payin_events(id))
    }

    pub fn transfer_events(&self, id: PayinTransferId) -> Vec<PayinTransferEvent> {
        self.store.read(|state| state.transfer_events(id))
    }

    pub fn participant(&self, id: ParticipantId) -> Result<Participant> {
        self.store.read(|state| state.participant(id).cloned())
    }

    pub fn tip(&self, tipper: ParticipantId, tippee: ParticipantId) -> Option<Tip> {
        self.store.read(|state| state.tip(tipper, tippee).cloned())
    }
}
