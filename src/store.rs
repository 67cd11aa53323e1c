//! Ledger storage and the atomic unit of work.
//!
//! Every ledger operation runs inside [`Store::atomically`]: it reads its
//! preconditions and applies all of its writes against one [`LedgerState`],
//! and either every write lands or none does.

use crate::error::{LedgerError, Result};
use crate::model::{
    DestinationId, Participant, ParticipantId, PaymentAccount, PaymentRoute, Payin, PayinEvent,
    PayinId, PayinTransfer, PayinTransferEvent, PayinTransferId, RouteId, Tip, TipId,
};
use crate::money::{Currency, Money};
use crate::status::{RouteStatus, Status};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Source of atomic units of work over the ledger tables.
pub trait Store: Send + Sync {
    /// Runs `unit` with exclusive access to the tables.
    ///
    /// Writes made by `unit` become visible only if it returns `Ok`.
    fn atomically<T, F>(&self, unit: F) -> Result<T>
    where
        F: FnOnce(&mut LedgerState) -> Result<T>;

    /// Runs a read-only query against a consistent view of the tables.
    fn read<T, F>(&self, query: F) -> T
    where
        F: FnOnce(&LedgerState) -> T;
}

/// Per-table id sequences. Ids start at 1.
#[derive(Debug, Clone, Default)]
struct Sequences {
    participant: u64,
    route: u64,
    destination: u64,
    payin: u64,
    transfer: u64,
    tip: u64,
}

fn next(seq: &mut u64) -> u64 {
    *seq += 1;
    *seq
}

/// Prior values of the rows touched by the unit of work in progress.
///
/// `None` marks a row the unit inserted. Event logs are append-only, so
/// their lengths at the start of the unit are enough to undo them.
#[derive(Debug, Clone, Default)]
struct UndoLog {
    seq: Sequences,
    payin_events: usize,
    transfer_events: usize,
    participants: BTreeMap<ParticipantId, Option<Participant>>,
    routes: BTreeMap<RouteId, Option<PaymentRoute>>,
    destinations: BTreeMap<DestinationId, Option<PaymentAccount>>,
    payins: BTreeMap<PayinId, Option<Payin>>,
    transfers: BTreeMap<PayinTransferId, Option<PayinTransfer>>,
    tips: BTreeMap<(ParticipantId, ParticipantId), Option<Tip>>,
}

/// Saves the current value of `key` the first time a unit touches it.
fn remember<K: Ord + Copy, V: Clone>(
    undo: &mut Option<UndoLog>,
    log: impl FnOnce(&mut UndoLog) -> &mut BTreeMap<K, Option<V>>,
    table: &BTreeMap<K, V>,
    key: K,
) {
    if let Some(undo) = undo.as_mut() {
        log(undo).entry(key).or_insert_with(|| table.get(&key).cloned());
    }
}

fn restore<K: Ord, V>(table: &mut BTreeMap<K, V>, saved: BTreeMap<K, Option<V>>) {
    for (key, prior) in saved {
        match prior {
            Some(row) => {
                table.insert(key, row);
            }
            None => {
                table.remove(&key);
            }
        }
    }
}

/// New payin transfer row, before the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewPayinTransfer {
    pub payin: PayinId,
    pub payer: ParticipantId,
    pub recipient: ParticipantId,
    pub destination: DestinationId,
    pub context: String,
    pub amount: Money,
    pub unit_amount: Option<Money>,
    pub n_units: Option<i64>,
    pub period: Option<crate::model::Period>,
    pub team: Option<ParticipantId>,
}

/// The ledger tables.
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    participants: BTreeMap<ParticipantId, Participant>,
    routes: BTreeMap<RouteId, PaymentRoute>,
    destinations: BTreeMap<DestinationId, PaymentAccount>,
    payins: BTreeMap<PayinId, Payin>,
    payin_events: Vec<PayinEvent>,
    transfers: BTreeMap<PayinTransferId, PayinTransfer>,
    transfer_events: Vec<PayinTransferEvent>,
    /// Current tips keyed by `(tipper, tippee)`.
    tips: BTreeMap<(ParticipantId, ParticipantId), Tip>,
    seq: Sequences,
    undo: Option<UndoLog>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- units of work -----

    /// Starts recording prior row values so the unit can be rolled back.
    ///
    /// A log left behind by a unit that panicked is rolled back first.
    pub(crate) fn begin(&mut self) {
        self.rollback();
        self.undo = Some(UndoLog {
            seq: self.seq.clone(),
            payin_events: self.payin_events.len(),
            transfer_events: self.transfer_events.len(),
            ..UndoLog::default()
        });
    }

    pub(crate) fn commit(&mut self) {
        self.undo = None;
    }

    /// Puts back every row touched since [`begin`](Self::begin).
    pub(crate) fn rollback(&mut self) {
        let Some(undo) = self.undo.take() else {
            return;
        };
        restore(&mut self.participants, undo.participants);
        restore(&mut self.routes, undo.routes);
        restore(&mut self.destinations, undo.destinations);
        restore(&mut self.payins, undo.payins);
        restore(&mut self.transfers, undo.transfers);
        restore(&mut self.tips, undo.tips);
        self.payin_events.truncate(undo.payin_events);
        self.transfer_events.truncate(undo.transfer_events);
        self.seq = undo.seq;
    }

    // ----- participants -----

    pub fn insert_participant(&mut self, main_currency: Currency, taking: Money) -> Participant {
        let id = ParticipantId(next(&mut self.seq.participant));
        let participant = Participant::new(id, main_currency, taking);
        remember(&mut self.undo, |u| &mut u.participants, &self.participants, id);
        self.participants.insert(id, participant.clone());
        participant
    }

    pub fn participant(&self, id: ParticipantId) -> Result<&Participant> {
        self.participants
            .get(&id)
            .ok_or(LedgerError::ParticipantNotFound(id.0))
    }

    pub fn participant_mut(&mut self, id: ParticipantId) -> Result<&mut Participant> {
        remember(&mut self.undo, |u| &mut u.participants, &self.participants, id);
        self.participants
            .get_mut(&id)
            .ok_or(LedgerError::ParticipantNotFound(id.0))
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    // ----- routes and destinations -----

    pub fn insert_route(
        &mut self,
        owner: ParticipantId,
        status: RouteStatus,
    ) -> Result<PaymentRoute> {
        self.participant(owner)?;
        let id = RouteId(next(&mut self.seq.route));
        remember(&mut self.undo, |u| &mut u.routes, &self.routes, id);
        let route = PaymentRoute {
            id,
            participant: owner,
            status,
        };
        self.routes.insert(id, route.clone());
        Ok(route)
    }

    pub fn route(&self, id: RouteId) -> Result<&PaymentRoute> {
        self.routes.get(&id).ok_or(LedgerError::RouteNotFound(id.0))
    }

    pub fn insert_destination(&mut self, owner: ParticipantId) -> Result<PaymentAccount> {
        self.participant(owner)?;
        let id = DestinationId(next(&mut self.seq.destination));
        remember(&mut self.undo, |u| &mut u.destinations, &self.destinations, id);
        let account = PaymentAccount {
            id,
            participant: owner,
        };
        self.destinations.insert(id, account.clone());
        Ok(account)
    }

    pub fn destination(&self, id: DestinationId) -> Result<&PaymentAccount> {
        self.destinations
            .get(&id)
            .ok_or(LedgerError::DestinationNotFound(id.0))
    }

    /// The first payment account registered by `owner`.
    pub fn destination_of(&self, owner: ParticipantId) -> Option<&PaymentAccount> {
        self.destinations.values().find(|d| d.participant == owner)
    }

    // ----- payins -----

    /// Inserts a payin with status `pre`.
    pub fn insert_payin(&mut self, payer: ParticipantId, amount: Money, route: RouteId) -> Payin {
        let id = PayinId(next(&mut self.seq.payin));
        remember(&mut self.undo, |u| &mut u.payins, &self.payins, id);
        let payin = Payin {
            id,
            payer,
            amount,
            route,
            status: Status::Pre,
            remote_id: None,
            error: None,
            amount_settled: None,
            fee: None,
            ctime: Utc::now(),
        };
        self.payins.insert(id, payin.clone());
        payin
    }

    pub fn payin(&self, id: PayinId) -> Result<&Payin> {
        self.payins.get(&id).ok_or(LedgerError::PayinNotFound(id.0))
    }

    /// Applies `patch` to the payin unless its status already equals `status`.
    ///
    /// Returns the updated row, or `None` when nothing changed.
    pub fn update_payin_unless_status(
        &mut self,
        id: PayinId,
        status: Status,
        patch: impl FnOnce(&mut Payin),
    ) -> Result<Option<Payin>> {
        remember(&mut self.undo, |u| &mut u.payins, &self.payins, id);
        let payin = self
            .payins
            .get_mut(&id)
            .ok_or(LedgerError::PayinNotFound(id.0))?;
        if payin.status == status {
            return Ok(None);
        }
        patch(payin);
        payin.status = status;
        Ok(Some(payin.clone()))
    }

    pub fn append_payin_event(&mut self, payin: PayinId, status: Status, error: Option<String>) {
        self.payin_events.push(PayinEvent {
            payin,
            status,
            error,
            timestamp: Utc::now(),
        });
    }

    /// Events of one payin, oldest first.
    pub fn payin_events(&self, payin: PayinId) -> Vec<PayinEvent> {
        self.payin_events
            .iter()
            .filter(|e| e.payin == payin)
            .cloned()
            .collect()
    }

    // ----- payin transfers -----

    /// Inserts a payin transfer with status `pre`.
    pub fn insert_payin_transfer(&mut self, new: NewPayinTransfer) -> PayinTransfer {
        let id = PayinTransferId(next(&mut self.seq.transfer));
        remember(&mut self.undo, |u| &mut u.transfers, &self.transfers, id);
        let transfer = PayinTransfer {
            id,
            payin: new.payin,
            payer: new.payer,
            recipient: new.recipient,
            destination: new.destination,
            context: new.context,
            amount: new.amount,
            unit_amount: new.unit_amount,
            n_units: new.n_units,
            period: new.period,
            team: new.team,
            status: Status::Pre,
            remote_id: None,
            error: None,
            fee: None,
            ctime: Utc::now(),
        };
        self.transfers.insert(id, transfer.clone());
        transfer
    }

    pub fn payin_transfer(&self, id: PayinTransferId) -> Result<&PayinTransfer> {
        self.transfers
            .get(&id)
            .ok_or(LedgerError::TransferNotFound(id.0))
    }

    /// Applies `patch` to the transfer unless its status already equals `status`.
    ///
    /// Returns the updated row, or `None` when nothing changed.
    pub fn update_transfer_unless_status(
        &mut self,
        id: PayinTransferId,
        status: Status,
        patch: impl FnOnce(&mut PayinTransfer),
    ) -> Result<Option<PayinTransfer>> {
        remember(&mut self.undo, |u| &mut u.transfers, &self.transfers, id);
        let transfer = self
            .transfers
            .get_mut(&id)
            .ok_or(LedgerError::TransferNotFound(id.0))?;
        if transfer.status == status {
            return Ok(None);
        }
        patch(transfer);
        transfer.status = status;
        Ok(Some(transfer.clone()))
    }

    pub fn append_transfer_event(
        &mut self,
        payin_transfer: PayinTransferId,
        status: Status,
        error: Option<String>,
    ) {
        self.transfer_events.push(PayinTransferEvent {
            payin_transfer,
            status,
            error,
            timestamp: Utc::now(),
        });
    }

    /// Events of one payin transfer, oldest first.
    pub fn transfer_events(&self, payin_transfer: PayinTransferId) -> Vec<PayinTransferEvent> {
        self.transfer_events
            .iter()
            .filter(|e| e.payin_transfer == payin_transfer)
            .cloned()
            .collect()
    }

    // ----- tips -----

    /// Creates the current tip for the pair, or changes its amount.
    ///
    /// An existing tip keeps its `paid_in_advance` and `is_funded`.
    pub fn set_tip(
        &mut self,
        tipper: ParticipantId,
        tippee: ParticipantId,
        amount: Money,
    ) -> Result<Tip> {
        self.participant(tipper)?;
        self.participant(tippee)?;
        remember(&mut self.undo, |u| &mut u.tips, &self.tips, (tipper, tippee));
        let now = Utc::now();
        if let Some(tip) = self.tips.get_mut(&(tipper, tippee)) {
            tip.amount = amount;
            tip.mtime = now;
            return Ok(tip.clone());
        }
        let tip = Tip {
            id: TipId(next(&mut self.seq.tip)),
            tipper,
            tippee,
            amount,
            paid_in_advance: None,
            is_funded: false,
            mtime: now,
        };
        self.tips.insert((tipper, tippee), tip.clone());
        Ok(tip)
    }

    pub fn tip(&self, tipper: ParticipantId, tippee: ParticipantId) -> Option<&Tip> {
        self.tips.get(&(tipper, tippee))
    }

    pub fn tip_mut(&mut self, tipper: ParticipantId, tippee: ParticipantId) -> Option<&mut Tip> {
        remember(&mut self.undo, |u| &mut u.tips, &self.tips, (tipper, tippee));
        self.tips.get_mut(&(tipper, tippee))
    }

    /// Current tips received by `tippee`.
    pub fn tips_to(&self, tippee: ParticipantId) -> impl Iterator<Item = &Tip> {
        self.tips.values().filter(move |t| t.tippee == tippee)
    }

    /// Current tips given by `tipper`.
    pub fn tips_from(&self, tipper: ParticipantId) -> impl Iterator<Item = &Tip> {
        self.tips
            .range((tipper, ParticipantId(0))..=(tipper, ParticipantId(u64::MAX)))
            .map(|(_, tip)| tip)
    }
}

/// In-process store. A single lock serializes every unit of work.
///
/// Units write in place; a failed unit is undone from the rows it touched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<LedgerState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn atomically<T, F>(&self, unit: F) -> Result<T>
    where
        F: FnOnce(&mut LedgerState) -> Result<T>,
    {
        let mut state = self.state.lock();
        state.begin();
        match unit(&mut state) {
            Ok(out) => {
                state.commit();
                Ok(out)
            }
            Err(e) => {
                state.rollback();
                Err(e)
            }
        }
    }

    fn read<T, F>(&self, query: F) -> T
    where
        F: FnOnce(&LedgerState) -> T,
    {
        let mut state = self.state.lock();
        state.rollback();
        query(&*state)
    }
}
