//! CSV replay of ledger commands.
//!
//! Reads setup rows (participants, routes, tips, rates) and processor
//! callbacks (payin and transfer updates) in order, applies them to an
//! in-memory ledger, and writes the resulting participant aggregates.
//!
//! Rows that fail are logged at warn level and skipped. An invariant
//! violation stops the replay.

use crate::convert::FixedRates;
use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::model::{DestinationId, ParticipantId, PayinId, PayinTransferId, Period, RouteId};
use crate::money::{Currency, Money};
use crate::payin::PayinUpdate;
use crate::status::{RouteStatus, Status};
use crate::store::MemoryStore;
use crate::transfer::{PayinTransferUpdate, PreparePayinTransfer};
use csv::{ReaderBuilder, Trim};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::str::FromStr;

/// Raw command record as read from CSV.
///
/// Column meaning depends on `type`; unused columns may be empty or absent.
#[derive(Debug, Default, Deserialize)]
pub struct CommandRecord {
    /// participant, suspend, route, destination, tip, rate, payin,
    /// payin_update, transfer, transfer_update
    #[serde(rename = "type")]
    pub kind: String,

    /// Local reference of the row being created or updated
    #[serde(default)]
    pub id: Option<u64>,

    #[serde(default)]
    pub party: Option<String>,

    #[serde(default)]
    pub other: Option<String>,

    #[serde(default)]
    pub amount: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub remote_id: Option<String>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub unit_amount: Option<String>,

    #[serde(default)]
    pub team: Option<u64>,

    /// weekly, monthly or yearly
    #[serde(default)]
    pub period: Option<String>,
}

fn invalid(row: usize, message: impl Into<String>) -> LedgerError {
    LedgerError::InvalidRecord {
        row,
        message: message.into(),
    }
}

/// Returns the trimmed field, treating empty as absent.
fn field(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required<'a>(value: &'a Option<String>, name: &str, row: usize) -> Result<&'a str> {
    field(value).ok_or_else(|| invalid(row, format!("missing {}", name)))
}

fn parse_ref(value: &Option<String>, name: &str, row: usize) -> Result<u64> {
    let raw = required(value, name, row)?;
    raw.parse()
        .map_err(|_| invalid(row, format!("{} is not a number: {:?}", name, raw)))
}

fn parse_money(value: &Option<String>) -> Result<Option<Money>> {
    field(value).map(Money::from_str).transpose()
}

/// Replays command rows against a fresh in-memory ledger.
pub struct Replay {
    ledger: Ledger<MemoryStore, FixedRates>,

    /// Local participant references, ordered for output.
    participants: BTreeMap<u64, ParticipantId>,
    routes: HashMap<u64, RouteId>,
    destinations: HashMap<ParticipantId, DestinationId>,
    payins: HashMap<u64, PayinId>,
    transfers: HashMap<u64, PayinTransferId>,
}

impl Replay {
    pub fn new() -> Self {
        Replay {
            ledger: Ledger::new(MemoryStore::new(), FixedRates::new()),
            participants: BTreeMap::new(),
            routes: HashMap::new(),
            destinations: HashMap::new(),
            payins: HashMap::new(),
            transfers: HashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Ledger<MemoryStore, FixedRates> {
        &self.ledger
    }

    /// Processes command rows from a CSV reader in streaming fashion.
    pub fn process_csv<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        for (row_idx, result) in csv_reader.deserialize::<CommandRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warn!("Row {}: CSV parse error: {}", row_num, e);
                    continue;
                }
            };

            match self.apply(&record, row_num) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Row {}: {}", row_num, e),
            }
        }

        Ok(())
    }

    /// Applies a single command row.
    fn apply(&mut self, record: &CommandRecord, row: usize) -> Result<()> {
        match record.kind.trim().to_lowercase().as_str() {
            "participant" => self.add_participant(record, row),
            "suspend" => {
                let p = self.participant(self.local_id(record, row)?, row)?;
                self.ledger.set_suspended(p, true)
            }
            "route" => self.add_route(record, row),
            "destination" => {
                let owner = self.party(&record.party, "party", row)?;
                let destination = self.ledger.add_destination(owner)?;
                self.destinations.insert(owner, destination);
                Ok(())
            }
            "tip" => {
                let tipper = self.party(&record.party, "party", row)?;
                let tippee = self.party(&record.other, "other", row)?;
                let amount = Money::from_str(required(&record.amount, "amount", row)?)?;
                self.ledger.set_tip(tipper, tippee, amount)?;
                Ok(())
            }
            "rate" => {
                let from = Currency::from_str(required(&record.party, "party", row)?)?;
                let to = Currency::from_str(required(&record.other, "other", row)?)?;
                let raw = required(&record.amount, "amount", row)?;
                let rate = Decimal::from_str(raw)
                    .map_err(|_| invalid(row, format!("invalid rate {:?}", raw)))?;
                self.ledger.converter_mut().set_rate(from, to, rate);
                Ok(())
            }
            "payin" => self.prepare_payin(record, row),
            "payin_update" => self.update_payin(record, row),
            "transfer" => self.prepare_transfer(record, row),
            "transfer_update" => self.update_transfer(record, row),
            other => Err(invalid(row, format!("unknown command type {:?}", other))),
        }
    }

    fn local_id(&self, record: &CommandRecord, row: usize) -> Result<u64> {
        record.id.ok_or_else(|| invalid(row, "missing id"))
    }

    fn participant(&self, local: u64, row: usize) -> Result<ParticipantId> {
        self.participants
            .get(&local)
            .copied()
            .ok_or_else(|| invalid(row, format!("unknown participant {}", local)))
    }

    fn party(&self, value: &Option<String>, name: &str, row: usize) -> Result<ParticipantId> {
        self.participant(parse_ref(value, name, row)?, row)
    }

    fn add_participant(&mut self, record: &CommandRecord, row: usize) -> Result<()> {
        let local = self.local_id(record, row)?;
        if self.participants.contains_key(&local) {
            return Err(invalid(row, format!("duplicate participant {}", local)));
        }
        let taking = Money::from_str(required(&record.amount, "amount", row)?)?;
        let id = self.ledger.add_participant(taking.currency, taking)?;
        self.participants.insert(local, id);
        Ok(())
    }

    fn add_route(&mut self, record: &CommandRecord, row: usize) -> Result<()> {
        let local = self.local_id(record, row)?;
        let owner = self.party(&record.party, "party", row)?;
        let status = RouteStatus::from_str(required(&record.status, "status", row)?)?;
        let route = self.ledger.add_route(owner, status)?;
        self.routes.insert(local, route);
        Ok(())
    }

    fn prepare_payin(&mut self, record: &CommandRecord, row: usize) -> Result<()> {
        let local = self.local_id(record, row)?;
        if self.payins.contains_key(&local) {
            return Err(invalid(row, format!("duplicate payin {}", local)));
        }
        let payer = self.party(&record.party, "party", row)?;
        let route_ref = parse_ref(&record.other, "other", row)?;
        let route = *self
            .routes
            .get(&route_ref)
            .ok_or_else(|| invalid(row, format!("unknown route {}", route_ref)))?;
        let amount = Money::from_str(required(&record.amount, "amount", row)?)?;

        let payin = self.ledger.prepare_payin(payer, amount, route)?;
        debug!("Row {}: payin {} is ledger payin {}", row, local, payin.id);
        self.payins.insert(local, payin.id);
        Ok(())
    }

    fn update_payin(&mut self, record: &CommandRecord, row: usize) -> Result<()> {
        let local = self.local_id(record, row)?;
        let payin = *self
            .payins
            .get(&local)
            .ok_or_else(|| invalid(row, format!("unknown payin {}", local)))?;

        let status = Status::from_str(required(&record.status, "status", row)?)?;
        let mut params = PayinUpdate::new(payin, status);
        params.remote_id = field(&record.remote_id).map(String::from);
        params.error = field(&record.error).map(String::from);
        params.amount_settled = parse_money(&record.amount)?;

        self.ledger.update_payin(params)?;
        Ok(())
    }

    fn prepare_transfer(&mut self, record: &CommandRecord, row: usize) -> Result<()> {
        let local = self.local_id(record, row)?;
        if self.transfers.contains_key(&local) {
            return Err(invalid(row, format!("duplicate transfer {}", local)));
        }
        let recipient = self.party(&record.party, "party", row)?;
        let payin_ref = parse_ref(&record.other, "other", row)?;
        let payin = *self
            .payins
            .get(&payin_ref)
            .ok_or_else(|| invalid(row, format!("unknown payin {}", payin_ref)))?;
        let destination = *self
            .destinations
            .get(&recipient)
            .ok_or_else(|| invalid(row, format!("participant {} has no destination", recipient)))?;
        let team = record
            .team
            .map(|local| self.participant(local, row))
            .transpose()?;

        let params = PreparePayinTransfer {
            payin,
            recipient,
            destination,
            context: if team.is_some() {
                "team-donation".to_string()
            } else {
                "personal-donation".to_string()
            },
            amount: Money::from_str(required(&record.amount, "amount", row)?)?,
            unit_amount: parse_money(&record.unit_amount)?,
            period: field(&record.period).map(Period::from_str).transpose()?,
            team,
        };
        let transfer = self.ledger.prepare_payin_transfer(params)?;
        self.transfers.insert(local, transfer.id);
        Ok(())
    }

    fn update_transfer(&mut self, record: &CommandRecord, row: usize) -> Result<()> {
        let local = self.local_id(record, row)?;
        let transfer = *self
            .transfers
            .get(&local)
            .ok_or_else(|| invalid(row, format!("unknown transfer {}", local)))?;

        let mut params = PayinTransferUpdate::new(
            transfer,
            Status::from_str(required(&record.status, "status", row)?)?,
        );
        params.remote_id = field(&record.remote_id).map(String::from);
        params.error = field(&record.error).map(String::from);
        params.amount = parse_money(&record.amount)?;

        self.ledger.update_payin_transfer(params)?;
        Ok(())
    }

    /// Writes participant aggregates to CSV, ordered by local participant id.
    pub fn write_output<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["participant", "receiving", "npatrons", "giving"])?;

        for (local, id) in &self.participants {
            let p = self.ledger.participant(*id)?;
            csv_writer.write_record([
                local.to_string(),
                p.receiving.to_string(),
                p.npatrons.to_string(),
                p.giving.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}

impl Default for Replay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SETUP: &str = "type,id,party,other,amount,status,remote_id,error,unit_amount,team
participant,1,,,0.00 USD
participant,2,,,0.00 USD
route,1,1,,,chargeable
destination,,2
tip,,1,2,1.00 USD
payin,1,1,1,5.00 USD
payin_update,1,,,,succeeded,ch_1
transfer,1,2,1,5.00 USD,,,,1.00 USD
";

    fn replay(csv: &str) -> Replay {
        let mut replay = Replay::new();
        replay.process_csv(Cursor::new(csv)).unwrap();
        replay
    }

    fn output(replay: &Replay) -> String {
        let mut out = Vec::new();
        replay.write_output(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_setup_rows() {
        let r = replay(SETUP);
        let payin = r.ledger().payin(PayinId(1)).unwrap();
        assert_eq!(payin.status, Status::Succeeded);
        assert_eq!(payin.remote_id.as_deref(), Some("ch_1"));

        let pt = r.ledger().payin_transfer(PayinTransferId(1)).unwrap();
        assert_eq!(pt.n_units, Some(5));
        assert_eq!(pt.status, Status::Pre);
    }

    #[test]
    fn test_successful_transfer_updates_aggregates() {
        let csv = format!("{}transfer_update,1,,,,succeeded,tr_1\n", SETUP);
        let out = output(&replay(&csv));

        assert!(out.starts_with("participant,receiving,npatrons,giving"));
        assert!(out.contains("1,0.00 USD,0,1.00 USD"));
        assert!(out.contains("2,1.00 USD,1,0.00 USD"));
    }

    #[test]
    fn test_transfer_period_column() {
        let csv = "type,id,party,other,amount,status,remote_id,error,unit_amount,team,period
participant,1,,,0.00 USD
participant,2,,,0.00 USD
route,1,1,,,chargeable
destination,,2
payin,1,1,1,10.00 USD
transfer,1,2,1,5.00 USD,,,,1.00 USD,,weekly
transfer,2,2,1,5.00 USD,,,,1.00 USD,,fortnightly
";
        let r = replay(csv);
        let pt = r.ledger().payin_transfer(PayinTransferId(1)).unwrap();
        assert_eq!(pt.period, Some(Period::Weekly));
        assert!(r.ledger().payin_transfer(PayinTransferId(2)).is_err());
    }

    #[test]
    fn test_duplicate_callbacks_are_harmless() {
        let csv = format!(
            "{}transfer_update,1,,,,succeeded,tr_1\ntransfer_update,1,,,,succeeded,tr_1\n",
            SETUP
        );
        let r = replay(&csv);
        let tip = r.ledger().tip(ParticipantId(1), ParticipantId(2)).unwrap();
        assert_eq!(tip.paid_in_advance, Some("5.00 USD".parse().unwrap()));
        assert_eq!(r.ledger().transfer_events(PayinTransferId(1)).len(), 2);
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let csv = format!(
            "{}bogus,1\npayin_update,99,,,,failed\ntransfer_update,1,,,,exploded\n",
            SETUP
        );
        let r = replay(&csv);
        let pt = r.ledger().payin_transfer(PayinTransferId(1)).unwrap();
        assert_eq!(pt.status, Status::Pre);
    }

    #[test]
    fn test_suspended_recipient_row_is_skipped() {
        let csv = "type,id,party,other,amount,status
participant,1,,,0.00 EUR
participant,2,,,0.00 EUR
route,1,1,,,pending
destination,,2
suspend,2
payin,1,1,1,5.00 EUR
transfer,1,2,1,5.00 EUR
";
        let r = replay(csv);
        assert!(r.ledger().payin(PayinId(1)).is_ok());
        assert!(r.ledger().payin_transfer(PayinTransferId(1)).is_err());
    }

    #[test]
    fn test_invariant_violation_stops_replay() {
        // No tip from 1 to 2.
        let csv = "type,id,party,other,amount,status
participant,1,,,0.00 EUR
participant,2,,,0.00 EUR
route,1,1,,,pending
destination,,2
payin,1,1,1,5.00 EUR
transfer,1,2,1,5.00 EUR
transfer_update,1,,,,succeeded
";
        let mut r = Replay::new();
        let err = r.process_csv(Cursor::new(csv)).unwrap_err();
        assert!(err.is_fatal());

        // The failed unit left nothing behind.
        let pt = r.ledger().payin_transfer(PayinTransferId(1)).unwrap();
        assert_eq!(pt.status, Status::Pre);
        assert_eq!(r.ledger().transfer_events(PayinTransferId(1)).len(), 1);
    }

    #[test]
    fn test_rates_apply_to_aggregates() {
        let csv = "type,id,party,other,amount,status
rate,,EUR,USD,1.25
participant,1,,,0.00 USD
participant,2,,,0.00 EUR
route,1,1,,,pending
destination,,2
tip,,1,2,2.00 EUR
payin,1,1,1,10.00 USD
transfer,1,2,1,10.00 USD
transfer_update,1,,,,succeeded
";
        let out = output(&replay(csv));
        assert!(out.contains("1,0.00 USD,0,2.50 USD"));
        assert!(out.contains("2,2.00 EUR,1,0.00 EUR"));
    }
}
