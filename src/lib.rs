//! # Payin Ledger
//!
//! A settlement ledger for charges ("payins") and their allocations to
//! recipients ("payin transfers"). It records every status a payment
//! processor reports, and keeps three cached numbers consistent with the
//! ledger: a recipient's `receiving`, a donor's `giving`, and a recurring
//! donation's `paid_in_advance`.
//!
//! ## Design Principles
//!
//! - **Exact money**: currency-tagged `rust_decimal` amounts, no implicit conversion
//! - **Idempotent updates**: repeating a status report writes nothing
//! - **Atomic units**: a transfer's success and its cascade land together or not at all
//! - **Derived aggregates**: recomputed from the current tips, never patched
//!
//! ## Example
//!
//! ```no_run
//! use payin_ledger::Replay;
//! use std::io::Cursor;
//!
//! let csv = "type,id,party,other,amount\nparticipant,1,,,0.00 EUR\n";
//! let mut replay = Replay::new();
//! replay.process_csv(Cursor::new(csv)).unwrap();
//! replay.write_output(std::io::stdout()).unwrap();
//! ```

pub mod aggregates;
pub mod convert;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod model;
pub mod money;
pub mod payin;
pub mod replay;
pub mod status;
pub mod store;
pub mod transfer;

pub use convert::{Converter, FixedRates};
pub use error::{LedgerError, Result};
pub use guard::AccountStatus;
pub use ledger::Ledger;
pub use model::{
    DestinationId, Participant, ParticipantId, PaymentAccount, PaymentRoute, Payin, PayinEvent,
    PayinId, PayinTransfer, PayinTransferEvent, PayinTransferId, Period, RouteId, Tip, TipId,
};
pub use money::{Currency, Money};
pub use payin::{PayinUpdate, PreparePayin};
pub use replay::Replay;
pub use status::{RouteStatus, Status};
pub use store::{LedgerState, MemoryStore, Store};
pub use transfer::{PayinTransferUpdate, PreparePayinTransfer};
