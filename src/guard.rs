//! Account-status guard consulted before any ledger write.

use crate::error::{LedgerError, Result};
use crate::model::ParticipantId;
use crate::store::LedgerState;

/// Source of participants' account status.
pub trait AccountStatus {
    fn is_suspended(&self, participant: ParticipantId) -> Result<bool>;
}

impl AccountStatus for LedgerState {
    fn is_suspended(&self, participant: ParticipantId) -> Result<bool> {
        Ok(self.participant(participant)?.is_suspended)
    }
}

/// Fails with `AccountSuspended` if the payer is suspended.
pub fn ensure_payer_active(accounts: &impl AccountStatus, payer: ParticipantId) -> Result<()> {
    if accounts.is_suspended(payer)? {
        return Err(LedgerError::AccountSuspended(payer.0));
    }
    Ok(())
}

/// Fails with `RecipientAccountSuspended` if the recipient is suspended.
pub fn ensure_recipient_active(
    accounts: &impl AccountStatus,
    recipient: ParticipantId,
) -> Result<()> {
    if accounts.is_suspended(recipient)? {
        return Err(LedgerError::RecipientAccountSuspended(recipient.0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    #[test]
    fn test_suspension_is_read_from_participant() {
        let mut state = LedgerState::new();
        let p = state
            .insert_participant(Currency::EUR, "0 EUR".parse().unwrap())
            .id;

        assert!(ensure_payer_active(&state, p).is_ok());
        assert!(ensure_recipient_active(&state, p).is_ok());

        state.participant_mut(p).unwrap().is_suspended = true;

        assert!(matches!(
            ensure_payer_active(&state, p),
            Err(LedgerError::AccountSuspended(1))
        ));
        assert!(matches!(
            ensure_recipient_active(&state, p),
            Err(LedgerError::RecipientAccountSuspended(1))
        ));
    }

    #[test]
    fn test_unknown_participant() {
        let state = LedgerState::new();
        assert!(matches!(
            ensure_payer_active(&state, ParticipantId(4)),
            Err(LedgerError::ParticipantNotFound(4))
        ));
    }
}
