//! Identity checks run after every (re)connect. A failure here means
//! real-money exposure and is never retried.

use std::time::Duration;

use tracing::{error, info};

use common::{Broker, Error, Result};

use crate::deadline::within;

/// Paper account ids always begin with this prefix (e.g. `DU12345`).
pub const PAPER_ACCOUNT_PREFIX: char = 'D';

/// Every managed account must be a paper account. An empty list means the
/// broker session is not ready yet, which is a connectivity problem.
pub fn verify_paper_accounts(accounts: &[String]) -> Result<()> {
    if accounts.is_empty() {
        return Err(Error::Connectivity(
            "no managed accounts reported; is the broker fully initialized?".into(),
        ));
    }
    if let Some(live) = accounts
        .iter()
        .find(|acc| !acc.starts_with(PAPER_ACCOUNT_PREFIX))
    {
        error!(account = %live, "Live account detected, refusing to trade");
        return Err(Error::Safety(format!("live account detected ({live})")));
    }
    info!(accounts = ?accounts, "Verified paper trading account(s)");
    Ok(())
}

/// The broker must report an account type.
pub fn verify_account_type(account_type: Option<&str>) -> Result<()> {
    match account_type.map(str::trim) {
        Some(kind) if !kind.is_empty() => {
            info!(account_type = %kind, "Account type verified");
            Ok(())
        }
        _ => {
            error!("Broker did not report an account type");
            Err(Error::Safety("could not verify account type from broker".into()))
        }
    }
}

pub async fn verify_account(broker: &dyn Broker, timeout: Duration) -> Result<()> {
    let accounts = within(timeout, "managed_accounts", broker.managed_accounts()).await?;
    verify_paper_accounts(&accounts)?;
    let account_type = within(timeout, "account_type", broker.account_type()).await?;
    verify_account_type(account_type.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_accounts_pass() {
        assert!(verify_paper_accounts(&["DU12345".into(), "DF999".into()]).is_ok());
    }

    #[test]
    fn any_live_account_is_fatal() {
        let err = verify_paper_accounts(&["DU12345".into(), "U7654321".into()]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn no_accounts_is_retryable() {
        let err = verify_paper_accounts(&[]).unwrap_err();
        assert!(err.is_connectivity());
        assert!(!err.is_fatal());
    }

    #[test]
    fn account_type_must_be_present() {
        assert!(verify_account_type(Some("CASH")).is_ok());
        assert!(verify_account_type(Some("  ")).unwrap_err().is_fatal());
        assert!(verify_account_type(None).unwrap_err().is_fatal());
    }
}
