use std::future::Future;
use std::time::Duration;

use common::{Error, Result};

/// Run a broker call with an upper bound. Expiry becomes `Error::Timeout`,
/// which the resilience loop handles like a dropped session.
pub async fn within<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!("{what} did not complete within {limit:?}"))),
    }
}
