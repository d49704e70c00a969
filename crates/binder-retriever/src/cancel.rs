//! Cancellation of external calls

use std::future::Future;

use tokio_util::sync::CancellationToken;

use binder_common::{Error, Result};

/// Run `fut` unless `token` is or becomes cancelled
///
/// The token is checked before the call starts and raced against it while it
/// runs; a cancelled run fails with `Error::Cancelled` naming `stage`.
pub async fn cancellable<T, F>(token: &CancellationToken, stage: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(Error::cancelled(stage));
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::cancelled(stage)),
        result = fut => result,
    }
}
