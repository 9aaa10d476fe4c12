//! Optional deadlines for database round trips

use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

/// Run `fut`, failing with `Error::Timeout` once `deadline` elapses
///
/// `None` waits as long as the transport does.
pub(crate) async fn with_deadline<T, F>(
    deadline: Option<Duration>,
    operation: &str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            Error::Timeout(format!("{} did not complete within {:?}", operation, limit))
        })?,
        None => fut.await,
    }
}
