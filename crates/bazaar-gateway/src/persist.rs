use bazaar_db::ChatStore;

use crate::Gateway;
use crate::error::ChatError;

impl Gateway {
    /// Run a blocking store call off the async runtime, bounded by the
    /// configured persistence timeout.
    ///
    /// A timed-out call is abandoned, not cancelled: a write that already
    /// reached the store still lands.
    pub async fn persist<T, F>(&self, op: F) -> Result<T, ChatError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ChatStore) -> anyhow::Result<T> + Send + 'static,
    {
        let store = self.store().clone();
        let limit = self.settings().persist_timeout;

        let task = tokio::task::spawn_blocking(move || op(store.as_ref()));

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result.map_err(ChatError::from),
            Ok(Err(e)) => Err(ChatError::Persistence(format!("spawn_blocking join error: {e}"))),
            Err(_) => Err(ChatError::Timeout(limit)),
        }
    }
}
