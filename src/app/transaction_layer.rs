use crate::{
    codec::CallSet,
    lifecycle::LifecycleNotification,
};

/// Submits call sets and reports how the resulting transaction fares.
pub trait TransactionLayer {
    /// Hands `calls` off for signing and broadcast. Must return once they are handed off,
    /// without waiting for confirmation; the session runtime handles nothing else meanwhile.
    /// Progress is reported through [`TransactionLayer::next_notification`].
    fn submit(&mut self, calls: CallSet) -> impl Future<Output = anyhow::Result<()>>;

    fn next_notification(
        &mut self,
    ) -> impl Future<Output = anyhow::Result<LifecycleNotification>>;
}
