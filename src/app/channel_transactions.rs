use crate::{
    app::transaction_layer::TransactionLayer,
    codec::CallSet,
    lifecycle::LifecycleNotification,
};
use std::future::pending;
use tokio::sync::mpsc;

/// Transaction layer driven by hand: submitted call sets come out of a [`TransactionFeed`]
/// and notifications are pushed back through it.
pub struct ChannelTransactions {
    submitted: mpsc::UnboundedSender<CallSet>,
    notifications: mpsc::UnboundedReceiver<LifecycleNotification>,
}

pub struct TransactionFeed {
    pub submitted: mpsc::UnboundedReceiver<CallSet>,
    notifications: mpsc::UnboundedSender<LifecycleNotification>,
}

impl ChannelTransactions {
    pub fn new() -> (Self, TransactionFeed) {
        let (submitted_tx, submitted_rx) = mpsc::unbounded_channel();
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        let layer = Self {
            submitted: submitted_tx,
            notifications: notification_rx,
        };
        let feed = TransactionFeed {
            submitted: submitted_rx,
            notifications: notification_tx,
        };
        (layer, feed)
    }
}

impl TransactionFeed {
    pub fn notify(&self, notification: LifecycleNotification) {
        if self.notifications.send(notification).is_err() {
            tracing::warn!("transaction layer dropped; notification discarded");
        }
    }
}

impl TransactionLayer for ChannelTransactions {
    async fn submit(&mut self, calls: CallSet) -> anyhow::Result<()> {
        self.submitted
            .send(calls)
            .map_err(|_| anyhow::anyhow!("transaction feed closed"))
    }

    async fn next_notification(&mut self) -> anyhow::Result<LifecycleNotification> {
        match self.notifications.recv().await {
            Some(notification) => Ok(notification),
            // a closed feed simply never reports again
            None => pending().await,
        }
    }
}
