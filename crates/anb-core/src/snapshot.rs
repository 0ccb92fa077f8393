//! Aggregate "who is available" snapshot posted into the group on demand.
//!
//! Every request posts a fresh message (no coalescing); each one carries its
//! own auto-delete timer.

use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use crate::{
    domain::{ChatId, MessageRef},
    formatting,
    messaging::port::MessagingPort,
    render,
    store::RecordStore,
    Result,
};

pub struct SnapshotPublisher {
    store: Arc<RecordStore>,
    messenger: Arc<dyn MessagingPort>,
    target_group: ChatId,
    ttl: Duration,
}

impl SnapshotPublisher {
    pub fn new(
        store: Arc<RecordStore>,
        messenger: Arc<dyn MessagingPort>,
        target_group: ChatId,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            messenger,
            target_group,
            ttl,
        }
    }

    /// Post the current roster of active listings and schedule its removal.
    pub async fn publish(&self) -> Result<MessageRef> {
        let listings = self.store.get_active_listings().await;
        let ttl_minutes = (self.ttl.as_secs() / 60).max(1);
        let html = formatting::clip(
            &render::snapshot(&listings, ttl_minutes),
            self.messenger.capabilities().max_message_len,
        );

        let msg = self.messenger.send_html(self.target_group, &html).await?;
        info!(
            listings = listings.len(),
            message_id = msg.message_id.0,
            "snapshot posted"
        );

        let messenger = Arc::clone(&self.messenger);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = messenger.delete_message(msg).await {
                warn!(message_id = msg.message_id.0, error = %e, "failed to delete snapshot");
            }
        });
        Ok(msg)
    }
}
