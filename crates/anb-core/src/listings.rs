//! Listing lifecycle: publish to the group, arm a single-shot expiry timer,
//! and take listings down on expiry or cancellation.
//!
//! A cancel and a firing timer can race; the status CAS in the store plus a
//! per-listing lock guarantee the takedown runs at most once. Message removal
//! failures are logged and never block the terminal transition.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    domain::{ChatId, ListingId, UserId},
    errors::Error,
    formatting,
    messaging::port::MessagingPort,
    render,
    store::{Listing, ListingStatus, RecordStore},
    Result,
};

/// One lock per listing, created on demand and dropped after takedown.
#[derive(Default)]
struct ListingLocks {
    inner: Mutex<HashMap<ListingId, Arc<Mutex<()>>>>,
}

impl ListingLocks {
    async fn acquire(&self, id: ListingId) -> Arc<Mutex<()>> {
        self.inner
            .lock()
            .await
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release(&self, id: ListingId) {
        self.inner.lock().await.remove(&id);
    }
}

pub struct ListingScheduler {
    store: Arc<RecordStore>,
    messenger: Arc<dyn MessagingPort>,
    target_group: ChatId,
    locks: ListingLocks,
    timers: Mutex<HashMap<ListingId, CancellationToken>>,
}

impl ListingScheduler {
    pub fn new(
        store: Arc<RecordStore>,
        messenger: Arc<dyn MessagingPort>,
        target_group: ChatId,
    ) -> Self {
        Self {
            store,
            messenger,
            target_group,
            locks: ListingLocks::default(),
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Post the owner's profile to the group as a fresh listing and arm its
    /// expiry timer. The profile is snapshotted by value: the listing shows it
    /// as it was at publish time, regardless of later edits.
    pub async fn publish(
        self: &Arc<Self>,
        owner_id: UserId,
        duration: Duration,
    ) -> Result<Listing> {
        let Some(profile) = self.store.get_profile(owner_id).await else {
            return Err(Error::NotFound(format!(
                "no profile for owner {}",
                owner_id.0
            )));
        };

        let posted_at = Utc::now();
        let expires_at = posted_at
            + chrono::Duration::from_std(duration)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));

        let media_messages = if profile.media.is_empty() {
            Vec::new()
        } else {
            self.messenger
                .send_media_group(self.target_group, &profile.media)
                .await?
        };

        let html = formatting::clip(
            &render::group_listing(&profile, posted_at, expires_at),
            self.messenger.capabilities().max_message_len,
        );
        let message = match self.messenger.send_html(self.target_group, &html).await {
            Ok(m) => m,
            Err(e) => {
                self.cleanup_messages(&media_messages).await;
                return Err(e);
            }
        };

        let listing = match self
            .store
            .insert_listing(
                owner_id,
                profile,
                message,
                media_messages.clone(),
                posted_at,
                duration,
            )
            .await
        {
            Ok(l) => l,
            Err(e) => {
                // Lost a publish race; take the just-posted messages back down.
                let mut posted = media_messages;
                posted.push(message);
                self.cleanup_messages(&posted).await;
                return Err(e);
            }
        };

        self.arm(&listing).await;
        info!(
            listing_id = listing.id.0,
            owner_id = owner_id.0,
            hours = duration.as_secs() / 3600,
            "listing published"
        );
        Ok(listing)
    }

    /// Cancel the owner's active listing, if any. Disarms the timer first so
    /// an imminent expiry cannot double-fire the takedown.
    pub async fn cancel(self: &Arc<Self>, owner_id: UserId) -> Result<bool> {
        let Some(listing) = self.store.active_listing_for(owner_id).await else {
            return Ok(false);
        };

        if let Some(token) = self.timers.lock().await.remove(&listing.id) {
            token.cancel();
        }
        Ok(self.take_down(listing.id, ListingStatus::Cancelled).await)
    }

    pub async fn active_count(&self) -> usize {
        self.store.get_active_listings().await.len()
    }

    async fn arm(self: &Arc<Self>, listing: &Listing) {
        let token = CancellationToken::new();
        self.timers.lock().await.insert(listing.id, token.clone());

        let this = Arc::clone(self);
        let id = listing.id;
        let duration = listing.duration;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    this.timers.lock().await.remove(&id);
                    this.take_down(id, ListingStatus::Expired).await;
                }
            }
        });
    }

    /// Remove the listing's messages from the group, then CAS the status.
    /// Returns false when another takedown already won.
    async fn take_down(&self, id: ListingId, to: ListingStatus) -> bool {
        let lock = self.locks.acquire(id).await;
        let _guard = lock.lock().await;

        let Some(listing) = self.store.get_listing(id).await else {
            self.locks.release(id).await;
            return false;
        };
        if listing.status != ListingStatus::Active {
            self.locks.release(id).await;
            return false;
        }

        let mut messages = listing.media_messages.clone();
        messages.push(listing.message);
        self.cleanup_messages(&messages).await;

        let transitioned = self.store.transition_listing(id, to).await;
        if transitioned {
            info!(listing_id = id.0, status = ?to, "listing taken down");
        }
        self.locks.release(id).await;
        transitioned
    }

    async fn cleanup_messages(&self, messages: &[crate::domain::MessageRef]) {
        for msg in messages {
            if let Err(e) = self.messenger.delete_message(*msg).await {
                warn!(
                    chat_id = msg.chat_id.0,
                    message_id = msg.message_id.0,
                    error = %e,
                    "failed to delete listing message"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Contact, MediaKind, MediaRef, Profile};
    use crate::test_support::FakeMessenger;

    const GROUP: ChatId = ChatId(-1000);

    fn profile(owner: i64, media: usize) -> Profile {
        let now = Utc::now();
        Profile {
            owner_id: UserId(owner),
            display_name: format!("Owner {owner}"),
            offerings: vec![],
            about_text: None,
            rates_text: None,
            disclaimer_text: "DM first".to_string(),
            contact: Contact::Handle("owner".to_string()),
            social_links: None,
            media: (0..media)
                .map(|i| MediaRef {
                    kind: MediaKind::Image,
                    file_id: format!("img-{i}"),
                })
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    fn scheduler() -> (Arc<ListingScheduler>, Arc<RecordStore>, Arc<FakeMessenger>) {
        let store = Arc::new(RecordStore::new());
        let messenger = Arc::new(FakeMessenger::new());
        let scheduler = Arc::new(ListingScheduler::new(
            store.clone(),
            messenger.clone(),
            GROUP,
        ));
        (scheduler, store, messenger)
    }

    async fn settle() {
        // Let the spawned timer task run after the clock jump.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publish_posts_media_then_text() {
        let (scheduler, store, messenger) = scheduler();
        store.put_profile(profile(1, 2)).await;
        scheduler
            .publish(UserId(1), Duration::from_secs(7200))
            .await
            .unwrap();

        let sent = messenger.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].text.contains("img-0"));
        assert!(sent[1].text.contains("img-1"));
        assert!(sent[2].text.contains("Owner 1"));
        assert!(sent.iter().all(|s| s.chat_id == GROUP));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_deletes_all_messages_and_marks_expired() {
        let (scheduler, store, messenger) = scheduler();
        store.put_profile(profile(1, 2)).await;
        let listing = scheduler
            .publish(UserId(1), Duration::from_secs(3600))
            .await
            .unwrap();

        // Let the spawned timer task register its sleep before the jump.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(3601)).await;
        settle().await;

        assert_eq!(
            store.get_listing(listing.id).await.unwrap().status,
            ListingStatus::Expired
        );
        // Two media messages plus the listing text.
        assert_eq!(messenger.deleted().len(), 3);
        assert_eq!(scheduler.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_disarms_the_timer() {
        let (scheduler, store, messenger) = scheduler();
        store.put_profile(profile(1, 0)).await;
        let listing = scheduler
            .publish(UserId(1), Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(scheduler.cancel(UserId(1)).await.unwrap());
        assert_eq!(
            store.get_listing(listing.id).await.unwrap().status,
            ListingStatus::Cancelled
        );
        let deleted_after_cancel = messenger.deleted().len();

        // The timer must not fire a second takedown.
        tokio::time::advance(Duration::from_secs(7200)).await;
        settle().await;
        assert_eq!(messenger.deleted().len(), deleted_after_cancel);
        assert_eq!(
            store.get_listing(listing.id).await.unwrap().status,
            ListingStatus::Cancelled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_without_active_listing_is_a_noop() {
        let (scheduler, _store, _messenger) = scheduler();
        assert!(!scheduler.cancel(UserId(9)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn second_publish_for_same_owner_conflicts() {
        let (scheduler, store, messenger) = scheduler();
        store.put_profile(profile(1, 0)).await;
        scheduler
            .publish(UserId(1), Duration::from_secs(3600))
            .await
            .unwrap();

        let err = scheduler
            .publish(UserId(1), Duration::from_secs(3600))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        // The losing publish removed the message it had already posted.
        assert_eq!(messenger.deleted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_failure_still_reaches_terminal_status() {
        let (scheduler, store, messenger) = scheduler();
        store.put_profile(profile(1, 0)).await;
        let listing = scheduler
            .publish(UserId(1), Duration::from_secs(60))
            .await
            .unwrap();

        messenger.fail_deletes();
        // Let the spawned timer task register its sleep before the jump.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        settle().await;

        assert_eq!(
            store.get_listing(listing.id).await.unwrap().status,
            ListingStatus::Expired
        );
    }

    #[tokio::test(start_paused = true)]
    async fn owner_can_relist_after_expiry() {
        let (scheduler, store, _messenger) = scheduler();
        store.put_profile(profile(1, 0)).await;
        scheduler
            .publish(UserId(1), Duration::from_secs(60))
            .await
            .unwrap();
        // Let the spawned timer task register its sleep before the jump.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        settle().await;

        scheduler
            .publish(UserId(1), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(scheduler.active_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_without_profile_is_not_found() {
        let (scheduler, _store, messenger) = scheduler();
        let err = scheduler
            .publish(UserId(404), Duration::from_secs(3600))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_group_send_leaves_no_listing_behind() {
        let (scheduler, store, messenger) = scheduler();
        store.put_profile(profile(1, 0)).await;
        messenger.fail_sends();

        let err = scheduler
            .publish(UserId(1), Duration::from_secs(3600))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Delivery(_)));
        assert_eq!(scheduler.active_count().await, 0);
        assert!(store.active_listing_for(UserId(1)).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_listing_text_is_clipped_to_the_transport_limit() {
        let (scheduler, store, messenger) = scheduler();
        let mut p = profile(1, 0);
        p.about_text = Some("x".repeat(10_000));
        store.put_profile(p).await;

        scheduler
            .publish(UserId(1), Duration::from_secs(3600))
            .await
            .unwrap();

        let max = messenger.capabilities().max_message_len;
        let text = messenger.last_text().unwrap();
        assert!(text.chars().count() <= max);
        assert!(text.ends_with('…'));
    }
}
