use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{ListingId, MessageRef, UserId},
    errors::Error,
    profile::Profile,
    Result,
};

/// Lifecycle status of a published listing. Terminal once it leaves `Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingStatus {
    Active,
    Expired,
    Cancelled,
}

/// A time-boxed public instance of a profile.
///
/// `profile` is a snapshot by value: later profile edits do not alter a
/// listing already published. `expires_at` is fixed at creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub owner_id: UserId,
    pub profile: Profile,
    pub message: MessageRef,
    /// Companion media-group messages posted alongside the listing text.
    pub media_messages: Vec<MessageRef>,
    pub posted_at: DateTime<Utc>,
    pub duration: Duration,
    pub expires_at: DateTime<Utc>,
    pub status: ListingStatus,
}

#[derive(Default)]
struct StoreState {
    profiles: HashMap<UserId, Profile>,
    listings: HashMap<ListingId, Listing>,
    next_listing_id: u64,
}

/// Owner-keyed in-memory record store.
///
/// Pure data access: referential consistency only, no lifecycle rules. Timer
/// and cascade logic live in the listing scheduler / service.
#[derive(Default)]
pub struct RecordStore {
    state: Mutex<StoreState>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create-or-replace the owner's profile. Keeps the original `created_at`
    /// on replace and bumps `updated_at`.
    pub async fn put_profile(&self, mut profile: Profile) {
        let mut st = self.state.lock().await;
        let now = Utc::now();
        if let Some(existing) = st.profiles.get(&profile.owner_id) {
            profile.created_at = existing.created_at;
        }
        profile.updated_at = now;
        st.profiles.insert(profile.owner_id, profile);
    }

    pub async fn get_profile(&self, owner_id: UserId) -> Option<Profile> {
        self.state.lock().await.profiles.get(&owner_id).cloned()
    }

    /// Raw removal; the cascading listing cancellation is driven by the
    /// service layer so the scheduler can disarm timers.
    pub async fn remove_profile(&self, owner_id: UserId) -> bool {
        self.state.lock().await.profiles.remove(&owner_id).is_some()
    }

    /// Record a freshly published listing. Fails with `Conflict` if the owner
    /// already has an active one; callers pre-check, this closes the race.
    pub async fn insert_listing(
        &self,
        owner_id: UserId,
        profile: Profile,
        message: MessageRef,
        media_messages: Vec<MessageRef>,
        posted_at: DateTime<Utc>,
        duration: Duration,
    ) -> Result<Listing> {
        let mut st = self.state.lock().await;
        if st
            .listings
            .values()
            .any(|l| l.owner_id == owner_id && l.status == ListingStatus::Active)
        {
            return Err(Error::Conflict(format!(
                "owner {} already has an active listing",
                owner_id.0
            )));
        }

        st.next_listing_id += 1;
        let expires_at = posted_at
            + chrono::Duration::from_std(duration)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));
        let listing = Listing {
            id: ListingId(st.next_listing_id),
            owner_id,
            profile,
            message,
            media_messages,
            posted_at,
            duration,
            expires_at,
            status: ListingStatus::Active,
        };
        st.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    pub async fn get_listing(&self, id: ListingId) -> Option<Listing> {
        self.state.lock().await.listings.get(&id).cloned()
    }

    pub async fn active_listing_for(&self, owner_id: UserId) -> Option<Listing> {
        self.state
            .lock()
            .await
            .listings
            .values()
            .find(|l| l.owner_id == owner_id && l.status == ListingStatus::Active)
            .cloned()
    }

    /// All listings with status Active, oldest first. A listing whose timer
    /// has fired but whose removal has not completed is still reported here.
    pub async fn get_active_listings(&self) -> Vec<Listing> {
        let st = self.state.lock().await;
        let mut out: Vec<Listing> = st
            .listings
            .values()
            .filter(|l| l.status == ListingStatus::Active)
            .cloned()
            .collect();
        out.sort_by_key(|l| l.posted_at);
        out
    }

    /// Compare-and-set the status: succeeds only for Active -> terminal, so a
    /// listing transitions exactly once even under a cancel/expire race.
    pub async fn transition_listing(&self, id: ListingId, to: ListingStatus) -> bool {
        if to == ListingStatus::Active {
            return false;
        }
        let mut st = self.state.lock().await;
        match st.listings.get_mut(&id) {
            Some(l) if l.status == ListingStatus::Active => {
                l.status = to;
                true
            }
            _ => false,
        }
    }

    /// Idempotent removal of a listing record.
    pub async fn delete_listing(&self, id: ListingId) -> bool {
        self.state.lock().await.listings.remove(&id).is_some()
    }
}
