use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::UserId;

/// Discriminant for the offering variants. At most one offering per tag may
/// exist in a profile; re-selecting a tag edits the existing record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferingTag {
    InPerson,
    RemoteSession,
    CustomContent,
    Other,
}

impl OfferingTag {
    pub fn label(&self) -> &'static str {
        match self {
            OfferingTag::InPerson => "In-Person",
            OfferingTag::RemoteSession => "Video Sessions",
            OfferingTag::CustomContent => "Custom Content",
            OfferingTag::Other => "Other",
        }
    }
}

/// Incall/outcall choice for in-person offerings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Venue {
    Incall,
    Outcall,
    Both,
}

impl Venue {
    pub fn label(&self) -> &'static str {
        match self {
            Venue::Incall => "Incall Only",
            Venue::Outcall => "Outcall Only",
            Venue::Both => "Incall/Outcall",
        }
    }
}

/// A single service offering with its variant-specific fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Offering {
    InPerson { venue: Venue, location: String },
    RemoteSession { platforms: String, payment: String },
    CustomContent { payment: String, delivery: String },
    Other { description: String },
}

impl Offering {
    pub fn tag(&self) -> OfferingTag {
        match self {
            Offering::InPerson { .. } => OfferingTag::InPerson,
            Offering::RemoteSession { .. } => OfferingTag::RemoteSession,
            Offering::CustomContent { .. } => OfferingTag::CustomContent,
            Offering::Other { .. } => OfferingTag::Other,
        }
    }
}

/// Exactly one contact channel per profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Contact {
    Phone(String),
    Email(String),
    Handle(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
}

/// Opaque reference to an uploaded media file (Telegram file id).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub file_id: String,
}

/// A fully validated operator profile. Partial data never reaches the record
/// store; it lives only in the dialogue draft.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub owner_id: UserId,
    pub display_name: String,
    pub offerings: Vec<Offering>,
    pub about_text: Option<String>,
    pub rates_text: Option<String>,
    pub disclaimer_text: String,
    pub contact: Contact,
    pub social_links: Option<String>,
    pub media: Vec<MediaRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
