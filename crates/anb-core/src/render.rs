//! Pure rendering: profile/listing/snapshot text and the bot's inline menus.
//!
//! Everything user-provided is HTML-escaped here; the dialogue engine and the
//! scheduler never build display strings themselves.

use chrono::{DateTime, Utc};

use crate::{
    dialogue::Draft,
    formatting::{escape_html, format_countdown},
    messaging::types::InlineKeyboard,
    profile::{Contact, Offering, Profile},
    store::Listing,
};

/// Callback-data protocol for the inline menus.
pub mod cb {
    pub const MENU_CREATE: &str = "menu:create";
    pub const MENU_DELETE: &str = "menu:delete";
    pub const MENU_AVAILABLE: &str = "menu:available";

    pub const OFFER_IN_PERSON: &str = "offer:in_person";
    pub const OFFER_REMOTE: &str = "offer:remote";
    pub const OFFER_CUSTOM: &str = "offer:custom";
    pub const OFFER_OTHER: &str = "offer:other";
    pub const OFFER_DONE: &str = "offer:done";

    pub const VENUE_INCALL: &str = "venue:incall";
    pub const VENUE_OUTCALL: &str = "venue:outcall";
    pub const VENUE_BOTH: &str = "venue:both";

    pub const CONTACT_PHONE: &str = "contact:phone";
    pub const CONTACT_EMAIL: &str = "contact:email";
    pub const CONTACT_HANDLE: &str = "contact:handle";

    pub const PREVIEW_CONFIRM: &str = "preview:confirm";
    pub const PREVIEW_CANCEL: &str = "preview:cancel";

    pub const DURATION_PREFIX: &str = "dur:";
}

/// A rendered reply: text plus an optional inline menu.
#[derive(Clone, Debug)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: InlineKeyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

// === Menus ===

pub fn main_menu_keyboard() -> InlineKeyboard {
    InlineKeyboard::rows(&[
        ("📝 Create Profile", cb::MENU_CREATE),
        ("🗑️ Delete Profile", cb::MENU_DELETE),
        ("📢 Mark Available", cb::MENU_AVAILABLE),
    ])
}

pub fn offer_menu_keyboard() -> InlineKeyboard {
    InlineKeyboard::rows(&[
        ("🧍 In-Person", cb::OFFER_IN_PERSON),
        ("📱 Video Sessions", cb::OFFER_REMOTE),
        ("🎥 Custom Content", cb::OFFER_CUSTOM),
        ("❓ Other", cb::OFFER_OTHER),
        ("✅ Done Selecting", cb::OFFER_DONE),
    ])
}

pub fn venue_keyboard() -> InlineKeyboard {
    InlineKeyboard::rows(&[
        ("🏠 Incall Only", cb::VENUE_INCALL),
        ("🚗 Outcall Only", cb::VENUE_OUTCALL),
        ("🏠🚗 Incall/Outcall", cb::VENUE_BOTH),
    ])
}

pub fn contact_keyboard() -> InlineKeyboard {
    InlineKeyboard::rows(&[
        ("📞 Text/Call", cb::CONTACT_PHONE),
        ("📧 Email", cb::CONTACT_EMAIL),
        ("💬 Telegram", cb::CONTACT_HANDLE),
    ])
}

pub fn preview_keyboard() -> InlineKeyboard {
    InlineKeyboard::rows(&[
        ("✅ Confirm", cb::PREVIEW_CONFIRM),
        ("❌ Cancel", cb::PREVIEW_CANCEL),
    ])
}

pub fn duration_keyboard(hours: &[u64]) -> InlineKeyboard {
    InlineKeyboard::new(
        hours
            .iter()
            .map(|h| crate::messaging::types::InlineButton {
                label: format!("{h} hours"),
                callback_data: format!("{}{h}", cb::DURATION_PREFIX),
            })
            .collect(),
    )
}

// === Profile body ===

fn offerings_block(offerings: &[Offering]) -> String {
    if offerings.is_empty() {
        return String::new();
    }
    let mut out = String::from("<b>Services Offered:</b>\n");
    for offering in offerings {
        match offering {
            Offering::InPerson { venue, location } => {
                out.push_str(&format!(
                    "  🧍 In-Person ({}, {})\n",
                    venue.label(),
                    escape_html(location)
                ));
            }
            Offering::RemoteSession { platforms, payment } => {
                out.push_str(&format!(
                    "  📱 Video Sessions ({}, {})\n",
                    escape_html(platforms),
                    escape_html(payment)
                ));
            }
            Offering::CustomContent { payment, delivery } => {
                out.push_str(&format!(
                    "  🎥 Custom Content ({}, {})\n",
                    escape_html(delivery),
                    escape_html(payment)
                ));
            }
            Offering::Other { description } => {
                out.push_str(&format!("  ❓ {}\n", escape_html(description)));
            }
        }
    }
    out.push('\n');
    out
}

fn contact_block(contact: &Contact) -> String {
    let line = match contact {
        Contact::Phone(v) => format!("  Phone: {}", escape_html(v)),
        Contact::Email(v) => format!("  Email: {}", escape_html(v)),
        Contact::Handle(v) => format!("  Telegram: @{}", escape_html(v)),
    };
    format!("<b>Contact:</b>\n{line}\n\n")
}

fn optional_section(title: &str, value: Option<&str>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => {
            format!("<b>{title}:</b>\n{}\n\n", escape_html(v))
        }
        _ => String::new(),
    }
}

/// Preview shown in the private chat before committing the draft.
pub fn draft_preview(draft: &Draft) -> String {
    let mut text = String::from("<b>Preview of Your Listing</b>\n\n");
    if let Some(name) = &draft.display_name {
        text.push_str(&format!("<b>{}</b>\n\n", escape_html(name)));
    }
    text.push_str(&offerings_block(&draft.offerings));
    text.push_str(&optional_section("About", draft.about_text.as_deref()));
    if let Some(contact) = &draft.contact {
        text.push_str(&contact_block(contact));
    }
    text.push_str(&optional_section(
        "Social Media",
        draft.social_links.as_deref(),
    ));
    text.push_str(&optional_section("Rates", draft.rates_text.as_deref()));
    text.push_str(&optional_section(
        "Notice",
        draft.disclaimer_text.as_deref(),
    ));
    text.push_str("<i>Images and videos will be displayed in the group listing.</i>");
    text
}

/// The message published to the shared group when an owner goes available.
pub fn group_listing(profile: &Profile, posted_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> String {
    let countdown = format_countdown(expires_at - posted_at);
    let mut text = format!("💋 <b>{}</b> 💋\n", escape_html(&profile.display_name));
    text.push_str(&format!(
        "📅 Posted: {} | Expires in: {countdown}\n\n",
        posted_at.format("%b %d, %Y, %H:%M UTC")
    ));
    text.push_str(&offerings_block(&profile.offerings));
    text.push_str(&optional_section("About", profile.about_text.as_deref()));
    text.push_str(&contact_block(&profile.contact));
    text.push_str(&optional_section(
        "Social Media",
        profile.social_links.as_deref(),
    ));
    text.push_str(&optional_section("Rates", profile.rates_text.as_deref()));
    text.push_str(&optional_section("Notice", Some(&profile.disclaimer_text)));
    text
}

/// The consolidated "who is available" snapshot, oldest listing first.
pub fn snapshot(listings: &[Listing], ttl_minutes: u64) -> String {
    if listings.is_empty() {
        return "📋 No one is available right now.\n\nCheck back soon!".to_string();
    }

    let mut text = String::from("📋 <b>Available Now:</b>\n\n");
    for (i, listing) in listings.iter().enumerate() {
        let services = listing
            .profile
            .offerings
            .iter()
            .map(|o| o.tag().label())
            .collect::<Vec<_>>()
            .join(", ");
        let name = escape_html(&listing.profile.display_name);
        if services.is_empty() {
            text.push_str(&format!("{}. <b>{name}</b>\n", i + 1));
        } else {
            text.push_str(&format!("{}. <b>{name}</b> ({services})\n", i + 1));
        }
    }
    text.push_str(&format!(
        "\n<i>This list will auto-delete in {ttl_minutes} minutes.</i>"
    ));
    text
}
