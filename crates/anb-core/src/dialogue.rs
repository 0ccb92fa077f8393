//! Per-owner profile-building dialogue.
//!
//! One session per owner; starting a new dialogue silently discards the old
//! one, and a session idle past the timeout restarts from the beginning on
//! the next input. Partial drafts never touch the record store.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    domain::UserId,
    errors::Error,
    profile::{Contact, MediaKind, MediaRef, Offering, Profile, Venue},
    render::{self, cb, Reply},
    Result,
};

/// The dialogue step the owner is currently on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogueState {
    Name,
    OfferMenu,
    InPersonVenue,
    InPersonLocation,
    RemotePlatforms,
    RemotePayment,
    CustomPayment,
    CustomDelivery,
    OtherDescription,
    About,
    ContactMethod,
    Phone,
    Email,
    SocialLinks,
    Rates,
    Disclaimer,
    Images,
    Videos,
    Preview,
}

/// What the adapter extracted from one inbound update.
#[derive(Clone, Debug)]
pub enum DialogueInput {
    Text(String),
    Media { kind: MediaKind, file_id: String },
    Select(String),
    Cancel,
}

/// Accumulated answers. Becomes a [`Profile`] only on confirmation.
#[derive(Clone, Debug, Default)]
pub struct Draft {
    pub display_name: Option<String>,
    pub offerings: Vec<Offering>,
    pub about_text: Option<String>,
    pub contact: Option<Contact>,
    pub social_links: Option<String>,
    pub rates_text: Option<String>,
    pub disclaimer_text: Option<String>,
    pub media: Vec<MediaRef>,
    pending_venue: Option<Venue>,
    pending_platforms: Option<String>,
    pending_payment: Option<String>,
}

impl Draft {
    /// Insert an offering, replacing any prior one with the same tag. The
    /// position of a replaced offering is preserved. Returns true on replace.
    pub fn upsert_offering(&mut self, offering: Offering) -> bool {
        let tag = offering.tag();
        if let Some(slot) = self.offerings.iter_mut().find(|o| o.tag() == tag) {
            *slot = offering;
            true
        } else {
            self.offerings.push(offering);
            false
        }
    }

    pub fn media_count(&self, kind: MediaKind) -> usize {
        self.media.iter().filter(|m| m.kind == kind).count()
    }

    fn into_profile(self, owner_id: UserId, now: DateTime<Utc>) -> Result<Profile> {
        let display_name = self
            .display_name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::Validation("draft has no display name".to_string()))?;
        let contact = self
            .contact
            .ok_or_else(|| Error::Validation("draft has no contact method".to_string()))?;
        let disclaimer_text = self
            .disclaimer_text
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| Error::Validation("draft has no disclaimer".to_string()))?;

        Ok(Profile {
            owner_id,
            display_name,
            offerings: self.offerings,
            about_text: self.about_text,
            rates_text: self.rates_text,
            disclaimer_text,
            contact,
            social_links: self.social_links,
            media: self.media,
            created_at: now,
            updated_at: now,
        })
    }
}

/// How a dialogue step ended.
#[derive(Clone, Debug)]
pub enum Outcome {
    Continue,
    Committed(Profile),
    Cancelled,
}

/// One processed input: where the dialogue stands plus what to tell the owner.
#[derive(Clone, Debug)]
pub struct Step {
    pub outcome: Outcome,
    pub reply: Reply,
}

impl Step {
    fn next(reply: Reply) -> Self {
        Self {
            outcome: Outcome::Continue,
            reply,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MediaLimits {
    pub max_images: usize,
    pub max_videos: usize,
}

struct Session {
    state: DialogueState,
    draft: Draft,
    username: Option<String>,
    last_activity_at: DateTime<Utc>,
}

impl Session {
    fn fresh(username: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            state: DialogueState::Name,
            draft: Draft::default(),
            username,
            last_activity_at: now,
        }
    }
}

/// All in-flight dialogues, one per owner.
pub struct SessionStore {
    idle_timeout: chrono::Duration,
    limits: MediaLimits,
    sessions: Mutex<HashMap<UserId, Session>>,
}

impl SessionStore {
    pub fn new(idle_timeout: StdDuration, limits: MediaLimits) -> Self {
        Self {
            idle_timeout: chrono::Duration::from_std(idle_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(30)),
            limits,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start (or restart) the owner's dialogue. An in-flight session is
    /// discarded without notice; last writer wins.
    pub async fn begin(&self, owner_id: UserId, username: Option<String>) -> Reply {
        self.begin_at(owner_id, username, Utc::now()).await
    }

    pub async fn begin_at(
        &self,
        owner_id: UserId,
        username: Option<String>,
        now: DateTime<Utc>,
    ) -> Reply {
        let mut sessions = self.sessions.lock().await;
        if sessions.remove(&owner_id).is_some() {
            debug!(owner_id = owner_id.0, "discarding in-flight dialogue");
        }
        sessions.insert(owner_id, Session::fresh(username, now));
        Reply::text(NAME_PROMPT)
    }

    pub async fn has_session(&self, owner_id: UserId) -> bool {
        self.sessions.lock().await.contains_key(&owner_id)
    }

    pub async fn abandon(&self, owner_id: UserId) -> bool {
        self.sessions.lock().await.remove(&owner_id).is_some()
    }

    /// Feed one input into the owner's dialogue. Returns `None` when the
    /// owner has no session (the input is not dialogue traffic).
    pub async fn apply(&self, owner_id: UserId, input: DialogueInput) -> Option<Step> {
        self.apply_at(owner_id, input, Utc::now()).await
    }

    pub async fn apply_at(
        &self,
        owner_id: UserId,
        input: DialogueInput,
        now: DateTime<Utc>,
    ) -> Option<Step> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&owner_id)?;

        if now - session.last_activity_at > self.idle_timeout {
            debug!(owner_id = owner_id.0, "dialogue idle timeout, restarting");
            *session = Session::fresh(session.username.take(), now);
            return Some(Step::next(Reply::text(format!(
                "⌛ Your previous session timed out, so we're starting over.\n\n{NAME_PROMPT}"
            ))));
        }
        session.last_activity_at = now;

        let step = transition(owner_id, session, input, &self.limits, now);
        if !matches!(step.outcome, Outcome::Continue) {
            sessions.remove(&owner_id);
        }
        Some(step)
    }
}

const NAME_PROMPT: &str =
    "Let's build your listing. First, what name or subject line should it show?";
const OFFER_MENU_PROMPT: &str =
    "Select the services you offer. Pick as many as apply, then hit Done.";
const ABOUT_PROMPT: &str =
    "Tell clients about yourself (stats, vibe, anything). Or type 'skip'.";
const CONTACT_PROMPT: &str = "How should clients reach you?";
const SOCIAL_PROMPT: &str = "Add social media links, or type 'skip'.";
const RATES_PROMPT: &str = "List your rates, or type 'skip'.";
const DISCLAIMER_PROMPT: &str =
    "Enter your disclaimer / screening notice. This one is required.";
const USE_BUTTONS: &str = "Please use the buttons above.";

fn images_prompt(max: usize) -> String {
    format!("Send up to {max} images, one at a time. Type 'done' when finished.")
}

fn videos_prompt(max: usize) -> String {
    format!("Now send up to {max} videos. Type 'done' when finished.")
}

fn offer_menu_reply(note: Option<&str>) -> Reply {
    let text = match note {
        Some(n) => format!("{n}\n\n{OFFER_MENU_PROMPT}"),
        None => OFFER_MENU_PROMPT.to_string(),
    };
    Reply::with_keyboard(text, render::offer_menu_keyboard())
}

fn preview_reply(draft: &Draft) -> Reply {
    Reply::with_keyboard(
        format!(
            "{}\n\nDoes everything look right?",
            render::draft_preview(draft)
        ),
        render::preview_keyboard(),
    )
}

fn is_done(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("done")
}

fn is_skip(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("skip")
}

fn transition(
    owner_id: UserId,
    session: &mut Session,
    input: DialogueInput,
    limits: &MediaLimits,
    now: DateTime<Utc>,
) -> Step {
    use DialogueState as S;

    if matches!(input, DialogueInput::Cancel) {
        return Step {
            outcome: Outcome::Cancelled,
            reply: Reply::text("❌ Listing setup cancelled. Nothing was saved."),
        };
    }

    match (session.state, input) {
        // === Name ===
        (S::Name, DialogueInput::Text(text)) => {
            let name = text.trim();
            if name.is_empty() {
                return Step::next(Reply::text(
                    "The name can't be empty. What should your listing be called?",
                ));
            }
            session.draft.display_name = Some(name.to_string());
            session.state = S::OfferMenu;
            Step::next(offer_menu_reply(None))
        }

        // === Offer menu ===
        (S::OfferMenu, DialogueInput::Select(data)) => match data.as_str() {
            cb::OFFER_IN_PERSON => {
                session.state = S::InPersonVenue;
                Step::next(Reply::with_keyboard(
                    "In-person it is. Incall, outcall, or both?",
                    render::venue_keyboard(),
                ))
            }
            cb::OFFER_REMOTE => {
                session.state = S::RemotePlatforms;
                Step::next(Reply::text(
                    "Which platforms do you use for video sessions? (e.g. Telegram, FaceTime)",
                ))
            }
            cb::OFFER_CUSTOM => {
                session.state = S::CustomPayment;
                Step::next(Reply::text(
                    "Custom content — how do you accept payment?",
                ))
            }
            cb::OFFER_OTHER => {
                session.state = S::OtherDescription;
                Step::next(Reply::text("Describe the service you offer:"))
            }
            cb::OFFER_DONE => {
                session.state = S::About;
                Step::next(Reply::text(ABOUT_PROMPT))
            }
            _ => Step::next(offer_menu_reply(Some(USE_BUTTONS))),
        },

        // === In-person sub-flow ===
        (S::InPersonVenue, DialogueInput::Select(data)) => {
            let venue = match data.as_str() {
                cb::VENUE_INCALL => Some(Venue::Incall),
                cb::VENUE_OUTCALL => Some(Venue::Outcall),
                cb::VENUE_BOTH => Some(Venue::Both),
                _ => None,
            };
            match venue {
                Some(v) => {
                    session.draft.pending_venue = Some(v);
                    session.state = S::InPersonLocation;
                    Step::next(Reply::text(
                        "What area are you based in? (neighborhood or city)",
                    ))
                }
                None => Step::next(Reply::with_keyboard(
                    USE_BUTTONS,
                    render::venue_keyboard(),
                )),
            }
        }
        (S::InPersonLocation, DialogueInput::Text(text)) => {
            let location = text.trim();
            if location.is_empty() {
                return Step::next(Reply::text("Please enter your area:"));
            }
            let venue = session.draft.pending_venue.take().unwrap_or(Venue::Both);
            let replaced = session.draft.upsert_offering(Offering::InPerson {
                venue,
                location: location.to_string(),
            });
            session.state = S::OfferMenu;
            Step::next(offer_menu_reply(Some(added_note("In-Person", replaced))))
        }

        // === Video sessions sub-flow ===
        (S::RemotePlatforms, DialogueInput::Text(text)) => {
            let platforms = text.trim();
            if platforms.is_empty() {
                return Step::next(Reply::text("Please list your platforms:"));
            }
            session.draft.pending_platforms = Some(platforms.to_string());
            session.state = S::RemotePayment;
            Step::next(Reply::text("And how do you accept payment for sessions?"))
        }
        (S::RemotePayment, DialogueInput::Text(text)) => {
            let payment = text.trim();
            if payment.is_empty() {
                return Step::next(Reply::text("Please enter your payment methods:"));
            }
            let platforms = session.draft.pending_platforms.take().unwrap_or_default();
            let replaced = session.draft.upsert_offering(Offering::RemoteSession {
                platforms,
                payment: payment.to_string(),
            });
            session.state = S::OfferMenu;
            Step::next(offer_menu_reply(Some(added_note(
                "Video Sessions",
                replaced,
            ))))
        }

        // === Custom content sub-flow ===
        (S::CustomPayment, DialogueInput::Text(text)) => {
            let payment = text.trim();
            if payment.is_empty() {
                return Step::next(Reply::text("Please enter your payment methods:"));
            }
            session.draft.pending_payment = Some(payment.to_string());
            session.state = S::CustomDelivery;
            Step::next(Reply::text(
                "How is the content delivered? (e.g. Telegram, email, link)",
            ))
        }
        (S::CustomDelivery, DialogueInput::Text(text)) => {
            let delivery = text.trim();
            if delivery.is_empty() {
                return Step::next(Reply::text("Please enter your delivery method:"));
            }
            let payment = session.draft.pending_payment.take().unwrap_or_default();
            let replaced = session.draft.upsert_offering(Offering::CustomContent {
                payment,
                delivery: delivery.to_string(),
            });
            session.state = S::OfferMenu;
            Step::next(offer_menu_reply(Some(added_note(
                "Custom Content",
                replaced,
            ))))
        }

        // === Other sub-flow ===
        (S::OtherDescription, DialogueInput::Text(text)) => {
            let description = text.trim();
            if description.is_empty() {
                return Step::next(Reply::text("Please describe the service:"));
            }
            let replaced = session.draft.upsert_offering(Offering::Other {
                description: description.to_string(),
            });
            session.state = S::OfferMenu;
            Step::next(offer_menu_reply(Some(added_note("Other", replaced))))
        }

        // === About / contact / social / rates / disclaimer ===
        (S::About, DialogueInput::Text(text)) => {
            session.draft.about_text = optional_answer(&text);
            session.state = S::ContactMethod;
            Step::next(Reply::with_keyboard(CONTACT_PROMPT, render::contact_keyboard()))
        }
        (S::ContactMethod, DialogueInput::Select(data)) => match data.as_str() {
            cb::CONTACT_PHONE => {
                session.state = S::Phone;
                Step::next(Reply::text("What number should clients text or call?"))
            }
            cb::CONTACT_EMAIL => {
                session.state = S::Email;
                Step::next(Reply::text("What email should clients use?"))
            }
            cb::CONTACT_HANDLE => match session.username.clone() {
                Some(handle) => {
                    session.draft.contact = Some(Contact::Handle(handle.clone()));
                    session.state = S::SocialLinks;
                    Step::next(Reply::text(format!(
                        "Clients will message you at @{handle}.\n\n{SOCIAL_PROMPT}"
                    )))
                }
                None => Step::next(Reply::with_keyboard(
                    "Your Telegram account has no username set, so clients can't \
                     message you that way. Pick phone or email instead.",
                    render::contact_keyboard(),
                )),
            },
            _ => Step::next(Reply::with_keyboard(USE_BUTTONS, render::contact_keyboard())),
        },
        (S::Phone, DialogueInput::Text(text)) => {
            let phone = text.trim();
            if phone.is_empty() {
                return Step::next(Reply::text("Please enter a phone number:"));
            }
            session.draft.contact = Some(Contact::Phone(phone.to_string()));
            session.state = S::SocialLinks;
            Step::next(Reply::text(SOCIAL_PROMPT))
        }
        (S::Email, DialogueInput::Text(text)) => {
            let email = text.trim();
            if email.is_empty() {
                return Step::next(Reply::text("Please enter an email address:"));
            }
            session.draft.contact = Some(Contact::Email(email.to_string()));
            session.state = S::SocialLinks;
            Step::next(Reply::text(SOCIAL_PROMPT))
        }
        (S::SocialLinks, DialogueInput::Text(text)) => {
            session.draft.social_links = optional_answer(&text);
            session.state = S::Rates;
            Step::next(Reply::text(RATES_PROMPT))
        }
        (S::Rates, DialogueInput::Text(text)) => {
            session.draft.rates_text = optional_answer(&text);
            session.state = S::Disclaimer;
            Step::next(Reply::text(DISCLAIMER_PROMPT))
        }
        (S::Disclaimer, DialogueInput::Text(text)) => {
            let disclaimer = text.trim();
            if disclaimer.is_empty() {
                return Step::next(Reply::text(
                    "The disclaimer can't be skipped. Please enter it:",
                ));
            }
            session.draft.disclaimer_text = Some(disclaimer.to_string());
            session.state = S::Images;
            Step::next(Reply::text(images_prompt(limits.max_images)))
        }

        // === Media ===
        (S::Images, DialogueInput::Media { kind, file_id }) => {
            media_step(session, kind, file_id, MediaKind::Image, limits.max_images)
        }
        (S::Images, DialogueInput::Text(text)) if is_done(&text) => {
            session.state = S::Videos;
            Step::next(Reply::text(videos_prompt(limits.max_videos)))
        }
        (S::Images, DialogueInput::Text(_)) => Step::next(Reply::text(
            "Send an image, or type 'done' to continue.",
        )),
        (S::Videos, DialogueInput::Media { kind, file_id }) => {
            media_step(session, kind, file_id, MediaKind::Video, limits.max_videos)
        }
        (S::Videos, DialogueInput::Text(text)) if is_done(&text) => {
            session.state = S::Preview;
            Step::next(preview_reply(&session.draft))
        }
        (S::Videos, DialogueInput::Text(_)) => Step::next(Reply::text(
            "Send a video, or type 'done' to continue.",
        )),

        // === Preview ===
        (S::Preview, DialogueInput::Select(data)) => match data.as_str() {
            cb::PREVIEW_CONFIRM => {
                match session.draft.clone().into_profile(owner_id, now) {
                    Ok(profile) => Step {
                        outcome: Outcome::Committed(profile),
                        reply: Reply::text(
                            "✅ Profile saved! Use the menu to mark yourself available.",
                        ),
                    },
                    Err(_) => {
                        // Should not happen past the required steps; restart
                        // rather than commit a broken record.
                        *session = Session::fresh(session.username.take(), now);
                        Step::next(Reply::text(format!(
                            "Something was missing from your draft, so we're starting over.\n\n{NAME_PROMPT}"
                        )))
                    }
                }
            }
            cb::PREVIEW_CANCEL => Step {
                outcome: Outcome::Cancelled,
                reply: Reply::text("❌ Listing setup cancelled. Nothing was saved."),
            },
            _ => Step::next(preview_reply(&session.draft)),
        },

        // Button presses in a text step, text in a button step, media in a
        // non-media step: re-prompt for what the current step expects.
        (state, _) => Step::next(reprompt_for(state, limits, &session.draft)),
    }
}

fn added_note(label: &str, replaced: bool) -> &'static str {
    // Static notes keep the menu message stable; the label picks which one.
    match (label, replaced) {
        ("In-Person", false) => "✅ In-Person added.",
        ("In-Person", true) => "✏️ In-Person updated.",
        ("Video Sessions", false) => "✅ Video Sessions added.",
        ("Video Sessions", true) => "✏️ Video Sessions updated.",
        ("Custom Content", false) => "✅ Custom Content added.",
        ("Custom Content", true) => "✏️ Custom Content updated.",
        (_, false) => "✅ Service added.",
        (_, true) => "✏️ Service updated.",
    }
}

fn optional_answer(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || is_skip(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn media_step(
    session: &mut Session,
    kind: MediaKind,
    file_id: String,
    expected: MediaKind,
    cap: usize,
) -> Step {
    if kind != expected {
        let want = match expected {
            MediaKind::Image => "an image",
            MediaKind::Video => "a video",
        };
        return Step::next(Reply::text(format!(
            "That's not {want}. Send {want}, or type 'done' to continue."
        )));
    }

    let count = session.draft.media_count(expected);
    if count >= cap {
        let noun = match expected {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
        };
        return Step::next(Reply::text(format!(
            "You've reached the limit of {cap} {noun}. Type 'done' to continue."
        )));
    }

    session.draft.media.push(MediaRef { kind, file_id });
    let noun = match expected {
        MediaKind::Image => "Image",
        MediaKind::Video => "Video",
    };
    Step::next(Reply::text(format!(
        "{noun} {}/{cap} saved. Send another, or type 'done'.",
        count + 1
    )))
}

fn reprompt_for(state: DialogueState, limits: &MediaLimits, draft: &Draft) -> Reply {
    use DialogueState as S;
    match state {
        S::Name => Reply::text(NAME_PROMPT),
        S::OfferMenu => offer_menu_reply(Some(USE_BUTTONS)),
        S::InPersonVenue => Reply::with_keyboard(USE_BUTTONS, render::venue_keyboard()),
        S::InPersonLocation => Reply::text("Please enter your area:"),
        S::RemotePlatforms => Reply::text("Please list your platforms:"),
        S::RemotePayment => Reply::text("Please enter your payment methods:"),
        S::CustomPayment => Reply::text("Please enter your payment methods:"),
        S::CustomDelivery => Reply::text("Please enter your delivery method:"),
        S::OtherDescription => Reply::text("Please describe the service:"),
        S::About => Reply::text(ABOUT_PROMPT),
        S::ContactMethod => Reply::with_keyboard(USE_BUTTONS, render::contact_keyboard()),
        S::Phone => Reply::text("Please enter a phone number:"),
        S::Email => Reply::text("Please enter an email address:"),
        S::SocialLinks => Reply::text(SOCIAL_PROMPT),
        S::Rates => Reply::text(RATES_PROMPT),
        S::Disclaimer => Reply::text(DISCLAIMER_PROMPT),
        S::Images => Reply::text(images_prompt(limits.max_images)),
        S::Videos => Reply::text(videos_prompt(limits.max_videos)),
        S::Preview => preview_reply(draft),
    }
}
