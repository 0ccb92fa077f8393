use crate::{
    domain::{ChatId, MessageRef, UserId},
    profile::MediaKind,
};

/// Transport-neutral inbound event model.
///
/// The adapter validates/decodes transport updates and hands the core one of
/// these; everything the core needs to reply (chat, callback id, source
/// message) travels with the event.
#[derive(Clone, Debug)]
pub enum InboundEvent {
    Command(CommandEvent),
    Text(TextEvent),
    Media(MediaEvent),
    MenuSelection(MenuSelectionEvent),
}

#[derive(Clone, Debug)]
pub struct CommandEvent {
    pub owner_id: UserId,
    pub chat_id: ChatId,
    pub username: Option<String>,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct TextEvent {
    pub owner_id: UserId,
    pub chat_id: ChatId,
    pub username: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct MediaEvent {
    pub owner_id: UserId,
    pub chat_id: ChatId,
    pub kind: MediaKind,
    pub file_id: String,
}

/// A button press. `message` is the menu message the button was attached to,
/// when known, so the core can edit it in place.
#[derive(Clone, Debug)]
pub struct MenuSelectionEvent {
    pub owner_id: UserId,
    pub chat_id: ChatId,
    pub username: Option<String>,
    pub callback_id: String,
    pub data: String,
    pub message: Option<MessageRef>,
}

/// Inline keyboard (one button per row, matching the bot's menus).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }

    pub fn rows(pairs: &[(&str, &str)]) -> Self {
        Self {
            buttons: pairs
                .iter()
                .map(|(label, data)| InlineButton {
                    label: (*label).to_string(),
                    callback_data: (*data).to_string(),
                })
                .collect(),
        }
    }
}

/// Capabilities of a messenger implementation. The service consults these
/// before editing in place and when sizing outbound text.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_edit: bool,
    pub max_message_len: usize,
}
