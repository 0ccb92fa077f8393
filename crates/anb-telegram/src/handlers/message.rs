use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::warn;

use anb_core::{
    domain::{ChatId, UserId},
    messaging::types::{CommandEvent, InboundEvent, MediaEvent, TextEvent},
    profile::MediaKind,
};

use crate::router::AppState;

/// Telegram may send `/cmd@botname args`; we only care about the bare name.
fn parse_command(text: &str) -> Option<String> {
    let first = text.trim().split_whitespace().next()?;
    let name = first
        .strip_prefix('/')?
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = msg.from() else {
        return Ok(()); // channel posts etc.
    };
    let owner_id = UserId(from.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);
    let username = from.username.clone();

    let event = if let Some(text) = msg.text() {
        match parse_command(text) {
            Some(name) => InboundEvent::Command(CommandEvent {
                owner_id,
                chat_id,
                username,
                name,
            }),
            None => InboundEvent::Text(TextEvent {
                owner_id,
                chat_id,
                username,
                text: text.to_string(),
            }),
        }
    } else if let Some(sizes) = msg.photo() {
        let Some(best) = sizes.last() else {
            return Ok(());
        };
        InboundEvent::Media(MediaEvent {
            owner_id,
            chat_id,
            kind: MediaKind::Image,
            file_id: best.file.id.clone(),
        })
    } else if let Some(video) = msg.video() {
        InboundEvent::Media(MediaEvent {
            owner_id,
            chat_id,
            kind: MediaKind::Video,
            file_id: video.file.id.clone(),
        })
    } else {
        return Ok(());
    };

    if let Err(e) = state.service.handle_event(event).await {
        warn!(chat_id = chat_id.0, error = %e, "failed to handle message");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parsing() {
        assert_eq!(parse_command("/start"), Some("start".to_string()));
        assert_eq!(parse_command("/Start@SomeBot now"), Some("start".to_string()));
        assert_eq!(parse_command("/available"), Some("available".to_string()));
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/"), None);
    }
}
