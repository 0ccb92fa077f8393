use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};
use tracing::warn;

use anb_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::types::{InboundEvent, MenuSelectionEvent},
};

use crate::router::AppState;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(data) = q.data.clone() else {
        return Ok(());
    };
    let owner_id = UserId(q.from.id.0 as i64);
    let username = q.from.username.clone();

    // Inline menus live in the private chat; fall back to the user's own chat
    // when Telegram omits the source message.
    let (chat_id, message) = match &q.message {
        Some(m) => {
            let chat_id = ChatId(m.chat.id.0);
            (
                chat_id,
                Some(MessageRef {
                    chat_id,
                    message_id: MessageId(m.id.0),
                }),
            )
        }
        None => (ChatId(q.from.id.0 as i64), None),
    };

    let event = InboundEvent::MenuSelection(MenuSelectionEvent {
        owner_id,
        chat_id,
        username,
        callback_id: q.id.clone(),
        data,
        message,
    });

    if let Err(e) = state.service.handle_event(event).await {
        warn!(chat_id = chat_id.0, error = %e, "failed to handle menu selection");
    }
    Ok(())
}
