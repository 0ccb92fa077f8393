//! In-process messenger double shared by the core's test modules.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    profile::MediaRef,
    Result,
};

#[derive(Clone, Debug)]
pub(crate) struct SentMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

#[derive(Default)]
struct FakeState {
    next_message_id: i32,
    sent: Vec<SentMessage>,
    deleted: Vec<MessageRef>,
    edited: Vec<(MessageRef, String)>,
    answered: Vec<String>,
    fail_deletes: bool,
    fail_sends: bool,
}

/// Records every outbound call; optionally fails deletes/sends to exercise
/// the degraded paths.
#[derive(Default)]
pub(crate) struct FakeMessenger {
    state: Mutex<FakeState>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deletes(&self) {
        self.state.lock().unwrap().fail_deletes = true;
    }

    pub fn fail_sends(&self) {
        self.state.lock().unwrap().fail_sends = true;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn last_text(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .sent
            .last()
            .map(|s| s.text.clone())
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn edited(&self) -> Vec<(MessageRef, String)> {
        self.state.lock().unwrap().edited.clone()
    }

    pub fn answered_callbacks(&self) -> Vec<String> {
        self.state.lock().unwrap().answered.clone()
    }

    fn record_send(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<MessageRef> {
        let mut st = self.state.lock().unwrap();
        if st.fail_sends {
            return Err(Error::Delivery("send refused by fake".to_string()));
        }
        st.next_message_id += 1;
        let msg = MessageRef {
            chat_id,
            message_id: MessageId(st.next_message_id),
        };
        st.sent.push(SentMessage {
            chat_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(msg)
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_edit: true,
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.record_send(chat_id, html, None)
    }

    async fn send_media_group(
        &self,
        chat_id: ChatId,
        media: &[MediaRef],
    ) -> Result<Vec<MessageRef>> {
        media
            .iter()
            .map(|m| self.record_send(chat_id, &format!("[media:{}]", m.file_id), None))
            .collect()
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .edited
            .push((msg, html.to_string()));
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.fail_deletes {
            return Err(Error::Delivery("delete refused by fake".to_string()));
        }
        st.deleted.push(msg);
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.record_send(chat_id, text, Some(keyboard))
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        text: &str,
        _keyboard: InlineKeyboard,
    ) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .edited
            .push((msg, text.to_string()));
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, _text: Option<&str>) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .answered
            .push(callback_id.to_string());
        Ok(())
    }
}
