//! Application facade: routes transport-neutral inbound events to the
//! dialogue engine, the listing scheduler, and the snapshot publisher.

use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
    config::Config,
    dialogue::{DialogueInput, MediaLimits, Outcome, SessionStore, Step},
    domain::{ChatId, MessageRef, UserId},
    errors::Error,
    formatting,
    listings::ListingScheduler,
    messaging::{
        port::MessagingPort,
        types::{CommandEvent, InboundEvent, MediaEvent, MenuSelectionEvent, TextEvent},
    },
    render::{self, cb, Reply},
    security,
    snapshot::SnapshotPublisher,
    store::RecordStore,
    Result,
};

const MAIN_MENU_TEXT: &str = "👋 What would you like to do?";
const UNAUTHORIZED_TEXT: &str = "⛔ You're not authorized to use this bot.";
const NO_PROFILE_TEXT: &str = "You need a profile first. Use the menu to create one.";
const ALREADY_LISTED_TEXT: &str = "You already have an active listing in the group.";

pub struct AvailabilityService {
    config: Config,
    store: Arc<RecordStore>,
    sessions: SessionStore,
    scheduler: Arc<ListingScheduler>,
    snapshots: SnapshotPublisher,
    messenger: Arc<dyn MessagingPort>,
}

impl AvailabilityService {
    pub fn new(config: Config, messenger: Arc<dyn MessagingPort>) -> Arc<Self> {
        let store = Arc::new(RecordStore::new());
        let scheduler = Arc::new(ListingScheduler::new(
            store.clone(),
            messenger.clone(),
            config.target_group,
        ));
        let snapshots = SnapshotPublisher::new(
            store.clone(),
            messenger.clone(),
            config.target_group,
            config.snapshot_ttl,
        );
        let sessions = SessionStore::new(
            config.session_idle_timeout,
            MediaLimits {
                max_images: config.max_images,
                max_videos: config.max_videos,
            },
        );
        Arc::new(Self {
            config,
            store,
            sessions,
            scheduler,
            snapshots,
            messenger,
        })
    }

    pub async fn handle_event(self: &Arc<Self>, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Command(e) => self.handle_command(e).await,
            InboundEvent::Text(e) => self.handle_text(e).await,
            InboundEvent::Media(e) => self.handle_media(e).await,
            InboundEvent::MenuSelection(e) => self.handle_selection(e).await,
        }
    }

    fn authorize(&self, owner_id: UserId) -> Result<()> {
        if security::is_authorized(Some(owner_id), &self.config.approved_admins) {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }

    /// Map the errors an operator can cause to friendly chat replies;
    /// anything else propagates.
    fn reply_for(result: Result<Reply>) -> Result<Reply> {
        match result {
            Ok(reply) => Ok(reply),
            Err(Error::Unauthorized) => Ok(Reply::text(UNAUTHORIZED_TEXT)),
            Err(Error::NotFound(_)) => Ok(Reply::text(NO_PROFILE_TEXT)),
            Err(Error::Conflict(_)) => Ok(Reply::text(ALREADY_LISTED_TEXT)),
            Err(e) => Err(e),
        }
    }

    async fn handle_command(self: &Arc<Self>, e: CommandEvent) -> Result<()> {
        match e.name.as_str() {
            "start" => {
                let reply = Self::reply_for(self.authorize(e.owner_id).map(|()| {
                    Reply::with_keyboard(MAIN_MENU_TEXT, render::main_menu_keyboard())
                }))?;
                self.send(e.chat_id, reply).await
            }
            "createprofile" => {
                let reply =
                    Self::reply_for(self.begin_dialogue(e.owner_id, e.username.clone()).await)?;
                self.send(e.chat_id, reply).await
            }
            "cancel" => {
                let reply = if self.sessions.abandon(e.owner_id).await {
                    Reply::text("❌ Listing setup cancelled. Nothing was saved.")
                } else {
                    Reply::text("Nothing to cancel.")
                };
                self.send(e.chat_id, reply).await
            }
            "available" => {
                // In the group this is the public roster, open to everyone.
                // In private it is a shortcut into the duration picker.
                if e.chat_id == self.config.target_group {
                    self.snapshots.publish().await.map(|_| ())
                } else {
                    let reply = Self::reply_for(self.offer_durations(e.owner_id).await)?;
                    self.send(e.chat_id, reply).await
                }
            }
            other => {
                debug!(command = other, "ignoring unknown command");
                Ok(())
            }
        }
    }

    async fn handle_text(self: &Arc<Self>, e: TextEvent) -> Result<()> {
        match self
            .sessions
            .apply(e.owner_id, DialogueInput::Text(e.text))
            .await
        {
            Some(step) => self.finish_step(e.chat_id, None, step).await,
            None => Ok(()), // not dialogue traffic
        }
    }

    async fn handle_media(self: &Arc<Self>, e: MediaEvent) -> Result<()> {
        let input = DialogueInput::Media {
            kind: e.kind,
            file_id: e.file_id,
        };
        match self.sessions.apply(e.owner_id, input).await {
            Some(step) => self.finish_step(e.chat_id, None, step).await,
            None => Ok(()),
        }
    }

    async fn handle_selection(self: &Arc<Self>, e: MenuSelectionEvent) -> Result<()> {
        if let Err(err) = self
            .messenger
            .answer_callback_query(&e.callback_id, None)
            .await
        {
            warn!(error = %err, "failed to answer callback query");
        }

        let source = e.message;
        match e.data.as_str() {
            cb::MENU_CREATE => {
                let reply =
                    Self::reply_for(self.begin_dialogue(e.owner_id, e.username.clone()).await)?;
                self.respond(e.chat_id, source, reply).await
            }
            cb::MENU_DELETE => {
                let reply = Self::reply_for(self.delete_profile(e.owner_id).await)?;
                self.respond(e.chat_id, source, reply).await
            }
            cb::MENU_AVAILABLE => {
                let reply = Self::reply_for(self.offer_durations(e.owner_id).await)?;
                self.respond(e.chat_id, source, reply).await
            }
            data if data.starts_with(cb::DURATION_PREFIX) => {
                let reply = Self::reply_for(self.go_available(e.owner_id, data).await)?;
                self.respond(e.chat_id, source, reply).await
            }
            _ => {
                // Anything else belongs to an in-flight dialogue.
                let input = DialogueInput::Select(e.data.clone());
                match self.sessions.apply(e.owner_id, input).await {
                    Some(step) => self.finish_step(e.chat_id, source, step).await,
                    None => {
                        self.respond(
                            e.chat_id,
                            source,
                            Reply::text("That menu has expired. Send /start to begin again."),
                        )
                        .await
                    }
                }
            }
        }
    }

    async fn begin_dialogue(&self, owner_id: UserId, username: Option<String>) -> Result<Reply> {
        self.authorize(owner_id)?;
        Ok(self.sessions.begin(owner_id, username).await)
    }

    async fn delete_profile(&self, owner_id: UserId) -> Result<Reply> {
        self.authorize(owner_id)?;
        // Take down any live listing first so its timer is disarmed.
        self.scheduler.cancel(owner_id).await?;
        Ok(if self.store.remove_profile(owner_id).await {
            Reply::text("🗑️ Your profile and any active listing have been removed.")
        } else {
            Reply::text("You don't have a profile yet.")
        })
    }

    async fn offer_durations(&self, owner_id: UserId) -> Result<Reply> {
        self.authorize(owner_id)?;
        if self.store.get_profile(owner_id).await.is_none() {
            return Err(Error::NotFound(format!(
                "no profile for owner {}",
                owner_id.0
            )));
        }
        if self.store.active_listing_for(owner_id).await.is_some() {
            return Err(Error::Conflict(format!(
                "owner {} already has an active listing",
                owner_id.0
            )));
        }
        Ok(Reply::with_keyboard(
            "How long will you be available?",
            render::duration_keyboard(&self.config.listing_duration_hours),
        ))
    }

    async fn go_available(self: &Arc<Self>, owner_id: UserId, data: &str) -> Result<Reply> {
        self.authorize(owner_id)?;
        let hours = data
            .strip_prefix(cb::DURATION_PREFIX)
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|h| self.config.listing_duration_hours.contains(h));
        let Some(hours) = hours else {
            return Ok(Reply::text("Please pick one of the offered durations."));
        };

        self.scheduler
            .publish(owner_id, Duration::from_secs(hours * 3600))
            .await?;
        Ok(Reply::text(format!(
            "🔥 You're listed as available for the next {hours} hours!"
        )))
    }

    async fn finish_step(
        &self,
        chat_id: ChatId,
        source: Option<MessageRef>,
        step: Step,
    ) -> Result<()> {
        match step.outcome {
            Outcome::Committed(profile) => {
                self.store.put_profile(profile).await;
                // Land back on the main menu so the owner can go available.
                self.respond(
                    chat_id,
                    source,
                    Reply::with_keyboard(step.reply.text, render::main_menu_keyboard()),
                )
                .await
            }
            Outcome::Continue | Outcome::Cancelled => {
                self.respond(chat_id, source, step.reply).await
            }
        }
    }

    /// Edit the originating menu message in place when we have one and the
    /// transport can edit; fall back to a fresh message otherwise (or when
    /// the edit is refused).
    async fn respond(
        &self,
        chat_id: ChatId,
        source: Option<MessageRef>,
        reply: Reply,
    ) -> Result<()> {
        let caps = self.messenger.capabilities();
        if let (Some(msg), true) = (source, caps.supports_edit) {
            let text = formatting::clip(&reply.text, caps.max_message_len);
            let edited = match reply.keyboard.clone() {
                Some(keyboard) => {
                    self.messenger
                        .edit_inline_keyboard(msg, &text, keyboard)
                        .await
                }
                None => self.messenger.edit_html(msg, &text).await,
            };
            match edited {
                Ok(()) => return Ok(()),
                Err(e) => debug!(error = %e, "edit failed, sending a fresh message"),
            }
        }
        self.send(chat_id, reply).await
    }

    async fn send(&self, chat_id: ChatId, reply: Reply) -> Result<()> {
        let text = formatting::clip(&reply.text, self.messenger.capabilities().max_message_len);
        match reply.keyboard {
            Some(keyboard) => {
                self.messenger
                    .send_inline_keyboard(chat_id, &text, keyboard)
                    .await?;
            }
            None => {
                self.messenger.send_html(chat_id, &text).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeMessenger;

    const GROUP: ChatId = ChatId(-1000);
    const PRIVATE: ChatId = ChatId(42);
    const OWNER: UserId = UserId(42);

    fn service(admins: Vec<i64>) -> (Arc<AvailabilityService>, Arc<FakeMessenger>) {
        let messenger = Arc::new(FakeMessenger::new());
        let config = Config::for_tests(GROUP, admins);
        let service = AvailabilityService::new(config, messenger.clone());
        (service, messenger)
    }

    fn command(name: &str) -> InboundEvent {
        InboundEvent::Command(CommandEvent {
            owner_id: OWNER,
            chat_id: PRIVATE,
            username: Some("ownername".to_string()),
            name: name.to_string(),
        })
    }

    fn group_command(name: &str) -> InboundEvent {
        InboundEvent::Command(CommandEvent {
            owner_id: OWNER,
            chat_id: GROUP,
            username: Some("ownername".to_string()),
            name: name.to_string(),
        })
    }

    fn text(s: &str) -> InboundEvent {
        InboundEvent::Text(TextEvent {
            owner_id: OWNER,
            chat_id: PRIVATE,
            username: Some("ownername".to_string()),
            text: s.to_string(),
        })
    }

    fn select(data: &str) -> InboundEvent {
        InboundEvent::MenuSelection(MenuSelectionEvent {
            owner_id: OWNER,
            chat_id: PRIVATE,
            username: Some("ownername".to_string()),
            callback_id: "cb".to_string(),
            data: data.to_string(),
            message: None,
        })
    }

    /// Create-profile dialogue with one offering and no media.
    async fn build_profile(service: &Arc<AvailabilityService>) {
        service.handle_event(select(cb::MENU_CREATE)).await.unwrap();
        service.handle_event(text("Scarlett")).await.unwrap();
        service
            .handle_event(select(cb::OFFER_IN_PERSON))
            .await
            .unwrap();
        service.handle_event(select(cb::VENUE_BOTH)).await.unwrap();
        service.handle_event(text("Downtown")).await.unwrap();
        service.handle_event(select(cb::OFFER_DONE)).await.unwrap();
        service.handle_event(text("skip")).await.unwrap();
        service
            .handle_event(select(cb::CONTACT_PHONE))
            .await
            .unwrap();
        service.handle_event(text("555-0100")).await.unwrap();
        service.handle_event(text("skip")).await.unwrap();
        service.handle_event(text("$300/hr")).await.unwrap();
        service.handle_event(text("Screening required")).await.unwrap();
        service.handle_event(text("done")).await.unwrap();
        service.handle_event(text("done")).await.unwrap();
        service
            .handle_event(select(cb::PREVIEW_CONFIRM))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn start_shows_main_menu_in_open_mode() {
        let (service, messenger) = service(vec![]);
        service.handle_event(command("start")).await.unwrap();

        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].keyboard.is_some());
        assert_eq!(sent[0].chat_id, PRIVATE);
    }

    #[tokio::test(start_paused = true)]
    async fn allow_list_rejects_strangers() {
        let (service, messenger) = service(vec![777]);
        service.handle_event(command("start")).await.unwrap();
        assert!(messenger.last_text().unwrap().contains("not authorized"));

        service.handle_event(select(cb::MENU_CREATE)).await.unwrap();
        assert!(messenger.last_text().unwrap().contains("not authorized"));
    }

    #[tokio::test(start_paused = true)]
    async fn full_flow_profile_then_listing_then_snapshot() {
        let (service, messenger) = service(vec![]);
        build_profile(&service).await;

        let saved = service.store.get_profile(OWNER).await.unwrap();
        assert_eq!(saved.display_name, "Scarlett");

        service
            .handle_event(select(cb::MENU_AVAILABLE))
            .await
            .unwrap();
        assert!(messenger
            .last_text()
            .unwrap()
            .contains("How long will you be available?"));

        service.handle_event(select("dur:2")).await.unwrap();
        assert_eq!(service.scheduler.active_count().await, 1);
        // Listing body went to the group, confirmation to the private chat.
        let sent = messenger.sent();
        let group_posts: Vec<_> = sent.iter().filter(|s| s.chat_id == GROUP).collect();
        assert!(group_posts.iter().any(|s| s.text.contains("Scarlett")));
        assert!(messenger.last_text().unwrap().contains("next 2 hours"));

        service.handle_event(group_command("available")).await.unwrap();
        let snapshot = messenger.last_text().unwrap();
        assert!(snapshot.contains("Available Now"));
        assert!(snapshot.contains("Scarlett"));
    }

    #[tokio::test(start_paused = true)]
    async fn createprofile_command_starts_the_dialogue() {
        let (service, messenger) = service(vec![]);
        service.handle_event(command("createprofile")).await.unwrap();

        assert!(service.sessions.has_session(OWNER).await);
        assert!(messenger.last_text().unwrap().contains("name"));
    }

    #[tokio::test(start_paused = true)]
    async fn private_available_command_opens_the_duration_picker() {
        let (service, messenger) = service(vec![]);
        build_profile(&service).await;

        service.handle_event(command("available")).await.unwrap();
        let last = messenger.sent().into_iter().last().unwrap();
        assert!(last.text.contains("How long will you be available?"));
        assert!(last.keyboard.is_some());
        assert_eq!(last.chat_id, PRIVATE);
    }

    #[tokio::test(start_paused = true)]
    async fn private_available_without_profile_is_refused() {
        let (service, messenger) = service(vec![]);
        service.handle_event(command("available")).await.unwrap();
        assert!(messenger.last_text().unwrap().contains("need a profile"));
    }

    #[tokio::test(start_paused = true)]
    async fn menu_press_answers_the_callback() {
        let (service, messenger) = service(vec![]);
        service.handle_event(select(cb::MENU_CREATE)).await.unwrap();
        assert_eq!(messenger.answered_callbacks(), vec!["cb".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn going_available_requires_a_profile() {
        let (service, messenger) = service(vec![]);
        service
            .handle_event(select(cb::MENU_AVAILABLE))
            .await
            .unwrap();
        assert!(messenger.last_text().unwrap().contains("need a profile"));
    }

    #[tokio::test(start_paused = true)]
    async fn double_listing_is_refused() {
        let (service, messenger) = service(vec![]);
        build_profile(&service).await;
        service.handle_event(select("dur:2")).await.unwrap();
        service.handle_event(select("dur:2")).await.unwrap();
        assert!(messenger
            .last_text()
            .unwrap()
            .contains("already have an active listing"));
        assert_eq!(service.scheduler.active_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_duration_is_refused() {
        let (service, messenger) = service(vec![]);
        build_profile(&service).await;
        service.handle_event(select("dur:99")).await.unwrap();
        assert!(messenger
            .last_text()
            .unwrap()
            .contains("pick one of the offered durations"));
        assert_eq!(service.scheduler.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_profile_cascades_to_the_listing() {
        let (service, messenger) = service(vec![]);
        build_profile(&service).await;
        service.handle_event(select("dur:2")).await.unwrap();
        assert_eq!(service.scheduler.active_count().await, 1);

        service.handle_event(select(cb::MENU_DELETE)).await.unwrap();
        assert!(messenger.last_text().unwrap().contains("have been removed"));
        assert!(service.store.get_profile(OWNER).await.is_none());
        assert_eq!(service.scheduler.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_command_abandons_the_dialogue() {
        let (service, messenger) = service(vec![]);
        service.handle_event(select(cb::MENU_CREATE)).await.unwrap();
        service.handle_event(text("Halfway")).await.unwrap();

        service.handle_event(command("cancel")).await.unwrap();
        assert!(messenger.last_text().unwrap().contains("cancelled"));
        assert!(!service.sessions.has_session(OWNER).await);

        // Text after cancel is not dialogue traffic any more.
        let before = messenger.sent().len();
        service.handle_event(text("stray")).await.unwrap();
        assert_eq!(messenger.sent().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_menu_press_gets_a_hint() {
        let (service, messenger) = service(vec![]);
        service
            .handle_event(select(cb::PREVIEW_CONFIRM))
            .await
            .unwrap();
        assert!(messenger.last_text().unwrap().contains("menu has expired"));
    }

    #[tokio::test(start_paused = true)]
    async fn menu_selection_edits_the_menu_message_in_place() {
        use crate::domain::MessageId;

        let (service, messenger) = service(vec![]);
        build_profile(&service).await;

        let menu = MessageRef {
            chat_id: PRIVATE,
            message_id: MessageId(500),
        };
        let before = messenger.sent().len();
        service
            .handle_event(InboundEvent::MenuSelection(MenuSelectionEvent {
                owner_id: OWNER,
                chat_id: PRIVATE,
                username: None,
                callback_id: "cb".to_string(),
                data: cb::MENU_AVAILABLE.to_string(),
                message: Some(menu),
            }))
            .await
            .unwrap();

        // No new message: the menu was edited into the duration picker.
        assert_eq!(messenger.sent().len(), before);
        let (edited_msg, edited_text) = messenger.edited().into_iter().last().unwrap();
        assert_eq!(edited_msg, menu);
        assert!(edited_text.contains("How long will you be available?"));
    }

    #[tokio::test(start_paused = true)]
    async fn commit_lands_back_on_the_main_menu() {
        let (service, messenger) = service(vec![]);
        build_profile(&service).await;
        let last = messenger.sent().into_iter().last().unwrap();
        assert!(last.text.contains("Profile saved"));
        assert!(last.keyboard.is_some());
    }
}
