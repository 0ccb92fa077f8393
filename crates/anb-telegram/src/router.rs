use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::info;

use anb_core::{config::Config, messaging::port::MessagingPort, service::AvailabilityService};

use crate::{handlers, TelegramMessenger};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AvailabilityService>,
}

/// Build the dispatcher and long-poll until shutdown.
pub async fn run_polling(cfg: Config) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        info!(username = me.username(), "available-now bot started");
    }
    info!(
        target_group = cfg.target_group.0,
        operators = cfg.approved_admins.len(),
        open_mode = cfg.approved_admins.is_empty(),
        "configuration loaded"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let service = AvailabilityService::new(cfg, messenger);
    let state = Arc::new(AppState { service });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
