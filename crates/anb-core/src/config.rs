use std::{env, fs, path::Path, time::Duration};

use crate::{domain::ChatId, errors::Error, Result};

/// Typed configuration for the bot.
///
/// Everything is environment-driven, with a best-effort `.env` loader for
/// local runs.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    /// Operators allowed to manage profiles/listings. Empty = open mode:
    /// every user is treated as an operator.
    pub approved_admins: Vec<i64>,
    /// The shared group chat listings are published into.
    pub target_group: ChatId,

    // Listing lifecycle
    /// Durations offered by the availability picker, in hours.
    pub listing_duration_hours: Vec<u64>,
    /// How long an aggregate snapshot message stays in the group.
    pub snapshot_ttl: Duration,

    // Dialogue
    /// A dialogue with no input for this long is discarded; the next input
    /// starts over from the beginning.
    pub session_idle_timeout: Duration,
    pub max_images: usize,
    pub max_videos: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let target_group = env_str("TARGET_GROUP_ID")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(ChatId)
            .ok_or_else(|| {
                Error::Config("TARGET_GROUP_ID environment variable is required".to_string())
            })?;

        // An empty admin list is a deliberate open mode, not an error.
        let approved_admins = parse_csv_i64(env_str("APPROVED_ADMINS"));

        let listing_duration_hours = {
            let hours = parse_csv_u64(env_str("LISTING_DURATIONS_HOURS"));
            if hours.is_empty() {
                vec![2, 4, 6]
            } else {
                hours
            }
        };

        let snapshot_ttl = Duration::from_secs(env_u64("SNAPSHOT_TTL_SECS").unwrap_or(300));
        let session_idle_timeout =
            Duration::from_secs(env_u64("SESSION_IDLE_TIMEOUT_SECS").unwrap_or(1800));

        let max_images = env_usize("MAX_IMAGES").unwrap_or(10);
        let max_videos = env_usize("MAX_VIDEOS").unwrap_or(4);

        Ok(Self {
            telegram_bot_token,
            approved_admins,
            target_group,
            listing_duration_hours,
            snapshot_ttl,
            session_idle_timeout,
            max_images,
            max_videos,
        })
    }

    /// Defaults suitable for in-process tests (no env access).
    pub fn for_tests(target_group: ChatId, approved_admins: Vec<i64>) -> Self {
        Self {
            telegram_bot_token: "test-token".to_string(),
            approved_admins,
            target_group,
            listing_duration_hours: vec![2, 4, 6],
            snapshot_ttl: Duration::from_secs(300),
            session_idle_timeout: Duration::from_secs(1800),
            max_images: 10,
            max_videos: 4,
        }
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn parse_csv_u64(v: Option<String>) -> Vec<u64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<u64>().ok())
        .collect()
}
