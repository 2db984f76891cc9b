//! Application-level configuration loading, including the battle timing and balance rules.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/battle.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BATTLE_ENGINE_CONFIG_PATH";

const DEFAULT_ROUND_DURATION_MS: u64 = 30_000;
const DEFAULT_NOTICE_DISPLAY_MS: u64 = 5_000;
const DEFAULT_VOTE_WINDOW_MS: u64 = 10_000;
const DEFAULT_DIVINATION_CAP: u32 = 2;
const DEFAULT_REVIVE_PERCENT: u32 = 10;
const DEFAULT_COMMIT_ATTEMPTS: u32 = 8;

/// Timing and balance rules applied by the battle engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleRules {
    /// How long a round accepts answers and activations before closing on its own.
    pub round_duration: Duration,
    /// How long a transient notice stays on the session document.
    pub notice_display: Duration,
    /// How long a group divination vote stays open.
    pub vote_window: Duration,
    /// Successful group divination casts allowed per session.
    pub divination_cap: u32,
    /// Share of max health restored by a revival, in percent (rounded up).
    pub revive_percent: u32,
    /// Optimistic commit attempts before a write is reported as contended.
    pub commit_attempts: u32,
}

impl Default for BattleRules {
    fn default() -> Self {
        Self {
            round_duration: Duration::from_millis(DEFAULT_ROUND_DURATION_MS),
            notice_display: Duration::from_millis(DEFAULT_NOTICE_DISPLAY_MS),
            vote_window: Duration::from_millis(DEFAULT_VOTE_WINDOW_MS),
            divination_cap: DEFAULT_DIVINATION_CAP,
            revive_percent: DEFAULT_REVIVE_PERCENT,
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    rules: BattleRules,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the built-in rules.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        rules = ?app_config.rules,
                        "loaded battle rules from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Battle rules in effect.
    pub fn rules(&self) -> &BattleRules {
        &self.rules
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    round_duration_ms: Option<u64>,
    notice_display_ms: Option<u64>,
    vote_window_ms: Option<u64>,
    divination_cap: Option<u32>,
    revive_percent: Option<u32>,
    commit_attempts: Option<u32>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = BattleRules::default();
        let rules = BattleRules {
            round_duration: value
                .round_duration_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.round_duration),
            notice_display: value
                .notice_display_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.notice_display),
            vote_window: value
                .vote_window_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.vote_window),
            divination_cap: value.divination_cap.unwrap_or(defaults.divination_cap),
            revive_percent: value
                .revive_percent
                .unwrap_or(defaults.revive_percent)
                .clamp(1, 100),
            commit_attempts: value
                .commit_attempts
                .unwrap_or(defaults.commit_attempts)
                .max(1),
        };
        Self { rules }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults_for_missing_fields() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "vote_window_ms": 2500, "divination_cap": 3 }"#).unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.rules().vote_window, Duration::from_millis(2500));
        assert_eq!(config.rules().divination_cap, 3);
        assert_eq!(
            config.rules().notice_display,
            Duration::from_millis(DEFAULT_NOTICE_DISPLAY_MS)
        );
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "revive_percent": 0, "commit_attempts": 0 }"#).unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.rules().revive_percent, 1);
        assert_eq!(config.rules().commit_attempts, 1);
    }
}
