//! Application-level configuration loading, including battle timing and scoring constants.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_ARENA_BACK_CONFIG_PATH";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Timing constants driving the per-match phase loop.
    pub timing: TimingConfig,
    /// Constants feeding the scoring engine.
    pub scoring: ScoringConfig,
}

/// Timing constants for the phase driver and answer window checks.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Countdown broadcast before the first question is revealed, in seconds.
    pub pre_countdown_secs: u64,
    /// Pause between answer reveal and the next question, in seconds.
    pub interlude_secs: u64,
    /// Answer window applied when a match record carries no explicit limit.
    pub default_seconds_per_question: u32,
}

/// Scoring constants; these are configuration rather than fixed law so
/// operators can tune the anti-cheat threshold and point curve per deployment.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Answers faster than this are treated as suspiciously fast.
    pub min_answer_time_ms: u64,
    /// Flat base points awarded in standard mode.
    pub standard_base: i64,
    /// Standard-mode award when the anti-cheat threshold trips.
    pub standard_suspicious_base: i64,
    /// Lowest speed-weighted base, reached as the window runs out.
    pub speed_floor: i64,
    /// Highest speed-weighted base, awarded for an instant (but plausible) answer.
    pub speed_ceiling: i64,
    /// Fraction of the speed-weighted base kept when the anti-cheat threshold trips.
    pub speed_suspicious_scale: f64,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded battle configuration");
                    config
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
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig {
                pre_countdown_secs: 10,
                interlude_secs: 5,
                default_seconds_per_question: 15,
            },
            scoring: ScoringConfig {
                min_answer_time_ms: 1500,
                standard_base: 100,
                standard_suspicious_base: 30,
                speed_floor: 100,
                speed_ceiling: 1000,
                speed_suspicious_scale: 0.3,
            },
        }
    }
}

/// JSON representation of the configuration file. Every field is optional so
/// a partial file only overrides what it names.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    pre_countdown_secs: Option<u64>,
    interlude_secs: Option<u64>,
    default_seconds_per_question: Option<u32>,
    min_answer_time_ms: Option<u64>,
    standard_base: Option<i64>,
    standard_suspicious_base: Option<i64>,
    speed_floor: Option<i64>,
    speed_ceiling: Option<i64>,
    speed_suspicious_scale: Option<f64>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            timing: TimingConfig {
                pre_countdown_secs: raw
                    .pre_countdown_secs
                    .unwrap_or(defaults.timing.pre_countdown_secs),
                interlude_secs: raw.interlude_secs.unwrap_or(defaults.timing.interlude_secs),
                default_seconds_per_question: raw
                    .default_seconds_per_question
                    .unwrap_or(defaults.timing.default_seconds_per_question),
            },
            scoring: ScoringConfig {
                min_answer_time_ms: raw
                    .min_answer_time_ms
                    .unwrap_or(defaults.scoring.min_answer_time_ms),
                standard_base: raw.standard_base.unwrap_or(defaults.scoring.standard_base),
                standard_suspicious_base: raw
                    .standard_suspicious_base
                    .unwrap_or(defaults.scoring.standard_suspicious_base),
                speed_floor: raw.speed_floor.unwrap_or(defaults.scoring.speed_floor),
                speed_ceiling: raw.speed_ceiling.unwrap_or(defaults.scoring.speed_ceiling),
                speed_suspicious_scale: raw
                    .speed_suspicious_scale
                    .unwrap_or(defaults.scoring.speed_suspicious_scale),
            },
        }
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
    fn partial_raw_config_keeps_defaults_for_missing_fields() {
        let raw: RawConfig = serde_json::from_str(r#"{"interlude_secs": 3}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.timing.interlude_secs, 3);
        assert_eq!(config.timing.pre_countdown_secs, 10);
        assert_eq!(config.scoring.min_answer_time_ms, 1500);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.scoring.standard_base, 100);
        assert_eq!(config.scoring.standard_suspicious_base, 30);
        assert_eq!(config.scoring.speed_ceiling, 1000);
        assert_eq!(config.timing.default_seconds_per_question, 15);
    }
}
