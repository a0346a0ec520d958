//! Configuration loading, defaults and validation for inactivity-guard.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::GuardError;

/// Where the host should draw the countdown.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CountdownPlacement {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl CountdownPlacement {
    /// Get the placement as its config-file spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopLeft => "top_left",
            Self::TopRight => "top_right",
            Self::BottomLeft => "bottom_left",
            Self::BottomRight => "bottom_right",
            Self::Center => "center",
        }
    }
}

/// Returned when a string names no countdown placement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown countdown placement: {0} (expected top_left, top_right, bottom_left, bottom_right or center)")]
pub struct UnknownPlacement(String);

impl FromStr for CountdownPlacement {
    type Err = UnknownPlacement;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "top_left" => Ok(Self::TopLeft),
            "top_right" => Ok(Self::TopRight),
            "bottom_left" => Ok(Self::BottomLeft),
            "bottom_right" => Ok(Self::BottomRight),
            "center" => Ok(Self::Center),
            _ => Err(UnknownPlacement(s.to_string())),
        }
    }
}

/// Immutable configuration for one monitored scope.
///
/// Validation happens here, so a value of this type always holds a timeout
/// in `(0, MAX_TIMEOUT]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InactivityConfig {
    timeout: Duration,
    countdown_enabled: bool,
    dialog_enabled: bool,
    countdown_placement: CountdownPlacement,
}

impl InactivityConfig {
    /// Longest accepted inactivity timeout (24h).
    pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

    /// Timeouts shorter than this are accepted but logged.
    pub const RECOMMENDED_MIN_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a config with only the inactivity callback path enabled.
    pub fn new(timeout: Duration) -> Result<Self, GuardError> {
        if timeout.is_zero() || timeout > Self::MAX_TIMEOUT {
            return Err(GuardError::timeout_out_of_range(timeout, Self::MAX_TIMEOUT));
        }

        if timeout < Self::RECOMMENDED_MIN_TIMEOUT {
            warn!(
                "Inactivity timeout {:?} is below the recommended minimum of {:?}",
                timeout,
                Self::RECOMMENDED_MIN_TIMEOUT
            );
        }

        Ok(Self {
            timeout,
            countdown_enabled: false,
            dialog_enabled: false,
            countdown_placement: CountdownPlacement::default(),
        })
    }

    /// Enable the live countdown at the given placement.
    #[must_use]
    pub fn with_countdown(mut self, placement: CountdownPlacement) -> Self {
        self.countdown_enabled = true;
        self.countdown_placement = placement;
        self
    }

    /// Enable the blocking interruption dialog.
    #[must_use]
    pub fn with_dialog(mut self) -> Self {
        self.dialog_enabled = true;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn countdown_enabled(&self) -> bool {
        self.countdown_enabled
    }

    pub fn dialog_enabled(&self) -> bool {
        self.dialog_enabled
    }

    pub fn countdown_placement(&self) -> CountdownPlacement {
        self.countdown_placement
    }

    /// Timeout in whole seconds, rounded up so a countdown never starts short.
    pub fn timeout_seconds_ceil(&self) -> u64 {
        let secs = self.timeout.as_secs();
        if self.timeout.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// File-level settings for the `inactivity-guard` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds of inactivity before timing out (default: 60).
    pub timeout_seconds: u64,

    /// Show the live countdown (default: true).
    pub countdown: bool,

    /// Show the interruption dialog on timeout and on return to foreground
    /// (default: true).
    pub dialog: bool,

    /// Where to draw the countdown.
    pub countdown_placement: CountdownPlacement,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            countdown: true,
            dialog: true,
            countdown_placement: CountdownPlacement::default(),
        }
    }
}

impl Settings {
    /// Load settings from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(settings)
    }

    /// Load settings from the default path, or return defaults if not found.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let default_path = config_dir.join("inactivity-guard").join("config.toml");
            if default_path.exists() {
                return Self::load(&default_path);
            }
        }

        Ok(Self::default())
    }

    /// Validate and convert into an attachable [`InactivityConfig`].
    pub fn to_inactivity_config(&self) -> Result<InactivityConfig, GuardError> {
        let mut config = InactivityConfig::new(Duration::from_secs(self.timeout_seconds))?;
        if self.countdown {
            config = config.with_countdown(self.countdown_placement);
        }
        if self.dialog {
            config = config.with_dialog();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_zero_timeout_rejected() {
        let err = InactivityConfig::new(Duration::ZERO).unwrap_err();
        assert!(matches!(err, GuardError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_timeout_above_max_rejected() {
        let too_long = InactivityConfig::MAX_TIMEOUT + Duration::from_secs(1);
        assert!(InactivityConfig::new(too_long).is_err());
        assert!(InactivityConfig::new(InactivityConfig::MAX_TIMEOUT).is_ok());
    }

    #[test]
    fn test_short_timeout_accepted() {
        let config = InactivityConfig::new(Duration::from_millis(500)).unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.timeout_seconds_ceil(), 1);
    }

    #[test]
    fn test_builder_flags() {
        let config = InactivityConfig::new(Duration::from_secs(30)).unwrap();
        assert!(!config.countdown_enabled());
        assert!(!config.dialog_enabled());

        let config = config
            .with_countdown(CountdownPlacement::BottomLeft)
            .with_dialog();
        assert!(config.countdown_enabled());
        assert!(config.dialog_enabled());
        assert_eq!(config.countdown_placement(), CountdownPlacement::BottomLeft);
        assert_eq!(config.timeout_seconds_ceil(), 30);
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.timeout_seconds, 60);
        assert!(settings.countdown);
        assert!(settings.dialog);
        assert_eq!(settings.countdown_placement, CountdownPlacement::TopRight);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            timeout_seconds = 15
            countdown = false
            countdown_placement = "bottom_right"
        "#;

        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.timeout_seconds, 15);
        assert!(!settings.countdown);
        assert!(settings.dialog);
        assert_eq!(settings.countdown_placement, CountdownPlacement::BottomRight);
    }

    #[test]
    fn test_settings_to_config() {
        let settings = Settings {
            timeout_seconds: 10,
            countdown: true,
            dialog: false,
            countdown_placement: CountdownPlacement::Center,
        };

        let config = settings.to_inactivity_config().unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.countdown_enabled());
        assert!(!config.dialog_enabled());
        assert_eq!(config.countdown_placement(), CountdownPlacement::Center);
    }

    #[test]
    fn test_settings_zero_timeout_is_invalid() {
        let settings = Settings {
            timeout_seconds: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.to_inactivity_config(),
            Err(GuardError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_seconds = 42\ndialog = false").unwrap();

        let settings = Settings::load_or_default(Some(file.path())).unwrap();
        assert_eq!(settings.timeout_seconds, 42);
        assert!(!settings.dialog);
        assert!(settings.countdown);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_seconds = \"soon\"").unwrap();

        let err = Settings::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_placement_as_str() {
        assert_eq!(CountdownPlacement::TopLeft.as_str(), "top_left");
        assert_eq!(CountdownPlacement::Center.as_str(), "center");
    }

    #[test]
    fn test_placement_from_str() {
        assert_eq!(
            "bottom-right".parse::<CountdownPlacement>().unwrap(),
            CountdownPlacement::BottomRight
        );
        assert_eq!(
            "TOP_LEFT".parse::<CountdownPlacement>().unwrap(),
            CountdownPlacement::TopLeft
        );
        assert!("middle".parse::<CountdownPlacement>().is_err());
    }
}
