use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{FaderMode, NavigationPolicy, PlaybackLayout, Settings};
use crate::midi::decoder::{DEFAULT_TIMEOUT_MS, MIN_TIMEOUT_MS};
use crate::midi::rate_limiter::{DEFAULT_DEBOUNCE_MS, MAX_DEBOUNCE_MS, MIN_DEBOUNCE_MS};

/// Configuration manager for cue list settings
/// Separates the schema of available options from the persisted values.
/// Configuration is stored in config.json in the working directory by default
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

/// Available configuration options with validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSchema {
    pub cue_list: CueListConfigSchema,
    pub midi: MidiConfigSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CueListConfigSchema {
    pub navigation_policy: ConfigOption<NavigationPolicy>,
    pub playback_layout: ConfigOption<PlaybackLayout>,
    pub fader_mode: ConfigOption<FaderMode>,
    pub midi_step_enabled: ConfigOption<bool>,
    pub midi_two_note_mode: ConfigOption<bool>,
    pub midi_timeout_ms: ConfigOption<u64>,
    pub midi_debounce_ms: ConfigOption<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiConfigSchema {
    pub midi_enabled: ConfigOption<bool>,
    pub midi_device: ConfigOption<String>,
}

/// Configuration option with validation and available choices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigOption<T> {
    pub default: T,
    pub valid_range: Option<(T, T)>,
    pub valid_choices: Option<Vec<T>>,
    pub description: String,
    pub requires_restart: bool,
}

/// Persisted configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub settings: Settings,
    pub created_at: String,
    pub modified_at: String,
}

impl ConfigManager {
    /// Create a new configuration manager
    /// If no path is provided, defaults to 'config.json' in the current working directory
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.unwrap_or_else(|| PathBuf::from("config.json"));

        Self {
            config_path,
            settings: Settings::default(),
        }
    }

    /// Load settings from the configuration file, creating it with defaults
    /// when missing. Out-of-range numbers are clamped, not rejected.
    pub fn load(&mut self) -> Result<Settings, ConfigError> {
        if !self.config_path.exists() {
            self.save()?;
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config_file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Config file version {} doesn't match application version {}. Using defaults for new settings.",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        let mut settings = config_file.settings;
        let adjusted = Self::normalize_settings(&mut settings);
        if !adjusted.is_empty() {
            log::warn!("Adjusted config values: {}", adjusted.join(", "));
        }

        self.settings = settings;
        Ok(self.settings.clone())
    }

    /// Save current settings to configuration file
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.settings.clone(),
            created_at: self.created_at().unwrap_or_else(|| now.clone()),
            modified_at: now,
        };

        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(&self.config_path, content)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    // Creation time of an existing, readable config file
    fn created_at(&self) -> Option<String> {
        let content = fs::read_to_string(&self.config_path).ok()?;
        let config_file: ConfigFile = serde_json::from_str(&content).ok()?;
        Some(config_file.created_at)
    }

    /// Update settings and save to file
    pub fn update_settings(&mut self, mut settings: Settings) -> Result<(), ConfigError> {
        Self::normalize_settings(&mut settings);
        self.settings = settings;
        self.save()
    }

    /// Get current settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Get configuration schema with available options
    pub fn schema() -> ConfigSchema {
        ConfigSchema {
            cue_list: CueListConfigSchema {
                navigation_policy: ConfigOption {
                    default: NavigationPolicy::RunFirstOnIdle,
                    valid_range: None,
                    valid_choices: Some(vec![
                        NavigationPolicy::RunFirstOnIdle,
                        NavigationPolicy::RunNextOnIdle,
                        NavigationPolicy::SelectOnIdle,
                        NavigationPolicy::DoNothingOnIdle,
                    ]),
                    description: "Behavior of Next/Previous while the sequence is stopped"
                        .to_string(),
                    requires_restart: false,
                },
                playback_layout: ConfigOption {
                    default: PlaybackLayout::PlayPauseStop,
                    valid_range: None,
                    valid_choices: Some(vec![
                        PlaybackLayout::PlayPauseStop,
                        PlaybackLayout::PlayStopPause,
                    ]),
                    description: "Meaning of the Play and Stop buttons while running".to_string(),
                    requires_restart: false,
                },
                fader_mode: ConfigOption {
                    default: FaderMode::None,
                    valid_range: None,
                    valid_choices: Some(vec![FaderMode::None, FaderMode::Crossfade, FaderMode::Steps]),
                    description: "Side fader function".to_string(),
                    requires_restart: false,
                },
                midi_step_enabled: ConfigOption {
                    default: false,
                    valid_range: None,
                    valid_choices: None,
                    description: "Select steps from MIDI note velocities".to_string(),
                    requires_restart: false,
                },
                midi_two_note_mode: ConfigOption {
                    default: false,
                    valid_range: None,
                    valid_choices: None,
                    description: "Combine two velocities into one step number (up to 16383)"
                        .to_string(),
                    requires_restart: false,
                },
                midi_timeout_ms: ConfigOption {
                    default: DEFAULT_TIMEOUT_MS,
                    valid_range: Some((MIN_TIMEOUT_MS, u64::MAX)),
                    valid_choices: None,
                    description: "Time to wait for the second velocity in milliseconds"
                        .to_string(),
                    requires_restart: false,
                },
                midi_debounce_ms: ConfigOption {
                    default: DEFAULT_DEBOUNCE_MS,
                    valid_range: Some((MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS)),
                    valid_choices: None,
                    description: "Minimum time between two MIDI step changes in milliseconds"
                        .to_string(),
                    requires_restart: false,
                },
            },
            midi: MidiConfigSchema {
                midi_enabled: ConfigOption {
                    default: false,
                    valid_range: None,
                    valid_choices: None,
                    description: "Enable MIDI input for live control".to_string(),
                    requires_restart: true,
                },
                midi_device: ConfigOption {
                    default: "None".to_string(),
                    valid_range: None,
                    valid_choices: None, // Will be populated from system enumeration
                    description: "MIDI device name (substring match)".to_string(),
                    requires_restart: true,
                },
            },
        }
    }

    /// Clamp numeric settings into their valid ranges. Returns a description
    /// of every adjusted field.
    pub fn normalize_settings(settings: &mut Settings) -> Vec<String> {
        let mut adjusted = Vec::new();
        let schema = Self::schema();
        let midi_step = &mut settings.cue_list.midi_step;

        if let Some((min, max)) = schema.cue_list.midi_timeout_ms.valid_range {
            let clamped = midi_step.timeout_ms.clamp(min, max);
            if clamped != midi_step.timeout_ms {
                adjusted.push(format!(
                    "midi timeout {}ms -> {}ms",
                    midi_step.timeout_ms, clamped
                ));
                midi_step.timeout_ms = clamped;
            }
        }

        if let Some((min, max)) = schema.cue_list.midi_debounce_ms.valid_range {
            let clamped = midi_step.debounce_ms.clamp(min, max);
            if clamped != midi_step.debounce_ms {
                adjusted.push(format!(
                    "midi debounce {}ms -> {}ms",
                    midi_step.debounce_ms, clamped
                ));
                midi_step.debounce_ms = clamped;
            }
        }

        adjusted
    }

    /// Reset settings to defaults
    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.settings = Settings::default();
        self.save()
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Failed to parse config file: {0}")]
    ParseError(String),
    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
}
