//! Scheduler configuration structures.

use serde::{Deserialize, Serialize};

use crate::core::env::SaveMask;

const fn default_true() -> bool {
    true
}

/// Root scheduler configuration.
///
/// The save flags pick which environment slots a context switch saves and
/// restores; an unselected slot leaks across switches. `lazy_stacks` defers
/// carrier thread creation to the first dispatch into a context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Save and restore the output target slot.
    #[serde(default = "default_true")]
    pub save_output: bool,
    /// Save and restore the input source slot.
    #[serde(default = "default_true")]
    pub save_input: bool,
    /// Save and restore the last-error slot.
    #[serde(default = "default_true")]
    pub save_last_error: bool,
    /// Save and restore the nested-call marker slot.
    #[serde(default = "default_true")]
    pub save_call_marker: bool,
    /// Materialize context stacks on first dispatch instead of at creation.
    #[serde(default = "default_true")]
    pub lazy_stacks: bool,
    /// Stack size for new contexts, in KiB. `None` takes the platform
    /// default.
    #[serde(default)]
    pub default_stack_size_kib: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            save_output: true,
            save_input: true,
            save_last_error: true,
            save_call_marker: true,
            lazy_stacks: true,
            default_stack_size_kib: None,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first rejected value.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_stack_size_kib == Some(0) {
            return Err("default_stack_size_kib must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `CEDENCE_*` environment variables, loading a
    /// `.env` file first when one exists. Unset variables keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns a description of the first unparseable variable or the
    /// validation failure.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        let cfg = Self {
            save_output: env_flag("CEDENCE_SAVE_OUTPUT", defaults.save_output)?,
            save_input: env_flag("CEDENCE_SAVE_INPUT", defaults.save_input)?,
            save_last_error: env_flag("CEDENCE_SAVE_LAST_ERROR", defaults.save_last_error)?,
            save_call_marker: env_flag("CEDENCE_SAVE_CALL_MARKER", defaults.save_call_marker)?,
            lazy_stacks: env_flag("CEDENCE_LAZY_STACKS", defaults.lazy_stacks)?,
            default_stack_size_kib: env_usize("CEDENCE_DEFAULT_STACK_KIB")?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// The save mask this configuration selects, including the lazy-stack
    /// toggle.
    #[must_use]
    pub fn save_mask(&self) -> SaveMask {
        let mut mask = SaveMask::empty();
        if self.save_output {
            mask |= SaveMask::OUTPUT;
        }
        if self.save_input {
            mask |= SaveMask::INPUT;
        }
        if self.save_last_error {
            mask |= SaveMask::LAST_ERROR;
        }
        if self.save_call_marker {
            mask |= SaveMask::CALL_MARKER;
        }
        if self.lazy_stacks {
            mask |= SaveMask::LAZY_STACK;
        }
        mask
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str, default: bool) -> Result<bool, String> {
    match std::env::var(name) {
        Ok(value) => {
            parse_flag(&value).ok_or_else(|| format!("{name} must be a boolean, got `{value}`"))
        }
        Err(_) => Ok(default),
    }
}

fn env_usize(name: &str) -> Result<Option<usize>, String> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| format!("{name} must be an integer: {e}")),
        Err(_) => Ok(None),
    }
}
