//! Configuration for the reading-session engine
//!
//! Mirrors the teacher's layered config pattern (defaults, TOML file,
//! environment overrides, then validation) scoped to the options the
//! scheduler, cache, and debounced writer need.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scheduler tuning
    pub scheduler: SchedulerConfig,
    /// Reading-window tuning
    pub window: WindowConfig,
    /// Progress-sync tuning
    pub progress: ProgressConfig,
}

/// Scheduler configuration (spec §6.3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Foreground window depth ahead of cursor. Range [3,12].
    pub window_ahead: u32,
    /// Foreground window depth behind cursor. Range [0,3].
    pub window_behind: u32,
    /// Foreground worker pool cap. Range [1,2].
    pub foreground_concurrency: usize,
    /// Background worker pool cap. Range [0,2].
    pub background_concurrency: usize,
    /// Remaining pages in chapter at which next-chapter prefetch begins. Range [2,8].
    pub chapter_preload_lead_pages: u32,
    /// Max automatic retries on retriable error. Default 2.
    pub max_auto_retries: u32,
    /// Backoff schedule in milliseconds; default `[750, 2000]`.
    pub auto_retry_backoff_ms: Vec<u64>,
}

/// Reading-window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Max loaded chapters before pruning. Default 3.
    pub max_window: usize,
}

/// Progress-sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Debounce window for progress writes, in milliseconds. Default 400.
    pub debounce_ms: u64,
    /// Timeline duplicate-event suppression window, in milliseconds. Default 5000.
    pub timeline_dup_guard_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            window_ahead: 6,
            window_behind: 2,
            foreground_concurrency: 2,
            background_concurrency: 1,
            chapter_preload_lead_pages: 4,
            max_auto_retries: 2,
            auto_retry_backoff_ms: vec![750, 2000],
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { max_window: 3 }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { debounce_ms: 400, timeline_dup_guard_ms: 5000 }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults on any error.
    pub fn load_or_default(path: Option<&str>) -> Self {
        let loaded = path.and_then(|p| Self::from_file(p).ok());
        let mut config = loaded.unwrap_or_default();
        config.clamp();
        config
    }

    /// Load configuration from a TOML file, layered over the built-in
    /// defaults and `WEBTOON_SESSION__`-prefixed environment overrides via
    /// the `config` crate.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref().to_path_buf()))
            .add_source(config::Environment::with_prefix("WEBTOON_SESSION").separator("__"))
            .build()
            .map_err(|e| Error::config(format!("failed to load config file: {e}")))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| Error::config(format!("failed to parse config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Clamp every bounded option into its legal range (spec §6.3) instead of
    /// erroring — used by [`Config::load_or_default`], which must always
    /// produce something usable.
    pub fn clamp(&mut self) {
        let s = &mut self.scheduler;
        s.window_ahead = s.window_ahead.clamp(3, 12);
        s.window_behind = s.window_behind.clamp(0, 3);
        s.foreground_concurrency = s.foreground_concurrency.clamp(1, 2);
        s.background_concurrency = s.background_concurrency.clamp(0, 2);
        s.chapter_preload_lead_pages = s.chapter_preload_lead_pages.clamp(2, 8);
        if self.window.max_window == 0 {
            self.window.max_window = 1;
        }
    }

    /// Validate configuration values, erroring instead of silently clamping.
    /// Used when loading an explicit config file, where silent clamping
    /// would mask an operator mistake.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if !(3..=12).contains(&s.window_ahead) {
            return Err(Error::config("window_ahead out of range [3,12]"));
        }
        if !(0..=3).contains(&s.window_behind) {
            return Err(Error::config("window_behind out of range [0,3]"));
        }
        if !(1..=2).contains(&s.foreground_concurrency) {
            return Err(Error::config("foreground_concurrency out of range [1,2]"));
        }
        if !(0..=2).contains(&s.background_concurrency) {
            return Err(Error::config("background_concurrency out of range [0,2]"));
        }
        if !(2..=8).contains(&s.chapter_preload_lead_pages) {
            return Err(Error::config("chapter_preload_lead_pages out of range [2,8]"));
        }
        if self.window.max_window == 0 {
            return Err(Error::config("max_window must be >= 1"));
        }
        Ok(())
    }
}
