use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    video::CodecProfile,
};

/// Main configuration for the reel compositor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output stream settings
    pub output: OutputConfig,

    /// Seek and progress timing
    pub timing: TimingConfig,

    /// Source decoding settings
    pub loader: LoaderConfig,

    /// Capture pipeline settings
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.output.validate()?;
        self.timing.validate()?;
        self.loader.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

/// Output stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Frames per second of the composited reel
    pub fps: f64,

    /// Target bitrate in bits per second
    pub bitrate: u64,

    /// Output dimensions; the first clip's native size when unset
    pub resolution: Option<(u32, u32)>,

    /// Formats to try, best first
    pub codec_preferences: Vec<CodecProfile>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            bitrate: 8_000_000, // Sports footage needs the headroom
            resolution: None,
            codec_preferences: CodecProfile::default_preferences(),
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "output.fps".to_string(),
                value: self.fps.to_string()
            }.into());
        }

        if self.bitrate == 0 {
            return Err(ConfigError::InvalidValue {
                key: "output.bitrate".to_string(),
                value: self.bitrate.to_string()
            }.into());
        }

        if let Some((w, h)) = self.resolution {
            if w == 0 || h == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "output.resolution".to_string(),
                    value: format!("{}x{}", w, h)
                }.into());
            }
        }

        if self.codec_preferences.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "output.codec_preferences".to_string(),
                value: "[]".to_string()
            }.into());
        }

        Ok(())
    }
}

/// Timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Longest wait for a seek to settle before compositing anyway (ms)
    pub seek_timeout_ms: u64,

    /// Emit a processing event every this many frames
    pub progress_interval_frames: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            seek_timeout_ms: 250,
            progress_interval_frames: 10,
        }
    }
}

impl TimingConfig {
    fn validate(&self) -> Result<()> {
        if self.seek_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timing.seek_timeout_ms".to_string(),
                value: self.seek_timeout_ms.to_string()
            }.into());
        }

        if self.progress_interval_frames == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timing.progress_interval_frames".to_string(),
                value: self.progress_interval_frames.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Source loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub ffmpeg_path: String,

    pub ffprobe_path: String,

    /// Time allowed for probing and opening one source (ms)
    pub probe_timeout_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            probe_timeout_ms: 15_000,
        }
    }
}

impl LoaderConfig {
    fn validate(&self) -> Result<()> {
        if self.ffmpeg_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "loader.ffmpeg_path".to_string(),
                value: self.ffmpeg_path.clone()
            }.into());
        }

        if self.ffprobe_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "loader.ffprobe_path".to_string(),
                value: self.ffprobe_path.clone()
            }.into());
        }

        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "loader.probe_timeout_ms".to_string(),
                value: self.probe_timeout_ms.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Capture pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Composited frames allowed to wait for the encoder
    pub queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { queue_depth: 8 }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.queue_depth".to_string(),
                value: self.queue_depth.to_string()
            }.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StitchError;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.output.resolution = Some((1280, 720));
        original_config.timing.seek_timeout_ms = 400;

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded_config.output.fps, 30.0);
        assert_eq!(loaded_config.output.resolution, Some((1280, 720)));
        assert_eq!(loaded_config.timing.seek_timeout_ms, 400);
        assert_eq!(
            loaded_config.output.codec_preferences,
            original_config.output.codec_preferences
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[output]\nfps = 25.0\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.output.fps, 25.0);
        assert_eq!(config.output.bitrate, 8_000_000);
        assert_eq!(config.pipeline.queue_depth, 8);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/reel.toml"),
            Err(StitchError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_invalid_fps() {
        let mut config = Config::default();
        config.output.fps = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_pipeline_and_codecs() {
        let mut config = Config::default();
        config.pipeline.queue_depth = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.codec_preferences.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.resolution = Some((0, 720));
        assert!(config.validate().is_err());
    }
}
