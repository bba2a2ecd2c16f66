// Configuration management - loading/saving settings, with sensible
// defaults when the config file is missing

use anyhow::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const APP_NAME: &str = "ocarina";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub music_directories: Vec<PathBuf>,
    pub database_path: PathBuf,
    pub download_directory: PathBuf,
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Startup volume, 0-100
    pub volume: u8,
    /// How often the playback loop polls the engine, in milliseconds
    pub tick_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME);
        let music_dir = dirs::audio_dir().unwrap_or_else(|| PathBuf::from("~/Music"));

        Self {
            music_directories: vec![music_dir.clone()],
            database_path: config_dir.join("library.db"),
            download_directory: music_dir.join("Downloads"),
            playback: PlaybackConfig {
                volume: 50,
                tick_interval_ms: 200,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content)?;

        Ok(())
    }

    pub fn log_dir() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join(APP_NAME).join("logs"))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("could not find config directory"))?
            .join(APP_NAME);

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Config {
            music_directories: vec![PathBuf::from("/music")],
            database_path: PathBuf::from("/data/library.db"),
            download_directory: PathBuf::from("/music/dl"),
            playback: PlaybackConfig {
                volume: 80,
                tick_interval_ms: 100,
            },
        };

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.music_directories, config.music_directories);
        assert_eq!(parsed.database_path, config.database_path);
        assert_eq!(parsed.playback.volume, 80);
        assert_eq!(parsed.playback.tick_interval_ms, 100);
    }

    #[test]
    fn test_defaults_are_reasonable() {
        let config = Config::default();
        assert!(!config.music_directories.is_empty());
        assert!(config.playback.volume <= 100);
        assert!(config.playback.tick_interval_ms > 0);
    }
}
