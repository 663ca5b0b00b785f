//! # PMOPhone Configuration Module
//!
//! This module provides configuration management for PMOPhone, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::get_config;
//!
//! // Get the global configuration
//! let config = get_config();
//!
//! // Access configuration values
//! let url = config.get_playlist_url()?;
//! let frame = config.bytes_per_frame()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::info;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmophone.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load PMOPhone configuration"));
}

const ENV_CONFIG_DIR: &str = "PMOPHONE_CONFIG";
const ENV_PREFIX: &str = "PMOPHONE_CONFIG__";

/// Returns the global configuration singleton.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Macro to generate getter/setter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<u64> {
            match self.get_value($path)? {
                Value::Number(n) if n.is_u64() => Ok(n.as_u64().unwrap_or($default)),
                Value::Number(n) if n.is_i64() => {
                    Ok(n.as_i64().map(|v| v.max(0) as u64).unwrap_or($default))
                }
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for string values with default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<String> {
            match self.get_value($path)? {
                Value::String(s) => Ok(s),
                _ => Ok($default.to_string()),
            }
        }

        pub fn $setter(&self, value: &str) -> Result<()> {
            self.set_value($path, Value::String(value.to_string()))
        }
    };
}

/// Configuration manager for PMOPhone
///
/// Loads the embedded defaults, merges an optional external config.yaml
/// on top, then applies `PMOPHONE_CONFIG__<section>__<key>` environment
/// overrides. Values are read through typed getters so the streaming
/// core never hardcodes a rate, a window size or a timeout.
#[derive(Debug)]
pub struct Config {
    /// Chemin du fichier config.yaml ; `None` pour une config en mémoire.
    path: Option<String>,
    data: Mutex<Value>,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(".pmophone").exists() {
            return ".pmophone".to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(".pmophone");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        // Default fallback
        ".pmophone".to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(anyhow!("Le chemin de configuration n'est pas un répertoire"));
        }
        Ok(())
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration back
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&config_dir))?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        // Charger la configuration par défaut
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        // Merger avec le fichier externe s'il existe
        if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            let external: Value = serde_yaml::from_slice(&data)?;
            merge_yaml(&mut value, &external);
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
        }

        let mut value = lower_keys(value);
        Self::apply_env_overrides(&mut value);

        let config = Config {
            path: Some(path),
            data: Mutex::new(value),
        };
        config.save()?;
        Ok(config)
    }

    /// Builds an in-memory configuration from a YAML overlay.
    ///
    /// The overlay is merged over the embedded defaults and environment
    /// overrides still apply; nothing is read from or written to disk.
    pub fn from_yaml_str(overlay: &str) -> Result<Self> {
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        let external: Value = serde_yaml::from_str(overlay)?;
        merge_yaml(&mut value, &external);

        let mut value = lower_keys(value);
        Self::apply_env_overrides(&mut value);

        Ok(Config {
            path: None,
            data: Mutex::new(value),
        })
    }

    /// Saves the current configuration to its config.yaml file.
    ///
    /// No-op for in-memory configurations.
    pub fn save(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let data = self.data.lock().map_err(|_| anyhow!("config lock poisoned"))?;
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data.lock().map_err(|_| anyhow!("config lock poisoned"))?;
            set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().map_err(|_| anyhow!("config lock poisoned"))?;
        get_value_internal(&data, path)
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(rest) = key.strip_prefix(ENV_PREFIX) {
                let key_path = rest.split("__").collect::<Vec<_>>();
                let yaml_value = convert_env_value(&value);
                let _ = set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    // ========================================================================
    // Playlist
    // ========================================================================

    impl_string_config!(
        get_playlist_url,
        set_playlist_url,
        &["playlist", "url"],
        ""
    );
    impl_u64_config!(
        get_reload_interval_secs,
        set_reload_interval_secs,
        &["playlist", "reload_interval_secs"],
        5
    );
    impl_u64_config!(
        get_fetch_timeout_secs,
        set_fetch_timeout_secs,
        &["playlist", "fetch_timeout_secs"],
        10
    );
    impl_u64_config!(
        get_history_capacity,
        set_history_capacity,
        &["playlist", "history_capacity"],
        100
    );
    impl_u64_config!(
        get_live_window,
        set_live_window,
        &["playlist", "live_window"],
        5
    );

    // ========================================================================
    // Audio
    // ========================================================================

    impl_u64_config!(
        get_sample_rate,
        set_sample_rate,
        &["audio", "sample_rate"],
        8000
    );
    impl_u64_config!(get_channels, set_channels, &["audio", "channels"], 1);
    impl_string_config!(get_encoding, set_encoding, &["audio", "encoding"], "mulaw");
    impl_u64_config!(
        get_frame_duration_ms,
        set_frame_duration_ms,
        &["audio", "frame_duration_ms"],
        20
    );

    // ========================================================================
    // Transcode
    // ========================================================================

    impl_string_config!(
        get_ffmpeg_path,
        set_ffmpeg_path,
        &["transcode", "ffmpeg_path"],
        "ffmpeg"
    );
    impl_u64_config!(
        get_transcode_timeout_secs,
        set_transcode_timeout_secs,
        &["transcode", "timeout_secs"],
        25
    );
    impl_u64_config!(
        get_download_timeout_secs,
        set_download_timeout_secs,
        &["transcode", "download_timeout_secs"],
        10
    );

    /// Taille d'une frame audio en octets, dérivée du format configuré.
    ///
    /// C'est LA valeur que le pacer et le transcodeur doivent partager :
    /// fréquence × largeur d'échantillon × canaux × durée de frame.
    pub fn bytes_per_frame(&self) -> Result<usize> {
        let sample_rate = self.get_sample_rate()?;
        let channels = self.get_channels()?;
        let frame_ms = self.get_frame_duration_ms()?;
        let width = self.sample_width()?;
        Ok((sample_rate as usize * frame_ms as usize / 1000) * width * channels as usize)
    }

    /// Largeur d'un échantillon en octets selon l'encodage configuré.
    fn sample_width(&self) -> Result<usize> {
        let encoding = self.get_encoding()?;
        match encoding.as_str() {
            "mulaw" | "pcm_mulaw" | "alaw" | "pcm_alaw" => Ok(1),
            "s16le" | "pcm_s16le" => Ok(2),
            other => Err(anyhow!("unknown sample encoding: {other}")),
        }
    }
}

/// Merge récursif : les mappings se combinent, tout le reste s'écrase.
fn merge_yaml(base: &mut Value, overlay: &Value) {
    if let (Value::Mapping(base_map), Value::Mapping(overlay_map)) = (&mut *base, overlay) {
        for (key, value) in overlay_map {
            match base_map.get_mut(key) {
                Some(slot) => merge_yaml(slot, value),
                None => {
                    base_map.insert(key.clone(), value.clone());
                }
            }
        }
    } else {
        *base = overlay.clone();
    }
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    if let Value::Mapping(map) = data {
        let key = Value::String(path[0].to_lowercase());
        if path.len() == 1 {
            map.insert(key, value);
        } else {
            let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Current node is not a map"))
    }
}

fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
    let mut current = data;
    for (i, key) in path.iter().enumerate() {
        if let Value::Mapping(map) = current {
            let key = key.to_lowercase();
            if let Some(next) = map.get(&Value::String(key)) {
                current = next;
            } else {
                return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
            }
        } else {
            return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
        }
    }
    Ok(current.clone())
}

fn convert_env_value(value: &str) -> Value {
    if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
        return parsed;
    }
    Value::String(value.to_string())
}

fn lower_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                if let Value::String(s) = k {
                    new_map.insert(Value::String(s.to_lowercase()), lower_keys(v));
                } else {
                    new_map.insert(k, lower_keys(v));
                }
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys).collect()),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_are_telephony() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config.get_sample_rate().unwrap(), 8000);
        assert_eq!(config.get_channels().unwrap(), 1);
        assert_eq!(config.get_encoding().unwrap(), "mulaw");
        assert_eq!(config.get_frame_duration_ms().unwrap(), 20);
        assert_eq!(config.get_reload_interval_secs().unwrap(), 5);
        assert_eq!(config.get_history_capacity().unwrap(), 100);
        assert_eq!(config.get_live_window().unwrap(), 5);
        assert_eq!(config.get_transcode_timeout_secs().unwrap(), 25);
    }

    #[test]
    fn test_bytes_per_frame_follows_the_configured_format() {
        let config = Config::from_yaml_str("{}").unwrap();
        // 8000 Hz * 1 octet * 1 canal * 20 ms = 160 octets
        assert_eq!(config.bytes_per_frame().unwrap(), 160);

        let config = Config::from_yaml_str(
            "audio:\n  sample_rate: 16000\n  encoding: \"pcm_s16le\"\n",
        )
        .unwrap();
        assert_eq!(config.bytes_per_frame().unwrap(), 1280);
    }

    #[test]
    fn test_unknown_encoding_is_rejected() {
        let config = Config::from_yaml_str("audio:\n  encoding: \"opus\"\n").unwrap();
        assert!(config.bytes_per_frame().is_err());
    }

    #[test]
    fn test_overlay_overrides_defaults_and_keeps_the_rest() {
        let config = Config::from_yaml_str(
            "playlist:\n  url: \"http://example.com/x.m3u8\"\n  live_window: 3\n",
        )
        .unwrap();
        assert_eq!(config.get_playlist_url().unwrap(), "http://example.com/x.m3u8");
        assert_eq!(config.get_live_window().unwrap(), 3);
        // Non surchargé : valeur par défaut intégrée.
        assert_eq!(config.get_reload_interval_secs().unwrap(), 5);
    }

    #[test]
    fn test_env_variable_overrides_the_file() {
        // Clé dédiée à ce test pour rester indépendant des autres.
        env::set_var("PMOPHONE_CONFIG__TRANSCODE__FFMPEG_PATH", "/opt/bin/ffmpeg");
        let config = Config::from_yaml_str("{}").unwrap();
        env::remove_var("PMOPHONE_CONFIG__TRANSCODE__FFMPEG_PATH");
        assert_eq!(config.get_ffmpeg_path().unwrap(), "/opt/bin/ffmpeg");
    }

    #[test]
    fn test_load_config_reads_and_rewrites_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.yaml");
        fs::write(&file, "playlist:\n  url: \"http://radio.test/a.m3u8\"\n").unwrap();

        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.get_playlist_url().unwrap(), "http://radio.test/a.m3u8");

        // La configuration mergée a été réécrite sur disque.
        let written = fs::read_to_string(&file).unwrap();
        assert!(written.contains("sample_rate"));
    }

    #[test]
    fn test_set_value_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        config.set_live_window(7).unwrap();
        assert_eq!(config.get_live_window().unwrap(), 7);

        let reloaded = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(reloaded.get_live_window().unwrap(), 7);
    }
}
