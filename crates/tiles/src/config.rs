//! Tile cache configuration.
//!
//! Holds the soft memory limit for resident tiles, the directory the swap file
//! is created in, and the tile edge length. Configuration can be loaded from a
//! file, environment variables, or created programmatically.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default tile edge length in pixels
pub const TILE_SIZE: u32 = 64;

const MB: usize = 1024 * 1024;

/// Configuration for a [`TileCache`](crate::TileCache).
#[derive(Debug, Clone, PartialEq)]
pub struct TileCacheConfig {
    /// Soft limit on resident tile memory in bytes
    pub cache_size: usize,
    /// Directory the swap file is created in
    pub swap_dir: PathBuf,
    /// Tile width and height in pixels
    pub tile_size: u32,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            cache_size: 128 * MB,
            swap_dir: Self::default_swap_dir(),
            tile_size: TILE_SIZE,
        }
    }
}

impl TileCacheConfig {
    /// Creates a configuration with a cache limit in megabytes.
    pub fn new(cache_mb: usize, swap_dir: PathBuf) -> Self {
        Self {
            cache_size: cache_mb * MB,
            swap_dir,
            tile_size: TILE_SIZE,
        }
    }

    /// Sets the cache limit in megabytes.
    pub fn with_cache_mb(mut self, mb: usize) -> Self {
        self.cache_size = mb * MB;
        self
    }

    /// Sets the cache limit in bytes.
    pub fn with_cache_bytes(mut self, bytes: usize) -> Self {
        self.cache_size = bytes;
        self
    }

    /// Sets the swap directory.
    pub fn with_swap_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.swap_dir = path.as_ref().to_path_buf();
        self
    }

    /// Sets the tile edge length.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Returns the default swap directory for the current platform.
    ///
    /// - macOS: ~/Library/Caches/tessera/swap
    /// - Linux: ~/.cache/tessera/swap
    /// - Windows: %LOCALAPPDATA%\tessera\swap
    pub fn default_swap_dir() -> PathBuf {
        match dirs::cache_dir() {
            Some(cache_dir) => cache_dir.join("tessera").join("swap"),
            None => std::env::temp_dir().join("tessera-swap"),
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TESSERA_TILE_CACHE_MB`: cache limit in MB (default: 128)
    /// - `TESSERA_SWAP_DIR`: swap directory path
    /// - `TESSERA_TILE_SIZE`: tile edge length in pixels (default: 64)
    ///
    /// # Errors
    /// Returns an error if any variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TESSERA_TILE_CACHE_MB") {
            config.cache_size = parse_number::<usize>("TESSERA_TILE_CACHE_MB", &val)? * MB;
        }

        if let Ok(val) = std::env::var("TESSERA_SWAP_DIR") {
            config.swap_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("TESSERA_TILE_SIZE") {
            config.tile_size = parse_number("TESSERA_TILE_SIZE", &val)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// tile_cache_mb = 128
    /// swap_dir = "/path/to/swap"
    /// tile_size = 64
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in toml_str.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                match key {
                    "tile_cache_mb" => {
                        config.cache_size = parse_number::<usize>(key, value)? * MB;
                    }
                    "swap_dir" => config.swap_dir = PathBuf::from(value),
                    "tile_size" => config.tile_size = parse_number(key, value)?,
                    _ => {}
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml())?;
        Ok(())
    }

    fn to_toml(&self) -> String {
        format!(
            "# Tessera tile cache configuration\n\
             tile_cache_mb = {}\n\
             swap_dir = \"{}\"\n\
             tile_size = {}\n",
            self.cache_mb(),
            self.swap_dir.display(),
            self.tile_size
        )
    }

    /// Checks that the configuration can drive a cache.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size == 0 {
            return Err(ConfigError::InvalidValue("tile_size".to_string()));
        }
        Ok(())
    }

    /// Returns the cache limit in megabytes.
    pub fn cache_mb(&self) -> usize {
        self.cache_size / MB
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Errors that can occur while loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 3] = ["TESSERA_TILE_CACHE_MB", "TESSERA_SWAP_DIR", "TESSERA_TILE_SIZE"];

    #[test]
    fn test_default_config() {
        let config = TileCacheConfig::default();
        assert_eq!(config.cache_size, 128 * MB);
        assert_eq!(config.tile_size, TILE_SIZE);
        assert!(config.swap_dir.ends_with("swap") || config.swap_dir.ends_with("tessera-swap"));
    }

    #[test]
    fn test_builder_methods() {
        let config = TileCacheConfig::default()
            .with_cache_mb(16)
            .with_swap_dir("/custom/swap")
            .with_tile_size(32);

        assert_eq!(config.cache_size, 16 * MB);
        assert_eq!(config.swap_dir, PathBuf::from("/custom/swap"));
        assert_eq!(config.tile_size, 32);

        let config = config.with_cache_bytes(4096);
        assert_eq!(config.cache_size, 4096);
        assert_eq!(config.cache_mb(), 0);
    }

    #[test]
    fn test_zero_tile_size_is_rejected() {
        let config = TileCacheConfig::default().with_tile_size(0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&VARS);

        env::set_var("TESSERA_TILE_CACHE_MB", "32");
        env::set_var("TESSERA_SWAP_DIR", "/tmp/tessera-test-swap");
        env::set_var("TESSERA_TILE_SIZE", "128");

        let config = TileCacheConfig::from_env().unwrap();
        assert_eq!(config.cache_size, 32 * MB);
        assert_eq!(config.swap_dir, PathBuf::from("/tmp/tessera-test-swap"));
        assert_eq!(config.tile_size, 128);
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(&VARS);

        env::remove_var("TESSERA_SWAP_DIR");
        env::remove_var("TESSERA_TILE_SIZE");
        env::set_var("TESSERA_TILE_CACHE_MB", "8");

        let config = TileCacheConfig::from_env().unwrap();
        assert_eq!(config.cache_size, 8 * MB);
        assert_eq!(config.tile_size, TILE_SIZE);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&VARS);

        env::set_var("TESSERA_TILE_CACHE_MB", "lots");
        assert!(TileCacheConfig::from_env().is_err());

        env::set_var("TESSERA_TILE_CACHE_MB", "8");
        env::set_var("TESSERA_TILE_SIZE", "0");
        assert!(TileCacheConfig::from_env().is_err());
    }

    // Saves and restores environment variables around a test
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
            # swap on the scratch disk
            tile_cache_mb = 64
            swap_dir = "/scratch/swap"
            tile_size = 128
            unknown_key = 3
        "#;

        let config = TileCacheConfig::from_toml(toml).unwrap();
        assert_eq!(config.cache_size, 64 * MB);
        assert_eq!(config.swap_dir, PathBuf::from("/scratch/swap"));
        assert_eq!(config.tile_size, 128);
    }

    #[test]
    fn test_from_toml_invalid_number() {
        assert!(TileCacheConfig::from_toml("tile_size = big").is_err());
    }

    #[test]
    fn test_file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiles.toml");

        let config = TileCacheConfig::new(48, PathBuf::from("/tmp/swap")).with_tile_size(32);
        config.save_to_file(&path).unwrap();

        let loaded = TileCacheConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }
}
