//! Configuration types for the VNC client.
//!
//! A [`Config`] is normally built with [`Config::builder`] or loaded from a
//! TOML file. Every section and field has a default, so a file only needs
//! the settings it changes:
//!
//! ```
//! use rfb_client::Config;
//!
//! let config = Config::from_toml_str(r#"
//!     [connection]
//!     host = "desk.example.com"
//!
//!     [encodings]
//!     preferred = "hextile"
//!     copy_rect = true
//! "#).unwrap();
//! assert_eq!(config.connection.port, 5900);
//! ```

use crate::errors::RfbClientError;
use rfb_pixelbuffer::ColorModel;
use rfb_protocol::messages::Encoding;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete VNC client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub security: SecurityConfig,
    pub display: DisplayConfig,
    pub encodings: EncodingsConfig,
    pub memory: MemoryConfig,
}

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server hostname or IP address.
    pub host: String,
    /// Server port (typically 5900 + display number).
    pub port: u16,
    /// Connect and handshake timeout in milliseconds.
    pub timeout_ms: u64,
    /// Ask the server to leave other clients connected.
    pub shared: bool,
}

fn default_port() -> u16 {
    5900
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            shared: true,
        }
    }
}

/// Credentials. A username steers security selection towards MS-Logon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Display configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Pixel format requested at session start.
    pub color_model: ColorModel,
    /// Size of the visible area; bounds the windowed store.
    pub viewport_width: u16,
    pub viewport_height: u16,
}

fn default_viewport() -> (u16, u16) {
    (1024, 768)
}

impl Default for DisplayConfig {
    fn default() -> Self {
        let (viewport_width, viewport_height) = default_viewport();
        Self {
            color_model: ColorModel::default(),
            viewport_width,
            viewport_height,
        }
    }
}

/// Encoding preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingsConfig {
    /// Encoding asked for first.
    #[serde(with = "encoding_name")]
    pub preferred: Encoding,
    /// Advertise CopyRect right after the preferred encoding.
    pub copy_rect: bool,
    /// Compression level hint (0-9).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress_level: Option<u8>,
    /// Quality level hint (0-9).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_level: Option<u8>,
    /// Advertise the cursor pseudo-encodings. Shapes are read and dropped.
    pub cursor_updates: bool,
}

impl Default for EncodingsConfig {
    fn default() -> Self {
        Self {
            preferred: Encoding::Zrle,
            copy_rect: false,
            compress_level: None,
            quality_level: None,
            cursor_updates: false,
        }
    }
}

/// Memory limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Budget deciding between the full and windowed framebuffer stores.
    pub budget_bytes: u64,
}

fn default_budget_bytes() -> u64 {
    256 * 1024 * 1024
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            budget_bytes: default_budget_bytes(),
        }
    }
}

/// Encodings are written by name ("zrle", "hextile", ...).
mod encoding_name {
    use rfb_protocol::messages::Encoding;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(encoding: &Encoding, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&encoding.label().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Encoding, D::Error> {
        let name = String::deserialize(d)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

const MAX_LEVEL: u8 = 9;

impl Config {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, RfbClientError> {
        let config: Config = toml::from_str(text)
            .map_err(|e| RfbClientError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RfbClientError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RfbClientError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), RfbClientError> {
        if self.connection.host.is_empty() {
            return Err(RfbClientError::Config("Host cannot be empty".to_string()));
        }
        if self.connection.port == 0 {
            return Err(RfbClientError::Config("Port cannot be 0".to_string()));
        }
        if self.display.viewport_width == 0 || self.display.viewport_height == 0 {
            return Err(RfbClientError::Config(
                "Viewport must be at least 1x1".to_string(),
            ));
        }
        if self.encodings.preferred == Encoding::CopyRect {
            return Err(RfbClientError::Config(
                "CopyRect cannot be the preferred encoding".to_string(),
            ));
        }
        for (name, level) in [
            ("Compression", self.encodings.compress_level),
            ("Quality", self.encodings.quality_level),
        ] {
            if level.is_some_and(|l| l > MAX_LEVEL) {
                return Err(RfbClientError::Config(format!(
                    "{name} level must be between 0 and {MAX_LEVEL}"
                )));
            }
        }
        if self.memory.budget_bytes == 0 {
            return Err(RfbClientError::Config(
                "Memory budget cannot be 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.connection.timeout_ms)
    }

    /// Viewport as `(width, height)`.
    #[must_use]
    pub fn viewport(&self) -> (u16, u16) {
        (self.display.viewport_width, self.display.viewport_height)
    }
}

/// Builder for creating a `Config`.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from an existing configuration.
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Sets the server hostname or IP address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.connection.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.connection.port = port;
        self
    }

    #[must_use]
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.connection.timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn shared(mut self, shared: bool) -> Self {
        self.config.connection.shared = shared;
        self
    }

    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.security.username = Some(username.into());
        self
    }

    /// Sets the VNC password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.security.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn color_model(mut self, model: ColorModel) -> Self {
        self.config.display.color_model = model;
        self
    }

    #[must_use]
    pub fn viewport(mut self, width: u16, height: u16) -> Self {
        self.config.display.viewport_width = width;
        self.config.display.viewport_height = height;
        self
    }

    #[must_use]
    pub fn preferred_encoding(mut self, encoding: Encoding) -> Self {
        self.config.encodings.preferred = encoding;
        self
    }

    #[must_use]
    pub fn copy_rect(mut self, enabled: bool) -> Self {
        self.config.encodings.copy_rect = enabled;
        self
    }

    #[must_use]
    pub fn compress_level(mut self, level: u8) -> Self {
        self.config.encodings.compress_level = Some(level);
        self
    }

    #[must_use]
    pub fn quality_level(mut self, level: u8) -> Self {
        self.config.encodings.quality_level = Some(level);
        self
    }

    #[must_use]
    pub fn cursor_updates(mut self, enabled: bool) -> Self {
        self.config.encodings.cursor_updates = enabled;
        self
    }

    #[must_use]
    pub fn memory_budget(mut self, bytes: u64) -> Self {
        self.config.memory.budget_bytes = bytes;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<Config, RfbClientError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .host("localhost")
            .port(5901)
            .username("admin")
            .preferred_encoding(Encoding::Hextile)
            .copy_rect(true)
            .build()
            .unwrap();

        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 5901);
        assert_eq!(config.security.username.as_deref(), Some("admin"));
        assert_eq!(config.encodings.preferred, Encoding::Hextile);
        assert!(config.encodings.copy_rect);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.connection.port, 5900);
        assert!(config.connection.shared);
        assert_eq!(config.display.color_model, ColorModel::C24bit);
        assert_eq!(config.encodings.preferred, Encoding::Zrle);
        assert!(!config.encodings.copy_rect);
        assert!(!config.encodings.cursor_updates);
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_validation_empty_host() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_port() {
        assert!(Config::builder().host("localhost").port(0).build().is_err());
    }

    #[test]
    fn test_config_validation_levels() {
        assert!(Config::builder().host("h").compress_level(9).build().is_ok());
        assert!(Config::builder().host("h").compress_level(10).build().is_err());
        assert!(Config::builder().host("h").quality_level(12).build().is_err());
    }

    #[test]
    fn test_copyrect_cannot_be_preferred() {
        let err = Config::builder()
            .host("h")
            .preferred_encoding(Encoding::CopyRect)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("CopyRect"));
    }

    #[test]
    fn test_toml_sections() {
        let config = Config::from_toml_str(
            r#"
            [connection]
            host = "10.0.0.5"
            port = 5901
            shared = false

            [security]
            username = "user"
            password = "secret"

            [display]
            color_model = "256"
            viewport_width = 800
            viewport_height = 600

            [encodings]
            preferred = "CoRRE"
            compress_level = 6
            cursor_updates = true

            [memory]
            budget_bytes = 1048576
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.port, 5901);
        assert!(!config.connection.shared);
        assert_eq!(config.security.password.as_deref(), Some("secret"));
        assert_eq!(config.display.color_model, ColorModel::C256);
        assert_eq!(config.viewport(), (800, 600));
        assert_eq!(config.encodings.preferred, Encoding::CoRre);
        assert_eq!(config.encodings.compress_level, Some(6));
        assert!(config.encodings.cursor_updates);
        assert_eq!(config.memory.budget_bytes, 1 << 20);
    }

    #[test]
    fn test_toml_unknown_encoding() {
        let err = Config::from_toml_str(
            r#"
            [connection]
            host = "h"
            [encodings]
            preferred = "tight"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("tight"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::builder()
            .host("h")
            .preferred_encoding(Encoding::Zlib)
            .build()
            .unwrap();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("preferred = \"zlib\""));
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }
}
