//! Configuration types for session reconstruction.

use crate::errors::SessionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete reconstruction configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Connection routing settings.
    #[serde(default)]
    pub router: RouterConfig,
    /// RFB session settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Output sink settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Connection routing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Abandon a direction the first time no protocol handler recognises it.
    /// When false, unrecognised bytes are cleared and sniffing continues.
    #[serde(default)]
    pub strict: bool,
    /// Register the RFB handler with client and server roles swapped, for
    /// reverse connections where the server side opens the connection.
    #[serde(default = "default_true")]
    pub reverse_roles: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strict: false,
            reverse_roles: default_true(),
        }
    }
}

/// RFB session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Adopt the pixel format requested by SetPixelFormat.
    #[serde(default)]
    pub negotiate_pixel_format: bool,
    /// Largest framebuffer (width x height) a ServerInit may announce.
    #[serde(default = "default_max_framebuffer_pixels")]
    pub max_framebuffer_pixels: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            negotiate_pixel_format: false,
            max_framebuffer_pixels: default_max_framebuffer_pixels(),
        }
    }
}

/// Output sink configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Still frames, one JPEG per frame.
    #[serde(default)]
    pub jpeg: JpegConfig,
    /// Motion JPEG video, one AVI per session.
    #[serde(default)]
    pub mjpeg: MjpegConfig,
    /// Clipboard payloads, one file per payload.
    #[serde(default)]
    pub files: FilesConfig,
}

/// JPEG frame output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JpegConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Encoder quality (1-100).
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// Frames per second (0 = write every frame as it completes).
    #[serde(default)]
    pub fps: u32,
}

impl Default for JpegConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_directory(),
            quality: default_quality(),
            fps: 0,
        }
    }
}

/// MJPEG video output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MjpegConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Encoder quality (1-100).
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// Video frame rate, must be positive.
    #[serde(default = "default_mjpeg_fps")]
    pub fps: u32,
}

impl Default for MjpegConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_directory(),
            quality: default_quality(),
            fps: default_mjpeg_fps(),
        }
    }
}

/// Clipboard file output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_directory(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_quality() -> u8 {
    100
}

fn default_mjpeg_fps() -> u32 {
    10
}

fn default_max_framebuffer_pixels() -> u64 {
    8192 * 8192
}

impl Config {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Loads and validates a configuration from a TOML file.
    ///
    /// Sections and fields missing from the file take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// holds invalid values.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or holds invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self, SessionError> {
        let config: Self =
            toml::from_str(text).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.session.max_framebuffer_pixels == 0 {
            return Err(SessionError::Config(
                "Framebuffer pixel limit must be positive".to_string(),
            ));
        }

        let jpeg = &self.output.jpeg;
        if !(1..=100).contains(&jpeg.quality) {
            return Err(SessionError::Config(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        let mjpeg = &self.output.mjpeg;
        if !(1..=100).contains(&mjpeg.quality) {
            return Err(SessionError::Config(
                "MJPEG quality must be between 1 and 100".to_string(),
            ));
        }
        if mjpeg.fps == 0 {
            return Err(SessionError::Config(
                "MJPEG frame rate must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for creating a `Config`.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Abandon unrecognised directions instead of clearing and retrying.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.config.router.strict = strict;
        self
    }

    /// Register the RFB handler with client and server roles swapped.
    #[must_use]
    pub fn reverse_roles(mut self, reverse: bool) -> Self {
        self.config.router.reverse_roles = reverse;
        self
    }

    /// Adopt client-requested pixel formats.
    #[must_use]
    pub fn negotiate_pixel_format(mut self, negotiate: bool) -> Self {
        self.config.session.negotiate_pixel_format = negotiate;
        self
    }

    /// Caps the framebuffer area a ServerInit may announce.
    #[must_use]
    pub fn max_framebuffer_pixels(mut self, pixels: u64) -> Self {
        self.config.session.max_framebuffer_pixels = pixels;
        self
    }

    /// Enables JPEG frame output into `directory`.
    #[must_use]
    pub fn jpeg(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.output.jpeg.enabled = true;
        self.config.output.jpeg.directory = directory.into();
        self
    }

    /// Enables MJPEG video output into `directory`.
    #[must_use]
    pub fn mjpeg(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.output.mjpeg.enabled = true;
        self.config.output.mjpeg.directory = directory.into();
        self
    }

    /// Enables clipboard file output into `directory`.
    #[must_use]
    pub fn files(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.output.files.enabled = true;
        self.config.output.files.directory = directory.into();
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<Config, SessionError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.router.strict);
        assert!(config.router.reverse_roles);
        assert!(!config.session.negotiate_pixel_format);
        assert_eq!(config.session.max_framebuffer_pixels, 8192 * 8192);
        assert_eq!(config.output.jpeg.quality, 100);
        assert_eq!(config.output.jpeg.fps, 0);
        assert_eq!(config.output.mjpeg.fps, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .strict(true)
            .reverse_roles(false)
            .files("/tmp/clips")
            .build()
            .unwrap();

        assert!(config.router.strict);
        assert!(!config.router.reverse_roles);
        assert!(config.output.files.enabled);
        assert_eq!(config.output.files.directory, PathBuf::from("/tmp/clips"));
        assert!(!config.output.jpeg.enabled);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [router]
            strict = true

            [output.mjpeg]
            enabled = true
            fps = 25
            "#,
        )
        .unwrap();

        assert!(config.router.strict);
        assert!(config.router.reverse_roles);
        assert!(config.output.mjpeg.enabled);
        assert_eq!(config.output.mjpeg.fps, 25);
        assert_eq!(config.output.mjpeg.quality, 100);
        assert_eq!(config.output.files, FilesConfig::default());
    }

    #[test]
    fn test_config_validation_quality() {
        let mut config = Config::default();
        config.output.jpeg.quality = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.mjpeg.quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_mjpeg_fps() {
        let mut config = Config::default();
        config.output.mjpeg.fps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_pixel_limit() {
        assert!(Config::builder().max_framebuffer_pixels(0).build().is_err());
        let config = Config::from_toml_str("[session]\nmax_framebuffer_pixels = 4096\n").unwrap();
        assert_eq!(config.session.max_framebuffer_pixels, 4096);
        assert!(!config.session.negotiate_pixel_format);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml_str("[router\nstrict = 1").unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rfbpeek.toml");
        std::fs::write(&path, "[session]\nnegotiate_pixel_format = true\n").unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert!(config.session.negotiate_pixel_format);
        assert!(Config::from_toml_file(dir.path().join("missing.toml")).is_err());
    }
}
