//! # rfb-output: artifact sinks for reconstructed sessions
//!
//! Concrete implementations of the `rfb-session` sink interfaces:
//!
//! - [`JpegFactory`]: one directory of numbered JPEG frames per session
//! - [`MjpegFactory`]: one Motion-JPEG AVI video per session
//! - [`BinaryFactory`]: one `.bin` file per clipboard payload
//!
//! Every artifact name starts with the UTC timestamp of its first content
//! followed by the factory's stream number, so artifacts of one capture sort
//! chronologically.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rfb_session::Config;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::builder().jpeg("frames").files("clipboard").build()?;
//! let (images, files) = rfb_output::build_sinks(&config.output)?;
//! assert!(!images.is_empty());
//! # let _ = files;
//! # Ok(())
//! # }
//! ```

mod avi;
mod binary;
mod jpeg;
mod mjpeg;

pub use avi::AviWriter;
pub use binary::BinaryFactory;
pub use jpeg::{encode_jpeg, JpegFactory};
pub use mjpeg::MjpegFactory;

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use rfb_session::config::OutputConfig;
use rfb_session::{ForkFileFactory, ForkImageFactory};
use tracing::info;

/// Build the image and file fan-outs for every enabled output, creating the
/// output directories on the way.
pub fn build_sinks(config: &OutputConfig) -> Result<(ForkImageFactory, ForkFileFactory)> {
    let mut images = ForkImageFactory::default();
    let mut files = ForkFileFactory::default();

    if config.jpeg.enabled {
        let jpeg = &config.jpeg;
        fs::create_dir_all(&jpeg.directory)
            .with_context(|| format!("creating {}", jpeg.directory.display()))?;
        info!(directory = %jpeg.directory.display(), fps = jpeg.fps, "JPEG frames enabled");
        images.push(Arc::new(JpegFactory::new(
            &jpeg.directory,
            jpeg.fps,
            jpeg.quality,
        )));
    }

    if config.mjpeg.enabled {
        let mjpeg = &config.mjpeg;
        fs::create_dir_all(&mjpeg.directory)
            .with_context(|| format!("creating {}", mjpeg.directory.display()))?;
        info!(directory = %mjpeg.directory.display(), fps = mjpeg.fps, "MJPEG video enabled");
        images.push(Arc::new(MjpegFactory::new(
            &mjpeg.directory,
            mjpeg.fps,
            mjpeg.quality,
        )));
    }

    if config.files.enabled {
        let dir = &config.files.directory;
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        info!(directory = %dir.display(), "clipboard files enabled");
        files.push(Arc::new(BinaryFactory::new(dir)));
    }

    Ok((images, files))
}

/// Spacing between resampled frames at `fps` frames per second.
pub(crate) fn frame_interval(fps: u32) -> chrono::Duration {
    chrono::Duration::nanoseconds(1_000_000_000 / i64::from(fps.max(1)))
}
