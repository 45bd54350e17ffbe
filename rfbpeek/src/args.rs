use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rfb_session::Config;

#[derive(Parser, Debug)]
#[command(name = "rfbpeek")]
#[command(about = "Reconstructs RFB (VNC) sessions from packet captures")]
#[command(version)]
pub struct Args {
    /// Capture files (pcap or pcapng), replayed in order
    #[arg(required = true, value_name = "CAPTURE")]
    pub captures: Vec<PathBuf>,

    /// Packet filter, e.g. "host 10.0.0.5 and port 5900"
    #[arg(long, value_name = "EXPR")]
    pub filter: Option<String>,

    /// Output JPEG frames
    #[arg(long)]
    pub jpeg: bool,

    /// Output directory for the JPEG frames
    #[arg(long, value_name = "DIR")]
    pub jpeg_dir: Option<PathBuf>,

    /// JPEG frame quality percentage
    #[arg(long, value_name = "PERCENT")]
    pub jpeg_quality: Option<u8>,

    /// JPEG frames per second (0 writes every frame)
    #[arg(long, value_name = "FPS")]
    pub jpeg_fps: Option<u32>,

    /// Output MJPEG videos
    #[arg(long)]
    pub mjpeg: bool,

    /// Output directory for the MJPEG videos
    #[arg(long, value_name = "DIR")]
    pub mjpeg_dir: Option<PathBuf>,

    /// MJPEG video quality percentage
    #[arg(long, value_name = "PERCENT")]
    pub mjpeg_quality: Option<u8>,

    /// MJPEG frames per second
    #[arg(long, value_name = "FPS")]
    pub mjpeg_fps: Option<u32>,

    /// Output clipboard files
    #[arg(long)]
    pub files: bool,

    /// Output directory for the clipboard files
    #[arg(long, value_name = "DIR")]
    pub files_dir: Option<PathBuf>,

    /// Discard unrecognised connections instead of sniffing them again
    #[arg(long)]
    pub strict: bool,

    /// Expect the VNC viewer to open the connection (no reverse VNC)
    #[arg(long)]
    pub forward: bool,

    /// Let client SetPixelFormat messages change the decoded format
    #[arg(long)]
    pub negotiate_pixel_format: bool,

    /// Configuration file path
    #[arg(short, long, env = "RFBPEEK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// The configuration file (if any) overridden by explicit flags.
    pub fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_toml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Config::default(),
        };

        if self.strict {
            config.router.strict = true;
        }
        if self.forward {
            config.router.reverse_roles = false;
        }
        if self.negotiate_pixel_format {
            config.session.negotiate_pixel_format = true;
        }

        let jpeg = &mut config.output.jpeg;
        jpeg.enabled |= self.jpeg;
        if let Some(dir) = &self.jpeg_dir {
            jpeg.directory = dir.clone();
        }
        if let Some(quality) = self.jpeg_quality {
            jpeg.quality = quality;
        }
        if let Some(fps) = self.jpeg_fps {
            jpeg.fps = fps;
        }

        let mjpeg = &mut config.output.mjpeg;
        mjpeg.enabled |= self.mjpeg;
        if let Some(dir) = &self.mjpeg_dir {
            mjpeg.directory = dir.clone();
        }
        if let Some(quality) = self.mjpeg_quality {
            mjpeg.quality = quality;
        }
        if let Some(fps) = self.mjpeg_fps {
            mjpeg.fps = fps;
        }

        let files = &mut config.output.files;
        files.enabled |= self.files;
        if let Some(dir) = &self.files_dir {
            files.directory = dir.clone();
        }

        config.validate()?;
        Ok(config)
    }
}
