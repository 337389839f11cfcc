//! Command-line argument parsing for VNC client applications.
//!
//! This module is only available when the `cli` feature is enabled.
//!
//! # Examples
//!
//! ```no_run
//! use rfb_client::args::Args;
//! use rfb_client::Config;
//!
//! let args = Args::parse();
//! let config = Config::from_args(args)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::config::{Config, ConfigBuilder};
use crate::errors::RfbClientError;
use clap::Parser;
use rfb_pixelbuffer::ColorModel;
use rfb_protocol::messages::Encoding;

/// VNC client command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// VNC server address (host:port or host:display)
    ///
    /// Examples:
    ///   - localhost:5900
    ///   - 192.168.1.100:0 (display :0 = port 5900)
    ///   - vnc.example.com:1 (display :1 = port 5901)
    #[arg(value_name = "SERVER")]
    pub server: String,

    /// Server port (overrides port in SERVER if specified)
    #[arg(short = 'p', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Username; makes MS-Logon II preferred when the server offers it
    #[arg(short = 'u', long, value_name = "USER")]
    pub username: Option<String>,

    /// Password for authentication
    #[arg(short = 'P', long, value_name = "PASSWORD", env = "VNC_PASSWORD")]
    pub password: Option<String>,

    /// Preferred encoding
    ///
    /// Available: raw, rre, corre, hextile, zlib, zrle
    #[arg(short = 'e', long, value_name = "ENCODING", value_parser = parse_encoding)]
    pub encoding: Option<Encoding>,

    /// Advertise CopyRect
    #[arg(long)]
    pub copy_rect: bool,

    /// Color model: "24bit" or "256"
    #[arg(long, value_name = "MODEL", value_parser = parse_color_model)]
    pub color_model: Option<ColorModel>,

    /// Compression level hint (0-9)
    #[arg(long, value_name = "LEVEL")]
    pub compress_level: Option<u8>,

    /// Quality level hint (0-9)
    #[arg(long, value_name = "LEVEL")]
    pub quality_level: Option<u8>,

    /// Request an exclusive session (disconnect other clients)
    #[arg(long)]
    pub exclusive: bool,

    /// Configuration file path (TOML format)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_encoding(value: &str) -> Result<Encoding, String> {
    value.parse()
}

fn parse_color_model(value: &str) -> Result<ColorModel, String> {
    value.parse()
}

impl Args {
    /// Parse command-line arguments.
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse arguments from an iterator.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are invalid.
    pub fn try_parse_from<I, T>(iter: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// `tracing` filter directive for the verbosity count.
    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

impl Config {
    /// Create a configuration from command-line arguments.
    ///
    /// If a config file is given it is loaded first, then overridden by
    /// explicit command-line arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file cannot be read or parsed
    /// - The server address is invalid
    /// - The configuration validation fails
    pub fn from_args(args: Args) -> Result<Self, RfbClientError> {
        let mut builder = match &args.config {
            Some(path) => ConfigBuilder::from_config(Config::load(path)?),
            None => Config::builder(),
        };

        let (host, port) = parse_server_address(&args.server)?;
        builder = builder.host(host).port(args.port.unwrap_or(port));

        if let Some(username) = args.username {
            builder = builder.username(username);
        }
        if let Some(password) = args.password {
            builder = builder.password(password);
        }
        if let Some(encoding) = args.encoding {
            builder = builder.preferred_encoding(encoding);
        }
        if args.copy_rect {
            builder = builder.copy_rect(true);
        }
        if let Some(model) = args.color_model {
            builder = builder.color_model(model);
        }
        if let Some(level) = args.compress_level {
            builder = builder.compress_level(level);
        }
        if let Some(level) = args.quality_level {
            builder = builder.quality_level(level);
        }
        if args.exclusive {
            builder = builder.shared(false);
        }

        builder.build()
    }
}

/// Parse server address in the format "host:port" or "host:display".
///
/// VNC display numbers (0-99) are converted to port numbers (5900-5999).
fn parse_server_address(server: &str) -> Result<(String, u16), RfbClientError> {
    if let Some((host, port_or_display)) = server.split_once(':') {
        let num = port_or_display.parse::<u16>().map_err(|_| {
            RfbClientError::Config(format!(
                "Invalid port or display number: {port_or_display}"
            ))
        })?;

        let port = if num < 100 {
            // Display number: :0 = 5900, :1 = 5901, etc.
            5900 + num
        } else {
            num
        };

        Ok((host.to_string(), port))
    } else {
        Ok((server.to_string(), 5900))
    }
}
