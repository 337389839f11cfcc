//! Headless VNC client example - connect and log session events.
//!
//! Usage:
//!   cargo run -p rfb-client --features cli --example headless_connect -- localhost:5900 -P secret
//!
//! This example demonstrates:
//! - Building a configuration from command-line arguments
//! - Connecting to a VNC server
//! - Waiting on coalesced redraw signals and sampling the framebuffer
//! - Graceful shutdown on Ctrl-C

use rfb_client::args::Args;
use rfb_client::{ClientBuilder, Config, ServerEvent};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_filter())),
        )
        .init();

    let config = Config::from_args(args)?;
    info!(
        "Connecting to {}:{}",
        config.connection.host, config.connection.port
    );

    let client = match ClientBuilder::new(config).build().await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to connect ({}): {}", e.kind(), e);
            return Err(e.into());
        }
    };
    info!(
        "Desktop '{}' {:?}, {}, {}",
        client.desktop_name(),
        client.framebuffer_size(),
        client.encoding_label(),
        client.color_model_label()
    );

    let redraws = client.redraws().clone();
    let surface = client.framebuffer();
    let mut redraw_count = 0u64;
    let mut redraws_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing");
                client.close();
            }
            changed = redraws.changed(), if redraws_open => {
                if !changed {
                    redraws_open = false;
                    continue;
                }
                redraw_count += 1;
                if let Some(dirty) = redraws.take_dirty() {
                    let surface = surface.lock();
                    let sample = surface.pixel(dirty.x, dirty.y).unwrap_or_default();
                    debug!(
                        "Redraw #{}: {}x{} at ({}, {}), first pixel {:#010X}",
                        redraw_count, dirty.width, dirty.height, dirty.x, dirty.y, sample
                    );
                }
            }
            event = client.events().recv_async() => {
                match event {
                    Ok(ServerEvent::Connected { width, height, name }) => {
                        info!("Connected to '{}' ({}x{})", name, width, height);
                    }
                    Ok(ServerEvent::DesktopResized { width, height }) => {
                        info!("Desktop resized to {}x{}", width, height);
                    }
                    Ok(ServerEvent::Bell) => debug!("Bell"),
                    Ok(ServerEvent::Error { kind, message }) => {
                        error!("Session failed ({}): {}", kind, message);
                        break;
                    }
                    Ok(ServerEvent::ConnectionClosed) | Err(_) => {
                        info!("Connection closed");
                        break;
                    }
                }
            }
        }
    }

    info!("Received {} redraw signals", redraw_count);
    client.join().await?;
    Ok(())
}
