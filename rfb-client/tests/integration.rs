//! Integration tests for rfb-client against a live server.
//!
//! These tests require a running VNC server. Set the environment variable
//! VNC_TEST_SERVER to specify the server address (default: localhost:5900)
//! and VNC_TEST_PASSWORD if the server needs one.
//!
//! Example:
//!   VNC_TEST_SERVER=localhost:5901 cargo test --test integration -- --ignored --nocapture

use rfb_client::{ClientBuilder, ColorModel, Config, Encoding, ServerEvent};
use std::env;
use std::time::Duration;
use tokio::time::timeout;

/// Get VNC server address from environment or use default
fn get_test_server() -> (String, u16) {
    let server = env::var("VNC_TEST_SERVER").unwrap_or_else(|_| "localhost:5900".to_string());

    if let Some((host, port_str)) = server.split_once(':') {
        let port = port_str.parse::<u16>().expect("Invalid port");
        (host.to_string(), port)
    } else {
        (server, 5900)
    }
}

fn test_config() -> Config {
    let (host, port) = get_test_server();
    let mut builder = Config::builder().host(host).port(port);
    if let Ok(password) = env::var("VNC_TEST_PASSWORD") {
        builder = builder.password(password);
    }
    builder.build().expect("valid test config")
}

/// Test basic connection and handshake
#[tokio::test]
#[ignore] // Requires running VNC server
async fn test_basic_connection() -> anyhow::Result<()> {
    let client = ClientBuilder::new(test_config()).build().await?;

    let event = timeout(Duration::from_secs(5), client.events().recv_async()).await??;
    match event {
        ServerEvent::Connected {
            width,
            height,
            name,
        } => {
            println!("Connected to: {} ({}x{})", name, width, height);
            assert!(width > 0);
            assert!(height > 0);
        }
        _ => panic!("Expected Connected event, got: {:?}", event),
    }

    client.close();
    let last = timeout(Duration::from_secs(5), client.events().recv_async()).await??;
    assert_eq!(last, ServerEvent::ConnectionClosed);
    client.join().await?;
    Ok(())
}

/// Test framebuffer updates arrive as redraw signals
#[tokio::test]
#[ignore] // Requires running VNC server
async fn test_framebuffer_updates() -> anyhow::Result<()> {
    let client = ClientBuilder::new(test_config()).build().await?;

    assert!(timeout(Duration::from_secs(10), client.redraws().changed()).await?);
    let dirty = client.take_dirty().expect("initial update marks an area dirty");
    println!("First update covered {:?}", dirty);

    client.close();
    client.join().await?;
    Ok(())
}

/// Test switching encoding and color model mid-session
#[tokio::test]
#[ignore] // Requires running VNC server
async fn test_runtime_preference_changes() -> anyhow::Result<()> {
    let client = ClientBuilder::new(test_config()).build().await?;
    assert!(timeout(Duration::from_secs(10), client.redraws().changed()).await?);

    client.set_preferred_encoding(Encoding::Hextile)?;
    client.set_color_model(ColorModel::C256)?;
    client.request_update(false)?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while client.color_model_label() != ColorModel::C256.label() {
        assert!(tokio::time::Instant::now() < deadline, "color model never switched");
        let _ = timeout(Duration::from_millis(200), client.redraws().changed()).await;
    }
    assert_eq!(client.encoding_label(), "HEXTILE");

    client.close();
    client.join().await?;
    Ok(())
}

/// Test input events don't break the session
#[tokio::test]
#[ignore] // Requires running VNC server
async fn test_input_events() -> anyhow::Result<()> {
    let client = ClientBuilder::new(test_config()).build().await?;

    client.send_pointer(100, 100, 0)?;
    client.send_pointer(100, 100, 1)?;
    client.send_pointer(100, 100, 0)?;
    client.send_key(0x0061, true)?; // 'a'
    client.send_key(0x0061, false)?;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.state(), rfb_client::SessionState::NormalProtocol);

    client.close();
    client.join().await?;
    Ok(())
}

/// Test connection refused is a connection error
#[tokio::test]
async fn test_connection_refused() {
    let config = Config::builder()
        .host("127.0.0.1")
        .port(1) // Privileged port, nothing listening
        .timeout_ms(2_000)
        .build()
        .unwrap();

    let result = ClientBuilder::new(config).build().await;
    assert!(result.is_err());
}
