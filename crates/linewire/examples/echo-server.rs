//! Minimal echo server: accepts one peer and echoes its messages back.
//!
//! Run with:
//!   cargo run -p linewire --example echo-server
//!
//! In another terminal:
//!   cargo run -p linewire --features cli -- send <socket path> --text hello --wait

use std::fs;

use linewire::channel::{ChannelListener, ErrorSource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("linewire-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let listener = ChannelListener::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    let channel = listener.accept()?;
    eprintln!("Peer connected: {}", channel.id());

    let sender = channel.sender();
    channel.on_text(move |text| {
        eprintln!("Received text: {text}");
        sender.send_text(text)?;
        Ok(())
    });
    let sender = channel.sender();
    channel.on_binary(move |payload| {
        eprintln!("Received {} bytes", payload.len());
        sender.send_binary(payload)?;
        Ok(())
    });
    channel.on_error(|err| {
        match err.source {
            ErrorSource::StreamIo => eprintln!("Peer disconnected"),
            _ => eprintln!("Error: {err}"),
        }
        Ok(())
    });

    channel.start()?;
    channel.join();

    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
