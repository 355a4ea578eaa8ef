use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use linewire_channel::{ChannelConfig, ChannelListener, ErrorEvent, ErrorSource, MessageChannel};
use tracing::{debug, info, warn};

use crate::cmd::{install_ctrlc_handler, EchoArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: EchoArgs, config: ChannelConfig) -> CliResult<i32> {
    let listener = ChannelListener::bind(&args.path)
        .map_err(|err| channel_error("bind failed", err))?
        .with_config(config);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        let channel = listener
            .accept()
            .map_err(|err| channel_error("accept failed", err))?;
        install_echo(&channel);
        channel
            .start()
            .map_err(|err| channel_error("start failed", err))?;
        info!(channel = channel.id(), "peer connected");

        while running.load(Ordering::SeqCst) && !channel.wait_stopped(POLL_INTERVAL) {}
    }

    Ok(SUCCESS)
}

/// Reply to every text and binary message with the same payload.
fn install_echo(channel: &MessageChannel) {
    let sender = channel.sender();
    channel.on_text(move |text| {
        info!(kind = "text", size = text.chars().count(), "echoing message");
        sender.send_text(text)?;
        Ok(())
    });

    let sender = channel.sender();
    channel.on_binary(move |payload| {
        info!(kind = "binary", size = payload.len(), "echoing message");
        sender.send_binary(payload)?;
        Ok(())
    });

    let id = channel.id().to_string();
    channel.on_error(move |err| {
        log_error(&id, err);
        Ok(())
    });
}

fn log_error(channel: &str, err: &ErrorEvent) {
    match err.source {
        ErrorSource::StreamIo => debug!(channel, error = %err, "peer disconnected"),
        ErrorSource::Remote => warn!(channel, error = %err, "peer reported an error"),
        _ => warn!(channel, error = %err, "channel failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use linewire_channel::ChannelState;
    use linewire_frame::{Message, MessageReader, MessageWriter};
    use linewire_transport::IpcStream;

    use super::*;

    #[test]
    fn echoes_text_and_binary_in_order() {
        let (local, remote) = IpcStream::pair().unwrap();
        remote
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let channel = MessageChannel::from_stream(local, ChannelConfig::default()).unwrap();
        install_echo(&channel);
        channel.start().unwrap();

        let mut writer = MessageWriter::new(remote.try_clone().unwrap());
        writer.send_text("#tag").unwrap();
        writer.send_binary(&[9, 8, 7]).unwrap();

        let mut reader = MessageReader::new(remote);
        assert_eq!(reader.read_message().unwrap(), Message::text("#tag"));
        assert_eq!(
            reader.read_message().unwrap(),
            Message::binary(vec![9u8, 8, 7])
        );
        assert_eq!(channel.state(), ChannelState::Started);
    }

    #[test]
    fn echo_stops_when_peer_disconnects() {
        let (local, remote) = IpcStream::pair().unwrap();
        let channel = MessageChannel::from_stream(local, ChannelConfig::default()).unwrap();
        install_echo(&channel);
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        channel.on_error(move |err| {
            tx.lock().unwrap().send(err.source).unwrap();
            Ok(())
        });
        channel.start().unwrap();

        drop(remote);

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            ErrorSource::StreamIo
        );
        assert!(channel.wait_stopped(Duration::from_secs(5)));
    }
}
