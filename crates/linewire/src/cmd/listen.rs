use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use linewire_channel::{ChannelConfig, ChannelListener, ErrorSource};
use tracing::{debug, info, warn};

use crate::cmd::{forward_inbound, install_ctrlc_handler, Inbound, ListenArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

/// How often the receive loop checks for Ctrl-C.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat, config: ChannelConfig) -> CliResult<i32> {
    let listener = ChannelListener::bind(&args.path)
        .map_err(|err| channel_error("bind failed", err))?
        .with_config(config);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let channel = listener
            .accept()
            .map_err(|err| channel_error("accept failed", err))?;
        let inbound = forward_inbound(&channel);
        channel
            .start()
            .map_err(|err| channel_error("start failed", err))?;
        info!(channel = channel.id(), "peer connected");

        while running.load(Ordering::SeqCst) {
            match inbound.recv_timeout(POLL_INTERVAL) {
                Ok(Inbound::Message(message)) => {
                    print_message(&message, channel.id(), format);
                    printed = printed.saturating_add(1);
                    if args.count.is_some_and(|count| printed >= count) {
                        return Ok(SUCCESS);
                    }
                }
                Ok(Inbound::Closed(Some(err))) if err.source == ErrorSource::StreamIo => {
                    debug!(channel = channel.id(), error = %err, "peer disconnected");
                }
                Ok(Inbound::Closed(Some(err))) => {
                    warn!(channel = channel.id(), error = %err, "channel failed");
                }
                Ok(Inbound::Closed(None)) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => continue,
            }
        }
    }

    Ok(SUCCESS)
}
