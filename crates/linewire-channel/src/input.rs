use std::io::Read;
use std::thread::{self, JoinHandle};

use linewire_frame::{FrameError, Message, MessageReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{ChannelError, Result};

/// Background loop pulling messages off the inbound stream.
///
/// Read timeouts are retried after checking the cancellation token. Any other
/// failure ends the loop: silently if the token was cancelled, otherwise
/// through `on_error`, which runs at most once.
pub(crate) struct InputPipe;

impl InputPipe {
    pub(crate) fn spawn<R, M, E>(
        thread_name: String,
        mut reader: MessageReader<R>,
        cancel: CancellationToken,
        mut on_message: M,
        on_error: E,
    ) -> Result<JoinHandle<()>>
    where
        R: Read + Send + 'static,
        M: FnMut(Message) + Send + 'static,
        E: FnOnce(FrameError) + Send + 'static,
    {
        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let outcome = run(&mut reader, &cancel, &mut on_message);
                match outcome {
                    Ok(()) => debug!("reader loop cancelled"),
                    Err(_) if cancel.is_cancelled() => {
                        debug!("reader loop interrupted by stop");
                    }
                    Err(err) => on_error(err),
                }
            })
            .map_err(|source| ChannelError::Spawn {
                name: thread_name,
                source,
            })
    }
}

fn run<R, M>(
    reader: &mut MessageReader<R>,
    cancel: &CancellationToken,
    on_message: &mut M,
) -> std::result::Result<(), FrameError>
where
    R: Read,
    M: FnMut(Message),
{
    while !cancel.is_cancelled() {
        match reader.read_message() {
            Ok(message) => {
                if cancel.is_cancelled() {
                    break;
                }
                trace!(kind = %message.kind(), "message received");
                on_message(message);
            }
            Err(err) if err.is_timeout() => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
