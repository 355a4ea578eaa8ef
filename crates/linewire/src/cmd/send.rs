use std::fs;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use linewire_channel::{connect_with_config, ChannelConfig};
use linewire_frame::Message;

use crate::cmd::{forward_inbound, Inbound, SendArgs};
use crate::exit::{channel_error, io_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, OutputFormat};

#[derive(Debug, PartialEq, Eq)]
enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

pub fn run(args: SendArgs, format: OutputFormat, config: ChannelConfig) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let channel = connect_with_config(&args.path, config)
        .map_err(|err| channel_error("connect failed", err))?;
    let inbound = args.wait.then(|| forward_inbound(&channel));
    channel
        .start()
        .map_err(|err| channel_error("start failed", err))?;

    let sent = match &payload {
        Payload::Text(text) => channel.send_text(text),
        Payload::Binary(bytes) => channel.send_binary(bytes),
    };
    sent.map_err(|err| channel_error("send failed", err))?;

    if let Some(inbound) = inbound {
        let reply = wait_for_reply(&inbound, wait_timeout)?;
        print_message(&reply, channel.id(), format);
    }

    channel.stop();
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Payload> {
    if let Some(text) = &args.text {
        return Ok(Payload::Text(text.clone()));
    }
    if let Some(path) = &args.binary_file {
        return fs::read(path)
            .map(Payload::Binary)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Err(CliError::new(
        USAGE,
        "one of --text or --binary-file is required",
    ))
}

fn wait_for_reply(inbound: &Receiver<Inbound>, timeout: Duration) -> CliResult<Message> {
    match inbound.recv_timeout(timeout) {
        Ok(Inbound::Message(message)) => Ok(message),
        Ok(Inbound::Closed(Some(err))) => {
            Err(CliError::new(FAILURE, format!("receive failed: {err}")))
        }
        Ok(Inbound::Closed(None)) | Err(RecvTimeoutError::Disconnected) => Err(CliError::new(
            FAILURE,
            "receive failed: channel closed before a reply arrived",
        )),
        Err(RecvTimeoutError::Timeout) => Err(CliError::new(
            TIMEOUT,
            format!("no reply within {}ms", timeout.as_millis()),
        )),
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::mpsc;

    use linewire_channel::{ErrorEvent, ErrorSource};

    use super::*;

    fn args(text: Option<&str>, binary_file: Option<PathBuf>) -> SendArgs {
        SendArgs {
            path: PathBuf::from("/tmp/unused.sock"),
            text: text.map(str::to_string),
            binary_file,
            wait: false,
            wait_timeout: "5s".to_string(),
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration(" ").unwrap_err().code, USAGE);
    }

    #[test]
    fn payload_requires_text_or_file() {
        assert_eq!(
            resolve_payload(&args(Some("hi"), None)).unwrap(),
            Payload::Text("hi".to_string())
        );
        assert_eq!(resolve_payload(&args(None, None)).unwrap_err().code, USAGE);
    }

    #[test]
    fn binary_payload_reads_file() {
        let path = std::env::temp_dir().join(format!("lw-send-{}.bin", std::process::id()));
        std::fs::write(&path, [0u8, 1, 2]).unwrap();

        assert_eq!(
            resolve_payload(&args(None, Some(path.clone()))).unwrap(),
            Payload::Binary(vec![0, 1, 2])
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reply_wait_outcomes() {
        let (tx, rx) = mpsc::channel();
        tx.send(Inbound::Message(Message::text("pong"))).unwrap();
        assert_eq!(
            wait_for_reply(&rx, Duration::from_millis(50)).unwrap(),
            Message::text("pong")
        );

        assert_eq!(
            wait_for_reply(&rx, Duration::from_millis(10)).unwrap_err().code,
            TIMEOUT
        );

        tx.send(Inbound::Closed(Some(ErrorEvent::new(
            ErrorSource::StreamIo,
            "connection closed",
        ))))
        .unwrap();
        assert_eq!(
            wait_for_reply(&rx, Duration::from_millis(50)).unwrap_err().code,
            FAILURE
        );

        drop(tx);
        assert_eq!(
            wait_for_reply(&rx, Duration::from_millis(50)).unwrap_err().code,
            FAILURE
        );
    }
}
