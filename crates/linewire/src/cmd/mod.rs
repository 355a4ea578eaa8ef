use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use clap::{Args, Subcommand};
use linewire_channel::{ChannelConfig, ErrorEvent, LifecycleEvent, MessageChannel};
use linewire_frame::Message;

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Echo every received message back to the sender.
    Echo(EchoArgs),
    /// Send a single message.
    Send(SendArgs),
    /// Listen and print received messages.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, config: ChannelConfig) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, config),
        Command::Send(args) => send::run(args, format, config),
        Command::Listen(args) => listen::run(args, format, config),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Socket path to bind.
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Text payload.
    #[arg(long, conflicts_with = "binary_file")]
    pub text: Option<String>,
    /// Send the file contents as a binary message.
    #[arg(long, value_name = "FILE", conflicts_with = "text")]
    pub binary_file: Option<PathBuf>,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// What a command loop sees from one channel.
#[derive(Debug)]
pub enum Inbound {
    Message(Message),
    /// The channel stopped, with the fatal error if there was one.
    Closed(Option<ErrorEvent>),
}

/// Route a channel's events into a queue the command thread can poll.
///
/// Must be called before the channel is started.
pub fn forward_inbound(channel: &MessageChannel) -> Receiver<Inbound> {
    let (tx, rx) = mpsc::channel();
    let tx = Arc::new(Mutex::new(tx));

    let text_tx = Arc::clone(&tx);
    channel.on_text(move |text| {
        push(&text_tx, Inbound::Message(Message::text(text)));
        Ok(())
    });
    let binary_tx = Arc::clone(&tx);
    channel.on_binary(move |payload| {
        push(&binary_tx, Inbound::Message(Message::Binary(payload.clone())));
        Ok(())
    });
    let error_tx = Arc::clone(&tx);
    channel.on_error(move |err| {
        let inbound = if err.is_fatal() {
            Inbound::Closed(Some(err.clone()))
        } else {
            Inbound::Message(Message::Error(err.message.clone()))
        };
        push(&error_tx, inbound);
        Ok(())
    });
    channel.on_lifecycle(move |event| {
        if event == LifecycleEvent::Stopped {
            push(&tx, Inbound::Closed(None));
        }
        Ok(())
    });
    rx
}

fn push(tx: &Mutex<Sender<Inbound>>, inbound: Inbound) {
    if let Ok(tx) = tx.lock() {
        let _ = tx.send(inbound);
    }
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
