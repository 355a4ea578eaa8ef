use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use linewire_frame::{FrameError, Limits, Message, MessageReader, MessageWriter};
use linewire_transport::{IpcStream, ReadInterrupt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ChannelConfig;
use crate::dispatch::{Dispatcher, ListenerId, ListenerResult};
use crate::error::{ChannelError, Result};
use crate::event::{Category, ErrorEvent, ErrorSource, Event, LifecycleEvent};
use crate::input::InputPipe;
use crate::lifecycle::{ChannelState, Lifecycle};

type BoxedRead = Box<dyn Read + Send>;
type BoxedWrite = Box<dyn Write + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A bidirectional message channel over one byte stream.
///
/// Inbound messages are decoded on a reader thread and delivered to
/// listeners on a dispatch thread, one event at a time and in arrival order.
/// Sends write directly to the stream from the calling thread.
///
/// ```no_run
/// use linewire_channel::MessageChannel;
/// use linewire_transport::IpcStream;
///
/// let (left, _right) = IpcStream::pair()?;
/// let channel = MessageChannel::from_stream(left, Default::default())?;
/// channel.on_text(|text| {
///     println!("got {text}");
///     Ok(())
/// });
/// channel.start()?;
/// channel.send_text("hello")?;
/// # Ok::<(), linewire_channel::ChannelError>(())
/// ```
pub struct MessageChannel {
    shared: Arc<Shared>,
}

impl MessageChannel {
    /// Create a channel over separate read and write halves.
    ///
    /// Without a [`ReadInterrupt`] hook, `stop` cannot wake a blocked read:
    /// the reader thread exits when its next read returns.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self::with_config(reader, writer, ChannelConfig::default())
    }

    pub fn with_config<R, W>(reader: R, writer: W, config: ChannelConfig) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self::build("channel", Box::new(reader), Box::new(writer), None, config)
    }

    /// Create a channel whose blocked reads are woken by `interrupt` on stop.
    pub fn with_interrupt<R, W, I>(
        reader: R,
        writer: W,
        interrupt: I,
        config: ChannelConfig,
    ) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
        I: ReadInterrupt + 'static,
    {
        Self::build(
            "channel",
            Box::new(reader),
            Box::new(writer),
            Some(Box::new(interrupt)),
            config,
        )
    }

    /// Create a channel over a connected socket stream.
    ///
    /// Applies the configured timeouts and uses read-side shutdown to wake the
    /// reader on stop.
    pub fn from_stream(stream: IpcStream, config: ChannelConfig) -> Result<Self> {
        Self::from_stream_with_id("channel", stream, config)
    }

    pub(crate) fn from_stream_with_id(
        id: &str,
        stream: IpcStream,
        config: ChannelConfig,
    ) -> Result<Self> {
        stream.set_read_timeout(config.read_timeout())?;
        stream.set_write_timeout(config.write_timeout())?;
        let reader = stream.try_clone()?;
        let interrupt = stream.try_clone()?;
        Ok(Self::build(
            id,
            Box::new(reader),
            Box::new(stream),
            Some(Box::new(interrupt)),
            config,
        ))
    }

    fn build(
        id: &str,
        reader: BoxedRead,
        writer: BoxedWrite,
        interrupt: Option<Box<dyn ReadInterrupt>>,
        config: ChannelConfig,
    ) -> Self {
        let limits = config.limits;
        Self {
            shared: Arc::new(Shared {
                id: id.to_string(),
                lifecycle: Lifecycle::new(),
                control: Mutex::new(()),
                limits: Mutex::new(limits),
                reader: Mutex::new(Some(reader)),
                writer: Mutex::new(MessageWriter::with_limits(writer, limits)),
                interrupt,
                cancel: CancellationToken::new(),
                dispatcher: Dispatcher::new(),
                config,
            }),
        }
    }

    /// Channel id used in log output.
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn state(&self) -> ChannelState {
        self.shared.lifecycle.state()
    }

    pub fn limits(&self) -> Limits {
        *lock(&self.shared.limits)
    }

    /// Replace the size limits. Only allowed before [`MessageChannel::start`].
    pub fn set_limits(&self, limits: Limits) -> Result<()> {
        let _control = lock(&self.shared.control);
        if self.shared.lifecycle.state() != ChannelState::Created {
            return Err(ChannelError::IllegalState(
                "limits can only be changed before start",
            ));
        }
        *lock(&self.shared.limits) = limits;
        lock(&self.shared.writer).set_limits(limits);
        Ok(())
    }

    /// Builder-style [`MessageChannel::set_limits`] for a fresh channel.
    pub fn with_limits(self, limits: Limits) -> Result<Self> {
        self.set_limits(limits)?;
        Ok(self)
    }

    /// Register a listener for inbound text messages.
    pub fn on_text<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str) -> ListenerResult + Send + Sync + 'static,
    {
        self.shared.dispatcher.listeners().add(
            Category::Text,
            Arc::new(move |event: &Event| match event {
                Event::Text(text) => listener(text.as_str()),
                _ => Ok(()),
            }),
        )
    }

    /// Register a listener for inbound binary messages.
    pub fn on_binary<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Bytes) -> ListenerResult + Send + Sync + 'static,
    {
        self.shared.dispatcher.listeners().add(
            Category::Binary,
            Arc::new(move |event: &Event| match event {
                Event::Binary(payload) => listener(payload),
                _ => Ok(()),
            }),
        )
    }

    /// Register a listener for fatal errors and remote error reports.
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ErrorEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.shared.dispatcher.listeners().add(
            Category::Error,
            Arc::new(move |event: &Event| match event {
                Event::Error(err) => listener(err),
                _ => Ok(()),
            }),
        )
    }

    /// Register a listener for `Started`/`Stopped` transitions.
    pub fn on_lifecycle<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(LifecycleEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.shared.dispatcher.listeners().add(
            Category::Lifecycle,
            Arc::new(move |event: &Event| match event {
                Event::Lifecycle(lifecycle) => listener(*lifecycle),
                _ => Ok(()),
            }),
        )
    }

    /// Unregister a listener. Events already being dispatched still reach it.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.dispatcher.listeners().remove(id)
    }

    /// Start reading and enable sends. A no-op unless the channel is new.
    pub fn start(&self) -> Result<()> {
        Shared::start(&self.shared)
    }

    /// Stop the channel. A no-op unless it is started.
    ///
    /// Events queued before the stop are still delivered, followed by
    /// `Stopped`.
    pub fn stop(&self) {
        self.shared.shutdown(None);
    }

    pub fn send_text(&self, text: &str) -> Result<()> {
        self.shared.send(|writer| writer.send_text(text))
    }

    pub fn send_binary(&self, payload: &[u8]) -> Result<()> {
        self.shared.send(|writer| writer.send_binary(payload))
    }

    /// A cloneable handle for sending from other threads or from listeners.
    pub fn sender(&self) -> ChannelSender {
        ChannelSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Block until the channel is stopped and every queued event is delivered.
    ///
    /// Returns immediately if the channel was never started. Calling this from
    /// a listener returns without waiting.
    pub fn join(&self) {
        self.shared.dispatcher.join();
    }

    /// Like [`MessageChannel::join`] with a deadline. Returns `true` once drained.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        self.shared.dispatcher.wait_drained(timeout)
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.shared.shutdown(None);
        self.shared.dispatcher.join();
        // Never started: no worker ran to release listeners holding senders.
        self.shared.dispatcher.listeners().clear();
    }
}

impl fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageChannel")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Send-side handle to a [`MessageChannel`].
///
/// Dropping a sender never stops the channel; only the owning
/// [`MessageChannel`] does that.
#[derive(Clone)]
pub struct ChannelSender {
    shared: Arc<Shared>,
}

impl ChannelSender {
    pub fn send_text(&self, text: &str) -> Result<()> {
        self.shared.send(|writer| writer.send_text(text))
    }

    pub fn send_binary(&self, payload: &[u8]) -> Result<()> {
        self.shared.send(|writer| writer.send_binary(payload))
    }

    pub fn stop(&self) {
        self.shared.shutdown(None);
    }

    pub fn state(&self) -> ChannelState {
        self.shared.lifecycle.state()
    }
}

impl fmt::Debug for ChannelSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSender")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

struct Shared {
    id: String,
    config: ChannelConfig,
    lifecycle: Lifecycle,
    /// Serializes start, stop and limit changes.
    control: Mutex<()>,
    limits: Mutex<Limits>,
    /// Taken by the reader thread on start.
    reader: Mutex<Option<BoxedRead>>,
    writer: Mutex<MessageWriter<BoxedWrite>>,
    interrupt: Option<Box<dyn ReadInterrupt>>,
    cancel: CancellationToken,
    dispatcher: Dispatcher,
}

impl Shared {
    fn start(this: &Arc<Self>) -> Result<()> {
        let _control = lock(&this.control);
        match this.lifecycle.state() {
            ChannelState::Created => {}
            ChannelState::Started => {
                debug!(channel = %this.id, "start ignored, channel already started");
                return Ok(());
            }
            ChannelState::Stopped => {
                warn!(channel = %this.id, "start ignored, channel already stopped");
                return Ok(());
            }
        }

        let Some(input) = lock(&this.reader).take() else {
            return Err(ChannelError::IllegalState("input stream already consumed"));
        };

        let weak = Arc::downgrade(this);
        let opened = this
            .dispatcher
            .open(this.config.thread_name("dispatch"), move |description| {
                if let Some(shared) = weak.upgrade() {
                    shared.report_listener_failure(description);
                }
            });
        if let Err(err) = opened {
            *lock(&this.reader) = Some(input);
            return Err(err);
        }

        let limits = *lock(&this.limits);
        let reader = MessageReader::with_chunk_size(input, limits, this.config.read_chunk_size);

        // Holding the control lock, so the state is still `Created`.
        this.lifecycle
            .transition(ChannelState::Created, ChannelState::Started);
        this.dispatcher.publish(Event::Lifecycle(LifecycleEvent::Started));

        let on_message = {
            let weak = Arc::downgrade(this);
            move |message: Message| {
                if let Some(shared) = weak.upgrade() {
                    shared.dispatcher.publish(Event::from(message));
                }
            }
        };
        let on_error = {
            let weak = Arc::downgrade(this);
            move |err: FrameError| {
                if let Some(shared) = weak.upgrade() {
                    shared.shutdown(Some(ErrorEvent::from_frame_error(&err)));
                }
            }
        };

        let spawned = InputPipe::spawn(
            this.config.thread_name("reader"),
            reader,
            this.cancel.clone(),
            on_message,
            on_error,
        );
        if let Err(err) = spawned {
            let event = ErrorEvent::new(ErrorSource::StreamIo, err.to_string());
            this.shutdown_locked(Some(event));
            return Err(err);
        }

        info!(channel = %this.id, ?limits, "channel started");
        Ok(())
    }

    fn shutdown(&self, fatal: Option<ErrorEvent>) -> bool {
        let _control = lock(&self.control);
        self.shutdown_locked(fatal)
    }

    /// Move to `Stopped`. Returns `false` if the channel was not started.
    fn shutdown_locked(&self, fatal: Option<ErrorEvent>) -> bool {
        if !self
            .lifecycle
            .transition(ChannelState::Started, ChannelState::Stopped)
        {
            if let Some(err) = fatal {
                debug!(channel = %self.id, error = %err, "error after stop ignored");
            }
            return false;
        }

        if let Some(err) = fatal {
            error!(channel = %self.id, error = %err, "channel failed");
            self.dispatcher.publish(Event::Error(err));
        }

        self.cancel.cancel();
        if let Some(interrupt) = &self.interrupt {
            if let Err(err) = interrupt.interrupt_read() {
                debug!(channel = %self.id, error = %err, "failed to interrupt reader");
            }
        }
        self.dispatcher.close_with(Event::Lifecycle(LifecycleEvent::Stopped));

        info!(channel = %self.id, "channel stopped");
        true
    }

    fn send<F>(&self, write: F) -> Result<()>
    where
        F: FnOnce(&mut MessageWriter<BoxedWrite>) -> linewire_frame::Result<()>,
    {
        if !self.lifecycle.is_started() {
            return Err(ChannelError::IllegalState("channel is not started"));
        }

        let result = write(&mut lock(&self.writer));
        match result {
            Ok(()) => {
                trace!(channel = %self.id, "message sent");
                Ok(())
            }
            // Rejected before encoding; the stream is unaffected.
            Err(FrameError::EmbeddedDelimiter) => Err(FrameError::EmbeddedDelimiter.into()),
            Err(err) => {
                self.shutdown(Some(ErrorEvent::from_frame_error(&err)));
                Err(err.into())
            }
        }
    }

    fn report_listener_failure(&self, description: &str) {
        if !self.lifecycle.is_started() {
            debug!(channel = %self.id, "listener failure not reported, channel not started");
            return;
        }

        let result = lock(&self.writer).send_error(description);
        if let Err(err) = result {
            self.shutdown(Some(ErrorEvent::from_frame_error(&err)));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::mpsc;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedSink {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    #[test]
    fn send_before_start_is_illegal() {
        let channel = MessageChannel::new(Cursor::new(Vec::new()), SharedSink::default());
        assert!(matches!(
            channel.send_text("x"),
            Err(ChannelError::IllegalState(_))
        ));
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let channel = MessageChannel::new(Cursor::new(Vec::new()), SharedSink::default());
        channel.stop();
        assert_eq!(channel.state(), ChannelState::Created);
    }

    #[test]
    fn end_of_input_stops_with_stream_error() {
        let sink = SharedSink::default();
        let channel = MessageChannel::new(Cursor::new(b"one\n".to_vec()), sink);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        channel.on_error(move |err| {
            tx.lock().unwrap().send(err.clone()).unwrap();
            Ok(())
        });

        channel.start().unwrap();

        let err = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(err.source, ErrorSource::StreamIo);
        assert!(channel.wait_stopped(WAIT));
        assert_eq!(channel.state(), ChannelState::Stopped);
    }

    #[test]
    fn limits_are_frozen_after_start() {
        let channel = MessageChannel::new(Cursor::new(Vec::new()), SharedSink::default())
            .with_limits(Limits::default().with_max_text_chars(3))
            .unwrap();
        assert_eq!(channel.limits().max_text_chars, 3);

        channel.start().unwrap();
        assert!(matches!(
            channel.set_limits(Limits::default()),
            Err(ChannelError::IllegalState(_))
        ));
    }

    #[test]
    fn embedded_newline_is_rejected_without_stopping() {
        let sink = SharedSink::default();
        let (reader, _keep) = linewire_transport::IpcStream::pair().unwrap();
        let interrupt = reader.try_clone().unwrap();
        let channel = MessageChannel::with_interrupt(
            reader,
            sink.clone(),
            interrupt,
            ChannelConfig::default(),
        );
        channel.start().unwrap();

        assert!(matches!(
            channel.send_text("two\nlines"),
            Err(ChannelError::Frame(FrameError::EmbeddedDelimiter))
        ));
        assert_eq!(channel.state(), ChannelState::Started);
        channel.send_text("ok").unwrap();
        assert_eq!(sink.contents(), b"ok\n");
    }

    #[test]
    fn debug_shows_id_and_state() {
        let channel = MessageChannel::new(Cursor::new(Vec::new()), SharedSink::default());
        let debug = format!("{channel:?}");
        assert!(debug.contains("channel"));
        assert!(debug.contains("Created"));
    }
}
