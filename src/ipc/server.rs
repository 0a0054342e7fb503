//! Unix domain socket server for IPC
//!
//! The bridge to the codec connects here to feed VU samples, mode signals
//! and hardware levels into the daemon, and subscribes to get every
//! `DuckerEvent` pushed back.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::DuckerEvent;
use crate::gain::MirrorGainDevice;
use crate::levels::LevelSample;
use crate::state::Input;

use super::protocol::{DuckerStatus, Notification, Request, Response};

/// Largest accepted message body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// How long shutdown waits for clients to flush pending events
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    clients: Mutex<Vec<JoinHandle<()>>>,
    context: ClientContext,
}

/// Shared server state
struct ServerState {
    status: DuckerStatus,
    start_time: std::time::Instant,
}

/// What each client handler needs to reach the rest of the daemon
#[derive(Clone)]
struct ClientContext {
    state: Arc<RwLock<ServerState>>,
    input_tx: mpsc::Sender<Input>,
    device: MirrorGainDevice,
    event_tx: broadcast::Sender<DuckerEvent>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        input_tx: mpsc::Sender<Input>,
        device: MirrorGainDevice,
        event_tx: broadcast::Sender<DuckerEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: DuckerStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state: Arc::clone(&state),
            shutdown_tx,
            clients: Mutex::new(Vec::new()),
            context: ClientContext {
                state,
                input_tx,
                device,
                event_tx,
            },
        })
    }

    /// Fold a ducker event into the status snapshot
    pub async fn apply_event(&self, event: &DuckerEvent) {
        let mut server_state = self.state.write().await;
        let status = &mut server_state.status;
        match event {
            DuckerEvent::StateChanged { to, .. } => status.state = *to,
            DuckerEvent::GainsAltered { values } => status.gains = values.clone(),
            DuckerEvent::GainSet { mic, gain } => {
                status.gains.insert(*mic, *gain);
            }
            DuckerEvent::MonitoringStarted { .. } => status.monitoring = true,
            DuckerEvent::MonitoringStopped => status.monitoring = false,
            DuckerEvent::AlertShown { .. } | DuckerEvent::AlertCleared => {}
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = self.context.clone();
                    let shutdown_rx = self.shutdown_tx.subscribe();

                    let handle = tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, context, shutdown_rx).await {
                            warn!(?e, "client handler error");
                        }
                    });

                    let mut clients = self.clients.lock().await;
                    clients.retain(|h| !h.is_finished());
                    clients.push(handle);
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection.
    ///
    /// On shutdown, events already queued for a subscriber are written out
    /// before the connection closes.
    async fn handle_client(
        stream: UnixStream,
        context: ClientContext,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // frames are read on their own task so a pushed event never interrupts a partial read
        let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(16);
        let read_task = tokio::spawn(async move {
            if let Err(e) = Self::read_frames(&mut reader, frame_tx).await {
                warn!(?e, "client read error");
            }
        });

        let mut events: Option<broadcast::Receiver<DuckerEvent>> = None;

        let result = loop {
            tokio::select! {
                biased;

                event = Self::next_event(&mut events) => {
                    match event {
                        Ok(event) => {
                            let notification = Notification::Event(event);
                            if let Err(e) = Self::send_message(&mut writer, &notification).await {
                                break Err(e);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            events = None;
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    debug!("client handler shutting down");
                    break Self::flush_events(&mut events, &mut writer).await;
                }

                frame = frame_rx.recv() => {
                    let Some(frame) = frame else {
                        debug!("client disconnected");
                        break Ok(());
                    };

                    let response = match serde_json::from_slice::<Request>(&frame) {
                        Ok(request) => {
                            debug!(?request, "received request");
                            let (response, subscribe) = Self::process_request(request, &context).await;
                            if subscribe && events.is_none() {
                                events = Some(context.event_tx.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            response
                        }
                        Err(e) => Response::Error {
                            code: "bad_request".to_string(),
                            message: e.to_string(),
                        },
                    };

                    if let Err(e) = Self::send_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
            }
        };

        read_task.abort();
        result
    }

    /// Write every event already queued for this subscriber
    async fn flush_events<W: AsyncWrite + Unpin>(
        events: &mut Option<broadcast::Receiver<DuckerEvent>>,
        writer: &mut W,
    ) -> Result<()> {
        let Some(rx) = events else {
            return Ok(());
        };

        loop {
            match rx.try_recv() {
                Ok(event) => Self::send_message(writer, &Notification::Event(event)).await?,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(skipped = n, "subscriber lagged during shutdown");
                }
                Err(_) => break,
            }
        }
        writer.flush().await?;
        Ok(())
    }

    /// Wait for the next event, forever if the client never subscribed
    async fn next_event(
        events: &mut Option<broadcast::Receiver<DuckerEvent>>,
    ) -> Result<DuckerEvent, broadcast::error::RecvError> {
        match events {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Read length-prefixed frames until EOF
    async fn read_frames<R: AsyncRead + Unpin>(reader: &mut R, frame_tx: mpsc::Sender<Vec<u8>>) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            let mut msg_buf = vec![0u8; len];
            reader.read_exact(&mut msg_buf).await?;

            if frame_tx.send(msg_buf).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: serde::Serialize,
    {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(request: Request, context: &ClientContext) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let mut state = context.state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                (Response::Status(state.status.clone()), false)
            }

            Request::Subscribe => (Response::Subscribed, true),

            Request::Sample { mic, level } => {
                (Self::enqueue(context, Input::Sample(LevelSample::new(mic, level))).await, false)
            }

            Request::Signal { signal } => (Self::enqueue(context, Input::Signal(signal)).await, false),

            Request::ReportGain { mic, gain } => {
                context.device.report(mic, gain).await;
                (Self::enqueue(context, Input::GainReported).await, false)
            }
        }
    }

    async fn enqueue(context: &ClientContext, input: Input) -> Response {
        match context.input_tx.send(input).await {
            Ok(()) => Response::Accepted,
            Err(_) => Response::Error {
                code: "unavailable".to_string(),
                message: "state machine is not running".to_string(),
            },
        }
    }

    /// Gracefully shutdown the server.
    ///
    /// Client handlers get a bounded time to push out events that were
    /// queued before the signal.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        let clients: Vec<_> = self.clients.lock().await.drain(..).collect();
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            for handle in clients {
                let _ = handle.await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("client handlers did not finish within the shutdown grace period");
        }

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}
