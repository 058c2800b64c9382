//! WebSocket transport driving a [`Session`] on tokio.
//!
//! One task owns the session and multiplexes the socket, the reconnect
//! timer, the cursor debounce timer and local events from the editor, so
//! session state is only ever touched from that task.
//!
//! ```no_run
//! use padsync::transport;
//! use padsync::{ClientConfig, Session, TextBuffer, TextEdit};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClientConfig::new("ws://localhost:3030/api/socket/notes");
//!     let (handle, task) = transport::spawn(Session::new(config, TextBuffer::new(), ()));
//!     handle.edit(vec![TextEdit::append("hello\n")]).ok();
//!     handle.dispose().ok();
//!     let session = task.await.unwrap();
//!     println!("{}", session.text());
//! }
//! ```

use std::future::{pending, Future};
use std::pin::Pin;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{SyncError, SyncResult};
use crate::host::{EditorHost, SelectionState, TextEdit};
use crate::message::UserInfo;
use crate::session::{Session, SessionObserver};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Connecting = Pin<Box<dyn Future<Output = Result<Socket, WsError>> + Send>>;

/// Events from the editor side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalEvent {
    /// The widget already applied these changes.
    Changed(Vec<TextEdit>),
    /// Apply these changes to the host, then sync them.
    Edit(Vec<TextEdit>),
    /// Own cursors or selections moved.
    Cursor(SelectionState),
    /// Change the document language.
    SetLanguage(String),
    /// Set this client's display identity.
    SetInfo(UserInfo),
    /// Stop the session.
    Dispose,
}

/// Sends local events to a running session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<LocalEvent>,
}

impl SessionHandle {
    /// Queue an event for the session task.
    pub fn send(&self, event: LocalEvent) -> SyncResult<()> {
        self.tx
            .send(event)
            .map_err(|_| SyncError::Transport("session task has stopped".to_string()))
    }

    /// Report changes the widget already applied.
    pub fn changed(&self, changes: Vec<TextEdit>) -> SyncResult<()> {
        self.send(LocalEvent::Changed(changes))
    }

    /// Apply changes to the host and sync them.
    pub fn edit(&self, changes: Vec<TextEdit>) -> SyncResult<()> {
        self.send(LocalEvent::Edit(changes))
    }

    /// Report moved cursors or selections.
    pub fn cursor(&self, state: SelectionState) -> SyncResult<()> {
        self.send(LocalEvent::Cursor(state))
    }

    /// Change the document language for everyone.
    pub fn set_language(&self, language: impl Into<String>) -> SyncResult<()> {
        self.send(LocalEvent::SetLanguage(language.into()))
    }

    /// Set this client's display identity.
    pub fn set_info(&self, info: UserInfo) -> SyncResult<()> {
        self.send(LocalEvent::SetInfo(info))
    }

    /// Stop the session task.
    pub fn dispose(&self) -> SyncResult<()> {
        self.send(LocalEvent::Dispose)
    }
}

/// Run a session on its own task.
///
/// The task ends on [`LocalEvent::Dispose`], when every handle is dropped,
/// or when the session becomes desynchronized, and yields the session.
pub fn spawn<H, O>(session: Session<H, O>) -> (SessionHandle, JoinHandle<Session<H, O>>)
where
    H: EditorHost + Send + 'static,
    O: SessionObserver + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(session, rx));
    (SessionHandle { tx }, task)
}

/// Drive a session until it is disposed or desynchronized.
pub async fn run<H, O>(
    mut session: Session<H, O>,
    mut events: mpsc::UnboundedReceiver<LocalEvent>,
) -> Session<H, O>
where
    H: EditorHost,
    O: SessionObserver,
{
    let uri = session.config().uri.clone();
    let period = session.config().reconnect_interval;
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut socket: Option<Socket> = None;
    let mut connecting: Option<Connecting> = None;
    if session.begin_connect() {
        connecting = Some(connect(&uri));
    }

    loop {
        let cursor_deadline = session.cursor_deadline();

        tokio::select! {
            _ = ticker.tick() => {
                if session.tick() {
                    connecting = Some(connect(&uri));
                }
            }
            result = wait_connect(&mut connecting) => {
                connecting = None;
                match result {
                    Ok(ws) => {
                        tracing::debug!("Connected to {}", uri);
                        socket = Some(ws);
                        session.on_open();
                    }
                    Err(e) => {
                        tracing::debug!("Connection to {} failed: {}", uri, e);
                        session.on_close();
                    }
                }
            }
            frame = next_frame(&mut socket) => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = session.handle_text(&text) {
                            tracing::error!("Closing connection: {}", e);
                            close(&mut socket).await;
                            session.on_close();
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        socket = None;
                        session.on_close();
                    }
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        socket = None;
                        session.on_close();
                    }
                    Some(Ok(_)) => {}
                }
            }
            event = events.recv() => {
                match event {
                    Some(LocalEvent::Dispose) | None => break,
                    Some(event) => handle_local(&mut session, event),
                }
            }
            _ = wait_deadline(cursor_deadline) => {
                session.flush_cursor(Instant::now());
            }
        }

        if let Err(e) = flush(&mut session, &mut socket).await {
            tracing::warn!("Send failed: {}", e);
            socket = None;
            session.on_close();
        }

        if session.is_desynchronized() {
            break;
        }
    }

    session.dispose();
    close(&mut socket).await;
    session
}

fn connect(uri: &str) -> Connecting {
    let uri = uri.to_owned();
    Box::pin(async move { connect_async(uri).await.map(|(ws, _response)| ws) })
}

async fn wait_connect(connecting: &mut Option<Connecting>) -> Result<Socket, WsError> {
    match connecting {
        Some(attempt) => attempt.await,
        None => pending().await,
    }
}

async fn next_frame(socket: &mut Option<Socket>) -> Option<Result<Message, WsError>> {
    match socket {
        Some(ws) => ws.next().await,
        None => pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => pending().await,
    }
}

fn handle_local<H: EditorHost, O: SessionObserver>(session: &mut Session<H, O>, event: LocalEvent) {
    let result = match event {
        LocalEvent::Changed(changes) => session.local_changes(&changes),
        LocalEvent::Edit(changes) => session.edit(&changes),
        LocalEvent::Cursor(state) => {
            session.local_cursor(state, Instant::now());
            Ok(())
        }
        LocalEvent::SetLanguage(language) => {
            session.set_language(language);
            Ok(())
        }
        LocalEvent::SetInfo(info) => {
            session.set_info(info);
            Ok(())
        }
        LocalEvent::Dispose => Ok(()),
    };
    if let Err(e) = result {
        tracing::error!("Rejected local change: {}", e);
    }
}

/// Write every queued message to the socket.
async fn flush<H: EditorHost, O: SessionObserver>(
    session: &mut Session<H, O>,
    socket: &mut Option<Socket>,
) -> Result<(), WsError> {
    while let Some(msg) = session.next_outgoing() {
        let Some(ws) = socket.as_mut() else {
            continue;
        };
        match msg.to_json() {
            Ok(json) => ws.send(Message::Text(json)).await?,
            Err(e) => tracing::error!("Failed to serialize message: {}", e),
        }
    }
    Ok(())
}

async fn close(socket: &mut Option<Socket>) {
    if let Some(mut ws) = socket.take() {
        if let Err(e) = ws.close(None).await {
            tracing::debug!("Error closing socket: {}", e);
        }
    }
}
