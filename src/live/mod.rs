//! Live-update connection to the messaging backend.
//!
//! `LiveConnection` owns at most one link to the server. Callbacks are
//! single-slot per event kind: registering again replaces the previous
//! callback rather than adding a second subscriber. The chat pane relies on
//! this when it re-registers on every selection change.

pub mod codec;
pub mod websocket;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::model::{Message, MessageUpdate, MessagesRead};
use codec::Packet;
pub use websocket::WebSocketConnector;

pub const NEW_MESSAGE: &str = "new_message";
pub const MESSAGE_UPDATE: &str = "message_update";
pub const MESSAGES_READ: &str = "messages_read";
pub const JOIN_CONVERSATION: &str = "join_conversation";
pub const LEAVE_CONVERSATION: &str = "leave_conversation";

/// How long `disconnect` waits for the driver to say goodbye
const CLOSE_GRACE: Duration = Duration::from_secs(1);
/// How long the driver waits for the transport to close after `41`
const CLOSE_DRAIN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, thiserror::Error)]
pub enum LiveError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Text frames flowing to and from the server
pub struct FrameLink {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<String>,
}

/// Transport that opens a frame link to a server URL
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<FrameLink, LiveError>;
}

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    new_message: Option<Callback<Message>>,
    message_update: Option<Callback<MessageUpdate>>,
    messages_read: Option<Callback<MessagesRead>>,
}

struct ActiveLink {
    outbound: mpsc::UnboundedSender<String>,
    handshaken: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

/// Manages the persistent live-update connection
pub struct LiveConnection {
    url: String,
    connect_timeout: Duration,
    connector: Arc<dyn Connector>,
    listeners: Arc<Mutex<Listeners>>,
    link: Option<ActiveLink>,
}

impl LiveConnection {
    pub fn new(
        url: impl Into<String>,
        connect_timeout: Duration,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            connector,
            listeners: Arc::new(Mutex::new(Listeners::default())),
            link: None,
        }
    }

    /// Open the connection. Does nothing if a link is already up or being set up.
    pub fn connect(&mut self) {
        if self.link.as_ref().is_some_and(|link| !link.driver.is_finished()) {
            return;
        }

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let handshaken = Arc::new(AtomicBool::new(false));
        let driver = tokio::spawn(drive(
            self.connector.clone(),
            self.url.clone(),
            self.connect_timeout,
            handshaken.clone(),
            self.listeners.clone(),
            outbound_rx,
        ));

        self.link = Some(ActiveLink {
            outbound,
            handshaken,
            driver,
        });
    }

    /// Close the connection and return to the idle state.
    ///
    /// Waits up to a second for the driver to send `41` and let the
    /// transport close before returning.
    pub async fn disconnect(&mut self) {
        if let Some(driver) = self.release() {
            if tokio::time::timeout(CLOSE_GRACE, driver).await.is_err() {
                warn!("Live connection did not close within {:?}", CLOSE_GRACE);
            }
        }
        self.remove_listeners();
    }

    // Dropping the sender makes the driver send `41` and stop.
    fn release(&mut self) -> Option<JoinHandle<()>> {
        let link = self.link.take()?;
        info!("Disconnecting from live server");
        drop(link.outbound);
        Some(link.driver)
    }

    /// Handshake completed and the driver still holds the transport
    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|link| {
            link.handshaken.load(Ordering::SeqCst) && !link.outbound.is_closed()
        })
    }

    pub fn join_conversation(&self, wa_id: &str) {
        self.emit(JOIN_CONVERSATION, wa_id);
    }

    pub fn leave_conversation(&self, wa_id: &str) {
        self.emit(LEAVE_CONVERSATION, wa_id);
    }

    pub fn on_new_message(&self, callback: impl Fn(Message) + Send + Sync + 'static) {
        self.with_listeners(|l| l.new_message = Some(Arc::new(callback)));
    }

    pub fn on_message_update(&self, callback: impl Fn(MessageUpdate) + Send + Sync + 'static) {
        self.with_listeners(|l| l.message_update = Some(Arc::new(callback)));
    }

    pub fn on_messages_read(&self, callback: impl Fn(MessagesRead) + Send + Sync + 'static) {
        self.with_listeners(|l| l.messages_read = Some(Arc::new(callback)));
    }

    /// Unregister all three event callbacks
    pub fn remove_listeners(&self) {
        self.with_listeners(|l| *l = Listeners::default());
    }

    fn with_listeners(&self, f: impl FnOnce(&mut Listeners)) {
        match self.listeners.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    // Signals are dropped, not queued, while disconnected.
    fn emit(&self, event: &str, wa_id: &str) {
        if !self.is_connected() {
            debug!("Not connected; dropping {} for {}", event, wa_id);
            return;
        }
        if let Some(link) = &self.link {
            let _ = link.outbound.send(Packet::event(event, wa_id).encode());
        }
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.release();
        self.remove_listeners();
    }
}

enum Flow {
    Continue,
    Stop,
}

async fn drive(
    connector: Arc<dyn Connector>,
    url: String,
    connect_timeout: Duration,
    handshaken: Arc<AtomicBool>,
    listeners: Arc<Mutex<Listeners>>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let link = match tokio::time::timeout(connect_timeout, connector.connect(&url)).await {
        Ok(Ok(link)) => link,
        Ok(Err(e)) => {
            error!("Connection error: {}", e);
            return;
        }
        Err(_) => {
            error!("Connection error: {}", LiveError::Timeout(connect_timeout));
            return;
        }
    };
    let FrameLink {
        outgoing,
        mut incoming,
    } = link;

    loop {
        tokio::select! {
            frame = incoming.recv() => {
                let Some(frame) = frame else {
                    info!("Disconnected from live server");
                    break;
                };
                match Packet::decode(&frame) {
                    Ok(packet) => {
                        let flow = handle_packet(packet, &outgoing, &handshaken, &listeners);
                        if let Flow::Stop = flow {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring live frame: {}", e),
                }
            }
            signal = outbound_rx.recv() => {
                match signal {
                    Some(frame) => {
                        if outgoing.send(frame).is_err() {
                            break;
                        }
                    }
                    None => {
                        handshaken.store(false, Ordering::SeqCst);
                        let _ = outgoing.send(Packet::Disconnect.encode());
                        close_gracefully(outgoing, incoming).await;
                        return;
                    }
                }
            }
        }
    }

    handshaken.store(false, Ordering::SeqCst);
}

/// Hand the transport its last frame, then wait for the server side to hang up
async fn close_gracefully(
    outgoing: mpsc::UnboundedSender<String>,
    mut incoming: mpsc::UnboundedReceiver<String>,
) {
    drop(outgoing);
    let drained = tokio::time::timeout(CLOSE_DRAIN, async {
        while incoming.recv().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        debug!("Live transport still open after {:?}", CLOSE_DRAIN);
    }
}

fn handle_packet(
    packet: Packet,
    outgoing: &mpsc::UnboundedSender<String>,
    handshaken: &AtomicBool,
    listeners: &Mutex<Listeners>,
) -> Flow {
    match packet {
        Packet::Open(_) => {
            let _ = outgoing.send(Packet::Connect(None).encode());
        }
        Packet::Ping(data) => {
            let _ = outgoing.send(Packet::Pong(data).encode());
        }
        Packet::Connect(_) => {
            handshaken.store(true, Ordering::SeqCst);
            info!("Connected to live server");
        }
        Packet::ConnectError(reason) => {
            error!("Connection error: {}", reason);
            return Flow::Stop;
        }
        Packet::Disconnect | Packet::Close => {
            info!("Disconnected from live server");
            return Flow::Stop;
        }
        Packet::Event { name, payload } => dispatch(&name, payload, listeners),
        Packet::Pong(_) | Packet::Noop => {}
    }
    Flow::Continue
}

fn dispatch(name: &str, payload: Value, listeners: &Mutex<Listeners>) {
    let guard = match listeners.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    match name {
        NEW_MESSAGE => {
            let callback = guard.new_message.clone();
            drop(guard);
            deliver(name, payload, callback);
        }
        MESSAGE_UPDATE => {
            let callback = guard.message_update.clone();
            drop(guard);
            deliver(name, payload, callback);
        }
        MESSAGES_READ => {
            let callback = guard.messages_read.clone();
            drop(guard);
            deliver(name, payload, callback);
        }
        other => debug!("Ignoring live event {}", other),
    }
}

fn deliver<T: DeserializeOwned>(name: &str, payload: Value, callback: Option<Callback<T>>) {
    let Some(callback) = callback else {
        return;
    };
    match serde_json::from_value::<T>(payload) {
        Ok(value) => callback(value),
        Err(e) => warn!("Malformed {} payload: {}", name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FakeServer {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    struct FakeConnector {
        attempts: Arc<AtomicUsize>,
        servers: mpsc::UnboundedSender<FakeServer>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _url: &str) -> Result<FrameLink, LiveError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let (outgoing, from_client) = mpsc::unbounded_channel();
            let (to_client, incoming) = mpsc::unbounded_channel();
            let _ = self.servers.send(FakeServer {
                to_client,
                from_client,
            });
            Ok(FrameLink { outgoing, incoming })
        }
    }

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _url: &str) -> Result<FrameLink, LiveError> {
            Err(LiveError::Connect("connection refused".to_string()))
        }
    }

    fn fake() -> (LiveConnection, Arc<AtomicUsize>, mpsc::UnboundedReceiver<FakeServer>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let (servers, server_rx) = mpsc::unbounded_channel();
        let connector = FakeConnector {
            attempts: attempts.clone(),
            servers,
        };
        let live =
            LiveConnection::new("http://fake:5000", Duration::from_secs(1), Arc::new(connector));
        (live, attempts, server_rx)
    }

    async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Option<T> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    async fn handshake(
        live: &mut LiveConnection,
        servers: &mut mpsc::UnboundedReceiver<FakeServer>,
    ) -> FakeServer {
        live.connect();
        let mut server = recv(servers).await.expect("connector was not called");
        server.to_client.send(r#"0{"sid":"abc","pingInterval":25000}"#.to_string()).unwrap();
        assert_eq!(recv(&mut server.from_client).await.as_deref(), Some("40"));
        server.to_client.send(r#"40{"sid":"xyz"}"#.to_string()).unwrap();
        wait_until(|| live.is_connected()).await;
        server
    }

    fn message_json(wa_id: &str, id: &str) -> String {
        let message = serde_json::json!({
            "messageId": id,
            "waId": wa_id,
            "messageBody": "hi",
            "timestamp": 1700000000,
            "isFromBusiness": false,
            "status": "sent"
        });
        format!("42{}", serde_json::json!([NEW_MESSAGE, message]))
    }

    #[tokio::test]
    async fn test_join_before_connect_is_silent() {
        let (live, attempts, _servers) = fake();
        live.join_conversation("111");
        live.leave_conversation("111");
        assert!(!live.is_connected());
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_join_and_leave_after_handshake() {
        let (mut live, _attempts, mut servers) = fake();
        let mut server = handshake(&mut live, &mut servers).await;

        live.join_conversation("919937320320");
        live.leave_conversation("919937320320");
        assert_eq!(
            recv(&mut server.from_client).await.as_deref(),
            Some(r#"42["join_conversation","919937320320"]"#)
        );
        assert_eq!(
            recv(&mut server.from_client).await.as_deref(),
            Some(r#"42["leave_conversation","919937320320"]"#)
        );
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (mut live, attempts, mut servers) = fake();
        let _server = handshake(&mut live, &mut servers).await;
        live.connect();
        live.connect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ping_is_answered() {
        let (mut live, _attempts, mut servers) = fake();
        let mut server = handshake(&mut live, &mut servers).await;
        server.to_client.send("2".to_string()).unwrap();
        assert_eq!(recv(&mut server.from_client).await.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_later_registration_replaces_earlier() {
        let (mut live, _attempts, mut servers) = fake();
        let server = handshake(&mut live, &mut servers).await;

        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        live.on_new_message(move |m: Message| {
            let _ = first_tx.send(m.message_id);
        });
        live.on_new_message(move |m: Message| {
            let _ = second_tx.send(m.message_id);
        });

        server.to_client.send(message_json("111", "m1")).unwrap();
        assert_eq!(recv(&mut second_rx).await.as_deref(), Some("m1"));
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_listeners_stops_delivery() {
        let (mut live, _attempts, mut servers) = fake();
        let mut server = handshake(&mut live, &mut servers).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let read_tx = tx.clone();
        live.on_new_message(move |m: Message| {
            let _ = tx.send(m.wa_id);
        });
        live.on_messages_read(move |r: MessagesRead| {
            let _ = read_tx.send(r.wa_id);
        });
        live.remove_listeners();

        server.to_client.send(message_json("111", "m1")).unwrap();
        server.to_client.send(r#"42["messages_read",{"waId":"111"}]"#.to_string()).unwrap();
        // The pong is only produced after the earlier frames were dispatched.
        server.to_client.send("2".to_string()).unwrap();
        assert_eq!(recv(&mut server.from_client).await.as_deref(), Some("3"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_and_read_events_are_dispatched() {
        let (mut live, _attempts, mut servers) = fake();
        let server = handshake(&mut live, &mut servers).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let read_tx = tx.clone();
        live.on_message_update(move |m: MessageUpdate| {
            let status = m.status.map(|s| s.to_string()).unwrap_or_default();
            let _ = tx.send(format!("update:{}:{}", m.message_id, status));
        });
        live.on_messages_read(move |r: MessagesRead| {
            let _ = read_tx.send(format!("read:{}", r.wa_id));
        });

        let update = r#"42["message_update",{"messageId":"m1","waId":"111","status":"read"}]"#;
        server.to_client.send(update.to_string()).unwrap();
        server.to_client.send(r#"42["messages_read",{"waId":"111"}]"#.to_string()).unwrap();

        assert_eq!(recv(&mut rx).await.as_deref(), Some("update:m1:read"));
        assert_eq!(recv(&mut rx).await.as_deref(), Some("read:111"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let (mut live, _attempts, mut servers) = fake();
        let server = handshake(&mut live, &mut servers).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        live.on_new_message(move |m: Message| {
            let _ = tx.send(m.message_id);
        });

        server.to_client.send(r#"42["new_message","not a message"]"#.to_string()).unwrap();
        server.to_client.send("garbage".to_string()).unwrap();
        server.to_client.send(message_json("111", "m2")).unwrap();
        assert_eq!(recv(&mut rx).await.as_deref(), Some("m2"));
        assert!(live.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_resets_state() {
        let (mut live, _attempts, mut servers) = fake();
        let mut server = handshake(&mut live, &mut servers).await;

        live.disconnect().await;
        assert!(!live.is_connected());
        assert_eq!(recv(&mut server.from_client).await.as_deref(), Some("41"));

        live.join_conversation("111");
        assert!(server.from_client.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_returns_after_goodbye_is_flushed() {
        use tokio::sync::mpsc::error::TryRecvError;

        let (mut live, _attempts, mut servers) = fake();
        let mut server = handshake(&mut live, &mut servers).await;

        live.disconnect().await;
        // The driver is gone by now, so its goodbye is already queued
        // and the transport sender has been released.
        assert_eq!(server.from_client.try_recv().as_deref(), Ok("41"));
        assert_eq!(server.from_client.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[tokio::test]
    async fn test_server_close_flips_state() {
        let (mut live, _attempts, mut servers) = fake();
        let server = handshake(&mut live, &mut servers).await;

        drop(server);
        wait_until(|| !live.is_connected()).await;
    }

    #[tokio::test]
    async fn test_connect_error_leaves_disconnected() {
        let mut live =
            LiveConnection::new("http://fake", Duration::from_secs(1), Arc::new(RefusingConnector));
        live.connect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!live.is_connected());
        live.join_conversation("111");
    }
}
