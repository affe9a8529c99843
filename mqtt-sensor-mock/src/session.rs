// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Broker session: a rumqttc client plus the task that drives its event loop.
//!
//! The driver task owns the [`EventLoop`], reports lifecycle events to a
//! [`SessionHandler`], and backs off between reconnect attempts. Callers only
//! see the [`Session`] trait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Incoming, MqttOptions,
    Outgoing, QoS, SubscribeReasonCode,
};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::PublisherConfig;
use crate::error::PublisherError;

/// How long `close` waits for the driver to flush the DISCONNECT packet.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Publish/teardown surface the publish loop works against.
#[async_trait]
pub trait Session: Send + Sync {
    /// Queue a message for the broker. Returns as soon as the request is
    /// queued; delivery is not awaited. Fails when there is no live connection.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Disconnect from the broker and stop background work.
    async fn close(&self) -> Result<()>;
}

/// Lifecycle notifications, invoked from the session's driver task.
pub trait SessionHandler: Send + Sync {
    fn on_connect(&self);
    fn on_connect_failed(&self, code: &ConnectReturnCode);
    /// Connection lost after a successful connect.
    fn on_disconnect(&self, reason: &str);
    fn on_publish(&self, pkid: u16);
    fn on_subscribe(&self, return_codes: &[SubscribeReasonCode]);
}

/// Human-readable reason for a refused CONNACK. `None` for `Success`.
pub fn refusal_reason(code: &ConnectReturnCode) -> Option<&'static str> {
    match code {
        ConnectReturnCode::Success => None,
        ConnectReturnCode::RefusedProtocolVersion => {
            Some("Connection refused - incorrect protocol version")
        }
        ConnectReturnCode::BadClientId => Some("Connection refused - invalid client identifier"),
        ConnectReturnCode::ServiceUnavailable => Some("Connection refused - server unavailable"),
        ConnectReturnCode::BadUserNamePassword => {
            Some("Connection refused - bad username or password")
        }
        ConnectReturnCode::NotAuthorized => Some("Connection refused - not authorised"),
    }
}

/// [`SessionHandler`] that writes every event to the log.
pub struct LoggingHandler {
    client_id: String,
    broker: String,
}

impl LoggingHandler {
    pub fn new(config: &PublisherConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            broker: format!("{}:{}", config.broker_host, config.port),
        }
    }
}

impl SessionHandler for LoggingHandler {
    fn on_connect(&self) {
        info!("[{}] Connected to MQTT broker at {}", self.client_id, self.broker);
        info!("[{}] Anonymous connection accepted", self.client_id);
    }

    fn on_connect_failed(&self, code: &ConnectReturnCode) {
        error!("[{}] Connection failed. Code: {code:?}", self.client_id);
        if let Some(reason) = refusal_reason(code) {
            error!("[{}] Details: {reason}", self.client_id);
        }
    }

    fn on_disconnect(&self, reason: &str) {
        warn!("[{}] Connection lost ({reason}). Trying to reconnect...", self.client_id);
    }

    fn on_publish(&self, pkid: u16) {
        debug!("[{}] Message published with ID: {pkid}", self.client_id);
    }

    fn on_subscribe(&self, return_codes: &[SubscribeReasonCode]) {
        info!("[{}] Subscribed with QoS: {return_codes:?}", self.client_id);
    }
}

/// Doubling reconnect delay, clamped to `[min, max]`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self { min, max, current: min }
    }

    /// Delay to wait now; the following call returns double, up to `max`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Event-loop bookkeeping, kept apart from the network so it can be tested.
struct EventDriver {
    client_id: String,
    handler: Arc<dyn SessionHandler>,
    backoff: ReconnectBackoff,
    closing: Arc<AtomicBool>,
    /// Shared with [`MqttSession`]; true between a successful ConnAck and the next error.
    connected: Arc<AtomicBool>,
}

impl EventDriver {
    #[cfg(test)]
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Clears the connected flag, returning whether it was set.
    fn mark_disconnected(&self) -> bool {
        self.connected.swap(false, Ordering::SeqCst)
    }

    fn on_event(&mut self, event: &Event) -> Flow {
        match event {
            Event::Incoming(Incoming::ConnAck(ack)) => {
                if matches!(ack.code, ConnectReturnCode::Success) {
                    self.connected.store(true, Ordering::SeqCst);
                    self.backoff.reset();
                    self.handler.on_connect();
                } else {
                    self.handler.on_connect_failed(&ack.code);
                }
            }
            Event::Incoming(Incoming::SubAck(ack)) => {
                self.handler.on_subscribe(&ack.return_codes);
            }
            Event::Incoming(Incoming::Disconnect) => {
                if self.mark_disconnected() {
                    self.handler.on_disconnect("broker sent DISCONNECT");
                }
            }
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                self.handler.on_publish(*pkid);
            }
            Event::Outgoing(Outgoing::Disconnect) => {
                debug!("[{}] DISCONNECT sent, stopping event loop", self.client_id);
                return Flow::Stop;
            }
            _ => {}
        }
        Flow::Continue
    }

    /// Returns the delay before the next poll, or `None` when the loop should end.
    fn on_error(&mut self, err: &ConnectionError) -> Option<Duration> {
        let was_connected = self.mark_disconnected();
        if self.closing.load(Ordering::SeqCst) {
            return None;
        }
        match err {
            ConnectionError::RequestsDone => return None,
            ConnectionError::ConnectionRefused(code) => self.handler.on_connect_failed(code),
            _ if was_connected => {
                self.handler.on_disconnect(&err.to_string());
            }
            _ => warn!("[{}] MQTT connection error: {err}", self.client_id),
        }
        let delay = self.backoff.next_delay();
        debug!("[{}] Reconnecting in {delay:?}", self.client_id);
        Some(delay)
    }
}

async fn drive(mut eventloop: EventLoop, mut driver: EventDriver) {
    loop {
        match eventloop.poll().await {
            Ok(event) => {
                if driver.on_event(&event) == Flow::Stop {
                    break;
                }
            }
            Err(e) => match driver.on_error(&e) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => break,
            },
        }
    }
    debug!("[{}] MQTT event loop stopped", driver.client_id);
}

/// Live session with an MQTT broker.
pub struct MqttSession {
    client: AsyncClient,
    client_id: String,
    closing: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    /// Driver task handle (set on connect, cleared on close).
    driver: RwLock<Option<JoinHandle<()>>>,
}

impl MqttSession {
    /// Create the client and spawn its event-loop driver. The connection
    /// itself is established by the driver in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: &PublisherConfig, handler: Arc<dyn SessionHandler>) -> Self {
        info!(
            "[{}] Connecting to MQTT broker at {}:{}",
            config.client_id, config.broker_host, config.port
        );

        let mut mqtt_opts =
            MqttOptions::new(&config.client_id, &config.broker_host, config.port);
        mqtt_opts.set_keep_alive(config.keep_alive);

        let (client, eventloop) = AsyncClient::new(mqtt_opts, config.channel_capacity);
        let closing = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(false));

        let driver = EventDriver {
            client_id: config.client_id.clone(),
            handler,
            backoff: ReconnectBackoff::new(config.reconnect_min, config.reconnect_max),
            closing: closing.clone(),
            connected: connected.clone(),
        };
        let handle = tokio::spawn(drive(eventloop, driver));

        Self {
            client,
            client_id: config.client_id.clone(),
            closing,
            connected,
            driver: RwLock::new(Some(handle)),
        }
    }
}

#[async_trait]
impl Session for MqttSession {
    /// Fails without queueing while the session is closed or not connected,
    /// so readings are never buffered across a reconnect.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(PublisherError::SessionClosed.into());
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PublisherError::NotConnected.into());
        }
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| anyhow::anyhow!("MQTT publish to '{topic}' failed: {e}"))
    }

    async fn close(&self) -> Result<()> {
        let Some(mut handle) = self.driver.write().await.take() else {
            return Ok(());
        };
        self.closing.store(true, Ordering::SeqCst);

        if let Err(e) = self.client.try_disconnect() {
            warn!("[{}] Failed to queue DISCONNECT: {e}", self.client_id);
            handle.abort();
            return Ok(());
        }
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
            warn!("[{}] Event loop did not stop in {CLOSE_TIMEOUT:?}, aborting", self.client_id);
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, SubAck};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl SessionHandler for RecordingHandler {
        fn on_connect(&self) {
            self.push("connect".into());
        }

        fn on_connect_failed(&self, code: &ConnectReturnCode) {
            self.push(format!("connect_failed:{code:?}"));
        }

        fn on_disconnect(&self, _reason: &str) {
            self.push("disconnect".into());
        }

        fn on_publish(&self, pkid: u16) {
            self.push(format!("publish:{pkid}"));
        }

        fn on_subscribe(&self, return_codes: &[SubscribeReasonCode]) {
            self.push(format!("subscribe:{}", return_codes.len()));
        }
    }

    fn driver(handler: Arc<RecordingHandler>) -> EventDriver {
        EventDriver {
            client_id: "test".into(),
            handler,
            backoff: ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(120)),
            closing: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn connack(code: ConnectReturnCode) -> Event {
        Event::Incoming(Incoming::ConnAck(ConnAck {
            session_present: false,
            code,
        }))
    }

    fn io_error() -> ConnectionError {
        ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(120));
        let delays: Vec<u64> = (0..10).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 120, 120, 120]);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(120));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_refusal_reasons() {
        assert_eq!(refusal_reason(&ConnectReturnCode::Success), None);
        assert_eq!(
            refusal_reason(&ConnectReturnCode::RefusedProtocolVersion),
            Some("Connection refused - incorrect protocol version")
        );
        assert_eq!(
            refusal_reason(&ConnectReturnCode::BadClientId),
            Some("Connection refused - invalid client identifier")
        );
        assert_eq!(
            refusal_reason(&ConnectReturnCode::ServiceUnavailable),
            Some("Connection refused - server unavailable")
        );
        assert_eq!(
            refusal_reason(&ConnectReturnCode::BadUserNamePassword),
            Some("Connection refused - bad username or password")
        );
        assert_eq!(
            refusal_reason(&ConnectReturnCode::NotAuthorized),
            Some("Connection refused - not authorised")
        );
    }

    #[test]
    fn test_connack_success_resets_backoff() {
        let handler = Arc::new(RecordingHandler::default());
        let mut driver = driver(handler.clone());

        assert_eq!(driver.on_error(&io_error()), Some(Duration::from_secs(1)));
        assert_eq!(driver.on_error(&io_error()), Some(Duration::from_secs(2)));
        assert_eq!(driver.on_event(&connack(ConnectReturnCode::Success)), Flow::Continue);
        assert!(driver.is_connected());
        assert_eq!(driver.on_error(&io_error()), Some(Duration::from_secs(1)));

        assert_eq!(handler.events(), vec!["connect", "disconnect"]);
    }

    #[test]
    fn test_refused_connection_reported() {
        let handler = Arc::new(RecordingHandler::default());
        let mut driver = driver(handler.clone());

        let err = ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized);
        assert!(driver.on_error(&err).is_some());
        assert!(!driver.is_connected());
        assert_eq!(handler.events(), vec!["connect_failed:NotAuthorized"]);
    }

    #[test]
    fn test_error_before_connect_is_not_a_disconnect() {
        let handler = Arc::new(RecordingHandler::default());
        let mut driver = driver(handler.clone());

        assert!(driver.on_error(&io_error()).is_some());
        assert!(handler.events().is_empty());
    }

    #[test]
    fn test_publish_and_suback_forwarded() {
        let handler = Arc::new(RecordingHandler::default());
        let mut driver = driver(handler.clone());

        driver.on_event(&Event::Outgoing(Outgoing::Publish(0)));
        driver.on_event(&Event::Incoming(Incoming::SubAck(SubAck::new(
            1,
            vec![SubscribeReasonCode::Success(QoS::AtMostOnce)],
        ))));

        assert_eq!(handler.events(), vec!["publish:0", "subscribe:1"]);
    }

    #[test]
    fn test_outgoing_disconnect_stops_driver() {
        let handler = Arc::new(RecordingHandler::default());
        let mut driver = driver(handler);
        assert_eq!(driver.on_event(&Event::Outgoing(Outgoing::Disconnect)), Flow::Stop);
    }

    #[test]
    fn test_errors_while_closing_stop_driver() {
        let handler = Arc::new(RecordingHandler::default());
        let mut driver = driver(handler.clone());
        driver.connected.store(true, Ordering::SeqCst);
        driver.closing.store(true, Ordering::SeqCst);

        assert_eq!(driver.on_error(&io_error()), None);
        assert!(handler.events().is_empty());
    }

    #[test]
    fn test_requests_done_stops_driver() {
        let handler = Arc::new(RecordingHandler::default());
        let mut driver = driver(handler);
        assert_eq!(driver.on_error(&ConnectionError::RequestsDone), None);
    }

    #[test]
    fn test_connection_loss_clears_connected_flag() {
        let handler = Arc::new(RecordingHandler::default());
        let mut driver = driver(handler.clone());

        driver.on_event(&connack(ConnectReturnCode::Success));
        assert!(driver.is_connected());
        driver.on_event(&Event::Incoming(Incoming::Disconnect));
        assert!(!driver.is_connected());

        driver.on_event(&connack(ConnectReturnCode::Success));
        driver.on_error(&io_error());
        assert!(!driver.is_connected());
        assert_eq!(handler.events(), vec!["connect", "disconnect", "connect", "disconnect"]);
    }

    #[tokio::test]
    async fn test_publish_fails_while_never_connected() {
        let config = PublisherConfig::builder()
            .broker_host("127.0.0.1")
            .port(1)
            .build();
        let session = MqttSession::connect(&config, Arc::new(RecordingHandler::default()));
        tokio::time::sleep(Duration::from_millis(300)).await;

        // More attempts than the request channel holds: none may be queued.
        for _ in 0..config.channel_capacity + 2 {
            let err = session
                .publish("sensor/equipamento_02", b"{}".to_vec())
                .await
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PublisherError>(),
                Some(PublisherError::NotConnected)
            ));
        }
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_after_close_reports_closed_session() {
        let config = PublisherConfig::builder()
            .broker_host("127.0.0.1")
            .port(1)
            .build();
        let session = MqttSession::connect(&config, Arc::new(RecordingHandler::default()));
        session.close().await.unwrap();

        let err = session.publish("sensor/equipamento_03", Vec::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PublisherError>(),
            Some(PublisherError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        // Nothing listens on port 1 of loopback; the driver just keeps retrying.
        let config = PublisherConfig::builder()
            .broker_host("127.0.0.1")
            .port(1)
            .build();
        let session = MqttSession::connect(&config, Arc::new(RecordingHandler::default()));

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.driver.read().await.is_none());
    }
}
