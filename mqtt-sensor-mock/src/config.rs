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

//! Configuration types for the mock sensor publisher.

use std::time::Duration;

use serde::Deserialize;

/// Default broker address the mock publisher targets.
pub const DEFAULT_BROKER_HOST: &str = "34.235.228.232";
pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_TOPIC_PREFIX: &str = "sensor";
pub const DEFAULT_EQUIPMENT: [&str; 2] = ["equipamento_02", "equipamento_03"];

/// Configuration for the mock publisher.
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    /// MQTT broker hostname or IP.
    pub broker_host: String,
    /// MQTT broker port (default: 1883).
    pub port: u16,
    /// MQTT client ID. Defaults to `"mock-publisher-{uuid}"`.
    pub client_id: String,
    /// Keep-alive interval negotiated with the broker.
    pub keep_alive: Duration,
    /// Topic prefix; each equipment publishes to `{prefix}/{equipment}`.
    pub topic_prefix: String,
    /// Equipment identifiers, one reading per identifier per cycle.
    pub equipment: Vec<String>,
    /// Pause between publish cycles.
    pub publish_interval: Duration,
    /// Wait after session creation before the first cycle.
    pub startup_grace: Duration,
    /// Timeout of the TCP reachability check.
    pub precheck_timeout: Duration,
    /// First reconnect delay after a connection error.
    pub reconnect_min: Duration,
    /// Upper bound of the reconnect delay.
    pub reconnect_max: Duration,
    /// Capacity of the rumqttc request channel.
    pub channel_capacity: usize,
}

impl PublisherConfig {
    /// Start building a config pre-filled with the mock publisher defaults.
    pub fn builder() -> PublisherConfigBuilder {
        PublisherConfigBuilder {
            broker_host: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_PORT,
            client_id: format!("mock-publisher-{}", uuid::Uuid::new_v4()),
            keep_alive: Duration::from_secs(60),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            equipment: DEFAULT_EQUIPMENT.iter().map(|e| e.to_string()).collect(),
            publish_interval: Duration::from_secs(5),
            startup_grace: Duration::from_secs(2),
            precheck_timeout: Duration::from_secs(5),
            reconnect_min: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(120),
            channel_capacity: 10,
        }
    }

    /// Topic a given equipment's readings are published to.
    pub fn topic_for(&self, equipment: &str) -> String {
        format!("{}/{}", self.topic_prefix, equipment)
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`PublisherConfig`].
pub struct PublisherConfigBuilder {
    broker_host: String,
    port: u16,
    client_id: String,
    keep_alive: Duration,
    topic_prefix: String,
    equipment: Vec<String>,
    publish_interval: Duration,
    startup_grace: Duration,
    precheck_timeout: Duration,
    reconnect_min: Duration,
    reconnect_max: Duration,
    channel_capacity: usize,
}

impl PublisherConfigBuilder {
    pub fn broker_host(mut self, host: impl Into<String>) -> Self {
        self.broker_host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval;
        self
    }

    pub fn startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    pub fn precheck_timeout(mut self, timeout: Duration) -> Self {
        self.precheck_timeout = timeout;
        self
    }

    /// Set the reconnect backoff bounds. `max` is clamped to at least `min`.
    pub fn reconnect_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.reconnect_min = min;
        self.reconnect_max = max.max(min);
        self
    }

    /// Build the config.
    pub fn build(self) -> PublisherConfig {
        PublisherConfig {
            broker_host: self.broker_host,
            port: self.port,
            client_id: self.client_id,
            keep_alive: self.keep_alive,
            topic_prefix: self.topic_prefix,
            equipment: self.equipment,
            publish_interval: self.publish_interval,
            startup_grace: self.startup_grace,
            precheck_timeout: self.precheck_timeout,
            reconnect_min: self.reconnect_min,
            reconnect_max: self.reconnect_max,
            channel_capacity: self.channel_capacity,
        }
    }
}
