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

//! Mock pH/temperature sensor publisher for MQTT brokers.
//!
//! Every cycle generates one reading per configured equipment and publishes
//! it as JSON to `sensor/<equipment>`, then waits for the next cycle.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mqtt_sensor_mock::{precheck, runner, LoggingHandler, MqttSession, PublisherConfig, ReadingGenerator};
//!
//! let config = PublisherConfig::builder().broker_host("localhost").build();
//! precheck::ensure_reachable(&config).await?;
//!
//! let session = MqttSession::connect(&config, Arc::new(LoggingHandler::new(&config)));
//! let mut generator = ReadingGenerator::from_entropy();
//! runner::run(&session, &config, &mut generator, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await;
//! ```

pub mod config;
pub mod error;
pub mod precheck;
pub mod publisher;
pub mod reading;
pub mod runner;
pub mod session;

pub use config::{PublisherConfig, PublisherConfigBuilder};
pub use error::PublisherError;
pub use reading::{ReadingGenerator, SensorReading};
pub use runner::{LoopFailure, RunSummary, StopReason};
pub use session::{LoggingHandler, MqttSession, Session, SessionHandler};
