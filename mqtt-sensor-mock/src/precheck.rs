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

//! TCP reachability check run before any MQTT session is opened.

use std::time::Duration;

use log::{error, info};
use tokio::net::TcpStream;

use crate::config::PublisherConfig;
use crate::error::PublisherError;

/// Try a raw TCP connect to `host:port`. Any error or timeout counts as unreachable.
pub async fn broker_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => {
            info!("Port {port} on {host} is reachable");
            true
        }
        Ok(Err(e)) => {
            error!("Port {port} on {host} is not reachable: {e}");
            false
        }
        Err(_) => {
            error!("Port {port} on {host} is not reachable: timed out after {timeout:?}");
            false
        }
    }
}

/// Run the check against the configured broker.
pub async fn ensure_reachable(config: &PublisherConfig) -> Result<(), PublisherError> {
    if broker_reachable(&config.broker_host, config.port, config.precheck_timeout).await {
        Ok(())
    } else {
        Err(PublisherError::BrokerUnreachable {
            host: config.broker_host.clone(),
            port: config.port,
        })
    }
}
