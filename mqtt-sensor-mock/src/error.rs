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

use thiserror::Error;

/// Failures a caller of the publisher needs to tell apart.
#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("broker {host}:{port} is not reachable")]
    BrokerUnreachable { host: String, port: u16 },

    #[error("not connected to the broker")]
    NotConnected,

    #[error("session is closed")]
    SessionClosed,

    #[error("failed to encode reading: {0}")]
    Payload(#[from] serde_json::Error),
}
