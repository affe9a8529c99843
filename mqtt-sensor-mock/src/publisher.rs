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

//! Utility functions for serializing sensor readings to MQTT payloads.

use crate::error::PublisherError;
use crate::reading::SensorReading;

/// Serialize a reading into the JSON payload published for its equipment.
///
/// The object carries exactly `equipamento`, `timestamp`, `ph` and `temperatura`.
pub fn reading_to_payload(reading: &SensorReading) -> Result<Vec<u8>, PublisherError> {
    Ok(serde_json::to_vec(reading)?)
}
