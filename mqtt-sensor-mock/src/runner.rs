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

//! The publish loop: generate, publish, pause, repeat until shutdown.

use std::future::Future;

use anyhow::Context;
use log::{error, info};
use rand::Rng;

use crate::config::PublisherConfig;
use crate::error::PublisherError;
use crate::precheck;
use crate::publisher;
use crate::reading::{self, ReadingGenerator};
use crate::session::Session;

const SEPARATOR: &str = "--------------------------------------------------";

/// Why the loop ended.
#[derive(Debug)]
pub enum StopReason {
    Interrupted,
    Failed(anyhow::Error),
}

#[derive(Debug)]
pub struct RunSummary {
    /// Cycles completed before the loop ended.
    pub cycles: u64,
    pub reason: StopReason,
}

/// An unexpected error that ended the publish loop.
#[derive(Debug)]
pub struct LoopFailure {
    /// Cycles completed before the failing one.
    pub cycles: u64,
    pub error: anyhow::Error,
}

/// Check that the broker is reachable, then open the session with `connect`.
///
/// `connect` is not called when the check fails.
pub async fn start<S, C>(config: &PublisherConfig, connect: C) -> Result<S, PublisherError>
where
    C: FnOnce(&PublisherConfig) -> S,
{
    precheck::ensure_reachable(config).await?;
    Ok(connect(config))
}

/// Publish one reading per equipment every `publish_interval` until
/// `shutdown` resolves. Returns the number of completed cycles.
///
/// Shutdown is only observed between cycles; a cycle in progress always
/// finishes. Publish failures are logged and do not end the loop, except
/// [`PublisherError::SessionClosed`], which nothing can recover from.
pub async fn publish_until<S, R, F>(
    session: &S,
    config: &PublisherConfig,
    generator: &mut ReadingGenerator<R>,
    shutdown: F,
) -> Result<u64, LoopFailure>
where
    S: Session + ?Sized,
    R: Rng,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut cycles: u64 = 0;

    loop {
        let cycle = cycles + 1;
        let timestamp = reading::cycle_timestamp();

        for reading in generator.cycle(config.equipment.as_slice(), &timestamp) {
            let topic = config.topic_for(&reading.equipamento);
            let payload = publisher::reading_to_payload(&reading)
                .with_context(|| format!("cycle {cycle}, {}", reading.equipamento))
                .map_err(|error| LoopFailure { cycles, error })?;

            match session.publish(&topic, payload).await {
                Ok(()) => info!(
                    "{}: pH {}, Temp {}°C",
                    reading.equipamento, reading.ph, reading.temperatura
                ),
                Err(e) if is_session_closed(&e) => {
                    return Err(LoopFailure { cycles, error: e });
                }
                Err(e) => error!("Failed to publish reading for {}: {e}", reading.equipamento),
            }
        }

        cycles = cycle;
        info!("Cycle {cycle} complete. Waiting for next cycle...");
        info!("{SEPARATOR}");

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(config.publish_interval) => {}
        }
    }

    Ok(cycles)
}

fn is_session_closed(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PublisherError>(),
        Some(PublisherError::SessionClosed)
    )
}

/// Run the publish loop, then tear the session down exactly once whether the
/// loop was interrupted or failed.
pub async fn run<S, R, F>(
    session: &S,
    config: &PublisherConfig,
    generator: &mut ReadingGenerator<R>,
    shutdown: F,
) -> RunSummary
where
    S: Session + ?Sized,
    R: Rng,
    F: Future<Output = ()>,
{
    info!("Publishing mock data for {} equipment...", config.equipment.len());
    info!("Press Ctrl+C to stop");
    info!("{SEPARATOR}");

    let summary = match publish_until(session, config, generator, shutdown).await {
        Ok(cycles) => {
            info!("Publishing interrupted by user");
            RunSummary {
                cycles,
                reason: StopReason::Interrupted,
            }
        }
        Err(LoopFailure { cycles, error }) => {
            error!("Unexpected error after {cycles} cycles: {error:#}");
            RunSummary {
                cycles,
                reason: StopReason::Failed(error),
            }
        }
    };

    if let Err(e) = session.close().await {
        error!("Failed to close MQTT session: {e:#}");
    }
    info!("MQTT connection closed");
    summary
}
