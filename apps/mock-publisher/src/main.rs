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

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};
use mqtt_sensor_mock::{
    runner, LoggingHandler, MqttSession, PublisherConfig, PublisherError, ReadingGenerator,
    Session,
};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = PublisherConfig::default();

    info!("Starting MQTT mock publisher...");
    info!("Trying to connect to {}:{}", config.broker_host, config.port);

    let session = match runner::start(&config, |c| {
        MqttSession::connect(c, Arc::new(LoggingHandler::new(c)))
    })
    .await
    {
        Ok(session) => session,
        Err(e) => return ExitCode::from(startup_failure(&e)),
    };

    // Give the driver a moment to complete the CONNECT handshake.
    tokio::select! {
        _ = tokio::time::sleep(config.startup_grace) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted before publishing started");
            if let Err(e) = session.close().await {
                error!("Failed to close MQTT session: {e:#}");
            }
            return ExitCode::SUCCESS;
        }
    }

    let mut generator = ReadingGenerator::from_entropy();
    let summary = runner::run(&session, &config, &mut generator, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    })
    .await;

    info!("Stopped after {} cycles", summary.cycles);
    ExitCode::SUCCESS
}

/// Log why startup failed and return the process exit status.
fn startup_failure(err: &PublisherError) -> u8 {
    error!("{err}");
    if let PublisherError::BrokerUnreachable { .. } = err {
        info!("Hint: check that the Mosquitto container is running:");
        info!("   docker-compose ps mosquitto");
        info!("   docker-compose logs mosquitto");
    }
    1
}
