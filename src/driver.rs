//! Background task that pumps a client on a tokio runtime.
//!
//! Hosts with their own frame loop call [`Client::tick`] and [`Client::ping`]
//! themselves. Everyone else spawns a `Driver`, which ticks on
//! `tick_interval` and pings on `keepalive_interval` until shut down.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::client::Client;
use crate::config::ClientConfig;

/// Intervals for a [`Driver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    pub tick_interval: Duration,
    pub keepalive_interval: Duration,
}

impl From<&ClientConfig> for DriverConfig {
    fn from(config: &ClientConfig) -> Self {
        Self { tick_interval: config.tick_interval, keepalive_interval: config.keepalive_interval }
    }
}

/// Handle to a running driver task. Dropping it stops the task.
#[derive(Debug)]
pub struct Driver {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Driver {
    /// Spawn with the intervals from the client's own config.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn spawn(client: Client) -> Self {
        let config = DriverConfig::from(client.config());
        Self::spawn_with(client, config)
    }

    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn spawn_with(client: Client, config: DriverConfig) -> Self {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(run(client, config, stopped));
        Self { stop: Some(stop), task }
    }

    /// Stop the task and wait for it to finish its current tick.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.task).await;
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            self.task.abort();
        }
    }
}

async fn run(client: Client, config: DriverConfig, mut stopped: oneshot::Receiver<()>) {
    let mut tick = tokio::time::interval(config.tick_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut keepalive = tokio::time::interval(config.keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        tick_ms = config.tick_interval.as_millis(),
        keepalive_ms = config.keepalive_interval.as_millis(),
        "client driver started"
    );
    loop {
        tokio::select! {
            _ = &mut stopped => break,
            _ = tick.tick() => {
                client.tick();
            }
            _ = keepalive.tick() => {
                if client.ping().is_some() {
                    debug!("keepalive ping sent");
                }
            }
        }
    }
    // Apply whatever arrived before the stop signal.
    client.tick();
    info!("client driver stopped");
}

#[cfg(test)]
#[path = "driver_test.rs"]
mod tests;
