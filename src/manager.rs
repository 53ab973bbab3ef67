use log::{debug, error, info};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::engine::PresenceEngine;
use crate::messages::ControlAnnouncement;
use crate::mqtt::MqttClient;

/// Drives the engine: periodic ticks plus remote force requests, all handled
/// from a single loop so engine calls never overlap.
pub struct Manager {
    engine: PresenceEngine,
    mqtt: Option<(MqttClient, rumqttc::EventLoop)>,
}

fn handle_control(engine: &mut PresenceEngine, msg: ControlAnnouncement) {
    match msg {
        ControlAnnouncement::Force(state) => {
            info!("Received force request: {}", state);
            engine.force(state);
        }
        ControlAnnouncement::ClearForce => match engine.forced_state() {
            Some(state) => {
                info!("Received clear-force request, releasing {}", state);
                engine.clear_force();
            }
            None => debug!("Received clear-force request while not forced"),
        },
    }
}

impl Manager {
    pub fn new(engine: PresenceEngine, mqtt: Option<(MqttClient, rumqttc::EventLoop)>) -> Self {
        Manager { engine, mqtt }
    }

    /// Runs until Ctrl-C.
    pub async fn run_loop(self) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Error listening for Ctrl-C: {:?}", err);
            }
        })
        .await
    }

    async fn run_until<F>(mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = broadcast::channel(10);

        let mqtt_client = match self.mqtt.take() {
            Some((client, mut eventloop)) => {
                let listener = client.clone();
                let tx = tx.clone();
                tokio::task::spawn(async move {
                    listener.event_loop(&mut eventloop, tx).await;
                });
                Some(client)
            }
            None => None,
        };

        let poll_interval = self.engine.config().poll_interval;
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Polling presence every {:?}", poll_interval);

        // Polled first on every pass so the handler is installed before the
        // first tick and a signal raised mid-tick is still observed.
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutting down");
                    break;
                }
                _ = interval.tick() => {
                    // Signal sources may block on the filesystem or a helper process.
                    tokio::task::block_in_place(|| self.engine.tick());
                }
                msg = rx.recv() => match msg {
                    Ok(msg) => tokio::task::block_in_place(|| handle_control(&mut self.engine, msg)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Control receiver lagged by {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Control channel closed");
                    }
                },
            }
        }
        drop(tx);

        if let Some(client) = mqtt_client {
            if let Err(err) = client.disconnect().await {
                error!("Error disconnecting MQTT client: {:?}", err);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::controller::LogController;
    use crate::messages::PresenceState;
    use crate::signals::{DeviceActivitySignal, NullSignal};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Requests shutdown from inside the first tick.
    struct ShutdownDuringTick(Mutex<Option<oneshot::Sender<()>>>);

    impl DeviceActivitySignal for ShutdownDuringTick {
        fn query(&self) -> bool {
            if let Some(tx) = self.0.lock().unwrap().take() {
                let _ = tx.send(());
            }
            false
        }
    }

    fn engine() -> PresenceEngine {
        PresenceEngine::new(
            EngineConfig::default(),
            Box::new(NullSignal),
            Box::new(NullSignal),
            Box::new(NullSignal),
            Box::new(LogController),
        )
    }

    #[test]
    fn test_control_messages_reach_engine() {
        let mut engine = engine();

        handle_control(&mut engine, ControlAnnouncement::Force(PresenceState::Active));
        assert_eq!(engine.forced_state(), Some(PresenceState::Active));
        assert_eq!(engine.state(), PresenceState::Active);

        handle_control(&mut engine, ControlAnnouncement::ClearForce);
        assert_eq!(engine.forced_state(), None);

        engine.tick();
        assert_eq!(engine.state(), PresenceState::Inactive);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_raised_during_tick_stops_loop() {
        let (tx, rx) = oneshot::channel();
        let engine = PresenceEngine::new(
            EngineConfig::default(),
            Box::new(ShutdownDuringTick(Mutex::new(Some(tx)))),
            Box::new(NullSignal),
            Box::new(NullSignal),
            Box::new(LogController),
        );
        let manager = Manager::new(engine, None);

        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            manager.run_until(async {
                let _ = rx.await;
            }),
        )
        .await;

        assert!(matches!(finished, Ok(Ok(()))));
    }
}
