use std::time::Duration;

use log::{debug, error, info, warn};
use rumqttc::{MqttOptions, QoS, SubscribeFilter};
use serde_derive::Serialize;
use tokio::sync::broadcast;

use crate::config;
use crate::messages::{ControlAnnouncement, PresenceState};

#[derive(Debug, Clone)]
pub struct MqttClient {
    client: rumqttc::AsyncClient,
    publisher_id: String,
    topic_path: String,
}

#[derive(Debug, Serialize)]
struct PresenceMqttMessage<'a> {
    state: PresenceState,
    #[serde(rename = "id")]
    control_identity: &'a str,
}

impl MqttClient {
    pub fn new(host: &str, config: &config::MqttConfig) -> (Self, rumqttc::EventLoop) {
        let publisher_id = config
            .publisher_id
            .clone()
            .unwrap_or_else(|| "luxafor-presence".to_string());

        let mut mqttoptions = MqttOptions::new(
            publisher_id.clone(),
            host,
            config.port.unwrap_or(1883),
        );

        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.unwrap_or(5)));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            mqttoptions.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(mqttoptions, 10);

        (
            MqttClient {
                client,
                publisher_id,
                topic_path: config
                    .topic_path
                    .clone()
                    .unwrap_or_else(|| "presence".to_string()),
            },
            eventloop,
        )
    }

    fn control_topics(&self) -> Vec<String> {
        ["active", "inactive", "clear"]
            .iter()
            .map(|action| format!("{}/force/{}", self.topic_path, action))
            .collect()
    }

    fn state_topic(&self) -> String {
        format!("{}/{}/state", self.topic_path, self.publisher_id)
    }

    pub async fn subscribe(&self) -> Result<(), rumqttc::ClientError> {
        self.client
            .subscribe_many(
                self.control_topics()
                    .into_iter()
                    .map(|topic| SubscribeFilter::new(topic, QoS::AtMostOnce)),
            )
            .await?;

        Ok(())
    }

    pub async fn event_loop(
        &self,
        eventloop: &mut rumqttc::EventLoop,
        tx: broadcast::Sender<ControlAnnouncement>,
    ) {
        loop {
            match eventloop.poll().await {
                Ok(notification) => match notification {
                    rumqttc::Event::Incoming(rumqttc::Packet::Publish(p)) => {
                        debug!("Received MQTT message on topic {}: {:?}", p.topic, p.payload);

                        let Some(message) = parse_control_topic(&p.topic) else {
                            warn!("Ignoring message on unexpected topic {}", p.topic);
                            continue;
                        };

                        if let Err(err) = tx.send(message) {
                            error!("Error forwarding control request: {:?}", err);
                        }
                    }
                    rumqttc::Event::Incoming(rumqttc::Packet::SubAck(_)) => {
                        debug!("Subscription acknowledged");
                    }
                    rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)) => {
                        debug!("Connection acknowledged");
                        if let Err(err) = self.subscribe().await {
                            error!("Error subscribing to MQTT topics: {:?}", err);
                        }
                    }
                    _ => {}
                },
                Err(e) => {
                    error!("Error polling MQTT event loop: {:?}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Publishes the current presence as a retained message. Never waits on
    /// the network; a full request queue drops the update.
    pub fn announce_state(&self, state: PresenceState, control_identity: &str) {
        info!("Announcing presence {} on MQTT", state);
        let message = PresenceMqttMessage {
            state,
            control_identity,
        };
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(err) => {
                error!("Error encoding presence message: {:?}", err);
                return;
            }
        };
        if let Err(err) = self
            .client
            .try_publish(self.state_topic(), QoS::AtLeastOnce, true, payload)
        {
            warn!("Error publishing presence: {:?}", err);
        }
    }

    pub async fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        debug!("Disconnecting MQTT client");
        self.client.disconnect().await
    }
}

fn parse_control_topic(topic: &str) -> Option<ControlAnnouncement> {
    match topic.rsplit_once("/force/")?.1 {
        "active" => Some(ControlAnnouncement::Force(PresenceState::Active)),
        "inactive" => Some(ControlAnnouncement::Force(PresenceState::Inactive)),
        "clear" => Some(ControlAnnouncement::ClearForce),
        _ => None,
    }
}
