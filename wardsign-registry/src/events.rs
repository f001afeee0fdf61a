use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::models::StatusEvent;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{debug, error, info};

pub const STATUS_TOPIC: &str = "wardsign/displays/status@v1";

/// Publie les transitions de statut sur MQTT; sans broker configuré les
/// events sont seulement tracés.
pub fn spawn_status_publisher(
    mqtt: Option<MqttConf>,
    mut events: mpsc::UnboundedReceiver<StatusEvent>,
    health: HealthTracker,
) {
    let Some(mqtt) = mqtt else {
        health.mark_mqtt_disabled();
        task::spawn(async move {
            while let Some(ev) = events.recv().await {
                debug!("[events] {} {:?} -> {:?} (no broker)", ev.display_id, ev.previous, ev.current);
            }
        });
        return;
    };

    task::spawn(async move {
        let mut opts = MqttOptions::new("wardsign-registry", &mqtt.host, mqtt.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        info!("[events] publishing status events to {}:{}", mqtt.host, mqtt.port);

        loop {
            tokio::select! {
                ev = events.recv() => {
                    let Some(ev) = ev else { break };
                    match serde_json::to_string(&ev) {
                        Ok(payload) => {
                            // try_publish: the event loop is polled by this same task
                            if let Err(e) = client.try_publish(STATUS_TOPIC, QoS::AtLeastOnce, false, payload) {
                                error!("[events] failed to publish: {e:?}");
                            }
                        }
                        Err(e) => error!("[events] failed to encode event: {e}"),
                    }
                }
                polled = eventloop.poll() => {
                    match polled {
                        Ok(rumqttc::Event::Incoming(rumqttc::Incoming::ConnAck(_))) => health.mark_mqtt_connected(),
                        Ok(_) => {}
                        Err(e) => {
                            error!("[events] MQTT error: {e:?}");
                            health.increment_reconnects();
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                    }
                }
            }
        }
        info!("[events] status channel closed, publisher stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::displays::DisplayRegistry;
    use crate::models::DisplayStatus;

    #[tokio::test]
    async fn test_without_broker_events_are_drained() {
        let dir = tempfile::tempdir().unwrap();
        let health = HealthTracker::new();
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_status_publisher(None, rx, health.clone());

        tx.send(StatusEvent {
            display_id: "DISP-001".into(),
            previous: DisplayStatus::Offline,
            current: DisplayStatus::Online,
            reason: "heartbeat".into(),
            timestamp: "2026-10-18T08:00:00Z".into(),
        })
        .unwrap();
        tokio::task::yield_now().await;

        // le consommateur tourne toujours
        assert!(!tx.is_closed());
        let registry = DisplayRegistry::new(dir.path().join("displays.json"));
        assert_eq!(health.get_health(&registry).await.mqtt_status, "disabled");
    }
}
