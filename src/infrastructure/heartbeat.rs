use crate::transport::{Transport, TransportEvent, TransportEvents};
use crate::types::constants::{PING_INTERVAL, methods, reasons};
use serde_json::Value;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(PING_INTERVAL);

/// Periodically pings the server over an open transport. A failed ping
/// reports the connection as lost.
pub struct HeartbeatManager {
    interval: Duration,
    transport: Weak<dyn Transport>,
    events: TransportEvents,
}

impl HeartbeatManager {
    pub fn new(transport: Weak<dyn Transport>, events: TransportEvents) -> Self {
        Self {
            interval: DEFAULT_PING_INTERVAL,
            transport,
            events,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawns the ping task. The first ping goes out one interval after
    /// spawning so the handshake always comes first.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval_timer =
                time::interval_at(Instant::now() + self.interval, self.interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;

                // Transport dropped, nothing left to keep alive
                let Some(transport) = self.transport.upgrade() else {
                    break;
                };

                match transport.send(methods::PING, Value::Null).await {
                    Ok(_) => tracing::debug!("Ping acknowledged"),
                    Err(e) => {
                        tracing::warn!("Ping failed ({}), closing connection", e);
                        let _ = self.events.send(TransportEvent::Closed {
                            reason: reasons::NO_PING.to_string(),
                            reconnect: true,
                        });
                        transport.close().await;
                        break;
                    }
                }
            }
            tracing::debug!("Heartbeat task finished");
        })
    }
}
