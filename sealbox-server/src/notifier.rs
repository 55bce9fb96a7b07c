//! Realtime channel hub.
//!
//! Each connected client holds an unbounded in-process channel registered
//! under its user. Revocation pushes one `device-revoked` event to every
//! live channel of that user, at most once per channel; delivery is best
//! effort and never blocks or fails the revocation itself. The transport
//! boundary (websocket handler) owns the socket; this hub only routes
//! events.

use crate::auth::AuthService;
use crate::devices::DeviceRegistry;
use crate::error::{ServerError, ServerResult};
use chrono::Utc;
use sealbox_types::{ChannelEvent, ChannelHandshake};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use uuid::Uuid;

struct Registration {
    device_name: String,
    sender: UnboundedSender<ChannelEvent>,
}

/// One authenticated realtime connection.
#[derive(Debug)]
pub struct ChannelConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub events: UnboundedReceiver<ChannelEvent>,
}

pub struct RealtimeNotifier {
    auth: Arc<AuthService>,
    devices: Arc<DeviceRegistry>,
    channels: RwLock<HashMap<Uuid, HashMap<Uuid, Registration>>>,
}

impl RealtimeNotifier {
    pub fn new(auth: Arc<AuthService>, devices: Arc<DeviceRegistry>) -> Self {
        Self {
            auth,
            devices,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Authenticates a handshake and registers a channel for its user.
    ///
    /// The declared device must be registered to the token's account and
    /// its name must match the registry; a client cannot subscribe under
    /// a device identity it does not hold.
    pub async fn connect(&self, handshake: &ChannelHandshake) -> ServerResult<ChannelConnection> {
        let user = self.auth.authenticate(&handshake.token)?;
        let device = self.devices.find_by_id(handshake.device_id, user.id)?;
        if device.device_name != handshake.device_name {
            return Err(ServerError::Forbidden(
                "declared device name does not match the registered device".to_string(),
            ));
        }
        let (sender, events) = unbounded_channel();
        let id = Uuid::now_v7();

        let mut channels = self.channels.write().await;
        channels.entry(user.id).or_default().insert(
            id,
            Registration {
                device_name: handshake.device_name.clone(),
                sender,
            },
        );
        tracing::debug!(user_id = %user.id, device_name = %handshake.device_name, "realtime channel opened");
        Ok(ChannelConnection {
            id,
            user_id: user.id,
            events,
        })
    }

    pub async fn disconnect(&self, user_id: Uuid, connection_id: Uuid) {
        let mut channels = self.channels.write().await;
        if let Some(user_channels) = channels.get_mut(&user_id) {
            user_channels.remove(&connection_id);
            if user_channels.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Heartbeat: replies `pong` on the caller's own channel.
    pub async fn ping(&self, user_id: Uuid, connection_id: Uuid) {
        let channels = self.channels.read().await;
        if let Some(reg) = channels
            .get(&user_id)
            .and_then(|user_channels| user_channels.get(&connection_id))
        {
            let _ = reg.sender.send(ChannelEvent::Pong);
        }
    }

    /// Broadcasts a revocation to every live channel of the user.
    ///
    /// Returns the number of channels the event was delivered to. Channels
    /// whose receiver is gone are pruned; a zero count is not an error: the
    /// refresh path enforces revocation for clients that were offline.
    pub async fn notify_device_revoked(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        device_name: &str,
    ) -> usize {
        let event = ChannelEvent::DeviceRevoked {
            device_id,
            device_name: device_name.to_string(),
            message: format!("device '{device_name}' has been revoked"),
            timestamp: Utc::now(),
        };

        let mut channels = self.channels.write().await;
        let Some(user_channels) = channels.get_mut(&user_id) else {
            return 0;
        };

        let mut delivered = 0;
        user_channels.retain(|_, reg| {
            if reg.sender.send(event.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                tracing::debug!(device_name = %reg.device_name, "pruning dead realtime channel");
                false
            }
        });
        if user_channels.is_empty() {
            channels.remove(&user_id);
        }
        delivered
    }
}
