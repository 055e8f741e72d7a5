use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use ripple_types::events::GatewayEvent;
use ripple_types::models::Message;

/// Manages all connected clients: feed events fan out over a broadcast
/// channel, direct messages go through per-user targeted channels.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for feed events — every connection filters against
    /// its own subscription before forwarding to the client
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender).
    /// One channel per user; a reconnect replaces the previous entry.
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to feed events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast a feed event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    /// A reconnect that already replaced the entry is left alone.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user, if they are connected.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }

    /// Deliver a direct message to both endpoints of its conversation.
    pub async fn deliver_message(&self, message: Message) {
        let sender_id = message.sender_id;
        let receiver_id = message.receiver_id;
        let event = GatewayEvent::MessageCreate { message };

        self.send_to_user(receiver_id, event.clone()).await;
        if sender_id != receiver_id {
            // The sender's connection gets the event as well, so their open
            // chat view updates without a refetch
            self.send_to_user(sender_id, event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(sender_id: Uuid, receiver_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            content: "hi".into(),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn message_delivery_is_targeted() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();

        let (_, mut alice_rx) = dispatcher.register_user_channel(alice).await;
        let (_, mut bob_rx) = dispatcher.register_user_channel(bob).await;
        let (_, mut carol_rx) = dispatcher.register_user_channel(carol).await;

        dispatcher.deliver_message(message(alice, bob)).await;

        assert!(matches!(
            alice_rx.try_recv(),
            Ok(GatewayEvent::MessageCreate { .. })
        ));
        assert!(matches!(
            bob_rx.try_recv(),
            Ok(GatewayEvent::MessageCreate { .. })
        ));
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_conn_id_does_not_unregister_successor() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (old_conn, _old_rx) = dispatcher.register_user_channel(alice).await;
        let (_new_conn, mut new_rx) = dispatcher.register_user_channel(alice).await;

        // The old connection's cleanup runs after the reconnect
        dispatcher.unregister_user_channel(alice, old_conn).await;

        dispatcher.deliver_message(message(bob, alice)).await;
        assert!(new_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.broadcast(GatewayEvent::LikeUpdate {
            post_id: Uuid::new_v4(),
            likes_count: 1,
        });

        assert!(matches!(
            rx.try_recv(),
            Ok(GatewayEvent::LikeUpdate { .. })
        ));
    }
}
