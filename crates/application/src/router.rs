//! 消息路由
//!
//! 至多一次、无保证的投递：接收方在线就原样投递一次，否则静默丢弃。
//! 不回显给发送方。

use domain::{ConnectionId, Message, ServerEvent};

use crate::registry::ConnectionRegistry;
use crate::session::SessionTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// 已交给接收方连接
    Delivered(ConnectionId),
    /// 接收方离线或连接已失效
    Undeliverable,
}

/// 路由统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub routed: u64,
    pub delivered: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub struct MessageRouter {
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        &mut self,
        registry: &ConnectionRegistry,
        sessions: &SessionTable,
        message: Message,
    ) -> RouteOutcome {
        self.stats.routed += 1;

        let outcome = match registry
            .resolve(&message.receiver_id)
            .and_then(|connection_id| sessions.get(&connection_id))
        {
            Some(session) => {
                let connection_id = session.id();
                if session.deliver(ServerEvent::ReceiveMessage(message)) {
                    RouteOutcome::Delivered(connection_id)
                } else {
                    RouteOutcome::Undeliverable
                }
            }
            None => RouteOutcome::Undeliverable,
        };

        match outcome {
            RouteOutcome::Delivered(_) => self.stats.delivered += 1,
            RouteOutcome::Undeliverable => self.stats.dropped += 1,
        }
        outcome
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::GatewaySession;
    use domain::{Identity, Payload};
    use tokio::sync::mpsc;

    fn id(value: &str) -> Identity {
        Identity::parse(value).unwrap()
    }

    struct Fixture {
        registry: ConnectionRegistry,
        sessions: SessionTable,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: ConnectionRegistry::new(),
                sessions: SessionTable::new(),
            }
        }

        fn join(&mut self, name: &str) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let connection_id = ConnectionId::new();
            let mut session = GatewaySession::new(connection_id, tx);
            session.identify(id(name)).unwrap();
            self.registry.register(id(name), connection_id);
            self.sessions.insert(connection_id, session);
            (connection_id, rx)
        }
    }

    fn message(from: &str, to: &str, payload: &str) -> Message {
        Message::new(id(from), id(to), Payload::new(payload.into()).unwrap(), 1)
    }

    #[test]
    fn delivers_exactly_once_to_receiver_and_never_to_sender() {
        let mut fixture = Fixture::new();
        let (_, mut alice) = fixture.join("alice");
        let (bob_connection, mut bob) = fixture.join("bob");
        let mut router = MessageRouter::new();

        let sent = message("alice", "bob", "U2FsdGVkX1/opaque+bytes==");
        let outcome = router.route(&fixture.registry, &fixture.sessions, sent.clone());

        assert_eq!(outcome, RouteOutcome::Delivered(bob_connection));
        assert_eq!(bob.try_recv().unwrap(), ServerEvent::ReceiveMessage(sent));
        assert!(bob.try_recv().is_err());
        assert!(alice.try_recv().is_err());
    }

    #[test]
    fn offline_receiver_is_dropped_silently() {
        let mut fixture = Fixture::new();
        let (_, mut alice) = fixture.join("alice");
        let mut router = MessageRouter::new();

        let outcome = router.route(
            &fixture.registry,
            &fixture.sessions,
            message("alice", "nobody", "x"),
        );

        assert_eq!(outcome, RouteOutcome::Undeliverable);
        assert!(alice.try_recv().is_err());
        assert_eq!(
            router.stats(),
            RouterStats {
                routed: 1,
                delivered: 0,
                dropped: 1
            }
        );
    }

    #[test]
    fn receiver_whose_transport_vanished_counts_as_dropped() {
        let mut fixture = Fixture::new();
        let (_, bob) = fixture.join("bob");
        drop(bob);
        let mut router = MessageRouter::new();

        let outcome = router.route(&fixture.registry, &fixture.sessions, message("a", "bob", "x"));
        assert_eq!(outcome, RouteOutcome::Undeliverable);
    }

    #[test]
    fn self_addressed_message_is_delivered_once() {
        let mut fixture = Fixture::new();
        let (connection_id, mut me) = fixture.join("me");
        let mut router = MessageRouter::new();

        let note = message("me", "me", "note to self");
        assert_eq!(
            router.route(&fixture.registry, &fixture.sessions, note.clone()),
            RouteOutcome::Delivered(connection_id)
        );
        assert_eq!(me.try_recv().unwrap(), ServerEvent::ReceiveMessage(note));
        assert!(me.try_recv().is_err());
    }

    #[test]
    fn superseded_connection_no_longer_receives() {
        let mut fixture = Fixture::new();
        let (_, mut first) = fixture.join("bob");
        let (second_connection, mut second) = fixture.join("bob");
        let mut router = MessageRouter::new();

        let outcome = router.route(&fixture.registry, &fixture.sessions, message("a", "bob", "x"));
        assert_eq!(outcome, RouteOutcome::Delivered(second_connection));
        assert!(first.try_recv().is_err());
        assert!(second.try_recv().is_ok());
    }
}
