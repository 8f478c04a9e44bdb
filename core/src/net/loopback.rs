//! In-process transport
//!
//! Pairs transports living in the same process through shared mailboxes, so
//! two full sessions can play against each other without sockets. Delivery is
//! ordered and reliable, and only happens when the receiving side polls, which
//! makes message races around phase boundaries reproducible in tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::error::TransportError;
use crate::net::messages::GameMessage;
use crate::net::transport::{Link, LinkState, Transport, TransportEvent};

type Mailbox = Rc<RefCell<VecDeque<Delivery>>>;

#[derive(Debug)]
enum Delivery {
    ConnectRequest {
        from: String,
        conn_id: u64,
        reply_to: Mailbox,
    },
    Accepted { conn_id: u64 },
    Rejected { conn_id: u64 },
    Data { conn_id: u64, msg: GameMessage },
    Closed { conn_id: u64 },
}

#[derive(Debug, Default)]
struct Registry {
    mailboxes: HashMap<String, Mailbox>,
    next_conn_id: u64,
    signaling_down: bool,
}

/// Shared switchboard that loopback endpoints register with.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    registry: Rc<RefCell<Registry>>,
}

#[derive(Debug)]
struct LoopbackChannel {
    conn_id: u64,
    peer: Mailbox,
}

/// One endpoint on a [`LoopbackNetwork`].
#[derive(Debug)]
pub struct LoopbackTransport {
    id: String,
    network: LoopbackNetwork,
    mailbox: Mailbox,
    link: Link<LoopbackChannel>,
    events: VecDeque<TransportEvent>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint under `id`, replacing any previous holder.
    pub fn endpoint(&self, id: &str) -> LoopbackTransport {
        let mailbox: Mailbox = Rc::default();
        self.registry
            .borrow_mut()
            .mailboxes
            .insert(id.to_string(), Rc::clone(&mailbox));

        let mut events = VecDeque::new();
        events.push_back(TransportEvent::IdentityAssigned(id.to_string()));

        LoopbackTransport {
            id: id.to_string(),
            network: self.clone(),
            mailbox,
            link: Link::default(),
            events,
        }
    }

    /// Toggle whether endpoints can re-register after losing signaling.
    pub fn set_signaling_available(&self, available: bool) {
        self.registry.borrow_mut().signaling_down = !available;
    }

    fn lookup(&self, id: &str) -> Option<Mailbox> {
        self.registry.borrow().mailboxes.get(id).cloned()
    }

    fn next_conn_id(&self) -> u64 {
        let mut registry = self.registry.borrow_mut();
        registry.next_conn_id += 1;
        registry.next_conn_id
    }
}

impl LoopbackTransport {
    /// Simulate the signaling endpoint dropping out from under this peer.
    pub fn lose_signaling(&mut self) {
        self.network.registry.borrow_mut().mailboxes.remove(&self.id);
        self.events.push_back(TransportEvent::SignalingLost);
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    fn drain_mailbox(&mut self) {
        loop {
            let next = self.mailbox.borrow_mut().pop_front();
            let Some(delivery) = next else {
                return;
            };
            self.handle_delivery(delivery);
        }
    }

    fn handle_delivery(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::ConnectRequest {
                from,
                conn_id,
                reply_to,
            } => {
                if self.link.is_busy() {
                    tracing::debug!(%from, "Already connected, rejecting inbound connection");
                    reply_to
                        .borrow_mut()
                        .push_back(Delivery::Rejected { conn_id });
                    return;
                }
                let channel = LoopbackChannel {
                    conn_id,
                    peer: Rc::clone(&reply_to),
                };
                if self.link.begin(&from, channel).is_ok() {
                    self.link.mark_open();
                    reply_to.borrow_mut().push_back(Delivery::Accepted { conn_id });
                    self.events.push_back(TransportEvent::Incoming {
                        remote_id: from.clone(),
                    });
                    self.events
                        .push_back(TransportEvent::Opened { remote_id: from });
                }
            }
            Delivery::Accepted { conn_id } => {
                if self.is_current(conn_id) && self.link.state() == LinkState::Handshaking {
                    self.link.mark_open();
                    let remote_id = self.link.remote_id().unwrap_or_default().to_string();
                    self.events.push_back(TransportEvent::Opened { remote_id });
                }
            }
            Delivery::Rejected { conn_id } | Delivery::Closed { conn_id } => {
                if self.is_current(conn_id) {
                    self.link.take();
                    self.events.push_back(TransportEvent::Closed);
                }
            }
            Delivery::Data { conn_id, msg } => {
                if self.is_current(conn_id) && self.link.state() == LinkState::Open {
                    tracing::trace!(?msg, "Received message");
                    self.events.push_back(TransportEvent::Message(msg));
                } else {
                    tracing::trace!(?msg, "Dropping message for stale channel");
                }
            }
        }
    }

    fn is_current(&mut self, conn_id: u64) -> bool {
        self.link
            .channel_mut()
            .is_some_and(|channel| channel.conn_id == conn_id)
    }
}

impl Transport for LoopbackTransport {
    fn local_id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn connect(&mut self, remote_id: &str) -> Result<(), TransportError> {
        if remote_id == self.id {
            return Err(TransportError::SelfConnectAttempt);
        }
        if self.link.is_busy() {
            return Err(TransportError::AlreadyConnected);
        }

        let Some(peer) = self.network.lookup(remote_id) else {
            self.events.push_back(TransportEvent::Failed(TransportError::PeerUnavailable(
                remote_id.to_string(),
            )));
            return Ok(());
        };

        let conn_id = self.network.next_conn_id();
        peer.borrow_mut().push_back(Delivery::ConnectRequest {
            from: self.id.clone(),
            conn_id,
            reply_to: Rc::clone(&self.mailbox),
        });
        self.link.begin(remote_id, LoopbackChannel { conn_id, peer })
    }

    fn send(&mut self, msg: GameMessage) -> Result<(), TransportError> {
        let channel = self.link.open_channel()?;
        channel.peer.borrow_mut().push_back(Delivery::Data {
            conn_id: channel.conn_id,
            msg,
        });
        tracing::trace!(?msg, "Sent message");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(channel) = self.link.take() {
            channel
                .peer
                .borrow_mut()
                .push_back(Delivery::Closed {
                    conn_id: channel.conn_id,
                });
        }
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if self.events.is_empty() {
            self.drain_mailbox();
        }
        self.events.pop_front()
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        if self.network.registry.borrow().signaling_down {
            return Err(TransportError::Critical("signaling unavailable".to_string()));
        }
        self.network
            .registry
            .borrow_mut()
            .mailboxes
            .insert(self.id.clone(), Rc::clone(&self.mailbox));
        self.events
            .push_back(TransportEvent::IdentityAssigned(self.id.clone()));
        Ok(())
    }
}
