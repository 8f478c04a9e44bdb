//! TCP transport
//!
//! Provides the transport capability over plain TCP for LAN and localhost
//! play. The local identifier is the advertised `ip:port` of the listener;
//! a remote identifier is whatever the peer shared with you.
//!
//! Outbound connects run on a short-lived thread so `connect` returns
//! immediately; everything else is non-blocking and driven by `poll`.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

use crate::config::NetworkSettings;
use crate::error::TransportError;
use crate::net::messages::{FrameBuffer, GameMessage};
use crate::net::transport::{Link, Transport, TransportEvent};

/// Buffer size for socket reads
const RECV_BUFFER_SIZE: usize = 4096;

/// Bytes allowed to queue behind a full socket before the channel is dropped.
const MAX_PENDING_SEND: usize = 64 * 1024;

enum TcpChannel {
    /// Connect thread still running
    Connecting(Receiver<io::Result<TcpStream>>),
    Connected {
        stream: TcpStream,
        frames: FrameBuffer,
        /// Encoded frames the socket has not taken yet
        outbound: Vec<u8>,
    },
}

/// What a read pass over the open stream produced.
#[derive(Default)]
struct ReadPass {
    messages: Vec<GameMessage>,
    end: Option<TransportEvent>,
}

/// Transport over a TCP listener plus at most one TCP stream.
pub struct TcpTransport {
    listen_addr: String,
    listener: Option<TcpListener>,
    local_id: Option<String>,
    link: Link<TcpChannel>,
    events: VecDeque<TransportEvent>,
    connect_timeout: Duration,
    max_frame: usize,
    recv_buf: Vec<u8>,
}

impl TcpTransport {
    /// Bind the listener described by `settings`.
    ///
    /// Failing to bind is critical: without a listener there is no identity.
    pub fn bind(settings: &NetworkSettings) -> Result<Self, TransportError> {
        let mut transport = Self {
            listen_addr: settings.listen_addr.clone(),
            listener: None,
            local_id: None,
            link: Link::default(),
            events: VecDeque::new(),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            max_frame: settings.max_frame_bytes,
            recv_buf: vec![0u8; RECV_BUFFER_SIZE],
        };
        transport.open_listener()?;
        Ok(transport)
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    fn open_listener(&mut self) -> Result<(), TransportError> {
        let listener = TcpListener::bind(&self.listen_addr).map_err(|e| {
            TransportError::Critical(format!("Failed to bind {}: {}", self.listen_addr, e))
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::Critical(format!("Failed to set non-blocking: {}", e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| TransportError::Critical(format!("Failed to get local addr: {}", e)))?;

        let id = advertised_id(addr);
        tracing::info!(%id, "TCP transport listening");

        // Rebinds after a listener failure reuse the port, keeping the id stable.
        self.listen_addr = addr.to_string();

        self.listener = Some(listener);
        self.local_id = Some(id.clone());
        self.events.push_back(TransportEvent::IdentityAssigned(id));
        Ok(())
    }

    fn pump(&mut self) {
        self.accept_pending();
        self.finish_connect();
        self.flush_stream();
        self.read_stream();
    }

    /// Accept inbound streams; anything beyond the first is closed on arrival.
    fn accept_pending(&mut self) {
        loop {
            let Some(listener) = self.listener.as_ref() else {
                return;
            };
            match listener.accept() {
                Ok((stream, peer)) => {
                    if self.link.is_busy() {
                        tracing::debug!(%peer, "Already connected, rejecting inbound stream");
                        let _ = stream.shutdown(Shutdown::Both);
                        continue;
                    }
                    if let Err(e) = configure_stream(&stream) {
                        tracing::warn!(%peer, error = %e, "Failed to configure inbound stream");
                        continue;
                    }
                    let remote_id = peer.to_string();
                    let channel = TcpChannel::Connected {
                        stream,
                        frames: FrameBuffer::new(self.max_frame),
                        outbound: Vec::new(),
                    };
                    if self.link.begin(&remote_id, channel).is_ok() {
                        self.link.mark_open();
                        tracing::info!(%remote_id, "Accepted inbound connection");
                        self.events.push_back(TransportEvent::Incoming {
                            remote_id: remote_id.clone(),
                        });
                        self.events.push_back(TransportEvent::Opened { remote_id });
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if is_transient_accept_error(e.kind()) => {
                    tracing::debug!(error = %e, "Inbound connection dropped during accept");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Listener failed");
                    self.listener = None;
                    self.events.push_back(TransportEvent::SignalingLost);
                    return;
                }
            }
        }
    }

    /// Promote a finished connect thread to an open channel.
    fn finish_connect(&mut self) {
        let result = match self.link.channel_mut() {
            Some(TcpChannel::Connecting(rx)) => match rx.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    Err(io::Error::other("connect thread exited"))
                }
            },
            _ => return,
        };

        let remote_id = self.link.remote_id().unwrap_or_default().to_string();
        match result.and_then(|stream| configure_stream(&stream).map(|()| stream)) {
            Ok(stream) => {
                if let Some(channel) = self.link.channel_mut() {
                    *channel = TcpChannel::Connected {
                        stream,
                        frames: FrameBuffer::new(self.max_frame),
                        outbound: Vec::new(),
                    };
                }
                self.link.mark_open();
                tracing::info!(%remote_id, "Connection established");
                self.events.push_back(TransportEvent::Opened { remote_id });
            }
            Err(e) => {
                self.link.take();
                tracing::warn!(%remote_id, error = %e, "Connect failed");
                self.events
                    .push_back(TransportEvent::Failed(TransportError::PeerUnavailable(
                        format!("{}: {}", remote_id, e),
                    )));
            }
        }
    }

    /// Retry frames a full socket left behind.
    fn flush_stream(&mut self) {
        let result = match self.link.channel_mut() {
            Some(TcpChannel::Connected { stream, outbound, .. }) if !outbound.is_empty() => {
                flush_outbound(stream, outbound)
            }
            _ => return,
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "Send failed");
            self.close();
            self.events
                .push_back(TransportEvent::Failed(TransportError::Failure(e.to_string())));
        }
    }

    fn read_stream(&mut self) {
        let pass = match self.link.channel_mut() {
            Some(TcpChannel::Connected { stream, frames, .. }) => {
                read_available(stream, frames, &mut self.recv_buf)
            }
            _ => return,
        };

        self.events
            .extend(pass.messages.into_iter().map(TransportEvent::Message));
        if let Some(end) = pass.end {
            if let Some(TcpChannel::Connected { stream, .. }) = self.link.take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
            self.events.push_back(end);
        }
    }
}

impl Transport for TcpTransport {
    fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    fn connect(&mut self, remote_id: &str) -> Result<(), TransportError> {
        if self.local_id.as_deref() == Some(remote_id) {
            return Err(TransportError::SelfConnectAttempt);
        }
        if self.link.is_busy() {
            return Err(TransportError::AlreadyConnected);
        }

        let addr = remote_id
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| TransportError::PeerUnavailable(format!("Invalid address '{}'", remote_id)))?;

        let (tx, rx) = mpsc::channel();
        let timeout = self.connect_timeout;
        std::thread::spawn(move || {
            let _ = tx.send(TcpStream::connect_timeout(&addr, timeout));
        });

        tracing::info!(%remote_id, "Connecting");
        self.link.begin(remote_id, TcpChannel::Connecting(rx))
    }

    fn send(&mut self, msg: GameMessage) -> Result<(), TransportError> {
        let result = match self.link.open_channel()? {
            TcpChannel::Connected { stream, outbound, .. } => {
                outbound.extend_from_slice(&msg.to_bytes());
                flush_outbound(stream, outbound)
            }
            TcpChannel::Connecting(_) => return Err(TransportError::NotConnected),
        };

        match result {
            Ok(()) => {
                tracing::trace!(?msg, "Sent message");
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(TransportError::Failure(e.to_string()))
            }
        }
    }

    fn close(&mut self) {
        if let Some(TcpChannel::Connected { stream, .. }) = self.link.take() {
            let _ = stream.shutdown(Shutdown::Both);
            tracing::debug!("Closed connection");
        }
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if self.events.is_empty() {
            self.pump();
        }
        self.events.pop_front()
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        if self.listener.is_some() {
            return Ok(());
        }
        self.open_listener()
    }
}

/// Accept errors that concern one inbound attempt rather than the listener.
fn is_transient_accept_error(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
    )
}

fn configure_stream(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    stream.set_nodelay(true)
}

/// Write as much of `outbound` as the socket takes without blocking.
///
/// Whatever is left stays queued for the next pump.
fn flush_outbound<W: Write>(writer: &mut W, outbound: &mut Vec<u8>) -> io::Result<()> {
    let mut written = 0;
    let result = loop {
        if written == outbound.len() {
            break Ok(());
        }
        match writer.write(&outbound[written..]) {
            Ok(0) => break Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(len) => written += len,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => break Err(e),
        }
    };
    outbound.drain(..written);
    result?;

    if outbound.len() > MAX_PENDING_SEND {
        return Err(io::Error::other("send buffer full"));
    }
    Ok(())
}

/// Drain readable bytes and complete frames from the stream.
fn read_available(stream: &mut TcpStream, frames: &mut FrameBuffer, buf: &mut [u8]) -> ReadPass {
    let mut pass = ReadPass::default();

    loop {
        match stream.read(buf) {
            Ok(0) => {
                pass.end = Some(TransportEvent::Closed);
                break;
            }
            Ok(len) => frames.extend(&buf[..len]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                pass.end = Some(TransportEvent::Failed(TransportError::Failure(e.to_string())));
                break;
            }
        }
    }

    loop {
        match frames.next_frame() {
            Ok(Some(frame)) => match GameMessage::from_bytes(&frame) {
                Ok(Some(msg)) => {
                    tracing::trace!(?msg, "Received message");
                    pass.messages.push(msg);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to decode message"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Corrupt stream");
                if pass.end.is_none() {
                    pass.end = Some(TransportEvent::Failed(TransportError::Failure(e.to_string())));
                }
                break;
            }
        }
    }

    pass
}

/// Address a peer can dial to reach `addr`.
///
/// A wildcard bind is replaced with the machine's outbound IPv4 address,
/// falling back to localhost.
fn advertised_id(addr: SocketAddr) -> String {
    if !addr.ip().is_unspecified() {
        return addr.to_string();
    }

    // Connecting a UDP socket sends nothing; it only resolves the route.
    let route_ip = UdpSocket::bind("0.0.0.0:0")
        .ok()
        .filter(|socket| socket.connect("8.8.8.8:80").is_ok())
        .and_then(|socket| socket.local_addr().ok())
        .map(|local| local.ip())
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified());

    let ip = route_ip.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    SocketAddr::new(ip, addr.port()).to_string()
}
