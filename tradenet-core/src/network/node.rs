// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Node
//!
//! One network identity: a bound server plus the set of live connections
//! opened from or accepted by it. I/O is blocking; the node runs one
//! accept thread and one reader thread per connection.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

use super::address::{Address, TransportType};
use super::ban::BanList;
use super::config::NodeConfig;
use super::connection::{CloseReason, Connection, ConnectionDirection};
use super::error::NetworkError;
use super::framing::{EnvelopeSocket, ReceivedEnvelope};
use super::listeners::{ListenerId, Listeners};
use super::message::{ConnectionHandshake, EnvelopePayload, NetworkEnvelope, Pong, PROTOCOL_VERSION};
use super::metrics::NetworkLoad;
use super::transport::TransportService;

/// Lifecycle of a node. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    New,
    Starting,
    Running,
    Stopping,
    Terminated,
}

/// Observer of node events.
///
/// Callbacks run on the node's reader threads (or its shutdown thread for
/// `on_shutdown`) and must not block for long.
pub trait NodeListener: Send + Sync {
    /// An application-level payload arrived. Handshake, ping and pong
    /// frames are handled by the node itself and never show up here.
    fn on_message(&self, payload: &EnvelopePayload, connection: &Arc<Connection>, node_id: &str);

    fn on_connection(&self, _connection: &Arc<Connection>) {}

    fn on_disconnect(&self, _connection: &Arc<Connection>, _reason: CloseReason) {}

    fn on_shutdown(&self, _node: &Arc<Node>) {}
}

/// Live connections, indexed by id and by peer address.
#[derive(Default)]
struct ConnectionTable {
    by_id: HashMap<String, Arc<Connection>>,
    by_address: HashMap<Address, String>,
}

impl ConnectionTable {
    fn insert(&mut self, connection: &Arc<Connection>) {
        let address = connection.peer_address();
        let has_live = self.find(address).is_some();
        self.by_id
            .insert(connection.id().to_string(), Arc::clone(connection));
        if !has_live {
            self.by_address
                .insert(address.clone(), connection.id().to_string());
        }
    }

    fn remove(&mut self, connection: &Connection) -> bool {
        let removed = self.by_id.remove(connection.id()).is_some();
        let address = connection.peer_address();
        if self.by_address.get(address).map(String::as_str) == Some(connection.id()) {
            self.by_address.remove(address);
            let replacement = self
                .by_id
                .values()
                .find(|c| c.peer_address() == address && !c.is_closed())
                .map(|c| c.id().to_string());
            if let Some(id) = replacement {
                self.by_address.insert(address.clone(), id);
            }
        }
        removed
    }

    fn find(&self, address: &Address) -> Option<Arc<Connection>> {
        self.by_address
            .get(address)
            .and_then(|id| self.by_id.get(id))
            .filter(|c| !c.is_closed())
            .cloned()
    }

    fn all(&self) -> Vec<Arc<Connection>> {
        self.by_id.values().cloned().collect()
    }
}

/// Accept thread and the means to stop it.
struct Server {
    wake_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl Server {
    fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        // Unblocks the pending accept().
        let _ = TcpStream::connect_timeout(&self.wake_addr, Duration::from_secs(1));
        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                error!("Accept thread panicked");
            }
        }
    }
}

pub struct Node {
    node_id: String,
    config: NodeConfig,
    transport: Arc<dyn TransportService>,
    ban_list: Arc<dyn BanList>,
    state: RwLock<NodeState>,
    lifecycle: Mutex<()>,
    my_address: RwLock<Option<Address>>,
    server: Mutex<Option<Server>>,
    connections: RwLock<ConnectionTable>,
    outbound_locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
    listeners: Listeners<dyn NodeListener>,
    weak_self: Weak<Node>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("state", &self.state())
            .field("my_address", &self.find_my_address())
            .finish()
    }
}

impl Node {
    pub fn new(
        node_id: impl Into<String>,
        config: NodeConfig,
        transport: Arc<dyn TransportService>,
        ban_list: Arc<dyn BanList>,
    ) -> Arc<Self> {
        let node_id = node_id.into();
        Arc::new_cyclic(|weak_self| Node {
            node_id,
            config,
            transport,
            ban_list,
            state: RwLock::new(NodeState::New),
            lifecycle: Mutex::new(()),
            my_address: RwLock::new(None),
            server: Mutex::new(None),
            connections: RwLock::new(ConnectionTable::default()),
            outbound_locks: Mutex::new(HashMap::new()),
            listeners: Listeners::new(),
            weak_self: weak_self.clone(),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn transport_type(&self) -> TransportType {
        self.transport.transport_type()
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == NodeState::Running
    }

    /// Advertised server address, once initialized.
    pub fn find_my_address(&self) -> Option<Address> {
        self.my_address.read().clone()
    }

    fn strong(&self) -> Result<Arc<Node>, NetworkError> {
        self.weak_self
            .upgrade()
            .ok_or_else(|| NetworkError::NotInitialized(self.node_id.clone()))
    }

    fn ensure_running(&self) -> Result<(), NetworkError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(NetworkError::NotInitialized(self.node_id.clone()))
        }
    }

    // === Lifecycle ===

    /// Binds the server and starts accepting peers. Calling it again on a
    /// running node is a no-op.
    pub fn initialize(&self, port: u16) -> Result<(), NetworkError> {
        let _guard = self.lifecycle.lock();
        match self.state() {
            NodeState::Running => return Ok(()),
            NodeState::Stopping | NodeState::Terminated => {
                return Err(NetworkError::NotInitialized(format!(
                    "{} has been shut down",
                    self.node_id
                )))
            }
            NodeState::New | NodeState::Starting => {}
        }
        *self.state.write() = NodeState::Starting;

        match self.start_server(port) {
            Ok(address) => {
                info!("Node {} listening on {}", self.node_id, address);
                *self.my_address.write() = Some(address);
                *self.state.write() = NodeState::Running;
                Ok(())
            }
            Err(e) => {
                warn!("Node {} failed to start server: {}", self.node_id, e);
                *self.state.write() = NodeState::New;
                Err(e)
            }
        }
    }

    fn start_server(&self, port: u16) -> Result<Address, NetworkError> {
        let server_socket = self.transport.bind(&self.node_id, port)?;
        let address = server_socket.address().clone();
        let local_addr = server_socket.local_addr()?;
        let listener = server_socket.into_listener();

        let stop = Arc::new(AtomicBool::new(false));
        let weak = self.weak_self.clone();
        let stop_flag = Arc::clone(&stop);
        let accept_thread = thread::Builder::new()
            .name(format!("accept-{}", self.node_id))
            .spawn(move || accept_loop(weak, listener, stop_flag))
            .map_err(|e| NetworkError::Io(e.to_string()))?;

        *self.server.lock() = Some(Server {
            wake_addr: wake_address(local_addr),
            stop,
            accept_thread: Some(accept_thread),
        });
        Ok(address)
    }

    /// Stops the server, closes every connection and notifies listeners.
    ///
    /// Teardown runs on a dedicated thread; the returned future resolves
    /// with `true` once it finished.
    pub fn shutdown(&self) -> BoxFuture<'static, bool> {
        let node = match self.strong() {
            Ok(node) => node,
            Err(_) => return future::ready(false).boxed(),
        };
        let (tx, rx) = oneshot::channel();
        let spawned = thread::Builder::new()
            .name(format!("shutdown-{}", self.node_id))
            .spawn(move || {
                let _ = tx.send(node.shutdown_blocking());
            });
        if let Err(e) = spawned {
            error!("Could not spawn shutdown thread for {}: {}", self.node_id, e);
            return future::ready(false).boxed();
        }
        async move { rx.await.unwrap_or(false) }.boxed()
    }

    fn shutdown_blocking(self: &Arc<Self>) -> bool {
        {
            let _guard = self.lifecycle.lock();
            let mut state = self.state.write();
            if matches!(*state, NodeState::Stopping | NodeState::Terminated) {
                return true;
            }
            *state = NodeState::Stopping;
        }
        info!("Shutting down node {}", self.node_id);

        if let Some(server) = self.server.lock().take() {
            server.stop();
        }
        let connections = self.connections.read().all();
        for connection in &connections {
            self.close_connection(connection, CloseReason::Shutdown);
        }
        self.outbound_locks.lock().clear();

        *self.state.write() = NodeState::Terminated;
        self.listeners.for_each(|l| l.on_shutdown(self));
        self.listeners.clear();
        info!(
            "Node {} shut down, closed {} connections",
            self.node_id,
            connections.len()
        );
        true
    }

    // === Listeners ===

    pub fn add_listener(&self, listener: Arc<dyn NodeListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    // === Connections ===

    /// Open connection to `address`, if any.
    pub fn find_connection(&self, address: &Address) -> Option<Arc<Connection>> {
        self.connections.read().find(address)
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .all()
            .into_iter()
            .filter(|c| !c.is_closed())
            .collect()
    }

    pub fn num_connections(&self) -> usize {
        self.connections().len()
    }

    /// Returns the open connection to `address`, dialing and handshaking
    /// a new one if needed. Concurrent callers for the same address share
    /// one dial.
    pub fn get_connection(&self, address: &Address) -> Result<Arc<Connection>, NetworkError> {
        if let Some(connection) = self.find_connection(address) {
            return Ok(connection);
        }
        self.ensure_running()?;

        let dial_lock = Arc::clone(
            self.outbound_locks
                .lock()
                .entry(address.clone())
                .or_default(),
        );
        let result = {
            let _dialing = dial_lock.lock();
            match self.find_connection(address) {
                Some(connection) => Ok(connection),
                None => self.connect(address),
            }
        };

        // Last dialer out drops the entry; waiters clone under the map lock.
        let mut locks = self.outbound_locks.lock();
        if locks
            .get(address)
            .is_some_and(|lock| Arc::ptr_eq(lock, &dial_lock) && Arc::strong_count(lock) == 2)
        {
            locks.remove(address);
        }
        result
    }

    fn owns(&self, connection: &Connection) -> bool {
        connection.node_id() == self.node_id
    }

    /// Number of addresses with a dial in progress.
    pub fn num_pending_dials(&self) -> usize {
        self.outbound_locks.lock().len()
    }

    fn connect(&self, address: &Address) -> Result<Arc<Connection>, NetworkError> {
        if self.ban_list.is_banned(address) {
            return Err(NetworkError::Banned(address.to_string()));
        }
        debug!("Node {} connecting to {}", self.node_id, address);

        let stream = self
            .transport
            .connect(address, self.config.connect_timeout())?;
        let socket = EnvelopeSocket::new(stream, self.config.max_frame_size)?;
        socket.set_read_timeout(Some(self.config.handshake_timeout()))?;

        let started = Instant::now();
        let sent = socket.send(&NetworkEnvelope::new(EnvelopePayload::Handshake(
            self.handshake(),
        )))?;
        let spent = started.elapsed();
        let reply = socket.receive_next()?.ok_or_else(|| {
            NetworkError::HandshakeFailed(format!("{} closed during handshake", address))
        })?;
        let peer = accept_handshake(&reply)?;
        socket.set_read_timeout(self.config.io_timeout())?;

        let connection = Arc::new(Connection::new(
            &self.node_id,
            address.clone(),
            Some(peer.node_id),
            ConnectionDirection::Outbound,
            socket,
        ));
        let now = Instant::now();
        connection.metrics().record_sent(sent, spent, now);
        connection
            .metrics()
            .record_received(reply.size, reply.deserialize_time, now);

        self.register(&connection)?;
        self.spawn_reader(Arc::clone(&connection))?;
        Ok(connection)
    }

    fn handshake(&self) -> ConnectionHandshake {
        ConnectionHandshake {
            node_id: self.node_id.clone(),
            address: self.find_my_address(),
            protocol_version: PROTOCOL_VERSION,
        }
    }

    fn register(&self, connection: &Arc<Connection>) -> Result<(), NetworkError> {
        {
            let mut table = self.connections.write();
            if !matches!(self.state(), NodeState::Starting | NodeState::Running) {
                drop(table);
                connection.mark_closed(CloseReason::Shutdown);
                return Err(NetworkError::NotInitialized(self.node_id.clone()));
            }
            table.insert(connection);
        }
        info!(
            "Node {} connected to {} ({:?})",
            self.node_id,
            connection.peer_address(),
            connection.direction()
        );
        self.listeners.for_each(|l| l.on_connection(connection));
        Ok(())
    }

    fn spawn_reader(&self, connection: Arc<Connection>) -> Result<(), NetworkError> {
        let node = self.strong()?;
        let spawned = thread::Builder::new()
            .name(format!("read-{}", connection.peer_address()))
            .spawn({
                let connection = Arc::clone(&connection);
                move || node.read_loop(&connection)
            });
        if let Err(e) = spawned {
            self.close_connection(&connection, CloseReason::ReadError);
            return Err(NetworkError::Io(e.to_string()));
        }
        Ok(())
    }

    /// Closes `connection` with `reason`. The first close wins; listeners
    /// see `on_disconnect` once, when the connection leaves the table.
    /// Connections of other nodes are left untouched.
    pub fn close_connection(&self, connection: &Arc<Connection>, reason: CloseReason) {
        if !self.owns(connection) {
            warn!(
                "Node {} refused to close connection {} owned by {}",
                self.node_id,
                connection.id(),
                connection.node_id()
            );
            return;
        }
        connection.mark_closed(reason);
        if !self.connections.write().remove(connection) {
            return;
        }
        let reason = connection.close_reason().unwrap_or(reason);
        info!(
            "Node {} closed connection to {}: {}",
            self.node_id,
            connection.peer_address(),
            reason
        );
        self.listeners
            .for_each(|l| l.on_disconnect(connection, reason));
    }

    // === Sending ===

    /// Sends `payload` to `address`, connecting first if necessary.
    pub fn send(
        &self,
        payload: EnvelopePayload,
        address: &Address,
    ) -> Result<Arc<Connection>, NetworkError> {
        let connection = self.get_connection(address)?;
        self.send_on(payload, &connection)
    }

    /// Sends `payload` over an existing connection of this node. A failed
    /// write closes the connection.
    pub fn send_on(
        &self,
        payload: EnvelopePayload,
        connection: &Arc<Connection>,
    ) -> Result<Arc<Connection>, NetworkError> {
        if !self.owns(connection) {
            return Err(NetworkError::ConnectionFailed(format!(
                "connection {} belongs to node {}, not {}",
                connection.id(),
                connection.node_id(),
                self.node_id
            )));
        }
        trace!(
            "Node {} sending {} to {}",
            self.node_id,
            payload.kind(),
            connection.peer_address()
        );
        if let Err(e) = connection.send(payload) {
            debug!(
                "Send to {} failed: {}",
                connection.peer_address(),
                e
            );
            self.close_connection(connection, CloseReason::WriteError);
            return Err(e);
        }
        Ok(Arc::clone(connection))
    }

    /// Aggregated load over the open connections.
    pub fn network_load(&self) -> NetworkLoad {
        let connections = self.connections();
        NetworkLoad::from_metrics(connections.iter().map(|c| c.metrics()))
    }

    // === Inbound ===

    fn handle_inbound(self: Arc<Self>, stream: TcpStream) {
        let socket = match EnvelopeSocket::new(stream, self.config.max_frame_size) {
            Ok(socket) => socket,
            Err(e) => {
                debug!("Could not set up inbound socket: {}", e);
                return;
            }
        };
        let socket_addr = socket.peer_addr();
        let request = match socket
            .set_read_timeout(Some(self.config.handshake_timeout()))
            .and_then(|_| socket.receive_next())
        {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                debug!("Inbound handshake from {:?} failed: {}", socket_addr, e);
                return;
            }
        };
        let peer = match accept_handshake(&request) {
            Ok(peer) => peer,
            Err(e) => {
                warn!(
                    "Closing inbound socket from {:?} ({}): {}",
                    socket_addr,
                    CloseReason::HandshakeRejected,
                    e
                );
                socket.close();
                return;
            }
        };

        let peer_address = match peer.address.clone().or_else(|| socket_addr.map(Address::from)) {
            Some(address) => address,
            None => return,
        };
        if self.ban_list.is_banned(&peer_address) {
            info!(
                "Closing inbound socket from {} ({})",
                peer_address,
                CloseReason::Banned
            );
            socket.close();
            return;
        }

        let connection = Arc::new(Connection::new(
            &self.node_id,
            peer_address,
            Some(peer.node_id),
            ConnectionDirection::Inbound,
            socket,
        ));
        connection
            .metrics()
            .record_received(request.size, request.deserialize_time, Instant::now());
        if let Err(e) = connection.send(EnvelopePayload::Handshake(self.handshake())) {
            debug!("Handshake reply to {} failed: {}", connection.peer_address(), e);
            connection.mark_closed(CloseReason::WriteError);
            return;
        }
        if connection
            .set_read_timeout(self.config.io_timeout())
            .and_then(|_| self.register(&connection))
            .is_err()
        {
            connection.mark_closed(CloseReason::ReadError);
            return;
        }
        self.read_loop(&connection);
    }

    fn read_loop(&self, connection: &Arc<Connection>) {
        while !connection.is_closed() {
            match connection.receive_next() {
                Ok(Some(received)) => self.on_envelope(connection, received.envelope.payload),
                Ok(None) => {
                    self.close_connection(connection, CloseReason::ClosedByPeer);
                    break;
                }
                Err(e) => {
                    if !connection.is_closed() {
                        debug!("Read from {} failed: {}", connection.peer_address(), e);
                    }
                    self.close_connection(connection, CloseReason::ReadError);
                    break;
                }
            }
        }
    }

    fn on_envelope(&self, connection: &Arc<Connection>, payload: EnvelopePayload) {
        match payload {
            EnvelopePayload::Handshake(_) => {
                warn!(
                    "Unexpected handshake from {}, ignoring",
                    connection.peer_address()
                );
            }
            EnvelopePayload::Ping(ping) => {
                let pong = EnvelopePayload::Pong(Pong {
                    request_nonce: ping.nonce,
                });
                // Failure already closed the connection.
                let _ = self.send_on(pong, connection);
            }
            EnvelopePayload::Pong(pong) => {
                if let Some(rtt) = connection.on_pong(&pong) {
                    trace!("RTT to {}: {:?}", connection.peer_address(), rtt);
                }
            }
            payload => self
                .listeners
                .for_each(|l| l.on_message(&payload, connection, &self.node_id)),
        }
    }
}

fn accept_loop(weak_node: Weak<Node>, listener: TcpListener, stop: Arc<AtomicBool>) {
    for stream in listener.incoming() {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let Some(node) = weak_node.upgrade() else {
            break;
        };
        match stream {
            Ok(stream) => {
                let spawned = thread::Builder::new()
                    .name(format!("inbound-{}", node.node_id))
                    .spawn(move || node.handle_inbound(stream));
                if let Err(e) = spawned {
                    error!("Could not spawn inbound handler: {}", e);
                }
            }
            Err(e) => debug!("Accept failed: {}", e),
        }
    }
}

/// Validates the peer's handshake frame.
fn accept_handshake(received: &ReceivedEnvelope) -> Result<ConnectionHandshake, NetworkError> {
    match &received.envelope.payload {
        EnvelopePayload::Handshake(h) if h.protocol_version == PROTOCOL_VERSION => Ok(h.clone()),
        EnvelopePayload::Handshake(h) => Err(NetworkError::HandshakeFailed(format!(
            "unsupported protocol version {}",
            h.protocol_version
        ))),
        other => Err(NetworkError::HandshakeFailed(format!(
            "expected handshake, got {}",
            other.kind()
        ))),
    }
}

/// Loopback equivalent of a wildcard bind address.
fn wake_address(local: SocketAddr) -> SocketAddr {
    let ip = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port())
}
