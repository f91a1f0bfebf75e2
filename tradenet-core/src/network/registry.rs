// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Node Registry
//!
//! [`NodesById`] owns every local node, keyed by node id, and fans node
//! events out to registry-wide listeners. Nodes are created lazily on
//! first use and leave the registry when they shut down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::address::Address;
use super::ban::{BanList, NoBans};
use super::config::RegistryConfig;
use super::connection::{CloseReason, Connection};
use super::error::NetworkError;
use super::listeners::{ListenerId, Listeners};
use super::message::EnvelopePayload;
use super::node::{Node, NodeListener};
use super::transport::TransportService;

/// Observer of nodes joining and leaving the registry.
pub trait RegistryListener: Send + Sync {
    fn on_node_added(&self, node: &Arc<Node>);

    fn on_node_removed(&self, _node: &Arc<Node>) {}
}

/// Where a registry send goes.
#[derive(Debug, Clone, Copy)]
pub enum SendTarget<'a> {
    /// Reuse or open a connection to this address.
    Address(&'a Address),
    /// Write on this connection.
    Connection(&'a Arc<Connection>),
}

pub struct NodesById {
    config: RegistryConfig,
    transport: Arc<dyn TransportService>,
    ban_list: Arc<dyn BanList>,
    nodes: RwLock<HashMap<String, Arc<Node>>>,
    listeners: Listeners<dyn RegistryListener>,
    node_listeners: Listeners<dyn NodeListener>,
    shut_down: AtomicBool,
    shutdown_result: OnceLock<bool>,
    weak_self: Weak<NodesById>,
}

impl std::fmt::Debug for NodesById {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodesById")
            .field("nodes", &self.nodes.read().keys().collect::<Vec<_>>())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl NodesById {
    pub fn new(config: RegistryConfig, transport: Arc<dyn TransportService>) -> Arc<Self> {
        Self::with_ban_list(config, transport, Arc::new(NoBans))
    }

    pub fn with_ban_list(
        config: RegistryConfig,
        transport: Arc<dyn TransportService>,
        ban_list: Arc<dyn BanList>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| NodesById {
            config,
            transport,
            ban_list,
            nodes: RwLock::new(HashMap::new()),
            listeners: Listeners::new(),
            node_listeners: Listeners::new(),
            shut_down: AtomicBool::new(false),
            shutdown_result: OnceLock::new(),
            weak_self: weak_self.clone(),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Returns the node for `node_id`, creating it if absent. Concurrent
    /// callers observe a single instance.
    pub fn get_or_create(&self, node_id: &str) -> Result<Arc<Node>, NetworkError> {
        if self.is_shut_down() {
            return Err(NetworkError::RegistryShutDown);
        }
        if let Some(node) = self.find_node(node_id) {
            return Ok(node);
        }

        let node = {
            let mut nodes = self.nodes.write();
            if self.is_shut_down() {
                return Err(NetworkError::RegistryShutDown);
            }
            if let Some(node) = nodes.get(node_id) {
                return Ok(Arc::clone(node));
            }
            let node = Node::new(
                node_id,
                self.config.node.clone(),
                Arc::clone(&self.transport),
                Arc::clone(&self.ban_list),
            );
            node.add_listener(Arc::new(NodeEvents {
                registry: self.weak_self.clone(),
            }));
            nodes.insert(node_id.to_string(), Arc::clone(&node));
            node
        };
        debug!("Created node {}", node_id);
        self.listeners.for_each(|l| l.on_node_added(&node));
        Ok(node)
    }

    /// Creates the node if needed and binds its server on `port`.
    pub fn initialize(&self, node_id: &str, port: u16) -> Result<Arc<Node>, NetworkError> {
        let node = self.get_or_create(node_id)?;
        node.initialize(port)?;
        Ok(node)
    }

    pub fn get_connection(
        &self,
        node_id: &str,
        address: &Address,
    ) -> Result<Arc<Connection>, NetworkError> {
        self.get_or_create(node_id)?.get_connection(address)
    }

    /// Sends `payload` from the node `node_id` and returns the connection
    /// used.
    pub fn send(
        &self,
        node_id: &str,
        payload: EnvelopePayload,
        target: SendTarget<'_>,
    ) -> Result<Arc<Connection>, NetworkError> {
        let node = self.get_or_create(node_id)?;
        match target {
            SendTarget::Address(address) => node.send(payload, address),
            SendTarget::Connection(connection) => node.send_on(payload, connection),
        }
    }

    /// Shuts every node down concurrently and waits at most the
    /// configured shutdown timeout. Resolves to `false` on timeout.
    ///
    /// The registry refuses new nodes afterwards; its maps and listener
    /// sets are cleared whether or not all nodes finished in time. Later
    /// calls return the outcome of the first one, or `false` while it is
    /// still running.
    pub async fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return self.shutdown_result.get().copied().unwrap_or(false);
        }
        let nodes: Vec<Arc<Node>> = self.nodes.read().values().cloned().collect();
        info!("Shutting down {} nodes", nodes.len());

        let shutdowns = futures::future::join_all(nodes.iter().map(|node| node.shutdown()));
        let completed = match tokio::time::timeout(self.config.shutdown_timeout(), shutdowns).await
        {
            Ok(results) => results.into_iter().all(|ok| ok),
            Err(_) => {
                warn!(
                    "Node shutdown did not complete within {:?}",
                    self.config.shutdown_timeout()
                );
                false
            }
        };

        self.nodes.write().clear();
        self.listeners.clear();
        self.node_listeners.clear();
        let _ = self.shutdown_result.set(completed);
        completed
    }

    fn on_node_shutdown(&self, node: &Arc<Node>) {
        let removed = {
            let mut nodes = self.nodes.write();
            match nodes.get(node.node_id()) {
                Some(existing) if Arc::ptr_eq(existing, node) => {
                    nodes.remove(node.node_id());
                    true
                }
                _ => false,
            }
        };
        if removed {
            debug!("Removed node {}", node.node_id());
            self.listeners.for_each(|l| l.on_node_removed(node));
        }
    }

    // === Lookups ===

    pub fn find_node(&self, node_id: &str) -> Option<Arc<Node>> {
        self.nodes.read().get(node_id).cloned()
    }

    pub fn all_nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn is_node_initialized(&self, node_id: &str) -> bool {
        self.find_node(node_id)
            .map(|node| node.is_initialized())
            .unwrap_or(false)
    }

    pub fn assert_node_initialized(&self, node_id: &str) -> Result<(), NetworkError> {
        if self.is_node_initialized(node_id) {
            Ok(())
        } else {
            Err(NetworkError::NotInitialized(node_id.to_string()))
        }
    }

    pub fn find_my_address(&self, node_id: &str) -> Option<Address> {
        self.find_node(node_id)?.find_my_address()
    }

    /// Server addresses of all nodes that have one.
    pub fn addresses_by_node_id(&self) -> HashMap<String, Address> {
        self.nodes
            .read()
            .iter()
            .filter_map(|(id, node)| node.find_my_address().map(|a| (id.clone(), a)))
            .collect()
    }

    // === Listeners ===

    pub fn add_listener(&self, listener: Arc<dyn RegistryListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Registers a listener for the events of every node, current and
    /// future.
    pub fn add_node_listener(&self, listener: Arc<dyn NodeListener>) -> ListenerId {
        self.node_listeners.add(listener)
    }

    pub fn remove_node_listener(&self, id: ListenerId) -> bool {
        self.node_listeners.remove(id)
    }
}

/// Forwards one node's events to the registry.
struct NodeEvents {
    registry: Weak<NodesById>,
}

impl NodeListener for NodeEvents {
    fn on_message(&self, payload: &EnvelopePayload, connection: &Arc<Connection>, node_id: &str) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .node_listeners
                .for_each(|l| l.on_message(payload, connection, node_id));
        }
    }

    fn on_connection(&self, connection: &Arc<Connection>) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .node_listeners
                .for_each(|l| l.on_connection(connection));
        }
    }

    fn on_disconnect(&self, connection: &Arc<Connection>, reason: CloseReason) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .node_listeners
                .for_each(|l| l.on_disconnect(connection, reason));
        }
    }

    fn on_shutdown(&self, node: &Arc<Node>) {
        if let Some(registry) = self.registry.upgrade() {
            registry.node_listeners.for_each(|l| l.on_shutdown(node));
            registry.on_node_shutdown(node);
        }
    }
}
