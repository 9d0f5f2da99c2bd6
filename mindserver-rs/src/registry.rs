use mindserver_sdk_rs::protocol::AgentStatus;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Identity of one hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("agent {0} is not registered")]
    NotRegistered(String),

    #[error("agent {name} is already live on connection {conn}")]
    AlreadyLive { name: String, conn: ConnId },
}

/// Which agents exist, who manages each of them and which are live in-world.
///
/// Names are never removed from the registered set; `live` is always a subset of it.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    registered: Vec<String>,
    managers: HashMap<String, ConnId>,
    live: HashMap<String, ConnId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name` if it is new and makes `conn` its manager either way.
    pub fn register(&mut self, name: &str, conn: ConnId) {
        if !self.is_registered(name) {
            self.registered.push(name.to_string());
        }
        self.managers.insert(name.to_string(), conn);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.iter().any(|n| n == name)
    }

    /// Marks `name` live on `conn`. Returns `false` when it already was.
    pub fn login(&mut self, name: &str, conn: ConnId) -> Result<bool, RegistryError> {
        if !self.is_registered(name) {
            return Err(RegistryError::NotRegistered(name.to_string()));
        }
        match self.live.get(name) {
            Some(existing) if *existing == conn => Ok(false),
            Some(existing) => Err(RegistryError::AlreadyLive {
                name: name.to_string(),
                conn: *existing,
            }),
            None => {
                self.live.insert(name.to_string(), conn);
                Ok(true)
            }
        }
    }

    /// Removes `name` from the live set, returning the connection it was live on.
    pub fn logout(&mut self, name: &str) -> Option<ConnId> {
        self.live.remove(name)
    }

    pub fn manager(&self, name: &str) -> Option<ConnId> {
        self.managers.get(name).copied()
    }

    pub fn live_connection(&self, name: &str) -> Option<ConnId> {
        self.live.get(name).copied()
    }

    /// Live agent names in registration order.
    pub fn live_names(&self) -> Vec<String> {
        self.registered
            .iter()
            .filter(|n| self.live.contains_key(*n))
            .cloned()
            .collect()
    }

    /// Every distinct manager connection.
    pub fn manager_connections(&self) -> Vec<ConnId> {
        let mut conns: Vec<ConnId> = Vec::new();
        for name in &self.registered {
            if let Some(conn) = self.managers.get(name) {
                if !conns.contains(conn) {
                    conns.push(*conn);
                }
            }
        }
        conns
    }

    /// Drops every manager entry held by `conn`, returning the affected names.
    pub fn release_connection(&mut self, conn: ConnId) -> Vec<String> {
        let released: Vec<String> = self
            .managers
            .iter()
            .filter(|(_, c)| **c == conn)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &released {
            self.managers.remove(name);
        }
        released
    }

    pub fn snapshot(&self) -> Vec<AgentStatus> {
        self.registered
            .iter()
            .map(|name| AgentStatus {
                name: name.clone(),
                in_game: self.live.contains_key(name),
            })
            .collect()
    }
}
