use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A registered container instance whose mapped host ports can be scanned.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContainerInstance {
    pub id: u32,
    pub name: String,
    pub container_name: String,
    /// Address recorded for the instance; empty means loopback.
    #[serde(default)]
    pub honeypot_ip: String,
    /// Container port (e.g. `"22/tcp"`) to host port (e.g. `"2222"`).
    #[serde(default)]
    pub port_mappings: BTreeMap<String, String>,
}

impl ContainerInstance {
    /// Comma-joined host ports, suitable for the port spec parser.
    pub fn host_port_spec(&self) -> String {
        self.port_mappings
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Fields supplied when registering an instance; the id is assigned by the store.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NewInstance {
    pub name: String,
    #[serde(default)]
    pub container_name: String,
    #[serde(default)]
    pub honeypot_ip: String,
    #[serde(default)]
    pub port_mappings: BTreeMap<String, String>,
}

/// In-memory instance table shared by handle. Cloning shares the same table.
#[derive(Clone, Default, Debug)]
pub struct InstanceStore {
    inner: Arc<RwLock<StoreState>>,
}

#[derive(Debug)]
struct StoreState {
    instances: HashMap<u32, ContainerInstance>,
    next_id: u32,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            instances: HashMap::new(),
            next_id: 1,
        }
    }
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, new: NewInstance) -> ContainerInstance {
        let mut s = self.inner.write().await;
        let id = s.next_id;
        s.next_id += 1;
        let instance = ContainerInstance {
            id,
            name: new.name,
            container_name: new.container_name,
            honeypot_ip: new.honeypot_ip,
            port_mappings: new.port_mappings,
        };
        s.instances.insert(id, instance.clone());
        instance
    }

    pub async fn get(&self, id: u32) -> Option<ContainerInstance> {
        self.inner.read().await.instances.get(&id).cloned()
    }

    /// All instances ordered by id.
    pub async fn list(&self) -> Vec<ContainerInstance> {
        let s = self.inner.read().await;
        let mut out: Vec<_> = s.instances.values().cloned().collect();
        out.sort_by_key(|i| i.id);
        out
    }

    pub async fn remove(&self, id: u32) -> Option<ContainerInstance> {
        self.inner.write().await.instances.remove(&id)
    }
}
