//! Observed entity domain model.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

// ============================================================================
// EntityKey
// ============================================================================

/// Identity of an entity within one snapshot.
///
/// Keys are only unique among entities alive at the same instant: the OS
/// recycles pids, so a key seen again after vanishing is a new entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum EntityKey {
    /// An OS process id.
    Pid(u32),
    /// A container id as reported by the container runtime.
    Container(String),
}

impl EntityKey {
    /// The process id, if this key names a process.
    pub fn pid(&self) -> Option<u32> {
        match self {
            EntityKey::Pid(pid) => Some(*pid),
            EntityKey::Container(_) => None,
        }
    }

    /// The container id, if this key names a container.
    pub fn container_id(&self) -> Option<&str> {
        match self {
            EntityKey::Pid(_) => None,
            EntityKey::Container(id) => Some(id),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKey::Pid(pid) => write!(f, "PID {}", pid),
            EntityKey::Container(id) => write!(f, "{}", short_id(id)),
        }
    }
}

/// First 12 characters of a container id, the form docker prints.
pub(crate) fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

// ============================================================================
// Field
// ============================================================================

/// One named display attribute of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

// ============================================================================
// Entity
// ============================================================================

/// A process or container observed in one snapshot.
///
/// `fields` are ordered to match the owning table's columns; filtering and
/// sorting only ever look at these rendered texts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    /// Identity key, unique within the snapshot.
    pub key: EntityKey,
    /// Process name or container name.
    pub name: String,
    /// Optional group membership (compose project, matched pattern).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Listening (process) or published host (container) ports, sorted.
    pub ports: Vec<u16>,
    /// Display attributes in column order.
    #[serde(serialize_with = "serialize_fields")]
    pub fields: Vec<Field>,
}

fn serialize_fields<S: Serializer>(fields: &[Field], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for field in fields {
        map.serialize_entry(&field.name, &field.value)?;
    }
    map.end()
}

impl Entity {
    /// Create a process entity with no fields yet.
    pub fn process(pid: u32, name: impl Into<String>) -> Self {
        Self::new(EntityKey::Pid(pid), name)
    }

    /// Create a container entity with no fields yet.
    pub fn container(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(EntityKey::Container(id.into()), name)
    }

    fn new(key: EntityKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            group: None,
            ports: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Set the ports, normalised to sorted and unique.
    pub fn with_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        let mut ports: Vec<u16> = ports.into_iter().collect();
        ports.sort_unstable();
        ports.dedup();
        self.ports = ports;
        self
    }

    /// Set the group membership. Empty strings mean "no group".
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        self.group = if group.is_empty() { None } else { Some(group) };
        self
    }

    /// Append a display field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Display text of the column at `index`.
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|f| f.value.as_str())
    }

    /// Display text of the named field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// All display texts in column order.
    pub fn cells(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.value.as_str())
    }

    /// Case-insensitive substring match against every displayed field.
    ///
    /// `query_lower` must already be lowercased.
    pub fn matches_filter(&self, query_lower: &str) -> bool {
        if query_lower.is_empty() {
            return true;
        }
        self.cells()
            .any(|text| text.to_lowercase().contains(query_lower))
    }

    /// Comma-separated ports, or `-` when the entity holds none.
    pub fn ports_label(&self) -> String {
        if self.ports.is_empty() {
            "-".to_string()
        } else {
            join_ports(&self.ports)
        }
    }
}

pub(crate) fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.key {
            EntityKey::Pid(pid) => write!(f, "'{}' (PID {})", self.name, pid),
            EntityKey::Container(_) => write!(f, "'{}'", self.name),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
