//! Typed `graph` subtype requests.
//!
//! Graph requests address one aspect of one entity through a GRI (graph
//! resource identifier) of the form `<type>.<id>.<aspect>[:<scope>]`, e.g.
//! `od_space.8a3f.instance:private`. A `null` id addresses the entity type as
//! a whole (used by `create`).

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder used on the wire for an absent entity id.
const NULL_ID: &str = "null";

/// Error parsing a GRI, operation or auth hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// GRI without the three dot-separated parts.
    InvalidGri(String),
    /// Operation name other than create/get/update/delete.
    InvalidOperation(String),
    /// Auth hint not of the form `<hint>:<id>`.
    InvalidAuthHint(String),
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidGri(s) => write!(f, "Invalid GRI: {s}"),
            Self::InvalidOperation(s) => write!(f, "Invalid graph operation: {s}"),
            Self::InvalidAuthHint(s) => write!(f, "Invalid auth hint: {s}"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Graph resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gri {
    /// Entity type, e.g. `od_user`.
    pub entity_type: String,
    /// Entity id; `None` serializes as `null`.
    pub entity_id: Option<String>,
    /// Aspect, e.g. `instance`.
    pub aspect: String,
    /// Scope, e.g. `private`, `protected`, `shared`, `auto`.
    pub scope: Option<String>,
}

impl Gri {
    /// GRI with an entity id and no scope.
    #[must_use]
    pub fn new(entity_type: &str, entity_id: Option<&str>, aspect: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(str::to_string),
            aspect: aspect.to_string(),
            scope: None,
        }
    }

    /// Same GRI with `scope` set.
    #[must_use]
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }
}

impl std::fmt::Display for Gri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.entity_type,
            self.entity_id.as_deref().unwrap_or(NULL_ID),
            self.aspect
        )?;
        if let Some(scope) = &self.scope {
            write!(f, ":{scope}")?;
        }
        Ok(())
    }
}

impl FromStr for Gri {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let (Some(entity_type), Some(entity_id), Some(rest)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(GraphError::InvalidGri(s.to_string()));
        };

        let (aspect, scope) = match rest.rsplit_once(':') {
            Some((aspect, scope)) => (aspect, Some(scope.to_string())),
            None => (rest, None),
        };

        if entity_type.is_empty() || entity_id.is_empty() || aspect.is_empty() {
            return Err(GraphError::InvalidGri(s.to_string()));
        }

        Ok(Self {
            entity_type: entity_type.to_string(),
            entity_id: (entity_id != NULL_ID).then(|| entity_id.to_string()),
            aspect: aspect.to_string(),
            scope,
        })
    }
}

/// Graph operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a resource.
    Create,
    /// Read a resource.
    Get,
    /// Modify a resource.
    Update,
    /// Remove a resource.
    Delete,
}

impl Operation {
    /// Wire name of the operation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for Operation {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "get" => Ok(Self::Get),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(GraphError::InvalidOperation(other.to_string())),
        }
    }
}

/// Tells the server through which relation the client is allowed to see a
/// resource, e.g. a user visible through a shared space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHint {
    /// Hint kind, e.g. `throughSpace`, `throughGroup`, `asUser`.
    pub kind: String,
    /// Id of the entity the hint goes through.
    pub id: String,
}

impl std::fmt::Display for AuthHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for AuthHint {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, id)) if !kind.is_empty() && !id.is_empty() => Ok(Self {
                kind: kind.to_string(),
                id: id.to_string(),
            }),
            _ => Err(GraphError::InvalidAuthHint(s.to_string())),
        }
    }
}

/// One `graph` request.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRequest {
    /// Target resource.
    pub gri: Gri,
    /// What to do with it.
    pub operation: Operation,
    /// Operation data (create/update).
    pub data: Option<Value>,
    /// Ask the server to push later changes of the resource.
    pub subscribe: bool,
    /// Visibility hint.
    pub auth_hint: Option<AuthHint>,
}

impl GraphRequest {
    /// Request with no data, subscription or hint.
    #[must_use]
    pub fn new(gri: Gri, operation: Operation) -> Self {
        Self {
            gri,
            operation,
            data: None,
            subscribe: false,
            auth_hint: None,
        }
    }

    /// `get` request.
    #[must_use]
    pub fn get(gri: Gri) -> Self {
        Self::new(gri, Operation::Get)
    }

    /// `create` request carrying `data`.
    #[must_use]
    pub fn create(gri: Gri, data: Value) -> Self {
        Self::new(gri, Operation::Create).with_data(data)
    }

    /// `update` request carrying `data`.
    #[must_use]
    pub fn update(gri: Gri, data: Value) -> Self {
        Self::new(gri, Operation::Update).with_data(data)
    }

    /// `delete` request.
    #[must_use]
    pub fn delete(gri: Gri) -> Self {
        Self::new(gri, Operation::Delete)
    }

    /// Attach operation data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the subscribe flag.
    #[must_use]
    pub fn subscribe(mut self, subscribe: bool) -> Self {
        self.subscribe = subscribe;
        self
    }

    /// Attach an auth hint.
    #[must_use]
    pub fn with_auth_hint(mut self, hint: AuthHint) -> Self {
        self.auth_hint = Some(hint);
        self
    }

    /// Wire payload of the request.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("gri".into(), Value::String(self.gri.to_string()));
        payload.insert("operation".into(), Value::String(self.operation.as_str().into()));
        payload.insert("data".into(), self.data.clone().unwrap_or(Value::Null));
        payload.insert("subscribe".into(), Value::Bool(self.subscribe));
        if let Some(hint) = &self.auth_hint {
            payload.insert("authHint".into(), Value::String(hint.to_string()));
        }
        Value::Object(payload)
    }
}
