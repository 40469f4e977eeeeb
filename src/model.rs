//! Record schemas and keys
//!
//! Every stored record is a kind, a key and a flat map of JSON properties.
//! The typed schemas below convert to and from that map through serde;
//! absent properties are omitted rather than stored as null.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{BenchError, BenchResult};

/// Identifier part of a key: a caller-chosen name or a store-allocated id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyId {
    Id(i64),
    Name(String),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Id(id) => write!(f, "{}", id),
            KeyId::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Hierarchical record key
///
/// A key without an id is incomplete; the datastore allocates one on put.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    pub kind: String,
    pub id: Option<KeyId>,
    pub parent: Option<Box<Key>>,
}

impl Key {
    pub fn named(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: Some(KeyId::Name(name.to_string())),
            parent: None,
        }
    }

    pub fn with_id(kind: &str, id: i64) -> Self {
        Self {
            kind: kind.to_string(),
            id: Some(KeyId::Id(id)),
            parent: None,
        }
    }

    pub fn incomplete(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: None,
            parent: None,
        }
    }

    pub fn child_of(mut self, parent: Key) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn is_complete(&self) -> bool {
        self.id.is_some()
    }

    /// Ancestors from the root down to the direct parent
    pub fn ancestors(&self) -> Vec<&Key> {
        let mut chain = Vec::new();
        let mut current = self.parent.as_deref();
        while let Some(key) = current {
            chain.push(key);
            current = key.parent.as_deref();
        }
        chain.reverse();
        chain
    }

    /// True when `ancestor` is this key or one of its parents
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        self == ancestor || self.ancestors().into_iter().any(|k| k == ancestor)
    }

    /// Path form, e.g. `SomeData:default/SomeData:17`
    ///
    /// `%`, `/` and `:` are percent-escaped. A name that would read back as
    /// an id (or that starts with `'`) is written with a leading `'`.
    pub fn path(&self) -> String {
        let mut segments: Vec<String> = self
            .ancestors()
            .into_iter()
            .map(|k| k.segment())
            .collect();
        segments.push(self.segment());
        segments.join("/")
    }

    fn segment(&self) -> String {
        let kind = escape_segment(&self.kind);
        match &self.id {
            Some(KeyId::Id(id)) => format!("{}:{}", kind, id),
            Some(KeyId::Name(name)) if name.starts_with('\'') || name.parse::<i64>().is_ok() => {
                format!("{}:'{}", kind, escape_segment(name))
            }
            Some(KeyId::Name(name)) => format!("{}:{}", kind, escape_segment(name)),
            None => kind,
        }
    }

    /// Parse a path produced by [`Key::path`]
    pub fn parse_path(path: &str) -> BenchResult<Self> {
        let invalid = || BenchError::Protocol(format!("invalid key path '{}'", path));
        let mut key: Option<Key> = None;
        for segment in path.split('/') {
            let (kind, id) = match segment.split_once(':') {
                Some((kind, id)) => (kind, Some(id)),
                None => (segment, None),
            };
            if kind.is_empty() {
                return Err(invalid());
            }
            let id = match id {
                Some(raw) => Some(match raw.strip_prefix('\'') {
                    Some(name) => KeyId::Name(unescape_segment(name).ok_or_else(invalid)?),
                    None => match raw.parse::<i64>() {
                        Ok(n) => KeyId::Id(n),
                        Err(_) => KeyId::Name(unescape_segment(raw).ok_or_else(invalid)?),
                    },
                }),
                None => None,
            };
            key = Some(Key {
                kind: unescape_segment(kind).ok_or_else(invalid)?,
                id,
                parent: key.map(Box::new),
            });
        }
        key.ok_or_else(|| BenchError::Protocol("empty key path".to_string()))
    }
}

fn escape_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_segment`]; `None` on a malformed escape
fn unescape_segment(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3)?;
        out.push(match code {
            "25" => '%',
            "2F" => '/',
            "3A" => ':',
            _ => return None,
        });
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.path())
    }
}

/// A stored record: key plus property map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: Key,
    pub properties: Map<String, Value>,
}

impl Record {
    pub fn new(key: Key, properties: Map<String, Value>) -> Self {
        Self { key, properties }
    }

    pub fn kind(&self) -> &str {
        &self.key.kind
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }

    /// Build a record from a typed entity under the given parent
    pub fn from_entity<E: Entity>(entity: &E, parent: Option<Key>) -> BenchResult<Self> {
        let mut key = Key::incomplete(E::KIND);
        if let Some(parent) = parent {
            key = key.child_of(parent);
        }
        let properties = match serde_json::to_value(entity)? {
            Value::Object(map) => map,
            other => {
                return Err(BenchError::Datastore(format!(
                    "{} did not serialize to an object: {}",
                    E::KIND,
                    other
                )))
            }
        };
        Ok(Self { key, properties })
    }

    /// Convert back into a typed entity; missing properties become `None`
    pub fn to_entity<E: Entity>(&self) -> BenchResult<E> {
        Ok(serde_json::from_value(Value::Object(self.properties.clone()))?)
    }
}

/// A typed record schema stored under a fixed kind
pub trait Entity: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

/// Nested sub-record repeated inside [`SomeData`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubData {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub str0: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub int0: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub int1: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub int2: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub int3: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub int4: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SomeData {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prop0: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prop1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prop2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prop3: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prop4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prop5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prop6: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prop7: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prop8: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub flag: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub items: Vec<SubData>,
}

impl Entity for SomeData {
    const KIND: &'static str = "SomeData";
}

impl SomeData {
    /// Common parent of every seeded record
    pub fn parent_key() -> Key {
        Key::named(Self::KIND, "default")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Something {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub foo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bar: Option<bool>,
}

impl Entity for Something {
    const KIND: &'static str = "Something";
}
