//! Flat build definition schema
//!
//! This is the JSON shape produced by the config evaluator. Maps whose order
//! matters (targets, vars, env) are read as ordered entry lists.

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::marker::PhantomData;

/// The only build definition schema this version understands
pub const API_VERSION_V1: &str = "kiln/v1";

/// Root of an evaluated build definition
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatConfig {
    pub api_version: String,

    #[serde(default, deserialize_with = "ordered_entries")]
    pub targets: Vec<(String, TargetEntry)>,

    #[serde(default, deserialize_with = "ordered_entries")]
    pub vars: Vec<(String, VarObject)>,
}

/// A target is either a bare list of dependencies or a full object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TargetEntry {
    Aggregate(Vec<String>),
    Target(Box<TargetObject>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetObject {
    pub from: Option<String>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default, deserialize_with = "ordered_entries")]
    pub env: Vec<(String, String)>,

    pub command: Option<String>,

    pub ssh: Option<SshObject>,

    #[serde(default)]
    pub cache: Vec<CacheObject>,

    #[serde(default)]
    pub copy: OneOrMany<CopyObject>,

    #[serde(default, alias = "secrets")]
    pub secret: OneOrMany<SecretObject>,

    pub platform: Option<String>,

    #[serde(default)]
    pub workdir: String,

    pub network: Option<String>,

    pub output: Option<OutputObject>,
}

impl TargetObject {
    /// Whether any stage field is present. A target made only of
    /// `dependsOn` is an aggregator.
    pub fn has_stage(&self) -> bool {
        self.from.is_some()
            || !self.env.is_empty()
            || self.command.is_some()
            || self.ssh.is_some()
            || !self.cache.is_empty()
            || !self.copy.is_empty()
            || !self.secret.is_empty()
            || self.platform.is_some()
            || !self.workdir.is_empty()
            || self.network.is_some()
            || self.output.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VarObject {
    pub from: String,

    pub platform: Option<String>,

    #[serde(default)]
    pub workdir: String,

    #[serde(default, deserialize_with = "ordered_entries")]
    pub env: Vec<(String, String)>,

    #[serde(default)]
    pub cache: Vec<CacheObject>,

    #[serde(default)]
    pub copy: OneOrMany<CopyObject>,

    #[serde(default, alias = "secret")]
    pub secrets: OneOrMany<SecretObject>,

    pub network: Option<String>,

    pub ssh: Option<SshObject>,

    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CopyObject {
    pub from: Option<String>,
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SecretObject {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheObject {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputObject {
    pub artifact: String,
    pub local: String,
}

/// SSH agent request; carries no options
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SshObject {}

/// Field accepting either a single object or a list of objects
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Many(items) => items.is_empty(),
            Self::One(_) => false,
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

/// Deserialize a JSON object into `(key, value)` pairs in document order.
/// Duplicate keys are kept so the resolver can report them.
fn ordered_entries<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct EntriesVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
        type Value = Vec<(String, T)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, T>()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor(PhantomData))
}
