//! Resolved build definition
//!
//! Vertices live in an arena owned by `Definition` and reference each other
//! by `VertexId`, so a vertex shared by several parents exists exactly once.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::HashMap;

/// Index of a vertex inside its `Definition`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub(crate) usize);

/// A named node of the build graph
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    /// Unique vertex name
    pub name: String,

    /// Build content; `None` for pure aggregators
    pub stage: Option<Stage>,

    /// Parent vertex when the stage is based on another target
    pub from: Option<VertexId>,

    /// Vertices that must be built before this one
    pub depends_on: Vec<VertexId>,
}

impl Vertex {
    /// Transient aggregator that is not part of any definition
    pub fn aggregate(name: impl Into<String>, depends_on: Vec<VertexId>) -> Self {
        Self {
            name: name.into(),
            stage: None,
            from: None,
            depends_on,
        }
    }

    pub fn output(&self) -> Option<&Output> {
        self.stage.as_ref().and_then(|s| s.output.as_ref())
    }
}

/// Build content of a target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage {
    /// Base image, or the name of the parent target
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub workdir: String,
    #[serde(serialize_with = "ordered_map")]
    pub env: Vec<(String, String)>,
    pub cache: Vec<Cache>,
    #[serde(skip)]
    pub copy: Vec<Copy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<Ssh>,
    pub secrets: Vec<Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
}

/// A value computed by running a stage and capturing its output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Var {
    pub name: String,
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub workdir: String,
    #[serde(serialize_with = "ordered_map")]
    pub env: Vec<(String, String)>,
    pub cache: Vec<Cache>,
    pub copy: Vec<VarCopy>,
    pub secrets: Vec<Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<Ssh>,
    pub command: String,
}

/// Where a target copy takes its files from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopySource {
    /// Another target of the same definition
    Vertex(VertexId),
    /// External image reference
    Image(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Copy {
    /// `None` copies from the build context
    pub from: Option<CopySource>,
    pub src: String,
    pub dst: String,
}

/// Copy instruction of a variable stage; `from` is always literal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarCopy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cache {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub id: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Network {
    pub mode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ssh;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Output {
    pub artifact: String,
    pub local: String,
}

/// The resolved graph: one vertex per declared target plus variables.
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct Definition {
    vertices: Vec<Vertex>,
    by_name: HashMap<String, VertexId>,
    vars: Vec<Var>,
}

impl Definition {
    /// `vertices[i]` must be the vertex for `VertexId(i)`
    pub(crate) fn new(vertices: Vec<Vertex>, vars: Vec<Var>) -> Self {
        let by_name = vertices
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name.clone(), VertexId(i)))
            .collect();
        Self {
            vertices,
            by_name,
            vars,
        }
    }

    /// Look up a target by name
    pub fn find(&self, name: &str) -> Option<VertexId> {
        self.by_name.get(name).copied()
    }

    /// Vertex behind an id issued by this definition
    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id.0]
    }

    /// All vertices in declaration order
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// All variables in declaration order
    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    /// Name of the vertex behind `id`
    pub fn name(&self, id: VertexId) -> &str {
        &self.vertex(id).name
    }

    /// Render the definition as JSON with references spelled out by name
    pub fn to_json(&self) -> serde_json::Result<String> {
        let view = DefinitionView {
            vertexes: self.vertices.iter().map(|v| self.vertex_view(v)).collect(),
            vars: &self.vars,
        };
        serde_json::to_string_pretty(&view)
    }

    fn vertex_view<'a>(&'a self, v: &'a Vertex) -> VertexView<'a> {
        VertexView {
            name: &v.name,
            from: v.from.map(|id| self.name(id)),
            depends_on: v.depends_on.iter().map(|id| self.name(*id)).collect(),
            stage: v.stage.as_ref().map(|stage| StageView {
                stage,
                copy: stage
                    .copy
                    .iter()
                    .map(|c| CopyView {
                        from: c.from.as_ref().map(|f| match f {
                            CopySource::Vertex(id) => CopyFromView::Target(self.name(*id)),
                            CopySource::Image(image) => CopyFromView::Image(image),
                        }),
                        src: &c.src,
                        dst: &c.dst,
                    })
                    .collect(),
            }),
        }
    }
}

#[derive(Serialize)]
struct DefinitionView<'a> {
    vertexes: Vec<VertexView<'a>>,
    vars: &'a [Var],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VertexView<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<StageView<'a>>,
}

#[derive(Serialize)]
struct StageView<'a> {
    #[serde(flatten)]
    stage: &'a Stage,
    copy: Vec<CopyView<'a>>,
}

#[derive(Serialize)]
struct CopyView<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<CopyFromView<'a>>,
    src: &'a str,
    dst: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CopyFromView<'a> {
    Target(&'a str),
    Image(&'a str),
}

fn ordered_map<S: Serializer>(entries: &[(String, String)], s: S) -> Result<S::Ok, S::Error> {
    let mut map = s.serialize_map(Some(entries.len()))?;
    for (k, v) in entries {
        map.serialize_entry(k, v)?;
    }
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(from: &str) -> Stage {
        Stage {
            from: from.to_string(),
            platform: None,
            workdir: "/app".to_string(),
            env: vec![("B".to_string(), "1".to_string()), ("A".to_string(), "2".to_string())],
            cache: vec![],
            copy: vec![],
            network: None,
            ssh: None,
            secrets: vec![],
            command: Some("make".to_string()),
            output: None,
        }
    }

    fn sample() -> Definition {
        let base = Vertex {
            name: "base".to_string(),
            stage: Some(stage("golang:1.22")),
            from: None,
            depends_on: vec![],
        };
        let mut app_stage = stage("base");
        app_stage.copy.push(Copy {
            from: Some(CopySource::Vertex(VertexId(0))),
            src: "/out".to_string(),
            dst: "/bin".to_string(),
        });
        let app = Vertex {
            name: "app".to_string(),
            stage: Some(app_stage),
            from: Some(VertexId(0)),
            depends_on: vec![],
        };
        let all = Vertex::aggregate("all", vec![VertexId(1)]);
        Definition::new(vec![base, app, all], vec![])
    }

    #[test]
    fn find_by_name() {
        let def = sample();
        let id = def.find("app").unwrap();
        assert_eq!(def.vertex(id).name, "app");
        assert_eq!(def.vertex(id).from, def.find("base"));
        assert!(def.find("missing").is_none());
    }

    #[test]
    fn json_spells_references_by_name() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let app = &value["vertexes"][1];
        assert_eq!(app["from"], "base");
        assert_eq!(app["stage"]["copy"][0]["from"]["target"], "base");
        assert_eq!(value["vertexes"][2]["dependsOn"][0], "app");
    }

    #[test]
    fn json_keeps_env_order() {
        let json = sample().to_json().unwrap();
        let b = json.find("\"B\"").unwrap();
        let a = json.find("\"A\"").unwrap();
        assert!(b < a);
    }

    #[test]
    fn aggregate_has_no_output() {
        let v = Vertex::aggregate("all", vec![]);
        assert!(v.stage.is_none());
        assert!(v.output().is_none());
    }
}
