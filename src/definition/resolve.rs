//! Graph resolution
//!
//! Turns the flat target/var maps into a `Definition`. Each declared target
//! owns the arena slot matching its declaration index, so resolving a target
//! twice simply finds its slot already filled.
//!
//! Per target the edges are walked in a fixed order: `from`, then `copy`,
//! then `dependsOn`, and only then is the target's own stage built. Nested
//! failures therefore report the deepest cause first.

use crate::config::SecretSource;
use crate::definition::model::{
    Cache, Copy, CopySource, Definition, Network, Output, Secret, Ssh, Stage, Var, VarCopy,
    Vertex, VertexId,
};
use crate::definition::schema::{
    CacheObject, CopyObject, FlatConfig, SecretObject, TargetEntry, TargetObject, VarObject,
    API_VERSION_V1,
};
use crate::definition::trace::{Edge, Trace};
use crate::error::{KilnError, KilnResult};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Resolve an evaluated build definition against the available secrets
pub fn resolve(config: &FlatConfig, secrets: &[SecretSource]) -> KilnResult<Definition> {
    if config.api_version != API_VERSION_V1 {
        return Err(KilnError::UnsupportedApiVersion {
            found: config.api_version.clone(),
            supported: API_VERSION_V1.to_string(),
        });
    }

    ensure_unique("target", config.targets.iter().map(|(n, _)| n.as_str()))?;
    ensure_unique("var", config.vars.iter().map(|(n, _)| n.as_str()))?;

    let mut resolver = GraphResolver::new(&config.targets, secrets);
    let vertices = resolver.resolve_all()?;

    let vars = config
        .vars
        .iter()
        .map(|(name, var)| map_var(name, var, secrets))
        .collect::<KilnResult<Vec<_>>>()?;

    debug!(
        "Resolved {} targets and {} vars",
        vertices.len(),
        vars.len()
    );
    Ok(Definition::new(vertices, vars))
}

fn ensure_unique<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> KilnResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(KilnError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

struct GraphResolver<'a> {
    targets: &'a [(String, TargetEntry)],
    index: HashMap<&'a str, usize>,
    slots: Vec<Option<Vertex>>,
    trace: Trace,
    secrets: &'a [SecretSource],
}

impl<'a> GraphResolver<'a> {
    fn new(targets: &'a [(String, TargetEntry)], secrets: &'a [SecretSource]) -> Self {
        Self {
            targets,
            index: targets
                .iter()
                .enumerate()
                .map(|(i, (name, _))| (name.as_str(), i))
                .collect(),
            slots: vec![None; targets.len()],
            trace: Trace::default(),
            secrets,
        }
    }

    fn resolve_all(&mut self) -> KilnResult<Vec<Vertex>> {
        for idx in 0..self.targets.len() {
            self.resolve_target(idx)?;
        }

        std::mem::take(&mut self.slots)
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| {
                    KilnError::Internal(format!("target {} left unresolved", self.targets[i].0))
                })
            })
            .collect()
    }

    fn resolve_target(&mut self, idx: usize) -> KilnResult<VertexId> {
        if self.slots[idx].is_some() {
            return Ok(VertexId(idx));
        }

        let targets = self.targets;
        let (name, entry) = &targets[idx];
        let name = name.as_str();

        if self.trace.contains(name) {
            return Err(KilnError::DependencyCycle {
                target: name.to_string(),
                trace: self.trace.to_string(),
            });
        }

        let vertex = match entry {
            TargetEntry::Aggregate(deps) => Vertex {
                name: name.to_string(),
                stage: None,
                from: None,
                depends_on: self.resolve_depends_on(name, deps)?,
            },
            TargetEntry::Target(target) => self.resolve_object(name, target)?,
        };

        if vertex.stage.is_none() && vertex.depends_on.is_empty() {
            return Err(KilnError::EmptyTarget(name.to_string()));
        }

        self.slots[idx] = Some(vertex);
        Ok(VertexId(idx))
    }

    fn resolve_object(&mut self, name: &str, target: &'a TargetObject) -> KilnResult<Vertex> {
        if !target.has_stage() {
            return Ok(Vertex {
                name: name.to_string(),
                stage: None,
                from: None,
                depends_on: self.resolve_depends_on(name, &target.depends_on)?,
            });
        }

        let base = target
            .from
            .as_deref()
            .ok_or_else(|| KilnError::MissingFrom(name.to_string()))?;

        let from = match self.index.get(base).copied() {
            Some(parent) => Some(self.follow(name, Edge::From, parent)?),
            None => None,
        };

        let copy = target
            .copy
            .clone()
            .into_vec()
            .into_iter()
            .map(|c| self.resolve_copy(name, c))
            .collect::<KilnResult<Vec<_>>>()?;

        let depends_on = self.resolve_depends_on(name, &target.depends_on)?;

        let secrets = map_secrets(
            &format!("{} stage", name),
            target.secret.clone().into_vec(),
            self.secrets,
        )?;

        let stage = Stage {
            from: base.to_string(),
            platform: target.platform.clone(),
            workdir: target.workdir.clone(),
            env: target.env.clone(),
            cache: target.cache.iter().map(map_cache).collect(),
            copy,
            network: target.network.clone().map(|mode| Network { mode }),
            ssh: target.ssh.as_ref().map(|_| Ssh),
            secrets,
            command: target.command.clone(),
            output: target.output.as_ref().map(|o| Output {
                artifact: o.artifact.clone(),
                local: o.local.clone(),
            }),
        };

        Ok(Vertex {
            name: name.to_string(),
            stage: Some(stage),
            from,
            depends_on,
        })
    }

    /// A copy source naming a declared target becomes a graph edge; anything
    /// else is kept as an external image reference.
    fn resolve_copy(&mut self, name: &str, copy: CopyObject) -> KilnResult<Copy> {
        let from = match copy.from {
            None => None,
            Some(source) => match self.index.get(source.as_str()).copied() {
                Some(idx) => Some(CopySource::Vertex(self.follow(name, Edge::Copy, idx)?)),
                None => Some(CopySource::Image(source)),
            },
        };

        Ok(Copy {
            from,
            src: copy.src,
            dst: copy.dst,
        })
    }

    fn resolve_depends_on(&mut self, name: &str, deps: &[String]) -> KilnResult<Vec<VertexId>> {
        deps.iter()
            .map(|dep| {
                let idx = self
                    .index
                    .get(dep.as_str())
                    .copied()
                    .ok_or_else(|| KilnError::UnknownDependency {
                        target: name.to_string(),
                        dependency: dep.clone(),
                    })?;
                self.follow(name, Edge::DependsOn, idx)
            })
            .collect()
    }

    /// Resolve `target` with `(name, edge)` on the active path
    fn follow(&mut self, name: &str, edge: Edge, target: usize) -> KilnResult<VertexId> {
        self.trace.push(name, edge);
        let result = self.resolve_target(target);
        self.trace.pop();
        result
    }
}

fn map_var(name: &str, var: &VarObject, secrets: &[SecretSource]) -> KilnResult<Var> {
    let mapped = map_secrets(
        &format!("{} var", name),
        var.secrets.clone().into_vec(),
        secrets,
    )?;

    Ok(Var {
        name: name.to_string(),
        from: var.from.clone(),
        platform: var.platform.clone(),
        workdir: var.workdir.clone(),
        env: var.env.clone(),
        cache: var.cache.iter().map(map_cache).collect(),
        copy: var
            .copy
            .clone()
            .into_vec()
            .into_iter()
            .map(|c| VarCopy {
                from: c.from,
                src: c.src,
                dst: c.dst,
            })
            .collect(),
        secrets: mapped,
        network: var.network.clone().map(|mode| Network { mode }),
        ssh: var.ssh.as_ref().map(|_| Ssh),
        command: var.command.clone(),
    })
}

fn map_cache(cache: &CacheObject) -> Cache {
    Cache {
        id: cache.id.clone(),
        path: cache.path.clone(),
    }
}

fn map_secrets(
    owner: &str,
    requested: Vec<SecretObject>,
    available: &[SecretSource],
) -> KilnResult<Vec<Secret>> {
    requested
        .into_iter()
        .map(|s| {
            if !available.iter().any(|src| src.id == s.id) {
                return Err(KilnError::UnknownSecret {
                    stage: owner.to_string(),
                    id: s.id,
                });
            }
            Ok(Secret {
                id: s.id,
                mount_path: s.path,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::evaluate::parse_flat_config;
    use std::path::Path;

    fn config(json: &str) -> FlatConfig {
        parse_flat_config(Path::new("kiln.json"), json).unwrap()
    }

    fn resolve_json(json: &str) -> KilnResult<Definition> {
        resolve(&config(json), &[])
    }

    fn secret(id: &str) -> SecretSource {
        SecretSource {
            id: id.to_string(),
            path: format!("/host/{}", id),
        }
    }

    #[test]
    fn rejects_unsupported_api_version() {
        let err = resolve_json(r#"{"apiVersion": "kiln/v0", "targets": {"a": ["a"]}}"#)
            .unwrap_err();
        assert!(matches!(err, KilnError::UnsupportedApiVersion { .. }));
    }

    #[test]
    fn shared_vertex_resolved_once() {
        let def = resolve_json(
            r#"{"apiVersion": "kiln/v1", "targets": {
                "a": ["b", "c"],
                "b": {"from": "alpine", "command": "b", "dependsOn": ["d"]},
                "c": {"from": "alpine", "command": "c", "dependsOn": ["d"]},
                "d": {"from": "alpine", "command": "d"}
            }}"#,
        )
        .unwrap();

        let d = def.find("d").unwrap();
        let b = def.vertex(def.find("b").unwrap());
        let c = def.vertex(def.find("c").unwrap());
        assert_eq!(b.depends_on, vec![d]);
        assert_eq!(c.depends_on, vec![d]);
        assert_eq!(def.vertices().len(), 4);
    }

    #[test]
    fn vertices_keep_declaration_order() {
        let def = resolve_json(
            r#"{"apiVersion": "kiln/v1", "targets": {
                "z": ["y"],
                "y": {"from": "alpine"},
                "x": ["y"]
            }}"#,
        )
        .unwrap();
        let names: Vec<&str> = def.vertices().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["z", "y", "x"]);
    }

    #[test]
    fn from_target_links_parent() {
        let def = resolve_json(
            r#"{"apiVersion": "kiln/v1", "targets": {
                "app": {"from": "base", "command": "make"},
                "base": {"from": "golang:1.22", "workdir": "/src"}
            }}"#,
        )
        .unwrap();

        let app = def.vertex(def.find("app").unwrap());
        assert_eq!(app.from, def.find("base"));
        assert_eq!(app.stage.as_ref().unwrap().from, "base");

        let base = def.vertex(def.find("base").unwrap());
        assert!(base.from.is_none());
    }

    #[test]
    fn copy_from_target_or_image() {
        let def = resolve_json(
            r#"{"apiVersion": "kiln/v1", "targets": {
                "gen": {"from": "alpine", "command": "gen"},
                "app": {"from": "alpine", "copy": [
                    {"from": "gen", "src": "/out", "dst": "/gen"},
                    {"from": "busybox:1.36", "src": "/bin/sh", "dst": "/bin/sh"},
                    {"src": ".", "dst": "/app"}
                ]}
            }}"#,
        )
        .unwrap();

        let copy = &def.vertex(def.find("app").unwrap()).stage.as_ref().unwrap().copy;
        assert_eq!(copy[0].from, Some(CopySource::Vertex(def.find("gen").unwrap())));
        assert_eq!(
            copy[1].from,
            Some(CopySource::Image("busybox:1.36".to_string()))
        );
        assert_eq!(copy[2].from, None);
    }

    #[test]
    fn detects_from_cycle_with_trace() {
        let err = resolve_json(
            r#"{"apiVersion": "kiln/v1", "targets": {
                "a": {"from": "b"},
                "b": {"from": "c"},
                "c": {"from": "a"}
            }}"#,
        )
        .unwrap_err();

        match err {
            KilnError::DependencyCycle { target, trace } => {
                assert_eq!(target, "a");
                assert_eq!(trace, "a(from)->b(from)->c(from)");
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn detects_mixed_edge_cycle() {
        let err = resolve_json(
            r#"{"apiVersion": "kiln/v1", "targets": {
                "a": {"from": "alpine", "copy": {"from": "b", "src": "/x", "dst": "/x"}},
                "b": ["c"],
                "c": {"from": "a"}
            }}"#,
        )
        .unwrap_err();

        match err {
            KilnError::DependencyCycle { trace, .. } => {
                assert_eq!(trace, "a(copy)->b(dependsOn)->c(from)");
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn detects_self_reference() {
        let err = resolve_json(r#"{"apiVersion": "kiln/v1", "targets": {"a": ["a"]}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("a(dependsOn)"));
    }

    #[test]
    fn unknown_dependency() {
        let err = resolve_json(r#"{"apiVersion": "kiln/v1", "targets": {"all": ["ghost"]}}"#)
            .unwrap_err();
        match err {
            KilnError::UnknownDependency { target, dependency } => {
                assert_eq!(target, "all");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn unknown_secret_names_stage_and_id() {
        let cfg = config(
            r#"{"apiVersion": "kiln/v1", "targets": {
                "app": {"from": "alpine", "secret": {"id": "npmrc", "path": "/root/.npmrc"}}
            }}"#,
        );
        let err = resolve(&cfg, &[secret("other")]).unwrap_err();
        match &err {
            KilnError::UnknownSecret { stage, id } => {
                assert!(stage.contains("app"));
                assert_eq!(id, "npmrc");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn known_secret_resolves_single_and_list_identically() {
        let single = config(
            r#"{"apiVersion": "kiln/v1", "targets": {
                "app": {"from": "alpine", "secret": {"id": "npmrc", "path": "/root/.npmrc"}}
            }}"#,
        );
        let list = config(
            r#"{"apiVersion": "kiln/v1", "targets": {
                "app": {"from": "alpine", "secret": [{"id": "npmrc", "path": "/root/.npmrc"}]}
            }}"#,
        );
        let sources = [secret("npmrc")];
        let a = resolve(&single, &sources).unwrap();
        let b = resolve(&list, &sources).unwrap();

        assert_eq!(a.vertices()[0], b.vertices()[0]);
        assert_eq!(
            a.vertices()[0].stage.as_ref().unwrap().secrets,
            vec![Secret {
                id: "npmrc".to_string(),
                mount_path: "/root/.npmrc".to_string()
            }]
        );
    }

    #[test]
    fn var_secret_checked() {
        let cfg = config(
            r#"{"apiVersion": "kiln/v1", "targets": {"a": {"from": "alpine"}},
                "vars": {"token": {"from": "alpine", "command": "cat /t",
                    "secrets": {"id": "tok", "path": "/t"}}}}"#,
        );
        let err = resolve(&cfg, &[]).unwrap_err();
        assert!(err.to_string().contains("token var"));

        let def = resolve(&cfg, &[secret("tok")]).unwrap();
        assert_eq!(def.vars()[0].secrets.len(), 1);
    }

    #[test]
    fn vars_keep_declaration_order() {
        let def = resolve_json(
            r#"{"apiVersion": "kiln/v1", "targets": {"a": {"from": "alpine"}},
                "vars": {
                    "second": {"from": "alpine", "command": "echo 2"},
                    "first": {"from": "alpine", "command": "echo 1",
                        "copy": {"from": "git", "src": ".git", "dst": ".git"}}
                }}"#,
        )
        .unwrap();
        let names: Vec<&str> = def.vars().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
        assert_eq!(def.vars()[1].copy[0].from.as_deref(), Some("git"));
    }

    #[test]
    fn duplicate_target_rejected() {
        let err = resolve_json(
            r#"{"apiVersion": "kiln/v1", "targets": {"a": {"from": "x"}, "a": {"from": "y"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, KilnError::DuplicateName { kind: "target", .. }));
    }

    #[test]
    fn empty_aggregate_rejected() {
        let err = resolve_json(r#"{"apiVersion": "kiln/v1", "targets": {"a": []}}"#).unwrap_err();
        assert!(matches!(err, KilnError::EmptyTarget(_)));
    }

    #[test]
    fn depends_on_only_object_is_aggregate() {
        let def = resolve_json(
            r#"{"apiVersion": "kiln/v1", "targets": {
                "all": {"dependsOn": ["a"]},
                "a": {"from": "alpine"}
            }}"#,
        )
        .unwrap();
        let all = def.vertex(def.find("all").unwrap());
        assert!(all.stage.is_none());
        assert_eq!(all.depends_on.len(), 1);
    }

    #[test]
    fn stage_without_from_rejected() {
        let err = resolve_json(r#"{"apiVersion": "kiln/v1", "targets": {"a": {"command": "x"}}}"#)
            .unwrap_err();
        assert!(matches!(err, KilnError::MissingFrom(name) if name == "a"));
    }

    #[test]
    fn nested_failure_reports_deepest_cause() {
        let cfg = config(
            r#"{"apiVersion": "kiln/v1", "targets": {
                "app": {"from": "base", "secret": {"id": "missing-top", "path": "/a"}},
                "base": {"from": "alpine", "secret": {"id": "missing-base", "path": "/b"}}
            }}"#,
        );
        let err = resolve(&cfg, &[]).unwrap_err();
        assert!(err.to_string().contains("missing-base"));
    }
}
