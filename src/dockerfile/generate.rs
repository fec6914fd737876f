//! Dockerfile generation for targets and variables

use crate::definition::{CopySource, Definition, Stage as TargetStage, Var, Vertex, VertexId};
use crate::dockerfile::{Document, Instruction, Mount, Run, Stage, SCRATCH};
use std::collections::HashSet;

/// Materialized variable values in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarValues {
    entries: Vec<(String, String)>,
}

impl VarValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing an earlier value in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Generate one document covering everything reachable from `root`.
///
/// Stages are emitted in dependency order (`from`, internal copy sources,
/// `dependsOn`, then the vertex itself), each name once. `root` may be a
/// transient aggregator that is not part of `definition`. A vertex with an
/// output also gets a `<name>-out` stage holding only the artifact.
///
/// Every stage receives the var values as quoted `ENV` lines. A Dockerfile
/// ENV value cannot hold a line break, so newlines inside a value are folded
/// to spaces.
pub fn generate_target(
    definition: &Definition,
    root: &Vertex,
    vars: &VarValues,
    syntax: &str,
) -> Document {
    let mut generator = TargetGenerator {
        definition,
        vars,
        emitted: HashSet::new(),
        document: Document::new(syntax),
    };
    generator.visit(root);
    generator.document
}

/// Generate the single-stage document used to compute `var`.
///
/// Secret and SSH mounts are marked required so the backend fails instead of
/// producing a value without them.
pub fn generate_var(var: &Var, syntax: &str) -> Document {
    let mut instructions = Vec::new();

    if !var.workdir.is_empty() {
        instructions.push(Instruction::Workdir(var.workdir.clone()));
    }

    instructions.extend(var.env.iter().map(|(k, v)| Instruction::Env {
        key: k.clone(),
        value: v.clone(),
    }));

    instructions.extend(var.copy.iter().map(|c| Instruction::Copy {
        from: c.from.clone(),
        src: c.src.clone(),
        dst: c.dst.clone(),
    }));

    let mut mounts: Vec<Mount> = var
        .cache
        .iter()
        .map(|c| Mount::Cache {
            id: c.id.clone(),
            target: c.path.clone(),
        })
        .collect();
    mounts.extend(var.secrets.iter().map(|s| Mount::Secret {
        id: s.id.clone(),
        target: s.mount_path.clone(),
        required: true,
    }));
    if var.ssh.is_some() {
        mounts.push(Mount::Ssh { required: true });
    }

    instructions.push(Instruction::Run(Run {
        mounts,
        network: var.network.as_ref().map(|n| n.mode.clone()),
        command: var.command.clone(),
    }));

    let mut document = Document::new(syntax);
    document.stages.push(Stage {
        from: var.from.clone(),
        platform: var.platform.clone(),
        alias: Some(var.name.clone()),
        instructions,
    });
    document
}

/// Name of the stage that exports a vertex's output artifact
pub fn output_stage_name(vertex_name: &str) -> String {
    format!("{}-out", vertex_name)
}

struct TargetGenerator<'a> {
    definition: &'a Definition,
    vars: &'a VarValues,
    emitted: HashSet<String>,
    document: Document,
}

impl<'a> TargetGenerator<'a> {
    fn visit_id(&mut self, id: VertexId) {
        let definition = self.definition;
        self.visit(definition.vertex(id));
    }

    fn visit(&mut self, vertex: &Vertex) {
        if self.emitted.contains(&vertex.name) {
            return;
        }

        if let Some(from) = vertex.from {
            self.visit_id(from);
        }
        if let Some(stage) = &vertex.stage {
            for copy in &stage.copy {
                if let Some(CopySource::Vertex(id)) = copy.from {
                    self.visit_id(id);
                }
            }
        }
        for &dep in &vertex.depends_on {
            self.visit_id(dep);
        }

        self.emitted.insert(vertex.name.clone());
        if let Some(stage) = &vertex.stage {
            self.emit(&vertex.name, stage);
        }
    }

    fn emit(&mut self, name: &str, stage: &TargetStage) {
        let mut instructions = Vec::new();

        if !stage.workdir.is_empty() {
            instructions.push(Instruction::Workdir(stage.workdir.clone()));
        }

        instructions.extend(self.vars.iter().map(|(k, v)| Instruction::Env {
            key: k.to_string(),
            value: v.to_string(),
        }));
        instructions.extend(stage.env.iter().map(|(k, v)| Instruction::Env {
            key: k.clone(),
            value: v.clone(),
        }));

        instructions.extend(stage.copy.iter().map(|c| Instruction::Copy {
            from: c.from.as_ref().map(|f| match f {
                CopySource::Vertex(id) => self.definition.name(*id).to_string(),
                CopySource::Image(image) => image.clone(),
            }),
            src: c.src.clone(),
            dst: c.dst.clone(),
        }));

        if let Some(command) = &stage.command {
            let mut mounts: Vec<Mount> = stage
                .cache
                .iter()
                .map(|c| Mount::Cache {
                    id: c.id.clone(),
                    target: c.path.clone(),
                })
                .collect();
            mounts.extend(stage.secrets.iter().map(|s| Mount::Secret {
                id: s.id.clone(),
                target: s.mount_path.clone(),
                required: false,
            }));
            if stage.ssh.is_some() {
                mounts.push(Mount::Ssh { required: false });
            }

            instructions.push(Instruction::Run(Run {
                mounts,
                network: stage.network.as_ref().map(|n| n.mode.clone()),
                command: command.clone(),
            }));
        }

        self.document.stages.push(Stage {
            from: stage.from.clone(),
            platform: stage.platform.clone(),
            alias: Some(name.to_string()),
            instructions,
        });

        if let Some(output) = &stage.output {
            self.document.stages.push(Stage {
                from: SCRATCH.to_string(),
                platform: None,
                alias: Some(output_stage_name(name)),
                instructions: vec![Instruction::Copy {
                    from: Some(name.to_string()),
                    src: output.artifact.clone(),
                    dst: "/".to_string(),
                }],
            });
        }
    }
}
