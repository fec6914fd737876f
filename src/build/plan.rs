//! Execution order for target vertices

use crate::definition::{Definition, Vertex};
use crate::dockerfile::output_stage_name;
use std::collections::HashSet;

/// One backend build invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Vertex being built
    pub name: String,
    /// Document stage handed to the backend
    pub target: String,
    /// Local directory receiving the output artifact
    pub output: Option<String>,
}

/// Order in which the vertices reachable from `root` are built.
///
/// Dependencies come first and every vertex appears at most once. A `from`
/// parent is only built on its own when it has an output or dependencies;
/// otherwise the builder materializes it while building the child stage.
pub fn plan_execution(definition: &Definition, root: &Vertex) -> Vec<Step> {
    let mut planner = Planner {
        definition,
        executed: HashSet::new(),
        steps: Vec::new(),
    };
    planner.visit(root);
    planner.steps
}

struct Planner<'a> {
    definition: &'a Definition,
    executed: HashSet<String>,
    steps: Vec<Step>,
}

impl Planner<'_> {
    fn visit(&mut self, vertex: &Vertex) {
        if self.executed.contains(&vertex.name) {
            return;
        }

        let definition = self.definition;

        if let Some(parent) = vertex.from.map(|id| definition.vertex(id)) {
            if needs_explicit_run(parent) {
                self.visit(parent);
            }
        }

        for &dep in &vertex.depends_on {
            self.visit(definition.vertex(dep));
        }

        let Some(stage) = &vertex.stage else {
            return;
        };

        self.executed.insert(vertex.name.clone());

        let step = match &stage.output {
            Some(output) => Step {
                name: vertex.name.clone(),
                target: output_stage_name(&vertex.name),
                output: Some(output.local.clone()),
            },
            None => Step {
                name: vertex.name.clone(),
                target: vertex.name.clone(),
                output: None,
            },
        };
        self.steps.push(step);
    }
}

fn needs_explicit_run(vertex: &Vertex) -> bool {
    vertex.output().is_some() || !vertex.depends_on.is_empty()
}
