//! Active resolution path used to detect dependency cycles

use std::fmt;

/// Kind of edge that was followed to reach the next target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    From,
    DependsOn,
    Copy,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::From => "from",
            Self::DependsOn => "dependsOn",
            Self::Copy => "copy",
        })
    }
}

/// Stack of `(target, edge)` pairs currently being resolved
#[derive(Debug, Default)]
pub struct Trace {
    entries: Vec<(String, Edge)>,
}

impl Trace {
    pub fn push(&mut self, name: &str, edge: Edge) {
        self.entries.push((name.to_string(), edge));
    }

    pub fn pop(&mut self) {
        self.entries.pop();
    }

    /// Whether `name` is on the active path
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }
}

/// Oldest entry first, e.g. `a(from)->b(copy)->c(dependsOn)`
impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, edge)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("->")?;
            }
            write!(f, "{}({})", name, edge)?;
        }
        Ok(())
    }
}
