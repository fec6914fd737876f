//! Dockerfile document model
//!
//! Documents are built from typed stages and instructions and rendered with
//! `Display`. Rendering is deterministic: stage order, instruction order and
//! mount field order are exactly what the caller put in.

mod generate;

pub use generate::{generate_target, generate_var, output_stage_name, VarValues};

use std::fmt;

/// Base image that never needs pulling
pub const SCRATCH: &str = "scratch";

/// Separator between RUN flags and the heredoc body
const RUN_CONTINUATION: &str = " \\\n    ";

/// A complete multi-stage build document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub syntax: String,
    pub stages: Vec<Stage>,
}

impl Document {
    pub fn new(syntax: impl Into<String>) -> Self {
        Self {
            syntax: syntax.into(),
            stages: Vec::new(),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# syntax={}", self.syntax)?;
        for stage in &self.stages {
            writeln!(f)?;
            write!(f, "{}", stage)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub from: String,
    pub platform: Option<String>,
    pub alias: Option<String>,
    pub instructions: Vec<Instruction>,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FROM ")?;
        if let Some(platform) = &self.platform {
            write!(f, "--platform={} ", platform)?;
        }
        f.write_str(&self.from)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", alias)?;
        }
        writeln!(f)?;

        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Workdir(String),
    Env {
        key: String,
        value: String,
    },
    Copy {
        /// Stage alias or image reference
        from: Option<String>,
        src: String,
        dst: String,
    },
    Run(Run),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workdir(dir) => write!(f, "WORKDIR {}", dir),
            Self::Env { key, value } => write!(f, "ENV {}=\"{}\"", key, quote_env(value)),
            Self::Copy { from, src, dst } => {
                f.write_str("COPY ")?;
                if let Some(from) = from {
                    write!(f, "--from={} ", from)?;
                }
                write!(f, "{} {}", src, dst)
            }
            Self::Run(run) => write!(f, "{}", run),
        }
    }
}

/// RUN instruction with its command embedded as a heredoc
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub mounts: Vec<Mount>,
    pub network: Option<String>,
    pub command: String,
}

impl Run {
    /// Heredoc delimiter that does not occur as a line of the command
    fn delimiter(&self) -> String {
        let clashes = |candidate: &str| self.command.lines().any(|l| l.trim_end() == candidate);

        let mut delimiter = "EOF".to_string();
        let mut n = 0;
        while clashes(&delimiter) {
            n += 1;
            delimiter = format!("EOF_{}", n);
        }
        delimiter
    }
}

/// The command becomes the heredoc body as written; only trailing newlines are
/// dropped since the delimiter line already terminates the body.
impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.mounts.iter().map(|m| format!("--mount={}", m)).collect();
        if let Some(network) = &self.network {
            parts.push(format!("--network={}", network));
        }

        let delimiter = self.delimiter();
        parts.push(format!("<<{}", delimiter));

        write!(
            f,
            "RUN {}\n{}\n{}",
            parts.join(RUN_CONTINUATION),
            self.command.trim_end_matches('\n'),
            delimiter
        )
    }
}

/// RUN mount; fields render as `key=value` pairs in a fixed order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mount {
    Cache { id: String, target: String },
    Secret { id: String, target: String, required: bool },
    Ssh { required: bool },
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache { id, target } => write!(f, "type=cache,id={},target={}", id, target),
            Self::Secret {
                id,
                target,
                required,
            } => {
                write!(f, "type=secret,id={},target={}", id, target)?;
                if *required {
                    f.write_str(",required=true")?;
                }
                Ok(())
            }
            Self::Ssh { required } => {
                f.write_str("type=ssh")?;
                if *required {
                    f.write_str(",required=true")?;
                }
                Ok(())
            }
        }
    }
}

/// Escape a value for a double-quoted ENV assignment. Newlines cannot be
/// represented and become spaces.
fn quote_env(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}
