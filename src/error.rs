//! Error types for kiln
//!
//! All modules use `KilnResult<T>` as their return type. Transcript parsing
//! has its own `ParseError` which is wrapped with the variable name once it
//! reaches the orchestrator.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// All errors that can occur in kiln
#[derive(Error, Debug)]
pub enum KilnError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported apiVersion '{found}', expected '{supported}'")]
    UnsupportedApiVersion { found: String, supported: String },

    #[error("Invalid build definition {path}: {reason}")]
    DefinitionInvalid { path: PathBuf, reason: String },

    // Graph errors
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("{target} depends on unknown target {dependency}")]
    UnknownDependency { target: String, dependency: String },

    #[error("Recursive graph detected by '{target}' target, trace: {trace}")]
    DependencyCycle { target: String, trace: String },

    #[error("Unknown secret '{id}' referenced in {stage}")]
    UnknownSecret { stage: String, id: String },

    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Target {0} has no stage and no dependencies")]
    EmptyTarget(String),

    #[error("Target {0} declares a stage without 'from'")]
    MissingFrom(String),

    // Backend errors
    /// `code` is -1 when the process was terminated by a signal
    #[error("Builder command failed: {command}, exit code: {code}\n{output}")]
    Backend {
        command: String,
        output: String,
        code: i32,
    },

    #[error("Image pull failed: {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Failed to calculate {name} var: {source}")]
    VarFailed {
        name: String,
        #[source]
        source: Box<KilnError>,
    },

    #[error("Failed to parse output of {name} var: {source}")]
    VarParse {
        name: String,
        #[source]
        source: ParseError,
    },

    #[error("Build cancelled")]
    Cancelled,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

/// Failures while scraping a captured command's output from a builder transcript
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("incorrect progress format {0}")]
    MalformedProgress(String),

    #[error("invalid output line format: {0}")]
    MalformedLine(String),

    #[error("failed to skip line with intermediate container hash")]
    MissingIntermediateLine,

    #[error("output is not terminated by DONE, collected: {0}")]
    Unterminated(String),

    #[error("command output is not fully parsed: no completed RUN step found")]
    NoRunStep,
}

impl KilnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Wrap an error raised while materializing a variable
    pub fn var_failed(name: impl Into<String>, source: KilnError) -> Self {
        Self::VarFailed {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownSecret { .. } => {
                Some("Declare the secret under [[secrets]] in the kiln config file")
            }
            Self::UnsupportedApiVersion { .. } => Some("Set \"apiVersion\": \"kiln/v1\""),
            Self::TargetNotFound(name) if name == "all" => {
                Some("Pass target names explicitly or declare an 'all' target")
            }
            Self::CommandFailed { .. } => Some("Is docker installed and on PATH?"),
            _ => None,
        }
    }
}
