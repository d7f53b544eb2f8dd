use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration-specific errors
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Missing required credential: {0}")]
    MissingCredential(String),

    #[error("Invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Failures surfaced by the repository facade.
///
/// The facade never retries internally; callers decide whether an error is
/// transient and isolate each unit of work so one failure never aborts a
/// whole migration run.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RepositoryError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("repository rate limit hit")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("repository transport failure: {0}")]
    Transport(String),

    #[error("repository API rejected the request: HTTP {status}")]
    Api { status: u16, body: String },
}

impl RepositoryError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Network and rate-limit failures; a later identical call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotFound { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for RepositoryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Error, Diagnostic, Debug)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    #[diagnostic(code(recast::config))]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(
        code(recast::repository),
        help("Check connectivity and credentials for the content repository")
    )]
    Repository(#[from] RepositoryError),

    #[error("source item {codename} not found in any language")]
    #[diagnostic(
        code(recast::source_not_found),
        help("Languages tried: {}", languages_tried.join(", "))
    )]
    SourceNotFound {
        codename: String,
        languages_tried: Vec<String>,
    },

    #[error("target schema for {type_codename} is invalid: {detail}")]
    #[diagnostic(code(recast::target_schema_invalid))]
    TargetSchemaInvalid {
        type_codename: String,
        detail: String,
    },

    #[error("could not rewrite reference in {item_codename}.{field}: {detail}")]
    #[diagnostic(
        code(recast::reference_resolution),
        help("The old or new reference codename could not be resolved; sibling references proceed")
    )]
    ReferenceResolution {
        item_codename: String,
        field: String,
        detail: String,
    },

    #[error("migrated codename {codename} is already claimed by {first_source}")]
    #[diagnostic(
        code(recast::codename_collision),
        help("Two selected items sanitize to the same migrated codename; rename one of the sources")
    )]
    CodenameCollision {
        codename: String,
        first_source: String,
        second_source: String,
    },

    #[error("publish failed for {item_id}: {detail}")]
    #[diagnostic(code(recast::publish_failure))]
    PublishFailure { item_id: String, detail: String },

    #[error("migration plan is invalid: {reason}")]
    #[diagnostic(
        code(recast::invalid_plan),
        help("A run only aborts before it starts; fix the plan and retry")
    )]
    InvalidPlan { reason: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
