use thiserror::Error;

/// Result type local to conclave-planner's workflow front end.
pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Core(#[from] conclave_core::error::Error),

    #[error("workflow parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("step '{step}' references unknown input '{input}'")]
    UnknownInput { step: String, input: String },

    #[error("duplicate relation name '{0}'")]
    DuplicateName(String),

    #[error("invalid workflow: {0}")]
    Workflow(String),
}
