use thiserror::Error;

use crate::types::MethodId;

/// Failures reported by a [`HookEngine`](crate::HookEngine) when asked to
/// intercept something.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("{0} is already intercepted")]
    AlreadyAttached(String),

    #[error("interception target not found: {0}")]
    TargetNotFound(String),

    #[error("engine cannot intercept {target}: {reason}")]
    Rejected { target: String, reason: String },

    #[error("operation not supported by this engine: {0}")]
    Unsupported(String),
}

impl HookError {
    /// Short, stable name of the failure, used in installer diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            HookError::AlreadyAttached(_) => "HookError::AlreadyAttached",
            HookError::TargetNotFound(_) => "HookError::TargetNotFound",
            HookError::Rejected { .. } => "HookError::Rejected",
            HookError::Unsupported(_) => "HookError::Unsupported",
        }
    }
}

/// Failures of the corrected caller-module operation.
///
/// These propagate to whoever asked "which module is my caller": returning a
/// guessed module would be worse than failing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntrospectionError {
    #[error("marker frame {0} not found on the current stack")]
    MarkerNotFound(MethodId),

    #[error("no caller frame past marker {0}")]
    NoCaller(MethodId),

    #[error("module of caller frame is unknown (method {0:?})")]
    UnknownModule(Option<MethodId>),

    #[error("detour for caller-module correction is not ready")]
    DetourNotReady,
}

impl IntrospectionError {
    pub fn kind(&self) -> &'static str {
        match self {
            IntrospectionError::MarkerNotFound(_) => "IntrospectionError::MarkerNotFound",
            IntrospectionError::NoCaller(_) => "IntrospectionError::NoCaller",
            IntrospectionError::UnknownModule(_) => "IntrospectionError::UnknownModule",
            IntrospectionError::DetourNotReady => "IntrospectionError::DetourNotReady",
        }
    }
}
