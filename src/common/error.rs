//! Collaborator errors.

use std::time::Duration;

/// Failure of an external tool invocation. Every variant names the tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{tool} not found in PATH")]
    NotFound { tool: String },

    #[error("failed to execute {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed with exit code {code:?}: {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {timeout:?}")]
    TimedOut { tool: String, timeout: Duration },

    #[error("{tool} produced output that is not valid UTF-8")]
    InvalidOutput { tool: String },
}

impl ToolError {
    pub fn tool(&self) -> &str {
        match self {
            ToolError::NotFound { tool }
            | ToolError::Spawn { tool, .. }
            | ToolError::Failed { tool, .. }
            | ToolError::TimedOut { tool, .. }
            | ToolError::InvalidOutput { tool } => tool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_tool() {
        let err = ToolError::TimedOut {
            tool: "addr2line".to_string(),
            timeout: Duration::from_millis(50),
        };
        assert_eq!(err.tool(), "addr2line");
        assert!(err.to_string().contains("addr2line timed out"));

        let err = ToolError::Failed {
            tool: "nm".to_string(),
            code: Some(1),
            stderr: "no symbols".to_string(),
        };
        assert!(err.to_string().starts_with("nm failed"));
    }
}
