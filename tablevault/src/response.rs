//! Uniform outcome of backup and restore calls.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Outcome of a backup or restore call.
///
/// Orchestrators never return errors, every failure is folded into
/// `error = true` plus a descriptive message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResponse {
    /// Whether the operation failed.
    pub error: bool,
    /// What happened.
    pub message: String,
}

impl OperationResponse {
    /// Successful outcome.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            error: false,
            message: message.into(),
        }
    }

    /// Failed outcome.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
        }
    }
}

impl From<Result<String>> for OperationResponse {
    fn from(value: Result<String>) -> Self {
        match value {
            Ok(message) => OperationResponse::success(message),
            Err(e) => OperationResponse::failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, ErrorKind};

    #[test]
    fn test_from_result() {
        let ok: Result<String> = Ok("done".to_string());
        assert_eq!(OperationResponse::from(ok), OperationResponse::success("done"));

        let err: Result<String> = Err(Error::new(ErrorKind::NotFound, "no backup"));
        let response = OperationResponse::from(err);
        assert!(response.error);
        assert_eq!(response.message, "NotFoundError => no backup");
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_string(&OperationResponse::failure("boom")).unwrap();
        assert_eq!(json, r#"{"error":true,"message":"boom"}"#);
    }
}
