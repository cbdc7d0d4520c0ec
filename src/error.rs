use thiserror::Error;

/// Failure taxonomy shared by every endpoint.
///
/// Each variant maps onto one HTTP status; the embedding router only needs
/// [`ServiceError::status`] and [`ServiceError::to_body`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed input: bad JSON, missing fields, base64 or signature
    /// failures, non-canonical ballots, conflicting resubmissions.
    #[error("{0}")]
    BadRequest(String),

    /// The voter is not entitled to the operation right now.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("POST required")]
    MethodNotAllowed,

    /// Database or key-handling failure. The cause is logged server-side and
    /// never serialized into the response body.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::Forbidden(_) => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::MethodNotAllowed => 405,
            ServiceError::Internal(_) => 500,
        }
    }

    /// JSON body of the error response, `{"error": "<message>"}`.
    pub fn to_body(&self) -> serde_json::Value {
        let message = match self {
            ServiceError::Internal(e) => {
                log::error!("internal error: {e:#}");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        serde_json::json!({ "error": message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(ServiceError::BadRequest("x".into()).status(), 400);
        assert_eq!(ServiceError::Forbidden("x".into()).status(), 403);
        assert_eq!(ServiceError::NotFound("x".into()).status(), 404);
        assert_eq!(ServiceError::MethodNotAllowed.status(), 405);
        assert_eq!(
            ServiceError::Internal(anyhow::anyhow!("db down")).status(),
            500
        );
    }

    #[test]
    fn internal_causes_are_not_leaked() {
        let err = ServiceError::Internal(anyhow::anyhow!("connection refused at 10.0.0.7"));
        let body = err.to_body();
        assert_eq!(body["error"], "internal error");
    }
}
