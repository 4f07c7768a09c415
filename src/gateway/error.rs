//! Gateway error classification.

use thiserror::Error;

/// Errors returned by [`super::ClusterGateway`] implementations
///
/// Kubernetes API status codes are folded into dedicated variants so callers
/// can match on the failure class without inspecting HTTP codes.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    /// The API server does not serve the requested kind
    #[error("no matches for kind {0}")]
    NoMatch(String),
    #[error("method not supported: {0}")]
    MethodNotSupported(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("invalid object: {0}")]
    InvalidObject(String),
    #[error("kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Injected by the in-memory gateway
    #[error("{0}")]
    Injected(String),
}

impl GatewayError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout(_))
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, GatewayError::Conflict(_))
    }

    #[must_use]
    pub fn is_no_match(&self) -> bool {
        matches!(self, GatewayError::NoMatch(_))
    }

    #[must_use]
    pub fn is_method_not_supported(&self) -> bool {
        matches!(self, GatewayError::MethodNotSupported(_))
    }
}

impl From<kube::Error> for GatewayError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(api_err) if api_err.code == 404 => {
                GatewayError::NotFound(api_err.message)
            }
            kube::Error::Api(api_err) if api_err.code == 409 => {
                GatewayError::Conflict(api_err.message)
            }
            kube::Error::Api(api_err) if api_err.code == 405 => {
                GatewayError::MethodNotSupported(api_err.message)
            }
            kube::Error::Api(api_err) if api_err.code == 504 || api_err.reason == "Timeout" => {
                GatewayError::Timeout(api_err.message)
            }
            kube::Error::Discovery(discovery_err) => GatewayError::NoMatch(discovery_err.to_string()),
            other => GatewayError::Kube(other),
        }
    }
}

/// Treat a missing object as success
pub fn ignore_not_found<T: Default>(result: Result<T, GatewayError>) -> Result<T, GatewayError> {
    match result {
        Err(e) if e.is_not_found() => Ok(T::default()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_status_codes_map_to_variants() {
        assert!(GatewayError::from(api_error(404, "NotFound")).is_not_found());
        assert!(GatewayError::from(api_error(409, "Conflict")).is_conflict());
        assert!(GatewayError::from(api_error(405, "MethodNotAllowed")).is_method_not_supported());
        assert!(matches!(
            GatewayError::from(api_error(500, "InternalError")),
            GatewayError::Kube(_)
        ));
    }

    #[test]
    fn test_ignore_not_found() {
        let missing: Result<(), GatewayError> = Err(GatewayError::NotFound("x".into()));
        assert!(ignore_not_found(missing).is_ok());

        let conflict: Result<(), GatewayError> = Err(GatewayError::Conflict("x".into()));
        assert!(ignore_not_found(conflict).is_err());
    }
}
