//! Request-level failures and their HTTP status.

use crate::binder::BindingError;
use http::Method;
use std::fmt;

/// Why a request did not produce a normal response.
///
/// Classified exactly once, at the top of [`Dispatcher::dispatch`](crate::dispatcher::Dispatcher::dispatch).
#[derive(Debug)]
pub enum ServeError {
    NotFound,
    MethodNotAllowed { allowed: Vec<Method> },
    Binding(BindingError),
    /// Handler error (or panic) not consumed by an exception handler
    Handler(anyhow::Error),
}

impl ServeError {
    /// Status code the client sees.
    ///
    /// A handler error whose cause chain holds a conversion failure is still the
    /// client's fault and maps to 400.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            ServeError::NotFound => 404,
            ServeError::MethodNotAllowed { .. } => 405,
            ServeError::Binding(e) if e.is_client_error() => 400,
            ServeError::Binding(_) => 500,
            ServeError::Handler(e) => {
                let client_fault = e
                    .chain()
                    .filter_map(|c| c.downcast_ref::<BindingError>())
                    .any(BindingError::is_client_error);
                if client_fault {
                    400
                } else {
                    500
                }
            }
        }
    }
}

impl fmt::Display for ServeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServeError::NotFound => write!(f, "not found"),
            ServeError::MethodNotAllowed { allowed } => {
                write!(f, "method not allowed (allowed: {allowed:?})")
            }
            ServeError::Binding(e) => write!(f, "argument binding failed: {e}"),
            ServeError::Handler(e) => write!(f, "handler failed: {e:#}"),
        }
    }
}

impl std::error::Error for ServeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServeError::Binding(e) => Some(e),
            ServeError::Handler(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<BindingError> for ServeError {
    fn from(e: BindingError) -> Self {
        ServeError::Binding(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{convert, Shape};

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServeError::NotFound.status(), 404);
        assert_eq!(
            ServeError::MethodNotAllowed { allowed: vec![Method::GET] }.status(),
            405
        );
        assert_eq!(
            ServeError::Binding(BindingError::DuplicateResponse).status(),
            500
        );
        assert_eq!(
            ServeError::Handler(anyhow::anyhow!("boom")).status(),
            500
        );
    }

    #[test]
    fn test_conversion_inside_handler_error_is_400() {
        let conversion = convert("query parameter", "x", Shape::Integer).unwrap_err();
        let err = anyhow::Error::new(conversion).context("loading page");
        assert_eq!(ServeError::Handler(err).status(), 400);
    }
}
