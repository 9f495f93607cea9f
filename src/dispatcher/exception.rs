use crate::handler::HandlerResult;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Decides whether an exception handler applies to an error
#[derive(Clone, Copy)]
pub struct ErrorMatcher {
    name: &'static str,
    test: fn(&anyhow::Error) -> bool,
}

fn holds<E>(err: &anyhow::Error) -> bool
where
    E: std::error::Error + Send + Sync + 'static,
{
    err.is::<E>() || err.chain().any(|cause| cause.is::<E>())
}

fn always(_: &anyhow::Error) -> bool {
    true
}

impl ErrorMatcher {
    /// Matches when `E` is the error or anywhere in its cause chain
    #[must_use]
    pub fn of<E>() -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            name: type_name::<E>(),
            test: holds::<E>,
        }
    }

    /// Matches every error
    #[must_use]
    pub fn any() -> Self {
        Self {
            name: "*",
            test: always,
        }
    }

    #[must_use]
    pub fn matches(&self, err: &anyhow::Error) -> bool {
        (self.test)(err)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

type ExceptionFn =
    Arc<dyn Fn(&(dyn Any + Send + Sync), &anyhow::Error) -> HandlerResult + Send + Sync>;

fn coerce<F>(f: F) -> F
where
    F: Fn(&(dyn Any + Send + Sync), &anyhow::Error) -> HandlerResult + Send + Sync + 'static,
{
    f
}

/// Replaces a handler's error with a result of its own.
///
/// Consulted in registration order; the first whose matcher set accepts the error
/// runs, once. Its result (or its own error) stands as the request's outcome.
pub struct ExceptionHandler {
    matchers: Vec<ErrorMatcher>,
    owner: TypeId,
    owner_name: &'static str,
    handler: ExceptionFn,
}

/// Builder returned by [`ExceptionHandler::new`]
#[derive(Debug, Default)]
pub struct ExceptionHandlerBuilder {
    matchers: Vec<ErrorMatcher>,
}

impl ExceptionHandlerBuilder {
    #[must_use]
    pub fn catches<E>(mut self) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.matchers.push(ErrorMatcher::of::<E>());
        self
    }

    #[must_use]
    pub fn catches_any(mut self) -> Self {
        self.matchers.push(ErrorMatcher::any());
        self
    }

    /// Finish with a handler that is a method on component `C`.
    pub fn handler<C, F>(self, f: F) -> ExceptionHandler
    where
        C: Any + Send + Sync,
        F: Fn(&C, &anyhow::Error) -> HandlerResult + Send + Sync + 'static,
    {
        let handler = coerce(move |owner, err| match owner.downcast_ref::<C>() {
            Some(component) => f(component, err),
            None => Err(anyhow::anyhow!(
                "exception handler owner is not an instance of {}",
                type_name::<C>()
            )),
        });
        ExceptionHandler {
            matchers: self.matchers,
            owner: TypeId::of::<C>(),
            owner_name: type_name::<C>(),
            handler: Arc::new(handler),
        }
    }
}

impl ExceptionHandler {
    #[allow(clippy::new_ret_no_self)]
    #[must_use]
    pub fn new() -> ExceptionHandlerBuilder {
        ExceptionHandlerBuilder::default()
    }

    #[must_use]
    pub fn matches(&self, err: &anyhow::Error) -> bool {
        self.matchers.iter().any(|m| m.matches(err))
    }

    #[must_use]
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    #[must_use]
    pub fn owner_name(&self) -> &'static str {
        self.owner_name
    }

    /// Run the handler against `err` with its owning component.
    ///
    /// # Errors
    ///
    /// Whatever the handler returns.
    pub fn invoke(&self, owner: &(dyn Any + Send + Sync), err: &anyhow::Error) -> HandlerResult {
        (self.handler)(owner, err)
    }
}

impl fmt::Debug for ExceptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionHandler")
            .field("matchers", &self.matchers)
            .field("owner", &self.owner_name)
            .finish()
    }
}
