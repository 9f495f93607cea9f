//! Handler callables and what they return.
//!
//! A handler is a method on some component type `C`, erased to a closure that takes the
//! component as `&dyn Any` plus the bound [`Args`]. The dispatcher fetches the component
//! from the instance provider on every call and the closure downcasts it back.

use crate::binder::Args;
use anyhow::anyhow;
use serde_json::Value;
use std::any::{type_name, Any};
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// A downloadable payload streamed with `Content-Disposition: filename=…`
pub struct FileEntity {
    pub file_name: String,
    pub reader: Box<dyn Read + Send>,
}

impl FileEntity {
    pub fn new(file_name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            file_name: file_name.into(),
            reader: Box::new(reader),
        }
    }
}

impl fmt::Debug for FileEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntity")
            .field("file_name", &self.file_name)
            .finish_non_exhaustive()
    }
}

/// What a handler produced
#[derive(Debug)]
pub enum Reply {
    /// Serialized as JSON, or as plain text for a bare string
    Value(Value),
    Bytes(Vec<u8>),
    File(FileEntity),
    /// Nothing to add; whatever the handler wrote to its response stands
    Empty,
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Value(value)
    }
}

impl From<FileEntity> for Reply {
    fn from(file: FileEntity) -> Self {
        Reply::File(file)
    }
}

pub type HandlerResult = Result<Reply, anyhow::Error>;

/// Type-erased handler
pub type HandlerFn =
    Arc<dyn Fn(&(dyn Any + Send + Sync), &mut Args<'_>) -> HandlerResult + Send + Sync>;

// Pins the closure to a higher-ranked signature before it is boxed.
fn coerce<F>(f: F) -> F
where
    F: Fn(&(dyn Any + Send + Sync), &mut Args<'_>) -> HandlerResult + Send + Sync + 'static,
{
    f
}

/// Erase a handler on component `C`.
///
/// Invoking the result with an owner of any other type is a handler error.
pub fn erase<C, F>(f: F) -> HandlerFn
where
    C: Any + Send + Sync,
    F: Fn(&C, &mut Args<'_>) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(coerce(move |owner, args| match owner.downcast_ref::<C>() {
        Some(component) => f(component, args),
        None => Err(anyhow!(
            "handler owner is not an instance of {}",
            type_name::<C>()
        )),
    }))
}
