//! Guestbook demo application.
//!
//! A small component wired through every binding capability, served by the
//! `brrtserve` binary and used by the integration tests:
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /api/hello?name=&times=` | greeting; `times` must be an integer |
//! | `GET /api/entries` | every stored entry |
//! | `POST /api/entries` | store the `text` form attribute inside a transaction |
//! | `GET /api/entries/export` | entries as a `guestbook.txt` download |
//! | `GET /api/entries/{index}` | one entry, 404 body when out of range |
//! | `GET /api/users/{user}/posts/{post}` | echoes both path variables |
//! | `POST /api/upload` | metadata of the `upload` multipart file |
//! | `GET,POST /api/echo` | raw body and `X-Echo` header |
//!
//! Entries live in an in-memory store reached through the connection [`Pool`], so the
//! pool and [`Transaction`](crate::pool::Transaction) paths see real traffic.

use crate::binder::{Args, ParamSpec, Shape};
use crate::dispatcher::ExceptionHandler;
use crate::handler::{FileEntity, HandlerResult, Reply};
use crate::pool::{ConnectionManager, Pool, PoolConfig, PoolError};
use crate::router::{Route, RouteDef};
use http::Method;
use may::sync::Mutex;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::fmt;
use std::io::Cursor;
use std::sync::{Arc, PoisonError};
use tracing::{debug, info};

/// Errors the guestbook handlers raise for the exception handler to translate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestbookError {
    EmptyEntry,
    EntryTooLong { length: usize, limit: usize },
    MissingUpload(String),
}

impl fmt::Display for GuestbookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestbookError::EmptyEntry => write!(f, "entry text is empty"),
            GuestbookError::EntryTooLong { length, limit } => {
                write!(f, "entry is {length} characters, limit is {limit}")
            }
            GuestbookError::MissingUpload(field) => write!(f, "no file in field '{field}'"),
        }
    }
}

impl std::error::Error for GuestbookError {}

/// Longest accepted entry, in characters
pub const MAX_ENTRY_CHARS: usize = 280;

type Entries = Arc<Mutex<Vec<String>>>;

/// Opens connections onto the shared in-memory entry list
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Entries,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// One pooled handle; writes made inside a transaction stay pending until commit
#[derive(Debug)]
pub struct MemoryConnection {
    entries: Entries,
    pending: Vec<String>,
    in_transaction: bool,
}

impl MemoryConnection {
    pub fn insert(&mut self, entry: String) {
        if self.in_transaction {
            self.pending.push(entry);
        } else {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(entry);
        }
    }

    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ConnectionManager for MemoryStore {
    type Connection = MemoryConnection;
    type Error = Infallible;

    fn connect(&self) -> Result<MemoryConnection, Infallible> {
        Ok(MemoryConnection {
            entries: Arc::clone(&self.entries),
            pending: Vec::new(),
            in_transaction: false,
        })
    }

    fn reset(&self, conn: &mut MemoryConnection) -> Result<(), Infallible> {
        conn.pending.clear();
        conn.in_transaction = false;
        Ok(())
    }

    fn begin(&self, conn: &mut MemoryConnection) -> Result<(), Infallible> {
        conn.in_transaction = true;
        Ok(())
    }

    fn commit(&self, conn: &mut MemoryConnection) -> Result<(), Infallible> {
        let pending = std::mem::take(&mut conn.pending);
        conn.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(pending);
        conn.in_transaction = false;
        Ok(())
    }

    fn rollback(&self, conn: &mut MemoryConnection) -> Result<(), Infallible> {
        self.reset(conn)
    }
}

/// The guestbook component
pub struct Guestbook {
    pool: Pool<MemoryStore>,
}

impl Guestbook {
    /// # Errors
    ///
    /// Fails if the pool cannot prefill `min_connections`.
    pub fn new(pool_config: PoolConfig) -> Result<Self, PoolError<Infallible>> {
        Ok(Self {
            pool: Pool::new(MemoryStore::new(), pool_config)?,
        })
    }

    #[must_use]
    pub fn pool(&self) -> &Pool<MemoryStore> {
        &self.pool
    }

    fn hello(&self, args: &mut Args<'_>) -> HandlerResult {
        let name = args.text(0).unwrap_or("world").to_string();
        let times = args.value::<u64>(1)?.unwrap_or(1);
        let greeting = vec![format!("Hello, {name}!"); times.min(10) as usize].join(" ");
        Ok(json!({ "message": greeting }).into())
    }

    fn entries(&self, args: &mut Args<'_>) -> HandlerResult {
        let is_post = args.request(3).is_some_and(|r| r.method == Method::POST);
        if is_post {
            self.create(args)
        } else {
            self.list()
        }
    }

    fn list(&self) -> HandlerResult {
        let conn = self.pool.acquire()?;
        let entries = conn.entries();
        Ok(json!({ "count": entries.len(), "entries": entries }).into())
    }

    fn create(&self, args: &mut Args<'_>) -> HandlerResult {
        let text = args.text(0).map(str::trim).unwrap_or_default().to_string();
        if text.is_empty() {
            return Err(GuestbookError::EmptyEntry.into());
        }
        let length = text.chars().count();
        if length > MAX_ENTRY_CHARS {
            return Err(GuestbookError::EntryTooLong {
                length,
                limit: MAX_ENTRY_CHARS,
            }
            .into());
        }

        let mut tx = self.pool.begin()?;
        tx.connection().insert(text.clone());
        tx.commit()?;

        let posted = match args.session(1) {
            Some(handle) => {
                let mut session = handle.lock().unwrap_or_else(PoisonError::into_inner);
                let posted = session
                    .attribute("posted")
                    .and_then(Value::as_u64)
                    .unwrap_or(0)
                    + 1;
                session.set_attribute("posted", json!(posted));
                posted
            }
            None => 1,
        };
        if let Some(res) = args.response(2) {
            res.set_status(201);
        }
        info!(posted, "Guestbook entry stored");
        Ok(json!({ "entry": text, "posted_this_session": posted }).into())
    }

    fn export(&self, _args: &mut Args<'_>) -> HandlerResult {
        let conn = self.pool.acquire()?;
        let mut text = conn.entries().join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        Ok(FileEntity::new("guestbook.txt", Cursor::new(text.into_bytes())).into())
    }

    fn entry(&self, args: &mut Args<'_>) -> HandlerResult {
        let index = args.value::<usize>(0)?.unwrap_or_default();
        let entries = self.pool.acquire()?.entries();
        match entries.get(index) {
            Some(entry) => Ok(json!({ "index": index, "entry": entry }).into()),
            None => {
                if let Some(res) = args.response(1) {
                    res.set_status(404);
                }
                Ok(json!({ "error": "no such entry", "index": index, "count": entries.len() }).into())
            }
        }
    }

    fn post(&self, args: &mut Args<'_>) -> HandlerResult {
        let user = args.value::<i64>(0)?;
        let post = args.value::<i64>(1)?;
        Ok(json!({ "user": user, "post": post }).into())
    }

    fn upload(&self, args: &mut Args<'_>) -> HandlerResult {
        let note = args.text(1).map(str::to_string);
        let file = args
            .file(0)
            .ok_or_else(|| GuestbookError::MissingUpload("upload".to_string()))?;
        debug!(file_name = %file.file_name, size = file.size(), "Upload received");
        Ok(json!({
            "field": file.field_name,
            "file_name": file.file_name,
            "content_type": file.content_type,
            "size": file.size(),
            "note": note,
        })
        .into())
    }

    fn echo(&self, args: &mut Args<'_>) -> HandlerResult {
        let method = args
            .request(0)
            .map(|r| r.method.to_string())
            .unwrap_or_default();
        // never reflect line breaks into a response header
        let tag = args
            .text(2)
            .map(|t| t.chars().filter(|c| *c != '\r' && *c != '\n').collect::<String>());
        if let (Some(tag), Some(res)) = (tag.as_deref(), args.response(3)) {
            res.set_header("X-Echo", tag);
        }
        match args.raw(1) {
            Some(body) => Ok(json!({ "method": method, "body": body }).into()),
            None => Ok(Reply::Value(Value::String(format!("{method} with no body")))),
        }
    }

    /// Exception handler: validation failures become a JSON rejection
    fn rejected(&self, err: &anyhow::Error) -> HandlerResult {
        Ok(json!({ "rejected": true, "reason": err.to_string() }).into())
    }
}

/// The guestbook routes, in registration order
#[must_use]
pub fn routes() -> Vec<RouteDef> {
    vec![
        Route::new("/api/hello", &[Method::GET])
            .param(ParamSpec::query("name", Shape::Text))
            .param(ParamSpec::query("times", Shape::Integer))
            .handler(Guestbook::hello),
        Route::new("/api/entries", &[Method::GET, Method::POST])
            .param(ParamSpec::attribute("text", Shape::Text))
            .param(ParamSpec::session())
            .param(ParamSpec::response())
            .param(ParamSpec::request())
            .handler(Guestbook::entries),
        // Registered before `{index}`, which would otherwise capture it
        Route::new("/api/entries/export", &[Method::GET]).handler(Guestbook::export),
        Route::new("/api/entries/{index}", &[Method::GET])
            .param(ParamSpec::path("index", Shape::Integer))
            .param(ParamSpec::response())
            .handler(Guestbook::entry),
        Route::new("/api/users/{user}/posts/{post}", &[Method::GET])
            .param(ParamSpec::path("user", Shape::Integer))
            .param(ParamSpec::path("post", Shape::Integer))
            .handler(Guestbook::post),
        Route::new("/api/upload", &[Method::POST])
            .param(ParamSpec::file("upload"))
            .param(ParamSpec::attribute("note", Shape::Text))
            .handler(Guestbook::upload),
        Route::new("/api/echo", &[Method::GET, Method::POST])
            .param(ParamSpec::request())
            .param(ParamSpec::body(Shape::Json))
            .param(ParamSpec::header("X-Echo", Shape::Text))
            .param(ParamSpec::response())
            .handler(Guestbook::echo),
    ]
}

/// Exception handlers, in precedence order
#[must_use]
pub fn exception_handlers() -> Vec<ExceptionHandler> {
    vec![ExceptionHandler::new()
        .catches::<GuestbookError>()
        .handler(Guestbook::rejected)]
}
