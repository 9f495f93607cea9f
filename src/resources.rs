//! Resource namespaces and content types.
//!
//! Three namespaces can answer a path outside the route table:
//!
//! - the **project** namespace (the configured public directory),
//! - the **packaged default** namespace compiled into the binary, consulted only for
//!   the index page and the favicon,
//! - the **static** namespace behind the static prefix.
//!
//! All of them implement [`ResourceResolver`]. A miss is an `io::Error` of kind
//! `NotFound`; any other error kind is a real failure.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Lookup of a resource by URL path
pub trait ResourceResolver: Send + Sync {
    /// Bytes of the resource at `path` (leading `/` optional).
    ///
    /// # Errors
    ///
    /// `NotFound` on a miss; anything else is a read failure.
    fn lookup(&self, path: &str) -> io::Result<Vec<u8>>;
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no resource at {path}"))
}

/// Files under a base directory.
///
/// URL paths are mapped component by component; `..`, roots and prefixes are
/// refused, so a lookup can never leave the base directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }
}

impl ResourceResolver for StaticFiles {
    fn lookup(&self, path: &str) -> io::Result<Vec<u8>> {
        let file = self.map_path(path).ok_or_else(|| not_found(path))?;
        if !file.is_file() {
            return Err(not_found(path));
        }
        fs::read(file)
    }
}

/// Resources compiled into the binary
#[derive(Debug, Clone, Default)]
pub struct EmbeddedResources {
    entries: HashMap<String, &'static [u8]>,
}

impl EmbeddedResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The packaged default index page and favicon
    #[must_use]
    pub fn packaged_defaults() -> Self {
        let mut resources = Self::new();
        resources.insert(
            "/index.html",
            include_bytes!("../resources/default/index.html"),
        );
        resources.insert(
            "/favicon.ico",
            include_bytes!("../resources/default/favicon.ico"),
        );
        resources
    }

    pub fn insert(&mut self, path: &str, bytes: &'static [u8]) {
        self.entries.insert(normalize(path), bytes);
    }
}

impl ResourceResolver for EmbeddedResources {
    fn lookup(&self, path: &str) -> io::Result<Vec<u8>> {
        self.entries
            .get(&normalize(path))
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| not_found(path))
    }
}

fn normalize(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// MIME type for a file extension (case-insensitive)
#[must_use]
pub fn mime_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "css" => "text/css",
        "png" => "image/png",
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "js" => "application/x-javascript",
        "txt" => "text/plain",
        "html" => "text/html",
        "json" => "text/json",
        "xml" => "text/xml",
        "gif" => "image/gif",
        "cgm" => "image/cgm",
        "ico" => "image/x-icon",
        "doc" => "application/msword",
        "pdf" => "application/pdf",
        "ai" | "eps" | "ps" => "application/postscript",
        "ppt" => "application/powerpoint",
        "rtf" => "application/rtf",
        "z" => "application/x-compress",
        "gz" => "application/x-gzip",
        "gtar" => "application/x-gtar",
        "swf" => "application/x-shockwave-flash",
        "tar" => "application/x-tar",
        "zip" => "application/zip",
        "au" | "snd" => "audio/basic",
        "mpeg" | "mp2" => "audio/mpeg",
        "mid" | "midi" | "rmf" => "audio/x-aiff",
        "ram" | "ra" => "audio/x-pn-realaudio",
        "rpm" => "audio/x-pn-realaudio-plugin",
        "wav" => "audio/x-wav",
        _ => "application/octet-stream",
    }
}

/// Content type for a resource path, with `; charset=utf-8` on textual types
#[must_use]
pub fn content_type_for(path: &str) -> String {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let mime = mime_type(extension);
    if mime.starts_with("text/") || mime == "application/x-javascript" {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}
