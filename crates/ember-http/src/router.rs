use std::{
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Error};
use bytes::Bytes;
use thiserror::Error;
use tracing::{event, Level};

use crate::{listing, Method, Request, ServerConfig, StatusCode};

/// What a request resolved to.
#[derive(Debug)]
pub enum Route {
    /// Respond with only a status line and headers.
    Status(StatusCode),
    /// Send an opened file.
    File {
        file: File,
        len: usize,
        head_only: bool,
    },
    /// Send a generated directory listing.
    Listing { body: Bytes, head_only: bool },
    /// Receive the request body into an opened file.
    Upload { file: File, len: usize },
}

/// A request path resolved under the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    File(PathBuf),
    Directory(PathBuf),
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("path escapes the document root")]
    Traversal,
    #[error("resource not found")]
    NotFound,
    #[error("resource not accessible")]
    Inaccessible(#[from] io::Error),
}

impl ResolveError {
    pub fn status(&self) -> StatusCode {
        match self {
            ResolveError::Traversal => StatusCode::FORBIDDEN,
            ResolveError::NotFound => StatusCode::NOT_FOUND,
            ResolveError::Inaccessible(error) => access_status(error),
        }
    }
}

/// Decide how to answer a request.
///
/// Returns `Err` only for local failures that leave no sensible response.
pub fn route(request: &Request, config: &ServerConfig) -> Result<Route, Error> {
    event!(Level::DEBUG, method = request.method.as_str(), path = %request.path, "routing");

    match request.method {
        Method::Get => route_get(request, config, false),
        Method::Head => route_get(request, config, true),
        Method::Put => route_put(request, config),
        Method::Post | Method::Delete | Method::Connect | Method::Options | Method::Trace => {
            Ok(Route::Status(StatusCode::METHOD_NOT_ALLOWED))
        }
        Method::Unknown => Ok(Route::Status(StatusCode::BAD_REQUEST)),
    }
}

fn route_get(request: &Request, config: &ServerConfig, head_only: bool) -> Result<Route, Error> {
    let resolved = match resolve(&config.root, &request.path, &config.index_file) {
        Ok(resolved) => resolved,
        Err(ResolveError::Inaccessible(error)) => {
            return Ok(Route::Status(inaccessible(&request.path, &error)))
        }
        Err(error) => return Ok(Route::Status(error.status())),
    };

    match resolved {
        Resolved::File(path) => {
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(error) => return Ok(Route::Status(inaccessible(&request.path, &error))),
            };

            let len = file.metadata().context("failed to stat opened file")?.len();
            let len = usize::try_from(len).context("file too large")?;

            Ok(Route::File {
                file,
                len,
                head_only,
            })
        }
        Resolved::Directory(path) => {
            let page = listing::render(&path, &request.path)
                .context("failed to render directory listing")?;

            Ok(Route::Listing {
                body: Bytes::from(page),
                head_only,
            })
        }
    }
}

fn route_put(request: &Request, config: &ServerConfig) -> Result<Route, Error> {
    if has_parent_segment(&request.path) {
        return Ok(Route::Status(StatusCode::FORBIDDEN));
    }

    // Without a length there's no way to tell where the body ends
    let Some(len) = request.content_length else {
        event!(Level::WARN, path = %request.path, "upload without content length");
        return Ok(Route::Status(StatusCode::BAD_REQUEST));
    };

    let relative = request.path.trim_start_matches('/');
    let target = config.root.join(relative);
    if relative.is_empty() || request.path.ends_with('/') || target.is_dir() {
        return Ok(Route::Status(StatusCode::BAD_REQUEST));
    }

    let result = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&target);
    let file = match result {
        Ok(file) => file,
        Err(error) => return Ok(Route::Status(inaccessible(&request.path, &error))),
    };

    Ok(Route::Upload { file, len })
}

/// Resolve a request path to a file or directory under `root`.
///
/// Paths without extension first try the index file inside them.
pub fn resolve(root: &Path, request_path: &str, index_file: &str) -> Result<Resolved, ResolveError> {
    if has_parent_segment(request_path) {
        return Err(ResolveError::Traversal);
    }

    let target = root.join(request_path.trim_start_matches('/'));

    if target.extension().is_none() {
        let index = target.join(index_file);
        let is_file = fs::metadata(&index).map(|m| m.is_file()).unwrap_or(false);
        if is_file {
            return Ok(Resolved::File(index));
        }
    }

    match fs::metadata(&target) {
        Ok(metadata) if metadata.is_dir() => Ok(Resolved::Directory(target)),
        Ok(_) => Ok(Resolved::File(target)),
        Err(error) if error.kind() == ErrorKind::NotFound => Err(ResolveError::NotFound),
        Err(error) => Err(error.into()),
    }
}

/// Status for a client-named path that can't be opened.
///
/// Paths that are malformed, too long or run through a regular file name nothing, same as
/// paths that don't exist.
fn access_status(error: &io::Error) -> StatusCode {
    match error.kind() {
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        _ => StatusCode::NOT_FOUND,
    }
}

fn inaccessible(path: &str, error: &io::Error) -> StatusCode {
    if error.kind() != ErrorKind::NotFound {
        event!(Level::DEBUG, path, ?error, "path not accessible");
    }
    access_status(error)
}

fn has_parent_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}
