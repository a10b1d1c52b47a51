//! Preview server for a built site.

use std::io;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Router,
};
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::{debug, info, warn};

use crate::error::{Result, SiteError};

/// Maximum number of consecutive ports to try before giving up.
const MAX_PORT_ATTEMPTS: u16 = 100;

/// Maximum file size that will be read and served (16 MiB).
pub const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Shared state passed to the request handler via `Arc<AppState>`.
pub struct AppState {
    /// Directory holding the built site.
    pub serve_root: PathBuf,
    /// Canonicalized `serve_root` used for symlink-safe containment checks.
    pub canonical_root: PathBuf,
}

/// Attempt to bind a TCP listener on `bind_addr` starting at `start_port`.
///
/// On `EADDRINUSE` the port is incremented by one and the attempt is retried up
/// to `MAX_PORT_ATTEMPTS` times. Any other OS error fails immediately.
pub fn bind_with_retry(bind_addr: &str, start_port: u16) -> Result<(TcpListener, u16)> {
    let mut port = start_port;
    for _ in 0..MAX_PORT_ATTEMPTS {
        let addr = format!("{}:{}", bind_addr, port);
        match TcpListener::bind(&addr) {
            Ok(listener) => {
                debug!(port, "bind succeeded");
                return Ok((listener, port));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                let next = port.wrapping_add(1);
                debug!(port, next, "address in use");
                port = next;
            }
            Err(e) => {
                return Err(SiteError::Bind(format!("{}:{}: {}", bind_addr, port, e)));
            }
        }
    }
    Err(SiteError::Bind(format!(
        "exhausted {} port candidates starting at {}; all ports in use",
        MAX_PORT_ATTEMPTS, start_port,
    )))
}

// ---------------------------------------------------------------------------
// Path resolution helpers
// ---------------------------------------------------------------------------

/// Percent-decode a URL path byte-by-byte (RFC 3986 §2.1).
///
/// Returns `None` if the encoding is malformed (truncated `%XX` sequence or
/// non-hex digit) or if the decoded bytes are not valid UTF-8.
pub fn percent_decode(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return None;
            }
            let hi = hex_digit(bytes[i + 1])?;
            let lo = hex_digit(bytes[i + 2])?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Normalize a decoded URL path, stripping `.` and `..` components.
///
/// Returns `None` if a `..` would escape the root.
pub fn normalize_path(decoded: &str) -> Option<PathBuf> {
    let mut parts: Vec<&str> = Vec::new();
    for component in decoded.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            name => parts.push(name),
        }
    }
    Some(parts.iter().collect())
}

/// `Content-Type` for a file extension (case-insensitive).
pub fn mime_for_ext(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Resolve a candidate path to an existing file.
///
/// Order: the exact file, `index.html` inside a directory, then `.html`
/// appended to an extensionless path. Returns the path and the branch taken.
async fn resolve_candidate(candidate: &Path) -> Option<(PathBuf, &'static str)> {
    match tokio::fs::metadata(candidate).await {
        Ok(meta) if meta.is_file() => return Some((candidate.to_path_buf(), "exact")),
        Ok(meta) if meta.is_dir() => {
            let index = candidate.join("index.html");
            return is_file(&index).await.then_some((index, "index"));
        }
        _ => {}
    }

    if candidate.extension().is_none() {
        let with_html = candidate.with_extension("html");
        if is_file(&with_html).await {
            return Some((with_html, "extensionless"));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn plain_response(status: StatusCode, body: String) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(Body::from(body))
        .expect("plain response builder is infallible")
}

fn not_found_response() -> Response {
    plain_response(StatusCode::NOT_FOUND, "Not Found".to_owned())
}

fn too_large_response(path: &str, size: u64) -> Response {
    plain_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        format!(
            "Content Too Large: {} ({} bytes exceeds {} byte limit)",
            path, size, MAX_FILE_SIZE
        ),
    )
}

fn whole_seconds(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Whether `If-Modified-Since` says the client copy is still current.
fn not_modified_since(headers: &HeaderMap, modified: SystemTime) -> bool {
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
        .map(|since| whole_seconds(modified) <= whole_seconds(since))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Request handler
// ---------------------------------------------------------------------------

/// Resolve the request path inside the serve root and return the file.
///
/// Percent-decode, reject null bytes, normalise (rejecting traversal above
/// the root), apply fallbacks, canonicalise and re-check containment, guard
/// the size, then honour `If-Modified-Since`. Every response carries
/// `X-Content-Type-Options: nosniff`.
async fn serve_handler(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let raw_path = req.uri().path().to_owned();

    let Some(decoded) = percent_decode(&raw_path) else {
        debug!(path = %raw_path, reason = "invalid-percent-encoding", "denied");
        return not_found_response();
    };
    if decoded.contains('\0') {
        debug!(path = %raw_path, reason = "null-byte", "denied");
        return not_found_response();
    }
    let Some(normalized) = normalize_path(&decoded) else {
        debug!(path = %raw_path, reason = "path-traversal", "denied");
        return not_found_response();
    };
    let norm_display = normalized.display().to_string();

    let candidate = state.serve_root.join(&normalized);
    let Some((resolved, branch)) = resolve_candidate(&candidate).await else {
        debug!(path = %norm_display, reason = "not-found", "denied");
        return not_found_response();
    };

    let canonical = match tokio::fs::canonicalize(&resolved).await {
        Ok(c) => c,
        Err(_) => return not_found_response(),
    };
    if !canonical.starts_with(&state.canonical_root) {
        warn!(path = %norm_display, canonical = %canonical.display(), "denied: outside serve root");
        return not_found_response();
    }

    let meta = match tokio::fs::metadata(&canonical).await {
        Ok(m) => m,
        Err(_) => return not_found_response(),
    };
    let size = meta.len();
    if size > MAX_FILE_SIZE {
        debug!(path = %norm_display, size, reason = "too-large", "denied");
        return too_large_response(&norm_display, size);
    }

    let modified = meta.modified().ok();
    if let Some(modified) = modified {
        if not_modified_since(req.headers(), modified) {
            debug!(path = %norm_display, "not modified");
            return Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
                .body(Body::empty())
                .expect("304 response builder is infallible");
        }
    }

    let bytes = match tokio::fs::read(&canonical).await {
        Ok(b) => b,
        Err(_) => return not_found_response(),
    };
    debug!(path = %norm_display, branch, size, "serving");

    let ext = canonical
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_for_ext(ext))
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff");
    if let Some(modified) = modified {
        builder = builder.header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified));
    }
    builder
        .body(Body::from(bytes))
        .expect("file response builder is infallible")
}

/// Router serving `state.serve_root`, with gzip/brotli compression.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(serve_handler)
        .layer(CompressionLayer::new())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Serve `serve_root` on `bind_addr`, starting at `start_port` and retrying on
/// `EADDRINUSE`. Shuts down cleanly on Ctrl+C.
pub async fn run_serve(serve_root: PathBuf, bind_addr: &str, start_port: u16) -> Result<()> {
    let canonical_root =
        std::fs::canonicalize(&serve_root).map_err(|e| SiteError::io(&serve_root, e))?;
    let state = Arc::new(AppState {
        serve_root,
        canonical_root,
    });

    let (std_listener, bound_port) = bind_with_retry(bind_addr, start_port)?;
    std_listener
        .set_nonblocking(true)
        .map_err(|e| SiteError::Bind(e.to_string()))?;
    let listener = tokio::net::TcpListener::from_std(std_listener)
        .map_err(|e| SiteError::Bind(e.to_string()))?;

    info!(addr = %bind_addr, port = bound_port, root = %state.serve_root.display(), "listening");
    println!("serving {} at http://{}:{}/", state.serve_root.display(), bind_addr, bound_port);

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "could not install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
            info!("shutdown complete");
        })
        .await
        .map_err(|e| SiteError::io(&state.serve_root, e))?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
