//! Minimal HTTP/1.1 static-file mount for the browser client.
//!
//! Only `GET`/`HEAD` of files below [`Parameters::path_on_disk`] are served;
//! `index.html` is the default file. Every response closes the connection.

use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::Parameters;
use crate::error::IncppectError;

/// Largest request head we are willing to buffer.
const MAX_HEAD: usize = 8 * 1024;

const DEFAULT_FILE: &str = "index.html";

// ── Request head ─────────────────────────────────────────────────

/// The parts of a request line and headers the mount cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    upgrade: bool,
    /// Length of the head including the blank line.
    pub len: usize,
}

impl RequestHead {
    /// Parse a head that ends with `\r\n\r\n`.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let end = find_head_end(buf)?;
        let text = std::str::from_utf8(&buf[..end]).ok()?;
        let mut lines = text.split("\r\n");

        let mut request_line = lines.next()?.split_ascii_whitespace();
        let method = request_line.next()?.to_string();
        let target = request_line.next()?.to_string();

        let upgrade = lines.any(|line| {
            line.split_once(':').is_some_and(|(name, value)| {
                name.trim().eq_ignore_ascii_case("upgrade")
                    && value.trim().eq_ignore_ascii_case("websocket")
            })
        });

        Some(Self {
            method,
            target,
            upgrade,
            len: end + 4,
        })
    }

    pub fn is_websocket_upgrade(&self) -> bool {
        self.upgrade
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Wait until the whole request head is readable, without consuming it.
///
/// Returns `None` if the peer closes first or the head exceeds
/// [`MAX_HEAD`].
pub async fn peek_head(stream: &TcpStream) -> Result<Option<RequestHead>, IncppectError> {
    let mut buf = vec![0u8; MAX_HEAD];
    let mut seen = 0;
    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if let Some(head) = RequestHead::parse(&buf[..n]) {
            return Ok(Some(head));
        }
        if n == buf.len() {
            return Ok(None);
        }
        if n == seen {
            // peek returns the same bytes until more arrive
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        seen = n;
    }
}

// ── File mount ───────────────────────────────────────────────────

/// Map a request target to a file below `path_on_disk`.
///
/// Rejects targets outside `http_root` and any `..` component.
pub fn resolve(target: &str, http_root: &str, path_on_disk: &str) -> Option<PathBuf> {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    let root = http_root.trim_end_matches('/');
    let rest = path.strip_prefix(root)?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }

    let relative = Path::new(rest.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let mut file = PathBuf::from(path_on_disk);
    if !relative.as_os_str().is_empty() {
        file.push(relative);
    }
    if relative.as_os_str().is_empty() || rest.ends_with('/') {
        file.push(DEFAULT_FILE);
    }
    Some(file)
}

pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("wasm") => "application/wasm",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// Answer one plain HTTP request and close the socket.
pub async fn serve_static(
    mut stream: TcpStream,
    head: &RequestHead,
    params: &Parameters,
) -> Result<(), IncppectError> {
    let mut consumed = vec![0u8; head.len];
    stream.read_exact(&mut consumed).await?;

    let is_head = head.method.eq_ignore_ascii_case("HEAD");
    let response = if !is_head && !head.method.eq_ignore_ascii_case("GET") {
        response(405, "Method Not Allowed", "text/plain", b"method not allowed", false)
    } else {
        match resolve(&head.target, &params.http_root, &params.path_on_disk) {
            Some(path) => match tokio::fs::read(&path).await {
                Ok(body) => response(200, "OK", content_type(&path), &body, is_head),
                Err(e) => {
                    debug!("{}: {e}", path.display());
                    response(404, "Not Found", "text/plain", b"not found", is_head)
                }
            },
            None => response(404, "Not Found", "text/plain", b"not found", is_head),
        }
    };

    stream.write_all(&response).await?;
    stream.shutdown().await?;
    Ok(())
}

fn response(status: u16, reason: &str, content_type: &str, body: &[u8], head_only: bool) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    if !head_only {
        out.extend_from_slice(body);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_detects_websocket_upgrade() {
        let raw = b"GET /incppect HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";
        let head = RequestHead::parse(raw).unwrap();
        assert_eq!(head.method, "GET");
        assert_eq!(head.target, "/incppect");
        assert!(head.is_websocket_upgrade());
        assert_eq!(head.len, raw.len());
    }

    #[test]
    fn parse_needs_complete_head() {
        assert!(RequestHead::parse(b"GET / HTTP/1.1\r\nHost: x\r\n").is_none());
        let head = RequestHead::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(!head.is_websocket_upgrade());
    }

    #[test]
    fn resolve_defaults_to_index() {
        assert_eq!(resolve("/", "/", "www"), Some(PathBuf::from("www/index.html")));
        assert_eq!(
            resolve("/app/?v=1", "/app", "www"),
            Some(PathBuf::from("www/index.html"))
        );
        assert_eq!(resolve("/js/main.js", "/", "www"), Some(PathBuf::from("www/js/main.js")));
    }

    #[test]
    fn resolve_rejects_escapes_and_foreign_roots() {
        assert_eq!(resolve("/../secret", "/", "www"), None);
        assert_eq!(resolve("/a/../../b", "/", "www"), None);
        assert_eq!(resolve("/other/x", "/app", "www"), None);
        assert_eq!(resolve("/application", "/app", "www"), None);
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("a.js")), "application/javascript");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }
}
