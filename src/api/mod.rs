//! HTTP surface over the detector, store and analytics.
//!
//! One worker thread owns the store handle for its whole lifetime and serves
//! connections sequentially. Routes:
//!
//! - `GET /health`
//! - `POST /register` (JSON `{username, email}`)
//! - `POST /api/images?owner_id=&filename=` (raw image body)
//! - `GET /api/images?owner_id=&limit=&offset=`
//! - `GET /api/analytics`

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::analytics::{summarize, SyntheticFallback};
use crate::config::SafetySnapConfig;
use crate::detect::PpeDetector;
use crate::storage::{DetectionStore, Page, SqliteDetectionStore, StoreError};
use crate::uploads::{sanitize_filename, UploadDir};

const MAX_HEADER_BYTES: usize = 8192;
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_DRAIN_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: SafetySnapConfig,
}

impl ApiServer {
    pub fn new(cfg: SafetySnapConfig) -> Self {
        Self { cfg }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .api_addr
            .parse()
            .with_context(|| format!("invalid api address '{}'", self.cfg.api_addr))?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        // Fail before spawning if the store or upload dir cannot be opened.
        let store = SqliteDetectionStore::open(&self.cfg.db_path)?;
        let uploads = UploadDir::open(&self.cfg.upload_dir)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let join = std::thread::spawn(move || {
            let mut ctx = ApiContext {
                detector: PpeDetector::with_defaults(cfg.helmet_band),
                store,
                uploads,
                cfg,
            };
            if let Err(err) = run_api(listener, &mut ctx, shutdown_thread) {
                log::error!("api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

struct ApiContext {
    cfg: SafetySnapConfig,
    store: SqliteDetectionStore,
    uploads: UploadDir,
    detector: PpeDetector,
}

fn run_api(listener: TcpListener, ctx: &mut ApiContext, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, ctx) {
                    log::warn!("api request failed: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, ctx: &mut ApiContext) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = match read_request(&mut stream, ctx.cfg.max_upload_bytes) {
        Ok(Incoming::Request(request)) => request,
        Ok(Incoming::TooLarge { pending }) => {
            log::warn!("upload rejected: body exceeds {} bytes", ctx.cfg.max_upload_bytes);
            write_json(&mut stream, 413, &json!({"detail": "upload too large"}))?;
            // Unread body bytes would turn the close into a reset and the
            // client would never see the 413.
            stream.shutdown(Shutdown::Write)?;
            drain(&mut stream, pending);
            return Ok(());
        }
        Err(err) => {
            write_json(&mut stream, 400, &json!({"detail": "malformed request"}))?;
            return Err(err);
        }
    };

    if request.method == "OPTIONS" {
        write_response(&mut stream, 204, "text/plain", b"")?;
        return Ok(());
    }

    let reply = match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => Reply::ok(json!({
            "status": "ok",
            "message": "SafetySnap API running"
        })),
        ("POST", "/register") => register(ctx, &request),
        ("POST", "/api/images") => upload_image(ctx, &request),
        ("GET", "/api/images") => list_images(ctx, &request),
        ("GET", "/api/analytics") => analytics(ctx),
        (_, "/health" | "/register" | "/api/images" | "/api/analytics") => {
            Reply::error(405, "method not allowed")
        }
        _ => Reply::error(404, "not found"),
    };

    let reply = reply.unwrap_or_else(|err| {
        log::error!("{} {} failed: {:#}", request.method, request.path, err);
        Reply {
            status: 500,
            body: json!({"detail": "internal error"}),
        }
    });
    write_json(&mut stream, reply.status, &reply.body)
}

struct Reply {
    status: u16,
    body: serde_json::Value,
}

impl Reply {
    fn ok(body: serde_json::Value) -> Result<Self> {
        Ok(Self { status: 200, body })
    }

    fn error(status: u16, detail: impl Into<String>) -> Result<Self> {
        Ok(Self {
            status,
            body: json!({ "detail": detail.into() }),
        })
    }

    fn from_store_error(err: StoreError) -> Result<Self> {
        match err {
            StoreError::UnknownOwner(id) => {
                Self::error(400, format!("Owner with id {} does not exist", id))
            }
            StoreError::Conflict(msg) => Self::error(409, msg),
            StoreError::InvalidInput(msg) => Self::error(400, msg),
            other => Err(other.into()),
        }
    }
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
}

fn register(ctx: &mut ApiContext, request: &HttpRequest) -> Result<Reply> {
    let body: RegisterRequest = match serde_json::from_slice(&request.body) {
        Ok(body) => body,
        Err(err) => return Reply::error(400, format!("invalid JSON body: {}", err)),
    };
    match ctx.store.register_owner(&body.username, &body.email) {
        Ok(owner) => {
            log::info!("registered owner {} ({})", owner.id, owner.username);
            Reply::ok(serde_json::to_value(owner)?)
        }
        Err(err) => Reply::from_store_error(err),
    }
}

fn upload_image(ctx: &mut ApiContext, request: &HttpRequest) -> Result<Reply> {
    let owner_id = match request.query_i64("owner_id") {
        Some(Ok(id)) => id,
        Some(Err(_)) => return Reply::error(400, "owner_id must be an integer"),
        None => return Reply::error(400, "owner_id is required"),
    };
    let Some(raw_name) = request.query.get("filename") else {
        return Reply::error(400, "filename is required");
    };
    let filename = match sanitize_filename(raw_name) {
        Ok(name) => name,
        Err(err) => return Reply::error(400, err.to_string()),
    };
    if ctx.store.owner(owner_id)?.is_none() {
        log::warn!("upload rejected: owner {} does not exist", owner_id);
        return Reply::error(400, format!("Owner with id {} does not exist", owner_id));
    }

    ctx.uploads.save(&filename, &request.body)?;
    let detection = ctx.detector.detect(&request.body);
    let record = match ctx
        .store
        .record(owner_id, &filename, &detection.labels, detection.region)
    {
        Ok(record) => record,
        Err(err) => return Reply::from_store_error(err),
    };
    log::info!(
        "upload: owner {} file {} -> record {} labels {:?}",
        owner_id,
        filename,
        record.id,
        record.labels
    );

    Reply::ok(json!({
        "message": "Upload successful!",
        "id": record.id,
        "labels": record.labels,
        "ppe_count": record.ppe_count(),
        "bbox": detection.bounding_box(),
        "region_found": detection.region.is_some(),
        "fingerprint": record.fingerprint,
    }))
}

fn list_images(ctx: &mut ApiContext, request: &HttpRequest) -> Result<Reply> {
    let owner_id = match request.query_i64("owner_id") {
        Some(Ok(id)) => Some(id),
        Some(Err(_)) => return Reply::error(400, "owner_id must be an integer"),
        None => None,
    };
    let pagination = ctx.cfg.pagination;
    let limit = match request.query_usize("limit") {
        Some(Ok(limit)) => limit.min(pagination.max_limit),
        Some(Err(_)) => return Reply::error(400, "limit must be a non-negative integer"),
        None => pagination.default_limit,
    };
    let offset = match request.query_usize("offset") {
        Some(Ok(offset)) => offset,
        Some(Err(_)) => return Reply::error(400, "offset must be a non-negative integer"),
        None => 0,
    };
    match ctx.store.list(owner_id, Page::new(limit, offset)) {
        Ok(records) => Reply::ok(serde_json::to_value(records)?),
        Err(err) => Reply::from_store_error(err),
    }
}

fn analytics(ctx: &mut ApiContext) -> Result<Reply> {
    let mut summary = summarize(&ctx.store, &ctx.cfg.analytics.categories)?;
    if ctx.cfg.analytics.synthetic_fallback {
        summary = SyntheticFallback::new().apply(summary);
    }
    Reply::ok(serde_json::to_value(summary)?)
}

// -------------------- HTTP/1.1 plumbing --------------------

enum Incoming {
    Request(HttpRequest),
    /// Declared body is over the cap; `pending` bytes of it are still unread.
    TooLarge { pending: usize },
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn query_i64(&self, key: &str) -> Option<Result<i64, std::num::ParseIntError>> {
        self.query.get(key).map(|v| v.trim().parse())
    }

    fn query_usize(&self, key: &str) -> Option<Result<usize, std::num::ParseIntError>> {
        self.query.get(key).map(|v| v.trim().parse())
    }
}

fn read_request(stream: &mut TcpStream, max_body: usize) -> Result<Incoming> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let head_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request head"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request head too large"));
        }
    };

    let head = String::from_utf8_lossy(&data[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length"))?,
        None => 0,
    };
    if content_length > max_body {
        let buffered = data.len() - head_end;
        return Ok(Incoming::TooLarge {
            pending: content_length.saturating_sub(buffered),
        });
    }

    let mut body = data.split_off(head_end);
    if body.len() < content_length {
        let mut rest = vec![0u8; content_length - body.len()];
        stream.read_exact(&mut rest)?;
        body.extend_from_slice(&rest);
    }
    body.truncate(content_length);

    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, query),
        None => (raw_path, ""),
    };
    let query = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    Ok(Incoming::Request(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query,
        body,
    }))
}

/// Discard up to `pending` request bytes, bounded by [`MAX_DRAIN_BYTES`] and
/// the read timeout.
fn drain(stream: &mut TcpStream, pending: usize) {
    let limit = (pending as u64).min(MAX_DRAIN_BYTES);
    if let Err(err) = std::io::copy(&mut Read::by_ref(stream).take(limit), &mut std::io::sink()) {
        log::debug!("drain of rejected body stopped early: {}", err);
    }
}

fn write_json(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        409 => "HTTP/1.1 409 Conflict",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: *\r\n\
         Cache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}
