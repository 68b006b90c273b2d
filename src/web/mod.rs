//! HTTP surface and single-page UI.
//!
//! Deliberately a small hand-rolled HTTP/1.1 server: bounded reads, one
//! connection handled at a time, shutdown flag, spawn/stop handle. Each
//! interaction resolves fully before the next is accepted, which matches
//! the single-operator usage this service is built for.

mod page;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::chart;
use crate::mailer::{ContactMessage, IncompleteContactForm, Mailer};
use crate::pipeline::DetectionPipeline;
use crate::report::REPORT_FILENAME;
use crate::uploads;

const MAX_HEADER_BYTES: usize = 8192;
/// Default cap on request bodies (uploaded images).
const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;
/// Generated reports kept available for download.
const REPORT_CACHE_CAP: usize = 16;

/// The two decorative page images; nothing else is served from the
/// assets directory.
const PAGE_ASSETS: &[&str] = &["fondo_tesis.png", "secretaria.png"];

#[derive(Clone, Debug)]
pub struct WebConfig {
    pub addr: String,
    pub assets_dir: PathBuf,
    pub max_body_bytes: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8501".to_string(),
            assets_dir: PathBuf::from("assets"),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug)]
pub struct WebHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl WebHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join().map_err(|_| anyhow!("web server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct WebServer {
    cfg: WebConfig,
    pipeline: DetectionPipeline,
    mailer: Box<dyn Mailer>,
}

impl WebServer {
    pub fn new(cfg: WebConfig, pipeline: DetectionPipeline, mailer: Box<dyn Mailer>) -> Self {
        Self {
            cfg,
            pipeline,
            mailer,
        }
    }

    pub fn spawn(self) -> Result<WebHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let mut state = ServerState {
            cfg: self.cfg,
            pipeline: self.pipeline,
            mailer: self.mailer,
            reports: ReportCache::new(REPORT_CACHE_CAP),
        };
        let join = std::thread::spawn(move || {
            if let Err(err) = run_server(listener, &mut state, shutdown_thread) {
                log::error!("web server stopped: {}", err);
            }
        });

        Ok(WebHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

struct ServerState {
    cfg: WebConfig,
    pipeline: DetectionPipeline,
    mailer: Box<dyn Mailer>,
    reports: ReportCache,
}

fn run_server(
    listener: TcpListener,
    state: &mut ServerState,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, state) {
                    log::warn!("request failed: {}", err);
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

fn handle_connection(mut stream: TcpStream, state: &mut ServerState) -> Result<()> {
    let request = read_request(&mut stream, state.cfg.max_body_bytes)?;

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => serve_index(&mut stream, state),
        ("GET", "/health") => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        ("GET", "/aggregate") => serve_aggregate(&mut stream, state),
        ("GET", "/chart.png") => serve_chart(&mut stream, state),
        ("GET", path) if path.starts_with("/assets/") => serve_asset(&mut stream, state, path),
        ("GET", path) if path.starts_with("/report/") => serve_report(&mut stream, state, path),
        ("POST", "/detect") => serve_detect(&mut stream, state, &request),
        ("POST", "/contact") => serve_contact(&mut stream, state, &request),
        ("GET", _) => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
        _ => write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#),
    }
}

fn serve_index(stream: &mut TcpStream, state: &mut ServerState) -> Result<()> {
    // The decorative images are part of the page contract; a missing one
    // is fatal to the render.
    for asset in PAGE_ASSETS {
        let path = state.cfg.assets_dir.join(asset);
        if !path.is_file() {
            log::error!("page asset missing: {}", path.display());
            write_json_response(stream, 500, r#"{"error":"asset_missing"}"#)?;
            return Err(anyhow!("page asset missing: {}", path.display()));
        }
    }
    write_response(
        stream,
        200,
        "text/html; charset=utf-8",
        page::INDEX_HTML.as_bytes(),
        &[],
    )
}

fn serve_asset(stream: &mut TcpStream, state: &mut ServerState, path: &str) -> Result<()> {
    let name = path.trim_start_matches("/assets/");
    if !PAGE_ASSETS.contains(&name) {
        return write_json_response(stream, 404, r#"{"error":"not_found"}"#);
    }
    let bytes = std::fs::read(state.cfg.assets_dir.join(name))
        .map_err(|e| anyhow!("failed to read asset {}: {}", name, e));
    match bytes {
        Ok(bytes) => write_response(stream, 200, "image/png", &bytes, &[]),
        Err(err) => {
            write_json_response(stream, 500, r#"{"error":"asset_missing"}"#)?;
            Err(err)
        }
    }
}

fn serve_aggregate(stream: &mut TcpStream, state: &mut ServerState) -> Result<()> {
    let rows = state.pipeline.aggregate()?;
    let payload = serde_json::to_vec(&rows)?;
    write_response(stream, 200, "application/json", &payload, &[])
}

fn serve_chart(stream: &mut TcpStream, state: &mut ServerState) -> Result<()> {
    let rows = state.pipeline.aggregate()?;
    let total: u64 = rows.iter().map(|row| row.count).sum();
    if total == 0 {
        return write_json_response(stream, 404, r#"{"error":"no_data"}"#);
    }
    let png = chart::render(&rows)?;
    write_response(stream, 200, "image/png", &png, &[])
}

fn serve_report(stream: &mut TcpStream, state: &mut ServerState, path: &str) -> Result<()> {
    let token = path.trim_start_matches("/report/");
    match state.reports.get(token) {
        Some(pdf) => {
            let disposition = format!("attachment; filename=\"{}\"", REPORT_FILENAME);
            write_response(
                stream,
                200,
                "application/pdf",
                &pdf,
                &[("Content-Disposition", &disposition)],
            )
        }
        None => write_json_response(stream, 404, r#"{"error":"unknown_report"}"#),
    }
}

#[derive(Serialize)]
struct DetectResponse {
    counts: BTreeMap<String, u32>,
    percentages: Option<BTreeMap<String, String>>,
    total: u64,
    annotated_png_base64: String,
    report_url: Option<String>,
    recorded: u32,
    record_failures: u32,
}

fn serve_detect(stream: &mut TcpStream, state: &mut ServerState, request: &HttpRequest) -> Result<()> {
    if request.body.is_empty() {
        return write_json_response(stream, 400, r#"{"error":"empty_upload"}"#);
    }
    let original_name = request
        .header("x-filename")
        .unwrap_or("upload.png")
        .to_string();
    if uploads::allowed_extension(&original_name).is_err() {
        return write_json_response(stream, 400, r#"{"error":"unsupported_file_type"}"#);
    }

    let outcome = match state.pipeline.process(&request.body, &original_name) {
        Ok(outcome) => outcome,
        Err(err) => {
            log::error!("detection run failed: {}", err);
            return write_json_response(stream, 500, r#"{"error":"detection_failed"}"#);
        }
    };

    let report_url = outcome
        .report_pdf
        .as_ref()
        .map(|pdf| format!("/report/{}", state.reports.insert(pdf.clone())));

    let response = DetectResponse {
        total: outcome.total_detections(),
        annotated_png_base64: BASE64.encode(&outcome.annotated_png),
        counts: outcome.counts,
        percentages: outcome.percentages,
        report_url,
        recorded: outcome.recorded,
        record_failures: outcome.record_failures,
    };
    let payload = serde_json::to_vec(&response)?;
    write_response(stream, 200, "application/json", &payload, &[])
}

#[derive(Deserialize)]
struct ContactRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    message: String,
}

fn serve_contact(stream: &mut TcpStream, state: &mut ServerState, request: &HttpRequest) -> Result<()> {
    let form: ContactRequest = match serde_json::from_slice(&request.body) {
        Ok(form) => form,
        Err(_) => return write_json_response(stream, 400, r#"{"error":"invalid_payload"}"#),
    };
    let message = ContactMessage {
        name: form.name,
        email: form.email,
        subject: form.subject,
        body: form.message,
    };

    match state.mailer.notify(&message) {
        Ok(()) => write_json_response(stream, 200, r#"{"status":"sent"}"#),
        Err(err) if err.downcast_ref::<IncompleteContactForm>().is_some() => {
            write_json_response(stream, 400, r#"{"error":"fields_incomplete"}"#)
        }
        Err(err) => {
            log::warn!("contact mail failed: {}", err);
            write_json_response(stream, 502, r#"{"error":"send_failed"}"#)
        }
    }
}

// -------------------- Report cache --------------------

/// Capped token→PDF map for report downloads; oldest entries fall out.
struct ReportCache {
    entries: HashMap<String, Vec<u8>>,
    order: VecDeque<String>,
    cap: usize,
}

impl ReportCache {
    fn new(cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    fn insert(&mut self, pdf: Vec<u8>) -> String {
        while self.order.len() >= self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        let mut token_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut token_bytes);
        let token = hex::encode(token_bytes);
        self.order.push_back(token.clone());
        self.entries.insert(token.clone(), pdf);
        token
    }

    fn get(&self, token: &str) -> Option<Vec<u8>> {
        self.entries.get(token).cloned()
    }
}

// -------------------- HTTP plumbing --------------------

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

fn read_request(stream: &mut TcpStream, max_body_bytes: usize) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = find_header_end(&data) {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request header too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-request"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let header_text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = header_text.split("\r\n");
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

    let content_length: usize = headers
        .get("content-length")
        .map(|v| v.parse())
        .transpose()
        .map_err(|_| anyhow!("invalid content-length"))?
        .unwrap_or(0);
    if content_length > max_body_bytes {
        return Err(anyhow!(
            "request body of {} bytes exceeds the {} byte limit",
            content_length,
            max_body_bytes
        ));
    }

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes(), &[])
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
    extra_headers: &[(&str, &str)],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        502 => "HTTP/1.1 502 Bad Gateway",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let mut header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    for (name, value) in extra_headers {
        header.push_str(&format!("{}: {}\r\n", name, value));
    }
    header.push_str("\r\n");
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}
