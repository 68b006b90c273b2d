use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;

use image::{Rgb, RgbImage};
use serde_json::Value;

use plagascan::config::ModelSettings;
use plagascan::detect::StubBackend;
use plagascan::mailer::MemoryMailer;
use plagascan::pipeline::DetectionPipeline;
use plagascan::storage::InMemorySightingStore;
use plagascan::web::{WebConfig, WebHandle, WebServer};

fn write_assets(assets_dir: &Path) {
    std::fs::create_dir_all(assets_dir).unwrap();
    for name in ["fondo_tesis.png", "secretaria.png"] {
        std::fs::write(assets_dir.join(name), png_frame(128)).unwrap();
    }
}

fn spawn_server(with_assets: bool) -> (WebHandle, MemoryMailer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let assets_dir = dir.path().join("assets");
    if with_assets {
        write_assets(&assets_dir);
    }

    let settings = ModelSettings::default();
    let backend = StubBackend::new(settings.class_names.len());
    let pipeline = DetectionPipeline::new(
        Box::new(backend),
        Box::new(InMemorySightingStore::new()),
        settings,
        dir.path().join("uploads"),
    );
    let mailer = MemoryMailer::new();
    let cfg = WebConfig {
        addr: "127.0.0.1:0".to_string(),
        assets_dir,
        ..WebConfig::default()
    };
    let handle = WebServer::new(cfg, pipeline, Box::new(mailer.clone()))
        .spawn()
        .expect("spawn web server");
    (handle, mailer, dir)
}

fn png_frame(value: u8) -> Vec<u8> {
    let frame = RgbImage::from_pixel(64, 64, Rgb([value, value, value]));
    let mut png = Vec::new();
    frame
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    png
}

fn http_request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> (u16, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    let mut request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: close\r\n",
        method,
        path,
        body.len()
    );
    for (name, value) in headers {
        request.push_str(&format!("{}: {}\r\n", name, value));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).unwrap();
    stream.write_all(body).unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();

    let header_end = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("complete response");
    let head = String::from_utf8_lossy(&response[..header_end]).into_owned();
    let status: u16 = head
        .split_whitespace()
        .nth(1)
        .expect("status code")
        .parse()
        .unwrap();
    (status, response[header_end + 4..].to_vec())
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("json body")
}

#[test]
fn health_and_index_respond() {
    let (handle, _mailer, _dir) = spawn_server(true);

    let (status, body) = http_request(handle.addr, "GET", "/health", &[], &[]);
    assert_eq!(status, 200);
    assert_eq!(json_body(&body)["status"], "ok");

    let (status, body) = http_request(handle.addr, "GET", "/", &[], &[]);
    assert_eq!(status, 200);
    let page = String::from_utf8_lossy(&body);
    assert!(page.contains("Detección de Agentes Plaga"));
    assert!(page.contains("Formulario") || page.contains("Escríbenos"));

    handle.stop().unwrap();
}

#[test]
fn missing_page_assets_are_fatal_to_the_render() {
    let (handle, _mailer, _dir) = spawn_server(false);

    let (status, body) = http_request(handle.addr, "GET", "/", &[], &[]);
    assert_eq!(status, 500);
    assert_eq!(json_body(&body)["error"], "asset_missing");

    handle.stop().unwrap();
}

#[test]
fn detect_persists_counts_and_serves_the_report() {
    let (handle, _mailer, _dir) = spawn_server(true);

    let (status, body) = http_request(
        handle.addr,
        "POST",
        "/detect",
        &[("X-Filename", "parcela.png")],
        &png_frame(255),
    );
    assert_eq!(status, 200);
    let result = json_body(&body);

    // A bright frame lights all 16 stub tiles, split over the two classes.
    assert_eq!(result["total"], 16);
    assert_eq!(result["counts"]["tuta"], 8);
    assert_eq!(result["counts"]["bactericera"], 8);
    assert_eq!(result["percentages"]["tuta"], "50.00%");
    assert_eq!(result["recorded"], 16);
    assert!(!result["annotated_png_base64"].as_str().unwrap().is_empty());

    let report_url = result["report_url"].as_str().expect("report url");
    let (status, pdf) = http_request(handle.addr, "GET", report_url, &[], &[]);
    assert_eq!(status, 200);
    assert!(pdf.starts_with(b"%PDF"));

    let (status, body) = http_request(handle.addr, "GET", "/aggregate", &[], &[]);
    assert_eq!(status, 200);
    let rows = json_body(&body);
    let total: u64 = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["count"].as_u64().unwrap())
        .sum();
    assert_eq!(total, 16);

    let (status, chart) = http_request(handle.addr, "GET", "/chart.png", &[], &[]);
    assert_eq!(status, 200);
    assert!(chart.starts_with(&[0x89, b'P', b'N', b'G']));

    handle.stop().unwrap();
}

#[test]
fn zero_detections_skip_persistence_and_the_report() {
    let (handle, _mailer, _dir) = spawn_server(true);

    let (status, body) = http_request(
        handle.addr,
        "POST",
        "/detect",
        &[("X-Filename", "noche.png")],
        &png_frame(0),
    );
    assert_eq!(status, 200);
    let result = json_body(&body);
    assert_eq!(result["total"], 0);
    assert!(result["percentages"].is_null());
    assert!(result["report_url"].is_null());

    let (status, body) = http_request(handle.addr, "GET", "/aggregate", &[], &[]);
    assert_eq!(status, 200);
    assert_eq!(json_body(&body).as_array().unwrap().len(), 0);

    // Nothing recorded yet, so the chart has no data to draw.
    let (status, body) = http_request(handle.addr, "GET", "/chart.png", &[], &[]);
    assert_eq!(status, 404);
    assert_eq!(json_body(&body)["error"], "no_data");

    handle.stop().unwrap();
}

#[test]
fn uploads_with_disallowed_extensions_are_rejected() {
    let (handle, _mailer, _dir) = spawn_server(true);

    let (status, body) = http_request(
        handle.addr,
        "POST",
        "/detect",
        &[("X-Filename", "clip.mp4")],
        &png_frame(255),
    );
    assert_eq!(status, 400);
    assert_eq!(json_body(&body)["error"], "unsupported_file_type");

    let (status, body) = http_request(handle.addr, "POST", "/detect", &[], &[]);
    assert_eq!(status, 400);
    assert_eq!(json_body(&body)["error"], "empty_upload");

    handle.stop().unwrap();
}

#[test]
fn contact_form_validates_before_any_transport() {
    let (handle, mailer, _dir) = spawn_server(true);

    let incomplete = br#"{"name":"Ana","email":"","subject":"Consulta","message":"Hola"}"#;
    let (status, body) = http_request(
        handle.addr,
        "POST",
        "/contact",
        &[("Content-Type", "application/json")],
        incomplete,
    );
    assert_eq!(status, 400);
    assert_eq!(json_body(&body)["error"], "fields_incomplete");
    assert!(mailer.sent().is_empty());

    let complete =
        br#"{"name":"Ana","email":"ana@example.com","subject":"Consulta","message":"Hola"}"#;
    let (status, body) = http_request(
        handle.addr,
        "POST",
        "/contact",
        &[("Content-Type", "application/json")],
        complete,
    );
    assert_eq!(status, 200);
    assert_eq!(json_body(&body)["status"], "sent");
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Consulta");

    handle.stop().unwrap();
}
