//! Fixture backend for integration tests.
//!
//! Serves the certificate, QR, verification and template endpoints from
//! in-memory tables on an ephemeral port and records every request it sees.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use certrender::rendering::font::FontFace;
use certrender::{MemorySink, Renderer, RendererConfig};
use serde_json::{json, Value};
use tiny_http::{Header, Response, Server};

pub const RED_PIXEL_PNG_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8DwHwAFBQIAX8jx0gAAAABJRU5ErkJggg==";

pub const STYLES: &str = r#"
body { margin: 0; font-family: serif; }
#certificate { width: 700px; padding: 40px; border: 4px solid #8a6d3b; background: #fffdf5; text-align: center; }
#certificate h1 { font-size: 32px; color: #3b2f1e; }
.name { font-size: 24px; font-weight: bold; }
.meta { font-size: 12px; color: #555; }
"#;

pub const CERTIFICATE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><link rel="stylesheet" href="styles.css"></head>
<body>
<div id="certificate">
  <h1>{{template_type}}</h1>
  <p>This is to certify that</p>
  <p class="name">{{student_name}}</p>
  <p>is a bonafide student of <strong>{{institute_name}}</strong>.</p>
  <p>Issued to {{student_name}} on {{request_date}}.</p>
  <img src="{{qrCode}}" width="100" height="100" alt="QR">
  <p class="meta">Certificate ID: {{certificateId}}</p>
  <p class="meta">Transaction: {{transactionId}}</p>
</div>
</body></html>"#;

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub path: String,
    pub authorization: Option<String>,
}

#[derive(Debug, Clone)]
pub enum QrReply {
    Json(String),
    Png,
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct Fixture {
    pub records: HashMap<String, Value>,
    pub templates: HashMap<String, String>,
    pub stylesheet: Option<String>,
    pub qr: HashMap<String, QrReply>,
    pub verify: HashMap<String, (u16, String)>,
    /// Paths answered only after this delay.
    pub slow: HashMap<String, Duration>,
}

impl Fixture {
    /// Every default template file served with the standard certificate template.
    pub fn standard() -> Self {
        let mut fixture = Fixture {
            stylesheet: Some(STYLES.to_string()),
            ..Fixture::default()
        };
        for (_, file) in certrender::TemplateRegistry::default().iter() {
            fixture
                .templates
                .insert(file.to_string(), CERTIFICATE_TEMPLATE.to_string());
        }
        fixture
    }

    pub fn with_record(mut self, id: &str, record: Value) -> Self {
        self.records.insert(id.to_string(), record);
        self
    }
}

pub struct Backend {
    pub base: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Backend {
    pub fn start(fixture: Fixture) -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let fixture = Arc::new(fixture);
        let log = Arc::clone(&seen);
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                let fixture = Arc::clone(&fixture);
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    let path = request.url().split('?').next().unwrap_or("").to_string();
                    let authorization = request
                        .headers()
                        .iter()
                        .find(|h| h.field.equiv("Authorization"))
                        .map(|h| h.value.as_str().to_string());
                    log.lock().unwrap().push(Seen {
                        path: path.clone(),
                        authorization,
                    });
                    if let Some(delay) = fixture.slow.get(&path) {
                        std::thread::sleep(*delay);
                    }
                    let _ = request.respond(route(&fixture, &path));
                });
            }
        });
        Backend {
            base: format!("http://127.0.0.1:{}", port),
            seen,
        }
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.seen().iter().filter(|s| s.path.starts_with(prefix)).count()
    }

    pub fn config(&self) -> RendererConfig {
        RendererConfig {
            api_base_url: format!("{}/api", self.base),
            assets_base_url: self.base.clone(),
            token: Some("test-token".to_string()),
            request_timeout_ms: 5_000,
            image_timeout_ms: 2_000,
            ..RendererConfig::default()
        }
    }

    /// Renderer writing into memory, painting with the fixture font.
    pub fn renderer(&self) -> (Renderer, Arc<MemorySink>) {
        self.renderer_with(self.config())
    }

    pub fn renderer_with(&self, config: RendererConfig) -> (Renderer, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let renderer = Renderer::with_parts(config, sink.clone(), fixture_font()).unwrap();
        (renderer, sink)
    }
}

pub fn fixture_font_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/DejaVuSans.ttf")
}

pub fn fixture_font() -> FontFace {
    FontFace::load(Some(fixture_font_path().as_path())).unwrap()
}

fn header(value: &str) -> Header {
    format!("Content-Type: {}", value).parse::<Header>().unwrap()
}

fn json_response(status: u16, body: String) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_data(body.into_bytes())
        .with_status_code(status)
        .with_header(header("application/json"))
}

fn route(fixture: &Fixture, path: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    let not_found = || Response::from_data(b"not found".to_vec()).with_status_code(404);

    if let Some(id) = path.strip_prefix("/api/certificate/") {
        return match fixture.records.get(id) {
            Some(record) => json_response(200, record.to_string()),
            None => json_response(404, json!({"error": "not found"}).to_string()),
        };
    }
    if let Some(hash) = path.strip_prefix("/api/qrcode/") {
        return match fixture.qr.get(hash) {
            Some(QrReply::Json(url)) => json_response(200, json!({ "qrCodeDataUrl": url }).to_string()),
            Some(QrReply::Png) => {
                use base64::Engine as _;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(RED_PIXEL_PNG_B64)
                    .unwrap();
                Response::from_data(bytes).with_header(header("image/png"))
            }
            Some(QrReply::Fail) | None => json_response(500, json!({"error": "qr failed"}).to_string()),
        };
    }
    if let Some(hash) = path.strip_prefix("/api/verify/") {
        return match fixture.verify.get(hash) {
            Some((status, body)) => json_response(*status, body.clone()),
            None => json_response(404, json!({"valid": false, "error": "Certificate not found"}).to_string()),
        };
    }
    if path == "/templates/styles.css" {
        return match &fixture.stylesheet {
            Some(css) => Response::from_data(css.clone().into_bytes()).with_header(header("text/css")),
            None => not_found(),
        };
    }
    if path.ends_with(".png") {
        use base64::Engine as _;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(RED_PIXEL_PNG_B64)
            .unwrap();
        return Response::from_data(bytes).with_header(header("image/png"));
    }
    if let Some(file) = path.strip_prefix("/templates/") {
        return match fixture.templates.get(file) {
            Some(html) => Response::from_data(html.clone().into_bytes()).with_header(header("text/html")),
            None => not_found(),
        };
    }
    not_found()
}

pub fn record(student: Option<&str>, username: &str, certificate_type: &str, hash: Option<&str>) -> Value {
    json!({
        "student_name": student,
        "student_username": username,
        "institute_name": "ABC Institute",
        "institute_username": "abc",
        "template_name": certificate_type,
        "template_type": certificate_type,
        "request_date": "2024-05-01",
        "certificate_hash": hash,
        "description": "Issued for bank account opening",
    })
}
