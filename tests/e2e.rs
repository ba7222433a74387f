//! End-to-end tests for docx2pdf, driven through the HTTP router.
//!
//! The first group runs everywhere: it uses the structural backend with
//! the built-in renderer, so no office suite is needed.
//!
//! The live-engine group converts with real LibreOffice / Chromium and is
//! gated behind the `E2E_ENABLED` environment variable so it does not run
//! in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use docx2pdf::{
    router, BackendKind, CorsPolicy, Orchestrator, RendererKind, ServiceConfig, ValidationPolicy,
};
use engine_locate::Engine;
use lopdf::content::Content;
use lopdf::{Document, Object};
use std::io::Write;
use std::path::PathBuf;
use tower::ServiceExt;

// ── Test helpers ─────────────────────────────────────────────────────────────

const BOUNDARY: &str = "----docx2pdf-test-boundary";
const RESPONSE_LIMIT: usize = 32 * 1024 * 1024;

/// Skip this test unless E2E_ENABLED is set and `engine` is installed.
macro_rules! e2e_skip_unless_ready {
    ($engine:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        match engine_locate::locate($engine, None) {
            Ok(path) => path,
            Err(e) => {
                println!("SKIP — {e}");
                return;
            }
        }
    }};
}

fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    )
}

/// A minimal but valid `.docx` package: content types, package rels and
/// the main document part. LibreOffice opens this as well.
fn docx_bytes(body: &str) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("[Content_Types].xml", opts).unwrap();
        zip.write_all(br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#).unwrap();
        zip.start_file("_rels/.rels", opts).unwrap();
        zip.write_all(br#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#).unwrap();
        zip.start_file("word/document.xml", opts).unwrap();
        zip.write_all(document_xml(body).as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf.into_inner()
}

fn paragraph(text: &str) -> String {
    format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
}

/// A letter long enough to need two A4 pages.
fn two_page_letter() -> Vec<u8> {
    let mut body = String::from(
        r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Quarterly report</w:t></w:r></w:p>"#,
    );
    for i in 0..90 {
        body.push_str(&paragraph(&format!("Paragraph {i}: revenue grew in every region.")));
    }
    docx_bytes(&body)
}

/// `multipart/form-data` with the given `(field, filename, bytes)` parts.
fn multipart_request(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (field, filename, bytes) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/convertFile")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn upload(filename: &str, bytes: &[u8]) -> Request<Body> {
    multipart_request(&[("file", Some(filename), bytes)])
}

struct TestServer {
    _dir: tempfile::TempDir,
    work_dir: PathBuf,
    app: Router,
}

impl TestServer {
    fn structural() -> Self {
        Self::with(|b| b.backend(BackendKind::Structural))
    }

    fn with(
        configure: impl FnOnce(docx2pdf::ServiceConfigBuilder) -> docx2pdf::ServiceConfigBuilder,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("work");
        let config = configure(ServiceConfig::builder().work_dir(&work_dir))
            .build()
            .unwrap();
        let orchestrator = Orchestrator::new(&config).unwrap();
        Self {
            _dir: dir,
            work_dir,
            app: router(orchestrator, &CorsPolicy::Permissive),
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), RESPONSE_LIMIT).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    fn leftovers(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.work_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}

fn message(bytes: &[u8]) -> String {
    let json: serde_json::Value = serde_json::from_slice(bytes).unwrap();
    json["message"].as_str().unwrap().to_string()
}

/// Concatenated `Tj` operands of every page.
fn pdf_text(bytes: &[u8]) -> String {
    let mut doc = Document::load_mem(bytes).unwrap();
    doc.decompress();
    let mut text = Vec::new();
    for (_, page_id) in doc.get_pages() {
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        for op in content.operations.iter().filter(|op| op.operator == "Tj") {
            if let Some(Object::String(s, _)) = op.operands.first() {
                text.extend_from_slice(s);
                text.push(b'\n');
            }
        }
    }
    String::from_utf8_lossy(&text).into_owned()
}

fn assert_pdf(bytes: &[u8], context: &str) {
    assert!(bytes.starts_with(b"%PDF"), "[{context}] body is not a PDF");
    assert!(
        Document::load_mem(bytes).is_ok(),
        "[{context}] PDF does not parse"
    );
}

// ── Structural backend, built-in renderer ────────────────────────────────────

#[tokio::test]
async fn test_converts_docx_to_pdf_and_cleans_up() {
    let server = TestServer::structural();
    let (status, headers, body) = server.send(upload("Quarterly Report.docx", &two_page_letter())).await;

    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Quarterly Report.pdf\""
    );
    assert_eq!(
        headers[header::CONTENT_LENGTH],
        body.len().to_string().as_str()
    );
    assert_pdf(&body, "two-page letter");

    let doc = Document::load_mem(&body).unwrap();
    assert!(doc.get_pages().len() >= 2, "expected at least two pages");
    let text = pdf_text(&body);
    assert!(text.contains("Quarterly report"));
    assert!(text.contains("Paragraph 89"));

    assert!(server.leftovers().is_empty(), "{:?}", server.leftovers());
}

#[tokio::test]
async fn test_client_directories_are_stripped() {
    let server = TestServer::structural();
    let (status, headers, _) = server
        .send(upload("C:\\Users\\me\\cv.docx", &docx_bytes(&paragraph("Curriculum"))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"cv.pdf\""
    );
}

#[tokio::test]
async fn test_unsupported_type_is_rejected() {
    let server = TestServer::structural();
    let (status, _, body) = server.send(upload("notes.txt", b"plain text")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(message(&body).starts_with("Unsupported file type"));
    assert!(server.leftovers().is_empty());
}

#[tokio::test]
async fn test_missing_file_field() {
    let server = TestServer::structural();
    let (status, _, body) = server
        .send(multipart_request(&[("comment", None, b"no file here")]))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(message(&body), "No file uploaded");
}

#[tokio::test]
async fn test_empty_upload_is_missing_file() {
    let server = TestServer::structural();
    let (status, _, body) = server.send(upload("empty.docx", b"")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(message(&body), "No file uploaded");
    assert!(server.leftovers().is_empty());
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let server = TestServer::with(|b| {
        b.backend(BackendKind::Structural)
            .policy(ValidationPolicy::new([".docx"], 4096))
    });
    let big = vec![b'x'; 200_000];
    let (status, _, body) = server.send(upload("big.docx", &big)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(message(&body).starts_with("File too large"));
    assert!(server.leftovers().is_empty());
}

#[tokio::test]
async fn test_document_without_text_is_error() {
    let server = TestServer::structural();
    let (status, _, body) = server.send(upload("blank.docx", &docx_bytes("<w:p/>"))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(message(&body), "Document has no content to convert");
    assert!(server.leftovers().is_empty());
}

#[tokio::test]
async fn test_corrupt_docx_hides_internal_detail() {
    let server = TestServer::structural();
    let (status, _, body) = server.send(upload("broken.docx", b"PK not really a zip")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let msg = message(&body);
    assert_eq!(msg, "Error converting file");
    assert!(!msg.contains(server.work_dir.to_string_lossy().as_ref()));
    assert!(server.leftovers().is_empty());
}

#[tokio::test]
async fn test_concurrent_identical_filenames_do_not_collide() {
    let server = TestServer::structural();
    let requests = (0..6).map(|i| {
        let app = server.app.clone();
        let docx = docx_bytes(&paragraph(&format!("Owner number {i}")));
        async move {
            let resp = app.oneshot(upload("report.docx", &docx)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let body = to_bytes(resp.into_body(), RESPONSE_LIMIT).await.unwrap();
            (i, pdf_text(&body))
        }
    });

    for (i, text) in futures::future::join_all(requests).await {
        assert!(
            text.contains(&format!("Owner number {i}")),
            "request {i} received another request's PDF: {text}"
        );
    }
    assert!(server.leftovers().is_empty());
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::structural();
    let (status, _, body) = server
        .send(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["service"], "docx2pdf");
    assert_eq!(json["backend"], "structural-builtin");
}

#[tokio::test]
async fn test_convert_path_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServiceConfig::builder()
        .work_dir(dir.path().join("work"))
        .backend(BackendKind::Structural)
        .build()
        .unwrap();
    let orchestrator = Orchestrator::new(&config).unwrap();

    let input = dir.path().join("memo.docx");
    std::fs::write(&input, docx_bytes(&paragraph("Memo to staff"))).unwrap();
    let doc = orchestrator.convert_path(&input).await.unwrap();
    assert_eq!(doc.download_name(), "memo.pdf");

    let dest = dir.path().join("out/memo.pdf");
    let written = doc.save_to(&dest).await.unwrap();
    let bytes = std::fs::read(&dest).unwrap();
    assert_eq!(written, bytes.len() as u64);
    assert!(pdf_text(&bytes).contains("Memo to staff"));
    assert!(std::fs::read_dir(orchestrator.work_dir()).unwrap().next().is_none());
}

// ── Live engines (E2E_ENABLED) ───────────────────────────────────────────────

async fn live_conversion(server: TestServer, context: &str) {
    let (status, headers, body) = server.send(upload("letter.docx", &two_page_letter())).await;
    assert_eq!(status, StatusCode::OK, "[{context}] {}", String::from_utf8_lossy(&body));
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"letter.pdf\""
    );
    assert_pdf(&body, context);
    println!("[{context}] {} bytes", body.len());
    assert!(server.leftovers().is_empty(), "[{context}] leftovers");
}

#[tokio::test]
async fn test_e2e_libreoffice() {
    let soffice: PathBuf = e2e_skip_unless_ready!(Engine::LibreOffice);
    println!("using {}", soffice.display());
    let server = TestServer::with(|b| {
        b.backend(BackendKind::Native)
            .soffice_path(&soffice)
            .conversion_timeout_secs(120)
    });
    live_conversion(server, "libreoffice").await;
}

#[tokio::test]
async fn test_e2e_libreoffice_concurrent() {
    let soffice: PathBuf = e2e_skip_unless_ready!(Engine::LibreOffice);
    let server = TestServer::with(|b| {
        b.backend(BackendKind::Native)
            .soffice_path(&soffice)
            .conversion_timeout_secs(180)
    });
    let requests = (0..3).map(|_| {
        let app = server.app.clone();
        async move {
            let resp = app
                .oneshot(upload("same.docx", &two_page_letter()))
                .await
                .unwrap();
            let status = resp.status();
            let body = to_bytes(resp.into_body(), RESPONSE_LIMIT).await.unwrap();
            (status, body)
        }
    });
    for (status, body) in futures::future::join_all(requests).await {
        assert_eq!(status, StatusCode::OK);
        assert_pdf(&body, "libreoffice concurrent");
    }
    assert!(server.leftovers().is_empty());
}

#[tokio::test]
async fn test_e2e_chromium_renderer() {
    let chromium: PathBuf = e2e_skip_unless_ready!(Engine::Chromium);
    println!("using {}", chromium.display());
    let server = TestServer::with(|b| {
        b.backend(BackendKind::Structural)
            .renderer(RendererKind::Chromium)
            .chromium_path(&chromium)
            .conversion_timeout_secs(120)
    });
    live_conversion(server, "chromium").await;
}
