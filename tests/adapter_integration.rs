//! End-to-end download flows through the real site adapters against a mock
//! server: detail page, download page, challenge handling and transfer.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use manual_archiver_core::adapter::{
    Challenge, ManualsBaseAdapter, ManualsLibAdapter, ManualzzAdapter, Session,
};
use manual_archiver_core::catalog::{ItemStatus, PendingFilter};
use manual_archiver_core::config::{ManualsBaseConfig, ManualsLibConfig, ManualzzConfig};
use manual_archiver_core::download::{
    CaptchaError, CaptchaSolver, ClientOptions, DelayRange, RetryPolicy,
};
use manual_archiver_core::{
    BlobStore, Catalog, Database, DownloadEngine, HostBlocklist, HttpClient, NewManual, Source,
};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PDF_BYTES: &[u8] = b"%PDF-1.5\n%\xe2\xe3\xcf\xd3\ntrailer\n%%EOF\n";

struct CountingSolver {
    calls: AtomicUsize,
}

#[async_trait]
impl CaptchaSolver for CountingSolver {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn solve(&self, _challenge: &Challenge) -> Result<String, CaptchaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("tok123".to_string())
    }
}

fn client() -> HttpClient {
    HttpClient::new(&ClientOptions::session().with_retry_policy(RetryPolicy::immediate(1)))
        .unwrap()
}

fn session(source: Source) -> Session {
    Session::new(source, client(), Arc::new(HostBlocklist::builtin()))
        .with_navigation_delay(DelayRange::none())
}

struct Harness {
    catalog: Catalog,
    engine: DownloadEngine,
    solver: Arc<CountingSolver>,
    _dir: TempDir,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::new(Database::new(&dir.path().join("manuals.db")).await.unwrap());
    let solver = Arc::new(CountingSolver {
        calls: AtomicUsize::new(0),
    });
    let engine = DownloadEngine::new(
        catalog.clone(),
        BlobStore::new(dir.path().join("blobs")),
        client(),
        Arc::clone(&solver) as Arc<dyn CaptchaSolver>,
    )
    .with_item_delay(DelayRange::none());
    Harness {
        catalog,
        engine,
        solver,
        _dir: dir,
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(format!("<html><body>{body}</body></html>"))
}

fn pdf() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/pdf")
        .set_body_bytes(PDF_BYTES)
}

#[tokio::test]
async fn test_manualslib_recaptcha_flow_downloads_pdf() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manual/123/Sony-Kv-27.html"))
        .respond_with(html(r#"<a href="/download/123/Sony-Kv-27.html">Download</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/123/Sony-Kv-27.html"))
        .respond_with(html(
            r#"<form action="/download/123/Sony-Kv-27.html" method="post">
                 <input type="hidden" name="id" value="123">
                 <div class="g-recaptcha" data-sitekey="6LcTestKey"></div>
               </form>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/download/123/Sony-Kv-27.html"))
        .and(body_string_contains("g-recaptcha-response=tok123"))
        .and(body_string_contains("id=123"))
        .respond_with(html(r#"<a href="/files/123.pdf">Download PDF</a>"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/123.pdf"))
        .respond_with(pdf())
        .mount(&server)
        .await;

    let h = harness().await;
    let id = h
        .catalog
        .upsert_item(
            &NewManual::new(
                Source::ManualsLib,
                "123",
                format!("{}/manual/123/Sony-Kv-27.html", server.uri()),
            )
            .with_brand("Sony")
            .with_model("KV-27"),
        )
        .await
        .unwrap();
    let adapter = ManualsLibAdapter::with_base_url(
        session(Source::ManualsLib),
        &ManualsLibConfig::default(),
        &server.uri(),
    )
    .unwrap();

    let summary = h.engine.run(&adapter, &PendingFilter::default()).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(h.solver.calls.load(Ordering::SeqCst), 1);
    let item = h.catalog.get(id).await.unwrap().unwrap();
    assert_eq!(item.status(), ItemStatus::Downloaded);
    assert_eq!(item.original_filename.as_deref(), Some("123.pdf"));
}

#[tokio::test]
async fn test_manualsbase_form_post_goes_through_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manual/9/tv/sony/kv-27/"))
        .respond_with(html(r#"<a href="/manual/download/9/">Download</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/manual/download/9/"))
        .respond_with(html(
            r#"<form action="/manual/get/" method="post">
                 <input type="hidden" name="manual_id" value="9">
                 <button class="get-manual-btn">Get manual</button>
               </form>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/manual/get/"))
        .and(body_string_contains("manual_id=9"))
        .respond_with(pdf().insert_header(
            "content-disposition",
            r#"attachment; filename="Sony KV-27.pdf""#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness().await;
    let id = h
        .catalog
        .upsert_item(
            &NewManual::new(
                Source::ManualsBase,
                "9",
                format!("{}/manual/9/tv/sony/kv-27/", server.uri()),
            )
            .with_model("KV-27"),
        )
        .await
        .unwrap();
    let adapter = ManualsBaseAdapter::with_base_url(
        session(Source::ManualsBase),
        &ManualsBaseConfig::default(),
        &server.uri(),
    )
    .unwrap();

    let summary = h.engine.run(&adapter, &PendingFilter::default()).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(h.solver.calls.load(Ordering::SeqCst), 0);
    let item = h.catalog.get(id).await.unwrap().unwrap();
    assert_eq!(item.original_filename.as_deref(), Some("Sony KV-27.pdf"));
}

#[tokio::test]
async fn test_manualzz_prefers_pdf_format_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/555"))
        .respond_with(html(
            r#"<div class="formats">
                 <a class="format" href="/files/555.djvu">DJVU</a>
                 <a class="format" href="/files/555.pdf">PDF</a>
               </div>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/555.pdf"))
        .respond_with(pdf())
        .expect(1)
        .mount(&server)
        .await;

    let h = harness().await;
    let id = h
        .catalog
        .upsert_item(
            &NewManual::new(
                Source::Manualzz,
                "555",
                format!("{}/doc/555/sony-kv-27", server.uri()),
            )
            .with_model("Sony KV-27"),
        )
        .await
        .unwrap();
    let adapter = ManualzzAdapter::with_base_url(
        session(Source::Manualzz),
        &ManualzzConfig::default(),
        &server.uri(),
    )
    .unwrap();

    let summary = h.engine.run(&adapter, &PendingFilter::default()).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert!(h.catalog.get(id).await.unwrap().unwrap().downloaded);
}

#[tokio::test]
async fn test_manualzz_page_without_file_link_is_structural_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/556"))
        .respond_with(html("<p>This document has been removed.</p>"))
        .mount(&server)
        .await;

    let h = harness().await;
    let id = h
        .catalog
        .upsert_item(&NewManual::new(
            Source::Manualzz,
            "556",
            format!("{}/doc/556/gone", server.uri()),
        ))
        .await
        .unwrap();
    let adapter = ManualzzAdapter::with_base_url(
        session(Source::Manualzz),
        &ManualzzConfig::default(),
        &server.uri(),
    )
    .unwrap();

    let summary = h.engine.run(&adapter, &PendingFilter::default()).await.unwrap();

    assert_eq!(summary.failed, 1);
    let item = h.catalog.get(id).await.unwrap().unwrap();
    assert_eq!(item.status(), ItemStatus::Pending);
    let error = item.last_error.unwrap();
    assert!(error.starts_with("resolving: "), "{error}");
    assert!(error.contains("no PDF format link"), "{error}");
}
