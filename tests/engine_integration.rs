//! Integration tests for the download engine.
//!
//! A scripted adapter stands in for a site: it hands the engine download
//! targets (or challenges) pointing at a mock server, so the tests exercise
//! the real transfer, verification, blob store and catalog paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use manual_archiver_core::adapter::{
    Challenge, ChallengeKind, DownloadTarget, ListingPage, Resolution,
};
use manual_archiver_core::catalog::{Collection, ItemStatus, NewCollection, PendingFilter};
use manual_archiver_core::download::{
    CaptchaError, CaptchaSolver, ClientOptions, DelayRange, RetryPolicy,
};
use manual_archiver_core::{
    AdapterError, ArchiveClient, BlobStore, Catalog, Database, DownloadEngine, EngineError,
    HostBlocklist, HttpClient, ManualItem, NewManual, SiteAdapter, Source,
};
use manual_archiver_core::adapter::Session;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n%%EOF\n";

/// What the scripted adapter does for one source id.
#[derive(Clone)]
enum Script {
    Ready(String),
    ChallengeThen(String),
    Broken,
}

struct ScriptedAdapter {
    source: Source,
    session: Session,
    scripts: HashMap<String, Script>,
    tokens: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    fn new(source: Source, scripts: &[(&str, Script)]) -> Self {
        Self {
            source,
            session: Session::new(source, test_client(), Arc::new(HostBlocklist::empty()))
                .with_navigation_delay(DelayRange::none()),
            scripts: scripts
                .iter()
                .map(|(id, s)| ((*id).to_string(), s.clone()))
                .collect(),
            tokens: Mutex::new(Vec::new()),
        }
    }

    fn challenge(url: &str) -> Challenge {
        Challenge {
            kind: ChallengeKind::Recaptcha,
            site_key: "6Lc-test".to_string(),
            page_url: url.to_string(),
            submit_url: url.to_string(),
            fields: vec![("id".to_string(), "1".to_string())],
        }
    }
}

#[async_trait]
impl SiteAdapter for ScriptedAdapter {
    fn source(&self) -> Source {
        self.source
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn configured_collections(&self) -> Vec<NewCollection> {
        Vec::new()
    }

    fn named_collections(&self, _name: &str) -> Vec<NewCollection> {
        Vec::new()
    }

    async fn discover_collections(&self) -> Result<Vec<NewCollection>, AdapterError> {
        Ok(Vec::new())
    }

    async fn list_page(
        &self,
        _collection: &Collection,
        _page: u32,
    ) -> Result<ListingPage, AdapterError> {
        Ok(ListingPage::default())
    }

    async fn resolve_download(&self, item: &ManualItem) -> Result<Resolution, AdapterError> {
        match self.scripts.get(&item.source_id) {
            Some(Script::Ready(url)) => Ok(Resolution::Ready(DownloadTarget::get(url, "manual.pdf"))),
            Some(Script::ChallengeThen(url)) => Ok(Resolution::Challenge(Self::challenge(url))),
            Some(Script::Broken) | None => Err(AdapterError::structural(
                self.source,
                &item.detail_page_url,
                "no download link",
            )),
        }
    }

    async fn submit_challenge(
        &self,
        item: &ManualItem,
        _challenge: &Challenge,
        token: &str,
    ) -> Result<Resolution, AdapterError> {
        self.tokens.lock().unwrap().push(token.to_string());
        match self.scripts.get(&item.source_id) {
            Some(Script::ChallengeThen(url)) => {
                Ok(Resolution::Ready(DownloadTarget::get(url, "manual.pdf")))
            }
            _ => Err(AdapterError::structural(
                self.source,
                &item.detail_page_url,
                "unexpected challenge",
            )),
        }
    }
}

struct FixedSolver {
    token: Option<&'static str>,
    calls: AtomicUsize,
}

#[async_trait]
impl CaptchaSolver for FixedSolver {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn solve(&self, _challenge: &Challenge) -> Result<String, CaptchaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.token
            .map(str::to_string)
            .ok_or(CaptchaError::Timeout {
                waited: Duration::from_secs(300),
            })
    }
}

fn test_client() -> HttpClient {
    HttpClient::new(&ClientOptions::default().with_retry_policy(RetryPolicy::immediate(1))).unwrap()
}

fn solver(token: Option<&'static str>) -> Arc<FixedSolver> {
    Arc::new(FixedSolver {
        token,
        calls: AtomicUsize::new(0),
    })
}

async fn setup() -> (Catalog, BlobStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let catalog = Catalog::new(Database::new(&temp_dir.path().join("manuals.db")).await.unwrap());
    let blobs = BlobStore::new(temp_dir.path().join("blobs"));
    (catalog, blobs, temp_dir)
}

fn engine(catalog: &Catalog, blobs: &BlobStore, solver: Arc<FixedSolver>) -> DownloadEngine {
    DownloadEngine::new(catalog.clone(), blobs.clone(), test_client(), solver)
        .with_item_delay(DelayRange::none())
}

async fn add_item(catalog: &Catalog, source: Source, id: &str) -> i64 {
    catalog
        .upsert_item(
            &NewManual::new(source, id, format!("https://example.invalid/manual/{id}"))
                .with_brand("Sony")
                .with_model(format!("KV-{id}")),
        )
        .await
        .unwrap()
}

async fn serve_pdf(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(PDF_BYTES),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_run_downloads_pending_items_into_blob_store() {
    let server = MockServer::start().await;
    serve_pdf(&server, "/files/a.pdf").await;
    let (catalog, blobs, _dir) = setup().await;
    let id = add_item(&catalog, Source::ManualsLib, "1").await;
    let adapter = ScriptedAdapter::new(
        Source::ManualsLib,
        &[("1", Script::Ready(format!("{}/files/a.pdf", server.uri())))],
    );

    let summary = engine(&catalog, &blobs, solver(None))
        .run(&adapter, &PendingFilter::default())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    let item = catalog.get(id).await.unwrap().unwrap();
    assert_eq!(item.status(), ItemStatus::Downloaded);
    assert_eq!(item.original_filename.as_deref(), Some("a.pdf"));
    assert_eq!(item.file_size, Some(i64::try_from(PDF_BYTES.len()).unwrap()));
    let blob_path = std::path::PathBuf::from(item.blob_path.unwrap());
    assert_eq!(std::fs::read(&blob_path).unwrap(), PDF_BYTES);
    let hash = item.content_hash.unwrap();
    assert!(blob_path.ends_with(format!("{}/{}/{hash}.pdf", &hash[..2], &hash[2..4])));
}

#[tokio::test]
async fn test_same_bytes_from_two_sources_share_one_blob() {
    let server = MockServer::start().await;
    serve_pdf(&server, "/lib.pdf").await;
    serve_pdf(&server, "/zz.pdf").await;
    let (catalog, blobs, _dir) = setup().await;
    let lib_id = add_item(&catalog, Source::ManualsLib, "10").await;
    let zz_id = add_item(&catalog, Source::Manualzz, "20").await;

    let lib = ScriptedAdapter::new(
        Source::ManualsLib,
        &[("10", Script::Ready(format!("{}/lib.pdf", server.uri())))],
    );
    let zz = ScriptedAdapter::new(
        Source::Manualzz,
        &[("20", Script::Ready(format!("{}/zz.pdf", server.uri())))],
    );
    let engine = engine(&catalog, &blobs, solver(None));
    engine.run(&lib, &PendingFilter::default()).await.unwrap();
    engine.run(&zz, &PendingFilter::default()).await.unwrap();

    let a = catalog.get(lib_id).await.unwrap().unwrap();
    let b = catalog.get(zz_id).await.unwrap().unwrap();
    assert_eq!(a.content_hash, b.content_hash);
    assert_eq!(a.blob_path, b.blob_path);
    assert_ne!(a.original_filename, b.original_filename);
}

#[tokio::test]
async fn test_circuit_breaker_stops_run_after_consecutive_failures() {
    let (catalog, blobs, _dir) = setup().await;
    let ids = [
        add_item(&catalog, Source::ManualsBase, "1").await,
        add_item(&catalog, Source::ManualsBase, "2").await,
        add_item(&catalog, Source::ManualsBase, "3").await,
        add_item(&catalog, Source::ManualsBase, "4").await,
    ];
    let adapter = ScriptedAdapter::new(Source::ManualsBase, &[]);

    let err = engine(&catalog, &blobs, solver(None))
        .with_breaker_threshold(3)
        .run(&adapter, &PendingFilter::default())
        .await
        .unwrap_err();

    let EngineError::CircuitOpen { failures, summary } = err else {
        panic!("expected circuit breaker, got {err:?}");
    };
    assert_eq!(failures, 3);
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.failed, 3);

    let first = catalog.get(ids[0]).await.unwrap().unwrap();
    assert_eq!(first.failed_attempts, 1);
    assert!(first.last_error.unwrap().starts_with("resolving: "));
    let untouched = catalog.get(ids[3]).await.unwrap().unwrap();
    assert_eq!(untouched.failed_attempts, 0);
    assert_eq!(untouched.status(), ItemStatus::Pending);
}

#[tokio::test]
async fn test_success_resets_breaker_between_failures() {
    let server = MockServer::start().await;
    serve_pdf(&server, "/ok.pdf").await;
    let (catalog, blobs, _dir) = setup().await;
    for id in ["1", "2", "3", "4", "5"] {
        add_item(&catalog, Source::ManualsLib, id).await;
    }
    let ok = Script::Ready(format!("{}/ok.pdf", server.uri()));
    let adapter = ScriptedAdapter::new(
        Source::ManualsLib,
        &[("1", Script::Broken), ("2", Script::Broken), ("3", ok), ("4", Script::Broken)],
    );

    let summary = engine(&catalog, &blobs, solver(None))
        .with_breaker_threshold(3)
        .run(&adapter, &PendingFilter::default())
        .await
        .unwrap();

    assert_eq!(summary.attempted, 5);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 4);
}

#[tokio::test]
async fn test_rerun_resumes_with_remaining_items_only() {
    let server = MockServer::start().await;
    serve_pdf(&server, "/one.pdf").await;
    let (catalog, blobs, _dir) = setup().await;
    add_item(&catalog, Source::ManualsLib, "1").await;
    add_item(&catalog, Source::ManualsLib, "2").await;
    let adapter = ScriptedAdapter::new(
        Source::ManualsLib,
        &[
            ("1", Script::Ready(format!("{}/one.pdf", server.uri()))),
            ("2", Script::Ready(format!("{}/one.pdf", server.uri()))),
        ],
    );
    let engine = engine(&catalog, &blobs, solver(None));

    let first = engine
        .run(
            &adapter,
            &PendingFilter {
                limit: Some(1),
                ..PendingFilter::default()
            },
        )
        .await
        .unwrap();
    let second = engine.run(&adapter, &PendingFilter::default()).await.unwrap();
    let third = engine.run(&adapter, &PendingFilter::default()).await.unwrap();

    assert_eq!(first.succeeded, 1);
    assert_eq!(second.attempted, 1);
    assert_eq!(second.succeeded, 1);
    assert_eq!(third.attempted, 0);
}

#[tokio::test]
async fn test_challenge_is_solved_and_token_submitted() {
    let server = MockServer::start().await;
    serve_pdf(&server, "/gated.pdf").await;
    let (catalog, blobs, _dir) = setup().await;
    let id = add_item(&catalog, Source::Manualzz, "5").await;
    let adapter = ScriptedAdapter::new(
        Source::Manualzz,
        &[("5", Script::ChallengeThen(format!("{}/gated.pdf", server.uri())))],
    );
    let solver = solver(Some("solved-token"));

    let summary = engine(&catalog, &blobs, Arc::clone(&solver))
        .run(&adapter, &PendingFilter::default())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*adapter.tokens.lock().unwrap(), vec!["solved-token".to_string()]);
    assert!(catalog.get(id).await.unwrap().unwrap().downloaded);
}

#[tokio::test]
async fn test_captcha_timeout_is_recorded_as_item_failure() {
    let (catalog, blobs, _dir) = setup().await;
    let id = add_item(&catalog, Source::Manualzz, "6").await;
    let adapter = ScriptedAdapter::new(
        Source::Manualzz,
        &[("6", Script::ChallengeThen("http://127.0.0.1:9/never".to_string()))],
    );

    let summary = engine(&catalog, &blobs, solver(None))
        .run(&adapter, &PendingFilter::default())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    let item = catalog.get(id).await.unwrap().unwrap();
    assert!(item.last_error.unwrap().starts_with("captcha_wait: "));
    assert!(adapter.tokens.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_html_response_fails_verification_and_leaves_no_staging_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body>Please sign in</body></html>"),
        )
        .mount(&server)
        .await;
    let (catalog, blobs, _dir) = setup().await;
    let id = add_item(&catalog, Source::ManualsLib, "8").await;
    let adapter = ScriptedAdapter::new(
        Source::ManualsLib,
        &[("8", Script::Ready(format!("{}/login", server.uri())))],
    );

    let summary = engine(&catalog, &blobs, solver(None))
        .run(&adapter, &PendingFilter::default())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    let item = catalog.get(id).await.unwrap().unwrap();
    assert!(item.last_error.unwrap().starts_with("verifying: "));
    assert!(item.blob_path.is_none());
    let staged = std::fs::read_dir(blobs.staging_dir()).unwrap().count();
    assert_eq!(staged, 0);
}

#[tokio::test]
async fn test_archive_precheck_skips_items_already_archived() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/details/manualslib-id-1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/details/manualslib-id-2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    serve_pdf(&server, "/two.pdf").await;

    let (catalog, blobs, _dir) = setup().await;
    let archived = add_item(&catalog, Source::ManualsLib, "1").await;
    let fetched = add_item(&catalog, Source::ManualsLib, "2").await;
    let adapter = ScriptedAdapter::new(
        Source::ManualsLib,
        &[("2", Script::Ready(format!("{}/two.pdf", server.uri())))],
    );
    let archive = ArchiveClient::with_base_urls(
        None,
        &format!("{}/details/", server.uri()),
        &format!("{}/s3/", server.uri()),
    )
    .unwrap();

    let summary = engine(&catalog, &blobs, solver(None))
        .with_archive_precheck(archive)
        .run(&adapter, &PendingFilter::default())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.succeeded, 1);
    let item = catalog.get(archived).await.unwrap().unwrap();
    assert_eq!(item.status(), ItemStatus::Archived);
    assert_eq!(
        item.archive_url,
        Some(format!("{}/details/manualslib-id-1", server.uri()))
    );
    assert!(catalog.get(fetched).await.unwrap().unwrap().downloaded);
}
