//! Integration tests for archive sync: existence checks, uploads and
//! verification against a mock archive.

use std::path::Path;

use manual_archiver_core::archive::{
    ArchiveCredentials, CheckOptions, CheckPacing, UploadOptions, verify_archived,
};
use manual_archiver_core::catalog::{DownloadRecord, ItemStatus};
use manual_archiver_core::download::{ClientOptions, DelayRange, RetryPolicy};
use manual_archiver_core::{
    ArchiveChecker, ArchiveClient, ArchiveError, BlobStore, Catalog, Database, HttpClient,
    NewManual, Source, Uploader,
};
use tempfile::TempDir;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PDF_BYTES: &[u8] = b"%PDF-1.4\nstub\n%%EOF\n";
const PDF_MD5: &str = "0fb59651cd112499422a51a1b56d114a";
const PDF_SHA1: &str = "7e0ed233636446a8f065a6117a0f068d39a8bb3d";
const PDF_SHA256: &str = "5c272c0978db6e66d762514a2ea1e4c6ca1216a0c53a421837c82437822d96b8";

async fn catalog(dir: &Path) -> Catalog {
    Catalog::new(Database::new(&dir.join("manuals.db")).await.unwrap())
}

fn archive(server: &MockServer, credentials: Option<ArchiveCredentials>) -> ArchiveClient {
    ArchiveClient::with_base_urls(
        credentials,
        &format!("{}/details", server.uri()),
        &format!("{}/s3", server.uri()),
    )
    .unwrap()
    .with_http_client(
        HttpClient::new(&ClientOptions::default().with_retry_policy(RetryPolicy::immediate(1)))
            .unwrap(),
    )
}

fn credentials() -> ArchiveCredentials {
    ArchiveCredentials {
        access_key: "access".to_string(),
        secret_key: "secret".to_string(),
    }
}

async fn head(server: &MockServer, identifier: &str, status: u16) {
    Mock::given(method("HEAD"))
        .and(path(format!("/details/{identifier}")))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn add(catalog: &Catalog, source: Source, id: &str) -> i64 {
    catalog
        .upsert_item(
            &NewManual::new(source, id, format!("https://example.invalid/manual/{id}"))
                .with_brand("Sony")
                .with_model("KV-27")
                .with_document_type("Operating Instructions"),
        )
        .await
        .unwrap()
}

async fn add_downloaded(catalog: &Catalog, blobs: &BlobStore, id: &str) -> i64 {
    add_downloaded_with(catalog, blobs, id, true).await
}

async fn add_downloaded_with(
    catalog: &Catalog,
    blobs: &BlobStore,
    id: &str,
    record_checksums: bool,
) -> i64 {
    let item_id = add(catalog, Source::ManualsLib, id).await;
    let put = blobs.put(PDF_BYTES).await.unwrap();
    catalog
        .mark_downloaded(
            item_id,
            &DownloadRecord {
                content_hash: put.digest.clone(),
                blob_path: put.path.display().to_string(),
                original_filename: "KV-27.pdf".to_string(),
                file_size: i64::try_from(put.size).unwrap(),
                checksums: record_checksums.then(|| put.checksums.clone()),
            },
        )
        .await
        .unwrap();
    item_id
}

#[tokio::test]
async fn test_checker_marks_found_items_and_counts_probe_errors() {
    let server = MockServer::start().await;
    head(&server, "manualslib-id-1", 200).await;
    head(&server, "manualslib-id-2", 404).await;
    head(&server, "manualslib-id-3", 503).await;
    let dir = TempDir::new().unwrap();
    let catalog = catalog(dir.path()).await;
    let found = add(&catalog, Source::ManualsLib, "1").await;
    let absent = add(&catalog, Source::ManualsLib, "2").await;
    let flaky = add(&catalog, Source::ManualsLib, "3").await;

    let checker = ArchiveChecker::new(catalog.clone(), archive(&server, None), CheckPacing::none());
    let summary = checker
        .run(&CheckOptions {
            source: None,
            limit: Some(3),
            continuous: false,
        })
        .await
        .unwrap();

    assert_eq!(summary.checked, 3);
    assert_eq!(summary.found, 1);
    assert_eq!(summary.errors, 1);

    let found = catalog.get(found).await.unwrap().unwrap();
    assert_eq!(found.status(), ItemStatus::Archived);
    assert_eq!(
        found.archive_url,
        Some(format!("{}/details/manualslib-id-1", server.uri()))
    );
    let absent = catalog.get(absent).await.unwrap().unwrap();
    assert_eq!(absent.status(), ItemStatus::Pending);
    assert!(absent.archive_checked_at.is_some());
    // A failed probe leaves the item for the next round.
    assert!(catalog.get(flaky).await.unwrap().unwrap().archive_checked_at.is_none());
    let next = catalog.list_needing_archive_check(None, None).await.unwrap();
    assert_eq!(next.len(), 1);
}

#[tokio::test]
async fn test_checker_source_filter_skips_other_sources() {
    let server = MockServer::start().await;
    head(&server, "manualzz-id-9", 404).await;
    let dir = TempDir::new().unwrap();
    let catalog = catalog(dir.path()).await;
    add(&catalog, Source::ManualsLib, "1").await;
    add(&catalog, Source::Manualzz, "9").await;

    let summary = ArchiveChecker::new(catalog.clone(), archive(&server, None), CheckPacing::none())
        .run(&CheckOptions {
            source: Some(Source::Manualzz),
            limit: None,
            continuous: false,
        })
        .await
        .unwrap();

    assert_eq!(summary.checked, 1);
    assert_eq!(summary.errors, 0);
}

#[tokio::test]
async fn test_uploader_puts_blob_with_metadata_and_marks_archived() {
    let server = MockServer::start().await;
    head(&server, "manualslib-id-42", 404).await;
    Mock::given(method("PUT"))
        .and(path("/s3/manualslib-id-42/KV-27.pdf"))
        .and(header("authorization", "LOW access:secret"))
        .and(header("x-archive-meta-mediatype", "texts"))
        .and(header("x-archive-meta-title", "Sony KV-27 Operating Instructions"))
        .and(header("x-archive-auto-make-bucket", "1"))
        .and(header(
            "x-archive-meta01-external-identifier",
            format!("urn:md5:{PDF_MD5}").as_str(),
        ))
        .and(header(
            "x-archive-meta02-external-identifier",
            format!("urn:sha1:{PDF_SHA1}").as_str(),
        ))
        .and(header(
            "x-archive-meta03-external-identifier",
            format!("urn:sha256:{PDF_SHA256}").as_str(),
        ))
        .and(body_bytes(PDF_BYTES))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let catalog = catalog(dir.path()).await;
    let blobs = BlobStore::new(dir.path().join("blobs"));
    let id = add_downloaded(&catalog, &blobs, "42").await;

    let summary = Uploader::new(catalog.clone(), archive(&server, Some(credentials())))
        .run(&UploadOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.failed, 0);
    let item = catalog.get(id).await.unwrap().unwrap();
    assert_eq!(item.status(), ItemStatus::Archived);
    assert_eq!(
        item.archive_url,
        Some(format!("{}/details/manualslib-id-42", server.uri()))
    );
}

#[tokio::test]
async fn test_uploader_checksums_blob_when_catalog_row_has_none() {
    let server = MockServer::start().await;
    head(&server, "manualslib-id-46", 404).await;
    Mock::given(method("PUT"))
        .and(path("/s3/manualslib-id-46/KV-27.pdf"))
        .and(header(
            "x-archive-meta01-external-identifier",
            format!("urn:md5:{PDF_MD5}").as_str(),
        ))
        .and(header(
            "x-archive-meta02-external-identifier",
            format!("urn:sha1:{PDF_SHA1}").as_str(),
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let catalog = catalog(dir.path()).await;
    let blobs = BlobStore::new(dir.path().join("blobs"));
    let id = add_downloaded_with(&catalog, &blobs, "46", false).await;
    assert!(catalog.get(id).await.unwrap().unwrap().file_md5.is_none());

    let summary = Uploader::new(catalog.clone(), archive(&server, Some(credentials())))
        .run(&UploadOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.uploaded, 1);
}

#[tokio::test]
async fn test_uploader_marks_existing_identifier_without_uploading() {
    let server = MockServer::start().await;
    head(&server, "manualslib-id-43", 200).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let catalog = catalog(dir.path()).await;
    let blobs = BlobStore::new(dir.path().join("blobs"));
    let id = add_downloaded(&catalog, &blobs, "43").await;

    let summary = Uploader::new(catalog.clone(), archive(&server, Some(credentials())))
        .run(&UploadOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.already_present, 1);
    assert!(catalog.get(id).await.unwrap().unwrap().archived);
}

#[tokio::test]
async fn test_uploader_rejection_is_counted_and_item_stays_downloaded() {
    let server = MockServer::start().await;
    head(&server, "manualslib-id-44", 404).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("<Error>AccessDenied</Error>"))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let catalog = catalog(dir.path()).await;
    let blobs = BlobStore::new(dir.path().join("blobs"));
    let id = add_downloaded(&catalog, &blobs, "44").await;

    let summary = Uploader::new(catalog.clone(), archive(&server, Some(credentials())))
        .run(&UploadOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(
        catalog.get(id).await.unwrap().unwrap().status(),
        ItemStatus::Downloaded
    );
}

#[tokio::test]
async fn test_uploader_requires_credentials_unless_dry_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let catalog = catalog(dir.path()).await;
    let blobs = BlobStore::new(dir.path().join("blobs"));
    let id = add_downloaded(&catalog, &blobs, "45").await;
    let uploader = Uploader::new(catalog.clone(), archive(&server, None));

    let err = uploader.run(&UploadOptions::default()).await.unwrap_err();
    assert!(matches!(err, ArchiveError::MissingCredentials));

    let preview = uploader
        .run(&UploadOptions {
            dry_run: true,
            ..UploadOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(preview.previews.len(), 1);
    assert_eq!(preview.previews[0].item_id, id);
    assert_eq!(preview.previews[0].metadata.identifier, "manualslib-id-45");
    assert_eq!(preview.previews[0].metadata.remote_filename, "KV-27.pdf");
    assert_eq!(
        preview.previews[0].metadata.external_identifiers,
        vec![
            format!("urn:md5:{PDF_MD5}"),
            format!("urn:sha1:{PDF_SHA1}"),
            format!("urn:sha256:{PDF_SHA256}"),
        ]
    );
    assert!(!catalog.get(id).await.unwrap().unwrap().archived);
}

#[tokio::test]
async fn test_verify_reports_and_fixes_missing_items() {
    let server = MockServer::start().await;
    head(&server, "manualslib-id-1", 200).await;
    head(&server, "manualslib-id-2", 404).await;
    let dir = TempDir::new().unwrap();
    let catalog = catalog(dir.path()).await;
    let kept = add(&catalog, Source::ManualsLib, "1").await;
    let lost = add(&catalog, Source::ManualsLib, "2").await;
    catalog.mark_archived(kept, "https://archive.org/details/manualslib-id-1").await.unwrap();
    catalog.mark_archived(lost, "https://archive.org/details/manualslib-id-2").await.unwrap();
    let client = archive(&server, None);

    let report = verify_archived(&catalog, &client, None, false, DelayRange::none())
        .await
        .unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].id, lost);
    assert_eq!(report.fixed, 0);
    assert!(catalog.get(lost).await.unwrap().unwrap().archived);

    let fixed = verify_archived(&catalog, &client, None, true, DelayRange::none())
        .await
        .unwrap();
    assert_eq!(fixed.fixed, 1);
    let lost = catalog.get(lost).await.unwrap().unwrap();
    assert_eq!(lost.status(), ItemStatus::Pending);
    assert!(lost.archive_url.is_none());
    assert!(catalog.get(kept).await.unwrap().unwrap().archived);
}
