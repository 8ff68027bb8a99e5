//! Replays a small crawl from a JSONL file into an on-disk SQLite database.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use site_audit::storage::{init_db_pool_with_path, SqliteReportStore, SqliteUrlRepository};
use site_audit::{run_replay, Opt, ProjectId, Severity, UrlRepository};

const CRAWL: &str = r#"# example.com crawl
{"url": "https://example.com/", "status": 200, "content_type": "text/html", "html": "<html><head><link rel=\"canonical\" href=\"https://example.com/\"></head><body><a href=\"/missing\">x</a><a href=\"/loop-a\">y</a></body></html>", "url_id": 1}
{"url": "https://example.com/missing", "status": 404, "content_type": "text/html", "html": "<html></html>", "url_id": 2}
{"url": "https://example.com/loop-a", "status": 301, "headers": {"Location": "/loop-b"}, "url_id": 3}
{"url": "https://example.com/loop-b", "status": 301, "headers": {"Location": "/loop-a"}, "url_id": 4}
{"url": "https://example.com/dup", "status": 200, "content_type": "text/html", "html": "<html><head><link rel=\"canonical\" href=\"/missing\"></head></html>", "url_id": 5}
this line is not json
"#;

#[tokio::test]
async fn test_replay_persists_findings() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("crawl.jsonl");
    let db = dir.path().join("audit.db");
    std::fs::File::create(&input)
        .and_then(|mut f| f.write_all(CRAWL.as_bytes()))
        .expect("write input");

    let opt = Opt::try_parse_from([
        "site_audit",
        input.to_str().unwrap(),
        "--db-path",
        db.to_str().unwrap(),
        "--project-id",
        "9",
        "--concurrency",
        "3",
    ])
    .expect("options parse");

    let summary = run_replay(&opt).await.expect("replay succeeds");
    assert_eq!(summary.pages, 5);
    assert_eq!(summary.audited, 5);
    assert_eq!(summary.failed, 0);
    assert!(summary.findings > 0);

    let pool = init_db_pool_with_path(&db).await.expect("db reopens");
    let repository = SqliteUrlRepository::new(Arc::clone(&pool));
    assert_eq!(
        repository
            .status_of(ProjectId(9), "https://example.com/missing")
            .await
            .unwrap(),
        Some(404)
    );

    let store = SqliteReportStore::new(pool);
    let findings = store.findings(ProjectId(9)).await.expect("findings readable");
    assert_eq!(findings.len(), summary.findings);

    let codes: Vec<&str> = findings.iter().map(|(_, f)| f.code.as_str()).collect();
    assert!(codes.contains(&"broken_link"), "codes: {:?}", codes);
    assert!(codes.contains(&"link_to_redirect"), "codes: {:?}", codes);
    assert!(codes.contains(&"redirect_loop"), "codes: {:?}", codes);
    assert!(codes.contains(&"canonical_target_error"), "codes: {:?}", codes);

    let (page, canonical) = findings
        .iter()
        .find(|(_, f)| f.code == "canonical_target_error")
        .expect("canonical error stored");
    assert_eq!(page, "https://example.com/dup");
    assert_eq!(canonical.severity, Severity::Error);

    assert!(store.findings(ProjectId(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_replay_missing_input_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let opt = Opt::try_parse_from([
        "site_audit",
        dir.path().join("absent.jsonl").to_str().unwrap(),
        "--db-path",
        dir.path().join("audit.db").to_str().unwrap(),
    ])
    .expect("options parse");
    let err = run_replay(&opt).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to open input file"));
}
