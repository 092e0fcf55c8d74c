//! Tests for the object store provider
//!

#![allow(missing_docs)]

use std::io::{Read, Write};

use artifact_store::{ObjectStoreConfig, ObjectStoreProvider, StorageError, StorageProvider};
use common::{StubResponse, StubServer};

mod common;

fn provider(server: &StubServer) -> ObjectStoreProvider {
    ObjectStoreProvider::new(ObjectStoreConfig {
        domain: server.url(),
        bucket: "runtime-backups".into(),
        access_key_id: "AKIDEXAMPLE".into(),
        secret_access_key: "secret".into(),
        region: "us-east-1".into(),
    })
}

#[test]
fn upload_then_download() {
    let _logger = shared::test::init_test_logger();
    let server = StubServer::start(vec![
        StubResponse::status(200),
        StubResponse::status(200),
        StubResponse::body(200, "restored bytes"),
    ]);
    let provider = provider(&server);

    let mut writer = provider.writer(&["archive/2024", "ccdb.backup"]).unwrap();
    writer.write_all(b"dumped bytes").unwrap();
    writer.finish().unwrap();

    let mut contents = String::new();
    provider
        .reader(&["archive/2024", "ccdb.backup"])
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "restored bytes");

    let requests = server.finish();
    assert_eq!(requests.len(), 3, "the bucket is only validated once");

    assert_eq!(requests[0].method, "HEAD");
    assert_eq!(requests[0].path, "/runtime-backups");

    assert_eq!(requests[1].method, "PUT");
    assert_eq!(requests[1].path, "/runtime-backups/archive/2024/ccdb.backup");
    assert_eq!(requests[1].body, b"dumped bytes");
    assert!(
        requests[1]
            .header("authorization")
            .unwrap()
            .starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/")
    );
    assert_eq!(
        requests[1].header("x-amz-content-sha256"),
        Some("UNSIGNED-PAYLOAD")
    );

    assert_eq!(requests[2].method, "GET");
    assert_eq!(requests[2].path, "/runtime-backups/archive/2024/ccdb.backup");
}

#[test]
fn missing_object_is_not_found() {
    let server = StubServer::start(vec![StubResponse::status(200), StubResponse::status(404)]);
    let provider = provider(&server);

    let result = provider.reader(&["archive", "mysql.backup"]);
    match result {
        Err(StorageError::NotFound(key)) => assert_eq!(key, "archive/mysql.backup"),
        Err(error) => panic!("unexpected error: {error}"),
        Ok(_) => panic!("expected a missing object"),
    }

    server.finish();
}

#[test]
fn inaccessible_bucket() {
    let server = StubServer::start(vec![StubResponse::status(403)]);
    let provider = provider(&server);

    let result = provider.writer(&["archive", "ccdb.backup"]);
    assert!(matches!(result, Err(StorageError::Bucket(bucket, 403)) if bucket == "runtime-backups"));

    server.finish();
}

#[test]
fn abandoned_writer_uploads_nothing() {
    let server = StubServer::start(vec![StubResponse::status(200)]);
    let provider = provider(&server);

    {
        let mut writer = provider.writer(&["archive", "uaadb.backup"]).unwrap();
        writer.write_all(b"partial").unwrap();
    }

    let requests = server.finish();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "HEAD");
}
