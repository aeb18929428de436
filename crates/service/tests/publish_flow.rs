//! End-to-end flows: create, upload, publish, lookup, delete.

use std::collections::HashMap;
use std::time::Duration;

use sha2::{Digest, Sha256};

use dlchub_service::{DlcService, ServiceConfig};
use dlchub_store::{BundleStatus, DataVersion, StoreError, VersionStatus};
use dlchub_upload::UploadFrame;

const GS: i64 = 1;

fn service(dir: &tempfile::TempDir) -> DlcService {
    let config = ServiceConfig {
        content_root: dir.path().join("content").to_string_lossy().into_owned(),
        serving_root: dir.path().join("www").to_string_lossy().into_owned(),
        public_url: "http://dlc.test/download".into(),
        upload_queue_depth: 4,
    };
    DlcService::new(config)
}

async fn upload(service: &DlcService, data_id: i64, name: &str, content: &[u8]) -> i64 {
    let (tx, rx) = service.upload_channel();
    let chunks: Vec<Vec<u8>> = content.chunks(3).map(|c| c.to_vec()).collect();
    let producer = tokio::spawn(async move {
        for chunk in chunks {
            tx.send(UploadFrame::Chunk(chunk)).await.unwrap();
        }
        tx.send(UploadFrame::Done).await.unwrap();
    });
    let receipt = service.uploads.upload(GS, data_id, name, rx).await.unwrap();
    producer.await.unwrap();
    receipt.bundle_id
}

async fn wait_terminal(service: &DlcService, data_id: i64) -> DataVersion {
    for _ in 0..400 {
        let version = service.stores.versions.get(GS, data_id).unwrap();
        if version.status != VersionStatus::Publishing {
            return version;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("publish did not reach a terminal state");
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[tokio::test]
async fn full_lifecycle_with_local_backend() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let data_id = service.stores.versions.create(GS, "game");
    let textures = upload(&service, data_id, "textures", b"texture bytes").await;
    let audio = upload(&service, data_id, "audio", b"audio bytes here").await;

    service
        .update_deployment_settings(GS, "game", "local", service.config().local_settings())
        .unwrap();
    service.publisher.publish(GS, data_id).unwrap();

    let version = wait_terminal(&service, data_id).await;
    assert_eq!(version.status, VersionStatus::Published);

    // Content landed in the serving tree.
    let served = dir
        .path()
        .join("www")
        .join("game")
        .join(data_id.to_string())
        .join(textures.to_string());
    assert_eq!(std::fs::read(served).unwrap(), b"texture bytes");

    // Clients see both bundles with hash, url and size.
    service
        .stores
        .app_versions
        .switch(GS, "game", "1.0", data_id)
        .unwrap();
    let directory = service
        .lookup
        .resolve(GS, "game", "1.0", &HashMap::new())
        .unwrap();
    assert_eq!(directory.len(), 2);
    assert_eq!(directory["textures"].hash, sha256_hex(b"texture bytes"));
    assert_eq!(directory["textures"].size, 13);
    assert_eq!(
        directory["textures"].url,
        format!("http://dlc.test/download/game/{data_id}/{textures}")
    );
    assert_eq!(directory["audio"].hash, sha256_hex(b"audio bytes here"));
    let _ = audio;

    // The published version is now immutable.
    let (tx, rx) = service.upload_channel();
    drop(tx);
    let result = service.uploads.upload(GS, data_id, "textures", rx).await;
    assert!(result.is_err());
    let result = service.stores.bundles.create(GS, data_id, "late");
    assert!(matches!(result, Err(StoreError::PublishedImmutable(_))));
    let result = service.stores.versions.delete(GS, data_id).await;
    assert!(matches!(result, Err(StoreError::VersionInUse(_))));
}

#[tokio::test]
async fn failed_publish_recovers_after_settings_change() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let data_id = service.stores.versions.create(GS, "game");
    let first = upload(&service, data_id, "first", b"aaaa").await;
    let second = upload(&service, data_id, "second", b"bbbb").await;

    // A remote backend whose transport cannot even start.
    let mut data = HashMap::new();
    data.insert("host".to_string(), "deploy@cdn.test:/srv/dlc".to_string());
    data.insert("zone".to_string(), "eu".to_string());
    data.insert("url".to_string(), "http://cdn.test/dlc".to_string());
    data.insert("key".to_string(), "not-a-real-key".to_string());
    data.insert("transport".to_string(), "/nonexistent/rsync".to_string());
    service
        .update_deployment_settings(GS, "game", "rsync", data)
        .unwrap();

    service.publisher.publish(GS, data_id).unwrap();
    let version = wait_terminal(&service, data_id).await;
    assert_eq!(version.status, VersionStatus::Error);
    // Deploy order is newest first, so "second" failed first.
    assert!(version.reason.contains("bundle 'second'"));
    assert_eq!(
        service.stores.bundles.get(GS, second).unwrap().status,
        BundleStatus::Error
    );
    assert_eq!(
        service.stores.bundles.get(GS, first).unwrap().status,
        BundleStatus::Uploaded
    );

    // Operator switches to the local backend and retries.
    service
        .update_deployment_settings(GS, "game", "local", service.config().local_settings())
        .unwrap();
    service.publisher.publish(GS, data_id).unwrap();
    let version = wait_terminal(&service, data_id).await;
    assert_eq!(version.status, VersionStatus::Published);
    for id in [first, second] {
        assert_eq!(
            service.stores.bundles.get(GS, id).unwrap().status,
            BundleStatus::Delivered
        );
    }
}

#[tokio::test]
async fn delete_flows() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let data_id = service.stores.versions.create(GS, "game");
    let bundle_id = upload(&service, data_id, "pak", b"content").await;
    let content_path = service
        .stores
        .bundles
        .content_path("game", data_id, bundle_id);
    assert!(content_path.exists());

    // Referenced versions cannot be deleted.
    service
        .stores
        .app_versions
        .switch(GS, "game", "1.0", data_id)
        .unwrap();
    let result = service.stores.versions.delete(GS, data_id).await;
    assert!(matches!(result, Err(StoreError::VersionInUse(_))));
    assert!(service.stores.versions.get(GS, data_id).is_ok());

    // Detaching unblocks deletion, which cascades content and records.
    service.stores.app_versions.detach(GS, "game", "1.0");
    service.stores.versions.delete(GS, data_id).await.unwrap();
    assert!(service.stores.versions.get(GS, data_id).is_err());
    assert!(service.stores.bundles.get(GS, bundle_id).is_err());
    assert!(!content_path.exists());
}
