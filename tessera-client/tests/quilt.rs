mod common;

use std::{
    collections::BTreeMap,
    sync::{atomic::Ordering, Arc},
};

use tessera_client::{BlobReader, ClientError, WriteBlobOptions};
use tessera_core::{
    quilt::{QuiltBlob, QuiltPatchId, QUILT_VERSION},
    BlobId,
};

use common::{test_client, MockChain, TestCluster, EPOCH};

const OPTIONS: WriteBlobOptions = WriteBlobOptions {
    epochs: 3,
    deletable: false,
};

fn quilt_blobs() -> Vec<QuiltBlob> {
    let mut tags = BTreeMap::new();
    tags.insert("content-type".to_owned(), "image/png".to_owned());
    vec![
        QuiltBlob {
            identifier: "zebra.txt".to_owned(),
            tags: BTreeMap::new(),
            contents: b"stripes all the way down".to_vec(),
        },
        QuiltBlob {
            identifier: "logo.png".to_owned(),
            tags,
            contents: vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a],
        },
        QuiltBlob {
            identifier: "alpha.bin".to_owned(),
            tags: BTreeMap::new(),
            contents: (0..600u32).map(|i| (i % 256) as u8).collect(),
        },
    ]
}

#[tokio::test]
async fn quilt_patches_read_back_by_identifier_tag_and_patch_id() {
    let cluster = Arc::new(TestCluster::new(EPOCH));
    let chain = Arc::new(MockChain::default());
    let client = Arc::new(test_client(cluster, chain));

    let result = client.write_quilt(quilt_blobs(), &OPTIONS).await.unwrap();
    assert_eq!(result.patch_ids.len(), 3);

    let reader = BlobReader::new(Arc::clone(&client), result.write.blob_id);
    let quilt = reader.quilt_reader();

    // patches are stored sorted by identifier
    let index = quilt.read_index().await.unwrap();
    let identifiers: Vec<&str> = index
        .patches
        .iter()
        .map(|patch| patch.identifier.as_str())
        .collect();
    assert_eq!(identifiers, vec!["alpha.bin", "logo.png", "zebra.txt"]);

    let alpha = quilt.read_by_identifier("alpha.bin").await.unwrap();
    assert_eq!(alpha.contents.len(), 600);
    assert!(alpha.tags.is_empty());

    let tagged = quilt.read_by_tag("content-type", "image/png").await.unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].identifier, "logo.png");
    assert_eq!(
        tagged[0].contents,
        vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a]
    );

    for patch_id in &result.patch_ids {
        let patch = quilt.read_by_patch_id(patch_id).await.unwrap();
        assert!(identifiers.contains(&patch.identifier.as_str()));
    }
}

#[tokio::test]
async fn sliver_failures_fall_back_to_the_full_blob() {
    let cluster = Arc::new(TestCluster::new(EPOCH));
    let chain = Arc::new(MockChain::default());
    let client = Arc::new(test_client(Arc::clone(&cluster), chain));

    let result = client.write_quilt(quilt_blobs(), &OPTIONS).await.unwrap();
    cluster.fail_secondary_reads.store(true, Ordering::SeqCst);

    let reader = BlobReader::new(Arc::clone(&client), result.write.blob_id);
    let quilt = reader.quilt_reader();
    let zebra = quilt.read_by_identifier("zebra.txt").await.unwrap();
    assert_eq!(zebra.contents, b"stripes all the way down");
}

#[tokio::test]
async fn patch_ids_from_another_quilt_are_rejected() {
    let cluster = Arc::new(TestCluster::new(EPOCH));
    let chain = Arc::new(MockChain::default());
    let client = Arc::new(test_client(cluster, chain));

    let result = client.write_quilt(quilt_blobs(), &OPTIONS).await.unwrap();
    let reader = BlobReader::new(Arc::clone(&client), result.write.blob_id);
    let quilt = reader.quilt_reader();

    let foreign = QuiltPatchId {
        quilt_id: BlobId([42; 32]),
        version: QUILT_VERSION,
        start_index: 2,
        end_index: 3,
    };
    let error = quilt.read_by_patch_id(&foreign).await.unwrap_err();
    assert!(matches!(error, ClientError::PatchNotFound(_)));

    let error = quilt.read_by_identifier("missing.txt").await.unwrap_err();
    assert!(matches!(
        error,
        ClientError::PatchNotFound(identifier) if identifier == "missing.txt"
    ));
}
