use std::{path::Path, sync::Arc};

use datapack::{Pack, PublishOutcome, RequireComplete};
use datapack_blobstore::{GetOutcome, PutOutcome};
use datapack_index::{DatasetIndex, MemoryIndex, RefIndex};
use datapack_types::{DATAFILE_NAME, MANIFEST_FILE_NAME};
use url::Url;

const HELLO_HASH: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

fn write_dataset(dir: &Path) {
    fs_err::create_dir_all(dir.join("data")).unwrap();
    fs_err::write(dir.join("a.txt"), "hello").unwrap();
    fs_err::write(dir.join("data").join("b.txt"), "hello").unwrap();
    fs_err::write(dir.join("data").join("c.csv"), "x,y\n1,2\n").unwrap();
    fs_err::write(
        dir.join(DATAFILE_NAME),
        "dataset: jbenet/foo@1.0\ntitle: Foo\n",
    )
    .unwrap();

    // Installed datasets and hidden files are not part of the dataset.
    fs_err::create_dir_all(dir.join("datasets").join("other").join("bar")).unwrap();
    fs_err::write(dir.join("datasets").join("other").join("bar").join("x"), "x").unwrap();
    fs_err::write(dir.join(".hidden"), "secret").unwrap();
}

#[tokio::test]
async fn test_publish_then_download_elsewhere() {
    let index = Arc::new(MemoryIndex::new(Url::parse("memory:///").unwrap()));

    // Pack, upload and publish the dataset.
    let source = tempfile::tempdir().unwrap();
    write_dataset(source.path());
    let mut pack = Pack::open(source.path(), index.clone()).unwrap();
    pack.make(false, &RequireComplete).await.unwrap();

    let manifest = pack.manifest();
    assert_eq!(
        manifest.all_paths(),
        ["Datafile", "a.txt", "data/b.txt", "data/c.csv"]
    );
    assert_eq!(
        manifest.paths_for_hash(&HELLO_HASH.parse().unwrap()),
        ["a.txt", "data/b.txt"]
    );

    let uploaded = pack.upload().await.unwrap();
    assert_eq!(uploaded.count(|o| *o == PutOutcome::Uploaded), 4);
    let manifest_hash = manifest.manifest_hash().unwrap();
    assert_eq!(
        pack.publish(false).await.unwrap(),
        PublishOutcome::Published(manifest_hash)
    );

    let refs = index.ref_index("jbenet/foo").unwrap();
    assert_eq!(refs.version_ref("latest").await.unwrap(), manifest_hash);
    assert_eq!(refs.version_ref("").await.unwrap(), manifest_hash);

    // A second working directory only has the manifest.
    let target = tempfile::tempdir().unwrap();
    fs_err::copy(
        source.path().join(MANIFEST_FILE_NAME),
        target.path().join(MANIFEST_FILE_NAME),
    )
    .unwrap();
    let clone = Pack::open(target.path(), index.clone()).unwrap();
    let report = clone.download().await.unwrap();

    assert_eq!(report.count(|o| *o == GetOutcome::Downloaded), 3);
    assert_eq!(report.count(|o| matches!(o, GetOutcome::CopiedFrom(_))), 1);
    assert_eq!(report.count(|o| *o == GetOutcome::AlreadyPresent), 1);
    assert_eq!(
        fs_err::read_to_string(target.path().join("data").join("b.txt")).unwrap(),
        "hello"
    );

    let clone = Pack::open(target.path(), index).unwrap();
    assert_eq!(clone.datafile().dataset, "jbenet/foo@1.0");
    assert_eq!(clone.check().unwrap().checked, 4);
}
