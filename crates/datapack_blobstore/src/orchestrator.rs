use std::{
    future::Future,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use datapack_digest::{
    compute_bytes_digest, compute_file_digest_async, read_and_hash_async, ContentHash,
};
use datapack_types::{Manifest, ManifestError};
use futures::{stream::FuturesUnordered, StreamExt};
use indexmap::{IndexMap, IndexSet};
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinError};
use tokio_util::task::AbortOnDropHandle;
use tracing::Instrument;
use url::Url;

use crate::{blob_key, BlobStore, BlobStoreError};

/// How a single blob upload ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The store already had the blob, nothing was transferred.
    AlreadyPresent,
    /// The blob was uploaded.
    Uploaded,
}

/// How a single blob download ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    /// The target already held the right content.
    AlreadyPresent,
    /// The content was copied from a verified local file.
    CopiedFrom(PathBuf),
    /// The blob was fetched from the store.
    Downloaded,
}

/// The outcomes of a batch transfer, one per hash and path, ordered by hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport<O> {
    /// The hash, the local path and how the transfer ended.
    pub outcomes: Vec<(ContentHash, PathBuf, O)>,
}

impl<O> Default for BatchReport<O> {
    fn default() -> Self {
        Self {
            outcomes: Vec::new(),
        }
    }
}

impl<O> BatchReport<O> {
    /// The number of outcomes.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true if nothing was transferred.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// The number of outcomes matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&O) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, _, outcome)| predicate(outcome))
            .count()
    }
}

/// An error that occurred while transferring blobs.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Some of the requested hashes are not well formed. All invalid hashes
    /// are reported together.
    #[error("invalid blob hash(es): {}", .invalid.join(", "))]
    InvalidHashes {
        /// The malformed inputs
        invalid: Vec<String>,
        /// The well formed hashes, deduplicated
        valid: Vec<ContentHash>,
    },

    /// The manifest does not list a file with this hash.
    #[error("blob {hash} has no path in the manifest")]
    NoLocalPath {
        /// The hash without a path
        hash: ContentHash,
    },

    /// Content does not match the hash it is stored under.
    #[error("hash mismatch for {}: expected {expected}, got {actual}", .path.display())]
    Integrity {
        /// The file (or store key) that was verified
        path: PathBuf,
        /// The hash the content should have
        expected: ContentHash,
        /// The hash the content has
        actual: ContentHash,
    },

    /// A local file could not be read or written.
    #[error("failed to access {}", .path.display())]
    Io {
        /// The file
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The blob store failed.
    #[error("blob {hash}: {source}")]
    Store {
        /// The blob that was transferred
        hash: ContentHash,
        /// The error of the store
        #[source]
        source: BlobStoreError,
    },

    /// The transfer was cancelled before it finished.
    #[error("the transfer of blob {0} was cancelled")]
    Cancelled(ContentHash),

    /// The manifest could not be read or hashed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Some transfers of a batch failed. Every failure is listed.
    #[error("{}", describe_failures(.failures, .total))]
    Batch {
        /// The failed hashes and why they failed
        failures: Vec<(ContentHash, BlobError)>,
        /// The number of hashes in the batch
        total: usize,
    },
}

fn describe_failures(failures: &[(ContentHash, BlobError)], total: &usize) -> String {
    let mut message = format!("{}/{} blob transfers failed", failures.len(), total);
    for (_, err) in failures {
        message.push_str(&format!("\n  {err}"));
    }
    message
}

impl BlobError {
    /// Returns true if the store does not have the blob.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::Store { source, .. } if source.is_not_found())
    }

    fn store(hash: ContentHash, source: BlobStoreError) -> Self {
        BlobError::Store { hash, source }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        BlobError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Parses and deduplicates a list of hashes. Every malformed input is
/// collected instead of failing on the first one.
pub(crate) fn validate_hashes<I, S>(hashes: I) -> Result<IndexSet<ContentHash>, BlobError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut valid = IndexSet::new();
    let mut invalid = IndexSet::new();
    for hash in hashes {
        match hash.as_ref().parse::<ContentHash>() {
            Ok(hash) => {
                valid.insert(hash);
            }
            Err(_) => {
                invalid.insert(hash.as_ref().to_string());
            }
        }
    }

    if invalid.is_empty() {
        Ok(valid)
    } else {
        Err(BlobError::InvalidHashes {
            invalid: invalid.into_iter().collect(),
            valid: valid.into_iter().collect(),
        })
    }
}

/// Moves blobs between a dataset working tree and a [`BlobStore`].
///
/// Uploads never transfer a blob the store already has. Downloads prefer a
/// local file with the right content over the network and fetch a blob that
/// several paths share only once. Batch operations run up to
/// `concurrency` transfers at the same time.
#[derive(Debug, Clone)]
pub struct BlobOrchestrator {
    store: Arc<dyn BlobStore>,
    concurrency: usize,
}

impl BlobOrchestrator {
    /// The default number of parallel transfers.
    pub const DEFAULT_CONCURRENCY: usize = 8;

    /// Creates an orchestrator for `store`.
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            concurrency: Self::DEFAULT_CONCURRENCY,
        }
    }

    /// Sets the number of parallel transfers of batch operations.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Parses and deduplicates a list of hashes. Every malformed input is
    /// reported in one [`BlobError::InvalidHashes`].
    pub fn validate_hashes<I, S>(hashes: I) -> Result<IndexSet<ContentHash>, BlobError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        validate_hashes(hashes)
    }

    /// The local files that hold (or should hold) the blob. The hash of the
    /// manifest maps to the manifest file itself.
    pub fn local_paths(manifest: &Manifest, hash: &ContentHash) -> Result<Vec<PathBuf>, BlobError> {
        let mut paths: Vec<PathBuf> = manifest
            .paths_for_hash(hash)
            .into_iter()
            .map(|path| manifest.root().join(path))
            .collect();
        if manifest.manifest_hash()? == *hash {
            paths.push(manifest.path());
        }
        Ok(paths)
    }

    /// Returns true if the store has the blob.
    pub async fn has_blob(&self, hash: &ContentHash) -> Result<bool, BlobError> {
        self.store
            .has(&blob_key(hash))
            .await
            .map_err(|source| BlobError::store(*hash, source))
    }

    /// The URL of the blob in the store.
    pub fn url(&self, hash: &ContentHash) -> Result<Url, BlobError> {
        self.store
            .url(&blob_key(hash))
            .map_err(|source| BlobError::store(*hash, source))
    }

    /// Uploads the file at `path` as the blob `hash`, unless the store
    /// already has it. The file is read once and the bytes that are uploaded
    /// are the bytes that were verified against `hash`.
    pub async fn put_blob(&self, hash: &ContentHash, path: &Path) -> Result<PutOutcome, BlobError> {
        put_one(self.store.clone(), *hash, path.to_path_buf()).await
    }

    /// Makes sure `path` holds the blob `hash`. Files of the manifest with
    /// the same hash are used if their content still matches, otherwise the
    /// blob is downloaded.
    pub async fn get_blob(
        &self,
        manifest: &Manifest,
        hash: &ContentHash,
        path: &Path,
    ) -> Result<GetOutcome, BlobError> {
        let mut candidates = IndexSet::new();
        candidates.insert(path.to_path_buf());
        candidates.extend(Self::local_paths(manifest, hash)?);

        let mut outcomes = get_one(
            self.store.clone(),
            *hash,
            vec![path.to_path_buf()],
            candidates.into_iter().collect(),
        )
        .await?;
        Ok(outcomes
            .pop()
            .map_or(GetOutcome::AlreadyPresent, |(_, outcome)| outcome))
    }

    /// Returns the content of a blob, from a verified local file if the
    /// manifest knows one and from the store otherwise.
    pub async fn read_blob(&self, manifest: &Manifest, hash: &ContentHash) -> Result<Bytes, BlobError> {
        for path in Self::local_paths(manifest, hash)? {
            match read_and_hash_async(&path).await {
                Ok((bytes, actual)) if actual == *hash => return Ok(bytes),
                Ok((_, actual)) => {
                    tracing::warn!(
                        "ignoring stale local copy {}: expected {hash}, found {actual}",
                        path.display()
                    );
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(BlobError::io(&path, err)),
            }
        }

        let key = blob_key(hash);
        let bytes = self
            .store
            .get(&key)
            .await
            .map_err(|source| BlobError::store(*hash, source))?;
        verify_bytes(hash, bytes, Path::new(&key)).await
    }

    /// Uploads every blob in `hashes` that the store does not have yet.
    ///
    /// The hashes are validated and deduplicated first, so a blob shared by
    /// several files is uploaded once. The file to upload is looked up in
    /// the manifest.
    #[tracing::instrument(skip_all)]
    pub async fn put_blobs<I, S>(
        &self,
        manifest: &Manifest,
        hashes: I,
    ) -> Result<BatchReport<PutOutcome>, BlobError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hashes = validate_hashes(hashes)?;
        let local = LocalPaths::new(manifest)?;
        let mut plan = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let path = local
                .get(&hash)
                .first()
                .cloned()
                .ok_or(BlobError::NoLocalPath { hash })?;
            plan.push((hash, path));
        }
        tracing::debug!("uploading {} distinct blob(s)", plan.len());

        let store = self.store.clone();
        let total = plan.len();
        let results = self
            .run_bounded(plan, move |hash, path| {
                let store = store.clone();
                async move {
                    let outcome = put_one(store, hash, path.clone()).await?;
                    Ok(vec![(path, outcome)])
                }
            })
            .await;
        collect_report(results, total)
    }

    /// Downloads every blob in `hashes` to all manifest paths that should
    /// hold it.
    ///
    /// A blob shared by several paths is fetched once and copied to the
    /// others. Paths that already have the right content are left alone.
    #[tracing::instrument(skip_all)]
    pub async fn get_blobs<I, S>(
        &self,
        manifest: &Manifest,
        hashes: I,
    ) -> Result<BatchReport<GetOutcome>, BlobError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hashes = validate_hashes(hashes)?;
        let local = LocalPaths::new(manifest)?;
        let mut plan = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let targets = local.get(&hash).to_vec();
            if targets.is_empty() {
                return Err(BlobError::NoLocalPath { hash });
            }
            plan.push((hash, targets));
        }
        tracing::debug!("downloading {} distinct blob(s)", plan.len());

        let store = self.store.clone();
        let total = plan.len();
        let results = self
            .run_bounded(plan, move |hash, targets| {
                let candidates = targets.clone();
                get_one(store.clone(), hash, targets, candidates)
            })
            .await;
        collect_report(results, total)
    }

    /// Returns the hashes the store does not have, in the given order.
    #[tracing::instrument(skip_all)]
    pub async fn missing_blobs(&self, hashes: &[ContentHash]) -> Result<Vec<ContentHash>, BlobError> {
        let hashes: IndexSet<ContentHash> = hashes.iter().copied().collect();
        let store = self.store.clone();
        let total = hashes.len();
        let results = self
            .run_bounded(
                hashes.iter().map(|hash| (*hash, ())).collect(),
                move |hash, ()| {
                    let store = store.clone();
                    async move {
                        store
                            .has(&blob_key(&hash))
                            .await
                            .map_err(|source| BlobError::store(hash, source))
                    }
                },
            )
            .await;

        let mut present = IndexSet::new();
        let mut failures = Vec::new();
        for (hash, result) in results {
            match result {
                Ok(true) => {
                    present.insert(hash);
                }
                Ok(false) => {}
                Err(err) => failures.push((hash, err)),
            }
        }
        if !failures.is_empty() {
            return Err(BlobError::Batch { failures, total });
        }
        Ok(hashes
            .into_iter()
            .filter(|hash| !present.contains(hash))
            .collect())
    }

    /// Runs `task` for every item with at most `concurrency` tasks in
    /// flight. Dropping the returned future aborts the tasks that are still
    /// running. The results are sorted by hash.
    async fn run_bounded<T, O, F, Fut>(
        &self,
        items: Vec<(ContentHash, T)>,
        task: F,
    ) -> Vec<(ContentHash, Result<O, BlobError>)>
    where
        F: Fn(ContentHash, T) -> Fut,
        Fut: Future<Output = Result<O, BlobError>> + Send + 'static,
        O: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = FuturesUnordered::new();
        for (hash, item) in items {
            let semaphore = semaphore.clone();
            let work = task(hash, item);
            let task = async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await;
                work.await
            };
            let handle = AbortOnDropHandle::new(tokio::spawn(
                task.instrument(tracing::Span::current()),
            ));
            tasks.push(async move { (hash, handle.await) });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some((hash, joined)) = tasks.next().await {
            results.push((hash, joined_result(hash, joined)));
        }
        results.sort_by_key(|(hash, _)| *hash);
        results
    }
}

/// The local files of every blob of a manifest. Built once per batch so the
/// manifest is only hashed once.
struct LocalPaths {
    by_hash: IndexMap<ContentHash, Vec<PathBuf>>,
}

impl LocalPaths {
    fn new(manifest: &Manifest) -> Result<Self, BlobError> {
        let mut by_hash: IndexMap<ContentHash, Vec<PathBuf>> = IndexMap::new();
        for (path, entry) in manifest.entries() {
            if let Some(hash) = entry.hash() {
                by_hash
                    .entry(hash)
                    .or_default()
                    .push(manifest.root().join(path));
            }
        }
        by_hash
            .entry(manifest.manifest_hash()?)
            .or_default()
            .push(manifest.path());
        Ok(Self { by_hash })
    }

    fn get(&self, hash: &ContentHash) -> &[PathBuf] {
        self.by_hash.get(hash).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Panics of a transfer are resumed. A transfer that was cancelled counts as
/// failed.
fn joined_result<O>(
    hash: ContentHash,
    joined: Result<Result<O, BlobError>, JoinError>,
) -> Result<O, BlobError> {
    match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => {
            tracing::warn!("blob transfer was cancelled: {err}");
            Err(BlobError::Cancelled(hash))
        }
    }
}

fn collect_report<O>(
    results: Vec<(ContentHash, Result<Vec<(PathBuf, O)>, BlobError>)>,
    total: usize,
) -> Result<BatchReport<O>, BlobError> {
    let mut report = BatchReport::default();
    let mut failures = Vec::new();
    for (hash, result) in results {
        match result {
            Ok(outcomes) => report.outcomes.extend(
                outcomes
                    .into_iter()
                    .map(|(path, outcome)| (hash, path, outcome)),
            ),
            Err(err) => failures.push((hash, err)),
        }
    }
    if failures.is_empty() {
        Ok(report)
    } else {
        Err(BlobError::Batch { failures, total })
    }
}

fn short(hash: &ContentHash) -> String {
    hash.to_string()[..7].to_string()
}

/// Runs blocking file system or hashing work off the async threads.
async fn blocking<T, F>(f: F) -> std::io::Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => Err(std::io::Error::from(ErrorKind::Interrupted)),
    }
}

/// Replaces the file at `path` with `bytes`. Readers never see a partially
/// written file.
async fn write_file(path: &Path, bytes: Bytes) -> Result<(), BlobError> {
    let target = path.to_path_buf();
    blocking(move || {
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs_err::create_dir_all(&parent)?;
        let mut file = tempfile::NamedTempFile::new_in(&parent)?;
        file.write_all(&bytes)?;
        file.flush()?;
        file.persist(&target).map_err(|err| err.error)?;
        Ok(())
    })
    .await
    .map_err(|err| BlobError::io(path, err))
}

async fn verify_bytes(hash: &ContentHash, bytes: Bytes, path: &Path) -> Result<Bytes, BlobError> {
    let (bytes, actual) = blocking(move || {
        let actual = compute_bytes_digest(&bytes);
        Ok((bytes, actual))
    })
    .await
    .map_err(|err| BlobError::io(path, err))?;
    if actual == *hash {
        Ok(bytes)
    } else {
        Err(BlobError::Integrity {
            path: path.to_path_buf(),
            expected: *hash,
            actual,
        })
    }
}

/// Returns true if the file at `path` exists and has the content `hash`.
async fn is_valid_copy(hash: &ContentHash, path: &Path) -> bool {
    match compute_file_digest_async(path).await {
        Ok(actual) if actual == *hash => true,
        Ok(actual) => {
            tracing::warn!(
                "ignoring stale local copy {}: expected {hash}, found {actual}",
                path.display()
            );
            false
        }
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(err) => {
            tracing::warn!("cannot verify local copy {}: {err}", path.display());
            false
        }
    }
}

async fn put_one(
    store: Arc<dyn BlobStore>,
    hash: ContentHash,
    path: PathBuf,
) -> Result<PutOutcome, BlobError> {
    let key = blob_key(&hash);
    if store
        .has(&key)
        .await
        .map_err(|source| BlobError::store(hash, source))?
    {
        tracing::debug!("put blob {} {} - already present", short(&hash), path.display());
        return Ok(PutOutcome::AlreadyPresent);
    }

    let (bytes, actual) = read_and_hash_async(&path)
        .await
        .map_err(|err| BlobError::io(&path, err))?;
    if actual != hash {
        return Err(BlobError::Integrity {
            path,
            expected: hash,
            actual,
        });
    }

    store
        .put(&key, bytes)
        .await
        .map_err(|source| BlobError::store(hash, source))?;
    tracing::info!("put blob {} {} - uploaded", short(&hash), path.display());
    Ok(PutOutcome::Uploaded)
}

/// Makes every target hold the blob. The first target is filled from a
/// verified candidate or the store, the others are copied from it.
async fn get_one(
    store: Arc<dyn BlobStore>,
    hash: ContentHash,
    targets: Vec<PathBuf>,
    candidates: Vec<PathBuf>,
) -> Result<Vec<(PathBuf, GetOutcome)>, BlobError> {
    let Some((first, rest)) = targets.split_first() else {
        return Ok(Vec::new());
    };

    let mut source = None;
    for candidate in &candidates {
        if is_valid_copy(&hash, candidate).await {
            source = Some(candidate.clone());
            break;
        }
    }

    let mut outcomes = Vec::with_capacity(targets.len());
    let outcome = match source {
        Some(source) if &source == first => {
            tracing::debug!("get blob {} {} - already present", short(&hash), first.display());
            GetOutcome::AlreadyPresent
        }
        Some(source) => {
            copy_file(&source, first).await?;
            tracing::info!(
                "get blob {} {} - copied from {}",
                short(&hash),
                first.display(),
                source.display()
            );
            GetOutcome::CopiedFrom(source)
        }
        None => {
            let key = blob_key(&hash);
            let bytes = store
                .get(&key)
                .await
                .map_err(|source| BlobError::store(hash, source))?;
            let bytes = verify_bytes(&hash, bytes, first).await?;
            write_file(first, bytes).await?;
            tracing::info!("get blob {} {} - downloaded", short(&hash), first.display());
            GetOutcome::Downloaded
        }
    };
    outcomes.push((first.clone(), outcome));

    for target in rest {
        let outcome = if is_valid_copy(&hash, target).await {
            GetOutcome::AlreadyPresent
        } else {
            copy_file(first, target).await?;
            tracing::info!("copy blob {} {}", short(&hash), target.display());
            GetOutcome::CopiedFrom(first.clone())
        };
        outcomes.push((target.clone(), outcome));
    }
    Ok(outcomes)
}

async fn copy_file(from: &Path, to: &Path) -> Result<(), BlobError> {
    let bytes = fs_err::tokio::read(from)
        .await
        .map_err(|err| BlobError::io(from, err))?;
    write_file(to, Bytes::from(bytes)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBlobStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use datapack_types::GenerateOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HELLO: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

    /// Counts the calls that reach the wrapped store.
    #[derive(Debug, Default)]
    struct CountingStore {
        inner: MemoryBlobStore,
        puts: AtomicUsize,
        gets: AtomicUsize,
    }

    impl CountingStore {
        fn puts(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }

        fn gets(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BlobStore for CountingStore {
        async fn has(&self, key: &str) -> Result<bool, BlobStoreError> {
            self.inner.has(key).await
        }

        async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BlobStoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, bytes).await
        }

        async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }

        fn url(&self, key: &str) -> Result<Url, BlobStoreError> {
            self.inner.url(key)
        }
    }

    fn hello() -> ContentHash {
        HELLO.parse().unwrap()
    }

    /// A dataset with two identical files and one distinct file.
    fn dataset() -> (tempfile::TempDir, Manifest) {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("a.txt"), "hello").unwrap();
        fs_err::create_dir_all(dir.path().join("sub")).unwrap();
        fs_err::write(dir.path().join("sub/b.txt"), "hello").unwrap();
        fs_err::write(dir.path().join("c.txt"), "world").unwrap();
        let mut manifest = Manifest::new(dir.path());
        manifest.generate(&GenerateOptions::default()).unwrap();
        (dir, manifest)
    }

    fn strings(hashes: &[ContentHash]) -> Vec<String> {
        hashes.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_put_blobs_uploads_shared_content_once() {
        let (_dir, manifest) = dataset();
        let store = Arc::new(CountingStore::default());
        let orchestrator = BlobOrchestrator::new(store.clone());

        let hashes = strings(&manifest.all_hashes());
        let report = orchestrator.put_blobs(&manifest, &hashes).await.unwrap();
        assert_eq!(store.puts(), 2);
        assert_eq!(report.len(), 2);
        assert_eq!(report.count(|o| *o == PutOutcome::Uploaded), 2);

        // A second upload finds everything present.
        let report = orchestrator.put_blobs(&manifest, &hashes).await.unwrap();
        assert_eq!(store.puts(), 2);
        assert_eq!(report.count(|o| *o == PutOutcome::AlreadyPresent), 2);
        assert!(logs_contain("already present"));
    }

    #[tokio::test]
    async fn test_put_blob_twice_writes_once() {
        let (dir, _manifest) = dataset();
        let store = Arc::new(CountingStore::default());
        let orchestrator = BlobOrchestrator::new(store.clone());
        let path = dir.path().join("a.txt");

        assert_eq!(
            orchestrator.put_blob(&hello(), &path).await.unwrap(),
            PutOutcome::Uploaded
        );
        assert_eq!(
            orchestrator.put_blob(&hello(), &path).await.unwrap(),
            PutOutcome::AlreadyPresent
        );
        assert_eq!(store.puts(), 1);
    }

    #[tokio::test]
    async fn test_put_blob_rejects_modified_file() {
        let (dir, manifest) = dataset();
        fs_err::write(dir.path().join("c.txt"), "changed").unwrap();
        let store = Arc::new(CountingStore::default());
        let orchestrator = BlobOrchestrator::new(store.clone());

        let world = manifest.get("c.txt").unwrap().hash().unwrap();
        let err = orchestrator
            .put_blobs(&manifest, [world.to_string()])
            .await
            .unwrap_err();
        assert_matches!(
            err,
            BlobError::Batch { failures, total: 1 }
                if matches!(failures.as_slice(), [(hash, BlobError::Integrity { expected, .. })] if *hash == world && *expected == world)
        );
        assert_eq!(store.puts(), 0);
    }

    #[test]
    fn test_batch_paths_match_single_lookups() {
        let (_dir, manifest) = dataset();
        let local = LocalPaths::new(&manifest).unwrap();

        let mut hashes = manifest.all_hashes();
        hashes.push(manifest.manifest_hash().unwrap());
        for hash in hashes {
            assert_eq!(
                local.get(&hash),
                BlobOrchestrator::local_paths(&manifest, &hash).unwrap()
            );
        }
        assert_eq!(local.get(&hello()).len(), 2);
        assert!(local.get(&compute_bytes_digest("unknown")).is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_transfer_fails_the_batch() {
        let handle = tokio::spawn(std::future::pending::<
            Result<Vec<(PathBuf, PutOutcome)>, BlobError>,
        >());
        handle.abort();
        let result = joined_result(hello(), handle.await);
        assert_matches!(&result, Err(BlobError::Cancelled(hash)) if *hash == hello());

        let err = collect_report(vec![(hello(), result)], 1).unwrap_err();
        assert_matches!(err, BlobError::Batch { failures, total: 1 } if failures.len() == 1);
    }

    #[tokio::test]
    async fn test_manifest_is_a_blob() {
        let (_dir, manifest) = dataset();
        let store = Arc::new(CountingStore::default());
        let orchestrator = BlobOrchestrator::new(store.clone());

        let manifest_hash = manifest.manifest_hash().unwrap();
        assert_eq!(
            BlobOrchestrator::local_paths(&manifest, &manifest_hash).unwrap(),
            vec![manifest.path()]
        );
        orchestrator
            .put_blobs(&manifest, [manifest_hash.to_string()])
            .await
            .unwrap();
        assert_eq!(
            store.inner.keys(),
            vec![format!("/blob/{manifest_hash}")]
        );
    }

    #[tokio::test]
    async fn test_get_blobs_fetches_shared_content_once() {
        let (source_dir, manifest) = dataset();
        let store = Arc::new(CountingStore::default());
        let orchestrator = BlobOrchestrator::new(store.clone()).with_concurrency(2);
        orchestrator
            .put_blobs(&manifest, strings(&manifest.all_hashes()))
            .await
            .unwrap();

        // A fresh working tree that only has the manifest.
        let target_dir = tempfile::tempdir().unwrap();
        fs_err::copy(manifest.path(), target_dir.path().join("Manifest")).unwrap();
        let target = Manifest::from_root(target_dir.path()).unwrap();

        let report = orchestrator
            .get_blobs(&target, strings(&target.all_hashes()))
            .await
            .unwrap();
        assert_eq!(store.gets(), 2);
        assert_eq!(report.len(), 3);
        assert_eq!(report.count(|o| *o == GetOutcome::Downloaded), 2);
        assert_eq!(report.count(|o| matches!(o, GetOutcome::CopiedFrom(_))), 1);
        assert_eq!(
            fs_err::read_to_string(target_dir.path().join("sub/b.txt")).unwrap(),
            "hello"
        );
        assert!(target.check_all().unwrap().is_ok());

        // Nothing is fetched again once the tree is complete.
        let report = orchestrator
            .get_blobs(&target, strings(&target.all_hashes()))
            .await
            .unwrap();
        assert_eq!(store.gets(), 2);
        assert_eq!(report.count(|o| *o == GetOutcome::AlreadyPresent), 3);
        drop(source_dir);
    }

    #[tokio::test]
    async fn test_get_blob_prefers_verified_local_copy() {
        let (dir, manifest) = dataset();
        let store = Arc::new(CountingStore::default());
        let orchestrator = BlobOrchestrator::new(store.clone());

        let target = dir.path().join("copy.txt");
        let outcome = orchestrator
            .get_blob(&manifest, &hello(), &target)
            .await
            .unwrap();
        assert_eq!(outcome, GetOutcome::CopiedFrom(dir.path().join("a.txt")));
        assert_eq!(store.gets(), 0);
        assert_eq!(fs_err::read_to_string(&target).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_get_blob_skips_stale_local_copy() {
        let (dir, manifest) = dataset();
        let store = Arc::new(CountingStore::default());
        store
            .inner
            .put(&blob_key(&hello()), Bytes::from_static(b"hello"))
            .await
            .unwrap();
        fs_err::write(dir.path().join("a.txt"), "stale").unwrap();
        fs_err::write(dir.path().join("sub/b.txt"), "stale").unwrap();

        let orchestrator = BlobOrchestrator::new(store.clone());
        let outcome = orchestrator
            .get_blob(&manifest, &hello(), &dir.path().join("a.txt"))
            .await
            .unwrap();
        assert_eq!(outcome, GetOutcome::Downloaded);
        assert_eq!(store.gets(), 1);
        assert_eq!(
            fs_err::read_to_string(dir.path().join("a.txt")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_corrupt_download_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::new(dir.path());
        let store = Arc::new(MemoryBlobStore::new());
        store
            .put(&blob_key(&hello()), Bytes::from_static(b"tampered"))
            .await
            .unwrap();

        let orchestrator = BlobOrchestrator::new(store);
        let target = dir.path().join("a.txt");
        let err = orchestrator
            .get_blob(&manifest, &hello(), &target)
            .await
            .unwrap_err();
        assert_matches!(err, BlobError::Integrity { expected, .. } if expected == hello());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_read_blob() {
        let (dir, manifest) = dataset();
        let store = Arc::new(CountingStore::default());
        let orchestrator = BlobOrchestrator::new(store.clone());

        assert_eq!(orchestrator.read_blob(&manifest, &hello()).await.unwrap(), "hello");
        assert_eq!(store.gets(), 0);

        fs_err::remove_file(dir.path().join("a.txt")).unwrap();
        fs_err::remove_file(dir.path().join("sub/b.txt")).unwrap();
        let err = orchestrator.read_blob(&manifest, &hello()).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.gets(), 1);
    }

    #[test]
    fn test_invalid_hashes_are_reported_together() {
        let err = BlobOrchestrator::validate_hashes(["not-a-hash", HELLO, "abc", HELLO]).unwrap_err();
        assert_matches!(
            &err,
            BlobError::InvalidHashes { invalid, valid }
                if invalid == &["not-a-hash".to_string(), "abc".to_string()] && valid == &[hello()]
        );
        assert_eq!(err.to_string(), "invalid blob hash(es): not-a-hash, abc");
    }

    #[tokio::test]
    async fn test_put_blobs_validates_before_transfer() {
        let (_dir, manifest) = dataset();
        let store = Arc::new(CountingStore::default());
        let orchestrator = BlobOrchestrator::new(store.clone());
        let err = orchestrator
            .put_blobs(&manifest, ["not-a-hash", HELLO])
            .await
            .unwrap_err();
        assert_matches!(err, BlobError::InvalidHashes { invalid, .. } if invalid == ["not-a-hash"]);
        assert_eq!(store.puts(), 0);
    }

    #[tokio::test]
    async fn test_batch_failures_list_every_hash() {
        let (_dir, manifest) = dataset();
        let orchestrator = BlobOrchestrator::new(Arc::new(MemoryBlobStore::new()));

        let target_dir = tempfile::tempdir().unwrap();
        fs_err::copy(manifest.path(), target_dir.path().join("Manifest")).unwrap();
        let target = Manifest::from_root(target_dir.path()).unwrap();

        let err = orchestrator
            .get_blobs(&target, strings(&target.all_hashes()))
            .await
            .unwrap_err();
        let BlobError::Batch { failures, total } = &err else {
            panic!("expected a batch error, got {err:?}");
        };
        assert_eq!(*total, 2);
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|(_, err)| err.is_not_found()));
        assert!(err.to_string().starts_with("2/2 blob transfers failed"));
    }

    #[tokio::test]
    async fn test_missing_blobs() {
        let store = Arc::new(MemoryBlobStore::new());
        store
            .put(&blob_key(&hello()), Bytes::from_static(b"hello"))
            .await
            .unwrap();
        let world = compute_bytes_digest("world");
        let orchestrator = BlobOrchestrator::new(store);
        assert_eq!(
            orchestrator
                .missing_blobs(&[world, hello(), world])
                .await
                .unwrap(),
            vec![world]
        );
    }
}
