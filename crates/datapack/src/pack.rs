use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use datapack_blobstore::{BatchReport, GetOutcome, PutOutcome};
use datapack_digest::ContentHash;
use datapack_index::{DatasetIndex, RefIndexError};
use datapack_types::{CheckReport, Datafile, GenerateOptions, Manifest, DATAFILE_NAME};
use indexmap::IndexSet;

use crate::{DatafileFiller, PackError};

/// The result of a successful [`Pack::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The ref was registered with the index.
    Published(ContentHash),

    /// The version already points at exactly this ref. Nothing changed.
    AlreadyPublished(ContentHash),
}

/// A dataset working directory and the index it is published to.
///
/// Packing and checking only touch the working directory. Transfers and
/// publishing need an index, see [`Pack::with_index`].
#[derive(Debug)]
pub struct Pack {
    manifest: Manifest,
    datafile: Datafile,
    index: Option<Arc<dyn DatasetIndex>>,
    generate_options: GenerateOptions,
}

impl Pack {
    /// Opens the dataset at `root` for local workflows. A missing manifest
    /// or Datafile is treated as empty.
    pub fn open_local(root: impl Into<PathBuf>) -> Result<Self, PackError> {
        let root = root.into();
        let manifest = Manifest::from_root_or_default(&root)?;
        let datafile = Datafile::from_path_or_default(&root.join(DATAFILE_NAME))?;
        Ok(Self {
            manifest,
            datafile,
            index: None,
            generate_options: GenerateOptions::default(),
        })
    }

    /// Opens the dataset at `root` and connects it to `index`.
    pub fn open(root: impl Into<PathBuf>, index: Arc<dyn DatasetIndex>) -> Result<Self, PackError> {
        Ok(Self::open_local(root)?.with_index(index))
    }

    /// Sets the index that blobs are transferred to and versions are
    /// published in.
    pub fn with_index(mut self, index: Arc<dyn DatasetIndex>) -> Self {
        self.index = Some(index);
        self
    }

    fn index(&self) -> Result<&dyn DatasetIndex, PackError> {
        self.index.as_deref().ok_or(PackError::NoIndex)
    }

    /// Sets the options used when the manifest is generated.
    pub fn with_generate_options(mut self, options: GenerateOptions) -> Self {
        self.generate_options = options;
        self
    }

    /// The root of the dataset.
    pub fn root(&self) -> &Path {
        self.manifest.root()
    }

    /// The manifest of the dataset.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The Datafile of the dataset.
    pub fn datafile(&self) -> &Datafile {
        &self.datafile
    }

    /// The path of the Datafile.
    pub fn datafile_path(&self) -> PathBuf {
        self.root().join(DATAFILE_NAME)
    }

    /// Completes the Datafile with `filler` and then hashes every file of
    /// the dataset into the manifest.
    pub async fn generate_files(&mut self, filler: &dyn DatafileFiller) -> Result<(), PackError> {
        let datafile = filler.fill(self.datafile.clone())?;
        if datafile != self.datafile || !self.datafile_path().is_file() {
            datafile.to_path(&self.datafile_path())?;
        }
        self.datafile = datafile;

        // Hashing reads every file, so it runs on the blocking pool. The
        // manifest is persisted after every hash.
        let mut manifest = self.manifest.clone();
        let options = self.generate_options.clone();
        let manifest = match tokio::task::spawn_blocking(move || {
            manifest.generate(&options).map(|()| manifest)
        })
        .await
        {
            Ok(result) => result?,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => return Err(PackError::Cancelled),
        };
        self.manifest = manifest;

        tracing::info!(
            "packed {} file(s) of {}",
            self.manifest.len(),
            self.datafile.dataset
        );
        Ok(())
    }

    /// Packs the dataset. With `clean` every existing manifest entry is
    /// dropped first, so all files are hashed again.
    pub async fn make(&mut self, clean: bool, filler: &dyn DatafileFiller) -> Result<(), PackError> {
        if clean {
            tracing::debug!("clearing the manifest of {}", self.root().display());
            self.manifest.clear()?;
        }
        self.generate_files(filler).await
    }

    /// Every blob the dataset consists of: the hashes of its files and the
    /// hash of the manifest itself.
    pub fn blob_hashes(&self) -> Result<Vec<ContentHash>, PackError> {
        let mut hashes: IndexSet<ContentHash> = self.manifest.all_hashes().into_iter().collect();
        hashes.insert(self.manifest.manifest_hash()?);
        Ok(hashes.into_iter().collect())
    }

    fn ensure_complete(&self) -> Result<(), PackError> {
        if self.manifest.is_complete() {
            Ok(())
        } else {
            Err(PackError::ManifestIncomplete {
                pending: self.manifest.pending_paths(),
            })
        }
    }

    /// Uploads every blob of the dataset the store does not have yet.
    pub async fn upload(&self) -> Result<BatchReport<PutOutcome>, PackError> {
        self.ensure_complete()?;
        let hashes = self.blob_hashes()?;
        let report = self
            .index()?
            .blobs()
            .put_blobs(&self.manifest, hashes.iter().map(ToString::to_string))
            .await?;
        tracing::info!(
            "uploaded {} of {} blob(s)",
            report.count(|outcome| *outcome == PutOutcome::Uploaded),
            report.len()
        );
        Ok(report)
    }

    /// Downloads every blob of the dataset that is not present locally.
    pub async fn download(&self) -> Result<BatchReport<GetOutcome>, PackError> {
        self.ensure_complete()?;
        let hashes = self.blob_hashes()?;
        let report = self
            .index()?
            .blobs()
            .get_blobs(&self.manifest, hashes.iter().map(ToString::to_string))
            .await?;
        tracing::info!(
            "downloaded {} file(s)",
            report.count(|outcome| matches!(outcome, GetOutcome::Downloaded))
        );
        Ok(report)
    }

    /// The blobs of the dataset that the store does not have.
    pub async fn blobs_to_upload(&self) -> Result<Vec<ContentHash>, PackError> {
        let hashes = self.blob_hashes()?;
        Ok(self.index()?.blobs().missing_blobs(&hashes).await?)
    }

    /// Verifies every file against its hash in the manifest.
    pub fn check(&self) -> Result<CheckReport, PackError> {
        let report = self.manifest.check_all()?;
        if report.is_ok() {
            Ok(report)
        } else {
            Err(PackError::ChecksumsFailed {
                failed: report.failed,
                total: report.checked,
            })
        }
    }

    /// Publishes the current manifest as the version named in the Datafile.
    ///
    /// Publishing is idempotent: if the version already points at the same
    /// manifest nothing happens. If it points at a different manifest the
    /// call fails, also when `force` is set.
    pub async fn publish(&self, force: bool) -> Result<PublishOutcome, PackError> {
        let handle = self.datafile.validate_for_publish()?;
        self.ensure_complete()?;

        let missing = self.blobs_to_upload().await?;
        if !missing.is_empty() {
            return Err(PackError::BlobsNotUploaded {
                count: missing.len(),
            });
        }

        let dataset = handle.path();
        let version = handle.version.clone().unwrap_or_default();
        let attempted = self.manifest.manifest_hash()?;
        let index = self.index()?;
        let refs = index.ref_index(&dataset)?;

        match refs.version_ref(&version).await {
            Ok(existing) if existing == attempted => {
                tracing::info!("{dataset}@{version} is already published as {attempted}");
                return Ok(PublishOutcome::AlreadyPublished(attempted));
            }
            Ok(existing) => {
                if force {
                    tracing::warn!("forced publishing is not supported, not overwriting {dataset}@{version}");
                }
                return Err(PackError::Conflict {
                    version,
                    existing,
                    attempted,
                });
            }
            Err(RefIndexError::NotFound(_)) => {}
            Err(err) if err.is_connect() => {
                return Err(PackError::IndexUnreachable {
                    url: index.url().clone(),
                    source: err,
                })
            }
            Err(err) => return Err(err.into()),
        }

        refs.put(&attempted).await?;
        tracing::info!(
            "published {dataset}@{version} ({})",
            &attempted.to_string()[..7]
        );
        Ok(PublishOutcome::Published(attempted))
    }
}
