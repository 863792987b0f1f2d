use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use datapack::Pack;
use datapack_config::{default_config_path, Config};
use datapack_index::DataIndex;
use datapack_types::{GenerateOptions, Manifest};

pub mod blob;
pub mod config;
pub mod get;
pub mod index;
pub mod info;
pub mod manifest;
pub mod pack;

/// What every command needs: the configuration and the directory to work
/// in. The index client is only built by commands that talk to the index.
pub struct Context {
    pub config: Config,
    pub config_path: Option<PathBuf>,
    pub dir: PathBuf,
}

impl Context {
    pub fn new(config_path: Option<PathBuf>, dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = match &config_path {
            Some(path) if path.is_file() => Config::load_from_files([path])?,
            Some(_) => Config::default(),
            None => Config::load_global()?,
        };
        let dir = match dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("failed to determine the current directory")?,
        };
        Ok(Self {
            config,
            config_path: config_path.or_else(default_config_path),
            dir,
        })
    }

    pub fn index(&self) -> anyhow::Result<Arc<DataIndex>> {
        Ok(Arc::new(DataIndex::from_config(&self.config)?))
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            datasets_dir: self.config.manifest.datasets_dir.clone(),
        }
    }

    /// The dataset in the working directory, without an index.
    pub fn local_pack(&self) -> anyhow::Result<Pack> {
        Ok(Pack::open_local(&self.dir)?.with_generate_options(self.generate_options()))
    }

    /// The dataset in the working directory, connected to the index.
    pub fn pack(&self) -> anyhow::Result<Pack> {
        Ok(self.local_pack()?.with_index(self.index()?))
    }

    pub fn manifest(&self) -> anyhow::Result<Manifest> {
        Manifest::from_root(&self.dir)
            .with_context(|| format!("no manifest in {}. Run 'pack make' first.", self.dir.display()))
    }

    pub fn path(&self, path: &Path) -> PathBuf {
        self.dir.join(path)
    }
}
