use std::path::Path;

use datapack_types::{installed_datafile_path, Datafile, Handle, DATAFILE_NAME, DATASETS_DIR};
use walkdir::WalkDir;

use crate::PackError;

/// Lists the datasets installed below `<dir>/datasets`, sorted by handle.
///
/// A dataset is installed when `datasets/<author>/<name>/Datafile` exists.
/// Datafiles that cannot be read are skipped with a warning.
pub fn installed_datasets(dir: &Path) -> Result<Vec<Handle>, PackError> {
    let root = dir.join(DATASETS_DIR);
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut handles = Vec::new();
    for entry in WalkDir::new(&root).min_depth(3).max_depth(3) {
        let entry = entry.map_err(|err| PackError::Io {
            path: err.path().unwrap_or(&root).to_path_buf(),
            source: err.into(),
        })?;
        if entry.file_name() != DATAFILE_NAME || !entry.file_type().is_file() {
            continue;
        }
        match Datafile::from_path(entry.path()).map(|datafile| datafile.handle()) {
            Ok(Ok(handle)) => handles.push(handle),
            Ok(Err(err)) => tracing::warn!("skipping {}: {err}", entry.path().display()),
            Err(err) => tracing::warn!("skipping {}: {err}", entry.path().display()),
        }
    }
    handles.sort_by_key(ToString::to_string);
    Ok(handles)
}

/// Reads the Datafile of the installed dataset `handle` below `dir`.
pub fn installed_datafile(dir: &Path, handle: &Handle) -> Result<Datafile, PackError> {
    Ok(Datafile::from_path(&dir.join(installed_datafile_path(handle)))?)
}
