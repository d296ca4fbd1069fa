use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::debug;

use crate::script::UpdateScript;

const PROBE_PREFIX: &str = ".updater-probe-";

/// Directories the script will create files in, reduced to the nearest ones
/// that already exist.
#[must_use]
pub fn write_targets(install_dir: &Path, script: &UpdateScript) -> BTreeSet<PathBuf> {
    let mut targets = BTreeSet::new();
    targets.insert(nearest_existing(install_dir));

    for operation in script.operations() {
        if let Some(destination) = operation.destination() {
            let path = destination.resolve(install_dir);
            let parent = path.parent().unwrap_or(install_dir);
            targets.insert(nearest_existing(parent));
        }
    }
    targets
}

/// Whether files can be created in every directory `script` writes to.
#[must_use]
pub fn can_write_all(install_dir: &Path, script: &UpdateScript) -> bool {
    write_targets(install_dir, script)
        .iter()
        .all(|dir| can_create_files_in(dir))
}

/// Probe by actually creating (and dropping) a temporary file.
#[must_use]
pub fn can_create_files_in(dir: &Path) -> bool {
    match tempfile::Builder::new()
        .prefix(PROBE_PREFIX)
        .tempfile_in(dir)
    {
        Ok(_) => true,
        Err(error) => {
            debug!("{} is not writable: {error}", dir.display());
            false
        }
    }
}

fn nearest_existing(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|ancestor| ancestor.is_dir())
        .unwrap_or(path)
        .to_path_buf()
}
