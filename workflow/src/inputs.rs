//! BIDS input discovery: walk the inputs directory, keep NIfTI files, and
//! key each one by its filename stem parsed as a [`ResourceKey`] (§6,
//! grounded on the source `pipeline.py`'s `load_resource`).

use std::path::Path;

use common::eyre::{Context as _, Result};
use common::tracing::{debug, warn};
use execution_graph::Resource;
use resource_key::ResourceKey;
use resource_pool::ResourcePool;
use walkdir::WalkDir;

const NIFTI_SUFFIXES: &[&str] = &[".nii.gz", ".nii"];

/// Walk `inputs_dir` for `.nii`/`.nii.gz` files and register each one in
/// `pool` under a [`ResourceKey`] parsed from its filename stem. Files that
/// are not valid NIfTI-suffixed, not BIDS-conforming, or whose key is
/// already present are skipped with a warning rather than aborting the
/// whole scan (consistent with §7's "unaffected branches complete").
/// Returns the number of resources loaded.
pub fn load_inputs(inputs_dir: &Path, pool: &mut ResourcePool<Resource>) -> Result<usize> {
    let mut loaded = 0;
    for entry in WalkDir::new(inputs_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let stem = match strip_nifti_suffix(&file_name) {
            Some(stem) => stem,
            None => continue,
        };

        let key = match ResourceKey::parse(stem) {
            Ok(key) => key,
            Err(err) => {
                warn!("skipping non-BIDS-conforming input \"{file_name}\": {err}");
                continue;
            }
        };
        if key.is_filter() {
            warn!("skipping input whose key \"{key}\" is a filter, not a concrete key");
            continue;
        }

        let path = entry.path().to_string_lossy().into_owned();
        let resource = Resource::file(path.clone())
            .wrap_err_with(|| format!("invalid input file path: {path}"))?;

        match pool.set(key.clone(), resource) {
            Ok(()) => {
                debug!("loaded input {key} from {path}");
                loaded += 1;
            }
            Err(err) => warn!("skipping duplicate input key {key}: {err}"),
        }
    }
    Ok(loaded)
}

fn strip_nifti_suffix(file_name: &str) -> Option<&str> {
    NIFTI_SUFFIXES
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix))
}
