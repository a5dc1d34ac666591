//! The derivatives output layout gathered results are copied into (§6,
//! grounded on the source `utils/bids.py`'s `derivative_location`).

use std::path::{Path, PathBuf};

use common::eyre::{Context as _, Result};
use resource_key::{Entity, ResourceKey};

/// Map a resource's suffix to its derivatives category (§6): `T1w`/`brain`
/// go under `anat`, `mask` under `mask`, everything else under `func`.
pub fn category_for_suffix(suffix: &str) -> &'static str {
    match suffix {
        "T1w" | "brain" => "anat",
        "mask" => "mask",
        _ => "func",
    }
}

/// The destination path for `key`'s derivative under `outputs_dir`:
/// `<outputs>/derivatives/<pipeline_name>/[sub-X/][ses-Y/]<category>/<key>.<extension>`.
pub fn derivative_location(
    outputs_dir: &Path,
    pipeline_name: &str,
    key: &ResourceKey,
    extension: &str,
) -> PathBuf {
    let mut path = outputs_dir.join("derivatives").join(pipeline_name);
    if let Some(sub) = key.entity(Entity::Subject) {
        path = path.join(format!("sub-{sub}"));
    }
    if let Some(ses) = key.entity(Entity::Session) {
        path = path.join(format!("ses-{ses}"));
    }
    path.join(category_for_suffix(key.suffix()))
        .join(format!("{key}.{extension}"))
}

/// The file extension to use for a derivative copied from `source`,
/// preserving the double `.nii.gz` extension NIfTI files carry rather than
/// truncating it to `.gz`.
pub fn extension_of(source: &Path) -> String {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    for suffix in [".nii.gz", ".nii"] {
        if name.ends_with(suffix) {
            return suffix.trim_start_matches('.').to_string();
        }
    }
    source
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bin".to_string())
}

/// Copy `source` to `destination`, creating any missing parent directories.
pub fn copy_into_derivatives(destination: &Path, source: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::copy(source, destination).wrap_err_with(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            destination.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn t1w_and_brain_map_to_anat() {
        assert_eq!(category_for_suffix("T1w"), "anat");
        assert_eq!(category_for_suffix("brain"), "anat");
    }

    #[test]
    fn mask_maps_to_mask() {
        assert_eq!(category_for_suffix("mask"), "mask");
    }

    #[test]
    fn everything_else_maps_to_func() {
        assert_eq!(category_for_suffix("bold"), "func");
    }

    #[test]
    fn derivative_location_includes_subject_and_session() {
        let key = ResourceKey::from_str("sub-001_ses-002_T1w").unwrap();
        let path = derivative_location(Path::new("/out"), "anat-preproc", &key, "nii.gz");
        assert_eq!(
            path,
            PathBuf::from("/out/derivatives/anat-preproc/sub-001/ses-002/anat/sub-001_ses-002_T1w.nii.gz")
        );
    }

    #[test]
    fn derivative_location_omits_absent_branching_entities() {
        let key = ResourceKey::from_str("mask").unwrap();
        let path = derivative_location(Path::new("/out"), "anat-preproc", &key, "nii.gz");
        assert_eq!(path, PathBuf::from("/out/derivatives/anat-preproc/mask/mask.nii.gz"));
    }

    #[test]
    fn extension_of_preserves_double_nifti_suffix() {
        assert_eq!(extension_of(Path::new("a/b/c.nii.gz")), "nii.gz");
        assert_eq!(extension_of(Path::new("a/b/c.nii")), "nii");
        assert_eq!(extension_of(Path::new("a/b/c.txt")), "txt");
    }

    #[test]
    fn copy_into_derivatives_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.nii.gz");
        std::fs::write(&source, b"data").unwrap();
        let destination = dir.path().join("nested/deeper/a.nii.gz");
        copy_into_derivatives(&destination, &source).unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"data");
    }
}
