//! [`Resource`], the opaque value handle addressed by a [`resource_pool::ResourcePool`]
//! in this crate's graph, and its four variants: literal, computed, file and invalid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::eyre::{bail, Result};
use hash_utils::{HashContent, Hashable};

use crate::job::Job;

/// A concrete, resolved value carried by a [`Resource`] once all of its
/// dependencies (if any) have been computed.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Path(PathBuf),
    /// The whole output map of a job, used when a [`ComputedResource`] has no
    /// named field and projects the entire result.
    Map(BTreeMap<String, ResourceValue>),
}

impl Hashable for ResourceValue {
    fn hash_content(&self) -> HashContent {
        match self {
            ResourceValue::Str(s) => HashContent::Str(s.clone()),
            ResourceValue::Int(i) => HashContent::Int(*i),
            ResourceValue::Float(f) => HashContent::Float(*f),
            ResourceValue::Bool(b) => HashContent::Bool(*b),
            ResourceValue::Path(p) => HashContent::Str(p.to_string_lossy().to_string()),
            ResourceValue::Map(m) => HashContent::Map(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.hash_content()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for ResourceValue {
    fn from(value: &str) -> Self {
        ResourceValue::Str(value.to_string())
    }
}

impl From<String> for ResourceValue {
    fn from(value: String) -> Self {
        ResourceValue::Str(value)
    }
}

impl From<i64> for ResourceValue {
    fn from(value: i64) -> Self {
        ResourceValue::Int(value)
    }
}

impl From<f64> for ResourceValue {
    fn from(value: f64) -> Self {
        ResourceValue::Float(value)
    }
}

impl From<bool> for ResourceValue {
    fn from(value: bool) -> Self {
        ResourceValue::Bool(value)
    }
}

impl From<PathBuf> for ResourceValue {
    fn from(value: PathBuf) -> Self {
        ResourceValue::Path(value)
    }
}

impl ResourceValue {
    /// Render this value the way a shell argument or file extension lookup
    /// would want it: the raw string form with no quoting.
    pub fn display(&self) -> String {
        match self {
            ResourceValue::Str(s) => s.clone(),
            ResourceValue::Int(i) => i.to_string(),
            ResourceValue::Float(f) => f.to_string(),
            ResourceValue::Bool(b) => b.to_string(),
            ResourceValue::Path(p) => p.to_string_lossy().to_string(),
            ResourceValue::Map(_) => "<map>".to_string(),
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            ResourceValue::Path(p) => Some(p),
            _ => None,
        }
    }
}

/// An opaque handle to a value addressable in a [`resource_pool::ResourcePool`].
///
/// All variants are immutable once constructed (§3). Only [`Resource::Computed`]
/// carries a dependency: it is a promise for a named output field of a [`Job`].
#[derive(Debug, Clone)]
pub enum Resource {
    Literal(LiteralResource),
    Computed(ComputedResource),
    File(FileResource),
    Invalid(InvalidResource),
}

impl Resource {
    pub fn literal(value: impl Into<ResourceValue>) -> Self {
        Resource::Literal(LiteralResource {
            value: value.into(),
        })
    }

    pub fn file(path: impl Into<String>) -> Result<Self> {
        Ok(Resource::File(FileResource::new(path)?))
    }

    pub fn invalid(cause: impl Into<String>) -> Self {
        Resource::Invalid(InvalidResource {
            cause: cause.into(),
        })
    }

    /// True for [`Resource::Computed`]: the only variant with a producer job
    /// to walk backward through during graph construction (§4.5).
    pub fn dependencies(&self) -> Option<&ComputedResource> {
        match self {
            Resource::Computed(c) => Some(c),
            _ => None,
        }
    }

    /// Resolve a non-computed resource directly to its value. [`Resource::Computed`]
    /// is never resolved this way: its value always comes from a job's result
    /// (see `execution-graph::GraphNode::invoke`).
    pub fn resolve_leaf(&self, work_dir: &Path) -> Result<ResourceValue> {
        match self {
            Resource::Literal(l) => Ok(l.value.clone()),
            Resource::File(f) => f.materialize(work_dir).map(ResourceValue::Path),
            Resource::Invalid(inv) => bail!("{}", inv.cause),
            Resource::Computed(_) => {
                bail!("computed resources must be resolved through the execution graph")
            }
        }
    }
}

impl Hashable for Resource {
    fn hash_content(&self) -> HashContent {
        match self {
            Resource::Literal(l) => HashContent::Seq(vec![l.value.hash_content()]),
            Resource::Computed(c) => c.hash_content(),
            Resource::File(f) => HashContent::Seq(vec![HashContent::Str(f.path.clone())]),
            Resource::Invalid(i) => HashContent::Seq(vec![HashContent::Str(i.cause.clone())]),
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Resource::Literal(a), Resource::Literal(b)) => a.value == b.value,
            (Resource::Computed(a), Resource::Computed(b)) => a.identity() == b.identity(),
            (Resource::File(a), Resource::File(b)) => a.path == b.path,
            (Resource::Invalid(a), Resource::Invalid(b)) => a.cause == b.cause,
            _ => false,
        }
    }
}

/// A resource carrying a concrete value known at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralResource {
    value: ResourceValue,
}

impl LiteralResource {
    pub fn value(&self) -> &ResourceValue {
        &self.value
    }
}

/// A path-like resource that may require on-demand materialization from a
/// remote store (e.g. `s3://...`) before it can be read.
///
/// Remote materialization itself is an external collaborator out of this
/// crate's scope (§1); [`FileResource::materialize`] succeeds for local
/// paths and fails with a clear error for remote schemes this crate does
/// not implement, rather than silently returning an unreachable path.
#[derive(Debug, Clone, PartialEq)]
pub struct FileResource {
    path: String,
}

impl FileResource {
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if path.is_empty() {
            bail!("file resource path cannot be empty");
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_remote(&self) -> bool {
        self.path.contains("://")
    }

    /// Resolve this resource to a local path. Local paths are returned
    /// as-is; remote schemes fail since this crate has no built-in
    /// downloader (see module docs).
    pub fn materialize(&self, _work_dir: &Path) -> Result<PathBuf> {
        if self.is_remote() {
            bail!(
                "remote file resource \"{}\" requires a configured remote store, which this crate does not provide",
                self.path
            );
        }
        Ok(PathBuf::from(&self.path))
    }
}

/// A tombstone carrying the cause of a failure, substituted for a resource
/// that could not be produced (§4.5 gather).
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidResource {
    cause: String,
}

impl InvalidResource {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }

    pub fn cause(&self) -> &str {
        &self.cause
    }
}

/// A promise for one named output field of a [`Job`] (or, when `field` is
/// `None`, the job's entire output map).
///
/// Identity is the address of the shared [`Job`] allocation wrapped together
/// with this resource's own allocation (see [`ComputedResource::identity`]):
/// cloning a `ComputedResource` preserves identity so the same pool entry,
/// read twice, resolves to the same graph node (§4.5 "keyed by object
/// identity... to preserve sharing").
#[derive(Debug, Clone)]
pub struct ComputedResource(Arc<ComputedResourceInner>);

#[derive(Debug)]
struct ComputedResourceInner {
    job: Arc<dyn Job>,
    field: Option<String>,
    reference: Option<String>,
    cached_hash: once_cell_lazy::OnceCell<String>,
}

// A tiny local alias so this module does not need to re-export `once_cell`
// from `common` just for this one field.
mod once_cell_lazy {
    pub use common::once_cell::sync::OnceCell;
}

impl ComputedResource {
    pub fn new(job: Arc<dyn Job>, field: Option<String>) -> Self {
        Self(Arc::new(ComputedResourceInner {
            job,
            field,
            reference: None,
            cached_hash: once_cell_lazy::OnceCell::new(),
        }))
    }

    pub fn with_reference(job: Arc<dyn Job>, field: Option<String>, reference: impl Into<String>) -> Self {
        Self(Arc::new(ComputedResourceInner {
            job,
            field,
            reference: Some(reference.into()),
            cached_hash: once_cell_lazy::OnceCell::new(),
        }))
    }

    pub fn job(&self) -> Arc<dyn Job> {
        self.0.job.clone()
    }

    pub fn field(&self) -> Option<&str> {
        self.0.field.as_deref()
    }

    pub fn reference(&self) -> Option<&str> {
        self.0.reference.as_deref()
    }

    /// A stable identity for this particular promise, preserved across
    /// clones (they share the same `Arc` allocation).
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// `(reference, jobHash, fieldName)` per §4.4, memoized the first time
    /// it is read. Like a job's own hash, this must only be read once the
    /// producer job's hash has been finalized by the solver.
    pub fn long_hash(&self) -> String {
        self.0
            .cached_hash
            .get_or_init(|| hash_utils::content_digest(&self.hash_content()))
            .clone()
    }
}

impl Hashable for ComputedResource {
    fn hash_content(&self) -> HashContent {
        HashContent::Seq(vec![
            self.0.reference.clone().into(),
            HashContent::Str(self.0.job.long_hash()),
            self.0.field.clone().into(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::MockJob;

    #[test]
    fn literal_resource_resolves_to_its_value() {
        let r = Resource::literal("c.nii.gz");
        let v = r.resolve_leaf(Path::new("/tmp")).unwrap();
        assert_eq!(v, ResourceValue::Str("c.nii.gz".to_string()));
    }

    #[test]
    fn remote_file_resource_fails_to_materialize() {
        let r = FileResource::new("s3://bucket/key.nii.gz").unwrap();
        assert!(r.materialize(Path::new("/tmp")).is_err());
    }

    #[test]
    fn local_file_resource_materializes_to_its_path() {
        let r = FileResource::new("/a/b/c.nii.gz").unwrap();
        let p = r.materialize(Path::new("/tmp")).unwrap();
        assert_eq!(p, PathBuf::from("/a/b/c.nii.gz"));
    }

    #[test]
    fn invalid_resource_fails_to_resolve() {
        let r = Resource::invalid("boom");
        assert!(r.resolve_leaf(Path::new("/tmp")).is_err());
    }

    #[test]
    fn cloning_a_computed_resource_preserves_identity() {
        let job: Arc<dyn Job> = Arc::new(MockJob::new(
            None,
            BTreeMap::new(),
            BTreeMap::from([("path".to_string(), ResourceValue::from("x"))]),
        ));
        let cr = ComputedResource::new(job, Some("path".to_string()));
        let cloned = cr.clone();
        assert_eq!(cr.identity(), cloned.identity());
    }

    #[test]
    fn two_distinct_computed_resources_have_distinct_identity() {
        let job: Arc<dyn Job> = Arc::new(MockJob::new(
            None,
            BTreeMap::new(),
            BTreeMap::from([("path".to_string(), ResourceValue::from("x"))]),
        ));
        let a = ComputedResource::new(job.clone(), Some("path".to_string()));
        let b = ComputedResource::new(job, Some("path".to_string()));
        assert_ne!(a.identity(), b.identity());
    }
}
