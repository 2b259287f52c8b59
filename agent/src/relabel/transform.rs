use common::error::Result;
use common::sd::target::Target;

/// User relabeling logic applied to the whole target list of one discovery cycle.
///
/// Implementations receive their own copy of the targets and return the list
/// that replaces it. Returning an error fails the entire cycle; nothing is
/// partially applied. The same input must always produce the same output.
pub trait Transformation: Send + Sync {
    fn name(&self) -> &str;

    fn relabel_targets(&self, targets: Vec<Target>) -> Result<Vec<Target>>;
}

/// A transformation backed by a closure.
pub struct FnTransformation<F> {
    name: String,
    f: F,
}

pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnTransformation<F>
where
    F: Fn(Vec<Target>) -> Result<Vec<Target>> + Send + Sync,
{
    FnTransformation { name: name.into(), f }
}

impl<F> Transformation for FnTransformation<F>
where
    F: Fn(Vec<Target>) -> Result<Vec<Target>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn relabel_targets(&self, targets: Vec<Target>) -> Result<Vec<Target>> {
        (self.f)(targets)
    }
}
