use crate::pipeline::TransformEstimate;
use crate::Result;
use ndarray::ArrayView3;

/// Estimates how a target is misaligned relative to a reference.
pub trait AlignmentAlgorithm: Send + Sync {
    /// Returns the name of the algorithm
    fn name(&self) -> &str;

    /// Registration of `target` onto `reference`. Inputs may differ in
    /// size; implementations bring them to a common shape first.
    fn estimate(&self, reference: ArrayView3<f32>, target: ArrayView3<f32>) -> Result<TransformEstimate>;
}
