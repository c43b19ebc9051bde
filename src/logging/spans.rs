//! Structured spans for per-image registration and batch runs.

use crate::pipeline::TransformEstimate;
use std::time::Instant;
use tracing::{span, Level, Span};
use uuid::Uuid;

/// Span covering the registration of one target against the reference.
pub struct AlignmentSpan {
    span: Span,
    start_time: Instant,
    correlation_id: Uuid,
}

impl AlignmentSpan {
    /// Create a span for `target`, tagged with `correlation_id`.
    pub fn new(algorithm_name: &str, target: &str, correlation_id: Uuid) -> Self {
        let span = span!(
            Level::INFO,
            "alignment",
            algorithm = algorithm_name,
            image = target,
            correlation_id = %correlation_id,
            rotation = tracing::field::Empty,
            scale = tracing::field::Empty,
            execution_time_ms = tracing::field::Empty
        );

        Self {
            span,
            start_time: Instant::now(),
            correlation_id,
        }
    }

    /// Record the spectral stage. `rotation` is the target's rotation
    /// relative to the reference, as stored in the final estimate.
    pub fn record_rotation_scale(&self, rotation: f64, scale: f64) {
        self.span.record("rotation", rotation);
        self.span.record("scale", scale);
        tracing::debug!(
            parent: &self.span,
            rotation = rotation,
            scale = scale,
            "Rotation and scale estimated"
        );
    }

    /// Record the final estimate
    pub fn record_result(&self, transform: &TransformEstimate) {
        let duration = self.start_time.elapsed();
        self.span.record("execution_time_ms", duration.as_millis() as f64);
        let translation = transform.translation();

        tracing::info!(
            parent: &self.span,
            rotation = format!("{:.2}°", transform.rotation()),
            scale = format!("{:.3}x", transform.scale()),
            translation = format!("({:.2}, {:.2})", translation.dx, translation.dy),
            execution_time_ms = duration.as_millis(),
            "Alignment computed"
        );
    }

    /// Record a failure; the batch carries on with other targets
    pub fn record_failure(&self, error: &dyn std::fmt::Display) {
        let duration = self.start_time.elapsed();
        self.span.record("execution_time_ms", duration.as_millis() as f64);
        tracing::error!(
            parent: &self.span,
            error = %error,
            execution_time_ms = duration.as_millis(),
            "Alignment failed"
        );
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Get the underlying span for manual instrumentation
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Enter the span context
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

/// Span for a whole batch run
pub struct BatchSpan {
    span: Span,
    start_time: Instant,
}

impl BatchSpan {
    pub fn new(reference: &str, targets: usize, correlation_id: Uuid) -> Self {
        let span = span!(
            Level::INFO,
            "batch",
            reference = reference,
            targets = targets,
            correlation_id = %correlation_id
        );
        Self {
            span,
            start_time: Instant::now(),
        }
    }

    /// Record batch completion
    pub fn record_completion(&self, computed: usize, cached: usize, failed: usize) {
        tracing::info!(
            parent: &self.span,
            computed = computed,
            cached = cached,
            failed = failed,
            execution_time_ms = self.start_time.elapsed().as_millis(),
            "Batch completed"
        );
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Translation;

    #[test]
    fn test_alignment_span_records_without_subscriber() {
        let id = Uuid::new_v4();
        let span = AlignmentSpan::new("frequency", "slice_02.png", id);
        {
            let _guard = span.enter();
            span.record_rotation_scale(10.0, 1.0);
        }
        let transform = TransformEstimate::new(10.0, 1.0, Translation::new(8.0, -3.0)).unwrap();
        span.record_result(&transform);
        span.record_failure(&"boom");
        assert_eq!(span.correlation_id(), id);
    }
}
