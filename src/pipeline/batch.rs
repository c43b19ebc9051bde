use crate::cache::AlignmentCache;
use crate::data::{ImageSink, ImageSource, RasterImage};
use crate::logging::{BatchSpan, CorrelationScope};
use crate::pipeline::registration::{apply, FrequencyAlignment};
use crate::pipeline::{AlignmentState, ImageFailure, TransformEstimate};
use crate::{AlignError, Result};
use chrono::{DateTime, Local};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Failures that stop a whole batch.
#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error("no images found")]
    NoImages,

    #[error("reference image '{0}' is not part of the working set")]
    ReferenceNotFound(String),

    #[error("could not start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Engine(#[from] AlignError),
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Reference identity; the first listed image when `None`.
    pub reference: Option<String>,
    /// Drop the stored alignments of the reference before starting.
    pub recompute: bool,
    /// Worker threads; 0 uses one per core.
    pub threads: usize,
    /// Longer side of the working copy used for registration.
    pub max_dimension: Option<u32>,
    /// Write aligned rasters to the sink.
    pub write_aligned: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            reference: None,
            recompute: false,
            threads: 0,
            max_dimension: None,
            write_aligned: true,
        }
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub reference: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    /// Final state of every target.
    pub targets: BTreeMap<String, AlignmentState>,
    /// Targets whose transform came from the store.
    pub cached: Vec<String>,
    /// Targets registered during this run.
    pub computed: Vec<String>,
    pub failures: Vec<ImageFailure>,
    /// Aligned rasters handed to the sink.
    pub written: usize,
}

impl BatchReport {
    pub fn transform(&self, target: &str) -> Option<&TransformEstimate> {
        self.targets.get(target).and_then(AlignmentState::transform)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registers every image of a source against one reference, reusing stored
/// transforms and computing the missing ones in parallel.
pub struct BatchAligner<'a> {
    source: &'a dyn ImageSource,
    sink: Option<&'a dyn ImageSink>,
    cache: AlignmentCache,
    engine: FrequencyAlignment,
    options: BatchOptions,
}

impl<'a> BatchAligner<'a> {
    pub fn new(source: &'a dyn ImageSource, cache: AlignmentCache, engine: FrequencyAlignment) -> Self {
        Self {
            source,
            sink: None,
            cache,
            engine,
            options: BatchOptions::default(),
        }
    }

    pub fn with_sink(mut self, sink: &'a dyn ImageSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn run(&self) -> std::result::Result<BatchReport, BatchError> {
        let started_at = Local::now();

        let identities = self.source.list()?;
        if identities.is_empty() {
            return Err(BatchError::NoImages);
        }
        let reference = match &self.options.reference {
            Some(name) if identities.contains(name) => name.clone(),
            Some(name) => return Err(BatchError::ReferenceNotFound(name.clone())),
            None => identities[0].clone(),
        };
        let targets: Vec<String> = identities.into_iter().filter(|id| *id != reference).collect();

        let scope = CorrelationScope::fresh();
        let span = BatchSpan::new(&reference, targets.len(), scope.id());
        let _entered = span.span().enter();

        if self.options.recompute && self.cache.invalidate(&reference)? {
            info!(reference = %reference, "Discarded stored alignments");
        }

        let record = self.cache.load(&reference)?;
        let missing: Vec<String> = record.missing(&targets).into_iter().map(str::to_string).collect();
        info!(
            reference = %reference,
            targets = targets.len(),
            missing = missing.len(),
            "Alignment store loaded"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads)
            .build()?;

        let mut states: BTreeMap<String, AlignmentState> = targets
            .iter()
            .map(|t| {
                let state = match record.get(t) {
                    Some(transform) => AlignmentState::Computed { transform: *transform },
                    None => AlignmentState::NotYetComputed,
                };
                (t.clone(), state)
            })
            .collect();
        let cached: Vec<String> = targets.iter().filter(|t| record.contains(t)).cloned().collect();
        let mut computed = Vec::new();
        let mut failures = Vec::new();

        if !missing.is_empty() {
            let (reference_copy, factor) = self.source.load_working_copy(&reference, self.options.max_dimension)?;
            if factor < 1.0 {
                info!(factor, "Registering on down-scaled working copies");
            }

            let results: Vec<(String, Result<TransformEstimate>)> = pool.install(|| {
                missing
                    .par_iter()
                    .map(|target| (target.clone(), self.register_one(target, &reference_copy, factor)))
                    .collect()
            });

            let mut fresh = Vec::new();
            for (target, result) in results {
                match result {
                    Ok(transform) => fresh.push((target, transform)),
                    Err(e) => {
                        warn!(image = %target, error = %e, "Alignment failed");
                        states.insert(target.clone(), AlignmentState::Failed { reason: e.to_string() });
                        failures.push(ImageFailure::new(target, &e));
                    }
                }
            }

            if !fresh.is_empty() {
                self.cache.update(&reference, |record| {
                    for (target, transform) in &fresh {
                        record.insert(target.clone(), *transform);
                    }
                })?;
            }
            for (target, transform) in fresh {
                states.insert(target.clone(), AlignmentState::Computed { transform });
                computed.push(target);
            }
        }

        let mut written = 0;
        if let (Some(sink), true) = (self.sink, self.options.write_aligned) {
            let ready: Vec<(&String, TransformEstimate)> = states
                .iter()
                .filter_map(|(target, state)| state.transform().map(|t| (target, *t)))
                .collect();

            let outcomes: Vec<(String, Result<()>)> = pool.install(|| {
                ready
                    .par_iter()
                    .map(|(target, transform)| {
                        let span = crate::correlation_span!(tracing::Level::DEBUG, "write_aligned", image = %target);
                        let _entered = span.enter();
                        let outcome = self
                            .source
                            .load(target)
                            .and_then(|image| sink.write(target, apply(image.view(), transform).view(), transform));
                        ((*target).clone(), outcome)
                    })
                    .collect()
            });

            for (target, outcome) in outcomes {
                match outcome {
                    Ok(()) => written += 1,
                    Err(e) => {
                        warn!(image = %target, error = %e, "Writing aligned image failed");
                        failures.push(ImageFailure::new(target, &e));
                    }
                }
            }
        }

        span.record_completion(computed.len(), cached.len(), failures.len());

        Ok(BatchReport {
            reference,
            started_at,
            finished_at: Local::now(),
            targets: states,
            cached,
            computed,
            failures,
            written,
        })
    }

    /// Register one target against the shared reference working copy and
    /// express the translation in full-resolution pixels.
    fn register_one(&self, target: &str, reference: &RasterImage, factor: f64) -> Result<TransformEstimate> {
        let image = self.source.load_scaled(target, factor)?;
        self.engine
            .compute_traced(target, reference.view(), image.view())?
            .rescaled(factor)
    }
}
