//! The analysis pipeline: files in, graph and artifacts out.
//!
//! Extraction runs in parallel on rayon, one file per task with no shared
//! mutable state. Graph assembly starts only once every file is analyzed.
//! Traversals run on the finished, immutable graph.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::classify::LayerClassifier;
use crate::config::{AnalysisConfig, ExtractionConfig};
use crate::dataflow::{trace_data_flow, DataFlowQuery, DataFlowTrace};
use crate::error::Result;
use crate::graph::{build_call_graph, CallGraph, FileAnalysis, GraphStats};
use crate::hotspot::{rank_hotspots, Hotspot};
use crate::impact::{compute_impact, FeatureMapper, FeatureSource, ImpactReport};
use crate::journey::{synthesize_all, synthesize_journey, SequenceFlow};
use crate::parser::extract_file;
use crate::progress::{NoProgress, Phase, ProgressEvent, ProgressSink};
use crate::propagation::{
    analyze_error_handling, trace_error_propagation, ErrorProfile, ErrorPropagation,
};

/// One input file. `path` is relative to the analysis root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Per-file results. Skipped files never abort the batch.
#[derive(Debug, Clone, Default)]
pub struct AnalysisBatch {
    /// Sorted by path.
    pub analyses: Vec<FileAnalysis>,
    pub skipped: Vec<SkippedFile>,
}

/// Extract and classify every file in parallel.
pub fn analyze_batch(
    files: &[SourceFile],
    config: &ExtractionConfig,
    classifier: &LayerClassifier,
) -> AnalysisBatch {
    let run = || -> Vec<std::result::Result<FileAnalysis, SkippedFile>> {
        files
            .par_iter()
            .map(|file| analyze_one(file, config, classifier))
            .collect()
    };
    let results = match config.workers {
        Some(workers) => match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!(workers, error = %e, "worker pool unavailable, using the global pool");
                run()
            }
        },
        None => run(),
    };

    let mut batch = AnalysisBatch::default();
    for result in results {
        match result {
            Ok(analysis) => batch.analyses.push(analysis),
            Err(skipped) => {
                warn!(file = %skipped.path, reason = %skipped.reason, "file skipped");
                batch.skipped.push(skipped);
            }
        }
    }
    batch.analyses.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    batch.skipped.sort_by(|a, b| a.path.cmp(&b.path));
    batch
}

fn analyze_one(
    file: &SourceFile,
    config: &ExtractionConfig,
    classifier: &LayerClassifier,
) -> std::result::Result<FileAnalysis, SkippedFile> {
    match extract_file(&file.path, &file.content, config) {
        Ok(mut analysis) => {
            classifier.classify(&mut analysis);
            debug!(
                file = %analysis.file_path,
                layer = %analysis.layer,
                declarations = analysis.declarations.len(),
                calls = analysis.calls.len(),
                "file analyzed"
            );
            Ok(analysis)
        }
        Err(e) => Err(SkippedFile {
            path: file.path.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Everything one run produces.
pub struct PipelineOutput {
    pub analyses: Vec<FileAnalysis>,
    pub skipped: Vec<SkippedFile>,
    pub graph: CallGraph,
    pub hotspots: Vec<Hotspot>,
    pub journeys: Vec<SequenceFlow>,
}

impl PipelineOutput {
    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            files_analyzed: self.analyses.len(),
            files_skipped: self.skipped.len(),
            graph: self.graph.stats(),
            journeys: self.journeys.len(),
            truncated_journeys: self.journeys.iter().filter(|j| j.truncated).count(),
            files_truncated: self.analyses.iter().filter(|a| a.truncated).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub files_analyzed: usize,
    pub files_skipped: usize,
    pub graph: GraphStats,
    pub journeys: usize,
    pub truncated_journeys: usize,
    /// Files whose nesting went past the walk limit.
    #[serde(default)]
    pub files_truncated: usize,
}

/// Config, rule tables and a progress sink bundled for repeated runs.
pub struct Pipeline {
    config: AnalysisConfig,
    classifier: LayerClassifier,
    features: Arc<dyn FeatureSource>,
    progress: Arc<dyn ProgressSink>,
}

impl Pipeline {
    /// Build the rule tables from `config`. Fails on a bad feature pattern.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let features = FeatureMapper::from_config(&config.features)?;
        Ok(Self {
            classifier: LayerClassifier::with_defaults(&config.extraction),
            features: Arc::new(features),
            progress: Arc::new(NoProgress),
            config,
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_features(mut self, features: Arc<dyn FeatureSource>) -> Self {
        self.features = features;
        self
    }

    pub fn with_classifier(mut self, classifier: LayerClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn features(&self) -> &dyn FeatureSource {
        self.features.as_ref()
    }

    pub fn analyze(&self, files: &[SourceFile]) -> AnalysisBatch {
        self.analyze_with(files, self.progress.as_ref())
    }

    pub fn build_graph(&self, analyses: &[FileAnalysis]) -> CallGraph {
        self.build_graph_with(analyses, self.progress.as_ref())
    }

    /// Analyze, assemble, rank hotspots and synthesize every journey.
    pub fn run(&self, files: &[SourceFile]) -> PipelineOutput {
        self.run_with(files, self.progress.as_ref())
    }

    /// [`Pipeline::run`] reporting to `sink` instead of the pipeline's own sink.
    pub fn run_with(&self, files: &[SourceFile], sink: &dyn ProgressSink) -> PipelineOutput {
        let batch = self.analyze_with(files, sink);
        let graph = self.build_graph_with(&batch.analyses, sink);

        let entries = graph.entry_points().count();
        let (hotspots, journeys) = timed_phase(sink, Phase::Traversal, entries, || {
            (
                rank_hotspots(&graph, &self.config.hotspots),
                synthesize_all(&graph, &self.config.journey),
            )
        });

        PipelineOutput {
            analyses: batch.analyses,
            skipped: batch.skipped,
            graph,
            hotspots,
            journeys,
        }
    }

    pub fn impact(&self, graph: &CallGraph, target: &str) -> Result<ImpactReport> {
        timed_phase(self.progress.as_ref(), Phase::Traversal, 1, || {
            compute_impact(graph, target, &self.config.impact, self.features.as_ref())
        })
    }

    pub fn journey(&self, graph: &CallGraph, entry: &str) -> Result<SequenceFlow> {
        timed_phase(self.progress.as_ref(), Phase::Traversal, 1, || {
            synthesize_journey(graph, entry, &self.config.journey)
        })
    }

    pub fn hotspots(&self, graph: &CallGraph) -> Vec<Hotspot> {
        rank_hotspots(graph, &self.config.hotspots)
    }

    pub fn error_profiles(&self, graph: &CallGraph) -> Vec<ErrorProfile> {
        let callables = graph.stats().declarations;
        timed_phase(self.progress.as_ref(), Phase::Traversal, callables, || {
            analyze_error_handling(graph, &self.config.errors)
        })
    }

    pub fn error_propagation(&self, graph: &CallGraph, origin: &str) -> Result<ErrorPropagation> {
        timed_phase(self.progress.as_ref(), Phase::Traversal, 1, || {
            trace_error_propagation(graph, origin, self.config.errors.limits)
        })
    }

    /// Trace one identifier through `source`, which should be one of the
    /// files `graph` was built from.
    pub fn data_flow(
        &self,
        graph: &CallGraph,
        source: &SourceFile,
        query: &DataFlowQuery,
    ) -> Result<DataFlowTrace> {
        timed_phase(self.progress.as_ref(), Phase::Traversal, 1, || {
            trace_data_flow(
                graph,
                source,
                query,
                &self.config.extraction,
                &self.config.dataflow,
            )
        })
    }

    fn analyze_with(&self, files: &[SourceFile], sink: &dyn ProgressSink) -> AnalysisBatch {
        timed_phase(sink, Phase::Extraction, files.len(), || {
            analyze_batch(files, &self.config.extraction, &self.classifier)
        })
    }

    fn build_graph_with(&self, analyses: &[FileAnalysis], sink: &dyn ProgressSink) -> CallGraph {
        timed_phase(sink, Phase::GraphAssembly, analyses.len(), || {
            build_call_graph(analyses)
        })
    }
}

fn timed_phase<T>(
    sink: &dyn ProgressSink,
    phase: Phase,
    items: usize,
    work: impl FnOnce() -> T,
) -> T {
    sink.emit(ProgressEvent::started(phase, items));
    let start = Instant::now();
    let out = work();
    sink.emit(ProgressEvent::completed(phase, items, start.elapsed()));
    out
}
