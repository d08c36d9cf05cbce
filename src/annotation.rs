//! Annotation stage: one BRAKER run per masked genome.

use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};

use crate::batch::{BatchReport, BatchRun, Cancellation, FailurePolicy, GenomeItem, ProgressSink};
use crate::config::ResolvedConfig;
use crate::convention::DirectoryConvention;
use crate::domain::Stage;
use crate::error::PipelineError;
use crate::executor::StageExecutor;
use crate::identity::{IdentityRegistry, SuffixRules, resolve_from_artifact_name};
use crate::tools::{Braker, BrakerInput, run_tool};

pub const MASKED_ARTIFACT: &str = "masked_sequence";
pub const GENE_MODELS_ARTIFACT: &str = "gene_models";

#[derive(Debug, Clone)]
pub struct AnnotationRequest {
    pub input_dir: Utf8PathBuf,
    pub proteins: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub threads: usize,
}

pub struct Annotator<E: StageExecutor> {
    executor: E,
    braker: Braker,
    policy: FailurePolicy,
    convention: DirectoryConvention,
    rules: SuffixRules,
}

impl<E: StageExecutor> Annotator<E> {
    pub fn new(executor: E, config: &ResolvedConfig) -> Self {
        Self {
            executor,
            braker: Braker::new(&config.tools),
            policy: config.policies.annotation,
            convention: DirectoryConvention,
            rules: SuffixRules::masked_artifact(),
        }
    }

    pub fn run(
        &self,
        request: &AnnotationRequest,
        sink: &dyn ProgressSink,
        cancel: &Cancellation,
    ) -> Result<BatchReport, PipelineError> {
        if !request.input_dir.is_dir() {
            return Err(PipelineError::InputNotFound(
                request.input_dir.as_std_path().to_path_buf(),
            ));
        }
        if !request.proteins.is_file() {
            return Err(PipelineError::InputNotFound(
                request.proteins.as_std_path().to_path_buf(),
            ));
        }
        let masked = self.convention.discover_masked_sequences(&request.input_dir)?;
        if masked.is_empty() {
            return Err(PipelineError::NoInputs {
                dir: request.input_dir.to_string(),
                pattern: "*/repeatmasker_out/*.masked".to_string(),
            });
        }
        fs::create_dir_all(request.output_dir.as_std_path())
            .map_err(|err| PipelineError::fs(&request.output_dir, err))?;
        tracing::info!("annotating {} genome(s) into {}", masked.len(), request.output_dir);

        let mut run = BatchRun::new(Stage::Annotation, self.policy, sink, cancel);
        let mut registry = IdentityRegistry::new();
        for genome in masked {
            let mut item = GenomeItem::new(genome.as_str());
            let outcome = self.annotate_one(&genome, &mut item, &mut registry, &run, request);
            if run.settle(item, outcome).is_break() {
                break;
            }
        }
        Ok(run.finish())
    }

    fn annotate_one(
        &self,
        masked: &Utf8Path,
        item: &mut GenomeItem,
        registry: &mut IdentityRegistry,
        run: &BatchRun<'_>,
        request: &AnnotationRequest,
    ) -> Result<(), PipelineError> {
        let file_name = masked
            .file_name()
            .ok_or_else(|| PipelineError::ItemFailure(format!("{masked} has no file name")))?;
        let id = resolve_from_artifact_name(file_name, &self.rules)?;
        registry.claim(&id, masked.as_str())?;
        item.id = Some(id.clone());
        item.record(MASKED_ARTIFACT, masked.to_path_buf());
        run.ensure_not_cancelled()?;

        let working_dir = self.convention.annotation_dir(&request.output_dir, &id);
        fs::create_dir_all(working_dir.as_std_path())
            .map_err(|err| PipelineError::fs(&working_dir, err))?;

        run.progress(id.as_str(), "running braker.pl");
        let start = Instant::now();
        let gene_models = run_tool(
            &self.executor,
            &self.braker,
            &BrakerInput {
                genome: masked.to_path_buf(),
                species: id.clone(),
                proteins: request.proteins.clone(),
                threads: request.threads,
                working_dir,
            },
        )
        .into_result()?;
        run.progress_timed(id.as_str(), format!("gene models in {gene_models}"), start.elapsed());
        item.record(GENE_MODELS_ARTIFACT, gene_models);
        Ok(())
    }
}
