//! Masking stage: BuildDatabase, RepeatModeler and RepeatMasker chained per genome.

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
use crate::tools::{
    BuildDatabase, BuildDatabaseInput, ExternalTool, RepeatMasker, RepeatMaskerInput,
    RepeatModeler, RepeatModelerInput, run_tool,
};

pub const SEQUENCE_ARTIFACT: &str = "sequence";
pub const DATABASE_ARTIFACT: &str = "repeat_database";
pub const LIBRARY_ARTIFACT: &str = "repeat_library";
pub const MASKED_ARTIFACT: &str = "masked_sequence";
pub const GFF_ARTIFACT: &str = "repeat_gff";

#[derive(Debug, Clone)]
pub struct MaskingRequest {
    pub input_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub threads: usize,
}

pub struct Masker<E: StageExecutor> {
    executor: E,
    build_database: BuildDatabase,
    repeat_modeler: RepeatModeler,
    repeat_masker: RepeatMasker,
    policy: FailurePolicy,
    convention: DirectoryConvention,
}

impl<E: StageExecutor> Masker<E> {
    pub fn new(executor: E, config: &ResolvedConfig) -> Self {
        Self {
            executor,
            build_database: BuildDatabase::new(&config.tools),
            repeat_modeler: RepeatModeler::new(&config.tools),
            repeat_masker: RepeatMasker::new(&config.tools),
            policy: config.policies.masking,
            convention: DirectoryConvention,
        }
    }

    pub fn run(
        &self,
        request: &MaskingRequest,
        sink: &dyn ProgressSink,
        cancel: &Cancellation,
    ) -> Result<BatchReport, PipelineError> {
        if !request.input_dir.is_dir() {
            return Err(PipelineError::InputNotFound(
                request.input_dir.as_std_path().to_path_buf(),
            ));
        }
        let genomes = self.convention.discover_raw_sequences(&request.input_dir)?;
        if genomes.is_empty() {
            return Err(PipelineError::NoInputs {
                dir: request.input_dir.to_string(),
                pattern: "*.fasta".to_string(),
            });
        }
        fs::create_dir_all(request.output_dir.as_std_path())
            .map_err(|err| PipelineError::fs(&request.output_dir, err))?;
        tracing::info!("masking {} genome(s) into {}", genomes.len(), request.output_dir);

        let mut run = BatchRun::new(Stage::Masking, self.policy, sink, cancel);
        let mut registry = IdentityRegistry::new();
        for genome in genomes {
            let mut item = GenomeItem::new(genome.as_str());
            let outcome = self.mask_one(&genome, &mut item, &mut registry, &run, request);
            if run.settle(item, outcome).is_break() {
                break;
            }
        }
        Ok(run.finish())
    }

    fn mask_one(
        &self,
        genome: &Utf8Path,
        item: &mut GenomeItem,
        registry: &mut IdentityRegistry,
        run: &BatchRun<'_>,
        request: &MaskingRequest,
    ) -> Result<(), PipelineError> {
        let file_name = genome
            .file_name()
            .ok_or_else(|| PipelineError::ItemFailure(format!("{genome} has no file name")))?;
        let id = resolve_from_artifact_name(file_name, &SuffixRules::raw_sequence())?;
        registry.claim(&id, genome.as_str())?;
        item.id = Some(id.clone());
        item.record(SEQUENCE_ARTIFACT, genome.to_path_buf());

        let out = &request.output_dir;
        create_dir(&self.convention.genome_dir(out, &id))?;

        let database = self.link(
            run,
            id.as_str(),
            &self.build_database,
            &BuildDatabaseInput {
                database: self.convention.repeat_database(out, &id),
                genome: genome.to_path_buf(),
            },
        )?;
        item.record(DATABASE_ARTIFACT, database.clone());

        let modeler_dir = self.convention.repeatmodeler_dir(out, &id);
        create_dir(&modeler_dir)?;
        let library = self.link(
            run,
            id.as_str(),
            &self.repeat_modeler,
            &RepeatModelerInput {
                database,
                threads: request.threads,
                out_dir: modeler_dir,
            },
        )?;
        item.record(LIBRARY_ARTIFACT, library.clone());

        let masker_dir = self.convention.repeatmasker_dir(out, &id);
        create_dir(&masker_dir)?;
        let masked = self.link(
            run,
            id.as_str(),
            &self.repeat_masker,
            &RepeatMaskerInput {
                genome: genome.to_path_buf(),
                library,
                threads: request.threads,
                out_dir: masker_dir.clone(),
            },
        )?;
        item.record(MASKED_ARTIFACT, masked);

        let gff = self.convention.masking_gff(&masker_dir, genome);
        if !gff.is_file() {
            return Err(PipelineError::ItemFailure(format!(
                "RepeatMasker did not produce annotation track {gff}"
            )));
        }
        item.record(GFF_ARTIFACT, gff);
        Ok(())
    }

    /// One chain link: the next link only starts once this one's process has
    /// exited and its declared output exists.
    fn link<T: ExternalTool>(
        &self,
        run: &BatchRun<'_>,
        genome: &str,
        tool: &T,
        input: &T::Input,
    ) -> Result<Utf8PathBuf, PipelineError> {
        run.ensure_not_cancelled()?;
        run.progress(genome, format!("running {}", tool.name()));
        let start = Instant::now();
        let output = run_tool(&self.executor, tool, input).into_result()?;
        run.progress_timed(genome, format!("{} produced {output}", tool.name()), start.elapsed());
        Ok(output)
    }
}

fn create_dir(dir: &Utf8Path) -> Result<(), PipelineError> {
    fs::create_dir_all(dir.as_std_path()).map_err(|err| PipelineError::fs(dir, err))
}
