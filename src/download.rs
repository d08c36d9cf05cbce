//! Acquisition stage: fetch each listed accession and leave `<output>/<accession>.fasta`.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};

use crate::batch::{BatchReport, BatchRun, Cancellation, FailurePolicy, GenomeItem, ProgressSink};
use crate::config::ResolvedConfig;
use crate::convention::DirectoryConvention;
use crate::domain::{GenomeAccession, Stage};
use crate::error::PipelineError;
use crate::executor::StageExecutor;
use crate::fs_util;
use crate::identity::{IdentityRegistry, resolve_from_accession};
use crate::tools::{DatasetsDownload, FetchInput, run_tool};
use crate::workspace::with_scratch;

pub const SEQUENCE_ARTIFACT: &str = "sequence";

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub accessions_file: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    /// Parent of the pipeline-owned fetch working directory. Only that
    /// subdirectory is created and purged; nothing else here is touched.
    pub scratch_dir: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadState {
    Downloading,
    Extracted,
    Relocated,
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadState::Downloading => write!(f, "downloading"),
            DownloadState::Extracted => write!(f, "extracted"),
            DownloadState::Relocated => write!(f, "relocated"),
        }
    }
}

/// Reads one accession per line; blank lines and `#` comments are ignored and
/// repeated accessions are kept once, in first-seen order.
pub fn read_accession_list(path: &Utf8Path) -> Result<Vec<GenomeAccession>, PipelineError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| PipelineError::InputNotFound(path.as_std_path().to_path_buf()))?;
    let mut seen = HashSet::new();
    let mut accessions = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let accession: GenomeAccession = trimmed.parse().map_err(|_| {
            PipelineError::InvalidGenomeAccession(format!("{trimmed} ({path}:{})", line_no + 1))
        })?;
        if !seen.insert(accession.clone()) {
            tracing::warn!("duplicate accession {accession} at {path}:{}", line_no + 1);
            continue;
        }
        accessions.push(accession);
    }
    Ok(accessions)
}

pub struct Downloader<E: StageExecutor> {
    executor: E,
    tool: DatasetsDownload,
    policy: FailurePolicy,
    convention: DirectoryConvention,
}

impl<E: StageExecutor> Downloader<E> {
    pub fn new(executor: E, config: &ResolvedConfig) -> Self {
        Self {
            executor,
            tool: DatasetsDownload::new(&config.tools),
            policy: config.policies.acquisition,
            convention: DirectoryConvention,
        }
    }

    pub fn run(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
        cancel: &Cancellation,
    ) -> Result<BatchReport, PipelineError> {
        if !request.accessions_file.is_file() {
            return Err(PipelineError::InputNotFound(
                request.accessions_file.as_std_path().to_path_buf(),
            ));
        }
        let accessions = read_accession_list(&request.accessions_file)?;
        let mut run = BatchRun::new(Stage::Acquisition, self.policy, sink, cancel);
        if accessions.is_empty() {
            tracing::warn!("{} lists no accessions", request.accessions_file);
            return Ok(run.finish());
        }

        for dir in [&request.output_dir, &request.scratch_dir] {
            fs::create_dir_all(dir.as_std_path()).map_err(|err| PipelineError::fs(dir, err))?;
        }
        tracing::info!("downloading {} genome(s) into {}", accessions.len(), request.output_dir);

        let mut registry = IdentityRegistry::new();
        for accession in accessions {
            let mut item = GenomeItem::from_accession(accession.clone());
            let outcome = self.fetch_one(&accession, &mut item, &mut registry, &run, request);
            if run.settle(item, outcome).is_break() {
                break;
            }
        }
        Ok(run.finish())
    }

    fn fetch_one(
        &self,
        accession: &GenomeAccession,
        item: &mut GenomeItem,
        registry: &mut IdentityRegistry,
        run: &BatchRun<'_>,
        request: &DownloadRequest,
    ) -> Result<(), PipelineError> {
        let id = resolve_from_accession(accession);
        registry.claim(&id, accession.as_str())?;
        item.id = Some(id.clone());
        run.ensure_not_cancelled()?;

        let workdir = self.convention.acquisition_workdir(&request.scratch_dir);
        with_scratch(self.convention.acquisition_scratch(&request.scratch_dir), |_| {
            fs::create_dir_all(workdir.as_std_path())
                .map_err(|err| PipelineError::fs(&workdir, err))?;
            let mut state = DownloadState::Downloading;
            run.progress(id.as_str(), state.to_string());
            let start = Instant::now();
            let archive = run_tool(
                &self.executor,
                &self.tool,
                &FetchInput {
                    accession: accession.clone(),
                    work_dir: workdir.clone(),
                },
            )
            .into_result()?;
            run.progress_timed(id.as_str(), "archive fetched", start.elapsed());

            fs_util::extract_zip(&archive, &workdir)?;
            state = DownloadState::Extracted;
            run.progress(id.as_str(), state.to_string());

            let data_dir = self.convention.dataset_data_dir(&workdir, accession);
            let sequence = self.convention.find_dataset_sequence(&data_dir)?.ok_or_else(|| {
                PipelineError::ItemFailure(format!("no .fna/.fasta file for {accession} in {data_dir}"))
            })?;

            let dest = self.convention.acquired_sequence(&request.output_dir, &id);
            fs_util::relocate_file(&sequence, &dest)?;
            state = DownloadState::Relocated;
            run.progress(id.as_str(), format!("{state} to {dest}"));
            item.record(SEQUENCE_ARTIFACT, dest);
            Ok(())
        })
    }
}
