//! On-disk layout shared by the three stages.
//!
//! The directory tree is the only contract between stages, so every path a
//! stage reads or writes is derived here.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{GenomeAccession, GenomeId};
use crate::error::PipelineError;

pub const DATASET_ARCHIVE: &str = "ncbi_dataset.zip";
pub const DATASET_ROOT: &str = "ncbi_dataset";
/// Pipeline-owned working directory for the fetch tool, created under the
/// user's scratch directory. Nothing outside it is ever purged.
pub const ACQUISITION_WORKDIR: &str = ".genome-pipeline-scratch";
pub const SEQUENCE_EXTENSIONS: &[&str] = &[".fna", ".fasta"];
pub const RAW_SEQUENCE_SUFFIX: &str = ".fasta";
pub const MASKED_SUFFIX: &str = ".masked";

const REPMOD_DB: &str = "repmod_db";
const REPEATMODELER_OUT: &str = "repeatmodeler_out";
const REPEATMASKER_OUT: &str = "repeatmasker_out";
const REPEAT_LIBRARY: &str = "consensi.fa.classified";
const BRAKER_GFF3: &str = "braker.gff3";

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryConvention;

impl DirectoryConvention {
    /// The fetch tool runs here; its fixed-name archive and the extracted
    /// package both land inside.
    pub fn acquisition_workdir(&self, scratch_dir: &Utf8Path) -> Utf8PathBuf {
        scratch_dir.join(ACQUISITION_WORKDIR)
    }

    pub fn acquisition_scratch(&self, scratch_dir: &Utf8Path) -> Vec<Utf8PathBuf> {
        vec![self.acquisition_workdir(scratch_dir)]
    }

    pub fn dataset_archive(&self, workdir: &Utf8Path) -> Utf8PathBuf {
        workdir.join(DATASET_ARCHIVE)
    }

    pub fn dataset_data_dir(&self, workdir: &Utf8Path, accession: &GenomeAccession) -> Utf8PathBuf {
        workdir
            .join(DATASET_ROOT)
            .join("data")
            .join(accession.as_str())
    }

    pub fn acquired_sequence(&self, output_dir: &Utf8Path, id: &GenomeId) -> Utf8PathBuf {
        output_dir.join(format!("{id}{RAW_SEQUENCE_SUFFIX}"))
    }

    pub fn genome_dir(&self, output_dir: &Utf8Path, id: &GenomeId) -> Utf8PathBuf {
        output_dir.join(id.as_str())
    }

    pub fn repeat_database(&self, output_dir: &Utf8Path, id: &GenomeId) -> Utf8PathBuf {
        self.genome_dir(output_dir, id).join(REPMOD_DB)
    }

    pub fn repeatmodeler_dir(&self, output_dir: &Utf8Path, id: &GenomeId) -> Utf8PathBuf {
        self.genome_dir(output_dir, id).join(REPEATMODELER_OUT)
    }

    pub fn repeat_library(&self, output_dir: &Utf8Path, id: &GenomeId) -> Utf8PathBuf {
        self.repeat_library_in(&self.repeatmodeler_dir(output_dir, id))
    }

    pub fn repeat_library_in(&self, modeler_dir: &Utf8Path) -> Utf8PathBuf {
        modeler_dir.join(REPEAT_LIBRARY)
    }

    pub fn repeatmasker_dir(&self, output_dir: &Utf8Path, id: &GenomeId) -> Utf8PathBuf {
        self.genome_dir(output_dir, id).join(REPEATMASKER_OUT)
    }

    /// RepeatMasker names its outputs after the input file, not the genome.
    pub fn masked_sequence(&self, masker_dir: &Utf8Path, input: &Utf8Path) -> Utf8PathBuf {
        masker_dir.join(format!("{}{MASKED_SUFFIX}", input.file_name().unwrap_or_default()))
    }

    pub fn masking_gff(&self, masker_dir: &Utf8Path, input: &Utf8Path) -> Utf8PathBuf {
        masker_dir.join(format!("{}.out.gff", input.file_name().unwrap_or_default()))
    }

    pub fn annotation_dir(&self, output_dir: &Utf8Path, id: &GenomeId) -> Utf8PathBuf {
        self.genome_dir(output_dir, id)
    }

    pub fn annotation_gff3(&self, working_dir: &Utf8Path) -> Utf8PathBuf {
        working_dir.join(BRAKER_GFF3)
    }

    /// `<input_dir>/*.fasta`, sorted.
    pub fn discover_raw_sequences(&self, input_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PipelineError> {
        let mut found = Vec::new();
        for path in list_dir(input_dir)? {
            let is_sequence = path
                .file_name()
                .map(|name| name.ends_with(RAW_SEQUENCE_SUFFIX) && name.len() > RAW_SEQUENCE_SUFFIX.len())
                .unwrap_or(false);
            if is_sequence && path.is_file() {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    /// `<input_dir>/*/repeatmasker_out/*.masked`, sorted.
    pub fn discover_masked_sequences(
        &self,
        input_dir: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, PipelineError> {
        let mut found = Vec::new();
        for genome_dir in list_dir(input_dir)? {
            let masker_dir = genome_dir.join(REPEATMASKER_OUT);
            if !masker_dir.is_dir() {
                continue;
            }
            for path in list_dir(&masker_dir)? {
                let is_masked = path
                    .file_name()
                    .map(|name| name.ends_with(MASKED_SUFFIX))
                    .unwrap_or(false);
                if is_masked && path.is_file() {
                    found.push(path);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    /// First sequence file inside an extracted dataset package, in name order.
    ///
    /// A package without a directory for the accession yields `Ok(None)`; any
    /// other I/O problem is an error.
    pub fn find_dataset_sequence(
        &self,
        data_dir: &Utf8Path,
    ) -> Result<Option<Utf8PathBuf>, PipelineError> {
        let exists = data_dir
            .as_std_path()
            .try_exists()
            .map_err(|err| PipelineError::fs(data_dir, err))?;
        if !exists {
            return Ok(None);
        }
        let mut entries = list_dir(data_dir)?;
        entries.sort();
        Ok(entries.into_iter().find(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map(|name| SEQUENCE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
                    .unwrap_or(false)
        }))
    }
}

fn list_dir(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PipelineError> {
    let entries = fs::read_dir(dir.as_std_path()).map_err(|err| PipelineError::fs(dir, err))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| PipelineError::fs(dir, err))?;
        match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(path) => paths.push(path),
            Err(path) => {
                tracing::warn!("skipping non-UTF-8 path {}", path.display());
            }
        }
    }
    Ok(paths)
}
