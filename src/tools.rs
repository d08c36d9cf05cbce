//! External tools, each expressed as an argument builder plus an output locator.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::ToolSettings;
use crate::convention::{DirectoryConvention, MASKED_SUFFIX};
use crate::domain::{GenomeAccession, GenomeId};
use crate::executor::{ItemFailure, StageExecutor, StageResult, ToolInvocation};

pub trait ExternalTool {
    type Input;

    fn name(&self) -> &str;

    fn invocation(&self, input: &Self::Input) -> ToolInvocation;

    /// Confirms the declared output actually exists after a zero exit.
    fn locate_output(&self, declared: &Utf8Path) -> Option<Utf8PathBuf> {
        declared.is_file().then(|| declared.to_path_buf())
    }

    /// Removes whatever an earlier run left at the declared output, so that
    /// `locate_output` only ever sees artifacts from this invocation.
    fn clear_output(&self, declared: &Utf8Path) -> io::Result<()> {
        remove_file_if_present(declared)
    }
}

/// Runs `tool` once and checks its declared output; a zero exit that left no
/// artifact behind is reported as an item failure.
pub fn run_tool<T: ExternalTool>(
    executor: &dyn StageExecutor,
    tool: &T,
    input: &T::Input,
) -> StageResult {
    let invocation = tool.invocation(input);
    if let Err(err) = tool.clear_output(&invocation.output) {
        return StageResult::ItemFailure(ItemFailure {
            reason: format!(
                "cannot clear stale output {} of {}: {err}",
                invocation.output,
                tool.name()
            ),
            exit_code: None,
            command: Some(invocation.command_line()),
        });
    }
    match executor.run(&invocation) {
        StageResult::Success(declared) => match tool.locate_output(&declared) {
            Some(path) => StageResult::Success(path),
            None => StageResult::ItemFailure(ItemFailure {
                reason: format!("{} exited cleanly but did not produce {declared}", tool.name()),
                exit_code: Some(0),
                command: Some(invocation.command_line()),
            }),
        },
        other => other,
    }
}

fn remove_file_if_present(path: &Utf8Path) -> io::Result<()> {
    match fs::remove_file(path.as_std_path()) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Files in `declared`'s directory whose names start with `<declared>.`.
fn prefixed_files(declared: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
    let (Some(parent), Some(name)) = (declared.parent(), declared.file_name()) else {
        return Ok(Vec::new());
    };
    let prefix = format!("{name}.");
    let entries = match fs::read_dir(parent.as_std_path()) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if file_name.starts_with(&prefix) && entry.file_type()?.is_file() {
            found.push(parent.join(file_name));
        }
    }
    Ok(found)
}

pub struct DatasetsDownload {
    program: String,
}

pub struct FetchInput {
    pub accession: GenomeAccession,
    pub work_dir: Utf8PathBuf,
}

impl DatasetsDownload {
    pub fn new(settings: &ToolSettings) -> Self {
        Self {
            program: settings.datasets.clone(),
        }
    }
}

impl ExternalTool for DatasetsDownload {
    type Input = FetchInput;

    fn name(&self) -> &str {
        "datasets"
    }

    fn invocation(&self, input: &Self::Input) -> ToolInvocation {
        ToolInvocation::new(
            &self.program,
            DirectoryConvention.dataset_archive(&input.work_dir),
        )
        .args(["download", "genome", "accession"])
        .arg(input.accession.as_str())
        .arg("--no-progressbar")
        .current_dir(input.work_dir.clone())
    }
}

pub struct BuildDatabase {
    program: String,
}

pub struct BuildDatabaseInput {
    pub database: Utf8PathBuf,
    pub genome: Utf8PathBuf,
}

impl BuildDatabase {
    pub fn new(settings: &ToolSettings) -> Self {
        Self {
            program: settings.build_database.clone(),
        }
    }
}

impl ExternalTool for BuildDatabase {
    type Input = BuildDatabaseInput;

    fn name(&self) -> &str {
        "BuildDatabase"
    }

    fn invocation(&self, input: &Self::Input) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(&self.program, input.database.clone())
            .arg("-name")
            .arg(input.database.as_str())
            .arg(input.genome.as_str());
        if let Some(dir) = input.database.parent() {
            invocation = invocation.current_dir(dir);
        }
        invocation
    }

    /// The database is a name prefix shared by several index files.
    fn locate_output(&self, declared: &Utf8Path) -> Option<Utf8PathBuf> {
        let has_index = !prefixed_files(declared).ok()?.is_empty();
        has_index.then(|| declared.to_path_buf())
    }

    fn clear_output(&self, declared: &Utf8Path) -> io::Result<()> {
        for index in prefixed_files(declared)? {
            remove_file_if_present(&index)?;
        }
        Ok(())
    }
}

pub struct RepeatModeler {
    program: String,
    ltr_struct: bool,
}

pub struct RepeatModelerInput {
    pub database: Utf8PathBuf,
    pub threads: usize,
    pub out_dir: Utf8PathBuf,
}

impl RepeatModeler {
    pub fn new(settings: &ToolSettings) -> Self {
        Self {
            program: settings.repeat_modeler.clone(),
            ltr_struct: settings.ltr_struct,
        }
    }
}

impl ExternalTool for RepeatModeler {
    type Input = RepeatModelerInput;

    fn name(&self) -> &str {
        "RepeatModeler"
    }

    fn invocation(&self, input: &Self::Input) -> ToolInvocation {
        let library = DirectoryConvention.repeat_library_in(&input.out_dir);
        let mut invocation = ToolInvocation::new(&self.program, library)
            .arg("-database")
            .arg(input.database.as_str())
            .arg("-pa")
            .arg(input.threads.to_string());
        if self.ltr_struct {
            invocation = invocation.arg("-LTRStruct");
        }
        invocation = invocation.arg("-dir").arg(input.out_dir.as_str());
        match input.out_dir.parent() {
            Some(genome_dir) => invocation.current_dir(genome_dir),
            None => invocation,
        }
    }
}

pub struct RepeatMasker {
    program: String,
    trf_dir: Option<String>,
}

pub struct RepeatMaskerInput {
    pub genome: Utf8PathBuf,
    pub library: Utf8PathBuf,
    pub threads: usize,
    pub out_dir: Utf8PathBuf,
}

impl RepeatMasker {
    pub fn new(settings: &ToolSettings) -> Self {
        Self {
            program: settings.repeat_masker.clone(),
            trf_dir: settings.trf_dir.clone(),
        }
    }
}

impl ExternalTool for RepeatMasker {
    type Input = RepeatMaskerInput;

    fn name(&self) -> &str {
        "RepeatMasker"
    }

    fn invocation(&self, input: &Self::Input) -> ToolInvocation {
        let masked = DirectoryConvention.masked_sequence(&input.out_dir, &input.genome);
        let mut invocation = ToolInvocation::new(&self.program, masked)
            .arg("-pa")
            .arg(input.threads.to_string())
            .args(["-e", "rmblast", "-xsmall"])
            .arg("-lib")
            .arg(input.library.as_str())
            .arg("-dir")
            .arg(input.out_dir.as_str())
            .arg("-gff");
        if let Some(trf_dir) = &self.trf_dir {
            invocation = invocation.arg("-trf_prgm").arg(trf_dir.as_str());
        }
        invocation = invocation.arg(input.genome.as_str());
        match input.out_dir.parent() {
            Some(genome_dir) => invocation.current_dir(genome_dir),
            None => invocation,
        }
    }

    /// The GFF track is checked by the caller after the run, so it goes too.
    fn clear_output(&self, declared: &Utf8Path) -> io::Result<()> {
        remove_file_if_present(declared)?;
        if let Some(stem) = declared.as_str().strip_suffix(MASKED_SUFFIX) {
            remove_file_if_present(Utf8Path::new(&format!("{stem}.out.gff")))?;
        }
        Ok(())
    }
}

pub struct Braker {
    program: String,
    flags: Vec<String>,
}

pub struct BrakerInput {
    pub genome: Utf8PathBuf,
    pub species: GenomeId,
    pub proteins: Utf8PathBuf,
    pub threads: usize,
    pub working_dir: Utf8PathBuf,
}

impl Braker {
    pub fn new(settings: &ToolSettings) -> Self {
        Self {
            program: settings.braker.clone(),
            flags: settings.braker_flags.clone(),
        }
    }
}

impl ExternalTool for Braker {
    type Input = BrakerInput;

    fn name(&self) -> &str {
        "braker.pl"
    }

    fn invocation(&self, input: &Self::Input) -> ToolInvocation {
        ToolInvocation::new(
            &self.program,
            DirectoryConvention.annotation_gff3(&input.working_dir),
        )
        .arg(format!("--threads={}", input.threads))
        .args(self.flags.iter().cloned())
        .arg(format!("--genome={}", input.genome))
        .arg("--gff3")
        .arg(format!("--species={}", input.species))
        .arg(format!("--prot_seq={}", input.proteins))
        .arg(format!("--workingdir={}", input.working_dir))
        .current_dir(input.working_dir.clone())
    }
}
