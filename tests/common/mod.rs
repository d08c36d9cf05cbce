#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use zip::write::SimpleFileOptions;

use genome_pipeline::batch::{ProgressEvent, ProgressSink};
use genome_pipeline::executor::{ItemFailure, StageExecutor, StageResult, ToolInvocation};

type Behaviour = Box<dyn Fn(&ToolInvocation) -> StageResult + Send + Sync>;

/// Records every invocation and answers with a per-test behaviour.
pub struct MockExecutor {
    behaviour: Behaviour,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl MockExecutor {
    pub fn new(behaviour: impl Fn(&ToolInvocation) -> StageResult + Send + Sync + 'static) -> Self {
        Self {
            behaviour: Box::new(behaviour),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.program).collect()
    }
}

impl StageExecutor for MockExecutor {
    fn run(&self, invocation: &ToolInvocation) -> StageResult {
        self.calls.lock().unwrap().push(invocation.clone());
        (self.behaviour)(invocation)
    }
}

pub struct Silent;

impl ProgressSink for Silent {
    fn event(&self, _event: ProgressEvent) {}
}

pub fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

pub fn failure(reason: &str) -> StageResult {
    StageResult::ItemFailure(ItemFailure {
        reason: reason.to_string(),
        exit_code: Some(1),
        command: None,
    })
}

pub fn touch(path: &Utf8Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b">seq\nACGT\n").unwrap();
}

/// Writes a dataset package the way the download tool lays it out.
pub fn write_dataset_archive(archive: &Utf8Path, accession: &str, sequence_file: Option<&str>) {
    let file = fs::File::create(archive).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    zip.start_file("README.md", options).unwrap();
    zip.write_all(b"NCBI Datasets package\n").unwrap();
    zip.start_file("ncbi_dataset/data/dataset_catalog.json", options)
        .unwrap();
    zip.write_all(b"{}").unwrap();
    zip.start_file(
        format!("ncbi_dataset/data/{accession}/sequence_report.jsonl"),
        options,
    )
    .unwrap();
    zip.write_all(b"{}\n").unwrap();
    if let Some(name) = sequence_file {
        zip.start_file(format!("ncbi_dataset/data/{accession}/{name}"), options)
            .unwrap();
        zip.write_all(format!(">{accession}\nACGT\n").as_bytes())
            .unwrap();
    }
    zip.finish().unwrap();
}

/// Simulates the three masking tools producing their artifacts.
pub fn fake_masking_tools(invocation: &ToolInvocation) -> StageResult {
    match invocation.program.as_str() {
        "BuildDatabase" => {
            touch(&Utf8PathBuf::from(format!("{}.nhr", invocation.output)));
        }
        "RepeatMasker" => {
            touch(&invocation.output);
            let gff = invocation.output.as_str().replace(".masked", ".out.gff");
            touch(Utf8Path::new(&gff));
        }
        _ => touch(&invocation.output),
    }
    StageResult::Success(invocation.output.clone())
}

pub fn arg_after<'a>(invocation: &'a ToolInvocation, flag: &str) -> Option<&'a str> {
    invocation
        .args
        .iter()
        .position(|arg| arg == flag)
        .and_then(|index| invocation.args.get(index + 1))
        .map(String::as_str)
}
