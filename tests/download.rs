mod common;

use std::fs;

use assert_matches::assert_matches;

use genome_pipeline::batch::{Cancellation, FailurePolicy, ItemStatus};
use genome_pipeline::config::ResolvedConfig;
use genome_pipeline::download::{DownloadRequest, Downloader, SEQUENCE_ARTIFACT};
use genome_pipeline::error::PipelineError;
use genome_pipeline::executor::{StageResult, ToolInvocation};

use common::{MockExecutor, Silent, failure, utf8_tempdir, write_dataset_archive};

fn request(root: &camino::Utf8Path, accessions: &str) -> DownloadRequest {
    let accessions_file = root.join("accessions.txt");
    fs::write(&accessions_file, accessions).unwrap();
    DownloadRequest {
        accessions_file,
        output_dir: root.join("genomes"),
        scratch_dir: root.join("scratch"),
    }
}

fn accession_of(invocation: &ToolInvocation) -> String {
    invocation.args[3].clone()
}

fn fetches_into_archive(invocation: &ToolInvocation) -> StageResult {
    let accession = accession_of(invocation);
    write_dataset_archive(
        &invocation.output,
        &accession,
        Some(&format!("{accession}_ASM1v1_genomic.fna")),
    );
    StageResult::Success(invocation.output.clone())
}

fn file_names(dir: &camino::Utf8Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn failed_accession_is_isolated() {
    let (_temp, root) = utf8_tempdir();
    let request = request(&root, "GCF_000001.1\nGCF_000002.1\n");
    let executor = MockExecutor::new(|invocation| {
        if accession_of(invocation) == "GCF_000002.1" {
            return failure("datasets download failed");
        }
        fetches_into_archive(invocation)
    });

    let report = Downloader::new(executor, &ResolvedConfig::default())
        .run(&request, &Silent, &Cancellation::new())
        .unwrap();

    assert!(!report.halted_early());
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(file_names(&request.output_dir), vec!["GCF_000001.1.fasta"]);
    assert_eq!(
        report.items[0].artifact(SEQUENCE_ARTIFACT),
        Some(&request.output_dir.join("GCF_000001.1.fasta"))
    );
    assert_matches!(&report.items[1].status, ItemStatus::Failed { reason } if reason.contains("datasets download failed"));
    assert!(report.into_result().is_ok());

    let content = fs::read_to_string(request.output_dir.join("GCF_000001.1.fasta")).unwrap();
    assert!(content.starts_with(">GCF_000001.1"));
}

#[test]
fn items_follow_file_order_and_scratch_is_cleaned() {
    let (_temp, root) = utf8_tempdir();
    let request = request(&root, "GCA_000003.1\n# skipped\nGCF_000001.1\n");
    let executor = MockExecutor::new(fetches_into_archive);
    let downloader = Downloader::new(executor, &ResolvedConfig::default());

    let report = downloader
        .run(&request, &Silent, &Cancellation::new())
        .unwrap();

    let labels: Vec<&str> = report.items.iter().map(|item| item.label()).collect();
    assert_eq!(labels, vec!["GCA_000003.1", "GCF_000001.1"]);
    assert!(file_names(&request.scratch_dir).is_empty());
    assert_eq!(
        file_names(&request.output_dir),
        vec!["GCA_000003.1.fasta", "GCF_000001.1.fasta"]
    );
}

#[test]
fn archive_without_sequence_fails_the_item() {
    let (_temp, root) = utf8_tempdir();
    let request = request(&root, "GCF_000009.1\n");
    let executor = MockExecutor::new(|invocation| {
        write_dataset_archive(&invocation.output, &accession_of(invocation), None);
        StageResult::Success(invocation.output.clone())
    });

    let report = Downloader::new(executor, &ResolvedConfig::default())
        .run(&request, &Silent, &Cancellation::new())
        .unwrap();

    assert_eq!(report.failed(), 1);
    assert_matches!(&report.items[0].status, ItemStatus::Failed { reason } if reason.contains("no .fna/.fasta"));
    assert!(file_names(&request.output_dir).is_empty());
    assert!(file_names(&request.scratch_dir).is_empty());
}

#[test]
fn clean_exit_without_archive_fails_the_item() {
    let (_temp, root) = utf8_tempdir();
    let request = request(&root, "GCF_000001.1\n");
    let executor = MockExecutor::new(|invocation| StageResult::Success(invocation.output.clone()));

    let report = Downloader::new(executor, &ResolvedConfig::default())
        .run(&request, &Silent, &Cancellation::new())
        .unwrap();

    assert_matches!(&report.items[0].status, ItemStatus::Failed { reason } if reason.contains("did not produce"));
}

#[test]
fn missing_tool_halts_the_batch() {
    let (_temp, root) = utf8_tempdir();
    let request = request(&root, "GCF_000001.1\nGCF_000002.1\n");
    let executor = MockExecutor::new(|_| StageResult::ToolUnavailable("datasets".to_string()));
    let downloader = Downloader::new(executor, &ResolvedConfig::default());

    let report = downloader
        .run(&request, &Silent, &Cancellation::new())
        .unwrap();

    assert!(report.halted_early());
    assert_eq!(report.items.len(), 1);
    assert_matches!(report.into_result(), Err(PipelineError::ToolUnavailable(_)));
}

#[test]
fn halt_policy_stops_after_first_failure() {
    let (_temp, root) = utf8_tempdir();
    let request = request(&root, "GCF_000001.1\nGCF_000002.1\n");
    let executor = MockExecutor::new(|_| failure("network unreachable"));
    let mut config = ResolvedConfig::default();
    config.policies.acquisition = FailurePolicy::Halt;

    let report = Downloader::new(executor, &config)
        .run(&request, &Silent, &Cancellation::new())
        .unwrap();

    assert_eq!(report.items.len(), 1);
    assert_matches!(
        report.into_result(),
        Err(PipelineError::BatchHalted { genome, .. }) if genome == "GCF_000001.1"
    );
}

#[test]
fn cancelled_batch_spawns_nothing() {
    let (_temp, root) = utf8_tempdir();
    let request = request(&root, "GCF_000001.1\n");
    let cancel = Cancellation::new();
    cancel.cancel();
    let executor = MockExecutor::new(fetches_into_archive);

    let report = Downloader::new(&executor, &ResolvedConfig::default())
        .run(&request, &Silent, &cancel)
        .unwrap();

    assert!(executor.calls().is_empty());
    assert_matches!(report.into_result(), Err(PipelineError::Cancelled { .. }));
}

#[test]
fn empty_list_is_an_empty_report() {
    let (_temp, root) = utf8_tempdir();
    let request = request(&root, "\n# nothing yet\n");
    let executor = MockExecutor::new(fetches_into_archive);

    let report = Downloader::new(executor, &ResolvedConfig::default())
        .run(&request, &Silent, &Cancellation::new())
        .unwrap();

    assert!(report.items.is_empty());
    assert!(!report.halted_early());
}

#[test]
fn missing_list_is_reported() {
    let (_temp, root) = utf8_tempdir();
    let request = DownloadRequest {
        accessions_file: root.join("absent.txt"),
        output_dir: root.join("genomes"),
        scratch_dir: root.clone(),
    };
    let executor = MockExecutor::new(fetches_into_archive);

    let err = Downloader::new(executor, &ResolvedConfig::default())
        .run(&request, &Silent, &Cancellation::new())
        .unwrap_err();

    assert_matches!(err, PipelineError::InputNotFound(path) if path.ends_with("absent.txt"));
}

#[test]
fn stale_scratch_is_purged_before_fetch() {
    let (_temp, root) = utf8_tempdir();
    let request = request(&root, "GCF_000001.1\n");
    let stale = request
        .scratch_dir
        .join(".genome-pipeline-scratch")
        .join("ncbi_dataset")
        .join("data")
        .join("GCF_000001.1");
    fs::create_dir_all(&stale).unwrap();
    fs::write(stale.join("aaa_stale.fna"), b">stale\n").unwrap();
    let executor = MockExecutor::new(fetches_into_archive);

    Downloader::new(executor, &ResolvedConfig::default())
        .run(&request, &Silent, &Cancellation::new())
        .unwrap();

    let content = fs::read_to_string(request.output_dir.join("GCF_000001.1.fasta")).unwrap();
    assert!(!content.contains("stale"));
}

#[test]
fn user_files_in_scratch_dir_survive() {
    let (_temp, root) = utf8_tempdir();
    let request = request(&root, "GCF_000001.1\nGCF_000002.1\n");
    fs::create_dir_all(&request.scratch_dir).unwrap();
    for name in ["README.md", "md5sum.txt", "ncbi_dataset.zip"] {
        fs::write(request.scratch_dir.join(name), b"mine\n").unwrap();
    }
    let executor = MockExecutor::new(|invocation| {
        if accession_of(invocation) == "GCF_000002.1" {
            return failure("datasets download failed");
        }
        fetches_into_archive(invocation)
    });

    let report = Downloader::new(&executor, &ResolvedConfig::default())
        .run(&request, &Silent, &Cancellation::new())
        .unwrap();

    assert_eq!(report.succeeded(), 1);
    assert_eq!(
        file_names(&request.scratch_dir),
        vec!["README.md", "md5sum.txt", "ncbi_dataset.zip"]
    );
    for name in ["README.md", "md5sum.txt", "ncbi_dataset.zip"] {
        assert_eq!(fs::read(request.scratch_dir.join(name)).unwrap(), b"mine\n");
    }
    let work_dir = request.scratch_dir.join(".genome-pipeline-scratch");
    assert_eq!(executor.calls()[0].working_dir.as_ref(), Some(&work_dir));
    assert!(!work_dir.exists());
}
