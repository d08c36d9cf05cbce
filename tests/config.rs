use std::fs;

use assert_matches::assert_matches;

use genome_pipeline::batch::FailurePolicy;
use genome_pipeline::config::{ConfigLoader, default_braker_flags};
use genome_pipeline::error::PipelineError;

#[test]
fn explicit_config_file_is_loaded() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("pipeline.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "tools": {
                "repeat_masker": "/opt/RepeatMasker/RepeatMasker",
                "ltr_struct": false
            },
            "policy": { "acquisition": "halt", "annotation": "isolate" }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    assert_eq!(resolved.source.as_deref(), Some(path.as_path()));
    assert_eq!(resolved.tools.repeat_masker, "/opt/RepeatMasker/RepeatMasker");
    assert!(!resolved.tools.ltr_struct);
    assert_eq!(resolved.tools.braker_flags, default_braker_flags());
    assert_eq!(resolved.policies.acquisition, FailurePolicy::Halt);
    assert_eq!(resolved.policies.masking, FailurePolicy::Halt);
    assert_eq!(resolved.policies.annotation, FailurePolicy::Isolate);
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("pipeline.json");
    fs::write(&path, r#"{ "policy": { "masking": "sometimes" } }"#).unwrap();

    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(PipelineError::ConfigParse(_))
    );
}
