use std::fs;
use std::io;

use camino::Utf8Path;
use zip::ZipArchive;

use crate::error::PipelineError;

/// Expands `zip_path` under `target_dir`, rejecting entries that escape it.
pub fn extract_zip(zip_path: &Utf8Path, target_dir: &Utf8Path) -> Result<usize, PipelineError> {
    let file = fs::File::open(zip_path.as_std_path())
        .map_err(|err| PipelineError::fs(format!("open zip {zip_path}"), err))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| PipelineError::fs(format!("read zip {zip_path}"), err))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| PipelineError::fs(zip_path, err))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.as_std_path().join(path),
            None => {
                return Err(PipelineError::Filesystem(format!(
                    "zip entry path traversal detected in {zip_path}"
                )));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path).map_err(|err| PipelineError::fs(zip_path, err))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| PipelineError::fs(zip_path, err))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| PipelineError::fs(zip_path, err))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| PipelineError::fs(zip_path, err))?;
        written += 1;
    }
    Ok(written)
}

/// Moves `source` to `dest`, replacing any existing file.
///
/// Falls back to a copy through a temp file next to `dest` when a rename is
/// not possible, e.g. scratch and output live on different filesystems.
pub fn relocate_file(source: &Utf8Path, dest: &Utf8Path) -> Result<(), PipelineError> {
    let parent = dest
        .parent()
        .ok_or_else(|| PipelineError::Filesystem(format!("invalid destination path {dest}")))?;
    fs::create_dir_all(parent.as_std_path()).map_err(|err| PipelineError::fs(parent, err))?;

    if fs::rename(source.as_std_path(), dest.as_std_path()).is_ok() {
        return Ok(());
    }

    let temp = tempfile::Builder::new()
        .prefix(".genome-pipeline")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| PipelineError::fs(parent, err))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| PipelineError::fs(format!("copy {source}"), err))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| PipelineError::fs(format!("persist {dest}"), err))?;
    fs::remove_file(source.as_std_path())
        .map_err(|err| PipelineError::fs(format!("remove {source}"), err))?;
    Ok(())
}

/// Resolves `path` against the current directory without touching the filesystem.
pub fn absolute_utf8(path: &std::path::Path) -> Result<camino::Utf8PathBuf, PipelineError> {
    let absolute = std::path::absolute(path).map_err(|err| PipelineError::fs(path.display(), err))?;
    camino::Utf8PathBuf::from_path_buf(absolute).map_err(|path| {
        PipelineError::Filesystem(format!("non-UTF-8 path {}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Utf8Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path.as_std_path()).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_dataset_layout() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let zip_path = dir.join("ncbi_dataset.zip");
        write_zip(
            &zip_path,
            &[
                ("ncbi_dataset/data/GCF_1.1/GCF_1.1_genomic.fna", b">chr1\nACGT\n"),
                ("README.md", b"readme"),
            ],
        );

        let written = extract_zip(&zip_path, dir).unwrap();
        assert_eq!(written, 2);
        assert!(dir.join("ncbi_dataset/data/GCF_1.1/GCF_1.1_genomic.fna").is_file());
    }

    #[test]
    fn rejects_traversal() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let zip_path = dir.join("evil.zip");
        write_zip(&zip_path, &[("../escape.txt", b"x")]);

        assert_matches!(extract_zip(&zip_path, dir), Err(PipelineError::Filesystem(_)));
    }

    #[test]
    fn relocate_replaces_destination() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let source = dir.join("a.fna");
        let dest = dir.join("out").join("GCF_1.1.fasta");
        fs::write(&source, b">new").unwrap();
        fs::create_dir_all(dir.join("out")).unwrap();
        fs::write(&dest, b">old").unwrap();

        relocate_file(&source, &dest).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(&dest).unwrap(), b">new");
    }
}
