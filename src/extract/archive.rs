//! EPUB 压缩包解压

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::ZipArchive;

use super::ExtractionError;

/// 解压到新的临时目录，目录随返回值一起释放
pub fn unpack_to_temp(bytes: &[u8]) -> Result<TempDir, ExtractionError> {
    let dir = tempfile::Builder::new()
        .prefix("epub2pdf-unpack-")
        .tempdir()?;
    unpack(bytes, dir.path())?;
    Ok(dir)
}

/// 解压全部条目，返回写出的文件路径（按压缩包内顺序）
///
/// 条目路径逃出目标目录的（`../`、绝对路径）直接跳过。
pub fn unpack(bytes: &[u8], dest: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::CorruptArchive(e.to_string()))?;

    let mut written = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ExtractionError::CorruptArchive(e.to_string()))?;

        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!("跳过不安全的压缩包路径: {}", entry.name());
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| ExtractionError::CorruptArchive(format!("{}: {}", entry.name(), e)))?;
        written.push(target);
    }

    tracing::debug!("解压 {} 个文件到 {}", written.len(), dest.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn unpacks_nested_entries() {
        let bytes = build(&[("mimetype", "application/epub+zip"), ("OEBPS/a.html", "<p>x</p>")]);
        let dir = unpack_to_temp(&bytes).unwrap();
        assert!(dir.path().join("OEBPS/a.html").is_file());
    }

    #[test]
    fn skips_escaping_paths() {
        let bytes = build(&[("../evil.txt", "x"), ("ok.txt", "y")]);
        let dir = TempDir::new().unwrap();
        let written = unpack(&bytes, dir.path()).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("ok.txt"));
    }

    #[test]
    fn rejects_non_zip() {
        assert!(matches!(
            unpack_to_temp(b"not a zip"),
            Err(ExtractionError::CorruptArchive(_))
        ));
    }
}
