//! Database export archives
//!
//! Creates `<name>_<YYYY-MM-DD_HH-MM-SS>.tar.zst` archives containing:
//! - MANIFEST.json - Format metadata and per-file xxh3 checksums
//! - `<name>/...` - Every file of the database directory except the lock file
//!
//! The archive is written to a temp file and renamed into place, so a failed
//! export leaves nothing behind. The source directory is never modified.

use crate::error::{CacheError, CacheResult};
use graphd_engine::LOCK_FILE_NAME;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, Header};

/// Archive manifest entry name
pub const MANIFEST_FILE_NAME: &str = "MANIFEST.json";

/// Archive file extension
pub const EXPORT_EXTENSION: &str = "tar.zst";

const EXPORT_FORMAT_VERSION: u32 = 1;

/// Information returned after exporting a database
#[derive(Debug, Clone)]
pub struct ExportInfo {
    /// Exported database name
    pub name: String,
    /// Where the archive was written
    pub path: PathBuf,
    /// Number of database files archived
    pub file_count: usize,
    /// Size of the archive in bytes
    pub archive_size_bytes: u64,
}

/// Contents of `MANIFEST.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    /// Format version (currently 1)
    pub format_version: u32,
    /// graphd version that created the archive
    pub graphd_version: String,
    /// Database name
    pub database: String,
    /// RFC 3339 creation timestamp
    pub created_at: String,
    /// Checksum algorithm used (always "xxh3")
    pub checksum_algorithm: String,
    /// Archive path → hex checksum
    pub checksums: BTreeMap<String, String>,
}

/// Hex-encoded xxh3 digest
pub fn xxh3_hex(data: &[u8]) -> String {
    use xxhash_rust::xxh3::xxh3_64;
    format!("{:016x}", xxh3_64(data))
}

/// Archive file name for `name` exported at `now`
pub(crate) fn archive_file_name(name: &str, now: chrono::DateTime<chrono::Local>) -> String {
    format!(
        "{}_{}.{}",
        name,
        now.format("%Y-%m-%d_%H-%M-%S"),
        EXPORT_EXTENSION
    )
}

/// Archive the database directory `source` into `export_dir`.
pub(crate) fn export_database(
    name: &str,
    source: &Path,
    export_dir: &Path,
    compression_level: i32,
) -> CacheResult<ExportInfo> {
    fs::create_dir_all(export_dir)?;

    let now = chrono::Local::now();
    let mut path = export_dir.join(archive_file_name(name, now));
    let mut suffix = 1;
    while path.exists() {
        // Two exports within the same second
        let stem = archive_file_name(name, now);
        let stem = stem.trim_end_matches(&format!(".{}", EXPORT_EXTENSION));
        path = export_dir.join(format!("{}-{}.{}", stem, suffix, EXPORT_EXTENSION));
        suffix += 1;
    }
    let temp_path = path.with_extension("tmp");

    match write_archive(name, source, &temp_path, compression_level, now) {
        Ok(file_count) => {
            fs::rename(&temp_path, &path)?;
            let archive_size_bytes = fs::metadata(&path)?.len();
            Ok(ExportInfo {
                name: name.to_string(),
                path,
                file_count,
                archive_size_bytes,
            })
        }
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            Err(e)
        }
    }
}

fn write_archive(
    name: &str,
    source: &Path,
    path: &Path,
    compression_level: i32,
    now: chrono::DateTime<chrono::Local>,
) -> CacheResult<usize> {
    let mut files = Vec::new();
    collect_files(source, source, &mut files)?;

    let mut contents = Vec::with_capacity(files.len());
    let mut checksums = BTreeMap::new();
    for relative in files {
        let data = fs::read(source.join(&relative))?;
        let entry = format!("{}/{}", name, relative);
        checksums.insert(entry.clone(), xxh3_hex(&data));
        contents.push((entry, data));
    }

    let manifest = ExportManifest {
        format_version: EXPORT_FORMAT_VERSION,
        graphd_version: env!("CARGO_PKG_VERSION").to_string(),
        database: name.to_string(),
        created_at: now.to_rfc3339(),
        checksum_algorithm: "xxh3".to_string(),
        checksums,
    };
    let manifest_json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| CacheError::archive(format!("manifest: {}", e)))?;

    let file = File::create(path)?;
    let zstd_writer = zstd::Encoder::new(BufWriter::new(file), compression_level)
        .map_err(|e| CacheError::archive(format!("zstd encoder: {}", e)))?;
    let mut tar_builder = Builder::new(zstd_writer);

    add_file(&mut tar_builder, MANIFEST_FILE_NAME, &manifest_json)?;
    for (entry, data) in &contents {
        add_file(&mut tar_builder, entry, data)?;
    }

    let zstd_writer = tar_builder
        .into_inner()
        .map_err(|e| CacheError::archive(format!("tar finish: {}", e)))?;
    let mut buf_writer = zstd_writer
        .finish()
        .map_err(|e| CacheError::archive(format!("zstd finish: {}", e)))?;
    buf_writer.flush()?;

    Ok(contents.len())
}

fn add_file<W: Write>(builder: &mut Builder<W>, path: &str, data: &[u8]) -> CacheResult<()> {
    let mut header = Header::new_gnu();
    header
        .set_path(path)
        .map_err(|e| CacheError::archive(format!("set path '{}': {}", path, e)))?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder
        .append(&header, data)
        .map_err(|e| CacheError::archive(format!("append '{}': {}", path, e)))
}

/// Relative paths of every file under `dir`, sorted, lock file excluded
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> CacheResult<()> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, std::io::Error>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(root, &path, out)?;
            continue;
        }
        if dir == root && entry.file_name() == LOCK_FILE_NAME {
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .map_err(|e| CacheError::archive(e.to_string()))?;
        out.push(relative.to_string_lossy().replace('\\', "/"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_archive(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let file = File::open(path).unwrap();
        let decoder = zstd::Decoder::new(file).unwrap();
        let mut archive = tar::Archive::new(decoder);
        let mut out = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            out.insert(name, data);
        }
        out
    }

    #[test]
    fn test_archive_file_name_format() {
        use chrono::TimeZone;
        let at = chrono::Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(archive_file_name("social", at), "social_2024-03-09_07-05-01.tar.zst");
    }

    #[test]
    fn test_export_contents_and_manifest() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("social");
        fs::create_dir_all(source.join("nested")).unwrap();
        fs::write(source.join("graph.snapshot"), b"snapshot bytes").unwrap();
        fs::write(source.join("nested").join("extra"), b"more").unwrap();
        fs::write(source.join(LOCK_FILE_NAME), b"").unwrap();

        let export_dir = temp.path().join("exports");
        let info = export_database("social", &source, &export_dir, 3).unwrap();
        assert_eq!(info.file_count, 2);
        assert!(info.path.starts_with(&export_dir));
        assert!(info.archive_size_bytes > 0);

        let entries = read_archive(&info.path);
        assert!(entries.contains_key("social/graph.snapshot"));
        assert!(entries.contains_key("social/nested/extra"));
        assert!(!entries.keys().any(|k| k.ends_with(LOCK_FILE_NAME)));

        let manifest: ExportManifest =
            serde_json::from_slice(&entries[MANIFEST_FILE_NAME]).unwrap();
        assert_eq!(manifest.database, "social");
        assert_eq!(manifest.checksum_algorithm, "xxh3");
        assert_eq!(
            manifest.checksums["social/graph.snapshot"],
            xxh3_hex(b"snapshot bytes")
        );

        // Source untouched
        assert!(source.join("graph.snapshot").exists());
        assert!(source.join(LOCK_FILE_NAME).exists());
    }

    #[test]
    fn test_same_second_exports_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("db");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("graph.snapshot"), b"x").unwrap();

        let export_dir = temp.path().join("exports");
        let first = export_database("db", &source, &export_dir, 1).unwrap();
        let second = export_database("db", &source, &export_dir, 1).unwrap();
        assert_ne!(first.path, second.path);
        assert!(first.path.exists() && second.path.exists());
    }

    #[test]
    fn test_missing_source_fails_cleanly() {
        let temp = TempDir::new().unwrap();
        let export_dir = temp.path().join("exports");
        let err = export_database("ghost", &temp.path().join("ghost"), &export_dir, 3);
        assert!(matches!(err, Err(CacheError::Io(_))));
        assert_eq!(fs::read_dir(&export_dir).unwrap().count(), 0);
    }
}
