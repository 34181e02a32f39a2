use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::models::Manufacturer;

use super::codec;

/// Load every record stored at `path`.
///
/// A missing file is created empty so the first run of a fresh data file
/// behaves like opening an empty one. Zero-length files short-circuit to an
/// empty result as well.
pub fn load(path: &Path) -> Result<Vec<Manufacturer>> {
    if !path.exists() {
        File::create(path).map_err(|e| StoreError::io("create", path, e))?;
        tracing::info!(path = %path.display(), "created empty data file");
        return Ok(Vec::new());
    }

    let file = File::open(path).map_err(|e| StoreError::io("open", path, e))?;
    let len = file
        .metadata()
        .map_err(|e| StoreError::io("inspect", path, e))?
        .len();
    if len == 0 {
        return Ok(Vec::new());
    }

    let records = codec::read_records(BufReader::new(file)).map_err(|source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), count = records.len(), "loaded manufacturers");
    Ok(records)
}

/// Persist `records` to `path`, replacing the previous contents atomically.
pub fn save(path: &Path, records: &[Manufacturer]) -> Result<()> {
    let temp_path = write_temp(path, records)?;
    commit(&temp_path, path)?;
    tracing::info!(path = %path.display(), count = records.len(), "saved manufacturers");
    Ok(())
}

/// Write the encoded records to the sibling temp file and return its path.
/// Until [`commit`] runs the original file is untouched.
pub fn write_temp(path: &Path, records: &[Manufacturer]) -> Result<PathBuf> {
    let mut bytes = Vec::new();
    codec::write_records(&mut bytes, records).map_err(|source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let temp_path = temp_path_for(path);
    write_file_synced(&temp_path, &bytes)?;
    Ok(temp_path)
}

/// Move a fully written temp file over its target.
pub fn commit(temp_path: &Path, target_path: &Path) -> Result<()> {
    fs::rename(temp_path, target_path).map_err(|source| {
        let _ = fs::remove_file(temp_path);
        StoreError::AtomicWriteFailed {
            temp_path: temp_path.to_path_buf(),
            target_path: target_path.to_path_buf(),
            source,
        }
    })
}

/// Atomically replace `path` with `bytes`. Used for exports so a failed
/// export never leaves a half-written report behind.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(path);
    write_file_synced(&temp_path, bytes)?;
    commit(&temp_path, path)
}

/// `data.csv` becomes `data.csv.tmp`, next to the original.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_file_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| StoreError::io("create", path, e))?;

    let mut writer = BufWriter::new(file);
    writer
        .write_all(bytes)
        .map_err(|e| StoreError::io("write", path, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| StoreError::io("flush", path, e.into_error()))?;
    file.sync_all().map_err(|e| StoreError::io("sync", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Vec<Manufacturer> {
        vec![
            Manufacturer {
                id: 1,
                name: "Acme".into(),
                country: "US".into(),
                founded_year: 2000,
                revenue: 100.0,
                ..Default::default()
            },
            Manufacturer {
                id: 2,
                name: "Beton AG".into(),
                country: "DE".into(),
                founded_year: 1950,
                revenue: 42.25,
                ..Default::default()
            },
        ]
    }

    #[test]
    fn load_creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fresh.csv");

        assert!(load(&path).unwrap().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn load_of_empty_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        File::create(&path).unwrap();

        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn save_then_load_returns_the_same_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");

        save(&path, &sample()).unwrap();
        assert_eq!(load(&path).unwrap(), sample());
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn crash_before_rename_leaves_original_intact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        save(&path, &sample()).unwrap();
        let before = fs::read(&path).unwrap();

        // Temp file written, process "dies" before the rename.
        let temp = write_temp(&path, &sample()[..1]).unwrap();
        assert!(temp.exists());
        assert_eq!(fs::read(&path).unwrap(), before);

        // A later successful save replaces both.
        save(&path, &sample()[..1]).unwrap();
        assert_eq!(load(&path).unwrap().len(), 1);
    }

    #[test]
    fn save_into_missing_directory_fails_without_touching_anything() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("data.csv");

        let err = save(&path, &sample()).unwrap_err();
        assert!(matches!(err, StoreError::Io { operation: "create", .. }));
        assert!(!path.exists());
    }

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(
            temp_path_for(Path::new("/data/manufacturers.csv")),
            PathBuf::from("/data/manufacturers.csv.tmp")
        );
    }
}
