//! Parameter snapshots on disk.
//!
//! A snapshot maps every parameter name to its tensor. It is sorted by name,
//! so identical parameters always serialize to identical bytes.

use crate::tensor::Tensor;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Every parameter tensor of a model, keyed by parameter name.
pub type Snapshot = BTreeMap<String, Tensor<f32>>;

/// Failures while reading, writing or applying a checkpoint.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint file exists at the given path.
    #[error("no checkpoint found at {0}")]
    NotFound(PathBuf),
    /// The file could not be read or written.
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The bytes are not a valid snapshot.
    #[error("checkpoint encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    /// A model parameter has no entry in the snapshot.
    #[error("checkpoint is missing parameter '{0}'")]
    MissingParameter(String),
    /// The snapshot holds a tensor the model does not have.
    #[error("checkpoint holds unknown parameter '{0}'")]
    UnexpectedParameter(String),
    /// A stored tensor has a different shape than the model parameter.
    #[error("parameter '{name}' is stored with shape {got:?}, the model expects {expected:?}")]
    ShapeMismatch {
        /// Parameter name.
        name: String,
        /// Shape in the model.
        expected: Vec<usize>,
        /// Shape in the snapshot.
        got: Vec<usize>,
    },
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Writes `snapshot` to `path`, replacing any previous file.
///
/// The bytes go to `<path>.tmp` first and are renamed into place, so a
/// crash mid-write leaves the last complete checkpoint untouched.
pub fn save(snapshot: &Snapshot, path: &Path) -> Result<(), CheckpointError> {
    write_atomically(path, |writer| Ok(bincode::serialize_into(writer, snapshot)?))
}

/// Runs `write` against `<path>.tmp` and renames the result over `path`.
/// The temporary file is removed if any step fails.
fn write_atomically<F>(path: &Path, write: F) -> Result<(), CheckpointError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), CheckpointError>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    let result = File::create(&tmp)
        .map_err(CheckpointError::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            write(&mut writer)?;
            writer.flush()?;
            Ok(())
        })
        .and_then(|()| Ok(fs::rename(&tmp, path)?));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Reads the snapshot at `path`.
pub fn load(path: &Path) -> Result<Snapshot, CheckpointError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CheckpointError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(bincode::deserialize_from(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorOps;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tiny-gpt-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_save_load() {
        let dir = scratch_dir("checkpoint");
        let path = dir.join("models").join("model");
        let mut snapshot = Snapshot::new();
        snapshot.insert("w".into(), Tensor::raw(&[2, 1], vec![1.5, -2.0]).unwrap());
        snapshot.insert("b".into(), Tensor::vector(&[0.25]));
        save(&snapshot, &path).unwrap();
        assert!(!tmp_path(&path).exists());

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded["w"].shape(), &[2, 1]);

        snapshot.remove("b");
        save(&snapshot, &path).unwrap();
        assert_eq!(load(&path).unwrap().len(), 1);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_failed_write_leaves_no_temp_file() {
        let dir = scratch_dir("failed-write");
        let path = dir.join("model");
        let mut snapshot = Snapshot::new();
        snapshot.insert("w".into(), Tensor::vector(&[1.0]));
        save(&snapshot, &path).unwrap();

        let result = write_atomically(&path, |writer| {
            writer.write_all(b"partial")?;
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        });
        assert!(matches!(result, Err(CheckpointError::Io(_))));
        assert!(!tmp_path(&path).exists());
        assert_eq!(load(&path).unwrap(), snapshot);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_checkpoint() {
        let dir = scratch_dir("missing");
        assert!(matches!(
            load(&dir.join("model")),
            Err(CheckpointError::NotFound(_))
        ));
    }
}
