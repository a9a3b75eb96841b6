//! Run artifacts: output naming, the timestamped run log, the exception log,
//! and atomic writes for the RDF documents.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{self, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info};
use uuid::Uuid;

use crate::delta::ascii_charrefs;
use crate::normalize::ValidationIssue;

/// The four files a run produces, named from the input file's stem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    pub additions: PathBuf,
    pub retractions: PathBuf,
    pub log: PathBuf,
    pub exceptions: PathBuf,
}

impl OutputPaths {
    pub fn for_input(input: &Path) -> Self {
        let stem = input.with_extension("");
        let stem = stem.to_string_lossy();
        Self {
            additions: PathBuf::from(format!("{stem}_add.rdf")),
            retractions: PathBuf::from(format!("{stem}_sub.rdf")),
            log: PathBuf::from(format!("{stem}_log.txt")),
            exceptions: PathBuf::from(format!("{stem}_exc.txt")),
        }
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

type LogSink = Box<dyn AsyncWrite + Send + Unpin>;

async fn open_log(path: &Path) -> anyhow::Result<LogSink> {
    let file = File::create(path)
        .await
        .with_context(|| format!("creating {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

/// Timestamped progress log, mirrored into `tracing`. Every line is flushed.
pub struct RunLog {
    out: LogSink,
}

impl RunLog {
    pub async fn create(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            out: open_log(path).await?,
        })
    }

    /// A log that only reaches `tracing`.
    pub fn discard() -> Self {
        Self {
            out: Box::new(io::sink()),
        }
    }

    pub async fn line(&mut self, message: impl Display) -> io::Result<()> {
        let message = message.to_string();
        info!(target: "grant_ingest::run", "{message}");
        let line = format!("{} {}\n", timestamp(), ascii_charrefs(&message));
        self.out.write_all(line.as_bytes()).await?;
        self.out.flush().await
    }
}

/// One line per validation failure: pcn, field, offending value, reason.
/// Buffered until [`ExceptionLog::flush`].
pub struct ExceptionLog {
    out: LogSink,
    written: usize,
}

impl ExceptionLog {
    pub async fn create(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            out: open_log(path).await?,
            written: 0,
        })
    }

    pub fn discard() -> Self {
        Self {
            out: Box::new(io::sink()),
            written: 0,
        }
    }

    pub async fn record(&mut self, issue: &ValidationIssue) -> io::Result<()> {
        debug!(pcn = %issue.pcn, field = issue.field, value = %issue.value, reason = %issue.problem, "validation issue");
        let line = format!("{}\n", ascii_charrefs(&issue.to_string()));
        self.out.write_all(line.as_bytes()).await?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.out.flush().await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WrittenArtifact {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: usize,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Replace `path` with `bytes` via a temp file in the same directory and a rename.
pub async fn write_atomically(path: &Path, bytes: &[u8]) -> anyhow::Result<WrittenArtifact> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating output directory {}", dir.display()))?;

    let temp_path = dir.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }

    Ok(WrittenArtifact {
        path: path.to_path_buf(),
        sha256: sha256_hex(bytes),
        bytes: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Problem;
    use tempfile::tempdir;

    #[test]
    fn outputs_are_named_from_the_input_stem() {
        let paths = OutputPaths::for_input(Path::new("data/vivo_grants.txt"));
        assert_eq!(paths.additions, PathBuf::from("data/vivo_grants_add.rdf"));
        assert_eq!(paths.retractions, PathBuf::from("data/vivo_grants_sub.rdf"));
        assert_eq!(paths.log, PathBuf::from("data/vivo_grants_log.txt"));
        assert_eq!(paths.exceptions, PathBuf::from("data/vivo_grants_exc.txt"));

        let bare = OutputPaths::for_input(Path::new("grants"));
        assert_eq!(bare.additions, PathBuf::from("grants_add.rdf"));
    }

    #[test]
    fn hashing_is_stable() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn run_log_lines_are_timestamped_and_ascii() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("run_log.txt");
        let mut log = RunLog::create(&path).await.unwrap();
        log.line("Begin Processing").await.unwrap();
        log.line("title Café").await.unwrap();
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" Begin Processing"));
        assert!(lines[0].chars().next().unwrap().is_ascii_digit());
        assert!(lines[1].ends_with("title Caf&#233;"));
    }

    #[tokio::test]
    async fn exception_lines_carry_pcn_field_value_and_reason() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("run_exc.txt");
        let mut exc = ExceptionLog::create(&path).await.unwrap();
        exc.record(&ValidationIssue {
            pcn: "P001".into(),
            field: "Total Award Amount",
            value: "abc".into(),
            problem: Problem::InvalidNumber,
        })
        .await
        .unwrap();
        exc.flush().await.unwrap();
        assert_eq!(exc.written(), 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "P001 Total Award Amount abc invalid number\n");
    }

    #[tokio::test]
    async fn atomic_write_replaces_existing_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("out_add.rdf");
        std::fs::write(&path, "stale").unwrap();

        let written = write_atomically(&path, b"<rdf:RDF/>").await.unwrap();
        assert_eq!(written.bytes, 10);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<rdf:RDF/>");
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
