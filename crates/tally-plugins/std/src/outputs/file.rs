use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tally_framework::prelude::*;
use tracing::{debug, warn};

/// Writes serialized metrics to files or stdout.
#[register_plugin(outputs, "file")]
#[derive(Configurable)]
pub struct File {
    /// Destinations; `stdout` writes to standard output.
    pub files: Vec<String>,
    /// Rotate a file once it would grow past this size; zero disables.
    pub rotation_max_size: Size,
    /// Rotated files to keep; -1 keeps all of them.
    pub rotation_max_archives: i64,
    /// Serialize each write as one batch instead of metric by metric.
    pub use_batch_format: bool,

    serializer: Option<Box<dyn Serializer>>,
    sinks: Vec<Sink>,
}

impl Default for File {
    fn default() -> Self {
        Self {
            files: vec!["stdout".to_string()],
            rotation_max_size: Size::ZERO,
            rotation_max_archives: 5,
            use_batch_format: false,
            serializer: None,
            sinks: Vec::new(),
        }
    }
}

enum Sink {
    Stdout(io::Stdout),
    File(RotatingFile),
}

impl Sink {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Sink::Stdout(out) => out.write_all(buf),
            Sink::File(file) => file.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Stdout(out) => out.flush(),
            Sink::File(file) => file.file.flush(),
        }
    }
}

struct RotatingFile {
    path: PathBuf,
    file: fs::File,
    written: u64,
    max_size: u64,
    max_archives: i64,
}

impl RotatingFile {
    fn open(path: PathBuf, max_size: u64, max_archives: i64) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            written,
            max_size,
            max_archives,
        })
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let len = buf.len() as u64;
        if self.max_size > 0 && self.written > 0 && self.written + len > self.max_size {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.written += len;
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let mut stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let mut archive = self.archive_path(stamp);
        while archive.exists() {
            stamp += 1;
            archive = self.archive_path(stamp);
        }
        fs::rename(&self.path, &archive)?;
        debug!(path = %self.path.display(), archive = %archive.display(), "Rotated output file");

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        self.prune();
        Ok(())
    }

    fn archive_path(&self, stamp: u128) -> PathBuf {
        PathBuf::from(format!("{}.{stamp:020}", self.path.display()))
    }

    fn prune(&self) {
        let Ok(keep) = usize::try_from(self.max_archives) else {
            return;
        };
        let pattern = format!(
            "{}.{}",
            glob::Pattern::escape(&self.path.display().to_string()),
            "[0-9]".repeat(20)
        );
        let Ok(matches) = glob::glob(&pattern) else {
            return;
        };
        let mut archives: Vec<PathBuf> = matches.flatten().collect();
        archives.sort();
        let excess = archives.len().saturating_sub(keep);
        for old in archives.drain(..excess) {
            if let Err(err) = fs::remove_file(&old) {
                warn!(path = %old.display(), error = %err, "Failed to remove old archive");
            }
        }
    }
}

#[async_trait]
impl Output for File {
    fn init(&mut self) -> PluginResult<()> {
        if self.files.is_empty() {
            return Err(PluginError::config("files must not be empty"));
        }
        Ok(())
    }

    async fn connect(&mut self) -> PluginResult<()> {
        let max_size = self.rotation_max_size.as_bytes();
        let mut sinks = Vec::with_capacity(self.files.len());
        for name in &self.files {
            let sink = if name == "stdout" {
                Sink::Stdout(io::stdout())
            } else {
                Sink::File(RotatingFile::open(
                    PathBuf::from(name),
                    max_size,
                    self.rotation_max_archives,
                )?)
            };
            sinks.push(sink);
        }
        self.sinks = sinks;
        Ok(())
    }

    async fn write(&mut self, metrics: &[Metric]) -> PluginResult<()> {
        let Some(serializer) = self.serializer.as_ref() else {
            return Err(PluginError::other("no serializer configured"));
        };
        let buf = if self.use_batch_format {
            serializer.serialize_batch(metrics)?
        } else {
            let mut buf = Vec::new();
            for metric in metrics {
                buf.extend(serializer.serialize(metric)?);
            }
            buf
        };
        for sink in &mut self.sinks {
            sink.write_all(&buf)?;
        }
        Ok(())
    }

    async fn close(&mut self) -> PluginResult<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        self.sinks.clear();
        Ok(())
    }

    fn as_serializer_output(&mut self) -> Option<&mut dyn SerializerOutput> {
        Some(self)
    }
}

impl SerializerOutput for File {
    fn set_serializer(&mut self, serializer: Box<dyn Serializer>) {
        self.serializer = Some(serializer);
    }
}

#[cfg(test)]
mod tests {
    use tally_framework::format::{SerializerConfig, new_serializer};
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn metric(value: i64) -> Metric {
        Metric::new(
            "mem",
            BTreeMap::new(),
            BTreeMap::from([("used".to_string(), FieldValue::Integer(value))]),
            UNIX_EPOCH,
        )
    }

    fn output(path: &std::path::Path) -> File {
        let mut output = File {
            files: vec![path.display().to_string()],
            ..File::default()
        };
        let serializer = new_serializer(&SerializerConfig::default());
        output.set_serializer(assert_ok!(serializer));
        output
    }

    #[tokio::test]
    async fn appends_serialized_metrics() {
        let dir = assert_ok!(tempfile::tempdir());
        let path = dir.path().join("metrics.out");
        let mut output = output(&path);
        assert_ok!(output.init());
        assert_ok!(output.connect().await);
        assert_ok!(output.write(&[metric(1), metric(2)]).await);
        assert_ok!(output.close().await);

        let text = assert_ok!(fs::read_to_string(&path));
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("mem used=1i"));
    }

    #[tokio::test]
    async fn rotates_and_prunes_archives() {
        let dir = assert_ok!(tempfile::tempdir());
        let path = dir.path().join("metrics.out");
        let mut output = output(&path);
        output.rotation_max_size = Size::from_bytes(16);
        output.rotation_max_archives = 2;
        assert_ok!(output.connect().await);
        for value in 0..5 {
            assert_ok!(output.write(&[metric(value)]).await);
        }
        assert_ok!(output.close().await);

        let archives = assert_ok!(fs::read_dir(dir.path()))
            .flatten()
            .filter(|entry| entry.path() != path)
            .count();
        assert_eq!(archives, 2);
        let current = assert_ok!(fs::read_to_string(&path));
        assert!(current.starts_with("mem used=4i"));
    }

    #[tokio::test]
    async fn write_needs_a_serializer() {
        let mut output = File::default();
        assert_ok!(output.connect().await);
        assert_err!(output.write(&[metric(1)]).await);
    }
}
