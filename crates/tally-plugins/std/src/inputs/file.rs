use std::path::Path;

use tally_framework::prelude::*;
use tracing::{debug, warn};

/// Parses whole files into metrics on every gather.
#[register_plugin(inputs, "file")]
#[derive(Default, Configurable)]
pub struct File {
    /// Paths or glob patterns to read.
    pub files: Vec<String>,
    /// Tag to carry the file's base name; empty for none.
    pub file_tag: String,

    parser: Option<Box<dyn Parser>>,
}

impl File {
    fn expand(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for pattern in &self.files {
            match glob::glob(pattern) {
                Ok(matches) => {
                    let before = paths.len();
                    paths.extend(matches.flatten().map(|path| path.display().to_string()));
                    if paths.len() == before {
                        debug!(pattern = %pattern, "No files matched");
                    }
                }
                Err(err) => warn!(pattern = %pattern, error = %err, "Invalid glob pattern"),
            }
        }
        paths
    }
}

#[async_trait]
impl Input for File {
    fn init(&mut self) -> PluginResult<()> {
        if self.files.is_empty() {
            return Err(PluginError::config("files must not be empty"));
        }
        Ok(())
    }

    async fn gather(&mut self, acc: &mut Accumulator) -> PluginResult<()> {
        let Some(parser) = self.parser.as_ref() else {
            return Err(PluginError::other("no parser configured"));
        };
        for path in self.expand() {
            let contents = tokio::fs::read(&path).await?;
            for mut metric in parser.parse(&contents)? {
                if !self.file_tag.is_empty() {
                    let base = Path::new(&path)
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    metric.tags_mut().insert(self.file_tag.clone(), base);
                }
                acc.add_metric(metric);
            }
        }
        Ok(())
    }

    fn as_parser_input(&mut self) -> Option<&mut dyn ParserInput> {
        Some(self)
    }
}

impl ParserInput for File {
    fn set_parser(&mut self, parser: Box<dyn Parser>) {
        self.parser = Some(parser);
    }
}

#[cfg(test)]
mod tests {
    use tally_framework::format::{ParserConfig, new_parser};
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[tokio::test]
    async fn reads_matching_files() {
        let dir = assert_ok!(tempfile::tempdir());
        assert_ok!(std::fs::write(
            dir.path().join("a.lp"),
            "disk,dev=sda used=10i 1700000000000000000\n"
        ));
        assert_ok!(std::fs::write(
            dir.path().join("b.lp"),
            "disk,dev=sdb used=20i 1700000000000000000\n"
        ));
        assert_ok!(std::fs::write(dir.path().join("skip.txt"), "not metrics"));

        let mut input = File {
            files: vec![dir.path().join("*.lp").display().to_string()],
            file_tag: "source".to_string(),
            ..File::default()
        };
        assert_ok!(input.init());
        let parser = assert_ok!(new_parser(&ParserConfig::for_plugin("file")));
        input.set_parser(parser);

        let mut acc = Accumulator::new();
        assert_ok!(input.gather(&mut acc).await);
        let metrics = acc.into_metrics();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].tags()["dev"], "sda");
        assert_eq!(metrics[0].tags()["source"], "a.lp");
        assert_eq!(metrics[1].tags()["source"], "b.lp");
    }

    #[tokio::test]
    async fn gather_without_parser_fails() {
        let mut input = File {
            files: vec!["/nonexistent/*.lp".to_string()],
            ..File::default()
        };
        let mut acc = Accumulator::new();
        assert_err!(input.gather(&mut acc).await);
    }

    #[test]
    fn files_are_required() {
        assert_err!(File::default().init());
    }
}
