use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::AnalysisResult;
use crate::result::ComparisonResult;

pub type PersistFuture<'a> = Pin<Box<dyn Future<Output = AnalysisResult<()>> + Send + 'a>>;

/// Destination of a finished comparison.
pub trait ResultSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn persist<'a>(&'a self, result: &'a ComparisonResult) -> PersistFuture<'a>;
}

/// Writes the artifact as JSON. The file is written next to its final
/// location and renamed into place, so readers never see a partial result.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".partial");
        self.path.with_file_name(name)
    }
}

impl ResultSink for JsonFileSink {
    fn name(&self) -> &'static str {
        "json-file"
    }

    fn persist<'a>(&'a self, result: &'a ComparisonResult) -> PersistFuture<'a> {
        Box::pin(async move {
            let encoded = result.to_json(true)?;
            if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await?;
            }
            let staging = self.staging_path();
            fs::write(&staging, encoded.as_bytes()).await?;
            if let Err(err) = fs::rename(&staging, &self.path).await {
                let _ = fs::remove_file(&staging).await;
                return Err(err.into());
            }
            tracing::info!(path = %self.path.display(), "comparison result written");
            Ok(())
        })
    }
}

/// Prints the artifact to standard output.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl ResultSink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    fn persist<'a>(&'a self, result: &'a ComparisonResult) -> PersistFuture<'a> {
        Box::pin(async move {
            let mut encoded = result.to_json(true)?;
            encoded.push('\n');
            let mut stdout = tokio::io::stdout();
            stdout.write_all(encoded.as_bytes()).await?;
            stdout.flush().await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_file_sits_next_to_target() {
        let sink = JsonFileSink::new("/tmp/results/compare.json");
        assert_eq!(
            sink.staging_path(),
            PathBuf::from("/tmp/results/compare.json.partial")
        );
    }
}
