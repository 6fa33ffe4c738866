//! Reading log files into named sources

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use logsift_logs::SourceText;

/// Read `path` as a source named after the path as given
///
/// Invalid UTF-8 is replaced rather than rejected; log dumps often carry
/// binary garbage from ring buffers.
pub fn read_source(path: &Path) -> Result<SourceText> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Log file is not valid UTF-8, replacing bad bytes");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };
    Ok(SourceText::new(path.display().to_string(), text))
}

/// Read every path, failing on the first unreadable one
pub fn read_sources<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SourceText>> {
    paths.iter().map(|p| read_source(p.as_ref())).collect()
}
