//! JSON batch files for the runner binary.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::RawTransaction;
use crate::portfolio::PortfolioResult;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read a JSON array of raw transactions.
pub fn read_batch(path: impl AsRef<Path>) -> Result<Vec<RawTransaction>, BatchError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Write the result as pretty JSON to `path`, or to stdout when `None`.
pub fn write_result(path: Option<&Path>, result: &PortfolioResult) -> Result<(), BatchError> {
    let json = serde_json::to_string_pretty(result)?;
    match path {
        Some(path) => fs::write(path, json).map_err(|source| BatchError::Io {
            path: path.to_path_buf(),
            source,
        }),
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{}", json).map_err(|source| BatchError::Io {
                path: PathBuf::from("<stdout>"),
                source,
            })
        }
    }
}
