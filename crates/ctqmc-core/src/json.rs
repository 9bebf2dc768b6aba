//! JSON file helpers shared by every artefact writer.
//!
//! Error codes are formed from a per-artefact prefix, e.g. `checkpoint-read`
//! or `manifest-parse`.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::QmcError;

/// Reads and decodes the JSON document at `path`.
pub fn read_json<T: DeserializeOwned>(path: &Path, prefix: &str) -> Result<T, QmcError> {
    let text =
        fs::read_to_string(path).map_err(|err| QmcError::io(&format!("{prefix}-read"), path, err))?;
    serde_json::from_str(&text).map_err(|err| QmcError::serde(&format!("{prefix}-parse"), path, err))
}

/// Writes `value` as pretty JSON, creating missing parent directories.
pub fn write_json<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    prefix: &str,
) -> Result<(), QmcError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| QmcError::io(&format!("{prefix}-mkdir"), parent, err))?;
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|err| QmcError::serde(&format!("{prefix}-serialize"), path, err))?;
    fs::write(path, json).map_err(|err| QmcError::io(&format!("{prefix}-write"), path, err))
}
