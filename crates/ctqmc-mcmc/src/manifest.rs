use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ctqmc_core::errors::ErrorInfo;
use ctqmc_core::{read_json, write_json, QmcError, RunProvenance, SchemaVersion};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chain::AcceptanceSummary;
use crate::checkpoint::RestoreOutcome;
use crate::config::RunConfig;

/// Per-worker record of what ran and where its artefacts went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerManifest {
    /// Layout version of the worker artefacts.
    #[serde(default)]
    pub schema: SchemaVersion,
    /// Configuration used for the run.
    pub config: RunConfig,
    /// Seed, rank, configuration hash and timestamp.
    pub provenance: RunProvenance,
    /// How the chain obtained its initial configuration.
    pub restore: RestoreOutcome,
    /// Measurement series written by the worker.
    pub measurements_file: PathBuf,
    /// Checkpoint written at the end of the run.
    pub checkpoint_file: PathBuf,
    /// Acceptance statistics of the run.
    pub acceptance: AcceptanceSummary,
}

/// SHA-256 of the canonical JSON encoding of `config`, hex encoded.
pub fn config_hash(config: &RunConfig) -> Result<String, QmcError> {
    let json = serde_json::to_vec(config)
        .map_err(|err| QmcError::Serde(ErrorInfo::new("config-hash", err.to_string())))?;
    Ok(hex::encode(Sha256::digest(&json)))
}

/// Provenance block for worker `rank` of the run described by `config`.
pub fn provenance(config: &RunConfig, rank: u64) -> Result<RunProvenance, QmcError> {
    let mut tool_versions = BTreeMap::new();
    tool_versions.insert(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    Ok(RunProvenance {
        config_hash: config_hash(config)?,
        seed: config.numerics.seed,
        rank,
        created_at: chrono::Utc::now().to_rfc3339(),
        tool_versions,
    })
}

/// Per-worker manifest location.
pub fn manifest_path(root: &Path, rank: u64) -> PathBuf {
    root.join(format!("manifest_{rank}.json"))
}

impl WorkerManifest {
    /// Writes the manifest to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), QmcError> {
        write_json(path, self, "manifest")
    }

    /// Loads a manifest written by a compatible build.
    pub fn load(path: &Path) -> Result<Self, QmcError> {
        let manifest: Self = read_json(path, "manifest")?;
        if !SchemaVersion::CURRENT.reads(&manifest.schema) {
            return Err(QmcError::Serde(
                ErrorInfo::new("manifest-schema", "manifest written by an incompatible build")
                    .with_context("path", path.display().to_string())
                    .with_context("found", manifest.schema.to_string())
                    .with_context("supported", SchemaVersion::CURRENT.to_string()),
            ));
        }
        Ok(manifest)
    }
}
