//! Compiled contract artifacts (Hardhat layout).
//!
//! ```text
//! artifacts/
//!   build-info/<hash>.json
//!   contracts/Token.sol/Token.json
//!   contracts/Token.sol/Token.dbg.json
//! ```

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

const BUILD_INFO_DIR: &str = "build-info";
const DBG_SUFFIX: &str = ".dbg.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    contract_name: String,
    source_name: String,
    abi: JsonAbi,
    bytecode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: PathBuf,
}

/// Compiler input and version a contract was built with.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// e.g. `0.8.21+commit.d9974bed`.
    pub solc_long_version: String,
    /// The standard-JSON compiler input.
    pub input: Value,
}

/// A compiled contract: its interface and creation bytecode.
#[derive(Debug, Clone)]
pub struct CompiledContract {
    pub name: String,
    /// Source file the contract is declared in, e.g. `contracts/Token.sol`.
    pub source_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
    pub artifact_path: PathBuf,
}

impl CompiledContract {
    /// Fully qualified name, `contracts/Token.sol:Token`.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.name)
    }

    /// Build a contract from a standalone ABI file and a creation bytecode file,
    /// for code that was not compiled in this project.
    ///
    /// The ABI file holds either the bare ABI array or any JSON object with an
    /// `abi` field. The bytecode file holds hex text, `0x` prefix optional.
    pub fn from_abi_and_bytecode(
        name: &str,
        abi_path: &Path,
        bytecode_path: &Path,
    ) -> anyhow::Result<Self> {
        let abi = match read_json::<Value>(abi_path)? {
            Value::Object(mut object) => object
                .remove("abi")
                .with_context(|| format!("No `abi` field in {}", abi_path.display()))?,
            other => other,
        };
        let abi: JsonAbi = serde_json::from_value(abi)
            .with_context(|| format!("Invalid ABI in {}", abi_path.display()))?;

        let hex = std::fs::read_to_string(bytecode_path)
            .with_context(|| format!("Failed to read {}", bytecode_path.display()))?;
        let bytecode = Bytes::from_str(hex.trim())
            .with_context(|| format!("Invalid bytecode in {}", bytecode_path.display()))?;
        if bytecode.is_empty() {
            anyhow::bail!("No bytecode in {}", bytecode_path.display());
        }

        Ok(Self {
            name: name.to_string(),
            source_name: String::new(),
            abi,
            bytecode,
            artifact_path: abi_path.to_path_buf(),
        })
    }

    /// The ABI as a Solidity interface, e.g. `interface Token { function name() ... }`.
    pub fn human_readable_abi(&self) -> String {
        self.abi.to_sol(&self.name, None)
    }

    /// Load the build info referenced by the artifact's `.dbg.json` companion.
    pub fn build_info(&self) -> anyhow::Result<BuildInfo> {
        let dbg_path = self.artifact_path.with_file_name(format!("{}{}", self.name, DBG_SUFFIX));
        let dbg: DebugFile = read_json(&dbg_path)?;

        let parent = dbg_path
            .parent()
            .context("Artifact path must have a parent directory")?;
        let build_info_path = parent.join(&dbg.build_info);

        read_json(&build_info_path)
    }
}

/// Lookup of compiled contracts under an artifacts directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load a contract by name (`Token`) or fully qualified name
    /// (`contracts/Token.sol:Token`).
    ///
    /// A bare name must match exactly one artifact.
    pub fn load(&self, contract: &str) -> anyhow::Result<CompiledContract> {
        let path = match contract.rsplit_once(':') {
            Some((source, name)) => self.root.join(source).join(format!("{}.json", name)),
            None => self.find_unique(contract)?,
        };

        if !path.is_file() {
            anyhow::bail!(
                "No artifact for contract '{}' at {}. Did you compile the contracts?",
                contract,
                path.display()
            );
        }

        let artifact: HardhatArtifact = read_json(&path)?;

        if artifact.bytecode.contains("__$") {
            anyhow::bail!(
                "Contract '{}' has unlinked library references; link them before deploying",
                artifact.contract_name
            );
        }
        let bytecode = Bytes::from_str(&artifact.bytecode)
            .with_context(|| format!("Invalid bytecode in {}", path.display()))?;
        if bytecode.is_empty() {
            anyhow::bail!(
                "Contract '{}' has no creation bytecode (abstract contract or interface?)",
                artifact.contract_name
            );
        }

        tracing::debug!(
            contract = %artifact.contract_name,
            source = %artifact.source_name,
            path = %path.display(),
            "Artifact loaded"
        );

        Ok(CompiledContract {
            name: artifact.contract_name,
            source_name: artifact.source_name,
            abi: artifact.abi,
            bytecode,
            artifact_path: path,
        })
    }

    fn find_unique(&self, name: &str) -> anyhow::Result<PathBuf> {
        let file_name = format!("{}.json", name);
        let mut matches = Vec::new();
        collect_artifacts(&self.root, &file_name, &mut matches)?;

        match matches.len() {
            0 => anyhow::bail!(
                "Contract '{}' not found under {}. Did you compile the contracts?",
                name,
                self.root.display()
            ),
            1 => Ok(matches.remove(0)),
            _ => {
                matches.sort();
                anyhow::bail!(
                    "Contract name '{}' is ambiguous, use a fully qualified name. Candidates: {}",
                    name,
                    matches
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        }
    }
}

fn collect_artifacts(dir: &Path, file_name: &str, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|n| n == BUILD_INFO_DIR) {
                continue;
            }
            collect_artifacts(&path, file_name, out)?;
        } else if path.file_name().is_some_and(|n| n == file_name) {
            out.push(path);
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
