//! Contract manifest schema (spec §6, §4.8). Mirrors `vm_py.runtime.loader`'s
//! duck-typed manifest handling with a concrete, serde-derived shape:
//! `name`, `version`, one of `source`/`sources`/`code`, optional `abi` and
//! `exports`, and the `resources` block the resource guard is built from.

use crate::runtime::resource_guard::ResourceLimits;
use animica_vm_core::VmError;
use serde::Deserialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    Single { source: String },
    Multiple { sources: Vec<String> },
    Inline { code: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceLimitsSpec {
    #[serde(default)]
    pub max_blob_bytes: u64,
    #[serde(default)]
    pub max_ai_units: u64,
    #[serde(default)]
    pub max_quantum_units: u64,
    #[serde(default)]
    pub max_zk_proofs: u64,
    #[serde(default)]
    pub max_random_bytes: u64,
    #[serde(default)]
    pub max_treasury_transfers: u64,
}

impl From<ResourceLimitsSpec> for ResourceLimits {
    fn from(s: ResourceLimitsSpec) -> Self {
        ResourceLimits {
            max_blob_bytes: s.max_blob_bytes,
            max_ai_units: s.max_ai_units,
            max_quantum_units: s.max_quantum_units,
            max_zk_proofs: s.max_zk_proofs,
            max_random_bytes: s.max_random_bytes,
            max_treasury_transfers: s.max_treasury_transfers,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourcesSpec {
    #[serde(default)]
    pub caps: BTreeSet<String>,
    #[serde(default)]
    pub limits: ResourceLimitsSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(flatten)]
    pub source: SourceSpec,
    #[serde(default)]
    pub exports: Option<Vec<String>>,
    #[serde(default)]
    pub abi: Option<serde_json::Value>,
    #[serde(default)]
    pub resources: Option<ResourcesSpec>,
}

impl Manifest {
    pub fn from_json(text: &str) -> Result<Self, VmError> {
        serde_json::from_str(text).map_err(|e| VmError::new("validation.syntax", format!("invalid manifest JSON: {e}")))
    }

    /// Concatenates declared source files (already read by the caller) in
    /// order, with a file-marker comment banner between entries when more
    /// than one is present — mirrors `loader.py`'s `_read_sources`.
    pub fn assemble_source(&self, file_contents: &[(String, String)]) -> Result<String, VmError> {
        match &self.source {
            SourceSpec::Inline { code } => Ok(code.clone()),
            SourceSpec::Single { .. } => {
                let (_, content) = file_contents.first().ok_or_else(|| VmError::new("validation.syntax", "manifest.source file was not supplied"))?;
                Ok(content.clone())
            }
            SourceSpec::Multiple { sources } => {
                if file_contents.len() != sources.len() {
                    return Err(VmError::new("validation.syntax", "manifest.sources file count mismatch"));
                }
                let mut out = String::new();
                for (i, (path, content)) in file_contents.iter().enumerate() {
                    out.push_str(&format!("# ---- file[{}]: {path} ----\n", i + 1));
                    out.push_str(content);
                    out.push('\n');
                }
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inline_code_manifest() {
        let m = Manifest::from_json(r#"{"name":"counter","code":"def inc():\n    return 1\n"}"#).unwrap();
        assert_eq!(m.name, "counter");
        let src = m.assemble_source(&[]).unwrap();
        assert!(src.contains("def inc"));
    }

    #[test]
    fn parses_resources_block() {
        let m = Manifest::from_json(
            r#"{"name":"c","source":"a.py","resources":{"caps":["blob.pin"],"limits":{"max_blob_bytes":1024}}}"#,
        )
        .unwrap();
        let resources = m.resources.unwrap();
        assert!(resources.caps.contains("blob.pin"));
        assert_eq!(resources.limits.max_blob_bytes, 1024);
    }

    #[test]
    fn multiple_sources_require_matching_file_count() {
        let m = Manifest::from_json(r#"{"name":"c","sources":["a.py","b.py"]}"#).unwrap();
        assert!(m.assemble_source(&[("a.py".to_string(), "x".to_string())]).is_err());
    }
}
