//! Kubernetes manifest rendering for the `generate_manifest` tool.
//!
//! Manifests are treated opaquely: each YAML document only has to carry
//! `apiVersion`, `kind` and `metadata.name`. Nothing here talks to a cluster.

use serde::Deserialize;
use serde_yaml::Value;

/// One rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestResource {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl std::fmt::Display for ManifestResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.api_version, self.name)?;
        if let Some(ns) = &self.namespace {
            write!(f, " (namespace {ns})")?;
        }
        Ok(())
    }
}

/// Normalized manifests plus the resources they declare.
#[derive(Debug, Clone)]
pub struct RenderedManifest {
    pub yaml: String,
    pub resources: Vec<ManifestResource>,
}

impl RenderedManifest {
    /// Human-readable listing of the rendered resources.
    pub fn summary(&self) -> String {
        let mut out = format!("Rendered {} resource(s):", self.resources.len());
        for resource in &self.resources {
            out.push_str("\n- ");
            out.push_str(&resource.to_string());
        }
        out
    }
}

/// Parse and normalize a multi-document YAML manifest.
///
/// Empty documents (for example a leading `---`) are skipped. Returns a
/// message naming the offending document on failure.
pub fn render(input: &str) -> Result<RenderedManifest, String> {
    let mut documents = Vec::new();
    let mut resources = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(input).enumerate() {
        let position = index + 1;
        let value = Value::deserialize(document)
            .map_err(|e| format!("document {position}: invalid YAML: {e}"))?;
        if value.is_null() {
            continue;
        }
        let resource = describe(&value).map_err(|e| format!("document {position}: {e}"))?;
        let yaml = serde_yaml::to_string(&value)
            .map_err(|e| format!("document {position}: {e}"))?;
        documents.push(yaml.trim_end().to_string());
        resources.push(resource);
    }

    if resources.is_empty() {
        return Err("manifest contains no documents".to_string());
    }

    Ok(RenderedManifest {
        yaml: documents.join("\n---\n"),
        resources,
    })
}

fn describe(value: &Value) -> Result<ManifestResource, String> {
    if !value.is_mapping() {
        return Err("expected a mapping at the top level".to_string());
    }
    let field = |key: &str| -> Result<String, String> {
        value
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("missing '{key}'"))
    };
    let api_version = field("apiVersion")?;
    let kind = field("kind")?;
    let metadata = value.get("metadata");
    let name = metadata
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| "missing 'metadata.name'".to_string())?
        .to_string();
    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ManifestResource {
        api_version,
        kind,
        name,
        namespace,
    })
}
