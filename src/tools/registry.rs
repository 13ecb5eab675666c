//! Tool registry: names, schemas and resolution of model tool calls.

use std::time::Duration;

use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use super::tool::KubeTool;
use super::types::ToolParameters;
use super::validation::validate_arguments;
use crate::config::{AgentConfig, DEFAULT_SCAN_TIMEOUT};
use crate::error::{KubeAgentError, Result};
use crate::provider::ToolDefinition;
use crate::types::AgentToolCall;

/// Tool names as the model sees them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ToolKind {
    Kubectl,
    Trivy,
    Python,
    GenerateManifest,
}

impl ToolKind {
    pub fn name(self) -> &'static str {
        self.into()
    }

    fn description(self) -> &'static str {
        match self {
            Self::Kubectl => {
                "Run a kubectl command against the current cluster. `args` is everything \
                 after `kubectl`, e.g. `get pods -n default`. Shell pipes are allowed. \
                 Use `stdin` to pass a manifest to `apply -f -`."
            }
            Self::Trivy => {
                "Scan a container image for vulnerabilities with trivy. Optionally filter \
                 by a comma-separated `severity` list such as `HIGH,CRITICAL`."
            }
            Self::Python => "Run a Python 3 script and return its output.",
            Self::GenerateManifest => {
                "Validate and normalize Kubernetes YAML manifests. Every document needs \
                 apiVersion, kind and metadata.name. Does not touch the cluster."
            }
        }
    }

    fn parameters(self) -> ToolParameters {
        let params = ToolParameters::object();
        let params = match self {
            Self::Kubectl => params
                .string("args", "Arguments passed to kubectl", true)
                .string("stdin", "Text piped to kubectl's standard input", false),
            Self::Trivy => params
                .string("image", "Container image reference, e.g. nginx:1.25", true)
                .string("severity", "Severities to report, e.g. HIGH,CRITICAL", false),
            Self::Python => params.string("script", "Python 3 source code", true),
            Self::GenerateManifest => {
                params.string("manifest", "One or more YAML documents", true)
            }
        };
        params.build()
    }

    /// Whether the tool can change cluster state at all.
    fn mutating(self) -> bool {
        matches!(self, Self::Kubectl | Self::Python)
    }
}

/// Immutable description of a registered tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub kind: ToolKind,
    pub description: String,
    pub parameters: ToolParameters,
    pub mutating: bool,
    /// Replaces the executor's default timeout.
    pub timeout: Option<Duration>,
}

impl ToolSpec {
    fn for_kind(kind: ToolKind, scan_timeout: Duration) -> Self {
        Self {
            kind,
            description: kind.description().to_string(),
            parameters: kind.parameters(),
            mutating: kind.mutating(),
            timeout: (kind == ToolKind::Trivy).then_some(scan_timeout),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description.clone(),
            parameters: self.parameters.schema.clone(),
        }
    }
}

/// The set of tools available to a run.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin(DEFAULT_SCAN_TIMEOUT)
    }
}

impl ToolRegistry {
    /// Every tool, with `scan_timeout` applied to trivy.
    pub fn builtin(scan_timeout: Duration) -> Self {
        Self::from_kinds(ToolKind::iter(), scan_timeout)
    }

    /// Only the given tools, in order. Duplicates are ignored.
    pub fn from_kinds(kinds: impl IntoIterator<Item = ToolKind>, scan_timeout: Duration) -> Self {
        let mut specs: Vec<ToolSpec> = Vec::new();
        for kind in kinds {
            if !specs.iter().any(|s| s.kind == kind) {
                specs.push(ToolSpec::for_kind(kind, scan_timeout));
            }
        }
        Self { specs }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::builtin(config.scan_timeout)
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.iter().find(|s| s.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.specs.iter().map(ToolSpec::name).collect()
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.specs.iter().map(ToolSpec::definition).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Turn a model tool call into a typed tool.
    ///
    /// Fails with `UnknownTool` for names outside this registry and
    /// `InvalidArguments` when the arguments do not match the schema.
    pub fn resolve(&self, call: &AgentToolCall) -> Result<(KubeTool, &ToolSpec)> {
        let spec = self
            .get(&call.name)
            .ok_or_else(|| KubeAgentError::UnknownTool {
                name: call.name.clone(),
            })?;
        validate_arguments(&call.arguments, &spec.parameters.schema).map_err(|message| {
            KubeAgentError::InvalidArguments {
                tool_name: call.name.clone(),
                message,
            }
        })?;
        let tool = KubeTool::from_arguments(spec.kind, &call.arguments)?;
        Ok((tool, spec))
    }
}
