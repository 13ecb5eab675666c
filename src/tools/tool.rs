//! The closed set of tools the agent can call.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::arguments::ToolArguments;
use super::manifest;
use super::registry::ToolKind;
use crate::error::KubeAgentError;
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
use crate::types::{ToolErrorCategory, ToolOutcome};
use crate::util::truncate::bound_output;

/// kubectl verbs that change cluster state.
const MUTATING_VERBS: &[&str] = &[
    "apply", "create", "delete", "patch", "replace", "scale", "edit", "label", "annotate",
    "rollout", "set", "drain", "cordon", "uncordon", "taint", "expose", "run",
];

/// A resolved tool call with typed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubeTool {
    /// `kubectl <args>`, run through the shell so pipes work.
    Kubectl { args: String, stdin: Option<String> },
    /// `trivy image` vulnerability scan.
    Trivy {
        image: String,
        severity: Option<String>,
    },
    /// Inline Python script.
    Python { script: String },
    /// Manifest rendering without cluster access.
    GenerateManifest { manifest: String },
}

/// What a tool needs while it runs.
#[derive(Debug, Clone)]
pub struct ToolContext<'a> {
    pub executor: &'a CommandExecutor,
    pub cancel: &'a CancellationToken,
    /// Overrides the executor's default timeout for this call.
    pub timeout: Option<Duration>,
}

impl KubeTool {
    /// Build typed arguments for `kind` from already-validated JSON.
    pub fn from_arguments(
        kind: ToolKind,
        value: &serde_json::Value,
    ) -> Result<Self, KubeAgentError> {
        let args = ToolArguments::new(kind.name(), value);
        let tool = match kind {
            ToolKind::Kubectl => Self::Kubectl {
                args: args.get_str("args")?.trim().to_string(),
                stdin: args.get_str_opt("stdin").map(str::to_string),
            },
            ToolKind::Trivy => {
                let image = args.get_str("image")?.trim();
                if image.starts_with('-') || image.chars().any(char::is_whitespace) {
                    return Err(args.invalid(format!("'{image}' is not an image reference")));
                }
                Self::Trivy {
                    image: image.to_string(),
                    severity: args.get_str_opt("severity").map(|s| s.trim().to_uppercase()),
                }
            }
            ToolKind::Python => Self::Python {
                script: args.get_str("script")?.to_string(),
            },
            ToolKind::GenerateManifest => Self::GenerateManifest {
                manifest: args.get_str("manifest")?.to_string(),
            },
        };
        Ok(tool)
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::Kubectl { .. } => ToolKind::Kubectl,
            Self::Trivy { .. } => ToolKind::Trivy,
            Self::Python { .. } => ToolKind::Python,
            Self::GenerateManifest { .. } => ToolKind::GenerateManifest,
        }
    }

    /// Whether this particular call changes cluster state.
    pub fn is_mutating(&self) -> bool {
        match self {
            Self::Kubectl { args, .. } => kubectl_verbs(args)
                .iter()
                .any(|verb| MUTATING_VERBS.contains(verb)),
            Self::Python { .. } => true,
            Self::Trivy { .. } | Self::GenerateManifest { .. } => false,
        }
    }

    /// The process this tool launches, if any.
    pub fn command(&self) -> Option<CommandSpec> {
        match self {
            Self::Kubectl { args, stdin } => {
                let script = if args.starts_with("kubectl ") || args == "kubectl" {
                    args.clone()
                } else {
                    format!("kubectl {args}")
                };
                let spec = CommandSpec::shell(script);
                Some(match stdin {
                    Some(input) => spec.stdin(input.clone()),
                    None => spec,
                })
            }
            Self::Trivy { image, severity } => {
                let mut spec = CommandSpec::new("trivy").args(["image", "--quiet"]);
                if let Some(severity) = severity {
                    spec = spec.arg("--severity").arg(severity.clone());
                }
                Some(spec.arg(image.clone()))
            }
            Self::Python { script } => {
                Some(CommandSpec::new("python3").arg("-c").arg(script.clone()))
            }
            Self::GenerateManifest { .. } => None,
        }
    }

    /// Run the tool. Never fails; errors become failure outcomes.
    pub async fn execute(&self, ctx: &ToolContext<'_>) -> ToolOutcome {
        let name = self.kind().name();

        if let Self::GenerateManifest { manifest } = self {
            return match manifest::render(manifest) {
                Ok(rendered) => {
                    let limit = ctx.executor.config().max_output_bytes;
                    let (yaml, truncated) = bound_output(&rendered.yaml, limit);
                    ToolOutcome::Success {
                        stdout: format!("{yaml}\n\n{}", rendered.summary()),
                        stderr: String::new(),
                        exit_code: None,
                        truncated,
                    }
                }
                Err(message) => ToolOutcome::failure(
                    ToolErrorCategory::InvalidArguments,
                    format!("Invalid arguments for tool '{name}': {message}"),
                ),
            };
        }

        let Some(mut spec) = self.command() else {
            return ToolOutcome::failure(ToolErrorCategory::Execution, "tool has no command");
        };
        if let Some(timeout) = ctx.timeout {
            spec = spec.timeout(timeout);
        }
        debug!(tool = name, program = %spec.program, args = ?spec.args, "launching tool");

        match ctx.executor.run(name, spec, ctx.cancel).await {
            Ok(output) => outcome_from_output(name, output),
            Err(err) => ToolOutcome::from_error(&err),
        }
    }
}

/// Global flags whose value is a separate word unless written as `--flag=value`.
const VALUE_FLAGS: &[&str] = &[
    "-n", "--namespace", "--context", "--kubeconfig", "--cluster", "--user", "-s", "--server",
    "--as", "--as-group", "--token", "--request-timeout", "--cache-dir",
];

/// Verbs of every kubectl invocation in a shell line.
///
/// The first segment is kubectl by construction; later segments split on
/// `|`, `;` and `&` only count when they call kubectl themselves.
fn kubectl_verbs(args: &str) -> Vec<&str> {
    args.split(['|', ';', '&'])
        .enumerate()
        .filter_map(|(index, segment)| {
            let mut words = segment.split_whitespace().peekable();
            let invokes_kubectl = words.peek() == Some(&"kubectl");
            if invokes_kubectl {
                words.next();
            } else if index > 0 {
                return None;
            }
            verb(words)
        })
        .collect()
}

fn verb<'a>(mut words: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    while let Some(word) = words.next() {
        if !word.starts_with('-') {
            return Some(word);
        }
        if VALUE_FLAGS.contains(&word) {
            words.next();
        }
    }
    None
}

fn outcome_from_output(name: &str, output: CommandOutput) -> ToolOutcome {
    if output.success() {
        return ToolOutcome::Success {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            truncated: output.truncated,
        };
    }
    let message = match output.exit_code {
        Some(code) => KubeAgentError::tool_execution(name, format!("exited with status {code}")),
        None => KubeAgentError::tool_execution(name, "terminated by signal"),
    };
    ToolOutcome::Failure {
        category: ToolErrorCategory::Execution,
        message: message.to_string(),
        stdout: output.stdout,
        stderr: output.stderr,
        truncated: output.truncated,
    }
}
