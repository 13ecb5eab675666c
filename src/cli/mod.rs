//! CLI entry point for kube-agent.

pub mod apply;
pub mod render;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::agent_loop::prompts;
use crate::tools::ToolKind;

/// Kubernetes copilot powered by OpenAI
#[derive(Parser, Debug)]
#[command(name = "kube-agent", version, about = "Kubernetes copilot powered by OpenAI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub options: GlobalOptions,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Print every intermediate step (reasoning, tool calls, tool results) to stderr
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Model (or Azure deployment) to use [default: gpt-4]
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Maximum number of tool-calling steps before the run is aborted [default: 15]
    #[arg(long, global = true)]
    pub max_steps: Option<usize>,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Analyze potential issues for a given resource
    Analyze {
        /// Resource type, e.g. deployment
        resource: String,
        /// Resource name
        name: String,
        #[arg(default_value = "default")]
        namespace: String,
    },
    /// Audit security issues for a Pod
    Audit {
        pod: String,
        #[arg(default_value = "default")]
        namespace: String,
    },
    /// Diagnose problems for a Pod
    Diagnose {
        pod: String,
        #[arg(default_value = "default")]
        namespace: String,
    },
    /// Execute operations based on prompt instructions
    Execute {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        instructions: Vec<String>,
    },
    /// Generate Kubernetes manifests and optionally apply them
    Generate {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        instructions: Vec<String>,
    },
}

impl Commands {
    /// Subcommand name as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Analyze { .. } => "analyze",
            Self::Audit { .. } => "audit",
            Self::Diagnose { .. } => "diagnose",
            Self::Execute { .. } => "execute",
            Self::Generate { .. } => "generate",
        }
    }

    /// The rendered instruction, or `None` when free-form instructions are empty.
    pub fn instruction(&self) -> Option<String> {
        match self {
            Self::Analyze {
                resource,
                name,
                namespace,
            } => Some(prompts::analyze_prompt(namespace, resource, name)),
            Self::Audit { pod, namespace } => Some(prompts::audit_prompt(namespace, pod)),
            Self::Diagnose { pod, namespace } => Some(prompts::diagnose_prompt(namespace, pod)),
            Self::Execute { instructions } => {
                join_instructions(instructions).map(|i| prompts::execute_prompt(&i))
            }
            Self::Generate { instructions } => {
                join_instructions(instructions).map(|i| prompts::generate_prompt(&i))
            }
        }
    }

    /// Tools registered for this subcommand.
    pub fn tool_kinds(&self) -> Vec<ToolKind> {
        use strum::IntoEnumIterator;
        match self {
            Self::Generate { .. } => vec![ToolKind::GenerateManifest],
            _ => ToolKind::iter().collect(),
        }
    }

    pub fn is_generate(&self) -> bool {
        matches!(self, Self::Generate { .. })
    }
}

fn join_instructions(words: &[String]) -> Option<String> {
    let joined = words.join(" ");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
