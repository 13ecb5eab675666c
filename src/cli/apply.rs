//! Confirm-and-apply workflow for generated manifests.

use std::io::{BufRead, Write};
use std::sync::OnceLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};

pub const APPLY_PROMPT: &str = "Do you approve to apply the generated manifests to cluster?";

static YAML_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();

fn yaml_block() -> Option<&'static Regex> {
    YAML_BLOCK
        .get_or_init(|| Regex::new(r"(?s)```yaml(.*?)```").ok())
        .as_ref()
}

/// Contents of every ```yaml fenced block in `text`, trimmed. Empty blocks
/// are dropped.
pub fn extract_yaml_blocks(text: &str) -> Vec<String> {
    let Some(re) = yaml_block() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|block| !block.is_empty())
        .collect()
}

/// Join manifest blocks into one multi-document stream.
pub fn join_manifests(blocks: &[String]) -> String {
    format!("{}\n", blocks.join("\n---\n"))
}

/// Ask a yes/no question. Anything but `y`/`yes` is a no, as is EOF.
pub fn confirm<R: BufRead, W: Write>(question: &str, mut input: R, mut output: W) -> std::io::Result<bool> {
    write!(output, "{question} [y/N]: ")?;
    output.flush()?;
    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Ok(false);
    }
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// `kubectl apply -f -` with `manifests` on stdin.
pub fn apply_command(manifests: &str) -> CommandSpec {
    CommandSpec::new("kubectl")
        .args(["apply", "-f", "-"])
        .stdin(manifests)
}

/// Apply manifests through the executor.
pub async fn apply_manifests(
    executor: &CommandExecutor,
    manifests: &str,
    cancel: &CancellationToken,
) -> Result<CommandOutput> {
    info!(bytes = manifests.len(), "applying generated manifests");
    executor
        .run("kubectl", apply_command(manifests), cancel)
        .await
}
