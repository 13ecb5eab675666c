//! Prompt templates.

use crate::tools::ToolRegistry;

const SYSTEM_PROMPT: &str = "\
You are a Kubernetes copilot: a principal cloud-native engineer operating a live \
cluster on the user's behalf through the tools listed below.

# Tools
{tools}

# How to work
1. Plan the smallest sequence of tool calls that answers the request.
2. Inspect before you change anything. Prefer read-only kubectl verbs (get, describe, \
logs, top, events) to gather evidence.
3. Only run commands that modify the cluster when the user explicitly asked for the change.
4. Tool results are JSON with `status`, `stdout`, `stderr` and, on failure, `category` \
and `message`. Read stderr and fix your next call instead of repeating a failing one.
5. Output marked `[output truncated: ...]` is incomplete; narrow the query (labels, \
`--tail`, `-o jsonpath`) if you need the rest.
6. When you have enough information, stop calling tools and reply with a concise, \
well-structured final answer in Markdown.";

/// System prompt describing the tools available to this run.
pub fn system_prompt(registry: &ToolRegistry) -> String {
    let tools = registry
        .specs()
        .iter()
        .map(|spec| {
            let access = if spec.mutating {
                "may modify the cluster"
            } else {
                "read-only"
            };
            format!("- `{}` ({access}): {}", spec.name(), spec.description)
        })
        .collect::<Vec<_>>()
        .join("\n");
    SYSTEM_PROMPT.replace("{tools}", &tools)
}

/// Free-form instruction for `execute`.
pub fn execute_prompt(instructions: &str) -> String {
    format!(
        "As a Kubernetes expert, complete the following task using the available tools \
         and report the outcome.\n\nTask: {instructions}"
    )
}

/// Diagnose a misbehaving pod.
pub fn diagnose_prompt(namespace: &str, pod: &str) -> String {
    format!(
        "Diagnose the problems of Pod `{pod}` in namespace `{namespace}`.\n\n\
         1. Get the Pod's status, recent events and container states.\n\
         2. Check the logs of failing containers (include previous instances).\n\
         3. Check the owning controller and any referenced ConfigMaps, Secrets, \
         volumes and Services.\n\
         4. Report the root cause and concrete remediation steps."
    )
}

/// Audit a pod for security issues.
pub fn audit_prompt(namespace: &str, pod: &str) -> String {
    format!(
        "Audit the security of Pod `{pod}` in namespace `{namespace}`.\n\n\
         1. Get the Pod's YAML and review its security context, privileges, host \
         namespaces, capabilities, service account and resource limits.\n\
         2. Scan every container image with trivy for HIGH and CRITICAL \
         vulnerabilities.\n\
         3. Report the findings ordered by severity, each with a recommended fix."
    )
}

/// Analyze an arbitrary resource.
pub fn analyze_prompt(namespace: &str, resource: &str, name: &str) -> String {
    format!(
        "Analyze the {resource} `{name}` in namespace `{namespace}` for potential \
         issues.\n\n\
         1. Get the resource's YAML and status.\n\
         2. Check it against Kubernetes best practices (reliability, security, \
         resource management, configuration).\n\
         3. Report each issue with an explanation and a suggested fix."
    )
}

/// Manifest generation; yaml blocks in the answer are offered for apply.
pub fn generate_prompt(instructions: &str) -> String {
    format!(
        "Generate Kubernetes manifests for the following request:\n\n{instructions}\n\n\
         Validate every manifest with the generate_manifest tool before answering. \
         Return the final manifests in ```yaml code blocks, one block per file, \
         followed by a short explanation. Do not apply anything to the cluster."
    )
}
