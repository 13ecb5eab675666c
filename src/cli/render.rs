//! Verbose rendering of run events to stderr.

use std::sync::Arc;

use crate::agent_loop::{RunEvent, RunEventPayload, RunEventSink, RunLifecycle};
use crate::types::ToolOutcome;
use crate::util::truncate::truncate_utf8;

const PREVIEW_BYTES: usize = 2000;

/// Event sink that prints each step to stderr.
pub fn verbose_sink() -> RunEventSink {
    Arc::new(|event: RunEvent| {
        if let Some(line) = format_event(&event) {
            eprintln!("{line}");
        }
    })
}

/// Human-readable form of an event, or `None` for events not shown.
pub fn format_event(event: &RunEvent) -> Option<String> {
    let step = event.step;
    match &event.payload {
        RunEventPayload::Lifecycle { state } => match state {
            RunLifecycle::Started { model, max_steps } => Some(format!(
                "▶ run {} started (model {model}, max {max_steps} steps)",
                event.run_id
            )),
            RunLifecycle::Completed => Some(format!("■ completed after {step} step(s)")),
            RunLifecycle::Aborted { max_steps } => {
                Some(format!("■ stopped at the step limit ({max_steps})"))
            }
            RunLifecycle::Failed { error } => Some(format!("✗ run failed: {error}")),
        },
        RunEventPayload::Reasoning { text } => {
            Some(format!("[step {step}] thought: {}", text.trim()))
        }
        RunEventPayload::ToolCallStarted { call, mutating } => Some(format!(
            "[step {step}] ⚡ {}{} {}",
            call.name,
            if *mutating { " (mutating)" } else { "" },
            call.arguments
        )),
        RunEventPayload::ToolResult { result } => {
            let body = match &result.outcome {
                ToolOutcome::Success { stdout, stderr, .. } => join_streams(stdout, stderr),
                ToolOutcome::Failure {
                    category,
                    message,
                    stdout,
                    stderr,
                    ..
                } => {
                    let streams = join_streams(stdout, stderr);
                    if streams.is_empty() {
                        format!("{category}: {message}")
                    } else {
                        format!("{category}: {message}\n{streams}")
                    }
                }
            };
            let icon = if result.is_error() { "❌" } else { "✅" };
            Some(format!(
                "[step {step}] {icon} {}\n{}",
                result.tool_name,
                indent(preview(&body))
            ))
        }
        // Printed on stdout by the caller.
        RunEventPayload::FinalAnswer { .. } => None,
    }
}

fn join_streams(stdout: &str, stderr: &str) -> String {
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (false, false) => format!("{}\n[stderr]\n{}", stdout.trim_end(), stderr.trim_end()),
        (false, true) => stdout.trim_end().to_string(),
        (true, false) => format!("[stderr]\n{}", stderr.trim_end()),
        (true, true) => String::new(),
    }
}

fn preview(text: &str) -> String {
    let cut = truncate_utf8(text, PREVIEW_BYTES);
    if cut.len() < text.len() {
        format!("{cut}…")
    } else {
        cut.to_string()
    }
}

fn indent(text: String) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
