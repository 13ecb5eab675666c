//! End-to-end agent loop scenarios against a scripted model and a fake kubectl.

mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;

use common::*;
use kube_agent::agent_loop::{
    RunEvent, RunEventPayload, RunLifecycle, RunRequest, RunStatus, Runner,
};
use kube_agent::error::KubeAgentError;
use kube_agent::exec::ExecutorConfig;
use kube_agent::tools::{ToolKind, ToolRegistry};
use kube_agent::types::*;

fn collecting_sink() -> (kube_agent::agent_loop::RunEventSink, Arc<Mutex<Vec<RunEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let sink = Arc::new(move |event: RunEvent| sink_events.lock().unwrap().push(event));
    (sink, events)
}

fn tool_results(messages: &[ModelMessage]) -> Vec<AgentToolResult> {
    messages
        .iter()
        .filter_map(|m| m.tool_result_part().cloned())
        .collect()
}

#[tokio::test]
async fn lists_pods_then_answers() {
    install_fake_kubectl();
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("call_1", "kubectl", json!({"args": "get pods -n default"}));
    provider.queue_final("There are 2 pods running in default: web-0 and web-1.\nTERMINATE");

    let (sink, events) = collecting_sink();
    let outcome = runner(provider.clone(), ExecutorConfig::default())
        .run(RunRequest::new("list pods in namespace default").with_event_sink(sink))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(
        outcome.text,
        "There are 2 pods running in default: web-0 and web-1."
    );
    assert_eq!(outcome.steps, 1);
    assert_eq!(outcome.tool_executions, 1);
    assert_eq!(outcome.usage.total_tokens, 45);
    outcome.conversation.validate().unwrap();

    // The second request carries the kubectl output back to the model.
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let results = tool_results(&requests[1].messages);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tool_call_id, "call_1");
    match &results[0].outcome {
        ToolOutcome::Success { stdout, .. } => {
            assert!(stdout.contains("web-0"));
            assert!(stdout.contains("web-1"));
        }
        other => panic!("expected success, got {other:?}"),
    }

    let events = events.lock().unwrap();
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    assert!(matches!(
        events.first().map(|e| &e.payload),
        Some(RunEventPayload::Lifecycle {
            state: RunLifecycle::Started { .. }
        })
    ));
    assert!(matches!(
        events.last().map(|e| &e.payload),
        Some(RunEventPayload::Lifecycle {
            state: RunLifecycle::Completed
        })
    ));
    assert!(events.iter().any(|e| matches!(
        &e.payload,
        RunEventPayload::ToolCallStarted { call, mutating: false } if call.name == "kubectl"
    )));
}

#[tokio::test]
async fn every_request_offers_the_registered_tools() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_final("nothing to do");

    let registry = Arc::new(ToolRegistry::from_kinds(
        [ToolKind::GenerateManifest],
        Duration::from_secs(1),
    ));
    runner(provider.clone(), ExecutorConfig::default())
        .run(RunRequest::new("generate a namespace").with_registry(registry))
        .await
        .unwrap();

    let requests = provider.requests();
    let tools = requests[0].tools.as_ref().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "generate_manifest");

    let system = &requests[0].messages[0];
    assert_eq!(system.role, Role::System);
    assert!(system.text().contains("generate_manifest"));
    assert!(!system.text().contains("`trivy`"));
}

#[tokio::test]
async fn step_limit_aborts_with_summary() {
    install_fake_kubectl();
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("c1", "kubectl", json!({"args": "get pods -n default"}));
    provider.queue_tool_call("c2", "kubectl", json!({"args": "get pods -n default"}));
    provider.queue_final("Partial: both listings showed web-0 and web-1.");

    let (sink, events) = collecting_sink();
    let outcome = runner(provider.clone(), ExecutorConfig::default())
        .run(
            RunRequest::new("keep listing pods")
                .with_max_steps(2)
                .with_event_sink(sink),
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Aborted);
    assert_eq!(outcome.steps, 2);
    assert_eq!(outcome.tool_executions, 2);
    assert_eq!(outcome.text, "Partial: both listings showed web-0 and web-1.");
    outcome.conversation.validate().unwrap();

    // The wrap-up request is made without tools.
    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[2].tools.is_none());
    assert_eq!(
        requests[2].messages.last().map(|m| m.role),
        Some(Role::User)
    );

    let err = outcome.into_answer().unwrap_err();
    assert!(matches!(err, KubeAgentError::StepLimitExceeded { max_steps: 2, .. }));
    assert!(!err.is_failure());

    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e.payload,
        RunEventPayload::Lifecycle {
            state: RunLifecycle::Aborted { max_steps: 2 }
        }
    )));
}

#[tokio::test]
async fn wrap_up_failure_falls_back_to_local_summary() {
    install_fake_kubectl();
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("c1", "kubectl", json!({"args": "get pods -n default"}));
    // Script exhausted: the wrap-up request fails.

    let outcome = runner(provider, ExecutorConfig::default())
        .run(RunRequest::new("list pods").with_max_steps(1))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Aborted);
    assert!(outcome.text.starts_with("Stopped after reaching the step limit of 1"));
    assert!(outcome.text.contains("Last tool result (kubectl, succeeded)"));
    assert!(outcome.text.contains("web-0"));
}

#[tokio::test]
async fn unknown_tool_is_reported_and_run_continues() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("c1", "helm", json!({"args": "list"}));
    provider.queue_final("helm is not available, nothing else to do.");

    let outcome = runner(provider.clone(), ExecutorConfig::default())
        .run(RunRequest::new("list helm releases"))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.tool_executions, 1);

    let results = tool_results(&provider.requests()[1].messages);
    assert_eq!(
        results[0].outcome.error_category(),
        Some(ToolErrorCategory::UnknownTool)
    );
}

#[tokio::test]
async fn invalid_arguments_are_reported_and_run_continues() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("c1", "kubectl", json!({"command": "get pods"}));
    provider.queue_final("I could not call kubectl.");

    let outcome = runner(provider.clone(), ExecutorConfig::default())
        .run(RunRequest::new("list pods"))
        .await
        .unwrap();

    assert!(outcome.is_completed());
    let results = tool_results(&provider.requests()[1].messages);
    assert_eq!(
        results[0].outcome.error_category(),
        Some(ToolErrorCategory::InvalidArguments)
    );
}

#[tokio::test]
async fn failed_command_keeps_stderr_for_the_model() {
    install_fake_kubectl();
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("c1", "kubectl", json!({"args": "get widgets"}));
    provider.queue_final("The resource type does not exist.");

    runner(provider.clone(), ExecutorConfig::default())
        .run(RunRequest::new("get widgets"))
        .await
        .unwrap();

    let results = tool_results(&provider.requests()[1].messages);
    match &results[0].outcome {
        ToolOutcome::Failure {
            category, stderr, ..
        } => {
            assert_eq!(*category, ToolErrorCategory::Execution);
            assert!(stderr.contains("unknown command"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn warnings_on_stderr_do_not_fail_the_call() {
    install_fake_kubectl();
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("c1", "kubectl", json!({"args": "get pods -n warn"}));
    provider.queue_final("web-0 is running.");

    runner(provider.clone(), ExecutorConfig::default())
        .run(RunRequest::new("list pods in warn"))
        .await
        .unwrap();

    let results = tool_results(&provider.requests()[1].messages);
    match &results[0].outcome {
        ToolOutcome::Success { stdout, stderr, .. } => {
            assert!(stdout.contains("web-0"));
            assert!(stderr.contains("deprecated"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_command_times_out_and_run_continues() {
    install_fake_kubectl();
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("c1", "kubectl", json!({"args": "get pods -n slow"}));
    provider.queue_final("The API server is not responding.");

    let started = Instant::now();
    let outcome = runner(
        provider.clone(),
        executor_config(Duration::from_millis(200), 8 * 1024),
    )
    .run(RunRequest::new("list pods in slow"))
    .await
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(outcome.is_completed());
    let results = tool_results(&provider.requests()[1].messages);
    assert_eq!(
        results[0].outcome.error_category(),
        Some(ToolErrorCategory::Timeout)
    );
}

#[tokio::test]
async fn timed_out_delete_leaves_no_side_effects_behind() {
    install_fake_kubectl();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("deleted");
    let args = format!("-n prod delete pod web-0 --marker {}", marker.display());

    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("c1", "kubectl", json!({ "args": args }));
    provider.queue_final("The delete did not finish in time.");

    let (sink, events) = collecting_sink();
    let started = Instant::now();
    let outcome = runner(
        provider.clone(),
        executor_config(Duration::from_millis(200), 8 * 1024),
    )
    .run(RunRequest::new("delete web-0 in prod").with_event_sink(sink))
    .await
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(outcome.is_completed());
    let results = tool_results(&provider.requests()[1].messages);
    assert_eq!(
        results[0].outcome.error_category(),
        Some(ToolErrorCategory::Timeout)
    );
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        &e.payload,
        RunEventPayload::ToolCallStarted { mutating: true, .. }
    )));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists());
}

#[tokio::test]
async fn large_output_is_truncated_and_conversation_stays_valid() {
    install_fake_kubectl();
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("c1", "kubectl", json!({"args": "get pods -n big"}));
    provider.queue_final("There are 2000 pods.");

    let outcome = runner(provider.clone(), executor_config(Duration::from_secs(30), 1024))
        .run(RunRequest::new("count pods in big"))
        .await
        .unwrap();

    outcome.conversation.validate().unwrap();
    let results = tool_results(&provider.requests()[1].messages);
    assert!(results[0].outcome.is_truncated());
    match &results[0].outcome {
        ToolOutcome::Success { stdout, .. } => {
            assert!(stdout.starts_with("pod-0 "));
            assert!(stdout.len() < 2048);
            assert!(stdout.contains("bytes omitted"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn parallel_calls_are_answered_in_order() {
    install_fake_kubectl();
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_calls(&[
        ("a", "kubectl", json!({"args": "get pods -n default"})),
        ("b", "generate_manifest", json!({"manifest": "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: demo\n"})),
    ]);
    provider.queue_final("done");

    let outcome = runner(provider.clone(), ExecutorConfig::default())
        .run(RunRequest::new("two things"))
        .await
        .unwrap();

    assert_eq!(outcome.steps, 1);
    assert_eq!(outcome.tool_executions, 2);
    let ids: Vec<String> = tool_results(&provider.requests()[1].messages)
        .into_iter()
        .map(|r| r.tool_call_id)
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn repeated_call_ids_in_one_turn_each_get_an_answer() {
    install_fake_kubectl();
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_calls(&[
        ("call_0", "kubectl", json!({"args": "get pods -n default"})),
        ("call_0", "kubectl", json!({"args": "get pods -n warn"})),
    ]);
    provider.queue_final("web-0 is running in both namespaces.");

    let outcome = runner(provider.clone(), ExecutorConfig::default())
        .run(RunRequest::new("compare default and warn"))
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(outcome.tool_executions, 2);
    outcome.conversation.validate().unwrap();
    let ids: Vec<String> = tool_results(&provider.requests()[1].messages)
        .into_iter()
        .map(|r| r.tool_call_id)
        .collect();
    assert_eq!(ids, vec!["call_0", "call_0-2"]);
}

#[tokio::test]
async fn transient_model_errors_are_retried() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_error(KubeAgentError::api(502, "bad gateway"));
    provider.queue_error(KubeAgentError::RateLimited {
        retry_after_ms: Some(1),
    });
    provider.queue_final("recovered");

    let outcome = runner(provider.clone(), ExecutorConfig::default())
        .run(RunRequest::new("anything"))
        .await
        .unwrap();

    assert_eq!(outcome.text, "recovered");
    assert_eq!(provider.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn model_unavailable_after_retries_fails_the_run() {
    let provider = Arc::new(ScriptedProvider::new());

    let (sink, events) = collecting_sink();
    let err = runner(provider.clone(), ExecutorConfig::default())
        .run(RunRequest::new("anything").with_event_sink(sink))
        .await
        .unwrap_err();

    assert!(matches!(err, KubeAgentError::ModelUnavailable { attempts: 3, .. }));
    assert!(err.is_failure());
    assert_eq!(provider.request_count(), 3);
    assert!(matches!(
        events.lock().unwrap().last().map(|e| &e.payload),
        Some(RunEventPayload::Lifecycle {
            state: RunLifecycle::Failed { .. }
        })
    ));
}

#[tokio::test]
async fn authentication_errors_are_not_retried() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_error(KubeAgentError::Authentication("invalid api key".into()));

    let err = runner(provider.clone(), ExecutorConfig::default())
        .run(RunRequest::new("anything"))
        .await
        .unwrap_err();

    assert!(matches!(err, KubeAgentError::ModelUnavailable { attempts: 1, .. }));
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn abort_cancels_a_running_tool() {
    install_fake_kubectl();
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_tool_call("c1", "kubectl", json!({"args": "get pods -n slow"}));
    provider.queue_final("unreachable");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let sink = Arc::new(move |event: RunEvent| {
        let _ = tx.send(event);
    });

    let handle = runner(provider.clone(), ExecutorConfig::default())
        .start(RunRequest::new("list pods in slow").with_event_sink(sink))
        .await
        .unwrap();

    while let Some(event) = rx.recv().await {
        if matches!(event.payload, RunEventPayload::ToolCallStarted { .. }) {
            break;
        }
    }
    // Give sh a moment to exec kubectl.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    handle.abort();
    let err = tokio::time::timeout(Duration::from_secs(4), handle.wait())
        .await
        .expect("run did not stop after abort")
        .unwrap_err();

    assert!(matches!(err, KubeAgentError::Canceled));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn pre_cancelled_request_never_calls_the_model() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.queue_final("unreachable");

    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();
    let err = runner(provider.clone(), ExecutorConfig::default())
        .run(RunRequest::new("anything").with_cancel(cancel))
        .await
        .unwrap_err();

    assert!(matches!(err, KubeAgentError::Canceled));
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn zero_max_steps_is_rejected() {
    let provider = Arc::new(ScriptedProvider::new());
    let err = runner(provider, ExecutorConfig::default())
        .run(RunRequest::new("anything").with_max_steps(0))
        .await
        .unwrap_err();
    assert!(matches!(err, KubeAgentError::Configuration(_)));
}

#[tokio::test]
async fn runs_are_independent() {
    let provider = Arc::new(ScriptedProvider::repeating(final_response("ok")));
    let runner = runner(provider, ExecutorConfig::default());

    let first = runner.run(RunRequest::new("one")).await.unwrap();
    let second = runner.run(RunRequest::new("two")).await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.conversation.len(), 3);
    assert_eq!(second.conversation.len(), 3);
}
