//! kube-agent CLI binary entry point.

use std::sync::Arc;

use clap::{CommandFactory, Parser};
use kube_agent::agent_loop::{LoopRunner, RunRequest, RunStatus, Runner};
use kube_agent::cli::{apply, render, Cli, Commands, GlobalOptions};
use kube_agent::config::AgentConfig;
use kube_agent::error::{KubeAgentError, Result};
use kube_agent::tools::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Exit status for a run stopped at the step limit.
const EXIT_STEP_LIMIT: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.options.verbose);

    let code = match run(cli.command, cli.options).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "warn,kube_agent=info" } else { "warn" };
    let filter = EnvFilter::try_from_env("KUBE_AGENT_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(command: Commands, options: GlobalOptions) -> Result<i32> {
    let Some(instruction) = command.instruction() else {
        let mut cmd = Cli::command();
        if let Some(sub) = cmd.find_subcommand_mut(command.name()) {
            sub.print_help()?;
        }
        return Ok(0);
    };

    let mut config = AgentConfig::from_env(options.config.as_deref())?;
    if let Some(model) = options.model {
        config = config.with_model(model);
    }
    if let Some(max_steps) = options.max_steps {
        config = config.with_max_steps(max_steps);
    }

    let runner = LoopRunner::from_config(&config)?;
    let registry = Arc::new(ToolRegistry::from_kinds(
        command.tool_kinds(),
        config.scan_timeout,
    ));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, canceling run");
            ctrl_c.cancel();
        }
    });

    let mut request = RunRequest::new(instruction)
        .with_max_steps(config.max_steps)
        .with_registry(registry)
        .with_cancel(cancel.clone());
    if options.verbose {
        request = request.with_event_sink(render::verbose_sink());
    }

    info!(command = command.name(), model = %config.model, "starting run");
    let handle = runner.start(request).await?;
    let outcome = handle.wait().await?;

    println!("{}", outcome.text);

    match outcome.status {
        RunStatus::Aborted => {
            eprintln!(
                "Warning: reached the step limit of {} before a final answer; the output above is a partial summary.",
                outcome.max_steps
            );
            Ok(EXIT_STEP_LIMIT)
        }
        RunStatus::Completed if command.is_generate() => {
            apply_generated(&runner, &outcome.text, &cancel).await?;
            Ok(0)
        }
        RunStatus::Completed => Ok(0),
    }
}

async fn apply_generated(runner: &LoopRunner, answer: &str, cancel: &CancellationToken) -> Result<()> {
    let blocks = apply::extract_yaml_blocks(answer);
    if blocks.is_empty() {
        return Ok(());
    }

    let approved = {
        let stdin = std::io::stdin();
        apply::confirm(apply::APPLY_PROMPT, stdin.lock(), std::io::stdout())?
    };
    if !approved {
        return Ok(());
    }

    let manifests = apply::join_manifests(&blocks);
    let output = apply::apply_manifests(runner.executor(), &manifests, cancel).await?;
    if !output.stdout.is_empty() {
        print!("{}", output.stdout);
    }
    if !output.stderr.is_empty() {
        eprint!("{}", output.stderr);
    }
    if !output.success() {
        return Err(KubeAgentError::tool_execution(
            "kubectl",
            format!("kubectl apply exited with status {:?}", output.exit_code),
        ));
    }
    Ok(())
}
