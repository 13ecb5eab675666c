//! kube-agent: a Kubernetes copilot.
//!
//! An agent loop that asks an OpenAI (or Azure OpenAI) chat model to pick
//! tools (kubectl, trivy, python, manifest rendering), runs them against the
//! current cluster, feeds the results back and stops at a final answer or the
//! step limit.
//!
//! # Quick Start
//!
//! ```no_run
//! use kube_agent::prelude::*;
//!
//! # async fn example() -> kube_agent::error::Result<()> {
//! let config = AgentConfig::from_env(None)?;
//! let runner = LoopRunner::from_config(&config)?;
//! let outcome = runner
//!     .run(RunRequest::new("list pods in namespace default").with_max_steps(config.max_steps))
//!     .await?;
//! println!("{}", outcome.text);
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod config;
pub mod error;
pub mod exec;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
