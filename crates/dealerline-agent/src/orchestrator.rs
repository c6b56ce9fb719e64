// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded tool-use loop.
//!
//! One reply cycle alternates breaker-guarded agent calls with tool
//! executions until the agent produces a terminal reply, the tool ceiling is
//! hit, or the agent path fails. The cycle always ends with text for the
//! customer; how it ended is reported as a [`ReplyOutcome`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use strum::Display;
use tracing::{debug, info, warn};

use dealerline_config::model::AgentConfig;
use dealerline_core::types::{AgentReply, HistoryEntry};
use dealerline_core::{AgentAdapter, DealerlineError, ToolContext};
use dealerline_resilience::CircuitBreakerRegistry;

use crate::tools::ToolRegistry;

/// Why a cycle fell back to the configured safe message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FallbackReason {
    CircuitOpen,
    Timeout,
    AgentError,
    EmptyReply,
    PersistenceFailure,
}

/// How a reply cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Answered by the instant classifier; no agent call.
    Instant,
    /// The agent produced a terminal reply.
    Completed,
    /// The tool ceiling forced the cycle to end.
    IterationCeiling,
    /// The safe fallback message was used.
    Fallback(FallbackReason),
}

impl ReplyOutcome {
    /// Label for the `outcome` metric dimension.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Completed => "completed",
            Self::IterationCeiling => "iteration_ceiling",
            Self::Fallback(_) => "fallback",
        }
    }
}

impl fmt::Display for ReplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fallback(reason) => write!(f, "fallback({reason})"),
            other => write!(f, "{}", other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratedReply {
    pub text: String,
    pub outcome: ReplyOutcome,
    /// The last tool that ran, recorded on the assistant turn.
    pub last_tool: Option<String>,
    pub tool_invocations: usize,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Breaker name for agent calls.
    pub service: String,
    pub max_tool_iterations: usize,
    pub request_timeout: Duration,
    pub fallback_message: String,
    pub ceiling_message: String,
}

impl From<&AgentConfig> for OrchestratorConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            service: "anthropic".to_string(),
            max_tool_iterations: config.max_tool_iterations,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            fallback_message: config.fallback_message.clone(),
            ceiling_message: config.ceiling_message.clone(),
        }
    }
}

enum LoopState {
    AwaitingModel,
    ToolRequested {
        id: String,
        name: String,
        args: serde_json::Value,
        text: Option<String>,
    },
    Executing {
        id: String,
        name: String,
        args: serde_json::Value,
        text: Option<String>,
    },
    Terminal(OrchestratedReply),
}

pub struct Orchestrator {
    agent: Arc<dyn AgentAdapter>,
    tools: Arc<ToolRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        agent: Arc<dyn AgentAdapter>,
        tools: Arc<ToolRegistry>,
        breakers: Arc<CircuitBreakerRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            agent,
            tools,
            breakers,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs one reply cycle over `history`. Never fails.
    pub async fn run(&self, mut history: Vec<HistoryEntry>, ctx: &ToolContext) -> OrchestratedReply {
        let mut invocations = 0usize;
        let mut partial: Option<String> = None;
        let mut last_tool: Option<String> = None;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => match self.call_agent(&history).await {
                    Ok(AgentReply::Terminal { text }) if !text.trim().is_empty() => {
                        LoopState::Terminal(OrchestratedReply {
                            text,
                            outcome: ReplyOutcome::Completed,
                            last_tool: last_tool.clone(),
                            tool_invocations: invocations,
                        })
                    }
                    Ok(AgentReply::Terminal { .. }) => {
                        warn!(
                            conversation_id = ctx.conversation_id.as_str(),
                            "agent returned an empty reply"
                        );
                        let reply = match partial.take() {
                            Some(text) => OrchestratedReply {
                                text,
                                outcome: ReplyOutcome::Completed,
                                last_tool: last_tool.clone(),
                                tool_invocations: invocations,
                            },
                            None => self.fallback(FallbackReason::EmptyReply, invocations),
                        };
                        LoopState::Terminal(reply)
                    }
                    Ok(AgentReply::ToolCall {
                        id,
                        name,
                        args,
                        text,
                    }) => LoopState::ToolRequested {
                        id,
                        name,
                        args,
                        text,
                    },
                    Err(e) => {
                        let reason = match &e {
                            DealerlineError::CircuitOpen { .. } => FallbackReason::CircuitOpen,
                            DealerlineError::Timeout { .. } => FallbackReason::Timeout,
                            _ => FallbackReason::AgentError,
                        };
                        warn!(
                            conversation_id = ctx.conversation_id.as_str(),
                            error = %e,
                            reason = %reason,
                            "agent call failed, using fallback reply"
                        );
                        LoopState::Terminal(self.fallback(reason, invocations))
                    }
                },

                LoopState::ToolRequested {
                    id,
                    name,
                    args,
                    text,
                } => {
                    if let Some(preamble) = text.as_ref().filter(|t| !t.trim().is_empty()) {
                        partial = Some(preamble.clone());
                    }
                    if invocations >= self.config.max_tool_iterations {
                        info!(
                            conversation_id = ctx.conversation_id.as_str(),
                            requested_tool = name.as_str(),
                            invocations,
                            "tool ceiling reached, ending cycle"
                        );
                        LoopState::Terminal(OrchestratedReply {
                            text: partial
                                .take()
                                .unwrap_or_else(|| self.config.ceiling_message.clone()),
                            outcome: ReplyOutcome::IterationCeiling,
                            last_tool: last_tool.clone(),
                            tool_invocations: invocations,
                        })
                    } else {
                        LoopState::Executing {
                            id,
                            name,
                            args,
                            text,
                        }
                    }
                }

                LoopState::Executing {
                    id,
                    name,
                    args,
                    text,
                } => {
                    history.push(HistoryEntry::ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        args: args.clone(),
                        text,
                    });
                    let output = self.tools.invoke(&name, ctx, args).await;
                    invocations += 1;
                    debug!(
                        conversation_id = ctx.conversation_id.as_str(),
                        tool = name.as_str(),
                        is_error = output.is_error,
                        invocations,
                        "tool result appended"
                    );
                    history.push(HistoryEntry::ToolResult {
                        id,
                        name: name.clone(),
                        content: output.content,
                        is_error: output.is_error,
                    });
                    last_tool = Some(name);
                    LoopState::AwaitingModel
                }

                LoopState::Terminal(reply) => return reply,
            };
        }
    }

    /// The configured fallback reply tagged with `reason`.
    pub fn fallback(&self, reason: FallbackReason, tool_invocations: usize) -> OrchestratedReply {
        OrchestratedReply {
            text: self.config.fallback_message.clone(),
            outcome: ReplyOutcome::Fallback(reason),
            last_tool: None,
            tool_invocations,
        }
    }

    async fn call_agent(&self, history: &[HistoryEntry]) -> Result<AgentReply, DealerlineError> {
        let timeout = self.config.request_timeout;
        let agent = &self.agent;
        let started = Instant::now();

        let result = self
            .breakers
            .execute(&self.config.service, || async move {
                match tokio::time::timeout(timeout, agent.generate_reply(history)).await {
                    Ok(reply) => reply,
                    Err(_) => Err(DealerlineError::Timeout { duration: timeout }),
                }
            })
            .await;

        dealerline_prometheus::record_agent_latency(started.elapsed().as_secs_f64());
        result.map_err(DealerlineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealerline_resilience::{CircuitBreakerConfig, CircuitState};
    use dealerline_test_utils::mock_agent::tool_call;
    use dealerline_test_utils::{EchoTool, ScriptedAgent};

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            service: "anthropic".into(),
            max_tool_iterations: 3,
            request_timeout: Duration::from_secs(5),
            fallback_message: "fallback".into(),
            ceiling_message: "ceiling".into(),
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            conversation_id: "c-1".into(),
            sender: "whatsapp:+5585999999999".into(),
        }
    }

    fn history() -> Vec<HistoryEntry> {
        vec![HistoryEntry::User {
            content: "tem Corolla?".into(),
        }]
    }

    fn orchestrator(agent: Arc<ScriptedAgent>, echo: Arc<EchoTool>) -> Orchestrator {
        let mut tools = ToolRegistry::new(Duration::from_secs(1));
        tools.register(echo);
        Orchestrator::new(
            agent,
            Arc::new(tools),
            Arc::new(CircuitBreakerRegistry::default()),
            config(),
        )
    }

    #[tokio::test]
    async fn terminal_first_call_runs_no_tools() {
        let agent = Arc::new(ScriptedAgent::terminal("Temos sim!"));
        let echo = Arc::new(EchoTool::new("echo"));
        let reply = orchestrator(agent.clone(), echo.clone())
            .run(history(), &ctx())
            .await;

        assert_eq!(reply.text, "Temos sim!");
        assert_eq!(reply.outcome, ReplyOutcome::Completed);
        assert_eq!(reply.tool_invocations, 0);
        assert_eq!(echo.invocations(), 0);
        assert_eq!(agent.calls(), 1);
    }

    #[tokio::test]
    async fn looping_agent_stops_at_the_ceiling() {
        let agent = Arc::new(ScriptedAgent::always_tool("echo"));
        let echo = Arc::new(EchoTool::new("echo"));
        let reply = orchestrator(agent.clone(), echo.clone())
            .run(history(), &ctx())
            .await;

        assert_eq!(reply.outcome, ReplyOutcome::IterationCeiling);
        assert_eq!(reply.tool_invocations, 3);
        assert_eq!(echo.invocations(), 3);
        assert_eq!(agent.calls(), 4);
        assert_eq!(reply.text, "ceiling");
        assert_eq!(reply.last_tool.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn ceiling_prefers_the_latest_preamble() {
        let agent = Arc::new(ScriptedAgent::new().repeating(tool_call(
            "echo",
            serde_json::json!({}),
            Some("Deixa eu verificar..."),
        )));
        let echo = Arc::new(EchoTool::new("echo"));
        let reply = orchestrator(agent, echo).run(history(), &ctx()).await;

        assert_eq!(reply.outcome, ReplyOutcome::IterationCeiling);
        assert_eq!(reply.text, "Deixa eu verificar...");
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_in_order() {
        let agent = Arc::new(ScriptedAgent::new());
        agent
            .push(tool_call("echo", serde_json::json!({"q": 1}), None))
            .await;
        agent
            .push(AgentReply::Terminal {
                text: "pronto".into(),
            })
            .await;
        let echo = Arc::new(EchoTool::new("echo"));
        let reply = orchestrator(agent.clone(), echo).run(history(), &ctx()).await;

        assert_eq!(reply.outcome, ReplyOutcome::Completed);
        assert_eq!(reply.tool_invocations, 1);

        let histories = agent.histories().await;
        assert_eq!(histories.len(), 2);
        let second = &histories[1];
        assert_eq!(second.len(), 3);
        assert!(matches!(second[1], HistoryEntry::ToolCall { .. }));
        assert!(matches!(
            second[2],
            HistoryEntry::ToolResult {
                is_error: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_agent() {
        let agent = Arc::new(ScriptedAgent::new());
        agent
            .push(tool_call("missing", serde_json::json!({}), None))
            .await;
        agent
            .push(AgentReply::Terminal { text: "ok".into() })
            .await;
        let echo = Arc::new(EchoTool::new("echo"));
        let reply = orchestrator(agent.clone(), echo).run(history(), &ctx()).await;

        assert_eq!(reply.outcome, ReplyOutcome::Completed);
        let histories = agent.histories().await;
        assert!(matches!(
            histories[1][2],
            HistoryEntry::ToolResult { is_error: true, .. }
        ));
    }

    #[tokio::test]
    async fn agent_failure_falls_back() {
        let agent = Arc::new(ScriptedAgent::failing("boom"));
        let echo = Arc::new(EchoTool::new("echo"));
        let reply = orchestrator(agent, echo).run(history(), &ctx()).await;

        assert_eq!(reply.text, "fallback");
        assert_eq!(
            reply.outcome,
            ReplyOutcome::Fallback(FallbackReason::AgentError)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_agent_times_out_and_counts_against_the_breaker() {
        let agent =
            Arc::new(ScriptedAgent::terminal("late").with_delay(Duration::from_secs(60)));
        let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        }));
        let orchestrator = Orchestrator::new(
            agent.clone(),
            Arc::new(ToolRegistry::new(Duration::from_secs(1))),
            Arc::clone(&breakers),
            config(),
        );

        let first = orchestrator.run(history(), &ctx()).await;
        assert_eq!(first.outcome, ReplyOutcome::Fallback(FallbackReason::Timeout));
        assert_eq!(breakers.breaker("anthropic").state(), CircuitState::Open);

        let second = orchestrator.run(history(), &ctx()).await;
        assert_eq!(
            second.outcome,
            ReplyOutcome::Fallback(FallbackReason::CircuitOpen)
        );
        assert_eq!(agent.calls(), 1);
    }

    #[tokio::test]
    async fn empty_terminal_reply_falls_back() {
        let agent = Arc::new(ScriptedAgent::terminal("   "));
        let echo = Arc::new(EchoTool::new("echo"));
        let reply = orchestrator(agent, echo).run(history(), &ctx()).await;
        assert_eq!(
            reply.outcome,
            ReplyOutcome::Fallback(FallbackReason::EmptyReply)
        );
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(ReplyOutcome::IterationCeiling.label(), "iteration_ceiling");
        assert_eq!(
            ReplyOutcome::Fallback(FallbackReason::CircuitOpen).to_string(),
            "fallback(circuit_open)"
        );
    }
}
