//! Orchestrator - runs one task through the plan/act/observe loop
//!
//! One `Orchestrator::run` owns the browser context for its whole lifetime
//! and does everything sequentially: at most one reasoning call, one browser
//! action or one confirmation is outstanding at any time. The reasoning call
//! and the confirmation are suspension points that honour cancellation and a
//! deadline; browser actions only get a deadline, so an abort never lands in
//! the middle of a page mutation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::confirm::{ConfirmationGate, ConfirmationRequest};
use crate::agent::loop_state::{AgentLoopState, LoopState};
use crate::agent::memory::Memory;
use crate::agent::policy::PolicyClassifier;
use crate::agent::prompts::system_prompt;
use crate::agent::recovery::{RecoveryController, Rung};
use crate::agent::run_log::{LogSink, RunContext, RunLog, RunMetadata, RunStatus};
use crate::core::{
    Config, Intent, Locator, Observation, PendingStep, PilotError, PolicyDecision, Result, Step,
    StepOutcome, Task, ToolCall, ToolResult,
};
use crate::llm::{parse_intent, ReasoningRequest, ReasoningService};
use crate::selector::{explicit_locator, resolve, Resolution};
use crate::tools::browser::{BrowserAction, BrowserDriver};
use crate::tools::{Invocation, ToolRegistry};

/// How a run ended, with its full log
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub summary: String,
    pub log: RunLog,
    pub metadata: RunMetadata,
    /// URL of the last observation
    pub final_url: String,
}

impl RunReport {
    pub fn steps(&self) -> &[Step] {
        &self.log.steps
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// A reply that passed validation
enum Planned {
    Act(ToolCall, Invocation),
    Complete(String),
    Fail(String),
}

/// Why the step loop stopped
struct Ending {
    status: RunStatus,
    summary: String,
}

impl Ending {
    fn completed(summary: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Completed,
            summary: summary.into(),
        }
    }

    fn failed(summary: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            summary: summary.into(),
        }
    }
}

/// Mutable state of one run
struct RunState {
    task: Task,
    loop_state: AgentLoopState,
    memory: Memory,
    ctx: RunContext,
    observation: Observation,
    /// Consecutive planning turns that produced nothing usable
    reasoning_failures: usize,
}

impl RunState {
    fn record(&mut self, pending: PendingStep) -> Step {
        let step = self.ctx.record(pending);
        info!(
            run_id = %self.task.run_id,
            step = step.index,
            tool = %step.intent.name,
            outcome = %step.outcome,
            "Step recorded"
        );
        self.memory.record(step.clone());
        self.loop_state.step_recorded();
        step
    }

    fn transition(&mut self, next: LoopState) -> Result<()> {
        self.loop_state.transition(next)
    }

    /// Move to `Failed` unless already terminal
    fn fail(&mut self, summary: impl Into<String>) -> Ending {
        if !self.loop_state.state().is_terminal() {
            let _ = self.loop_state.transition(LoopState::Failed);
        }
        Ending::failed(summary)
    }
}

/// Progress of one intent through dispatch and recovery
struct Attempt {
    resolution: Option<Resolution>,
    rank: usize,
    tried: Vec<Locator>,
}

/// Drives a browser through a task
pub struct Orchestrator {
    config: Config,
    reasoning: Arc<dyn ReasoningService>,
    browser: Arc<dyn BrowserDriver>,
    gate: Arc<dyn ConfirmationGate>,
    registry: ToolRegistry,
    policy: PolicyClassifier,
    system_prompt: String,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Wire collaborators together; fails on invalid config or tool table
    pub fn new(
        config: Config,
        reasoning: Arc<dyn ReasoningService>,
        browser: Arc<dyn BrowserDriver>,
        gate: Arc<dyn ConfirmationGate>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = ToolRegistry::new();
        registry.validate()?;
        let system_prompt = system_prompt(&registry);

        Ok(Self {
            config,
            reasoning,
            browser,
            gate,
            registry,
            policy: PolicyClassifier::new(),
            system_prompt,
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the policy table
    pub fn with_policy(mut self, policy: PolicyClassifier) -> Self {
        self.policy = policy;
        self
    }

    /// Token that aborts the run at the next suspension point or step boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run `goal` to completion, persisting every step to `sink`
    pub async fn run(&self, goal: impl Into<String>, sink: Box<dyn LogSink>) -> Result<RunReport> {
        let task = Task::new(goal);
        info!(run_id = %task.run_id, task = %task.goal, reasoning = %self.reasoning.name(), "Starting run");

        let ctx = RunContext::new(&task, sink);
        let mut state = RunState {
            memory: Memory::new(
                task.goal.clone(),
                self.config.agent.memory_window,
                self.config.agent.summary_detail,
            ),
            loop_state: AgentLoopState::new(self.config.agent.max_steps, self.config.run_budget()),
            ctx,
            observation: Observation::blank("about:blank", ""),
            reasoning_failures: 0,
            task,
        };

        let ending = match self.start(&mut state).await {
            Ok(()) => match self.drive(&mut state).await {
                Ok(ending) => ending,
                Err(e) => state.fail(e.to_string()),
            },
            Err(e) => state.fail(format!("Could not start the browser: {}", e)),
        };

        if let Err(e) = self.with_deadline("browser close", self.browser.close()).await {
            warn!(error = %e, "Failed to close browser");
        }

        info!(
            run_id = %state.task.run_id,
            status = ?ending.status,
            steps = state.ctx.steps().len(),
            elapsed_ms = state.loop_state.elapsed().as_millis() as u64,
            "Run finished"
        );

        let final_url = state.observation.url.clone();
        let (log, metadata) = state.ctx.finish(ending.status, &ending.summary);
        Ok(RunReport {
            status: ending.status,
            summary: ending.summary,
            log,
            metadata,
            final_url,
        })
    }

    /// `Init`: open the browser and take the first observation
    async fn start(&self, state: &mut RunState) -> Result<()> {
        let start_url = self.config.browser.start_url.as_deref();
        self.with_deadline("browser open", self.browser.open(start_url))
            .await?;
        state.transition(LoopState::Observing)?;
        self.observe(state).await?;
        state.transition(LoopState::Planning)
    }

    /// Step loop; every iteration starts in `Planning`
    async fn drive(&self, state: &mut RunState) -> Result<Ending> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(state.fail("Run cancelled"));
            }
            if let Err(e) = state.loop_state.check_budget() {
                warn!(run_id = %state.task.run_id, error = %e, "Budget exhausted");
                return Ok(state.fail(e.to_string()));
            }

            let planned = match self.plan(state).await {
                Ok(planned) => {
                    state.reasoning_failures = 0;
                    planned
                }
                Err(PilotError::Cancelled) => return Ok(state.fail("Run cancelled")),
                Err(e) if e.is_fatal() => return Ok(state.fail(e.to_string())),
                Err(e) => {
                    state.reasoning_failures += 1;
                    if state.reasoning_failures > self.config.agent.reasoning_retries {
                        return Ok(state.fail(format!(
                            "Reasoning service failed {} times in a row: {}",
                            state.reasoning_failures, e
                        )));
                    }
                    warn!(run_id = %state.task.run_id, error = %e, "Unusable reply, asking for a new plan");
                    state.transition(LoopState::Recovering)?;
                    state.record(PendingStep::replan(e.to_string()));
                    state.transition(LoopState::Planning)?;
                    continue;
                }
            };

            match planned {
                Planned::Complete(summary) => {
                    state.transition(LoopState::Completed)?;
                    return Ok(Ending::completed(summary));
                }
                Planned::Fail(reason) => return Ok(state.fail(reason)),
                Planned::Act(call, invocation) => {
                    match self.handle_action(state, call, invocation).await {
                        Ok(()) => {}
                        Err(PilotError::Cancelled) => return Ok(state.fail("Run cancelled")),
                        Err(e) => return Ok(state.fail(e.to_string())),
                    }
                }
            }
        }
    }

    /// `Planning`: ask for the next intent and validate it
    async fn plan(&self, state: &mut RunState) -> Result<Planned> {
        let request = ReasoningRequest {
            task: state.task.goal.clone(),
            context: state.memory.context(&state.observation),
            tools: self.registry.definitions(),
            system_prompt: self.system_prompt.clone(),
        };
        debug!(
            verbatim = request.context.verbatim.len(),
            summarized = request.context.summary.is_some(),
            "Planning"
        );

        let reply = self
            .suspend(
                "the reasoning service",
                self.config.reasoning_timeout(),
                self.reasoning.next_intent(&request),
            )
            .await?;
        if let Some(usage) = &reply.usage {
            state.ctx.add_usage(usage);
        }

        match parse_intent(&reply, &self.registry)? {
            Intent::Action(call) => {
                let invocation = self.registry.invocation(&call)?;
                Ok(Planned::Act(call, invocation))
            }
            Intent::Complete { summary } => Ok(Planned::Complete(summary)),
            Intent::Fail { reason } => Ok(Planned::Fail(reason)),
        }
    }

    /// Policy gate, then dispatch with recovery
    async fn handle_action(&self, state: &mut RunState, call: ToolCall, invocation: Invocation) -> Result<()> {
        let decision = self.policy.classify(&call, &state.observation);
        debug!(tool = %call.name, tier = %decision.tier, rule = ?decision.rule, "Policy decision");

        let confirmed = if decision.requires_confirmation {
            state.transition(LoopState::AwaitingConfirmation)?;
            if !self.ask(&call, &decision).await? {
                info!(tool = %call.name, reason = %decision.reason, "Action declined");
                let summary = format!("Declined at confirmation: {}", decision.reason);
                state.record(
                    PendingStep::new(call, StepOutcome::Rejected, summary)
                        .with_policy(decision, Some(false)),
                );
                return state.transition(LoopState::Planning);
            }
            Some(true)
        } else {
            None
        };

        state.transition(LoopState::Acting)?;
        match invocation {
            Invocation::QueryDom { query, limit } => {
                let limit = limit.unwrap_or(self.config.agent.query_limit);
                let pending = match self.resolve_target(&query, limit).await {
                    Ok(resolution) => PendingStep::new(
                        call,
                        StepOutcome::Succeeded,
                        describe_resolution(&resolution),
                    ),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => PendingStep::new(call, StepOutcome::Failed, e.to_string()),
                };
                state.record(pending.with_policy(decision, confirmed));
                self.settle_after_step(state).await
            }
            Invocation::Browser { action, target } => {
                self.act(state, call, decision, confirmed, action, target)
                    .await
            }
        }
    }

    /// Confirmation gate under its own deadline; a timeout counts as no
    async fn ask(&self, call: &ToolCall, decision: &PolicyDecision) -> Result<bool> {
        let request = ConfirmationRequest::new(call, decision);
        let answer = self
            .suspend("confirmation", self.config.confirmation_timeout(), async {
                Ok(self.gate.confirm(&request).await)
            })
            .await;
        match answer {
            Ok(approved) => Ok(approved),
            Err(PilotError::Cancelled) => Err(PilotError::Cancelled),
            Err(e) => {
                warn!(error = %e, "No confirmation answer, treating as declined");
                Ok(false)
            }
        }
    }

    /// `Acting` / `Recovering` for one browser intent
    async fn act(
        &self,
        state: &mut RunState,
        call: ToolCall,
        decision: PolicyDecision,
        confirmed: Option<bool>,
        action: BrowserAction,
        target: Option<String>,
    ) -> Result<()> {
        let mut controller = RecoveryController::new(target.is_some());
        let mut attempt = Attempt {
            resolution: None,
            rank: 0,
            tried: Vec::new(),
        };

        loop {
            let failure = match self.try_once(&action, target.as_deref(), &mut attempt).await {
                Ok(result) => {
                    let mut pending = PendingStep::new(call, StepOutcome::Succeeded, result.output)
                        .with_policy(decision, confirmed)
                        .with_locator(attempt.tried.last().cloned());
                    if let Some(rung) = controller.attempted().last() {
                        pending = pending
                            .with_diagnostic(format!("recovered via {}", rung))
                            .with_diagnostic(format!("rungs tried: {}", rung_list(controller.attempted())));
                    }
                    state.record(pending);
                    return self.settle_after_step(state).await;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => e,
            };

            state.transition(LoopState::Recovering)?;
            let remaining = attempt
                .resolution
                .as_ref()
                .map(|r| r.remaining_after(attempt.rank))
                .unwrap_or(0);
            let rung = controller.next_rung(&failure, remaining);
            info!(tool = %call.name, error = %failure, rung = %rung, "Action failed, recovering");

            match rung {
                Rung::WaitAndRecheck => {
                    tokio::time::sleep(self.config.settle_period()).await;
                    self.observe(state).await?;
                }
                Rung::ScrollIntoView => {
                    let scroll = match attempt.resolution.as_ref().and_then(|r| r.at(attempt.rank)) {
                        Some(locator) => self.dispatch(&BrowserAction::ScrollIntoView, Some(locator)).await,
                        None => {
                            let step = BrowserAction::Scroll {
                                amount: self.config.browser.scroll_step,
                            };
                            self.dispatch(&step, None).await
                        }
                    };
                    if let Err(e) = scroll {
                        debug!(error = %e, "Scroll remediation failed");
                    }
                    self.observe(state).await?;
                }
                Rung::DismissOverlay => {
                    if let Err(e) = self.dispatch(&BrowserAction::ClosePopups, None).await {
                        debug!(error = %e, "Overlay dismissal failed");
                    }
                    self.observe(state).await?;
                }
                Rung::NextCandidate => {
                    attempt.rank += 1;
                }
                Rung::GiveUp => {
                    let diagnostics = self.give_up_diagnostics(&failure, &attempt, &controller, &state.observation);
                    let summary = format!(
                        "Failed after {} remediation attempt(s): {}",
                        controller.attempts(),
                        failure
                    );
                    state.record(
                        PendingStep::new(call, StepOutcome::Failed, summary)
                            .with_policy(decision, confirmed)
                            .with_locator(attempt.tried.last().cloned())
                            .with_diagnostics(diagnostics),
                    );
                    return state.transition(LoopState::Planning);
                }
            }
            state.transition(LoopState::Acting)?;
        }
    }

    /// Resolve (if needed) and dispatch once
    async fn try_once(
        &self,
        action: &BrowserAction,
        target: Option<&str>,
        attempt: &mut Attempt,
    ) -> Result<ToolResult> {
        let locator = match target {
            None => None,
            Some(target) => {
                if attempt.resolution.is_none() {
                    attempt.resolution = Some(self.resolve_target(target, self.config.agent.query_limit).await?);
                }
                let locator = attempt
                    .resolution
                    .as_ref()
                    .and_then(|r| r.at(attempt.rank))
                    .cloned()
                    .ok_or_else(|| PilotError::unresolved(target, "every ranked locator was tried"))?;
                attempt.tried.push(locator.clone());
                Some(locator)
            }
        };

        let result = self.dispatch(action, locator.as_ref()).await?;
        if result.success {
            Ok(result)
        } else {
            Err(PilotError::TransientToolFailure(result.output))
        }
    }

    /// Candidates for `target`, ranked and turned into locators
    ///
    /// The candidate list is consumed here; only locators survive.
    async fn resolve_target(&self, target: &str, limit: usize) -> Result<Resolution> {
        if let Some(locator) = explicit_locator(target) {
            return Ok(Resolution {
                target: target.to_string(),
                locators: vec![locator],
            });
        }
        let candidates = self
            .with_deadline("element query", self.browser.query(target, limit))
            .await?;
        debug!(query = target, candidates = candidates.len(), "Queried candidates");
        let resolution = resolve(target, candidates)?;
        debug!(query = target, primary = ?resolution.primary().map(|l| l.to_string()), "Resolved target");
        Ok(resolution)
    }

    /// Dispatch under the action deadline; never cancelled mid-flight
    async fn dispatch(&self, action: &BrowserAction, locator: Option<&Locator>) -> Result<ToolResult> {
        self.with_deadline("browser action", self.browser.dispatch(action, locator))
            .await
    }

    /// `Acting -> Observing -> Planning` after a recorded step
    async fn settle_after_step(&self, state: &mut RunState) -> Result<()> {
        state.transition(LoopState::Observing)?;
        self.observe(state).await?;
        state.transition(LoopState::Planning)
    }

    /// Refresh the observation; failures keep the previous one unless fatal
    async fn observe(&self, state: &mut RunState) -> Result<()> {
        let screenshot = state.ctx.next_screenshot();
        let max_chars = self.config.agent.max_observation_chars;
        match self
            .with_deadline("observation", self.browser.observe(screenshot.as_deref(), max_chars))
            .await
        {
            Ok(observation) => {
                debug!(url = %observation.url, title = %observation.title, "Observed page");
                state.observation = observation;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "Observation failed, keeping the previous one");
                Ok(())
            }
        }
    }

    fn give_up_diagnostics(
        &self,
        failure: &PilotError,
        attempt: &Attempt,
        controller: &RecoveryController,
        observation: &Observation,
    ) -> Vec<String> {
        let locators = if attempt.tried.is_empty() {
            "none (target never resolved)".to_string()
        } else {
            attempt
                .tried
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut strategies: Vec<&str> = Vec::new();
        for locator in &attempt.tried {
            if !strategies.contains(&locator.strategy.name()) {
                strategies.push(locator.strategy.name());
            }
        }

        vec![
            format!("last error: {}", failure),
            format!("attempted locators: {}", locators),
            format!(
                "attempted strategies: {}",
                if strategies.is_empty() {
                    "none".to_string()
                } else {
                    strategies.join(", ")
                }
            ),
            format!("rungs tried: {}", rung_list(controller.attempted())),
            format!(
                "final observation: {} ({})",
                observation.url, observation.title
            ),
        ]
    }

    /// Suspension point: deadline plus cancellation
    async fn suspend<T>(&self, what: &str, limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PilotError::Cancelled),
            result = tokio::time::timeout(limit, fut) => {
                result.unwrap_or_else(|_| Err(PilotError::Timeout(what.to_string())))
            }
        }
    }

    /// Browser call under the action deadline only
    async fn with_deadline<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.action_timeout(), fut)
            .await
            .unwrap_or_else(|_| Err(PilotError::Timeout(what.to_string())))
    }
}

fn rung_list(rungs: &[Rung]) -> String {
    if rungs.is_empty() {
        return "none".to_string();
    }
    rungs.iter().map(|r| r.name()).collect::<Vec<_>>().join(", ")
}

/// Read-only query result shown to the reasoning service
fn describe_resolution(resolution: &Resolution) -> String {
    let lines: Vec<String> = resolution
        .locators
        .iter()
        .map(|l| format!("{}. css={} ({})", l.rank + 1, l.selector, l.strategy))
        .collect();
    format!(
        "Found {} element(s) for '{}':\n{}",
        resolution.locators.len(),
        resolution.target,
        lines.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LocatorStrategy;

    #[test]
    fn test_describe_resolution() {
        let resolution = Resolution {
            target: "Search".to_string(),
            locators: vec![
                Locator {
                    selector: "[name=\"q\"]".to_string(),
                    strategy: LocatorStrategy::StableAttribute,
                    rank: 0,
                },
                Locator {
                    selector: "input:has-text(\"Search\")".to_string(),
                    strategy: LocatorStrategy::TextMatch,
                    rank: 1,
                },
            ],
        };
        let text = describe_resolution(&resolution);
        assert!(text.starts_with("Found 2 element(s) for 'Search':"));
        assert!(text.contains("1. css=[name=\"q\"] (stable_attribute)"));
        assert!(text.contains("2. css=input:has-text(\"Search\") (text_match)"));
    }

    #[test]
    fn test_rung_list() {
        assert_eq!(rung_list(&[]), "none");
        assert_eq!(
            rung_list(&[Rung::WaitAndRecheck, Rung::ScrollIntoView]),
            "wait, scroll"
        );
    }
}
