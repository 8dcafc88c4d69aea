//! In-process fakes for driving the orchestrator without a browser or model

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use webpilot::agent::{ConfirmationGate, ConfirmationRequest, MemoryRunLog, Orchestrator};
use webpilot::core::{Candidate, Locator, Observation, PilotError, Result, ToolResult};
use webpilot::llm::{ReasoningReply, ReasoningRequest, ReasoningService};
use webpilot::tools::browser::{BrowserAction, BrowserDriver};
use webpilot::Config;

/// One scripted answer from the fake reasoning service
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(ReasoningReply),
    Error { message: String, recoverable: bool },
    /// Never answers this turn
    Stall,
}

pub fn call(name: &str, args: Value) -> Scripted {
    Scripted::Reply(ReasoningReply::call(name, args))
}

pub fn text(content: &str) -> Scripted {
    Scripted::Reply(ReasoningReply::text(content))
}

pub fn error(message: &str, recoverable: bool) -> Scripted {
    Scripted::Error {
        message: message.to_string(),
        recoverable,
    }
}

/// Answers from a queue and remembers every request
#[derive(Default)]
pub struct ScriptedReasoning {
    script: Mutex<VecDeque<Scripted>>,
    /// Answer used once the queue is empty
    fallback: Option<Scripted>,
    requests: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedReasoning {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn repeating(answer: Scripted) -> Self {
        Self {
            fallback: Some(answer),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoning {
    async fn next_intent(&self, request: &ReasoningRequest) -> Result<ReasoningReply> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone());
        match next {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Error {
                message,
                recoverable,
            }) => Err(PilotError::reasoning(message, recoverable)),
            Some(Scripted::Stall) => {
                std::future::pending::<()>().await;
                Err(PilotError::reasoning("unreachable", false))
            }
            None => Err(PilotError::reasoning("script exhausted", false)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Never answers; only cancellation gets past it
pub struct StalledReasoning;

#[async_trait]
impl ReasoningService for StalledReasoning {
    async fn next_intent(&self, _request: &ReasoningRequest) -> Result<ReasoningReply> {
        std::future::pending::<()>().await;
        Err(PilotError::reasoning("unreachable", false))
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

/// An element on the fake page, addressed by its test id or its text
#[derive(Debug, Clone)]
pub struct FakeElement {
    pub test_id: String,
    pub tag: String,
    pub text: String,
    /// Carries a `data-testid`; bare elements only match by text
    pub stable: bool,
    /// Reports "not visible" until scrolled into view
    pub below_fold: bool,
    /// Every action on it fails as not found
    pub broken: bool,
    /// The first action on it hangs this long before answering
    pub stall: Option<Duration>,
}

impl FakeElement {
    pub fn new(test_id: &str, tag: &str, text: &str) -> Self {
        Self {
            test_id: test_id.to_string(),
            tag: tag.to_string(),
            text: text.to_string(),
            stable: true,
            below_fold: false,
            broken: false,
            stall: None,
        }
    }

    /// No attributes, id or path: only its text identifies it
    pub fn bare(tag: &str, text: &str) -> Self {
        Self {
            stable: false,
            ..Self::new(&text.to_lowercase().replace(' ', "-"), tag, text)
        }
    }

    pub fn stalls_once(mut self, duration: Duration) -> Self {
        self.stall = Some(duration);
        self
    }

    pub fn below_fold(mut self) -> Self {
        self.below_fold = true;
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn selector(&self) -> String {
        if self.stable {
            format!("[data-testid=\"{}\"]", self.test_id)
        } else {
            format!("{}:has-text(\"{}\")", self.tag, self.text)
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    url: String,
    title: String,
    scrolled: Vec<String>,
    stalled: Vec<String>,
    dispatched: Vec<(String, Option<String>)>,
    queries: Vec<String>,
    opened: bool,
    closed: bool,
}

/// Page simulation behind the browser driver contract
pub struct FakeBrowser {
    elements: Vec<FakeElement>,
    state: Mutex<PageState>,
    /// Added to every dispatch
    delay: Option<Duration>,
}

impl FakeBrowser {
    pub fn new(elements: Vec<FakeElement>) -> Self {
        Self {
            elements,
            state: Mutex::new(PageState {
                url: "about:blank".to_string(),
                ..PageState::default()
            }),
            delay: None,
        }
    }

    /// Every action takes `delay` before it answers
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(action name, selector)` for every dispatch, in order
    pub fn dispatched(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().unwrap().dispatched.clone()
    }

    pub fn dispatched_names(&self) -> Vec<String> {
        self.dispatched().into_iter().map(|(name, _)| name).collect()
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn url(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }

    fn element(&self, selector: &str) -> Option<&FakeElement> {
        self.elements.iter().find(|e| e.selector() == selector)
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn open(&self, start_url: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.opened = true;
        if let Some(url) = start_url {
            state.url = url.to_string();
        }
        Ok(())
    }

    async fn observe(&self, _screenshot: Option<&Path>, _max_text_chars: usize) -> Result<Observation> {
        let state = self.state.lock().unwrap();
        Ok(Observation::blank(state.url.clone(), state.title.clone()))
    }

    async fn query(&self, target: &str, limit: usize) -> Result<Vec<Candidate>> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(target.to_string());
        Ok(self
            .elements
            .iter()
            .take(limit)
            .map(|e| {
                let mut candidate = Candidate::new(e.tag.clone()).with_text(e.text.clone());
                if e.stable {
                    candidate = candidate.with_attribute("data-testid", e.test_id.clone());
                }
                candidate.in_viewport = !e.below_fold || state.scrolled.contains(&e.test_id);
                candidate
            })
            .collect())
    }

    async fn dispatch(&self, action: &BrowserAction, locator: Option<&Locator>) -> Result<ToolResult> {
        let stall = {
            let mut state = self.state.lock().unwrap();
            state
                .dispatched
                .push((action.name().to_string(), locator.map(|l| l.selector.clone())));
            match locator.and_then(|l| self.element(&l.selector)) {
                Some(element) if element.stall.is_some() && !state.stalled.contains(&element.test_id) => {
                    state.stalled.push(element.test_id.clone());
                    element.stall
                }
                _ => None,
            }
        };
        if let Some(wait) = stall.or(self.delay) {
            tokio::time::sleep(wait).await;
        }

        let mut state = self.state.lock().unwrap();

        match action {
            BrowserAction::Navigate { url } => {
                state.url = url.clone();
                state.title = "Loaded".to_string();
                return Ok(ToolResult::success(action.name(), format!("Opened {}", url)));
            }
            BrowserAction::CurrentUrl => {
                return Ok(ToolResult::success(action.name(), state.url.clone()));
            }
            _ => {}
        }

        let Some(locator) = locator else {
            return Ok(ToolResult::success(action.name(), "done"));
        };
        let Some(element) = self.element(&locator.selector) else {
            return Ok(ToolResult::failure(action.name(), "Element not found"));
        };

        if *action == BrowserAction::ScrollIntoView {
            state.scrolled.push(element.test_id.clone());
            return Ok(ToolResult::success(action.name(), "Scrolled into view"));
        }
        if element.broken {
            return Ok(ToolResult::failure(action.name(), "Element not found"));
        }
        if element.below_fold && !state.scrolled.contains(&element.test_id) {
            return Ok(ToolResult::failure(action.name(), "element is not visible"));
        }
        Ok(ToolResult::success(
            action.name(),
            format!("{} on {}", action.name(), element.text),
        ))
    }

    async fn screenshot(&self, path: &Path) -> Result<String> {
        Ok(path.display().to_string())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Fixed answer, with every request kept
pub struct RecordingGate {
    /// `None` never answers
    answer: Option<bool>,
    asked: Mutex<Vec<ConfirmationRequest>>,
}

impl RecordingGate {
    pub fn new(answer: bool) -> Self {
        Self {
            answer: Some(answer),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// A user who walked away from the prompt
    pub fn silent() -> Self {
        Self {
            answer: None,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<ConfirmationRequest> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationGate for RecordingGate {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        self.asked.lock().unwrap().push(request.clone());
        match self.answer {
            Some(answer) => answer,
            None => std::future::pending().await,
        }
    }
}

/// Defaults with short waits so recovery does not slow tests down
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.browser.settle_ms = 1;
    config.browser.start_url = None;
    config.agent.max_steps = 50;
    config.agent.max_run_secs = None;
    config.agent.memory_window = 10;
    config.agent.reasoning_retries = 1;
    config.timeouts.reasoning_secs = 5;
    config.timeouts.action_secs = 5;
    config.timeouts.confirmation_secs = 5;
    config
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub reasoning: Arc<ScriptedReasoning>,
    pub browser: Arc<FakeBrowser>,
    pub gate: Arc<RecordingGate>,
    pub log: MemoryRunLog,
}

impl Harness {
    pub fn new(config: Config, script: ScriptedReasoning, elements: Vec<FakeElement>, approve: bool) -> Self {
        Self::with_parts(
            config,
            script,
            FakeBrowser::new(elements),
            RecordingGate::new(approve),
        )
    }

    pub fn with_parts(config: Config, script: ScriptedReasoning, browser: FakeBrowser, gate: RecordingGate) -> Self {
        let reasoning = Arc::new(script);
        let browser = Arc::new(browser);
        let gate = Arc::new(gate);
        let orchestrator = Orchestrator::new(config, reasoning.clone(), browser.clone(), gate.clone())
            .expect("valid test configuration");
        Self {
            orchestrator,
            reasoning,
            browser,
            gate,
            log: MemoryRunLog::new(),
        }
    }

    pub fn sink(&self) -> Box<MemoryRunLog> {
        Box::new(self.log.clone())
    }
}

pub const SHORT: Duration = Duration::from_millis(50);
