use crate::agent::{
    AgentDecision, ConversationState, ModelAdapter, RetryPolicy, ToolDescriptor, ToolInvocation,
    ToolRegistry,
};
use crate::error::{AgentError, Result};
use crate::traits::ChatMessage;
use futures_util::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// One entry of the trace a streamed run produces.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Decision(AgentDecision),
    Observation {
        invocation: ToolInvocation,
        output: String,
    },
    Failed(String),
}

enum LoopState {
    AwaitingDecision,
    ExecutingTool(ToolInvocation),
    Done(String),
}

/// Drives propose / execute / observe until the model gives a final answer.
///
/// The loop holds no per-run state, so one instance can serve concurrent runs.
pub struct AgentLoop {
    adapter: ModelAdapter,
    tool_registry: Arc<ToolRegistry>,
    max_iterations: Option<usize>,
    retry: RetryPolicy,
}

impl AgentLoop {
    pub fn new(adapter: ModelAdapter, tool_registry: Arc<ToolRegistry>) -> Self {
        Self {
            adapter,
            tool_registry,
            max_iterations: Some(DEFAULT_MAX_ITERATIONS),
            retry: RetryPolicy::default(),
        }
    }

    /// `None` lets a run loop for as long as the model keeps asking for tools.
    pub fn with_max_iterations(mut self, max: Option<usize>) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run(&self, input: &str) -> Result<String> {
        self.run_with_history(input, vec![]).await
    }

    pub async fn run_with_history(
        &self,
        input: &str,
        chat_history: Vec<ChatMessage>,
    ) -> Result<String> {
        self.run_until_cancelled(input, chat_history, &CancellationToken::new())
            .await
    }

    pub async fn run_until_cancelled(
        &self,
        input: &str,
        chat_history: Vec<ChatMessage>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let state = ConversationState::new(input).with_chat_history(chat_history);
        self.drive(state, cancel, None).await
    }

    /// Runs on a spawned task and yields each decision and observation as it
    /// happens. The stream ends after the final decision or a `Failed` event.
    /// Dropping the stream stops the run before its next model call.
    pub fn stream(
        self: &Arc<Self>,
        input: impl Into<String>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, AgentEvent> {
        let (tx, rx) = mpsc::channel::<AgentEvent>(64);
        let agent = Arc::clone(self);
        let state = ConversationState::new(input);

        tokio::spawn(async move {
            match agent.drive(state, &cancel, Some(&tx)).await {
                Err(_) if tx.is_closed() => debug!("Event stream dropped, run stopped"),
                Err(e) => {
                    let _ = tx.send(AgentEvent::Failed(e.to_string())).await;
                }
                Ok(_) => {}
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn drive(
        &self,
        mut state: ConversationState,
        cancel: &CancellationToken,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<String> {
        let tools = self.tool_registry.list_descriptors();
        info!(
            model = self.adapter.model(),
            tools = tools.len(),
            "Running agent"
        );

        let mut iterations = 0;
        let mut current = LoopState::AwaitingDecision;

        loop {
            current = match current {
                LoopState::AwaitingDecision => {
                    if cancel.is_cancelled() || events.is_some_and(|tx| tx.is_closed()) {
                        return Err(AgentError::Cancelled);
                    }
                    if let Some(max) = self.max_iterations
                        && iterations >= max
                    {
                        return Err(AgentError::MaxIterationsExceeded(max));
                    }
                    iterations += 1;

                    let decision = self.propose_with_retry(&state, &tools, cancel).await?;
                    emit(events, AgentEvent::Decision(decision.clone())).await?;

                    match decision {
                        AgentDecision::Finish { output } => LoopState::Done(output),
                        AgentDecision::Invoke(invocation) => LoopState::ExecutingTool(invocation),
                    }
                }
                LoopState::ExecutingTool(invocation) => {
                    let output = self.tool_registry.execute(&invocation).await?;
                    debug!(tool = %invocation.tool, %output, "Tool returned");

                    emit(
                        events,
                        AgentEvent::Observation {
                            invocation: invocation.clone(),
                            output: output.clone(),
                        },
                    )
                    .await?;

                    state.record_step(invocation, output);
                    LoopState::AwaitingDecision
                }
                LoopState::Done(output) => {
                    info!(
                        iterations,
                        steps = state.intermediate_steps.len(),
                        "Agent finished"
                    );
                    return Ok(output);
                }
            };
        }
    }

    async fn propose_with_retry(
        &self,
        state: &ConversationState,
        tools: &[ToolDescriptor],
        cancel: &CancellationToken,
    ) -> Result<AgentDecision> {
        let mut attempt = 0;
        loop {
            match self.adapter.propose(state, tools).await {
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay = ?self.retry.delay_for(attempt),
                        error = %e,
                        "Retrying model call"
                    );
                    self.retry.wait(attempt, cancel).await?;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// A closed receiver means nobody is listening any more, so the run stops.
async fn emit(events: Option<&mpsc::Sender<AgentEvent>>, event: AgentEvent) -> Result<()> {
    if let Some(tx) = events {
        tx.send(event).await.map_err(|_| AgentError::Cancelled)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ToolParameter;
    use crate::providers::ScriptedProvider;
    use crate::traits::{ChatRequest, ChatResponse, Provider, Tool, ToolArguments, ToolCall};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingAdd {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Tool for CountingAdd {
        fn name(&self) -> &str {
            "add"
        }

        fn description(&self) -> &str {
            "Add two integers."
        }

        fn parameters(&self) -> Vec<ToolParameter> {
            vec![
                ToolParameter::integer("first_int", "first"),
                ToolParameter::integer("second_int", "second"),
            ]
        }

        async fn execute(&self, args: &ToolArguments) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let a = args["first_int"].as_i64().unwrap_or_default();
            let b = args["second_int"].as_i64().unwrap_or_default();
            Ok(json!(a + b))
        }
    }

    /// Stops the run from inside a tool step.
    struct StopTool {
        cancel: CancellationToken,
    }

    #[async_trait]
    impl Tool for StopTool {
        fn name(&self) -> &str {
            "stop"
        }

        fn description(&self) -> &str {
            "Cancel the current run."
        }

        fn parameters(&self) -> Vec<ToolParameter> {
            vec![]
        }

        async fn execute(&self, _args: &ToolArguments) -> anyhow::Result<Value> {
            self.cancel.cancel();
            Ok(json!("stopping"))
        }
    }

    /// Cancels the run and then fails with a retryable error.
    struct CancelThenRateLimit {
        cancel: CancellationToken,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider for CancelThenRateLimit {
        async fn chat(
            &self,
            _request: ChatRequest<'_>,
            _model: &str,
            _temperature: f64,
        ) -> Result<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cancel.cancel();
            Err(AgentError::Transport("429".into()))
        }
    }

    fn call(name: &str, arguments: Value) -> Result<ChatResponse> {
        Ok(ChatResponse {
            text: None,
            tool_calls: vec![ToolCall {
                id: format!("call_{name}"),
                name: name.into(),
                arguments: arguments.to_string(),
            }],
        })
    }

    fn answer(text: &str) -> Result<ChatResponse> {
        Ok(ChatResponse {
            text: Some(text.into()),
            tool_calls: vec![],
        })
    }

    fn agent(
        script: Vec<Result<ChatResponse>>,
    ) -> (AgentLoop, Arc<ScriptedProvider>, Arc<CountingAdd>) {
        let provider = Arc::new(ScriptedProvider::new(script));
        let add = Arc::new(CountingAdd {
            calls: AtomicUsize::new(0),
        });
        let registry = ToolRegistry::new().with_tool(add.clone()).unwrap();
        let adapter = ModelAdapter::new(provider.clone(), "test-model", 0.0);
        (
            AgentLoop::new(adapter, Arc::new(registry)),
            provider,
            add,
        )
    }

    #[tokio::test]
    async fn finish_returns_output_without_tool_calls() {
        let (agent, provider, add) = agent(vec![answer("hello")]);
        assert_eq!(agent.run("hi").await.unwrap(), "hello");
        assert_eq!(provider.requests().len(), 1);
        assert_eq!(add.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn observation_is_in_history_before_next_propose() {
        let (agent, provider, add) = agent(vec![
            call("add", json!({"first_int": 3, "second_int": 5})),
            answer("3 + 5 = 8"),
        ]);

        assert_eq!(agent.run("add 3 and 5").await.unwrap(), "3 + 5 = 8");
        assert_eq!(add.calls.load(Ordering::SeqCst), 1);

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1].messages;
        let last = second.last().unwrap();
        assert_eq!(last.role, "tool");
        assert_eq!(last.content, "8");
        assert_eq!(last.tool_call_id.as_deref(), Some("call_add"));
        assert_eq!(second[second.len() - 2].tool_calls.as_ref().unwrap()[0].name, "add");
    }

    #[tokio::test]
    async fn no_further_calls_after_finish() {
        let (agent, provider, _) = agent(vec![answer("done"), answer("never read")]);
        agent.run("hi").await.unwrap();
        assert_eq!(provider.remaining(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_fails_the_run() {
        let (agent, _, add) = agent(vec![call("divide", json!({"a": 1})), answer("unreachable")]);
        let err = agent.run("divide").await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(name) if name == "divide"));
        assert_eq!(add.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_response_surfaces_immediately() {
        let (agent, provider, _) = agent(vec![Ok(ChatResponse::default()), answer("unreachable")]);
        let err = agent.run("hi").await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse(_)));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn iteration_cap_stops_a_looping_model() {
        let script = (0..5)
            .map(|_| call("add", json!({"first_int": 1, "second_int": 1})))
            .collect();
        let (agent, _, add) = agent(script);
        let agent = agent.with_max_iterations(Some(3));

        let err = agent.run("loop forever").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxIterationsExceeded(3)));
        assert_eq!(add.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transport_errors_are_not_retried_by_default() {
        let (agent, provider, _) = agent(vec![
            Err(AgentError::Transport("503".into())),
            answer("ok"),
        ]);
        let err = agent.run("hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Transport(_)));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn transport_errors_are_retried_with_policy() {
        let (agent, provider, _) = agent(vec![
            Err(AgentError::Transport("429".into())),
            Err(AgentError::Transport("429".into())),
            answer("ok"),
        ]);
        let agent = agent.with_retry_policy(RetryPolicy::new(2, Duration::ZERO));
        assert_eq!(agent.run("hi").await.unwrap(), "ok");
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let (agent, _, _) = agent(vec![
            Err(AgentError::Transport("429".into())),
            Err(AgentError::Transport("429".into())),
            answer("ok"),
        ]);
        let agent = agent.with_retry_policy(RetryPolicy::new(1, Duration::ZERO));
        assert!(matches!(
            agent.run("hi").await,
            Err(AgentError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_before_first_propose() {
        let (agent, provider, _) = agent(vec![answer("ok")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = agent
            .run_until_cancelled("hi", vec![], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_a_tool_step_stops_before_next_propose() {
        let cancel = CancellationToken::new();
        let provider = Arc::new(ScriptedProvider::new(vec![
            call("stop", json!({})),
            answer("unreachable"),
        ]));
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(StopTool {
                cancel: cancel.clone(),
            }))
            .unwrap();
        let agent = AgentLoop::new(
            ModelAdapter::new(provider.clone(), "test-model", 0.0),
            Arc::new(registry),
        );

        let err = agent
            .run_until_cancelled("stop please", vec![], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(provider.requests().len(), 1);
        assert_eq!(provider.remaining(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_transport_retries() {
        let cancel = CancellationToken::new();
        let provider = Arc::new(CancelThenRateLimit {
            cancel: cancel.clone(),
            calls: AtomicUsize::new(0),
        });
        let agent = AgentLoop::new(
            ModelAdapter::new(provider.clone(), "test-model", 0.0),
            Arc::new(ToolRegistry::new()),
        )
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(10)));

        let err = agent
            .run_until_cancelled("hi", vec![], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_event_receiver_stops_the_run() {
        let (agent, provider, _) = agent(vec![answer("nobody listens")]);
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let err = agent
            .drive(
                ConversationState::new("hi"),
                &CancellationToken::new(),
                Some(&tx),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn chat_history_precedes_input() {
        let (agent, provider, _) = agent(vec![answer("again")]);
        agent
            .run_with_history(
                "and now?",
                vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")],
            )
            .await
            .unwrap();
        let contents: Vec<_> = provider.requests()[0]
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(&contents[1..], ["earlier", "reply", "and now?"]);
    }

    #[tokio::test]
    async fn stream_yields_decisions_and_observations() {
        let (agent, _, _) = agent(vec![
            call("add", json!({"first_int": 12, "second_int": 3})),
            answer("15"),
        ]);
        let agent = Arc::new(agent);

        let events: Vec<AgentEvent> = agent
            .stream("12 + 3", CancellationToken::new())
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], AgentEvent::Decision(AgentDecision::Invoke(i)) if i.tool == "add"));
        assert!(matches!(&events[1], AgentEvent::Observation { output, .. } if output == "15"));
        assert_eq!(
            events[2],
            AgentEvent::Decision(AgentDecision::Finish {
                output: "15".into()
            })
        );
    }

    #[tokio::test]
    async fn stream_reports_failures() {
        let (agent, _, _) = agent(vec![call("nope", json!({}))]);
        let events: Vec<AgentEvent> = Arc::new(agent)
            .stream("x", CancellationToken::new())
            .collect()
            .await;
        assert!(matches!(events.last(), Some(AgentEvent::Failed(msg)) if msg.contains("nope")));
    }
}
