//! Scripted providers and channels for exercising orchestration without a
//! model or a subprocess.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use todoclaw_core::channel::{ChannelOpener, ToolChannel};
use todoclaw_core::credential::Credential;
use todoclaw_core::error::{ChannelError, ProviderError};
use todoclaw_core::message::{Message, MessageToolCall};
use todoclaw_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use todoclaw_core::tool::{ToolCallRequest, ToolCallResult, ToolOutcome};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue. Once the
/// queue is empty it returns the configured error, or panics.
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    error: Option<ProviderError>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            error: None,
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, thought),
            make_text_response(answer),
        ])
    }

    /// Fail with `error` once the scripted responses run out.
    pub fn failing_with(mut self, error: ProviderError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => Ok(response),
            None => match &self.error {
                Some(error) => Err(error.clone()),
                None => panic!("SequentialMockProvider: no more responses (call #{})", requests.len()),
            },
        }
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut response = make_text_response(thought);
    response.message.tool_calls = tool_calls;
    response
}

/// Helper to create a tool call with a predictable id.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

/// What a scripted channel saw.
#[derive(Debug, Default)]
pub struct ChannelLog {
    pub requests: Vec<ToolCallRequest>,
    pub closed: usize,
    pub aborted: usize,
}

static NEXT_PID: AtomicU32 = AtomicU32::new(40_000);

/// A `ToolChannel` answering from a script instead of a process.
pub struct ScriptedChannel {
    script: VecDeque<Result<ToolOutcome, ChannelError>>,
    repeat: Option<ToolOutcome>,
    log: Arc<Mutex<ChannelLog>>,
    pid: u32,
    usable: bool,
}

impl ScriptedChannel {
    pub fn new(script: Vec<Result<ToolOutcome, ChannelError>>) -> Self {
        Self {
            script: script.into(),
            repeat: None,
            log: Arc::default(),
            pid: NEXT_PID.fetch_add(1, Ordering::Relaxed),
            usable: true,
        }
    }

    /// Answer every call with `outcome`.
    pub fn repeating(outcome: ToolOutcome) -> Self {
        let mut channel = Self::new(Vec::new());
        channel.repeat = Some(outcome);
        channel
    }

    pub fn log(&self) -> Arc<Mutex<ChannelLog>> {
        self.log.clone()
    }

    pub fn requests(&self) -> Vec<ToolCallRequest> {
        self.log.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl ToolChannel for ScriptedChannel {
    async fn call(&mut self, request: ToolCallRequest) -> Result<ToolCallResult, ChannelError> {
        if !self.usable {
            return Err(ChannelError::Unusable);
        }
        let id = request.id.clone();
        self.log.lock().unwrap().requests.push(request);

        let next = match self.script.pop_front() {
            Some(next) => next,
            None => match &self.repeat {
                Some(outcome) => Ok(outcome.clone()),
                None => Err(ChannelError::ProcessExited {
                    detail: "script exhausted".into(),
                }),
            },
        };
        match next {
            Ok(outcome) => Ok(ToolCallResult { id, outcome }),
            Err(e) => {
                self.usable = false;
                Err(e)
            }
        }
    }

    async fn close(&mut self) {
        self.usable = false;
        self.log.lock().unwrap().closed += 1;
    }

    async fn abort(&mut self) {
        self.usable = false;
        self.log.lock().unwrap().aborted += 1;
    }

    fn process_id(&self) -> Option<u32> {
        Some(self.pid)
    }
}

type ChannelFactory = Box<dyn Fn() -> Result<ScriptedChannel, ChannelError> + Send + Sync>;

/// A `ChannelOpener` handing out scripted channels and recording each one.
pub struct ScriptedOpener {
    factory: ChannelFactory,
    opened: Mutex<Vec<OpenedChannel>>,
}

/// One channel handed out by a [`ScriptedOpener`].
pub struct OpenedChannel {
    pub token: String,
    pub pid: Option<u32>,
    pub log: Arc<Mutex<ChannelLog>>,
}

impl ScriptedOpener {
    pub fn new(factory: impl Fn() -> ScriptedChannel + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(move || Ok(factory())),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Every `open` fails with the error `make` builds.
    pub fn failing(make: impl Fn() -> ChannelError + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(move || Err(make())),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> std::sync::MutexGuard<'_, Vec<OpenedChannel>> {
        self.opened.lock().unwrap()
    }
}

#[async_trait]
impl ChannelOpener for ScriptedOpener {
    async fn open(&self, credential: Credential) -> Result<Box<dyn ToolChannel>, ChannelError> {
        let channel = (self.factory)()?;
        self.opened.lock().unwrap().push(OpenedChannel {
            token: credential.token().to_string(),
            pid: channel.process_id(),
            log: channel.log(),
        });
        Ok(Box::new(channel))
    }
}
