//! Scripted provider adapters for unit tests.

use crate::error::LlmError;
use crate::llm::model::ProviderKind;
use crate::llm::providers::{CompletionRequest, ProviderAdapter};
use crate::message::ChatMessage;

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail,
    RateLimited,
}

pub struct FakeProvider {
    kind: ProviderKind,
    reply: Reply,
    calls: AtomicUsize,
    last_model: Mutex<Option<String>>,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind, reply: Reply) -> Self {
        Self {
            kind,
            reply,
            calls: AtomicUsize::new(0),
            last_model: Mutex::new(None),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Calls that got past the cancellation check.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_model(&self) -> Option<String> {
        self.last_model.lock().unwrap().clone()
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_model.lock().unwrap() = Some(request.model.clone());
        *self.last_messages.lock().unwrap() = request.messages.clone();

        match &self.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail => Err(LlmError::ProviderRequest(format!("{} is down", self.kind))),
            Reply::RateLimited => Err(LlmError::RateLimited {
                provider: self.kind.to_string(),
                message: "You exceeded your current quota".into(),
            }),
        }
    }
}

/// Serve `router` on a random loopback port and return its base URL.
pub async fn spawn_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let address = listener.local_addr().expect("stub listener addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    format!("http://{address}")
}
