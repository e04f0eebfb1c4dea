//! 上游推理服务接口：网关把它当作不透明的异步调用。
//!
//! Outbound seam to the inference provider.
//!
//! The gateway treats the provider as a black box: one async call per attempt,
//! any error type, no assumed taxonomy. Timeouts belong to the implementation.

use crate::types::Request;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Raw output of one upstream call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamResponse {
    pub text: String,
    /// Model reported by the provider, when it differs from the one requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl UpstreamResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
        }
    }
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Execute one optimized request. Called once per attempt.
    async fn call(&self, request: &Request) -> anyhow::Result<UpstreamResponse>;

    fn name(&self) -> &'static str {
        "upstream"
    }
}

/// Adapts an async closure into an [`InferenceBackend`].
///
/// ```rust
/// use ai_lib_gateway::types::Request;
/// use ai_lib_gateway::upstream::{FnBackend, InferenceBackend, UpstreamResponse};
///
/// let backend = FnBackend::new(|req: Request| async move {
///     Ok::<_, anyhow::Error>(UpstreamResponse::text(format!("echo: {}", req.prompt)))
/// });
/// assert_eq!(backend.name(), "fn");
/// ```
pub struct FnBackend<F> {
    f: F,
}

impl<F> FnBackend<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> InferenceBackend for FnBackend<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<UpstreamResponse>> + Send,
{
    async fn call(&self, request: &Request) -> anyhow::Result<UpstreamResponse> {
        (self.f)(request.clone()).await
    }

    fn name(&self) -> &'static str {
        "fn"
    }
}
