//! HTTP implementation of the Backend Gateway: JSON over POST, plus a
//! multipart upload for images.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::wire::{
    WireAnswerGrade, WireChatRequest, WireChatResponse, WireErrorBody, WireFlagRequest,
    WireProfile, WireQuizAnswerRequest, WireQuizRequest, WireQuizResponse,
};
use super::{
    BackendGateway, BackendTarget, ChatReply, ChatRequest, FlagRequest, GatewayError,
    ImageRequest, LearnerContext, QuizAnswerRequest,
};
use crate::metrics;
use crate::quiz::{AnswerGrade, QuizQuestion};

pub struct HttpGateway {
    target: BackendTarget,
    http_client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(target: BackendTarget, timeout: Duration) -> anyhow::Result<Self> {
        info!("Backend gateway initialized with target: {}", target.get());
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self { target, http_client })
    }

    async fn post_json<B, R>(&self, route: &'static str, url: String, body: &B) -> Result<R, GatewayError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        debug!("POST {}", url);
        let started = Instant::now();
        let result = match self.http_client.post(&url).json(body).send().await {
            Ok(response) => read_response(response).await,
            Err(e) => Err(transport_error(e)),
        };
        record(route, started, &result);
        result
    }

    /// POST whose response body is ignored; only the status matters.
    async fn post_ack<B>(&self, route: &'static str, url: String, body: &B) -> Result<(), GatewayError>
    where
        B: Serialize + Sync,
    {
        debug!("POST {}", url);
        let started = Instant::now();
        let result = match self.http_client.post(&url).json(body).send().await {
            Ok(response) => check_status(response).await.map(|_| ()),
            Err(e) => Err(transport_error(e)),
        };
        record(route, started, &result);
        result
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Network("request timed out".to_string())
    } else {
        GatewayError::Network(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<WireErrorBody>(&body)
        .ok()
        .and_then(|b| b.detail_text());
    Err(GatewayError::Backend { status: status.as_u16(), detail })
}

async fn read_response<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, GatewayError> {
    check_status(response)
        .await?
        .json::<R>()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                transport_error(e)
            } else {
                GatewayError::Decode(e.to_string())
            }
        })
}

fn record<T>(route: &str, started: Instant, result: &Result<T, GatewayError>) {
    let elapsed = started.elapsed();
    metrics::observe_gateway_latency(elapsed.as_secs_f64());
    match result {
        Ok(_) => {
            metrics::inc_gateway_request(route, "ok");
            debug!("{} succeeded in {:?}", route, elapsed);
        }
        Err(e) => {
            metrics::inc_gateway_request(route, e.outcome_label());
            warn!("{} failed after {:?}: {}", route, elapsed, e);
        }
    }
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, GatewayError> {
        let ctx = &request.context;
        let body = WireChatRequest {
            message: &request.message,
            session_id: &ctx.session_id,
            profile: WireProfile::from_context(ctx),
            xp: ctx.xp,
            explain: request.explain,
            persona: ctx.persona.as_str(),
            language: &ctx.language,
        };
        let wire: WireChatResponse = self.post_json("chat", self.target.chat_url(), &body).await?;
        wire.into_reply(ctx.xp)
    }

    async fn quiz(&self, context: &LearnerContext) -> Result<Vec<QuizQuestion>, GatewayError> {
        let body = WireQuizRequest {
            session_id: &context.session_id,
            profile: WireProfile::from_context(context),
            language: &context.language,
        };
        let wire: WireQuizResponse = self.post_json("quiz", self.target.quiz_url(), &body).await?;
        wire.validate()
    }

    async fn quiz_answer(&self, request: &QuizAnswerRequest) -> Result<AnswerGrade, GatewayError> {
        let body = WireQuizAnswerRequest {
            question: &request.question,
            answer: &request.answer,
            session_id: &request.context.session_id,
            profile: WireProfile::from_context(&request.context),
        };
        let wire: WireAnswerGrade = self
            .post_json("quiz_answer", self.target.quiz_answer_url(), &body)
            .await?;
        Ok(wire.into())
    }

    async fn image(&self, request: &ImageRequest) -> Result<ChatReply, GatewayError> {
        let ctx = &request.context;
        let profile = serde_json::to_string(&WireProfile::from_context(ctx))
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        let part = reqwest::multipart::Part::bytes(request.image.to_vec())
            .file_name(request.file_name.clone());
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("sessionId", ctx.session_id.clone())
            .text("profile", profile)
            .text("xp", ctx.xp.to_string())
            .text("persona", ctx.persona.as_str().to_string());

        let url = self.target.image_url();
        debug!("POST {} (multipart, {} bytes)", url, request.image.len());
        let started = Instant::now();
        let result = match self.http_client.post(&url).multipart(form).send().await {
            Ok(response) => read_response::<WireChatResponse>(response)
                .await
                .and_then(|wire| wire.into_reply(ctx.xp)),
            Err(e) => Err(transport_error(e)),
        };
        record("image", started, &result);
        result
    }

    async fn flag(&self, request: &FlagRequest) -> Result<(), GatewayError> {
        let body = WireFlagRequest {
            message: &request.message,
            reason: &request.reason,
            sender: request.sender.as_str(),
            session_id: &request.session_id,
        };
        self.post_ack("flag", self.target.flag_url(), &body).await
    }
}
