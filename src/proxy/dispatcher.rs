//! # 请求调度器
//!
//! 转发主路径：候选端点选择 → 上游调用 → 重试/凭证轮换/失败转移 →
//! 无可用组时挂起等待恢复。SSE 响应按字节原样回写客户端，同时旁路
//! 经过 token 解析器提取用量。

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use chrono::Utc;
use rand::Rng;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::token_parser::{parse_usage_value, TokenParser, STATUS_ERROR_API};
use crate::config::AppConfig;
use crate::endpoint::{Credential, Endpoint, EndpointManager};
use crate::error::{ProxyError, Result};
use crate::monitoring::{Monitoring, SuspendedConnection};
use crate::pricing::ModelPricingService;
use crate::tracking::{calculate_cost_v2, ActiveRequest, HotPool, RequestStatus, TokenUsage};
use crate::utils::event_stream::SseLineBuffer;

/// 不透传到上游的请求头
const SKIPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "authorization",
    "x-api-key",
];

/// 不回写给客户端的响应头
const SKIPPED_RESPONSE_HEADERS: &[&str] = &["content-length", "transfer-encoding", "connection"];

/// 进入调度器的一次客户端请求
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub request_id: String,
    pub client_ip: String,
    pub user_agent: String,
    pub method: Method,
    /// 含 query 的完整路径
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    /// 是否为流式请求：请求体 `"stream": true` 或 Accept 指明 SSE
    #[must_use]
    pub fn wants_streaming(&self) -> bool {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&self.body) {
            if value.get("stream").and_then(serde_json::Value::as_bool) == Some(true) {
                return true;
            }
        }
        self.headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("text/event-stream"))
    }

    /// 请求体中声明的模型名
    #[must_use]
    pub fn requested_model(&self) -> Option<String> {
        serde_json::from_slice::<serde_json::Value>(&self.body)
            .ok()?
            .get("model")?
            .as_str()
            .map(str::to_string)
    }
}

enum UpstreamReply {
    /// SSE 流式响应，交给旁路泵转发
    Stream {
        status: StatusCode,
        headers: HeaderMap,
        response: reqwest::Response,
    },
    /// 完整响应体
    Full {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
}

struct DispatchState {
    last_endpoint: String,
    last_group: String,
    retry_count: u32,
    suspend_deadline: Option<Instant>,
}

/// 请求调度器
pub struct Dispatcher {
    config: Arc<AppConfig>,
    endpoint_manager: Arc<EndpointManager>,
    hot_pool: Arc<HotPool>,
    monitoring: Arc<Monitoring>,
    pricing: Arc<ModelPricingService>,
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(
        config: Arc<AppConfig>,
        endpoint_manager: Arc<EndpointManager>,
        hot_pool: Arc<HotPool>,
        monitoring: Arc<Monitoring>,
        pricing: Arc<ModelPricingService>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProxyError::internal_with_source("创建上游客户端失败", e))?;

        Ok(Self {
            config,
            endpoint_manager,
            hot_pool,
            monitoring,
            pricing,
            client,
        })
    }

    /// 调度一次客户端请求，返回写回客户端的响应
    pub async fn dispatch(&self, inbound: InboundRequest) -> Response {
        let is_streaming = inbound.wants_streaming();
        let request = ActiveRequest::new(
            inbound.request_id.clone(),
            inbound.client_ip.clone(),
            inbound.user_agent.clone(),
            inbound.method.as_str(),
            inbound.path_and_query.clone(),
            is_streaming,
        );

        if let Err(err) = self.hot_pool.add(request) {
            tracing::warn!("[{}] 请求被热池拒绝: {err}", inbound.request_id);
            return error_response(&err, &inbound.request_id, None);
        }

        let mut state = DispatchState {
            last_endpoint: String::new(),
            last_group: String::new(),
            retry_count: 0,
            suspend_deadline: None,
        };

        match self.dispatch_inner(&inbound, &mut state).await {
            Ok(response) => response,
            Err(err) => {
                self.finalize_failure(&inbound.request_id, &state.last_endpoint, &err);
                error_response(&err, &inbound.request_id, Some(&state.last_endpoint))
            }
        }
    }

    async fn dispatch_inner(
        &self,
        inbound: &InboundRequest,
        state: &mut DispatchState,
    ) -> Result<Response> {
        let global_deadline = Instant::now() + self.config.server.global_timeout();
        let notify = self.endpoint_manager.group_manager().recovery_notify();
        let mut suspended = false;

        loop {
            if Instant::now() >= global_deadline {
                return Err(ProxyError::suspend_timeout(
                    "请求处理超过全局超时",
                    (!state.last_endpoint.is_empty()).then(|| state.last_endpoint.clone()),
                ));
            }

            // 先占住唤醒信号，避免候选检查与等待之间丢通知
            let mut notified = std::pin::pin!(notify.notified());
            notified.as_mut().enable();

            let candidates = self.endpoint_manager.candidate_endpoints();
            if !candidates.is_empty() {
                if suspended {
                    suspended = false;
                    self.monitoring.resume_suspended(&inbound.request_id);
                    tracing::info!("[{}] 挂起请求恢复调度", inbound.request_id);
                }

                match self.try_candidates(inbound, state, &candidates).await? {
                    Some(response) => return Ok(response),
                    None => {
                        // 本轮候选全部失败；自动切组后再试
                        if self.config.group.auto_switch_between_groups
                            && !state.last_group.is_empty()
                        {
                            if self
                                .endpoint_manager
                                .group_manager()
                                .failover_to_next_group(&state.last_group)
                                .is_some()
                            {
                                continue;
                            }
                        }
                    }
                }
            }

            // 没有候选或全部失败：按配置挂起等待，或直接失败
            if !self.config.request_suspend.enabled {
                return Err(ProxyError::upstream_transient(
                    "所有活跃组的端点均不可用",
                ));
            }

            let deadline = *state
                .suspend_deadline
                .get_or_insert_with(|| Instant::now() + self.config.request_suspend.timeout());
            if Instant::now() >= deadline {
                self.monitoring.timeout_suspended(&inbound.request_id);
                return Err(ProxyError::suspend_timeout(
                    "挂起等待端点恢复超时",
                    (!state.last_endpoint.is_empty()).then(|| state.last_endpoint.clone()),
                ));
            }

            if !suspended {
                suspended = true;
                self.register_suspended(inbound, state);
            }

            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                    self.monitoring.timeout_suspended(&inbound.request_id);
                    return Err(ProxyError::suspend_timeout(
                        "挂起等待端点恢复超时",
                        (!state.last_endpoint.is_empty()).then(|| state.last_endpoint.clone()),
                    ));
                }
            }
        }
    }

    /// 依次尝试候选端点；全部失败返回 `Ok(None)`，确定性失败直接透传
    async fn try_candidates(
        &self,
        inbound: &InboundRequest,
        state: &mut DispatchState,
        candidates: &[(String, Endpoint)],
    ) -> Result<Option<Response>> {
        for (group_name, endpoint) in candidates {
            state.last_endpoint = endpoint.config.name.clone();
            state.last_group = group_name.clone();
            let _ = self.hot_pool.update(&inbound.request_id, |r| {
                r.status = RequestStatus::Forwarding;
                r.endpoint_name = endpoint.config.name.clone();
                r.group_name = group_name.clone();
            });

            match self.try_endpoint(inbound, state, endpoint).await {
                Ok(reply) => {
                    return Ok(Some(self.deliver(inbound, endpoint, reply).await));
                }
                Err(err @ ProxyError::UpstreamFatal { .. }) => {
                    // 非认证类 4xx 原样透传给客户端
                    self.finalize_failure(&inbound.request_id, &state.last_endpoint, &err);
                    return Ok(Some(passthrough_response(&err)));
                }
                Err(err) => {
                    tracing::warn!(
                        "[{}] 端点 {} 调用失败, 转移下一候选: {err}",
                        inbound.request_id,
                        endpoint.config.name
                    );
                }
            }
        }
        Ok(None)
    }

    /// 单端点内的重试与凭证轮换
    async fn try_endpoint(
        &self,
        inbound: &InboundRequest,
        state: &mut DispatchState,
        endpoint: &Endpoint,
    ) -> Result<UpstreamReply> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut rotated = false;
        let mut attempt: u32 = 0;

        loop {
            match self.forward_once(inbound, endpoint).await {
                Ok(reply) => return Ok(reply),
                Err(err) => match &err {
                    ProxyError::UpstreamAuth { status, .. } if !rotated => {
                        // 凭证失效：轮换一次后原端点重试，避免无限循环
                        let Ok(rotated_to) = self
                            .endpoint_manager
                            .rotate_credential(&endpoint.config.name)
                        else {
                            return Err(err);
                        };
                        rotated = true;
                        self.bump_retry(inbound, state);
                        tracing::warn!(
                            "🔑 [{}] 端点 {} 凭证失效 (HTTP {status}), 已轮换至 {rotated_to} 重试",
                            inbound.request_id,
                            endpoint.config.name
                        );
                    }
                    e if e.is_retriable() => {
                        attempt += 1;
                        if attempt >= max_attempts {
                            return Err(err);
                        }
                        self.bump_retry(inbound, state);
                        let delay = self.backoff_delay(attempt);
                        tracing::debug!(
                            "[{}] 端点 {} 第 {attempt} 次重试, 退避 {delay:?}",
                            inbound.request_id,
                            endpoint.config.name
                        );
                        tokio::time::sleep(delay).await;
                    }
                    _ => return Err(err),
                },
            }
        }
    }

    /// 一次上游调用
    async fn forward_once(
        &self,
        inbound: &InboundRequest,
        endpoint: &Endpoint,
    ) -> Result<UpstreamReply> {
        let url = format!(
            "{}{}",
            endpoint.config.url.trim_end_matches('/'),
            inbound.path_and_query
        );

        let mut builder = self
            .client
            .request(inbound.method.clone(), &url)
            .timeout(endpoint.config.timeout())
            .body(inbound.body.clone());

        for (name, value) in &inbound.headers {
            if !SKIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
                builder = builder.header(name, value);
            }
        }
        match self.endpoint_manager.active_credential(&endpoint.config.name) {
            Some(Credential::Bearer(token)) => {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            Some(Credential::ApiKey(key)) => {
                builder = builder.header("x-api-key", key);
            }
            None => {}
        }

        let response = builder.send().await.map_err(|e| {
            ProxyError::upstream_transient_with_source(
                format!("上游 {} 连接失败", endpoint.config.name),
                e,
            )
        })?;

        let status = response.status();
        if status.is_success() {
            let headers = response.headers().clone();
            let is_sse = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains("text/event-stream"));

            if is_sse {
                return Ok(UpstreamReply::Stream {
                    status: StatusCode::from_u16(status.as_u16())
                        .unwrap_or(StatusCode::OK),
                    headers,
                    response,
                });
            }
            let body = response.bytes().await.map_err(|e| {
                ProxyError::upstream_transient_with_source("读取上游响应失败", e)
            })?;
            return Ok(UpstreamReply::Full {
                status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK),
                headers,
                body,
            });
        }

        let status_u16 = status.as_u16();
        if status_u16 == 401 || status_u16 == 403 {
            return Err(ProxyError::upstream_auth(
                format!("端点 {} 凭证被拒绝", endpoint.config.name),
                status_u16,
            ));
        }
        if status_u16 == 408 || status_u16 == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::upstream_transient(format!(
                "上游 {} 返回 HTTP {status_u16}: {}",
                endpoint.config.name,
                truncate(&body, 200)
            )));
        }

        let body = response.bytes().await.unwrap_or_default();
        Err(ProxyError::UpstreamFatal {
            status: status_u16,
            body,
        })
    }

    /// 把上游回复交付给客户端并完成请求收尾
    async fn deliver(
        &self,
        inbound: &InboundRequest,
        endpoint: &Endpoint,
        reply: UpstreamReply,
    ) -> Response {
        match reply {
            UpstreamReply::Full {
                status,
                headers,
                body,
            } => {
                let value = serde_json::from_slice::<serde_json::Value>(&body).ok();
                let usage = value
                    .as_ref()
                    .and_then(|v| v.get("usage"))
                    .and_then(parse_usage_value);
                let model = value
                    .as_ref()
                    .and_then(|v| v.get("model"))
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
                    .or_else(|| inbound.requested_model());

                self.finalize_success(&inbound.request_id, endpoint, usage, model, false)
                    .await;
                build_response(status, &headers, Body::from(body))
            }
            UpstreamReply::Stream {
                status,
                headers,
                response,
            } => {
                let _ = self.hot_pool.update(&inbound.request_id, |r| {
                    r.status = RequestStatus::Streaming;
                });

                let (tx, rx) = mpsc::channel::<std::result::Result<Bytes, io::Error>>(32);
                self.spawn_stream_pump(inbound, endpoint, response, tx);

                build_response(status, &headers, Body::from_stream(ReceiverStream::new(rx)))
            }
        }
    }

    /// SSE 旁路泵：字节原样转发，文本行进解析器，流结束后收尾
    fn spawn_stream_pump(
        &self,
        inbound: &InboundRequest,
        endpoint: &Endpoint,
        response: reqwest::Response,
        tx: mpsc::Sender<std::result::Result<Bytes, io::Error>>,
    ) {
        let request_id = inbound.request_id.clone();
        let requested_model = inbound.requested_model();
        let endpoint = endpoint.clone();
        let hot_pool = Arc::clone(&self.hot_pool);
        let monitoring = Arc::clone(&self.monitoring);
        let pricing = Arc::clone(&self.pricing);

        tokio::spawn(async move {
            let mut parser = TokenParser::with_request_id(&request_id);
            let mut lines = SseLineBuffer::new();
            let mut stream = response.bytes_stream();
            let mut upstream_error = false;
            let mut api_error = false;

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        for line in lines.push(&bytes) {
                            if let Some(result) = parser.parse_sse_line(&line) {
                                if result.status == STATUS_ERROR_API {
                                    api_error = true;
                                    if let Some(err) = &result.error_info {
                                        tracing::warn!(
                                            "[{request_id}] 上游流内错误: {} - {}",
                                            err.error_type,
                                            err.message
                                        );
                                    }
                                }
                            }
                        }
                        if tx.send(Ok(bytes)).await.is_err() {
                            // 客户端已断开
                            upstream_error = true;
                            break;
                        }
                    }
                    Err(err) => {
                        upstream_error = true;
                        let _ = tx
                            .send(Err(io::Error::new(io::ErrorKind::Other, err)))
                            .await;
                        break;
                    }
                }
            }
            if let Some(last) = lines.finish() {
                let _ = parser.parse_sse_line(&last);
            }

            let usage = parser.get_final_usage();
            let model = parser
                .model_name()
                .map(str::to_string)
                .or(requested_model);
            let failed = upstream_error || api_error;

            finalize_request(
                &hot_pool,
                &monitoring,
                &pricing,
                &request_id,
                &endpoint,
                usage,
                model,
                failed,
            )
            .await;
        });
    }

    async fn finalize_success(
        &self,
        request_id: &str,
        endpoint: &Endpoint,
        usage: Option<TokenUsage>,
        model: Option<String>,
        failed: bool,
    ) {
        finalize_request(
            &self.hot_pool,
            &self.monitoring,
            &self.pricing,
            request_id,
            endpoint,
            usage,
            model,
            failed,
        )
        .await;
    }

    fn finalize_failure(&self, request_id: &str, endpoint_name: &str, err: &ProxyError) {
        tracing::warn!("[{request_id}] 请求最终失败: {err}");
        let _ = self.hot_pool.complete_and_archive(request_id, |r| {
            r.status = RequestStatus::Failed;
            r.end_time = Some(Utc::now());
        });
        self.monitoring.record_failure(endpoint_name);
    }

    fn register_suspended(&self, inbound: &InboundRequest, state: &DispatchState) {
        let _ = self.hot_pool.update(&inbound.request_id, |r| {
            r.status = RequestStatus::Suspended;
        });
        self.monitoring.add_suspended(SuspendedConnection {
            id: inbound.request_id.clone(),
            client_ip: inbound.client_ip.clone(),
            method: inbound.method.to_string(),
            path: inbound.path_and_query.clone(),
            endpoint: state.last_endpoint.clone(),
            suspended_at: Utc::now(),
            retry_count: state.retry_count,
            user_agent: inbound.user_agent.clone(),
        });
        tracing::info!(
            "⏳ [{}] 无可用端点, 请求挂起等待恢复 (最后端点: {})",
            inbound.request_id,
            if state.last_endpoint.is_empty() {
                "无"
            } else {
                &state.last_endpoint
            }
        );
    }

    fn bump_retry(&self, inbound: &InboundRequest, state: &mut DispatchState) {
        state.retry_count += 1;
        let retry_count = state.retry_count;
        let _ = self.hot_pool.update(&inbound.request_id, |r| {
            r.retry_count = retry_count;
        });
    }

    /// 指数退避 + 随机抖动
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry.base_delay();
        let max = self.config.retry.max_delay();
        let exp = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(max);
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis().max(1) as u64 / 4);
        (capped + Duration::from_millis(jitter_ms)).min(max)
    }
}

/// 统一收尾：用量计费、热池归档、监控计数
#[allow(clippy::too_many_arguments)]
async fn finalize_request(
    hot_pool: &Arc<HotPool>,
    monitoring: &Arc<Monitoring>,
    pricing: &Arc<ModelPricingService>,
    request_id: &str,
    endpoint: &Endpoint,
    usage: Option<TokenUsage>,
    model: Option<String>,
    failed: bool,
) {
    let model_name = model.unwrap_or_default();
    let record = pricing.get_pricing_or_default(&model_name).await;
    let model_pricing = record.to_model_pricing();
    let breakdown = calculate_cost_v2(
        usage.as_ref(),
        Some(&model_pricing),
        endpoint.config.multiplier.as_ref(),
    );

    let status = if failed {
        RequestStatus::Failed
    } else {
        RequestStatus::Completed
    };
    let _ = hot_pool.complete_and_archive(request_id, |r| {
        r.status = status;
        r.end_time = Some(Utc::now());
        r.model_name = model_name.clone();
        if let Some(usage) = usage {
            r.usage = usage;
        }
        r.total_cost = breakdown.total_cost;
    });

    let response_time = hot_pool
        .get(request_id)
        .map(|r| r.duration().to_std().unwrap_or_default())
        .unwrap_or_default();

    if failed {
        monitoring.record_failure(&endpoint.config.name);
    } else {
        monitoring.record_success(&endpoint.config.name, response_time);
        tracing::info!(
            "✅ [{request_id}] 请求完成: 端点={}, 模型={}, tokens={}/{}, 费用=${:.6}",
            endpoint.config.name,
            if model_name.is_empty() { "unknown" } else { &model_name },
            usage.map_or(0, |u| u.input_tokens),
            usage.map_or(0, |u| u.output_tokens),
            breakdown.total_cost
        );
    }
}

fn build_response(status: StatusCode, upstream_headers: &HeaderMap, body: Body) -> Response {
    let mut builder = Response::builder().status(status);
    for (name, value) in upstream_headers {
        if !SKIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            builder = builder.header(name, value);
        }
    }
    builder.body(body).unwrap_or_else(|_| {
        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::empty())
            .expect("fallback response")
    })
}

fn passthrough_response(err: &ProxyError) -> Response {
    let ProxyError::UpstreamFatal { status, body } = err else {
        return error_response(err, "", None);
    };
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY));
    builder = builder.header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    builder
        .body(Body::from(body.clone()))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::BAD_GATEWAY)
                .body(Body::empty())
                .expect("fallback response")
        })
}

fn error_response(err: &ProxyError, request_id: &str, last_endpoint: Option<&str>) -> Response {
    let mut payload = json!({ "error": err.to_string(), "code": err.error_code() });
    if !request_id.is_empty() {
        payload["request_id"] = json!(request_id);
    }
    if let Some(endpoint) = last_endpoint.filter(|e| !e.is_empty()) {
        payload["last_endpoint"] = json!(endpoint);
    }

    Response::builder()
        .status(err.status_code())
        .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_str(request_id).unwrap_or(HeaderValue::from_static("unknown")),
        )
        .body(Body::from(payload.to_string()))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .expect("fallback response")
        })
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(body: &str, accept: Option<&str>) -> InboundRequest {
        let mut headers = HeaderMap::new();
        if let Some(accept) = accept {
            headers.insert(header::ACCEPT, HeaderValue::from_str(accept).unwrap());
        }
        InboundRequest {
            request_id: "req-test".to_string(),
            client_ip: "127.0.0.1".to_string(),
            user_agent: "test".to_string(),
            method: Method::POST,
            path_and_query: "/v1/messages".to_string(),
            headers,
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn streaming_detection() {
        assert!(inbound(r#"{"model":"claude-3","stream":true}"#, None).wants_streaming());
        assert!(!inbound(r#"{"model":"claude-3","stream":false}"#, None).wants_streaming());
        assert!(!inbound(r#"{"model":"claude-3"}"#, None).wants_streaming());
        assert!(inbound("{}", Some("text/event-stream")).wants_streaming());
    }

    #[test]
    fn requested_model_extraction() {
        assert_eq!(
            inbound(r#"{"model":"claude-opus-4-5"}"#, None).requested_model(),
            Some("claude-opus-4-5".to_string())
        );
        assert_eq!(inbound("not json", None).requested_model(), None);
    }

    #[test]
    fn error_response_carries_structured_fields() {
        let err = ProxyError::suspend_timeout("挂起等待端点恢复超时", Some("primary".to_string()));
        let response = error_response(&err, "req-1", Some("primary"));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
