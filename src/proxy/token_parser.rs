//! SSE token 用量解析器
//!
//! 逐行消费上游 `text/event-stream` 文本，从 `message_start` /
//! `message_delta` / `error` 事件中提取模型名、token 用量与错误信息。
//! 解析器不改动字节流本身，每个请求一个实例，单线程使用。

use serde::Deserialize;
use serde_json::Value;

use crate::tracking::TokenUsage;

/// 请求正常完成
pub const STATUS_COMPLETED: &str = "completed";
/// `message_delta` 未携带 usage（非 token 响应）
pub const STATUS_NON_TOKEN_RESPONSE: &str = "non_token_response";
/// 上游通过 SSE error 事件返回 API 错误
pub const STATUS_ERROR_API: &str = "error_api";

/// 上游 error 事件的结构化信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub error_type: String,
    pub message: String,
}

/// 一次解析的产出
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub token_usage: TokenUsage,
    pub is_completed: bool,
    pub status: String,
    pub model_name: String,
    pub error_info: Option<ErrorInfo>,
}

/// 按请求维度的 SSE 解析器
pub struct TokenParser {
    request_id: String,
    current_event: Option<String>,
    model_name: Option<String>,
    initial_usage: Option<TokenUsage>,
    final_usage: Option<TokenUsage>,
}

impl Default for TokenParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenParser {
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id("unknown")
    }

    #[must_use]
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            current_event: None,
            model_name: None,
            initial_usage: None,
            final_usage: None,
        }
    }

    /// 喂入一行 SSE 文本；行不携带用量信息时返回 `None`
    pub fn parse_sse_line(&mut self, line: &str) -> Option<ParseResult> {
        let line = line.trim_end_matches('\r');

        if line.is_empty() {
            self.current_event = None;
            return None;
        }
        if let Some(event) = line.strip_prefix("event:") {
            self.current_event = Some(event.trim().to_string());
            return None;
        }
        let Some(payload) = line.strip_prefix("data:") else {
            return None;
        };
        let payload = payload.trim();

        match self.current_event.as_deref() {
            Some("message_start") => {
                self.handle_message_start(payload);
                None
            }
            Some("message_delta") => Some(self.handle_message_delta(payload)),
            Some("error") => Some(self.handle_error(payload)),
            _ => None,
        }
    }

    /// 最终用量：优先 `message_delta` 的终值，退化到 `message_start` 的初值
    #[must_use]
    pub fn get_final_usage(&self) -> Option<TokenUsage> {
        self.final_usage.or(self.initial_usage)
    }

    /// 从 `message_start` 记录到的模型名
    #[must_use]
    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    fn handle_message_start(&mut self, payload: &str) {
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            tracing::debug!("[{}] message_start 数据解析失败", self.request_id);
            return;
        };
        let Some(message) = value.get("message") else {
            return;
        };

        if let Some(model) = message.get("model").and_then(Value::as_str) {
            self.model_name = Some(model.to_string());
        }
        if let Some(usage) = message.get("usage") {
            self.initial_usage = parse_usage_value(usage);
        }
    }

    fn handle_message_delta(&mut self, payload: &str) -> ParseResult {
        let usage = serde_json::from_str::<Value>(payload)
            .ok()
            .as_ref()
            .and_then(|v| v.get("usage"))
            .and_then(parse_usage_value);

        match usage {
            Some(usage) => {
                // delta 中的 usage 是本次请求的最终计数
                self.final_usage = Some(usage);
                ParseResult {
                    token_usage: usage,
                    is_completed: true,
                    status: STATUS_COMPLETED.to_string(),
                    model_name: self.model_name.clone().unwrap_or_default(),
                    error_info: None,
                }
            }
            None => ParseResult {
                token_usage: TokenUsage::default(),
                is_completed: true,
                status: STATUS_NON_TOKEN_RESPONSE.to_string(),
                model_name: "default".to_string(),
                error_info: None,
            },
        }
    }

    fn handle_error(&mut self, payload: &str) -> ParseResult {
        let (error_type, message) = serde_json::from_str::<Value>(payload)
            .ok()
            .as_ref()
            .and_then(|v| v.get("error"))
            .map_or_else(
                || ("unknown_error".to_string(), String::new()),
                |err| {
                    (
                        err.get("type")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown_error")
                            .to_string(),
                        err.get("message")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    )
                },
            );

        ParseResult {
            token_usage: TokenUsage::default(),
            is_completed: true,
            status: STATUS_ERROR_API.to_string(),
            model_name: format!("error:{error_type}"),
            error_info: Some(ErrorInfo {
                error_type,
                message,
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireCacheCreation {
    #[serde(default)]
    ephemeral_5m_input_tokens: u64,
    #[serde(default)]
    ephemeral_1h_input_tokens: u64,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation: Option<WireCacheCreation>,
}

/// 解析 Anthropic 格式的 `usage` 对象
///
/// 没有嵌套 `cache_creation` 对象时，5m/1h 分项保持 0，总量字段为准。
#[must_use]
pub fn parse_usage_value(value: &Value) -> Option<TokenUsage> {
    let wire: WireUsage = serde_json::from_value(value.clone()).ok()?;

    let (cache_5m, cache_1h) = wire
        .cache_creation
        .map_or((0, 0), |c| {
            (c.ephemeral_5m_input_tokens, c.ephemeral_1h_input_tokens)
        });

    Some(TokenUsage {
        input_tokens: wire.input_tokens,
        output_tokens: wire.output_tokens,
        cache_creation_tokens: wire.cache_creation_input_tokens,
        cache_creation_5m_tokens: cache_5m,
        cache_creation_1h_tokens: cache_1h,
        cache_read_tokens: wire.cache_read_input_tokens,
    })
}
