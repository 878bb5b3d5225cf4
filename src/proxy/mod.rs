//! # 转发模块
//!
//! 请求调度（候选选择、重试、失败转移、挂起）与 SSE 用量旁路解析。

pub mod dispatcher;
pub mod server;
pub mod token_parser;

pub use dispatcher::{Dispatcher, InboundRequest};
pub use server::{generate_request_id, proxy_router, serve_proxy};
pub use token_parser::{
    parse_usage_value, ErrorInfo, ParseResult, TokenParser, STATUS_COMPLETED, STATUS_ERROR_API,
    STATUS_NON_TOKEN_RESPONSE,
};
