//! # 管理模块
//!
//! 面向仪表盘的管理与监控 API。

pub mod handlers;
pub mod response;
pub mod routes;
pub mod server;

pub use response::ApiError;
pub use routes::create_routes;
pub use server::{serve_management, AppState};
