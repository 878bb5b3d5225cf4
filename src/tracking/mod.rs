//! # 请求追踪模块
//!
//! 在途请求索引（热池）、token 用量与费用计算、归档写入。

pub mod archive;
pub mod cost;
pub mod hot_pool;
pub mod types;

pub use archive::{spawn_archive_writer, MemoryRequestStore, RequestStore};
pub use cost::{calculate_cost, calculate_cost_v2, CostBreakdown, EndpointMultiplier, ModelPricing};
pub use hot_pool::{ArchiveCallback, HotPool, HotPoolConfig, HotPoolStats};
pub use types::{ActiveRequest, RequestStatus, TokenUsage};
