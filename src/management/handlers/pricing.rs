//! 模型定价管理接口

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::management::response::{display_now, ApiError};
use crate::management::server::AppState;
use crate::pricing::ModelPricingRecord;

/// `GET /api/v1/pricing`
pub async fn list_pricing(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let ctx = state.context();
    let pricings = ctx.pricing.list_pricings().await?;
    let total = pricings.len();

    Ok(Json(json!({
        "pricings": pricings,
        "total": total,
        "timestamp": display_now(),
    })))
}

/// `POST /api/v1/pricing`
pub async fn create_pricing(
    State(state): State<AppState>,
    Json(record): Json<ModelPricingRecord>,
) -> Result<Json<Value>, ApiError> {
    let ctx = state.context();
    let created = ctx.pricing.create_pricing(&record).await?;

    Ok(Json(json!({
        "success": true,
        "message": "模型定价创建成功",
        "pricing": created,
    })))
}

/// `PUT /api/v1/pricing/:model`
pub async fn update_pricing(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Json(mut record): Json<ModelPricingRecord>,
) -> Result<Json<Value>, ApiError> {
    record.model_name = model;

    let ctx = state.context();
    ctx.pricing.update_pricing(&record).await?;

    Ok(Json(json!({
        "success": true,
        "message": "模型定价更新成功",
    })))
}

/// `DELETE /api/v1/pricing/:model`
pub async fn delete_pricing(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let ctx = state.context();
    ctx.pricing.delete_pricing(&model).await?;

    Ok(Json(json!({
        "success": true,
        "message": "模型定价删除成功",
    })))
}

/// `POST /api/v1/pricing/:model/set-default`
pub async fn set_default_pricing(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let ctx = state.context();
    ctx.pricing.set_default_pricing(&model).await?;

    Ok(Json(json!({
        "success": true,
        "message": "默认定价设置成功",
    })))
}
