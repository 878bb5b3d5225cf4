//! 费用计算
//!
//! 所有价格均为每百万 token 的美元价；费用 = tokens × price / 1_000_000。
//! 缓存创建分 5 分钟与 1 小时两档：上游给出分项时按分项计价，只有总量时
//! 回落到 5m 价格（旧版行为）。1h 价格缺省时取 2 × input。

use serde::{Deserialize, Serialize};

use super::types::TokenUsage;

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// 模型定价（每百万 token）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
    /// 5 分钟缓存创建价
    pub cache_creation: f64,
    /// 1 小时缓存创建价；为 0 时按 2 × input 计
    pub cache_creation_1h: f64,
    pub cache_read: f64,
}

impl ModelPricing {
    /// 1h 缓存的生效价格
    #[must_use]
    pub fn effective_1h_price(&self) -> f64 {
        if self.cache_creation_1h > 0.0 {
            self.cache_creation_1h
        } else {
            self.input * 2.0
        }
    }
}

/// 端点费用倍率
///
/// `cost_multiplier > 0` 时为总体倍率模式，所有分项与总额统一缩放；
/// 否则按分项倍率逐项缩放（0 视为未设置，等同 1.0）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointMultiplier {
    pub cost_multiplier: f64,
    pub input_cost_multiplier: f64,
    pub output_cost_multiplier: f64,
    pub cache_creation_cost_multiplier: f64,
    pub cache_creation_cost_multiplier_1h: f64,
    pub cache_read_cost_multiplier: f64,
}

impl EndpointMultiplier {
    fn has_category_multipliers(&self) -> bool {
        self.input_cost_multiplier > 0.0
            || self.output_cost_multiplier > 0.0
            || self.cache_creation_cost_multiplier > 0.0
            || self.cache_creation_cost_multiplier_1h > 0.0
            || self.cache_read_cost_multiplier > 0.0
    }
}

fn effective(multiplier: f64) -> f64 {
    if multiplier > 0.0 {
        multiplier
    } else {
        1.0
    }
}

/// 费用分解结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    /// 缓存创建总费用（5m + 1h）
    pub cache_creation_cost: f64,
    pub cache_creation_5m_cost: f64,
    pub cache_creation_1h_cost: f64,
    pub cache_read_cost: f64,
    pub total_cost: f64,
}

/// 计算一次请求的费用分解
///
/// `usage` 或 `pricing` 缺失时返回全零分解。
#[must_use]
pub fn calculate_cost_v2(
    usage: Option<&TokenUsage>,
    pricing: Option<&ModelPricing>,
    multiplier: Option<&EndpointMultiplier>,
) -> CostBreakdown {
    let (Some(usage), Some(pricing)) = (usage, pricing) else {
        return CostBreakdown::default();
    };

    let per_million = |tokens: u64, price: f64| tokens as f64 * price / TOKENS_PER_MILLION;

    let mut breakdown = CostBreakdown {
        input_cost: per_million(usage.input_tokens, pricing.input),
        output_cost: per_million(usage.output_tokens, pricing.output),
        cache_read_cost: per_million(usage.cache_read_tokens, pricing.cache_read),
        ..CostBreakdown::default()
    };

    if usage.cache_creation_5m_tokens > 0 || usage.cache_creation_1h_tokens > 0 {
        breakdown.cache_creation_5m_cost =
            per_million(usage.cache_creation_5m_tokens, pricing.cache_creation);
        breakdown.cache_creation_1h_cost =
            per_million(usage.cache_creation_1h_tokens, pricing.effective_1h_price());
    } else {
        // 旧版响应只有总量：按 5m 计价
        breakdown.cache_creation_5m_cost =
            per_million(usage.cache_creation_tokens, pricing.cache_creation);
        breakdown.cache_creation_1h_cost = 0.0;
    }

    if let Some(m) = multiplier {
        if m.cost_multiplier > 0.0 {
            let k = m.cost_multiplier;
            breakdown.input_cost *= k;
            breakdown.output_cost *= k;
            breakdown.cache_creation_5m_cost *= k;
            breakdown.cache_creation_1h_cost *= k;
            breakdown.cache_read_cost *= k;
        } else if m.has_category_multipliers() {
            breakdown.input_cost *= effective(m.input_cost_multiplier);
            breakdown.output_cost *= effective(m.output_cost_multiplier);
            breakdown.cache_creation_5m_cost *= effective(m.cache_creation_cost_multiplier);
            breakdown.cache_creation_1h_cost *= effective(m.cache_creation_cost_multiplier_1h);
            breakdown.cache_read_cost *= effective(m.cache_read_cost_multiplier);
        }
    }

    breakdown.cache_creation_cost =
        breakdown.cache_creation_5m_cost + breakdown.cache_creation_1h_cost;
    breakdown.total_cost = breakdown.input_cost
        + breakdown.output_cost
        + breakdown.cache_creation_cost
        + breakdown.cache_read_cost;

    breakdown
}

/// 旧版接口：缓存创建 tokens 按布尔开关整体归入 5m 或 1h 档
#[must_use]
pub fn calculate_cost(
    input_tokens: u64,
    output_tokens: u64,
    cache_creation_tokens: u64,
    cache_read_tokens: u64,
    pricing: Option<&ModelPricing>,
    multiplier: Option<&EndpointMultiplier>,
    use_1h_cache: bool,
) -> CostBreakdown {
    let usage = TokenUsage {
        input_tokens,
        output_tokens,
        cache_creation_tokens,
        cache_creation_5m_tokens: if use_1h_cache { 0 } else { cache_creation_tokens },
        cache_creation_1h_tokens: if use_1h_cache { cache_creation_tokens } else { 0 },
        cache_read_tokens,
    };
    calculate_cost_v2(Some(&usage), pricing, multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPSILON,
            "expected {expected}, got {actual}"
        );
    }

    fn sonnet_pricing() -> ModelPricing {
        ModelPricing {
            input: 3.0,
            output: 15.0,
            cache_creation: 3.75,
            cache_creation_1h: 6.0,
            cache_read: 0.30,
        }
    }

    fn opus_pricing() -> ModelPricing {
        ModelPricing {
            input: 15.0,
            output: 75.0,
            cache_creation: 18.75,
            cache_creation_1h: 30.0,
            cache_read: 1.50,
        }
    }

    #[test]
    fn basic_input_output() {
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 100_000,
            ..TokenUsage::default()
        };
        let result = calculate_cost_v2(Some(&usage), Some(&sonnet_pricing()), None);
        assert_close(result.input_cost, 3.0);
        assert_close(result.output_cost, 1.5);
        assert_close(result.total_cost, 4.5);
    }

    #[test]
    fn separate_5m_and_1h_cache() {
        let usage = TokenUsage {
            input_tokens: 10_000,
            output_tokens: 5_000,
            cache_creation_5m_tokens: 0,
            cache_creation_1h_tokens: 1_000,
            cache_creation_tokens: 1_000,
            cache_read_tokens: 50_000,
        };
        let result = calculate_cost_v2(Some(&usage), Some(&opus_pricing()), None);

        assert_close(result.input_cost, 10_000.0 * 15.0 / 1e6);
        assert_close(result.output_cost, 5_000.0 * 75.0 / 1e6);
        assert_close(result.cache_creation_5m_cost, 0.0);
        assert_close(result.cache_creation_1h_cost, 1_000.0 * 30.0 / 1e6);
        assert_close(result.cache_creation_cost, 1_000.0 * 30.0 / 1e6);
        assert_close(result.cache_read_cost, 50_000.0 * 1.5 / 1e6);
    }

    #[test]
    fn legacy_total_only_uses_5m_price() {
        let usage = TokenUsage {
            input_tokens: 100_000,
            output_tokens: 50_000,
            cache_creation_tokens: 10_000,
            cache_read_tokens: 20_000,
            ..TokenUsage::default()
        };
        let result = calculate_cost_v2(Some(&usage), Some(&sonnet_pricing()), None);
        assert_close(result.cache_creation_5m_cost, 10_000.0 * 3.75 / 1e6);
        assert_close(result.cache_creation_1h_cost, 0.0);
    }

    #[test]
    fn mixed_5m_and_1h_cache() {
        let usage = TokenUsage {
            input_tokens: 100_000,
            output_tokens: 50_000,
            cache_creation_5m_tokens: 5_000,
            cache_creation_1h_tokens: 3_000,
            cache_creation_tokens: 8_000,
            cache_read_tokens: 20_000,
        };
        let result = calculate_cost_v2(Some(&usage), Some(&sonnet_pricing()), None);
        let expected_5m = 5_000.0 * 3.75 / 1e6;
        let expected_1h = 3_000.0 * 6.0 / 1e6;
        assert_close(result.cache_creation_5m_cost, expected_5m);
        assert_close(result.cache_creation_1h_cost, expected_1h);
        assert_close(result.cache_creation_cost, expected_5m + expected_1h);
    }

    #[test]
    fn per_category_multipliers() {
        let usage = TokenUsage {
            input_tokens: 100_000,
            output_tokens: 50_000,
            cache_creation_5m_tokens: 5_000,
            cache_creation_1h_tokens: 3_000,
            cache_read_tokens: 20_000,
            ..TokenUsage::default()
        };
        let multiplier = EndpointMultiplier {
            cost_multiplier: 0.0,
            input_cost_multiplier: 1.5,
            output_cost_multiplier: 1.2,
            cache_creation_cost_multiplier: 1.0,
            cache_creation_cost_multiplier_1h: 2.0,
            cache_read_cost_multiplier: 1.0,
        };
        let result = calculate_cost_v2(Some(&usage), Some(&sonnet_pricing()), Some(&multiplier));
        assert_close(result.input_cost, 100_000.0 * 3.0 / 1e6 * 1.5);
        assert_close(result.cache_creation_1h_cost, 3_000.0 * 6.0 / 1e6 * 2.0);
    }

    #[test]
    fn overall_multiplier_scales_every_category() {
        let usage = TokenUsage {
            input_tokens: 100_000,
            output_tokens: 50_000,
            cache_creation_5m_tokens: 5_000,
            cache_creation_1h_tokens: 3_000,
            cache_read_tokens: 20_000,
            ..TokenUsage::default()
        };
        let pricing = sonnet_pricing();
        let multiplier = EndpointMultiplier {
            cost_multiplier: 1.5,
            ..EndpointMultiplier::default()
        };

        let base = calculate_cost_v2(Some(&usage), Some(&pricing), None);
        let scaled = calculate_cost_v2(Some(&usage), Some(&pricing), Some(&multiplier));

        assert_close(scaled.input_cost, base.input_cost * 1.5);
        assert_close(scaled.output_cost, base.output_cost * 1.5);
        assert_close(scaled.cache_creation_5m_cost, base.cache_creation_5m_cost * 1.5);
        assert_close(scaled.cache_creation_1h_cost, base.cache_creation_1h_cost * 1.5);
        assert_close(scaled.cache_read_cost, base.cache_read_cost * 1.5);
        assert_close(scaled.total_cost, base.total_cost * 1.5);
    }

    #[test]
    fn missing_usage_or_pricing_yields_zero() {
        let pricing = sonnet_pricing();
        assert_close(calculate_cost_v2(None, Some(&pricing), None).total_cost, 0.0);

        let usage = TokenUsage {
            input_tokens: 1_000,
            ..TokenUsage::default()
        };
        assert_close(calculate_cost_v2(Some(&usage), None, None).total_cost, 0.0);
    }

    #[test]
    fn default_1h_price_is_double_input() {
        let pricing = ModelPricing {
            input: 10.0,
            output: 50.0,
            cache_creation: 12.5,
            cache_creation_1h: 0.0,
            cache_read: 1.0,
        };
        let usage = TokenUsage {
            cache_creation_1h_tokens: 10_000,
            ..TokenUsage::default()
        };
        let result = calculate_cost_v2(Some(&usage), Some(&pricing), None);
        assert_close(result.cache_creation_1h_cost, 10_000.0 * 20.0 / 1e6);
    }

    #[test]
    fn opus_real_world_scenario() {
        let usage = TokenUsage {
            input_tokens: 5_000,
            output_tokens: 800,
            cache_creation_1h_tokens: 2_000,
            cache_creation_5m_tokens: 0,
            cache_creation_tokens: 2_000,
            cache_read_tokens: 10_000,
        };
        let result = calculate_cost_v2(Some(&usage), Some(&opus_pricing()), None);
        // 0.075 + 0.06 + 0.06 + 0.015 = 0.21
        assert_close(result.total_cost, 0.21);
    }

    #[test]
    fn legacy_wrapper_routes_cache_by_flag() {
        let pricing = sonnet_pricing();

        let result_5m =
            calculate_cost(100_000, 50_000, 10_000, 20_000, Some(&pricing), None, false);
        assert_close(result_5m.cache_creation_5m_cost, 10_000.0 * 3.75 / 1e6);
        assert_close(result_5m.cache_creation_1h_cost, 0.0);

        let result_1h =
            calculate_cost(100_000, 50_000, 10_000, 20_000, Some(&pricing), None, true);
        assert_close(result_1h.cache_creation_1h_cost, 10_000.0 * 6.0 / 1e6);
        assert_close(result_1h.cache_creation_5m_cost, 0.0);
    }
}
