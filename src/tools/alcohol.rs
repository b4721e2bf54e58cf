//! 饮酒量计算工具（calculate_alcohol）
//!
//! 纯函数：按饮品类型查默认酒精度、按单位查默认容量，计算纯酒精毫升数并与每日目标比较。
//! 查表未命中时使用固定兜底值（酒精度 0.12、单位容量 150 mL）。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::{AgentError, BeverageLog, ToolOutput};
use crate::tools::schema::args_schema;
use crate::tools::{Tool, ToolContext};

/// 每日纯酒精目标（mL）
pub const DAILY_GOAL_ML: f64 = 30.0;
/// 未知饮品类型的默认酒精度
pub const DEFAULT_ABV: f64 = 0.12;
/// 未知单位的默认容量（mL）
pub const DEFAULT_UNIT_VOLUME_ML: f64 = 150.0;
/// 未给出单位时的默认单位
pub const DEFAULT_UNIT: &str = "glass";

/// 各饮品类型的默认酒精度
pub fn default_abv(beverage_type: &str) -> Option<f64> {
    let abv = match beverage_type {
        "beer" | "lager" | "ale" | "cider" | "hard seltzer" | "seltzer" => 0.05,
        "wine" | "red wine" | "white wine" | "rose" | "champagne" | "prosecco" => 0.12,
        "sake" => 0.15,
        "spirits" | "liquor" | "vodka" | "whiskey" | "whisky" | "gin" | "rum" | "tequila" => 0.40,
        "cocktail" => 0.15,
        _ => return None,
    };
    Some(abv)
}

/// 各单位的默认容量（mL）
pub fn unit_volume_ml(unit: &str) -> Option<f64> {
    let volume = match unit {
        "glass" => 150.0,
        "bottle" => 750.0,
        "can" => 355.0,
        "shot" => 44.0,
        _ => return None,
    };
    Some(volume)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// 计算一次饮酒记录；beverage_type 与 unit 大小写不敏感
pub fn calculate_alcohol(beverage_type: &str, quantity: f64, unit: &str, daily_goal_ml: f64) -> BeverageLog {
    let beverage_type = beverage_type.trim().to_lowercase();
    let unit = unit.trim().to_lowercase();
    let abv = default_abv(&beverage_type).unwrap_or(DEFAULT_ABV);
    let volume_per_unit = unit_volume_ml(&unit).unwrap_or(DEFAULT_UNIT_VOLUME_ML);
    let total_volume_ml = quantity * volume_per_unit;
    let total_pure_alcohol_ml = round2(total_volume_ml * abv);

    BeverageLog {
        beverage_type,
        quantity,
        unit,
        abv,
        total_volume_ml: round2(total_volume_ml),
        total_pure_alcohol_ml,
        daily_goal_ml,
        met_goal: total_pure_alcohol_ml <= daily_goal_ml,
    }
}

/// calculate_alcohol 的参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CalculateAlcoholArgs {
    /// 饮品类型，如 beer、wine、vodka
    pub beverage_type: String,
    /// 数量（杯 / 瓶 / 罐 / 小杯）
    pub quantity: f64,
    /// 单位：glass、bottle、can、shot，默认 glass
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String {
    DEFAULT_UNIT.to_string()
}

/// 饮酒量计算工具
pub struct AlcoholCalculatorTool {
    daily_goal_ml: f64,
}

impl AlcoholCalculatorTool {
    pub fn new() -> Self {
        Self {
            daily_goal_ml: DAILY_GOAL_ML,
        }
    }

    pub fn with_daily_goal(mut self, daily_goal_ml: f64) -> Self {
        self.daily_goal_ml = daily_goal_ml;
        self
    }
}

impl Default for AlcoholCalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for AlcoholCalculatorTool {
    fn name(&self) -> &str {
        "calculate_alcohol"
    }

    fn description(&self) -> &str {
        "Calculate pure alcohol (mL) for a drink the user reported and whether it stays within today's goal. \
         Args: {\"beverage_type\": \"beer\", \"quantity\": 2, \"unit\": \"bottle\"}"
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<CalculateAlcoholArgs>()
    }

    async fn execute(&self, args: Value, _ctx: ToolContext<'_>) -> Result<ToolOutput, AgentError> {
        let args: CalculateAlcoholArgs =
            serde_json::from_value(args).map_err(|e| AgentError::InvalidToolArgs {
                tool: self.name().to_string(),
                reason: e.to_string(),
            })?;
        if !args.quantity.is_finite() || args.quantity < 0.0 {
            return Err(AgentError::InvalidToolArgs {
                tool: self.name().to_string(),
                reason: format!("quantity must be a non-negative number, got {}", args.quantity),
            });
        }
        let log = calculate_alcohol(&args.beverage_type, args.quantity, &args.unit, self.daily_goal_ml);
        tracing::debug!(
            beverage = %log.beverage_type,
            pure_alcohol_ml = log.total_pure_alcohol_ml,
            met_goal = log.met_goal,
            "alcohol calculated"
        );
        Ok(ToolOutput::AlcoholResult(log))
    }
}
