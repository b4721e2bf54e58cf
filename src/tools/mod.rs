pub mod alcohol;
pub mod coping;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod trigger;

pub use alcohol::{calculate_alcohol, AlcoholCalculatorTool, DAILY_GOAL_ML};
pub use coping::{CopingGenerator, CopingStrategies, CopingTool};
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolContext, ToolRegistry};
pub use schema::tool_call_schema_json;
pub use trigger::TriggerClassifierTool;
