pub mod anthropic;
pub mod json_extract;
pub mod message;
pub mod model;
pub mod openai;
pub mod planner;
pub mod provider;

pub use message::{ContentBlock, Msg, Role, ToolCall};
pub use model::{ChatModel, ModelError, ModelRequest, ModelResponse};
pub use planner::{PlannerError, plan_simple, plan_with_tools};
pub use provider::build_model;
