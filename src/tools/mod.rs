//! Built-in tools.

mod calculator;
mod clock;

pub use calculator::CalculatorTool;
pub use clock::CurrentTimeTool;

use crate::tool::ToolRegistry;

/// Registry with the built-in assistant tools: `calculator` and
/// `current_time`.
pub fn assistant_toolkit() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CalculatorTool);
    registry.register(CurrentTimeTool);
    registry
}
