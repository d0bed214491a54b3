//! Computer use is selectable but not implemented. The handler only echoes
//! the query so the tool keeps a place in the interface.

use crate::error::LlmError;
use crate::tools::{ToolHandler, ToolOutput, ToolType};

use tokio_util::sync::CancellationToken;

pub struct ComputerUseTool;

#[async_trait::async_trait]
impl ToolHandler for ComputerUseTool {
    fn kind(&self) -> ToolType {
        ToolType::ComputerUse
    }

    async fn run(&self, query: &str, cancel: &CancellationToken) -> Result<ToolOutput, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        Ok(ToolOutput::text(format!(
            "Computer use results for \"{query}\" would appear here."
        )))
    }
}
