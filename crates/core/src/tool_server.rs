//! External tool-hosting servers.
//!
//! A server is connected and asked for its tools while an agent is being
//! assembled; afterwards the agent owns it only so it can close it on shutdown.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ToolServerError;
use crate::tool::Tool;

#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Server name, used in logs and error messages.
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<(), ToolServerError>;

    /// The tools this server hosts. Only valid after `connect`.
    async fn load_tools(&self) -> Result<Vec<Arc<dyn Tool>>, ToolServerError>;

    async fn close(&self) -> Result<(), ToolServerError>;
}
