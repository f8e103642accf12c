pub mod agent_definition;
pub mod change_event;
pub mod config;
pub mod entity;
pub mod tool_definition;

pub use agent_definition::{
    AgentDefinition, ConfigSection, MemorySection, ModelSection, ReasoningSection, StorageSection,
    TeamSection, ToolsSection,
};
pub use change_event::{ChangeEvent, ChangeOperation};
pub use config::{CacheConfig, Config, DatabaseConfig, ListenerConfig, LoggingConfig};
pub use entity::{CallContext, EntityKind, EntitySnapshot, Versioned};
pub use tool_definition::{McpTransport, ToolDefinition, ToolKind};
