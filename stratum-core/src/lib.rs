//! # Stratum Core
//!
//! Layered web research and report generation.
//! Provides the LLM interface (brain), search tools, provider registry and
//! failover, the research orchestrator, report writing and quality control,
//! configuration, and fundamental types.

pub mod brain;
pub mod config;
pub mod error;
pub mod json_extract;
pub mod pipeline;
pub mod providers;
pub mod report;
pub mod research;
pub mod search;
pub mod text;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, LlmProvider, MockLlmProvider};
pub use config::{StratumConfig, load_config};
pub use error::{ProviderKind, ProviderRateLimitError, Result, StratumError};
pub use json_extract::parse_json_from_response;
pub use pipeline::{ReportPipeline, ReportRunResult, ReportService, report_filename_for};
pub use providers::{FailoverTracker, ProviderRegistry};
pub use report::{ReportStructure, Section};
pub use research::{ResearchOrchestrator, ResearchOutcome};
pub use search::{MockSearchProvider, MockSearchTool, MultiSearch, SearchArgs, SearchTool};
pub use types::{CompletionRequest, CompletionResponse, Content, Message, Role, TokenUsage, ToolDefinition};
