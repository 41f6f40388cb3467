//! Layered web research.
//!
//! A run distributes a query budget across thematic layers, plans queries
//! with the model, searches, scores the sources it found, asks for a gap
//! analysis, runs at most one round of follow-up searches and finally
//! synthesizes a narrative.

pub mod analysis;
pub mod layers;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod results;
pub mod session;
pub mod sources;

pub use analysis::{AnalysisResult, LayerGap};
pub use layers::{QueryDistribution, ResearchLayer, default_layers, distribute_queries};
pub use orchestrator::{ResearchOrchestrator, ResearchOutcome};
pub use planner::{LayerPlan, QueryPlan, QueryPlanner};
pub use results::{LayerResults, SearchResultEntry, SearchVariant};
pub use session::{ResearchPhase, ResearchSession};
pub use sources::{QualityTier, ScoredSource, SignalRule, SourceScorer};
