//! Report generation: outline planning, section writing, compilation and
//! quality control.

pub mod compiler;
pub mod prompts;
pub mod quality;
pub mod structure;
pub mod writer;

pub use compiler::{CompiledReport, ReportCompiler, manual_compile, slugify};
pub use quality::{QualityAction, QualityAnalysis, QualityController, QualityOutcome, Severity};
pub use structure::{PlannedReport, ReportPlanner, ReportStructure, Section, fallback_structure};
pub use writer::{SectionStep, SectionWriter};
