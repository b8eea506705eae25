//! CourseMate Context
//!
//! Provides:
//! - Query analysis (intent classification, fuzzy course matching,
//!   entity extraction, confidence scoring)
//! - The fixed action catalog and the deterministic planner
//! - Context synthesis under a character budget

pub mod analyzer;
pub mod planner;
pub mod synthesizer;

pub use analyzer::{QueryAnalysis, QueryAnalyzer, QueryEntities, QueryIntent, Timeframe};
pub use planner::{plan, Action, ActionGroup, ActionPlan};
pub use synthesizer::{ActionFinding, ContextSynthesizer, SynthesizedContext};
