//! Action catalog and deterministic planner
//!
//! The catalog is a closed tagged enum: every kind is matched exhaustively
//! by both the planner and the executor, so adding a kind is a
//! compile-time-checked extension. `plan` is a pure function of the query
//! analysis (no randomness, no hidden state), which keeps traces
//! reproducible and plans testable.

use crate::analyzer::{QueryAnalysis, QueryIntent, Timeframe};
use serde::Serialize;

/// Functional grouping of action kinds
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionGroup {
    KnowledgeRetrieval,
    Analysis,
    Planning,
    ContentGeneration,
    DataRetrieval,
    Utility,
}

/// The fixed catalog of pipeline actions
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    // Knowledge retrieval
    KnowledgeSearch {
        query: String,
        course_id: Option<String>,
    },
    AssignmentSearch {
        query: String,
        course_id: Option<String>,
    },
    AnnouncementSearch {
        query: String,
        course_id: Option<String>,
    },
    MaterialSearch {
        query: String,
        course_id: Option<String>,
    },

    // Analysis
    DeadlineAnalysis {
        course_id: Option<String>,
    },
    UrgencyAssessment,
    InformationExtraction,

    // Planning
    StudyOutline {
        timeframe: Timeframe,
    },
    ExamOutline,

    // Content generation
    DirectAnswer,
    StudyPlanGeneration {
        timeframe: Timeframe,
    },
    ExamPrepGeneration,

    // Data retrieval
    CourseListing,
    UpcomingDeadlines {
        within_days: i64,
        course_id: Option<String>,
    },

    // Utility
    QueryRefinement,
    ContextIntegration,
}

impl Action {
    pub fn group(&self) -> ActionGroup {
        match self {
            Action::KnowledgeSearch { .. }
            | Action::AssignmentSearch { .. }
            | Action::AnnouncementSearch { .. }
            | Action::MaterialSearch { .. } => ActionGroup::KnowledgeRetrieval,
            Action::DeadlineAnalysis { .. }
            | Action::UrgencyAssessment
            | Action::InformationExtraction => ActionGroup::Analysis,
            Action::StudyOutline { .. } | Action::ExamOutline => ActionGroup::Planning,
            Action::DirectAnswer
            | Action::StudyPlanGeneration { .. }
            | Action::ExamPrepGeneration => ActionGroup::ContentGeneration,
            Action::CourseListing | Action::UpcomingDeadlines { .. } => ActionGroup::DataRetrieval,
            Action::QueryRefinement | Action::ContextIntegration => ActionGroup::Utility,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::KnowledgeSearch { .. } => "knowledge_search",
            Action::AssignmentSearch { .. } => "assignment_search",
            Action::AnnouncementSearch { .. } => "announcement_search",
            Action::MaterialSearch { .. } => "material_search",
            Action::DeadlineAnalysis { .. } => "deadline_analysis",
            Action::UrgencyAssessment => "urgency_assessment",
            Action::InformationExtraction => "information_extraction",
            Action::StudyOutline { .. } => "study_outline",
            Action::ExamOutline => "exam_outline",
            Action::DirectAnswer => "direct_answer",
            Action::StudyPlanGeneration { .. } => "study_plan_generation",
            Action::ExamPrepGeneration => "exam_prep_generation",
            Action::CourseListing => "course_listing",
            Action::UpcomingDeadlines { .. } => "upcoming_deadlines",
            Action::QueryRefinement => "query_refinement",
            Action::ContextIntegration => "context_integration",
        }
    }

    /// Whether this action produces the final response text
    pub fn produces_response(&self) -> bool {
        matches!(self.group(), ActionGroup::ContentGeneration)
    }

    /// Whether this action fetches content (knowledge or data retrieval)
    pub fn is_retrieval(&self) -> bool {
        matches!(
            self.group(),
            ActionGroup::KnowledgeRetrieval | ActionGroup::DataRetrieval
        )
    }
}

/// Ordered, validated sequence of actions for one query
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActionPlan {
    actions: Vec<Action>,
}

impl ActionPlan {
    fn new(actions: Vec<Action>) -> Self {
        let plan = Self { actions };
        debug_assert!(plan.validate().is_ok(), "planner produced invalid plan");
        plan
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Check the plan invariants:
    /// - non-empty
    /// - exactly one response-producing action, in terminal position
    /// - every retrieval action precedes every generation action
    /// - deadline analysis precedes plan/exam generation when both appear
    pub fn validate(&self) -> Result<(), String> {
        if self.actions.is_empty() {
            return Err("plan is empty".into());
        }

        let responders = self
            .actions
            .iter()
            .filter(|a| a.produces_response())
            .count();
        if responders != 1 {
            return Err(format!("expected exactly one response action, got {responders}"));
        }
        if !self.actions.last().unwrap().produces_response() {
            return Err("plan does not terminate in a response action".into());
        }

        let first_generation = self
            .actions
            .iter()
            .position(|a| a.produces_response())
            .unwrap();
        if let Some(late_retrieval) = self.actions[first_generation..]
            .iter()
            .find(|a| a.is_retrieval())
        {
            return Err(format!(
                "retrieval action {} follows a generation action",
                late_retrieval.name()
            ));
        }

        let deadline_pos = self
            .actions
            .iter()
            .position(|a| matches!(a, Action::DeadlineAnalysis { .. }));
        let plan_generation_pos = self.actions.iter().position(|a| {
            matches!(a, Action::StudyPlanGeneration { .. } | Action::ExamPrepGeneration)
        });
        if let (Some(d), Some(g)) = (deadline_pos, plan_generation_pos) {
            if d >= g {
                return Err("deadline analysis must precede plan generation".into());
            }
        }

        Ok(())
    }
}

/// Broad sub-query used by study-plan assignment retrieval
const ASSIGNMENT_QUERY: &str = "assignment deadline due date exam quiz project";
/// Broad sub-query used by study-plan announcement retrieval
const ANNOUNCEMENT_QUERY: &str = "announcement important notice update";
/// Sub-query used by exam-prep material retrieval
const MATERIAL_QUERY: &str = "lecture notes material reading review";

/// Confidence below which the planner adds a refinement step before search
const REFINEMENT_THRESHOLD: f32 = 0.75;

/// Deterministically map a query analysis onto an ordered action plan
pub fn plan(analysis: &QueryAnalysis) -> ActionPlan {
    let course_id = analysis.target_course.as_ref().map(|c| c.id.clone());

    let actions = match analysis.intent {
        QueryIntent::Ambiguous => fallback_actions(analysis),
        QueryIntent::Informational => {
            let mut actions = Vec::new();
            if analysis.confidence < REFINEMENT_THRESHOLD {
                actions.push(Action::QueryRefinement);
            }
            actions.push(Action::KnowledgeSearch {
                query: analysis.refined_query.clone(),
                course_id: course_id.clone(),
            });
            if analysis.deadline_sensitive {
                actions.push(Action::UpcomingDeadlines {
                    within_days: 30,
                    course_id: course_id.clone(),
                });
                actions.push(Action::DeadlineAnalysis {
                    course_id: course_id.clone(),
                });
                actions.push(Action::UrgencyAssessment);
            }
            actions.push(Action::InformationExtraction);
            actions.push(Action::ContextIntegration);
            actions.push(Action::DirectAnswer);
            actions
        }
        QueryIntent::StudyPlan => {
            let timeframe = analysis.timeframe.unwrap_or(Timeframe::Week);
            let mut actions = Vec::new();
            if course_id.is_none() {
                actions.push(Action::CourseListing);
            }
            actions.push(Action::AssignmentSearch {
                query: ASSIGNMENT_QUERY.to_string(),
                course_id: course_id.clone(),
            });
            actions.push(Action::AnnouncementSearch {
                query: ANNOUNCEMENT_QUERY.to_string(),
                course_id: course_id.clone(),
            });
            actions.push(Action::UpcomingDeadlines {
                within_days: timeframe.horizon_days(),
                course_id: course_id.clone(),
            });
            actions.push(Action::DeadlineAnalysis {
                course_id: course_id.clone(),
            });
            actions.push(Action::StudyOutline { timeframe });
            actions.push(Action::ContextIntegration);
            actions.push(Action::StudyPlanGeneration { timeframe });
            actions
        }
        QueryIntent::ExamPrep => {
            vec![
                Action::KnowledgeSearch {
                    query: analysis.refined_query.clone(),
                    course_id: course_id.clone(),
                },
                Action::MaterialSearch {
                    query: MATERIAL_QUERY.to_string(),
                    course_id: course_id.clone(),
                },
                Action::UpcomingDeadlines {
                    within_days: 14,
                    course_id: course_id.clone(),
                },
                Action::DeadlineAnalysis { course_id },
                Action::ExamOutline,
                Action::ContextIntegration,
                Action::ExamPrepGeneration,
            ]
        }
    };

    ActionPlan::new(actions)
}

/// The default two-action fallback: broad search plus a direct answer
fn fallback_actions(analysis: &QueryAnalysis) -> Vec<Action> {
    vec![
        Action::KnowledgeSearch {
            query: analysis.refined_query.clone(),
            course_id: None,
        },
        Action::DirectAnswer,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{QueryAnalyzer, QueryEntities};
    use coursemate_common::config::AnalyzerConfig;
    use coursemate_common::model::Course;

    fn analysis(intent: QueryIntent, confidence: f32) -> QueryAnalysis {
        QueryAnalysis {
            query: "q".into(),
            refined_query: "q".into(),
            intent,
            target_course: None,
            confidence,
            entities: QueryEntities::default(),
            deadline_sensitive: false,
            timeframe: None,
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        let analyzer = QueryAnalyzer::new(&AnalyzerConfig::default());
        let courses = vec![Course::new("c1", "HS 103")];
        let a = analyzer.analyze("when is my HS 103 presentation due", &courses);

        assert_eq!(plan(&a), plan(&a));
    }

    #[test]
    fn test_ambiguous_yields_two_action_fallback() {
        let p = plan(&analysis(QueryIntent::Ambiguous, 0.2));

        assert_eq!(p.len(), 2);
        assert!(matches!(
            p.actions()[0],
            Action::KnowledgeSearch { ref course_id, .. } if course_id.is_none()
        ));
        assert_eq!(p.actions()[1], Action::DirectAnswer);
    }

    #[test]
    fn test_every_intent_produces_a_valid_plan() {
        for intent in [
            QueryIntent::Informational,
            QueryIntent::StudyPlan,
            QueryIntent::ExamPrep,
            QueryIntent::Ambiguous,
        ] {
            for confidence in [0.3, 0.6, 0.9] {
                let mut a = analysis(intent, confidence);
                a.deadline_sensitive = confidence > 0.5;
                let p = plan(&a);
                assert!(p.validate().is_ok(), "{intent:?} at {confidence} invalid: {:?}", p.validate());
            }
        }
    }

    #[test]
    fn test_retrieval_precedes_generation() {
        let mut a = analysis(QueryIntent::Informational, 0.9);
        a.deadline_sensitive = true;
        let p = plan(&a);

        let first_generation = p
            .actions()
            .iter()
            .position(|x| x.produces_response())
            .unwrap();
        assert!(p.actions()[first_generation..]
            .iter()
            .all(|x| !x.is_retrieval()));
    }

    #[test]
    fn test_deadline_analysis_precedes_study_plan_generation() {
        let p = plan(&analysis(QueryIntent::StudyPlan, 0.9));

        let deadline = p
            .actions()
            .iter()
            .position(|x| matches!(x, Action::DeadlineAnalysis { .. }))
            .unwrap();
        let generation = p
            .actions()
            .iter()
            .position(|x| matches!(x, Action::StudyPlanGeneration { .. }))
            .unwrap();
        assert!(deadline < generation);
    }

    #[test]
    fn test_study_plan_without_course_lists_courses_first() {
        let p = plan(&analysis(QueryIntent::StudyPlan, 0.9));
        assert_eq!(p.actions()[0], Action::CourseListing);

        let mut with_course = analysis(QueryIntent::StudyPlan, 0.9);
        with_course.target_course = Some(Course::new("c1", "HS 103"));
        let p = plan(&with_course);
        assert!(!p.actions().contains(&Action::CourseListing));
    }

    #[test]
    fn test_low_confidence_informational_gets_refinement() {
        let p = plan(&analysis(QueryIntent::Informational, 0.6));
        assert_eq!(p.actions()[0], Action::QueryRefinement);

        let p = plan(&analysis(QueryIntent::Informational, 0.9));
        assert!(!p.actions().contains(&Action::QueryRefinement));
    }

    #[test]
    fn test_action_groups_cover_catalog() {
        let samples = vec![
            (Action::KnowledgeSearch { query: "q".into(), course_id: None }, ActionGroup::KnowledgeRetrieval),
            (Action::DeadlineAnalysis { course_id: None }, ActionGroup::Analysis),
            (Action::StudyOutline { timeframe: Timeframe::Week }, ActionGroup::Planning),
            (Action::DirectAnswer, ActionGroup::ContentGeneration),
            (Action::UpcomingDeadlines { within_days: 7, course_id: None }, ActionGroup::DataRetrieval),
            (Action::ContextIntegration, ActionGroup::Utility),
        ];
        for (action, group) in samples {
            assert_eq!(action.group(), group);
        }
    }
}
