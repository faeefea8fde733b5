//! Startup diagnostics: a report of condition evaluation outcomes, and failure analyzers which
//! translate construction errors into actionable messages.

use crate::autoconfigure::conditions::ConditionOutcome;
use crate::autoconfigure::AutoConfigurationError;
use itertools::Itertools;
use tracing::{debug, error};

/// Evaluation result for a single auto-configuration.
#[derive(Clone, Debug)]
pub struct ConditionEvaluation {
    pub configuration: String,
    pub matched: bool,
    pub outcomes: Vec<ConditionOutcome>,
}

/// Record of every condition evaluated during an [AutoConfigurer](crate::autoconfigure::AutoConfigurer)
/// pass, in evaluation order.
#[derive(Clone, Debug, Default)]
pub struct ConditionEvaluationReport {
    evaluations: Vec<ConditionEvaluation>,
}

impl ConditionEvaluationReport {
    pub fn push(&mut self, evaluation: ConditionEvaluation) {
        self.evaluations.push(evaluation);
    }

    pub fn evaluations(&self) -> &[ConditionEvaluation] {
        &self.evaluations
    }

    /// Configurations whose conditions all matched.
    pub fn matched(&self) -> impl Iterator<Item = &ConditionEvaluation> {
        self.evaluations.iter().filter(|evaluation| evaluation.matched)
    }

    /// Configurations skipped due to a non-matching condition.
    pub fn skipped(&self) -> impl Iterator<Item = &ConditionEvaluation> {
        self.evaluations.iter().filter(|evaluation| !evaluation.matched)
    }

    /// Logs one line per evaluated configuration.
    pub fn log(&self) {
        for evaluation in &self.evaluations {
            debug!(
                "{}: {} [{}]",
                evaluation.configuration,
                if evaluation.matched { "matched" } else { "skipped" },
                evaluation
                    .outcomes
                    .iter()
                    .map(|outcome| outcome.message.as_str())
                    .join("; ")
            );
        }
    }
}

/// Human-readable diagnosis of a startup failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureAnalysis {
    pub description: String,
    pub action: String,
}

/// Best-effort translator of a startup error into a [FailureAnalysis]. Analyzers match on error
/// shape and message only; they are not a recovery mechanism.
pub trait FailureAnalyzer: Send + Sync {
    /// Returns an analysis if this analyzer recognizes given error.
    fn analyze(&self, error: &AutoConfigurationError) -> Option<FailureAnalysis>;
}

/// Registration entry for statically-known failure analyzers; see [submit_failure_analyzer!].
pub struct FailureAnalyzerRegistrar {
    pub provider: fn() -> Box<dyn FailureAnalyzer>,
}

inventory::collect!(FailureAnalyzerRegistrar);

/// Statically registers a [FailureAnalyzer] for use by [analyze_failure]. The analyzer type must
/// implement [Default].
#[macro_export]
macro_rules! submit_failure_analyzer {
    ($analyzer:ty) => {
        $crate::inventory::submit! {
            $crate::diagnostics::FailureAnalyzerRegistrar {
                provider: || ::std::boxed::Box::new(<$analyzer>::default()),
            }
        }
    };
}

/// Runs all registered analyzers against given error; the first analysis wins.
pub fn analyze_failure(error: &AutoConfigurationError) -> Option<FailureAnalysis> {
    inventory::iter::<FailureAnalyzerRegistrar>
        .into_iter()
        .find_map(|registrar| (registrar.provider)().analyze(error))
}

/// Logs a startup failure, using a [FailureAnalysis] when one is available.
pub fn report_failure(error: &AutoConfigurationError) {
    match analyze_failure(error) {
        Some(analysis) => error!(
            "Application failed to start.\n\nDescription:\n{}\n\nAction:\n{}",
            analysis.description, analysis.action
        ),
        None => error!("Application failed to start: {error}"),
    }
}

/// Analyzes [AutoConfigurationError::NoCandidate] errors, listing the considered candidates.
#[derive(Default)]
pub struct NoCandidateFailureAnalyzer;

impl FailureAnalyzer for NoCandidateFailureAnalyzer {
    fn analyze(&self, error: &AutoConfigurationError) -> Option<FailureAnalysis> {
        let AutoConfigurationError::NoCandidate { role, candidates } = error else {
            return None;
        };

        Some(FailureAnalysis {
            description: format!(
                "No {} implementation could be auto-configured; considered candidates: {}.",
                role,
                candidates.iter().join(", ")
            ),
            action: format!(
                "Declare one of the candidate libraries ({}) as provided, or register a {} instance yourself.",
                candidates.iter().join(", "),
                role
            ),
        })
    }
}

crate::submit_failure_analyzer!(NoCandidateFailureAnalyzer);

#[cfg(test)]
mod tests {
    use crate::autoconfigure::conditions::ConditionOutcome;
    use crate::autoconfigure::AutoConfigurationError;
    use crate::diagnostics::{
        analyze_failure, ConditionEvaluation, ConditionEvaluationReport, FailureAnalyzer,
        NoCandidateFailureAnalyzer,
    };
    use crate::service_registry::ServiceRegistryError;

    #[test]
    fn should_partition_report_into_matched_and_skipped() {
        let mut report = ConditionEvaluationReport::default();
        report.push(ConditionEvaluation {
            configuration: "datasource".to_string(),
            matched: true,
            outcomes: vec![ConditionOutcome::matched("library 'deadpool' is provided")],
        });
        report.push(ConditionEvaluation {
            configuration: "mail".to_string(),
            matched: false,
            outcomes: vec![ConditionOutcome::no_match("library 'lettre' is not provided")],
        });

        assert_eq!(
            vec!["datasource"],
            report
                .matched()
                .map(|evaluation| evaluation.configuration.as_str())
                .collect::<Vec<_>>()
        );
        assert_eq!(
            vec!["mail"],
            report
                .skipped()
                .map(|evaluation| evaluation.configuration.as_str())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn should_analyze_missing_candidates() {
        let error = AutoConfigurationError::NoCandidate {
            role: "connection pool",
            candidates: vec!["deadpool", "r2d2", "mobc"],
        };

        let analysis = NoCandidateFailureAnalyzer.analyze(&error).unwrap();
        assert!(analysis.description.contains("connection pool"));
        assert!(analysis.description.contains("deadpool, r2d2, mobc"));

        // same analyzer reachable through static registration
        assert_eq!(Some(analysis), analyze_failure(&error));
    }

    #[test]
    fn should_ignore_unrelated_errors() {
        let error = AutoConfigurationError::Registry(ServiceRegistryError::DuplicateServiceName(
            "data-source".to_string(),
        ));

        assert_eq!(None, NoCandidateFailureAnalyzer.analyze(&error));
    }
}
