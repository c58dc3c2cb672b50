use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use campus_core::{CampusResult, CompletionConstraints, TaskType, TextCompleter};

/// Outcome of request decomposition: the detected task types in detection
/// order and any student id found in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRequest {
    /// Task types to spawn, deduplicated, detection order preserved.
    pub task_types: Vec<TaskType>,
    /// Student id extracted from the request text, if any.
    pub student_id: Option<String>,
}

/// Pluggable request decomposition.
#[async_trait]
pub trait RequestClassifier: Send + Sync {
    /// Splits a raw request into task types and extracts identifiers.
    async fn classify(&self, text: &str) -> CampusResult<ClassifiedRequest>;
}

const KEYWORD_TABLE: &[(TaskType, &[&str])] = &[
    (
        TaskType::CheckFeeStatus,
        &["fee", "tuition", "owe", "balance", "outstanding"],
    ),
    (
        TaskType::CheckCourseRegistration,
        &["register", "registration", "enroll", "take a course", "course load"],
    ),
    (
        TaskType::CheckAcademicStatus,
        &["gpa", "academic standing", "academic status", "grade average", "probation"],
    ),
    (
        TaskType::CheckPaymentStatus,
        &["payment", "paid", "receipt", "instalment"],
    ),
    (
        TaskType::PasswordReset,
        &["password", "locked out", "can't log in", "cannot log in", "forgot my login"],
    ),
    (
        TaskType::CheckScholarship,
        &["scholarship", "bursary", "grant"],
    ),
    // Library card before book search so "library card" is not swallowed
    // by the broader book keywords.
    (
        TaskType::CheckLibraryCard,
        &["library card", "card status", "borrowing privileges"],
    ),
    (
        TaskType::SearchBook,
        &["book", "find a copy", "catalogue", "borrow"],
    ),
];

const AMBIGUITY_MARKERS: &[&str] = &[
    "how do i", "how can i", "why", "when", "where", "who", "what is",
    "can i", "could i", "am i allowed", "procedure", "rules", "process",
];

/// Keyword-driven classifier, the always-available decomposition path.
///
/// Matching is case-insensitive substring search over a fixed table. A
/// request matching nothing yields a single [`TaskType::GeneralQuery`].
pub struct KeywordClassifier {
    student_id_re: Regex,
}

impl KeywordClassifier {
    /// Creates the classifier, compiling the extraction pattern.
    pub fn new() -> CampusResult<Self> {
        // Student ids are 8 to 10 digit numbers, e.g. 20220015.
        let student_id_re = Regex::new(r"\b(\d{8,10})\b")
            .map_err(|e| campus_core::CampusError::Config(format!("bad id pattern: {e}")))?;
        Ok(Self { student_id_re })
    }

    /// Extracts a student id from free text, if present.
    pub fn extract_student_id(&self, text: &str) -> Option<String> {
        self.student_id_re
            .captures(text)
            .map(|c| c[1].to_string())
    }

    fn detect(&self, text: &str) -> Vec<TaskType> {
        let lower = text.to_lowercase();
        let mut detected = Vec::new();
        for (task_type, keywords) in KEYWORD_TABLE {
            if keywords.iter().any(|k| lower.contains(k)) && !detected.contains(task_type) {
                detected.push(*task_type);
            }
        }
        detected
    }

    /// Whether the request reads like an open question rather than a
    /// direct service lookup. Ambiguous requests are candidates for the
    /// completion-backed classifier.
    pub fn is_ambiguous(&self, text: &str, detected: &[TaskType]) -> bool {
        if detected.is_empty() {
            return true;
        }
        let lower = text.to_lowercase();
        AMBIGUITY_MARKERS.iter().any(|m| lower.contains(m))
    }
}

#[async_trait]
impl RequestClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> CampusResult<ClassifiedRequest> {
        let mut task_types = self.detect(text);
        if task_types.is_empty() {
            task_types.push(TaskType::GeneralQuery);
        }
        debug!(?task_types, "keyword classification");
        Ok(ClassifiedRequest {
            task_types,
            student_id: self.extract_student_id(text),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionAnalysis {
    tasks: Vec<CompletionTask>,
}

#[derive(Debug, Deserialize)]
struct CompletionTask {
    task_type: TaskType,
}

/// Keyword classifier with a completion-service fallback for requests the
/// keyword table cannot place or marks as ambiguous.
///
/// The completion service is best effort: any failure or unparseable reply
/// degrades to the keyword result, never to an error.
pub struct FallbackClassifier {
    keywords: KeywordClassifier,
    completer: Arc<dyn TextCompleter>,
}

impl FallbackClassifier {
    /// Wraps a keyword classifier with a completion backend.
    pub fn new(keywords: KeywordClassifier, completer: Arc<dyn TextCompleter>) -> Self {
        Self { keywords, completer }
    }

    async fn classify_by_completion(&self, text: &str) -> CampusResult<Vec<TaskType>> {
        let constraints = CompletionConstraints {
            system_prompt: Some(
                "You split university helpdesk requests into task types. \
                 Reply with JSON only: {\"tasks\": [{\"task_type\": \"...\"}]}. \
                 Valid task types: check_fee_status, check_course_registration, \
                 check_academic_status, check_payment_status, password_reset, \
                 check_scholarship, search_book, check_library_card, general_query."
                    .to_string(),
            ),
            ..CompletionConstraints::default()
        };
        let reply = self.completer.complete(text, &constraints).await?;
        let analysis: CompletionAnalysis = serde_json::from_str(reply.trim())?;

        let mut task_types = Vec::new();
        for t in analysis.tasks {
            if !task_types.contains(&t.task_type) {
                task_types.push(t.task_type);
            }
        }
        Ok(task_types)
    }
}

#[async_trait]
impl RequestClassifier for FallbackClassifier {
    async fn classify(&self, text: &str) -> CampusResult<ClassifiedRequest> {
        let keyword_result = self.keywords.classify(text).await?;
        let detected = self.keywords.detect(text);

        if !self.keywords.is_ambiguous(text, &detected) {
            return Ok(keyword_result);
        }

        match self.classify_by_completion(text).await {
            Ok(task_types) if !task_types.is_empty() => {
                debug!(?task_types, "completion classification");
                Ok(ClassifiedRequest {
                    task_types,
                    student_id: keyword_result.student_id,
                })
            }
            Ok(_) => Ok(keyword_result),
            Err(e) => {
                warn!(error = %e, "completion classification failed, using keywords");
                Ok(keyword_result)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use campus_core::CampusError;

    #[tokio::test]
    async fn keyword_detection_multi_task() {
        let classifier = KeywordClassifier::new().unwrap();
        let result = classifier
            .classify("Do I owe tuition, and can you check my GPA? Student 20220015")
            .await
            .unwrap();
        assert!(result.task_types.contains(&TaskType::CheckFeeStatus));
        assert!(result.task_types.contains(&TaskType::CheckAcademicStatus));
        assert_eq!(result.student_id.as_deref(), Some("20220015"));
    }

    #[tokio::test]
    async fn unmatched_text_is_general_query() {
        let classifier = KeywordClassifier::new().unwrap();
        let result = classifier
            .classify("When does the cafeteria open?")
            .await
            .unwrap();
        assert_eq!(result.task_types, vec![TaskType::GeneralQuery]);
        assert!(result.student_id.is_none());
    }

    #[tokio::test]
    async fn library_card_beats_book_search() {
        let classifier = KeywordClassifier::new().unwrap();
        let result = classifier
            .classify("Is my library card still valid?")
            .await
            .unwrap();
        assert_eq!(result.task_types[0], TaskType::CheckLibraryCard);
    }

    #[test]
    fn student_id_extraction_bounds() {
        let classifier = KeywordClassifier::new().unwrap();
        assert_eq!(
            classifier.extract_student_id("my number is 20220015"),
            Some("20220015".into())
        );
        assert_eq!(
            classifier.extract_student_id("id 2023001234 please"),
            Some("2023001234".into())
        );
        // Too short and too long are not student ids.
        assert!(classifier.extract_student_id("room 1204").is_none());
        assert!(classifier.extract_student_id("ref 123456789012").is_none());
    }

    struct CannedCompleter {
        reply: String,
    }

    #[async_trait]
    impl TextCompleter for CannedCompleter {
        async fn complete(
            &self,
            _prompt: &str,
            _constraints: &CompletionConstraints,
        ) -> CampusResult<String> {
            Ok(self.reply.clone())
        }
    }

    struct BrokenCompleter;

    #[async_trait]
    impl TextCompleter for BrokenCompleter {
        async fn complete(
            &self,
            _prompt: &str,
            _constraints: &CompletionConstraints,
        ) -> CampusResult<String> {
            Err(CampusError::Http("completion backend down".into()))
        }
    }

    #[tokio::test]
    async fn ambiguous_request_uses_completion() {
        let classifier = FallbackClassifier::new(
            KeywordClassifier::new().unwrap(),
            Arc::new(CannedCompleter {
                reply: r#"{"tasks": [{"task_type": "check_scholarship"}]}"#.into(),
            }),
        );
        let result = classifier
            .classify("How do I find out about financial support options?")
            .await
            .unwrap();
        assert_eq!(result.task_types, vec![TaskType::CheckScholarship]);
    }

    #[tokio::test]
    async fn completion_failure_degrades_to_keywords() {
        let classifier =
            FallbackClassifier::new(KeywordClassifier::new().unwrap(), Arc::new(BrokenCompleter));
        let result = classifier
            .classify("Something about the campus in general")
            .await
            .unwrap();
        assert_eq!(result.task_types, vec![TaskType::GeneralQuery]);
    }

    #[tokio::test]
    async fn clear_request_skips_completion() {
        // The broken completer would error if consulted.
        let classifier =
            FallbackClassifier::new(KeywordClassifier::new().unwrap(), Arc::new(BrokenCompleter));
        let result = classifier
            .classify("Please reset my password, id 20220015")
            .await
            .unwrap();
        assert_eq!(result.task_types, vec![TaskType::PasswordReset]);
    }
}
