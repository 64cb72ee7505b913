// Shape check for enricher output.
//
// A payload is accepted only if every required field is present with the
// right type. Anything else is a SchemaValidation error, which the caller
// retries.

use chrono::Utc;
use serde_json::{Map, Value};

use super::traits::EnrichmentResponse;
use crate::db::models::EnrichmentRecord;
use crate::error::EngineError;

pub const DEFAULT_CATEGORIES: [&str; 4] = [
    "SPRING_RECIPES",
    "SPRING_KITCHEN_STYLING",
    "REFRIGERATOR_ORGANIZATION",
    "VEGETABLE_PREP_HANDLING",
];

const MAX_TITLE_CHARS: usize = 500;
const MIN_RELATED: usize = 3;
const MAX_RELATED: usize = 5;

/// The accepted category labels.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentSchema {
    pub categories: Vec<String>,
}

impl Default for EnrichmentSchema {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::SchemaValidation(msg.into())
}

fn require_str(obj: &Map<String, Value>, field: &str) -> Result<String, EngineError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(invalid(format!("missing required field `{field}`"))),
        Some(Value::String(s)) if s.trim().is_empty() => Err(invalid(format!("`{field}` is empty"))),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(invalid(format!("`{field}` must be a string, got {}", type_name(other)))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl EnrichmentSchema {
    /// Validate a response and turn it into a record for the given cache key.
    pub fn validate(
        &self,
        cluster_id: &str,
        content_hash: &str,
        response: &EnrichmentResponse,
    ) -> Result<EnrichmentRecord, EngineError> {
        let obj = response
            .payload
            .as_object()
            .ok_or_else(|| invalid(format!("payload must be an object, got {}", type_name(&response.payload))))?;

        let category = require_str(obj, "category")?;
        if !self.categories.iter().any(|c| c == &category) {
            return Err(invalid(format!(
                "category {category:?} is not one of {}",
                self.categories.join(", ")
            )));
        }

        let topic_title = require_str(obj, "topic_title")?;
        if topic_title.chars().count() > MAX_TITLE_CHARS {
            return Err(invalid(format!("topic_title exceeds {MAX_TITLE_CHARS} characters")));
        }

        let primary_question = require_str(obj, "primary_question")?;

        let related_questions = match obj.get("related_questions") {
            None | Some(Value::Null) => return Err(invalid("missing required field `related_questions`")),
            Some(Value::Array(items)) => items
                .iter()
                .map(|q| match q {
                    Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
                    other => Err(invalid(format!(
                        "related_questions entries must be non-empty strings, got {}",
                        type_name(other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(invalid(format!(
                    "`related_questions` must be an array, got {}",
                    type_name(other)
                )))
            }
        };
        if !(MIN_RELATED..=MAX_RELATED).contains(&related_questions.len()) {
            return Err(invalid(format!(
                "related_questions must have {MIN_RELATED} to {MAX_RELATED} entries, got {}",
                related_questions.len()
            )));
        }

        let blog_angle = require_str(obj, "blog_angle")?;
        let social_angle = require_str(obj, "social_angle")?;

        let why_now = match obj.get("why_now") {
            Some(v @ Value::String(s)) if !s.trim().is_empty() => v.clone(),
            Some(v @ Value::Object(m)) if !m.is_empty() => v.clone(),
            None | Some(Value::Null) => return Err(invalid("missing required field `why_now`")),
            Some(other) => {
                return Err(invalid(format!(
                    "`why_now` must be a non-empty string or object, got {}",
                    type_name(other)
                )))
            }
        };

        let evidence_summary = require_str(obj, "evidence_summary")?;

        Ok(EnrichmentRecord {
            cluster_id: cluster_id.to_string(),
            content_hash: content_hash.to_string(),
            category,
            topic_title,
            primary_question,
            related_questions,
            blog_angle,
            social_angle,
            why_now,
            evidence_summary,
            model_name: response.model_name.clone(),
            model_version: response.model_version.clone(),
            created_at: Utc::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(payload: Value) -> EnrichmentResponse {
        EnrichmentResponse {
            payload,
            model_name: "test-model".to_string(),
            model_version: "1".to_string(),
        }
    }

    fn valid_payload() -> Value {
        json!({
            "category": "SPRING_RECIPES",
            "topic_title": "Asparagus beyond the side dish",
            "primary_question": "How do I cook asparagus so it stays crisp?",
            "related_questions": ["How long to roast?", "Can I freeze it?", "Thick or thin spears?"],
            "blog_angle": "Five weeknight asparagus mains",
            "social_angle": "15-second snap test",
            "why_now": {"reason": "peak season", "trend": "rising"},
            "evidence_summary": "Engagement tripled since February"
        })
    }

    #[test]
    fn test_valid_payload_becomes_record() {
        let schema = EnrichmentSchema::default();
        let record = schema.validate("cl-a", "abc", &response(valid_payload())).unwrap();
        assert_eq!(record.cluster_id, "cl-a");
        assert_eq!(record.content_hash, "abc");
        assert_eq!(record.related_questions.len(), 3);
        assert_eq!(record.model_name, "test-model");
        assert!(record.why_now.is_object());
    }

    #[test]
    fn test_why_now_may_be_a_string() {
        let mut payload = valid_payload();
        payload["why_now"] = json!("spring produce season");
        assert!(EnrichmentSchema::default().validate("cl-a", "h", &response(payload)).is_ok());
    }

    #[test]
    fn test_missing_related_questions_fails() {
        let mut payload = valid_payload();
        payload.as_object_mut().unwrap().remove("related_questions");
        let err = EnrichmentSchema::default()
            .validate("cl-a", "h", &response(payload))
            .unwrap_err();
        assert!(matches!(err, EngineError::SchemaValidation(_)));
        assert!(err.to_string().contains("related_questions"));
    }

    #[test]
    fn test_related_questions_count_bounds() {
        let mut payload = valid_payload();
        payload["related_questions"] = json!(["one", "two"]);
        assert!(EnrichmentSchema::default().validate("c", "h", &response(payload.clone())).is_err());
        payload["related_questions"] = json!(["1", "2", "3", "4", "5", "6"]);
        assert!(EnrichmentSchema::default().validate("c", "h", &response(payload)).is_err());
    }

    #[test]
    fn test_unknown_category_fails() {
        let mut payload = valid_payload();
        payload["category"] = json!("GARDENING");
        assert!(EnrichmentSchema::default().validate("c", "h", &response(payload)).is_err());
    }

    #[test]
    fn test_type_mismatch_fails() {
        let mut payload = valid_payload();
        payload["topic_title"] = json!(42);
        let err = EnrichmentSchema::default()
            .validate("c", "h", &response(payload))
            .unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn test_overlong_title_fails() {
        let mut payload = valid_payload();
        payload["topic_title"] = json!("x".repeat(501));
        assert!(EnrichmentSchema::default().validate("c", "h", &response(payload)).is_err());
    }

    #[test]
    fn test_non_object_payload_fails() {
        assert!(EnrichmentSchema::default()
            .validate("c", "h", &response(json!(["not", "an", "object"])))
            .is_err());
    }
}
