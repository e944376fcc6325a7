//! Normalization of raw classification output.
//!
//! Whichever strategy produced it, a raw result passes through here before
//! any other component sees it. Total function: any JSON shape, including
//! non-objects, yields a well-formed [`ClassificationResult`].

use serde_json::Value;

use crate::models::{ActionKind, Category, ClassificationResult, Deadline, TaskType};

/// Enforce the output contract on an untrusted payload.
pub fn normalize(raw: &Value) -> ClassificationResult {
    let Some(obj) = raw.as_object() else {
        return fallback_result("invalid response format");
    };

    let category = obj
        .get("category")
        .and_then(Value::as_str)
        .and_then(|s| Category::parse(&s.to_lowercase()))
        .unwrap_or(Category::Other);

    let importance_score = coerce_score(obj.get("importance_score")).clamp(0, 10);

    let summary = obj
        .get("summary")
        .and_then(scalar_to_string)
        .unwrap_or_default();

    let task_title = obj
        .get("task_title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let task_type = obj
        .get("task_type")
        .and_then(Value::as_str)
        .and_then(|s| TaskType::parse(&s.to_lowercase()))
        .unwrap_or(TaskType::OneTime);

    let action = obj
        .get("action")
        .and_then(Value::as_str)
        .and_then(|s| ActionKind::parse(&s.to_lowercase()))
        .unwrap_or(ActionKind::Info);

    ClassificationResult {
        category,
        importance_score,
        task_title,
        task_type,
        action,
        summary,
        extracted_links: coerce_links(obj.get("extracted_links")),
        extracted_deadlines: coerce_deadlines(obj.get("extracted_deadlines")),
    }
}

fn fallback_result(summary: &str) -> ClassificationResult {
    ClassificationResult {
        category: Category::Other,
        importance_score: 0,
        task_title: None,
        task_type: TaskType::OneTime,
        action: ActionKind::Info,
        summary: summary.to_string(),
        extracted_links: Vec::new(),
        extracted_deadlines: Vec::new(),
    }
}

/// Integer coercion: numbers truncate, numeric strings parse, anything else
/// is 0.
fn coerce_score(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A bare string becomes a single-element list; non-lists become empty;
/// falsy entries are dropped; first-seen order is preserved.
fn coerce_links(value: Option<&Value>) -> Vec<String> {
    let items: Vec<Value> = match value {
        Some(Value::String(s)) => vec![Value::String(s.clone())],
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let mut links = Vec::new();
    for item in &items {
        let falsy = matches!(item, Value::Null | Value::Bool(false))
            || item.as_str().is_some_and(|s| s.is_empty())
            || item.as_i64() == Some(0);
        if falsy {
            continue;
        }
        if let Some(s) = scalar_to_string(item) {
            if !links.contains(&s) {
                links.push(s);
            }
        }
    }
    links
}

/// Deadline coercion: a lone object or string becomes a single-element list;
/// within each item the date resolves from `date`/`date_iso`/`deadline` and
/// the description from `description`/`text`/`summary`; items with neither
/// are dropped; the final list is deduplicated by `(date, description)`.
fn coerce_deadlines(value: Option<&Value>) -> Vec<Deadline> {
    let items: Vec<Value> = match value {
        Some(Value::Array(items)) => items.clone(),
        Some(v @ Value::Object(_)) => vec![v.clone()],
        Some(Value::String(s)) => vec![Value::String(s.clone())],
        _ => Vec::new(),
    };

    let mut deadlines: Vec<Deadline> = Vec::new();
    for item in &items {
        let parsed = match item {
            Value::String(s) if !s.is_empty() => Some(Deadline {
                date: s.clone(),
                description: String::new(),
            }),
            Value::Object(map) => {
                let date = ["date", "date_iso", "deadline"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(scalar_to_string));
                let description = ["description", "text", "summary"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(scalar_to_string));
                if date.is_none() && description.is_none() {
                    None
                } else {
                    Some(Deadline {
                        date: date.unwrap_or_default(),
                        description: description.unwrap_or_default(),
                    })
                }
            }
            _ => None,
        };

        if let Some(d) = parsed {
            if !deadlines
                .iter()
                .any(|e| e.date == d.date && e.description == d.description)
            {
                deadlines.push(d);
            }
        }
    }
    deadlines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_object_input() {
        for raw in [json!(null), json!("text"), json!(42), json!([1, 2])] {
            let result = normalize(&raw);
            assert_eq!(result.category, Category::Other);
            assert_eq!(result.importance_score, 0);
            assert_eq!(result.summary, "invalid response format");
        }
    }

    #[test]
    fn test_score_clamped() {
        assert_eq!(
            normalize(&json!({"importance_score": 15})).importance_score,
            10
        );
        assert_eq!(
            normalize(&json!({"importance_score": -3})).importance_score,
            0
        );
        assert_eq!(
            normalize(&json!({"importance_score": "7"})).importance_score,
            7
        );
        assert_eq!(
            normalize(&json!({"importance_score": "high"})).importance_score,
            0
        );
        assert_eq!(
            normalize(&json!({"importance_score": 6.9})).importance_score,
            6
        );
        assert_eq!(normalize(&json!({})).importance_score, 0);
    }

    #[test]
    fn test_category_whitelist() {
        assert_eq!(
            normalize(&json!({"category": "DEADLINE"})).category,
            Category::Deadline
        );
        assert_eq!(
            normalize(&json!({"category": "spam"})).category,
            Category::Other
        );
        assert_eq!(normalize(&json!({"category": 3})).category, Category::Other);
    }

    #[test]
    fn test_links_coercion() {
        assert_eq!(
            normalize(&json!({"extracted_links": "https://a"})).extracted_links,
            vec!["https://a"]
        );
        assert_eq!(
            normalize(&json!({"extracted_links": {"url": "https://a"}})).extracted_links,
            Vec::<String>::new()
        );
        assert_eq!(
            normalize(&json!({"extracted_links": ["https://a", null, "", "https://a", "https://b"]}))
                .extracted_links,
            vec!["https://a", "https://b"]
        );
    }

    #[test]
    fn test_deadline_coercion() {
        let result = normalize(&json!({"extracted_deadlines": {"date": "20.05.2024"}}));
        assert_eq!(result.extracted_deadlines.len(), 1);
        assert_eq!(result.extracted_deadlines[0].date, "20.05.2024");

        let result = normalize(&json!({"extracted_deadlines": "21.05.2024"}));
        assert_eq!(result.extracted_deadlines[0].date, "21.05.2024");
        assert_eq!(result.extracted_deadlines[0].description, "");

        let result = normalize(&json!({"extracted_deadlines": "not-a-list-but-string"}));
        assert_eq!(result.extracted_deadlines.len(), 1);

        assert!(normalize(&json!({"extracted_deadlines": 7}))
            .extracted_deadlines
            .is_empty());
    }

    #[test]
    fn test_deadline_alternate_keys() {
        let result = normalize(&json!({"extracted_deadlines": [
            {"date_iso": "2024-05-20", "text": "лаба"},
            {"deadline": "22.05", "summary": "отчёт"},
            {"note": "no recognizable keys"},
        ]}));
        assert_eq!(result.extracted_deadlines.len(), 2);
        assert_eq!(result.extracted_deadlines[0].date, "2024-05-20");
        assert_eq!(result.extracted_deadlines[0].description, "лаба");
        assert_eq!(result.extracted_deadlines[1].date, "22.05");
        assert_eq!(result.extracted_deadlines[1].description, "отчёт");
    }

    #[test]
    fn test_deadline_dedupe_first_seen() {
        let result = normalize(&json!({"extracted_deadlines": [
            {"date": "20.05", "description": "a"},
            {"date": "20.05", "description": "a"},
            {"date": "20.05", "description": "b"},
        ]}));
        assert_eq!(result.extracted_deadlines.len(), 2);
    }

    #[test]
    fn test_action_and_task_type_defaults() {
        let result = normalize(&json!({"action": "CANCEL", "task_type": "periodic"}));
        assert_eq!(result.action, ActionKind::Cancel);
        assert_eq!(result.task_type, TaskType::Periodic);

        let result = normalize(&json!({"action": "explode", "task_type": "weekly"}));
        assert_eq!(result.action, ActionKind::Info);
        assert_eq!(result.task_type, TaskType::OneTime);

        let result = normalize(&json!({"action": "completed"}));
        assert_eq!(result.action, ActionKind::Completed);
    }

    #[test]
    fn test_task_title_blank_is_none() {
        assert_eq!(normalize(&json!({"task_title": "  "})).task_title, None);
        assert_eq!(
            normalize(&json!({"task_title": "Лаба 3"})).task_title,
            Some("Лаба 3".to_string())
        );
    }

    #[test]
    fn test_summary_coercion() {
        assert_eq!(normalize(&json!({"summary": 5})).summary, "5");
        assert_eq!(normalize(&json!({})).summary, "");
        assert_eq!(normalize(&json!({"summary": ["x"]})).summary, "");
    }
}
