//! Degraded handler variant returning sample data.
//!
//! Used when no backend client is configured for a service. Results are
//! shaped like the live service's results and tagged `"mode": "mock"`.

use crate::capability::CapabilitySet;
use crate::schema::{ServiceSchema, ServiceSpec};
use crate::service::{ServiceFault, ServiceHandler, ServiceMode};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tripwire_core::{Action, Timestamp};
use uuid::Uuid;

/// Sample rows returned by `list` and `search`
const MAX_SAMPLE_ITEMS: u64 = 5;
/// `limit`/`max_results` when absent
const DEFAULT_PAGE: u64 = 10;

/// Mock handler for one service
pub struct MockService {
    spec: ServiceSpec,
}

impl MockService {
    /// Create from a spec
    #[must_use]
    pub fn new(spec: ServiceSpec) -> Self {
        Self { spec }
    }

    fn item_label<'a>(&'a self, item_type: Option<&'a str>) -> &'a str {
        item_type.unwrap_or(&self.spec.name)
    }

    fn create(&self, payload: &Map<String, Value>, item: &str) -> Value {
        let id = format!("{}_{}", item, Uuid::new_v4().simple());
        let mut record = payload.clone();
        record.insert("id".to_string(), Value::String(id.clone()));
        record.insert("type".to_string(), Value::String(item.to_string()));
        record.insert("status".to_string(), Value::String("active".to_string()));
        record.insert(
            "created_at".to_string(),
            Value::String(Timestamp::now().to_rfc3339()),
        );
        json!({
            "id": id,
            "item": record,
            "message": format!("{} created successfully", item),
        })
    }

    fn read(&self, id: &Value, item: &str) -> Value {
        json!({
            "item": {
                "id": id,
                "type": item,
                "content": format!("Sample {} content", item),
                "status": "active",
            }
        })
    }

    fn update(&self, payload: &Map<String, Value>, id: &Value, item: &str) -> Value {
        let updates = payload
            .get("updates")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        json!({
            "item": {
                "id": id,
                "type": item,
                "updates": updates,
                "status": "updated",
            },
            "message": format!("{} updated successfully", item),
        })
    }

    fn delete(&self, id: &Value, item: &str) -> Value {
        json!({
            "id": id,
            "deleted": true,
            "message": format!("{} deleted successfully", item),
        })
    }

    fn list(&self, payload: &Map<String, Value>, item: &str) -> Result<Value, ServiceFault> {
        let limit = page_size(payload, "limit")?;
        let items: Vec<Value> = (1..=limit.min(MAX_SAMPLE_ITEMS))
            .map(|i| {
                json!({
                    "id": format!("{}_{}", item, i),
                    "type": item,
                    "content": format!("Sample {} {}", item, i),
                    "status": "active",
                })
            })
            .collect();
        Ok(json!({ "count": items.len(), "items": items }))
    }

    fn search(&self, payload: &Map<String, Value>, item: &str) -> Result<Value, ServiceFault> {
        let query = match payload.get("query") {
            Some(Value::String(q)) if !q.trim().is_empty() => q.clone(),
            Some(Value::String(_)) | None => {
                return Err(ServiceFault::MissingField {
                    field: "query".to_string(),
                    action: Action::Search,
                });
            }
            Some(_) => {
                return Err(ServiceFault::InvalidField {
                    field: "query".to_string(),
                    reason: "expected a string".to_string(),
                });
            }
        };
        let max_results = page_size(payload, "max_results")?;
        let results: Vec<Value> = (1..=max_results.min(MAX_SAMPLE_ITEMS))
            .map(|i| {
                json!({
                    "id": format!("result_{}", i),
                    "type": item,
                    "content": format!("Search result {} for '{}'", i, query),
                    "relevance": 1.0 - (i as f64) * 0.1,
                })
            })
            .collect();
        Ok(json!({ "count": results.len(), "query": query, "results": results }))
    }
}

#[async_trait]
impl ServiceHandler for MockService {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.spec.capabilities
    }

    fn mode(&self) -> ServiceMode {
        ServiceMode::Mock
    }

    fn schema(&self) -> ServiceSchema {
        self.spec.schema.clone()
    }

    async fn execute(
        &self,
        action: Action,
        payload: &Map<String, Value>,
        item_type: Option<&str>,
    ) -> Result<Value, ServiceFault> {
        if !self.spec.capabilities.supports_action(action) {
            return Err(ServiceFault::Unsupported {
                service: self.spec.name.clone(),
                action,
                item_type: item_type.unwrap_or("*").to_string(),
            });
        }

        let item = self.item_label(item_type);
        let mut result = match action {
            Action::Create => self.create(payload, item),
            Action::Read => self.read(require_id(payload, action)?, item),
            Action::Update => self.update(payload, require_id(payload, action)?, item),
            Action::Delete => self.delete(require_id(payload, action)?, item),
            Action::List => self.list(payload, item)?,
            Action::Search => self.search(payload, item)?,
        };

        if let Value::Object(map) = &mut result {
            map.insert("mode".to_string(), Value::String("mock".to_string()));
            map.insert("service".to_string(), Value::String(self.spec.name.clone()));
        }
        Ok(result)
    }
}

/// `payload.id`, as a non-empty string or a number
fn require_id(payload: &Map<String, Value>, action: Action) -> Result<&Value, ServiceFault> {
    match payload.get("id") {
        Some(id @ Value::Number(_)) => Ok(id),
        Some(id @ Value::String(s)) if !s.is_empty() => Ok(id),
        Some(Value::String(_)) | Some(Value::Null) | None => Err(ServiceFault::MissingField {
            field: "id".to_string(),
            action,
        }),
        Some(_) => Err(ServiceFault::InvalidField {
            field: "id".to_string(),
            reason: "expected a string or number".to_string(),
        }),
    }
}

/// Non-negative integer page size, defaulting when absent
fn page_size(payload: &Map<String, Value>, key: &str) -> Result<u64, ServiceFault> {
    match payload.get(key) {
        None | Some(Value::Null) => Ok(DEFAULT_PAGE),
        Some(value) => value.as_u64().ok_or_else(|| ServiceFault::InvalidField {
            field: key.to_string(),
            reason: "expected a non-negative integer".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn todoist() -> MockService {
        MockService::new(builtin::todoist())
    }

    #[tokio::test]
    async fn test_mock_create_echoes_payload() {
        let result = todoist()
            .execute(Action::Create, &payload(json!({"content": "Buy milk"})), Some("task"))
            .await
            .unwrap();

        assert_eq!(result["item"]["content"], "Buy milk");
        assert_eq!(result["item"]["type"], "task");
        assert!(result["id"].as_str().unwrap().starts_with("task_"));
        assert_eq!(result["mode"], "mock");
    }

    #[tokio::test]
    async fn test_mock_read_requires_id() {
        let service = todoist();
        let err = service
            .execute(Action::Read, &Map::new(), Some("task"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceFault::MissingField {
                field: "id".to_string(),
                action: Action::Read
            }
        );

        let ok = service
            .execute(Action::Read, &payload(json!({"id": 42})), Some("task"))
            .await
            .unwrap();
        assert_eq!(ok["item"]["id"], 42);
    }

    #[tokio::test]
    async fn test_mock_update_and_delete() {
        let service = MockService::new(builtin::gcal());
        let updated = service
            .execute(
                Action::Update,
                &payload(json!({"id": "evt_1", "updates": {"summary": "Standup"}})),
                Some("event"),
            )
            .await
            .unwrap();
        assert_eq!(updated["item"]["updates"]["summary"], "Standup");

        let deleted = service
            .execute(Action::Delete, &payload(json!({"id": "evt_1"})), Some("event"))
            .await
            .unwrap();
        assert_eq!(deleted["deleted"], true);
    }

    #[tokio::test]
    async fn test_mock_list_caps_at_five() {
        let service = MockService::new(builtin::gmail());
        let all = service
            .execute(Action::List, &payload(json!({"limit": 50})), Some("email"))
            .await
            .unwrap();
        assert_eq!(all["count"], 5);

        let two = service
            .execute(Action::List, &payload(json!({"limit": 2})), Some("email"))
            .await
            .unwrap();
        assert_eq!(two["items"].as_array().unwrap().len(), 2);

        let bad = service
            .execute(Action::List, &payload(json!({"limit": "ten"})), Some("email"))
            .await;
        assert!(matches!(bad, Err(ServiceFault::InvalidField { .. })));
    }

    #[tokio::test]
    async fn test_mock_search() {
        let service = MockService::new(builtin::deep_pcb());
        let result = service
            .execute(
                Action::Search,
                &payload(json!({"query": "resistor", "max_results": 3})),
                Some("component"),
            )
            .await
            .unwrap();
        assert_eq!(result["count"], 3);
        assert_eq!(result["query"], "resistor");

        let missing = service
            .execute(Action::Search, &Map::new(), Some("component"))
            .await;
        assert!(matches!(missing, Err(ServiceFault::MissingField { .. })));
    }

    #[test]
    fn test_mock_mode_and_schema() {
        let service = todoist();
        assert_eq!(service.mode(), ServiceMode::Mock);
        assert_eq!(service.schema().service, "todoist");
        assert_eq!(service.name(), "todoist");
    }
}
