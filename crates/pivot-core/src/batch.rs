use serde::{Deserialize, Serialize};

use crate::types::Task;

/// One field on the request shape shared by the items of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name
    pub name: String,
    /// Other fields this one is validated against
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl FieldSpec {
    /// Creates an independent field.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
        }
    }

    /// Marks the field as depending on `other`.
    #[must_use]
    pub fn depending_on(mut self, other: impl Into<String>) -> Self {
        self.depends_on.push(other.into());
        self
    }

    /// Whether the field carries a cross-field dependency.
    pub fn is_dependent(&self) -> bool {
        !self.depends_on.is_empty()
    }
}

/// Shape of the request each task in a batch sends to the work primitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestShape {
    /// Declared fields
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl RequestShape {
    /// Creates a shape from its fields.
    #[must_use]
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }
}

/// A batch of independent tasks plus the metadata used to analyse it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchDescriptor {
    /// Batch name, used in logs
    #[serde(default)]
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Tasks in caller order
    #[serde(default, alias = "instruct_models")]
    pub tasks: Vec<Task>,
    /// Request shape of the items, when known
    #[serde(default)]
    pub request_shape: Option<RequestShape>,
}

impl BatchDescriptor {
    /// Creates an empty batch.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the tasks.
    #[must_use]
    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Sets the request shape.
    #[must_use]
    pub fn with_request_shape(mut self, request_shape: RequestShape) -> Self {
        self.request_shape = Some(request_shape);
        self
    }

    /// Appends a task.
    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the batch has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_value, json};

    #[test]
    fn test_batch_accepts_instruct_models_alias() {
        let batch: BatchDescriptor = match from_value(json!({
            "name": "plan",
            "instruct_models": [
                {"payload": {"instruction": "step one"}},
                {"payload": {"instruction": "step two"}, "operation": "plan"}
            ],
            "request_shape": {
                "fields": [
                    {"name": "instruction"},
                    {"name": "context", "depends_on": ["instruction"]}
                ]
            }
        })) {
            Ok(batch) => batch,
            Err(error) => panic!("deserialize failed: {error}"),
        };

        assert_eq!(batch.len(), 2);
        let shape = batch.request_shape.unwrap_or_default();
        assert_eq!(shape.fields.len(), 2);
        assert!(!shape.fields[0].is_dependent());
        assert!(shape.fields[1].is_dependent());
    }

    #[test]
    fn test_builder() {
        let mut batch = BatchDescriptor::new("demo").with_description("two tasks");
        assert!(batch.is_empty());
        batch.add_task(Task::new(json!("a")));
        batch.add_task(Task::new(json!("b")));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.description.as_deref(), Some("two tasks"));
    }
}
