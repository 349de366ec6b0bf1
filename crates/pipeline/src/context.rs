use nox_tracking::{EntityRef, EntityType, Fields};
use serde_json::Value;

/// The shot or asset (and optionally task) that work is being done for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingContext {
    pub entity: EntityRef,
    /// Shot or asset code, when known.
    pub entity_code: Option<String>,
    pub task_id: Option<i64>,
    /// Pipeline step of the task.
    pub step_id: Option<i64>,
}
impl TrackingContext {
    pub fn new(entity: EntityRef) -> Self {
        Self { entity, entity_code: None, task_id: None, step_id: None }
    }

    pub fn with_task(mut self, task_id: i64) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn task(&self) -> Option<EntityRef> {
        self.task_id.map(|id| EntityRef::new(EntityType::Task, id))
    }

    /// Context as result metadata.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("entity_type".to_string(), Value::String(self.entity.entity_type.to_string()));
        fields.insert("entity_id".to_string(), Value::from(self.entity.id));
        fields.insert("entity_code".to_string(), self.entity_code.clone().map_or(Value::Null, Value::String));
        fields.insert("task_id".to_string(), self.task_id.map_or(Value::Null, Value::from));
        fields.insert("step_id".to_string(), self.step_id.map_or(Value::Null, Value::from));
        fields
    }
}
