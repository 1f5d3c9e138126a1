use crate::events::Events;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A data object views can be bound to.
///
/// Cheap to clone; clones share attributes and events. Setting an attribute triggers
/// `change:<attribute>` and then `change`.
#[derive(Debug, Clone, Default)]
pub struct Model {
    attributes: Arc<Mutex<Map<String, Value>>>,
    events: Events,
}

impl Model {
    pub fn new(attributes: Map<String, Value>) -> Model {
        Model {
            attributes: Arc::new(Mutex::new(attributes)),
            events: Events::new(),
        }
    }

    pub fn get(&self, attribute: &str) -> Option<Value> {
        self.attributes.lock().get(attribute).cloned()
    }

    pub fn set(&self, attribute: &str, value: Value) {
        let changed = {
            let mut attributes = self.attributes.lock();
            let changed = attributes.get(attribute) != Some(&value);
            attributes.insert(attribute.to_string(), value.clone());
            changed
        };
        if changed {
            self.events
                .trigger(&format!("change:{}", attribute), &[value]);
            self.events.trigger("change", &[]);
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.attributes.lock().clone())
    }

    pub fn events(&self) -> &Events {
        &self.events
    }
}
