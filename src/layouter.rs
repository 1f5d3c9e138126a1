//! Layouts and nested-view declarations.

use crate::completion::Completion;
use crate::error::{Error, Result};
use crate::loader::{Loader, Resource, ResourceKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Keys that make a layout node a view declaration.
const DECLARATION_KEYS: [&str; 3] = ["view", "layout", "template"];

/// Keys carried over from a layout node into its declaration.
const DECLARATION_FIELDS: [&str; 8] = [
    "view",
    "layout",
    "notToRender",
    "options",
    "template",
    "id",
    "selector",
    "el",
];

/// Which view a declaration asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewRef {
    /// `true`: the default view (or nothing at all, see [`ViewDeclaration::is_placeholder`]);
    /// `false`: explicitly no view.
    Flag(bool),
    /// A view name for the view loader.
    Name(String),
}

/// A layout reference: a stored layout’s name, or the layout itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayoutRef {
    Name(String),
    Defs(Value),
}

/// A child view declared in a layout (or directly on a view).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDeclaration {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_to_render: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub el: Option<String>,
    /// Only honored on directly declared views; layouts can’t set it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_selector: Option<String>,
}

impl ViewDeclaration {
    pub fn new(name: impl Into<String>) -> ViewDeclaration {
        ViewDeclaration {
            name: name.into(),
            ..ViewDeclaration::default()
        }
    }

    /// `view: false`; the slot is kept but nothing is instantiated.
    pub fn is_disabled(&self) -> bool {
        self.view == Some(ViewRef::Flag(false))
    }

    /// `view: true` with neither a layout nor a template.
    ///
    /// Such declarations are not instantiated either; they only exist so the slot’s selector can
    /// be resolved when a view is assigned to it later.
    pub fn is_placeholder(&self) -> bool {
        self.view == Some(ViewRef::Flag(true)) && self.layout.is_none() && self.template.is_none()
    }

    pub fn not_to_render(&self) -> bool {
        self.not_to_render.unwrap_or(false)
    }
}

struct Inner {
    layouts: HashMap<String, Value>,
    declarations: HashMap<String, Arc<Vec<ViewDeclaration>>>,
}

/// Owns layout definitions and flattens them into child-view declarations.
///
/// Cheap to clone; clones share the layout store and the declaration cache.
#[derive(Clone)]
pub struct Layouter {
    inner: Arc<Mutex<Inner>>,
    loader: Arc<dyn Loader>,
}

impl core::fmt::Debug for Layouter {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Layouter")
            .field("layouts", &inner.layouts.keys().collect::<Vec<_>>())
            .field("cached", &inner.declarations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Layouter {
    pub fn new(loader: Arc<dyn Loader>) -> Layouter {
        Layouter {
            inner: Arc::new(Mutex::new(Inner {
                layouts: HashMap::new(),
                declarations: HashMap::new(),
            })),
            loader,
        }
    }

    /// Registers or overwrites a layout.
    ///
    /// Declarations already derived from an older layout under the same name stay cached; use
    /// `no_cache` (or [`clear_cache`](Self::clear_cache)) to see the new one.
    pub fn add_layout(&self, name: &str, layout: Value) {
        self.inner.lock().layouts.insert(name.to_string(), layout);
    }

    pub fn has_layout(&self, name: &str) -> bool {
        self.inner.lock().layouts.contains_key(name)
    }

    pub fn layout(&self, name: &str) -> Option<Value> {
        self.inner.lock().layouts.get(name).cloned()
    }

    /// Drops all derived declarations.
    pub fn clear_cache(&self) {
        self.inner.lock().declarations.clear();
    }

    /// Delivers a layout, loading and storing it first if necessary.
    pub fn get_layout(&self, name: &str, done: Completion<Value>) {
        if let Some(layout) = self.layout(name) {
            return done.ok(layout);
        }

        let inner = Arc::clone(&self.inner);
        let layout_name = name.to_string();
        self.loader.load(
            ResourceKind::Layout,
            name,
            done.map(move |resource: Resource| {
                let layout = resource.into_layout(&layout_name)?;
                inner.lock().layouts.insert(layout_name, layout.clone());
                Ok(layout)
            }),
        );
    }

    /// Flattens a layout into its named child-view declarations, in traversal order.
    ///
    /// - `name`: the layout name; used for the cache and to look up `defs` if omitted.
    /// - `defs`: the layout definition; its `layout` field is the tree that gets walked.
    /// - `no_cache`: skip reading and writing the cache.
    ///
    /// Names are made unique within one call by suffixing `_1`, `_2`, ….
    pub fn find_nested_views(
        &self,
        name: Option<&str>,
        defs: Option<&Value>,
        no_cache: bool,
    ) -> Result<Arc<Vec<ViewDeclaration>>> {
        if name.is_none() && defs.is_none() {
            return Err(Error::configuration(
                "can’t find nested views without a layout name or definition",
            ));
        }

        if let (Some(name), false) = (name, no_cache) {
            if let Some(cached) = self.inner.lock().declarations.get(name) {
                trace!(layout = name, "nested views cache hit");
                return Ok(Arc::clone(cached));
            }
        }

        let stored;
        let defs = match defs {
            Some(defs) => defs,
            None => {
                let name = name.unwrap_or_default();
                stored = self.layout(name).ok_or_else(|| {
                    Error::configuration(format!("can’t find nested views: unknown layout {}", name))
                })?;
                &stored
            }
        };

        let tree = defs.get("layout").ok_or_else(|| {
            Error::configuration(format!(
                "layout {} has no `layout` field",
                name.unwrap_or("<anonymous>")
            ))
        })?;

        let mut declarations = Vec::new();
        seek_declarations(tree, &mut declarations)?;
        let declarations = Arc::new(declarations);

        if let (Some(name), false) = (name, no_cache) {
            self.inner
                .lock()
                .declarations
                .insert(name.to_string(), Arc::clone(&declarations));
        }
        Ok(declarations)
    }
}

fn seek_declarations(tree: &Value, out: &mut Vec<ViewDeclaration>) -> Result<()> {
    let children: Box<dyn Iterator<Item = &Value>> = match tree {
        Value::Object(map) => Box::new(map.values()),
        Value::Array(items) => Box::new(items.iter()),
        _ => return Ok(()),
    };

    for child in children {
        match child {
            Value::Object(map) if DECLARATION_KEYS.iter().any(|k| map.contains_key(*k)) => {
                // declarations without a name are dropped
                if let Some(declaration) = declaration(map, out)? {
                    out.push(declaration);
                }
            }
            Value::Object(_) | Value::Array(_) => seek_declarations(child, out)?,
            _ => {}
        }
    }
    Ok(())
}

fn declaration(node: &Map<String, Value>, taken: &[ViewDeclaration]) -> Result<Option<ViewDeclaration>> {
    let name = match node.get("name") {
        None => return Ok(None),
        Some(Value::String(name)) => unique_name(name, taken),
        Some(other) => {
            return Err(Error::configuration(format!(
                "view declaration name must be a string, got {}",
                other
            )))
        }
    };

    let mut fields: Map<String, Value> = DECLARATION_FIELDS
        .iter()
        .filter_map(|field| node.get(*field).map(|v| (field.to_string(), v.clone())))
        .collect();
    fields.insert("name".into(), Value::String(name.clone()));

    serde_json::from_value(Value::Object(fields))
        .map(Some)
        .map_err(|err| Error::configuration(format!("view declaration {}: {}", name, err)))
}

fn unique_name(name: &str, taken: &[ViewDeclaration]) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|d| d.name == candidate);
    if !is_taken(name) {
        return name.to_string();
    }
    (1..)
        .map(|i| format!("{}_{}", name, i))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| name.to_string())
}
