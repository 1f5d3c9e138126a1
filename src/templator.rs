//! Template resolution.
//!
//! A template is either fetched by name, or built from a layout: the layout’s type picks a
//! *layout template*, which is interpolated with the layout to produce the view template.
//! Both are cached independently.

use crate::completion::Completion;
use crate::error::{Error, Result};
use crate::interpolate::{interpolate, Syntax};
use crate::layouter::Layouter;
use crate::loader::{Loader, Resource, ResourceKind};
use crate::renderer::RenderOptions;
use core::fmt;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

pub type TemplateFn = Arc<dyn Fn(&Value, &RenderOptions) -> String + Send + Sync>;
pub type Compiler = Arc<dyn Fn(&str) -> Result<Template> + Send + Sync>;

/// A renderable template.
#[derive(Clone)]
pub enum Template {
    /// Uncompiled template text.
    Source(Arc<str>),
    /// A compiled template.
    Compiled(TemplateFn),
}

impl Template {
    pub fn source(source: impl Into<Arc<str>>) -> Template {
        Template::Source(source.into())
    }

    pub fn compiled<F>(f: F) -> Template
    where
        F: 'static + Fn(&Value, &RenderOptions) -> String + Send + Sync,
    {
        Template::Compiled(Arc::new(f))
    }

    pub fn as_source(&self) -> Option<&str> {
        match self {
            Template::Source(source) => Some(source),
            Template::Compiled(_) => None,
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Template::Source(source) => write!(f, "Source({:?})", source),
            Template::Compiled(func) => write!(f, "Compiled({:p})", Arc::as_ptr(func) as *const u8),
        }
    }
}

/// Where to build a template from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutOptions {
    /// A stored (or loadable) layout name.
    pub name: Option<String>,
    /// A literal layout; takes precedence over `name`.
    pub layout: Option<Value>,
    /// Merged on top of the layout before interpolation.
    pub data: Map<String, Value>,
}

impl LayoutOptions {
    fn is_requested(&self) -> bool {
        self.name.is_some() || self.layout.is_some()
    }
}

#[derive(Default)]
struct Caches {
    templates: HashMap<String, Template>,
    layout_templates: HashMap<String, Template>,
}

/// Resolves templates.
///
/// Cheap to clone; clones share caches.
#[derive(Clone)]
pub struct Templator {
    caches: Arc<Mutex<Caches>>,
    loader: Arc<dyn Loader>,
    layouter: Option<Layouter>,
    compiler: Option<Compiler>,
    compilable: bool,
    default_layout_type: String,
}

impl fmt::Debug for Templator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let caches = self.caches.lock();
        f.debug_struct("Templator")
            .field("templates", &caches.templates.keys().collect::<Vec<_>>())
            .field("layout_templates", &caches.layout_templates.keys().collect::<Vec<_>>())
            .field("compilable", &self.compilable)
            .finish()
    }
}

impl Templator {
    pub fn new(loader: Arc<dyn Loader>) -> Templator {
        Templator {
            caches: Arc::new(Mutex::new(Caches::default())),
            loader,
            layouter: None,
            compiler: None,
            compilable: false,
            default_layout_type: "default".into(),
        }
    }

    pub fn with_layouter(mut self, layouter: Layouter) -> Self {
        self.layouter = Some(layouter);
        self
    }

    pub fn with_compiler(mut self, compiler: Compiler) -> Self {
        self.compiler = Some(compiler);
        self
    }

    /// In compilable mode, loaded and built templates are compiled before caching.
    pub fn with_compilable(mut self, compilable: bool) -> Self {
        self.compilable = compilable;
        self
    }

    pub fn with_default_layout_type(mut self, layout_type: impl Into<String>) -> Self {
        self.default_layout_type = layout_type.into();
        self
    }

    pub fn is_compilable(&self) -> bool {
        self.compilable
    }

    /// Compiles template text; without a compiler this is the identity.
    pub fn compile_template(&self, raw: &str) -> Result<Template> {
        match &self.compiler {
            Some(compiler) => compiler(raw),
            None => Ok(Template::source(raw)),
        }
    }

    fn prepare(&self, raw: &str) -> Result<Template> {
        if self.compilable {
            self.compile_template(raw)
        } else {
            Ok(Template::source(raw))
        }
    }

    /// Returns a cached template without loading anything.
    pub fn cached(&self, name: &str) -> Option<Template> {
        self.caches.lock().templates.get(name).cloned()
    }

    /// Resolves a template by name, or builds one from a layout.
    ///
    /// Returns an error right away if neither a name nor a layout was given; everything else is
    /// reported through `done`.
    pub fn get_template(
        &self,
        name: Option<&str>,
        layout: Option<&LayoutOptions>,
        no_cache: bool,
        done: Completion<Template>,
    ) -> Result<()> {
        let layout = layout.filter(|layout| layout.is_requested());
        if name.is_none() && layout.is_none() {
            return Err(Error::configuration(
                "can’t get a template without a name or a layout",
            ));
        }

        if let (Some(name), false) = (name, no_cache) {
            if let Some(template) = self.cached(name) {
                trace!(template = name, "template cache hit");
                done.ok(template);
                return Ok(());
            }
        }

        match layout {
            None => self.load_template(name.unwrap_or_default(), no_cache, done),
            Some(layout) => self.build_template(name.map(str::to_string), layout.clone(), no_cache, done),
        }
        Ok(())
    }

    fn load_template(&self, name: &str, no_cache: bool, done: Completion<Template>) {
        let this = self.clone();
        let key = name.to_string();
        self.loader.load(
            ResourceKind::Template,
            name,
            done.map(move |resource: Resource| {
                let template = this.prepare(&resource.into_text())?;
                if !no_cache {
                    this.caches.lock().templates.insert(key, template.clone());
                }
                Ok(template)
            }),
        );
    }

    fn build_template(
        &self,
        name: Option<String>,
        options: LayoutOptions,
        no_cache: bool,
        done: Completion<Template>,
    ) {
        if let Some(layout) = options.layout {
            return self.build_from_layout(name, layout, options.data, no_cache, done);
        }

        let layout_name = options.name.unwrap_or_default();
        let layouter = match &self.layouter {
            Some(layouter) => layouter.clone(),
            None => {
                return done.fail(Error::configuration(format!(
                    "can’t build a template from layout {} without a layouter",
                    layout_name
                )))
            }
        };

        let this = self.clone();
        let data = options.data;
        let missing = layout_name.clone();
        layouter.get_layout(
            &layout_name,
            Completion::new(move |result: Result<Value>| match result {
                Ok(layout) => this.build_from_layout(name, layout, data, no_cache, done),
                Err(Error::NotFound(_)) => done.fail(Error::configuration(format!(
                    "can’t build a template: layout {} not found",
                    missing
                ))),
                Err(err) => done.fail(err),
            }),
        );
    }

    fn build_from_layout(
        &self,
        name: Option<String>,
        layout: Value,
        data: Map<String, Value>,
        no_cache: bool,
        done: Completion<Template>,
    ) {
        let layout_type = layout
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_layout_type)
            .to_string();

        let this = self.clone();
        self.get_layout_template(
            &layout_type,
            Completion::new(move |result: Result<Template>| {
                let built = result.and_then(|layout_template| {
                    let data = merge_layout_data(layout, data);
                    let source = match layout_template {
                        Template::Source(source) => interpolate(&source, &data, Syntax::Layout)?,
                        Template::Compiled(f) => f(&data, &RenderOptions::default()),
                    };
                    let template = this.prepare(&source)?;
                    if let (Some(name), false) = (name, no_cache) {
                        this.caches.lock().templates.insert(name, template.clone());
                    }
                    Ok(template)
                });
                done.complete(built)
            }),
        );
    }

    /// Delivers the layout template for a layout type; loaded once per type.
    fn get_layout_template(&self, layout_type: &str, done: Completion<Template>) {
        let cached = self.caches.lock().layout_templates.get(layout_type).cloned();
        if let Some(template) = cached {
            return done.ok(template);
        }

        let caches = Arc::clone(&self.caches);
        let key = layout_type.to_string();
        self.loader.load(
            ResourceKind::LayoutTemplate,
            layout_type,
            done.map(move |resource: Resource| {
                let template = Template::source(resource.into_text());
                caches.lock().layout_templates.insert(key, template.clone());
                Ok(template)
            }),
        );
    }
}

fn merge_layout_data(layout: Value, data: Map<String, Value>) -> Value {
    let mut merged = match layout {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("layout".into(), other);
            map
        }
    };
    merged.extend(data);
    Value::Object(merged)
}
