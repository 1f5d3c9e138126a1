//! Resource loading.
//!
//! Layouts, templates and layout templates all arrive through a [`Loader`]. The default one
//! resolves a path per resource kind and fetches it through a [`Transport`]; anything else (an
//! embedded bundle, a test fixture) can implement `Loader` directly.

use crate::completion::Completion;
use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Kinds of resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A layout definition (JSON).
    Layout,
    /// A view template.
    Template,
    /// A per-layout-type template used to build view templates from layouts.
    LayoutTemplate,
}

/// Loaded resource content.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Text(String),
    Json(Value),
}

impl Resource {
    pub fn into_text(self) -> String {
        match self {
            Resource::Text(text) => text,
            Resource::Json(value) => value.to_string(),
        }
    }

    /// Interprets the resource as a layout, parsing text if necessary.
    pub fn into_layout(self, name: &str) -> Result<Value> {
        match self {
            Resource::Json(value) => Ok(value),
            Resource::Text(text) => serde_json::from_str(&text)
                .map_err(|err| Error::format(format!("layout {}", name), err)),
        }
    }
}

/// Resolves `(kind, name)` to resource content.
pub trait Loader: Send + Sync {
    fn load(&self, kind: ResourceKind, name: &str, done: Completion<Resource>);
}

/// A response from a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

/// Performs GET requests.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, done: Completion<Response>);
}

pub type PathResolver = Arc<dyn Fn(ResourceKind, &str) -> String + Send + Sync>;

/// The default loader: path patterns + a transport, with per-kind overrides.
pub struct DefaultLoader {
    transport: Arc<dyn Transport>,
    config: LoaderConfig,
    path_resolver: Option<PathResolver>,
    custom: HashMap<ResourceKind, Arc<dyn Loader>>,
}

impl DefaultLoader {
    pub fn new(transport: Arc<dyn Transport>, config: LoaderConfig) -> DefaultLoader {
        DefaultLoader {
            transport,
            config,
            path_resolver: None,
            custom: HashMap::new(),
        }
    }

    /// Replaces path resolution for every kind.
    pub fn with_path_resolver(mut self, resolver: PathResolver) -> Self {
        self.path_resolver = Some(resolver);
        self
    }

    /// Routes one kind of resource to a different loader.
    pub fn with_custom_loader(mut self, kind: ResourceKind, loader: Arc<dyn Loader>) -> Self {
        self.custom.insert(kind, loader);
        self
    }

    pub fn url(&self, kind: ResourceKind, name: &str) -> String {
        let path = match &self.path_resolver {
            Some(resolver) => resolver(kind, name),
            None => self.config.paths.resolve(kind, name),
        };
        match self.config.cache_timestamp {
            Some(timestamp) => {
                let separator = if path.contains('?') { '&' } else { '?' };
                format!("{}{}r={}", path, separator, timestamp)
            }
            None => path,
        }
    }
}

impl Loader for DefaultLoader {
    fn load(&self, kind: ResourceKind, name: &str, done: Completion<Resource>) {
        if let Some(custom) = self.custom.get(&kind) {
            return custom.load(kind, name, done);
        }

        let url = self.url(kind, name);
        trace!(?kind, %url, "fetching resource");
        let name = name.to_string();
        self.transport.get(
            &url,
            done.map(move |response: Response| match response.status {
                200..=299 => match kind {
                    ResourceKind::Layout => Resource::Text(response.body)
                        .into_layout(&name)
                        .map(Resource::Json),
                    _ => Ok(Resource::Text(response.body)),
                },
                403 | 404 => Err(Error::NotFound(format!("{:?} {}", kind, name))),
                status => Err(Error::format(
                    format!("{:?} {}", kind, name),
                    format!("unexpected status {}", status),
                )),
            }),
        );
    }
}

/// Serves resources from memory; completes synchronously.
#[derive(Debug, Clone, Default)]
pub struct MapLoader {
    resources: HashMap<(ResourceKind, String), Resource>,
}

impl MapLoader {
    pub fn new() -> MapLoader {
        MapLoader::default()
    }

    pub fn insert(&mut self, kind: ResourceKind, name: &str, resource: Resource) {
        self.resources.insert((kind, name.to_string()), resource);
    }

    pub fn with(mut self, kind: ResourceKind, name: &str, resource: Resource) -> Self {
        self.insert(kind, name, resource);
        self
    }

    pub fn with_text(self, kind: ResourceKind, name: &str, text: &str) -> Self {
        self.with(kind, name, Resource::Text(text.to_string()))
    }
}

impl Loader for MapLoader {
    fn load(&self, kind: ResourceKind, name: &str, done: Completion<Resource>) {
        match self.resources.get(&(kind, name.to_string())) {
            Some(Resource::Text(text)) if kind == ResourceKind::Layout => {
                done.complete(Resource::Text(text.clone()).into_layout(name).map(Resource::Json))
            }
            Some(resource) => done.ok(resource.clone()),
            None => done.fail(Error::NotFound(format!("{:?} {}", kind, name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathConfig;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Answers every request with a canned response and records the URL.
    struct FixedTransport {
        response: Response,
        urls: Mutex<Vec<String>>,
    }

    impl Transport for FixedTransport {
        fn get(&self, url: &str, done: Completion<Response>) {
            self.urls.lock().push(url.to_string());
            done.ok(self.response.clone());
        }
    }

    fn loader(status: u16, body: &str, cache_timestamp: Option<u64>) -> (DefaultLoader, Arc<FixedTransport>) {
        let transport = Arc::new(FixedTransport {
            response: Response {
                status,
                body: body.to_string(),
            },
            urls: Mutex::new(Vec::new()),
        });
        let config = LoaderConfig {
            paths: PathConfig::default(),
            cache_timestamp,
        };
        (DefaultLoader::new(transport.clone(), config), transport)
    }

    fn load(loader: &dyn Loader, kind: ResourceKind, name: &str) -> Result<Resource> {
        let slot = Arc::new(Mutex::new(None));
        let s = Arc::clone(&slot);
        loader.load(kind, name, Completion::new(move |r: Result<Resource>| *s.lock() = Some(r)));
        let result = slot.lock().take().expect("loader completed synchronously");
        result
    }

    #[test]
    fn layouts_are_parsed() {
        let (loader, transport) = loader(200, r#"{"type":"default","layout":[]}"#, Some(42));
        assert_eq!(
            load(&loader, ResourceKind::Layout, "list").unwrap(),
            Resource::Json(json!({ "type": "default", "layout": [] }))
        );
        assert_eq!(*transport.urls.lock(), vec!["res/layouts/list.json?r=42".to_string()]);
    }

    #[test]
    fn malformed_layout_is_a_format_error() {
        let (loader, _) = loader(200, "{ nope", None);
        assert!(matches!(
            load(&loader, ResourceKind::Layout, "list"),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn missing_and_forbidden_are_not_found() {
        for status in [403, 404] {
            let (loader, _) = loader(status, "", None);
            assert!(matches!(
                load(&loader, ResourceKind::Template, "x"),
                Err(Error::NotFound(_))
            ));
        }
    }

    #[test]
    fn custom_loader_and_path_resolver() {
        let (loader, transport) = loader(200, "body", None);
        let loader = loader
            .with_path_resolver(Arc::new(|_: ResourceKind, name: &str| {
                format!("/static/{}", name)
            }))
            .with_custom_loader(
                ResourceKind::LayoutTemplate,
                Arc::new(MapLoader::new().with_text(ResourceKind::LayoutTemplate, "default", "lt")),
            );

        assert_eq!(
            load(&loader, ResourceKind::LayoutTemplate, "default").unwrap(),
            Resource::Text("lt".into())
        );
        assert_eq!(
            load(&loader, ResourceKind::Template, "a").unwrap(),
            Resource::Text("body".into())
        );
        assert_eq!(*transport.urls.lock(), vec!["/static/a".to_string()]);
    }
}
