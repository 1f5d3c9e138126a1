use crate::config::Config;
use crate::dom::{Backend, MemoryBackend};
use crate::error::Result;
use crate::events::{EventHandler, Events};
use crate::factory::{Registry, ViewLoader};
use crate::layouter::{Layouter, ViewDeclaration};
use crate::loader::{Loader, MapLoader};
use crate::render::HtmlJob;
use crate::renderer::{RenderOptions, RenderStrategy, Renderer};
use crate::templator::{Compiler, Template, Templator};
use crate::tree::{CancelToken, Tree, ViewCallback};
use crate::view::{View, ViewId, ViewOptions};
use core::any::Any;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, trace};

/// Identifies a view creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

/// Identifies one view’s part of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct JobId(pub u64);

/// Results of asynchronous work, delivered back to the host.
pub(crate) enum Message {
    ViewLoaded {
        request: RequestId,
        result: Result<Box<dyn View>>,
    },
    LayoutLoaded {
        view: ViewId,
        result: Result<Value>,
    },
    TemplateLoaded {
        job: JobId,
        result: Result<Template>,
    },
    WaitSettled(ViewId),
}

/// A view creation waiting for the view loader.
pub(crate) struct Creation {
    pub parent: Option<ViewId>,
    pub key: Option<String>,
    pub view_name: String,
    pub options: ViewOptions,
    pub token: CancelToken,
    /// Part of the parent’s initial nested-view load.
    pub initial: bool,
    pub selector: Option<String>,
    pub callback: Option<ViewCallback>,
}

/// Owns the view tree and its collaborators.
///
/// Nothing happens in the background: collaborators report back through a queue, and
/// [`poll`](Host::poll) applies whatever has arrived. Collaborators may complete from other
/// threads, but the tree itself is only ever touched from the thread that owns the host.
pub struct Host {
    pub(crate) tree: Tree,
    pub(crate) layouter: Layouter,
    pub(crate) templator: Templator,
    pub(crate) renderer: Renderer,
    pub(crate) view_loader: Arc<dyn ViewLoader>,
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) config: Config,
    pub(crate) precompiled: HashMap<String, Template>,
    helper: Option<Arc<dyn Any + Send + Sync>>,
    pub(crate) sender: Sender<Message>,
    receiver: Receiver<Message>,
    pub(crate) creations: HashMap<RequestId, Creation>,
    pub(crate) jobs: HashMap<JobId, HtmlJob>,
    counter: u64,
}

impl core::fmt::Debug for Host {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Host")
            .field("views", &self.tree.len())
            .field("creations", &self.creations.len())
            .field("jobs", &self.jobs.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Configures a [`Host`].
///
/// Everything is optional: without a loader nothing can be loaded, without a view loader only
/// the default view exists, and without a backend markup goes to a fresh [`MemoryBackend`].
#[derive(Default)]
pub struct HostBuilder {
    config: Config,
    loader: Option<Arc<dyn Loader>>,
    view_loader: Option<Arc<dyn ViewLoader>>,
    backend: Option<Box<dyn Backend>>,
    compiler: Option<Compiler>,
    strategy: Option<RenderStrategy>,
    render_options: RenderOptions,
    precompiled: HashMap<String, Template>,
    layouts: Vec<(String, Value)>,
    helper: Option<Arc<dyn Any + Send + Sync>>,
}

impl HostBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn view_loader(mut self, view_loader: Arc<dyn ViewLoader>) -> Self {
        self.view_loader = Some(view_loader);
        self
    }

    pub fn backend<B: 'static + Backend>(mut self, backend: B) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    pub fn compiler(mut self, compiler: Compiler) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn render_strategy(mut self, strategy: RenderStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn render_options(mut self, options: RenderOptions) -> Self {
        self.render_options = options;
        self
    }

    /// Templates used by name before asking the templator.
    pub fn precompiled(mut self, name: &str, template: Template) -> Self {
        self.precompiled.insert(name.to_string(), template);
        self
    }

    pub fn layout(mut self, name: &str, layout: Value) -> Self {
        self.layouts.push((name.to_string(), layout));
        self
    }

    /// An application object views can reach through [`Host::helper`].
    pub fn helper<T: 'static + Any + Send + Sync>(mut self, helper: T) -> Self {
        self.helper = Some(Arc::new(helper));
        self
    }

    pub fn build(self) -> Host {
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(MapLoader::new()) as Arc<dyn Loader>);
        let layouter = Layouter::new(Arc::clone(&loader));
        for (name, layout) in self.layouts {
            layouter.add_layout(&name, layout);
        }

        let mut templator = Templator::new(loader)
            .with_layouter(layouter.clone())
            .with_compilable(self.config.compilable)
            .with_default_layout_type(self.config.default_layout_type.clone());
        if let Some(compiler) = self.compiler {
            templator = templator.with_compiler(compiler);
        }

        let (sender, receiver) = channel::unbounded();

        Host {
            tree: Tree::new(),
            layouter,
            templator,
            renderer: Renderer::new(self.strategy, self.render_options),
            view_loader: self
                .view_loader
                .unwrap_or_else(|| Arc::new(Registry::new()) as Arc<dyn ViewLoader>),
            backend: self
                .backend
                .unwrap_or_else(|| Box::new(MemoryBackend::new()) as Box<dyn Backend>),
            config: self.config,
            precompiled: self.precompiled,
            helper: self.helper,
            sender,
            receiver,
            creations: HashMap::new(),
            jobs: HashMap::new(),
            counter: 0,
        }
    }
}

impl Host {
    pub fn builder() -> HostBuilder {
        HostBuilder::default()
    }

    /// Applies all results that have arrived so far.
    ///
    /// Returns the number of results applied. Stops at the first error; anything after it stays
    /// queued for the next call.
    pub fn poll(&mut self) -> Result<usize> {
        let mut handled = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(message) => {
                    handled += 1;
                    self.handle(message)?;
                }
                Err(TryRecvError::Empty) => break,
                // the host holds a sender itself
                Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(handled)
    }

    fn handle(&mut self, message: Message) -> Result<()> {
        match message {
            Message::ViewLoaded { request, result } => self.view_loaded(request, result),
            Message::LayoutLoaded { view, result } => match result {
                Ok(layout) => self.load_nested_views(view, Some(layout)),
                Err(err) => {
                    error!(view = %view, error = %err, "failed to load layout");
                    Err(err)
                }
            },
            Message::TemplateLoaded { job, result } => self.finish_template(job, result),
            Message::WaitSettled(view) => {
                trace!(view = %view, "wait settled");
                if let Some(node) = self.tree.get_mut(view) {
                    node.gate.pending = node.gate.pending.saturating_sub(1);
                }
                self.try_ready(view);
                Ok(())
            }
        }
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    pub(crate) fn next_request(&mut self) -> RequestId {
        RequestId(self.next_id())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layouter(&self) -> &Layouter {
        &self.layouter
    }

    pub fn templator(&self) -> &Templator {
        &self.templator
    }

    pub fn backend(&self) -> &dyn Backend {
        &*self.backend
    }

    pub fn helper<T: 'static + Any + Send + Sync>(&self) -> Option<&T> {
        self.helper.as_deref()?.downcast_ref()
    }

    /// True if the view exists and hasn’t been removed.
    pub fn contains(&self, id: ViewId) -> bool {
        self.tree.contains(id)
    }

    pub fn view<T: View>(&self, id: ViewId) -> Option<&T> {
        self.tree.get(id)?.view.as_any().downcast_ref()
    }

    pub fn view_mut<T: View>(&mut self, id: ViewId) -> Option<&mut T> {
        self.tree.get_mut(id)?.view.as_any_mut().downcast_mut()
    }

    pub fn options(&self, id: ViewId) -> Option<&ViewOptions> {
        Some(&self.tree.get(id)?.options)
    }

    pub fn is_ready(&self, id: ViewId) -> bool {
        self.tree.get(id).map_or(false, |node| node.flags.ready)
    }

    pub fn is_rendered(&self, id: ViewId) -> bool {
        self.tree.get(id).map_or(false, |node| node.flags.rendered)
    }

    pub fn is_fully_rendered(&self, id: ViewId) -> bool {
        self.tree.get(id).map_or(false, |node| node.flags.fully_rendered)
    }

    pub fn is_being_rendered(&self, id: ViewId) -> bool {
        self.tree.get(id).map_or(false, |node| node.flags.being_rendered)
    }

    pub fn is_removed(&self, id: ViewId) -> bool {
        self.tree.is_removed(id)
    }

    /// Whether the view’s element has been bound to rendered markup.
    pub fn is_element_bound(&self, id: ViewId) -> bool {
        self.tree.get(id).map_or(false, |node| node.flags.element_bound)
    }

    pub fn path(&self, id: ViewId) -> Option<&str> {
        Some(&self.tree.get(id)?.path)
    }

    pub fn parent(&self, id: ViewId) -> Option<ViewId> {
        self.tree.get(id)?.parent
    }

    pub fn key(&self, id: ViewId) -> Option<&str> {
        self.tree.get(id)?.key.as_deref()
    }

    pub fn selector(&self, id: ViewId) -> Option<&str> {
        self.tree.get(id)?.selector.as_deref()
    }

    pub fn set_selector(&mut self, id: ViewId, selector: &str) {
        if let Some(node) = self.tree.get_mut(id) {
            node.selector = Some(selector.to_string());
            node.flags.element_bound = false;
        }
    }

    pub fn get_view(&self, id: ViewId, key: &str) -> Option<ViewId> {
        self.tree.get(id)?.children.get(key).copied()
    }

    pub fn has_view(&self, id: ViewId, key: &str) -> bool {
        self.get_view(id, key).is_some()
    }

    /// Nested views, sorted by key.
    pub fn views(&self, id: ViewId) -> Vec<(String, ViewId)> {
        let mut views: Vec<_> = match self.tree.get(id) {
            Some(node) => node
                .children
                .iter()
                .map(|(key, child)| (key.clone(), *child))
                .collect(),
            None => Vec::new(),
        };
        views.sort_by(|a, b| a.0.cmp(&b.0));
        views
    }

    /// The declaration a nested view was (or will be) created from.
    pub fn declaration(&self, id: ViewId, key: &str) -> Option<&ViewDeclaration> {
        self.tree.get(id)?.declarations.get(key)
    }

    /// The view’s event registry.
    pub fn events(&self, id: ViewId) -> Option<Events> {
        Some(self.tree.get(id)?.events.clone())
    }

    /// Subscribes a view to another object’s events until it is removed.
    pub fn listen_to(&mut self, id: ViewId, target: &Events, names: &str, handler: EventHandler) {
        if let Some(node) = self.tree.get_mut(id) {
            node.listening.listen_to(target, names, handler);
        }
    }

    pub fn listen_to_once(&mut self, id: ViewId, target: &Events, names: &str, handler: EventHandler) {
        if let Some(node) = self.tree.get_mut(id) {
            node.listening.listen_to_once(target, names, handler);
        }
    }

    pub fn stop_listening(&mut self, id: ViewId, target: Option<&Events>, names: Option<&str>) {
        if let Some(node) = self.tree.get_mut(id) {
            node.listening.stop_listening(target, names);
        }
    }
}
