use crate::events::{EventHandler, Events, Listening};
use crate::host::Message;
use crate::layouter::{LayoutRef, ViewDeclaration};
use crate::model::Model;
use crate::templator::Template;
use core::any::Any;
use core::fmt;
use crossbeam::channel::Sender;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use uuid::Uuid;

/// A unique identifier for a view.
///
/// (this is just a UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(Uuid);

impl ViewId {
    pub(crate) fn new() -> ViewId {
        ViewId(Uuid::new_v4())
    }

    /// The id as written into `data-view-cid` attributes.
    pub fn cid(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Implements the `View` trait for a given struct.
///
/// Syntax:
///
/// ```text
/// impl_view! {
///     StructName;
///     (override hooks like setup() or data() here, using normal rust syntax)
/// }
/// ```
#[macro_export]
macro_rules! impl_view {
    (
        $(#[$attr:meta])*
        $struct:ty;
        $($extra:tt)*
    ) => {
        $(#[$attr])*
        impl $crate::View for $struct {
            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
                self
            }

            $($extra)*
        }
    };
}

/// User behavior of a view.
///
/// Everything declarative (template, layout, nested views, selectors) lives in
/// [`ViewOptions`]; the three setup hooks run once, in order, during initialization and may
/// adjust those options through [`Setup`]. The remaining hooks run while rendering and removing.
///
/// This trait should probably be implemented using the [`impl_view`] macro.
pub trait View: Any + fmt::Debug + Send {
    fn init(&mut self, _setup: &mut Setup) {}

    fn setup(&mut self, _setup: &mut Setup) {}

    fn setup_final(&mut self, _setup: &mut Setup) {}

    /// Template data; nested view markup is merged on top of this.
    fn data(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Last chance to adjust template data.
    fn handle_data_before_render(&self, _data: &mut Map<String, Value>) {}

    /// Called once the view’s markup is in place, after its nested views’.
    fn after_render(&mut self) {}

    /// Called while the view is being removed, after its nested views are gone.
    fn on_remove(&mut self) {}

    /// For downcasting.
    fn as_any(&self) -> &dyn Any;

    /// For downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A view with no behavior of its own; registered as the default view.
#[derive(Debug, Default)]
pub struct BaseView;

impl_view! {
    BaseView;
}

/// Which template a view renders.
#[derive(Debug, Clone)]
pub enum TemplateRef {
    /// Resolved through the templator.
    Name(String),
    /// Literal template text.
    Content(String),
    Compiled(Template),
}

/// Per-view configuration.
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    /// The name the view was created under.
    pub name: Option<String>,
    pub template: Option<TemplateRef>,
    pub layout: Option<LayoutRef>,
    /// Merged into the layout when building a template from it.
    pub layout_data: Map<String, Value>,
    /// If true, the parent doesn’t include this view’s markup in its own.
    pub not_to_render: bool,
    /// Bypass layout and template caches.
    pub no_cache: bool,
    /// Keys of `options` forwarded to nested views.
    pub options_to_pass: Vec<String>,
    /// Nested views declared directly instead of through a layout.
    pub views: IndexMap<String, ViewDeclaration>,
    /// Full selector of the view’s element.
    pub el: Option<String>,
    /// Selector relative to the parent’s element.
    pub selector: Option<String>,
    /// Component views have exactly one root element and replace their element on render.
    pub is_component: bool,
    pub model: Option<Model>,
    pub collection: Option<Model>,
    /// Free-form options.
    pub options: Map<String, Value>,
}

impl ViewOptions {
    pub fn new() -> ViewOptions {
        ViewOptions::default()
    }

    pub fn with_template(mut self, name: &str) -> Self {
        self.template = Some(TemplateRef::Name(name.to_string()));
        self
    }

    pub fn with_template_content(mut self, content: &str) -> Self {
        self.template = Some(TemplateRef::Content(content.to_string()));
        self
    }

    pub fn with_layout(mut self, name: &str) -> Self {
        self.layout = Some(LayoutRef::Name(name.to_string()));
        self
    }

    pub fn with_layout_defs(mut self, defs: Value) -> Self {
        self.layout = Some(LayoutRef::Defs(defs));
        self
    }

    pub fn with_el(mut self, el: &str) -> Self {
        self.el = Some(el.to_string());
        self
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selector = Some(selector.to_string());
        self
    }

    pub fn with_view(mut self, key: &str, declaration: ViewDeclaration) -> Self {
        self.views.insert(key.to_string(), declaration);
        self
    }

    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    pub fn passing(mut self, key: &str) -> Self {
        self.options_to_pass.push(key.to_string());
        self
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_collection(mut self, collection: Model) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn component(mut self) -> Self {
        self.is_component = true;
        self
    }

    pub fn not_to_render(mut self) -> Self {
        self.not_to_render = true;
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    pub(crate) fn layout_name(&self) -> Option<&str> {
        match &self.layout {
            Some(LayoutRef::Name(name)) => Some(name),
            _ => None,
        }
    }
}

pub type ReadyCondition = Box<dyn Fn() -> bool + Send>;

/// Everything that holds back a view’s readiness, besides its declared nested views.
#[derive(Default)]
pub(crate) struct ReadyGate {
    pub manual: bool,
    pub pending: usize,
    pub conditions: Vec<ReadyCondition>,
    pub view_keys: Vec<String>,
}

impl ReadyGate {
    pub fn wait_for_view(&mut self, key: &str) {
        if !self.view_keys.iter().any(|k| k == key) {
            self.view_keys.push(key.to_string());
        }
    }
}

impl fmt::Debug for ReadyGate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReadyGate")
            .field("manual", &self.manual)
            .field("pending", &self.pending)
            .field("conditions", &self.conditions.len())
            .field("view_keys", &self.view_keys)
            .finish()
    }
}

/// A pending result a view waits for.
///
/// Settles when [`settle`](Self::settle) is called or when it is dropped, whichever comes first.
/// May be moved to another thread.
#[derive(Debug)]
pub struct Waiter {
    view: ViewId,
    sender: Option<Sender<Message>>,
}

impl Waiter {
    pub(crate) fn new(view: ViewId, sender: Sender<Message>) -> Waiter {
        Waiter {
            view,
            sender: Some(sender),
        }
    }

    pub fn settle(mut self) {
        self.send();
    }

    fn send(&mut self) {
        if let Some(sender) = self.sender.take() {
            // the host is gone; nobody is waiting anymore
            let _ = sender.send(Message::WaitSettled(self.view));
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.send();
    }
}

/// A nested view requested from a setup hook; created once the hooks have run.
#[derive(Debug)]
pub(crate) struct QueuedCreation {
    pub key: String,
    pub view_name: String,
    pub options: ViewOptions,
    pub wait: bool,
}

/// What setup hooks may touch: the view’s own declarative state.
pub struct Setup<'a> {
    pub(crate) id: ViewId,
    pub(crate) options: &'a mut ViewOptions,
    pub(crate) gate: &'a mut ReadyGate,
    pub(crate) creations: &'a mut Vec<QueuedCreation>,
    pub(crate) events: &'a Events,
    pub(crate) listening: &'a mut Listening,
    pub(crate) sender: &'a Sender<Message>,
}

impl<'a> Setup<'a> {
    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn options(&self) -> &ViewOptions {
        self.options
    }

    pub fn options_mut(&mut self) -> &mut ViewOptions {
        self.options
    }

    /// Sets or clears the manual wait gate.
    pub fn wait(&mut self, wait: bool) {
        self.gate.manual = wait;
    }

    /// Returns a waiter; the view won’t be ready before it settles.
    pub fn wait_for(&mut self) -> Waiter {
        self.gate.pending += 1;
        Waiter::new(self.id, self.sender.clone())
    }

    /// Runs `f` with a fresh waiter.
    pub fn wait_with<F: FnOnce(Waiter)>(&mut self, f: F) {
        let waiter = self.wait_for();
        f(waiter)
    }

    /// Adds a condition that must hold for the view to become ready.
    ///
    /// Conditions are re-evaluated whenever readiness is checked; call
    /// [`Host::check_ready`](crate::Host::check_ready) once one may have changed.
    pub fn wait_until<F: 'static + Fn() -> bool + Send>(&mut self, condition: F) {
        self.gate.conditions.push(Box::new(condition));
    }

    /// The view won’t be ready until a nested view exists under `key`.
    pub fn wait_for_view(&mut self, key: &str) {
        self.gate.wait_for_view(key);
    }

    /// Creates a nested view once setup is done.
    pub fn create_view(&mut self, key: &str, view_name: &str, options: ViewOptions, wait: bool) {
        self.creations.push(QueuedCreation {
            key: key.to_string(),
            view_name: view_name.to_string(),
            options,
            wait,
        });
    }

    pub fn events(&self) -> &Events {
        self.events
    }

    /// Subscribes to another object’s events; dropped automatically when the view is removed.
    pub fn listen_to(&mut self, target: &Events, names: &str, handler: EventHandler) {
        self.listening.listen_to(target, names, handler);
    }

    pub fn listen_to_once(&mut self, target: &Events, names: &str, handler: EventHandler) {
        self.listening.listen_to_once(target, names, handler);
    }
}
