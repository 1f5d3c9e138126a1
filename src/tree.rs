use crate::events::{Events, Listening};
use crate::host::Host;
use crate::layouter::ViewDeclaration;
use crate::templator::Template;
use crate::view::{ReadyGate, View, ViewId, ViewOptions};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Called with the view once it is ready (or rendered, for render callbacks).
pub type ViewCallback = Box<dyn FnOnce(&mut Host, ViewId) + Send>;

/// Cancels an in-flight nested view creation.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn same(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Flags {
    pub ready: bool,
    pub rendered: bool,
    pub fully_rendered: bool,
    pub being_rendered: bool,
    pub cancel_render: bool,
    pub children_loaded: bool,
    /// Whether the view’s element has been looked up in a rendered document.
    pub element_bound: bool,
}

/// Deferred to the end of the view’s next render.
pub(crate) enum AfterRender {
    /// Binds a nested view’s element once the markup containing it exists.
    Bind(ViewId),
    /// Re-binds the view’s own element.
    Rebind,
    ReRender(Option<ViewCallback>),
}

/// Where a view is attached once it becomes ready.
pub(crate) struct Attachment {
    pub parent: ViewId,
    pub key: String,
    pub token: CancelToken,
    pub selector: Option<String>,
    /// Part of the parent’s initial nested-view load.
    pub initial: bool,
    pub callback: Option<ViewCallback>,
}

pub(crate) enum OnReady {
    Attach(Attachment),
    Notify(ViewCallback),
}

/// A view and everything the host tracks about it.
pub(crate) struct Node {
    pub view: Box<dyn View>,
    pub options: ViewOptions,
    pub flags: Flags,
    pub parent: Option<ViewId>,
    pub key: Option<String>,
    pub path: String,
    pub selector: Option<String>,
    pub children: HashMap<String, ViewId>,
    pub declarations: IndexMap<String, ViewDeclaration>,
    /// Resolved layout definition.
    pub layout: Option<Value>,
    pub gate: ReadyGate,
    /// (loaded, total) of the initial nested-view load.
    pub load: (usize, usize),
    /// In-flight nested view creations.
    pub pending: HashMap<String, CancelToken>,
    pub after_render: Vec<AfterRender>,
    pub render_callbacks: Vec<ViewCallback>,
    pub on_ready: Option<OnReady>,
    pub events: Events,
    pub listening: Listening,
    pub compiled_template: Option<Template>,
}

impl Node {
    pub fn new(view: Box<dyn View>, options: ViewOptions) -> Node {
        Node {
            view,
            options,
            flags: Flags::default(),
            parent: None,
            key: None,
            path: String::new(),
            selector: None,
            children: HashMap::new(),
            declarations: IndexMap::new(),
            layout: None,
            gate: ReadyGate::default(),
            load: (0, 0),
            pending: HashMap::new(),
            after_render: Vec::new(),
            render_callbacks: Vec::new(),
            on_ready: None,
            events: Events::new(),
            listening: Listening::new(),
            compiled_template: None,
        }
    }
}

/// The view arena.
///
/// Parent links are plain ids; a node is owned only by the arena. Removed ids are remembered so
/// removal can be told apart from never having existed.
#[derive(Default)]
pub(crate) struct Tree {
    nodes: HashMap<ViewId, Node>,
    removed: HashSet<ViewId>,
}

impl Tree {
    pub fn new() -> Tree {
        Tree::default()
    }

    pub fn insert(&mut self, id: ViewId, node: Node) {
        self.nodes.insert(id, node);
    }

    pub fn get(&self, id: ViewId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn is_removed(&self, id: ViewId) -> bool {
        self.removed.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Drops a node for good. Its parent relationship must have been cleared already.
    pub fn remove(&mut self, id: ViewId) -> Option<Node> {
        let node = self.nodes.remove(&id)?;
        self.removed.insert(id);
        Some(node)
    }

    /// Puts `child` under `parent` at `key`, detaching it from wherever it was.
    ///
    /// Whatever occupied `key` before is just forgotten; tear it down first.
    pub fn attach(&mut self, parent: ViewId, key: &str, child: ViewId) {
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.insert(key.to_string(), child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
            node.key = Some(key.to_string());
        }
        self.update_path(child);
    }

    /// Detaches a view from its parent, making it a root. Returns the old parent and key.
    pub fn detach(&mut self, child: ViewId) -> Option<(ViewId, String)> {
        let node = self.nodes.get_mut(&child)?;
        let parent = node.parent.take()?;
        let key = node.key.take()?;
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            // the key may have been taken over already
            if parent_node.children.get(&key) == Some(&child) {
                parent_node.children.remove(&key);
            }
        }
        self.update_path(child);
        Some((parent, key))
    }

    /// Recomputes the path of a view and all its descendants.
    pub fn update_path(&mut self, id: ViewId) {
        let path = match self.nodes.get(&id) {
            Some(node) => match (node.parent, &node.key) {
                (Some(parent), Some(key)) => match self.nodes.get(&parent) {
                    Some(parent) => join_path(&parent.path, key),
                    None => String::new(),
                },
                _ => String::new(),
            },
            None => return,
        };

        let children: Vec<ViewId> = match self.nodes.get_mut(&id) {
            Some(node) => {
                node.path = path;
                node.children.values().copied().collect()
            }
            None => return,
        };
        for child in children {
            self.update_path(child);
        }
    }
}

fn join_path(parent: &str, key: &str) -> String {
    format!("{}/{}", parent, key)
}
