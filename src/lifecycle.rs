//! Creating, attaching, readying and removing views.
//!
//! A view is ready once all of these hold:
//!
//! - every nested view its layout (and `views` option) declared has been loaded, or was skipped
//! - the manual wait flag is off
//! - every [`Waiter`] handed out for it has settled
//! - every nested view it waits for by key is attached
//! - every ready condition returns true
//!
//! Readiness is checked whenever one of these may have changed, and fires exactly once.

use crate::completion::Completion;
use crate::dom::{cid_placeholder, cid_selector, Patch, VIEW_ATTRIBUTE};
use crate::error::Result;
use crate::host::{Creation, Host, Message, RequestId};
use crate::layouter::{LayoutRef, ViewDeclaration, ViewRef};
use crate::templator::Template;
use crate::tree::{AfterRender, Attachment, CancelToken, Node, OnReady, ViewCallback};
use crate::view::{Setup, TemplateRef, View, ViewId, ViewOptions, Waiter};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, error, trace, warn};

/// `child` inside `parent`, or just `child` if the parent has no element.
fn nested_selector(parent: Option<&str>, child: &str) -> String {
    match parent {
        Some(parent) => format!("{} {}", parent, child),
        None => child.to_string(),
    }
}

fn default_selector(parent: Option<&str>, key: &str) -> String {
    nested_selector(parent, &format!("[{}=\"{}\"]", VIEW_ATTRIBUTE, key))
}

impl Host {
    /// Creates a top-level view through the view loader.
    ///
    /// `on_ready` runs once the view is ready; it won’t run if loading fails.
    pub fn create_view<F>(&mut self, view_name: &str, options: ViewOptions, on_ready: F) -> RequestId
    where
        F: 'static + FnOnce(&mut Host, ViewId) + Send,
    {
        self.request_view(Creation {
            parent: None,
            key: None,
            view_name: view_name.to_string(),
            options,
            token: CancelToken::new(),
            initial: false,
            selector: None,
            callback: Some(Box::new(on_ready)),
        })
    }

    /// Initializes an already constructed top-level view.
    pub fn add_view(&mut self, view: Box<dyn View>, options: ViewOptions) -> Result<ViewId> {
        self.initialize(view, options, None)
    }

    /// Creates a nested view under `key`, replacing whatever is there or on its way there.
    ///
    /// If `wait` is set, the parent won’t become ready before the new view is attached.
    pub fn create_nested_view(
        &mut self,
        parent: ViewId,
        key: &str,
        view_name: &str,
        options: ViewOptions,
        wait: bool,
    ) -> Option<RequestId> {
        self.create_child(parent, key, view_name, options, wait, None)
    }

    /// Like [`create_nested_view`](Self::create_nested_view); `on_ready` runs once the new view
    /// is ready and attached.
    pub fn create_nested_view_with<F>(
        &mut self,
        parent: ViewId,
        key: &str,
        view_name: &str,
        options: ViewOptions,
        wait: bool,
        on_ready: F,
    ) -> Option<RequestId>
    where
        F: 'static + FnOnce(&mut Host, ViewId) + Send,
    {
        self.create_child(parent, key, view_name, options, wait, Some(Box::new(on_ready)))
    }

    pub(crate) fn create_child(
        &mut self,
        parent: ViewId,
        key: &str,
        view_name: &str,
        mut options: ViewOptions,
        wait: bool,
        callback: Option<ViewCallback>,
    ) -> Option<RequestId> {
        if !self.tree.contains(parent) {
            warn!(view = %parent, key, "can’t create a nested view in a missing view");
            return None;
        }
        self.clear_view(parent, key);

        let token = CancelToken::new();
        let node = self.tree.get_mut(parent)?;
        if wait {
            node.gate.wait_for_view(key);
        }
        node.pending.insert(key.to_string(), token.clone());
        if options.el.is_none() {
            let parent_selector = node.selector.as_deref();
            options.el = Some(match &options.selector {
                Some(selector) => nested_selector(parent_selector, selector),
                None => default_selector(parent_selector, key),
            });
        }

        Some(self.request_view(Creation {
            parent: Some(parent),
            key: Some(key.to_string()),
            view_name: view_name.to_string(),
            options,
            token,
            initial: false,
            selector: None,
            callback,
        }))
    }

    /// Initializes an already constructed view and attaches it under `key` once it is ready.
    pub fn assign_view(
        &mut self,
        parent: ViewId,
        key: &str,
        view: Box<dyn View>,
        options: ViewOptions,
        selector: Option<&str>,
    ) -> Result<Option<ViewId>> {
        if !self.tree.contains(parent) {
            warn!(view = %parent, key, "can’t assign a nested view to a missing view");
            return Ok(None);
        }
        self.clear_view(parent, key);

        let token = CancelToken::new();
        if let Some(node) = self.tree.get_mut(parent) {
            node.pending.insert(key.to_string(), token.clone());
        }
        let attachment = Attachment {
            parent,
            key: key.to_string(),
            token,
            selector: selector.map(str::to_string),
            initial: false,
            callback: None,
        };
        match self.initialize(view, options, Some(OnReady::Attach(attachment))) {
            Ok(id) => Ok(Some(id)),
            Err(err) => {
                if let Some(node) = self.tree.get_mut(parent) {
                    node.pending.remove(key);
                }
                Err(err)
            }
        }
    }

    fn request_view(&mut self, creation: Creation) -> RequestId {
        let request = self.next_request();
        let view_name = creation.view_name.clone();
        self.creations.insert(request, creation);

        trace!(view = %view_name, ?request, "requesting view");
        let sender = self.sender.clone();
        self.view_loader.load(
            &view_name,
            Completion::new(move |result: Result<Box<dyn View>>| {
                let _ = sender.send(Message::ViewLoaded { request, result });
            }),
        );
        request
    }

    pub(crate) fn view_loaded(
        &mut self,
        request: RequestId,
        result: Result<Box<dyn View>>,
    ) -> Result<()> {
        let creation = match self.creations.remove(&request) {
            Some(creation) => creation,
            None => return Ok(()),
        };
        let view = match result {
            Ok(view) => view,
            Err(err) => {
                error!(view = %creation.view_name, error = %err, "failed to load view");
                return Err(err);
            }
        };

        if creation.token.is_canceled() {
            debug!(view = %creation.view_name, "discarding canceled view");
            drop(view);
            if let (Some(parent), true) = (creation.parent, creation.initial) {
                self.count_loaded(parent);
            }
            return Ok(());
        }
        if let Some(parent) = creation.parent {
            if !self.tree.contains(parent) {
                debug!(view = %creation.view_name, "parent went away; discarding view");
                return Ok(());
            }
        }

        let mut options = creation.options;
        options.name = Some(creation.view_name);
        let on_ready = match (creation.parent, creation.key) {
            (Some(parent), Some(key)) => Some(OnReady::Attach(Attachment {
                parent,
                key,
                token: creation.token,
                selector: creation.selector,
                initial: creation.initial,
                callback: creation.callback,
            })),
            _ => creation.callback.map(OnReady::Notify),
        };
        self.initialize(view, options, on_ready)?;
        Ok(())
    }

    /// Runs setup hooks, then resolves the layout and loads nested views.
    fn initialize(
        &mut self,
        view: Box<dyn View>,
        options: ViewOptions,
        on_ready: Option<OnReady>,
    ) -> Result<ViewId> {
        let id = ViewId::new();
        debug!(view = %id, name = options.name.as_deref().unwrap_or("-"), "initializing view");

        let preset_el = options.el.is_some();
        let mut node = Node::new(view, options);
        node.on_ready = on_ready;

        let mut queued = Vec::new();
        {
            let Node {
                view,
                options,
                gate,
                events,
                listening,
                ..
            } = &mut node;
            let mut setup = Setup {
                id,
                options,
                gate,
                creations: &mut queued,
                events,
                listening,
                sender: &self.sender,
            };
            view.init(&mut setup);
            view.setup(&mut setup);
            view.setup_final(&mut setup);
        }

        node.selector = node.options.el.clone();
        if preset_el {
            node.after_render.push(AfterRender::Rebind);
        }
        node.compiled_template = match &node.options.template {
            Some(TemplateRef::Compiled(template)) => Some(template.clone()),
            Some(TemplateRef::Content(content)) if self.templator.is_compilable() => {
                Some(self.templator.compile_template(content)?)
            }
            Some(TemplateRef::Content(content)) => Some(Template::source(content.as_str())),
            _ => None,
        };

        let layout = node.options.layout.clone();
        self.tree.insert(id, node);

        for creation in queued {
            self.create_child(
                id,
                &creation.key,
                &creation.view_name,
                creation.options,
                creation.wait,
                None,
            );
        }

        let loaded = match layout {
            Some(LayoutRef::Name(name)) => {
                trace!(view = %id, layout = %name, "loading layout");
                let sender = self.sender.clone();
                self.layouter.get_layout(
                    &name,
                    Completion::new(move |result: Result<Value>| {
                        let _ = sender.send(Message::LayoutLoaded { view: id, result });
                    }),
                );
                Ok(())
            }
            Some(LayoutRef::Defs(defs)) => self.load_nested_views(id, Some(defs)),
            None => self.load_nested_views(id, None),
        };
        if let Err(err) = loaded {
            // nobody gets the id, so nothing could ever remove it
            self.remove(id, true);
            return Err(err);
        }
        Ok(id)
    }

    /// Creates the nested views declared by the layout and the `views` option.
    ///
    /// Directly declared views win over layout declarations with the same name. Disabled and
    /// placeholder declarations count as loaded right away.
    pub(crate) fn load_nested_views(&mut self, id: ViewId, layout: Option<Value>) -> Result<()> {
        let (layout_name, no_cache, direct) = match self.tree.get(id) {
            Some(node) => (
                node.options.layout_name().map(str::to_string),
                node.options.no_cache,
                node.options.views.clone(),
            ),
            None => return Ok(()),
        };

        let mut declarations = IndexMap::new();
        if let Some(defs) = &layout {
            let found = self
                .layouter
                .find_nested_views(layout_name.as_deref(), Some(defs), no_cache)?;
            for declaration in found.iter() {
                declarations.insert(declaration.name.clone(), declaration.clone());
            }
        }
        for (key, mut declaration) in direct {
            declaration.name = key.clone();
            declarations.insert(key, declaration);
        }

        let node = match self.tree.get_mut(id) {
            Some(node) => node,
            None => return Ok(()),
        };
        node.layout = layout;
        node.load = (0, declarations.len());
        let mut to_create = Vec::new();
        for declaration in declarations.values() {
            if declaration.is_disabled() || declaration.is_placeholder() {
                node.load.0 += 1;
            } else {
                to_create.push(declaration.clone());
            }
        }
        node.declarations = declarations;
        trace!(view = %id, total = node.load.1, creating = to_create.len(), "loading nested views");

        for declaration in to_create {
            self.create_declared(id, declaration);
        }
        self.check_children_loaded(id);
        Ok(())
    }

    fn create_declared(&mut self, parent: ViewId, declaration: ViewDeclaration) {
        let view_name = match &declaration.view {
            Some(ViewRef::Name(name)) => name.clone(),
            _ => self.config.default_view_name.clone(),
        };
        let options = match self.declared_options(parent, &declaration) {
            Some(options) => options,
            None => return,
        };

        let token = CancelToken::new();
        if let Some(node) = self.tree.get_mut(parent) {
            node.pending.insert(declaration.name.clone(), token.clone());
        }
        self.request_view(Creation {
            parent: Some(parent),
            key: Some(declaration.name),
            view_name,
            options,
            token,
            initial: true,
            selector: None,
            callback: None,
        });
    }

    /// Options for a declared nested view: the declaration, forwarded options, and the parent’s
    /// model and collection.
    fn declared_options(&self, parent: ViewId, declaration: &ViewDeclaration) -> Option<ViewOptions> {
        let node = self.tree.get(parent)?;
        let mut options = ViewOptions::new();
        options.layout = declaration.layout.clone();
        options.template = declaration.template.clone().map(TemplateRef::Name);
        options.not_to_render = declaration.not_to_render();
        options.el = self.declared_selector(parent, &declaration.name);
        for key in &node.options.options_to_pass {
            if let Some(value) = node.options.options.get(key) {
                options.options.insert(key.clone(), value.clone());
            }
        }
        if let Some(extra) = &declaration.options {
            for (key, value) in extra {
                options.options.insert(key.clone(), value.clone());
            }
        }
        options.model = node.options.model.clone();
        options.collection = node.options.collection.clone();
        Some(options)
    }

    /// The selector a declaration gives the nested view under `key`.
    pub(crate) fn declared_selector(&self, parent: ViewId, key: &str) -> Option<String> {
        let node = self.tree.get(parent)?;
        let declaration = node.declarations.get(key)?;
        let parent_selector = node.selector.as_deref();

        Some(if let Some(id) = &declaration.id {
            format!("#{}", id)
        } else if let Some(el) = declaration.full_selector.as_ref().or(declaration.el.as_ref()) {
            el.clone()
        } else if let Some(selector) = &declaration.selector {
            nested_selector(parent_selector, selector)
        } else {
            default_selector(parent_selector, key)
        })
    }

    fn count_loaded(&mut self, parent: ViewId) {
        if let Some(node) = self.tree.get_mut(parent) {
            node.load.0 += 1;
        }
        self.check_children_loaded(parent);
    }

    fn check_children_loaded(&mut self, id: ViewId) {
        let loaded = match self.tree.get_mut(id) {
            Some(node) if !node.flags.children_loaded && node.load.0 >= node.load.1 => {
                node.flags.children_loaded = true;
                true
            }
            _ => false,
        };
        if loaded {
            trace!(view = %id, "nested views loaded");
            self.try_ready(id);
        }
    }

    /// Marks the view ready if nothing holds it back anymore.
    pub(crate) fn try_ready(&mut self, id: ViewId) {
        let node = match self.tree.get_mut(id) {
            Some(node) => node,
            None => return,
        };
        if node.flags.ready || !node.flags.children_loaded || node.gate.manual || node.gate.pending > 0 {
            return;
        }
        if !node.gate.view_keys.iter().all(|key| node.children.contains_key(key)) {
            return;
        }
        if !node.gate.conditions.iter().all(|condition| condition()) {
            return;
        }

        node.flags.ready = true;
        let events = node.events.clone();
        let on_ready = node.on_ready.take();
        debug!(view = %id, "view ready");
        events.trigger("ready", &[]);

        match on_ready {
            Some(OnReady::Attach(attachment)) => self.attach_ready(id, attachment),
            Some(OnReady::Notify(callback)) => callback(self, id),
            None => {}
        }
    }

    fn attach_ready(&mut self, child: ViewId, attachment: Attachment) {
        let Attachment {
            parent,
            key,
            token,
            selector,
            initial,
            callback,
        } = attachment;

        let parent_alive = self.tree.contains(parent);
        if token.is_canceled() || !parent_alive {
            debug!(view = %child, key = %key, "dropping canceled nested view");
            self.remove(child, true);
            if initial && parent_alive {
                self.count_loaded(parent);
            }
            return;
        }

        if let Some(node) = self.tree.get_mut(parent) {
            if node.pending.get(&key).map_or(false, |pending| pending.same(&token)) {
                node.pending.remove(&key);
            }
        }
        self.set_view(parent, &key, child, selector.as_deref());
        if initial {
            self.count_loaded(parent);
        }
        if let Some(callback) = callback {
            callback(self, child);
        }
    }

    /// Attaches `child` under `key`, removing the previous occupant.
    ///
    /// The child’s selector becomes `selector`, or the one declared for `key`, or stays what it
    /// was.
    pub fn set_view(&mut self, parent: ViewId, key: &str, child: ViewId, selector: Option<&str>) {
        if !self.tree.contains(parent) || !self.tree.contains(child) {
            warn!(parent = %parent, child = %child, key, "can’t set a missing view");
            return;
        }

        let previous = self.get_view(parent, key);
        if let Some(previous) = previous {
            if previous != child {
                self.remove(previous, false);
            }
        }

        let selector = selector
            .map(str::to_string)
            .or_else(|| self.declared_selector(parent, key))
            .or_else(|| self.tree.get(child).and_then(|node| node.selector.clone()));
        let parent_rendered = self.is_rendered(parent);
        if let Some(node) = self.tree.get_mut(child) {
            node.selector = selector;
            node.flags.element_bound = parent_rendered;
        }
        if !parent_rendered {
            if let Some(node) = self.tree.get_mut(parent) {
                node.after_render.push(AfterRender::Bind(child));
            }
        }

        self.tree.attach(parent, key, child);
        trace!(parent = %parent, child = %child, key, "view set");
        self.try_ready(parent);
    }

    /// Removes the nested view under `key`, canceling its creation if it is still on its way.
    pub fn clear_view(&mut self, parent: ViewId, key: &str) {
        let (token, child) = match self.tree.get_mut(parent) {
            Some(node) => (node.pending.remove(key), node.children.get(key).copied()),
            None => return,
        };
        if let Some(token) = token {
            trace!(view = %parent, key, "canceling nested view creation");
            token.cancel();
        }
        if let Some(child) = child {
            self.remove(child, false);
        }
    }

    /// Detaches the nested view under `key` without removing it.
    pub fn unchain_view(&mut self, parent: ViewId, key: &str) -> Option<ViewId> {
        let child = self.get_view(parent, key)?;
        self.tree.detach(child);
        if let Some(node) = self.tree.get_mut(child) {
            node.flags.element_bound = false;
        }
        Some(child)
    }

    /// Sets or clears the manual wait gate.
    pub fn wait(&mut self, id: ViewId, wait: bool) {
        if let Some(node) = self.tree.get_mut(id) {
            node.gate.manual = wait;
        }
        if !wait {
            self.try_ready(id);
        }
    }

    /// Returns a waiter; the view won’t be ready before it settles.
    pub fn wait_for(&mut self, id: ViewId) -> Option<Waiter> {
        let node = self.tree.get_mut(id)?;
        node.gate.pending += 1;
        Some(Waiter::new(id, self.sender.clone()))
    }

    /// Runs `f` with a fresh waiter. Does nothing for a missing view.
    pub fn wait_with<F: FnOnce(Waiter)>(&mut self, id: ViewId, f: F) {
        if let Some(waiter) = self.wait_for(id) {
            f(waiter)
        }
    }

    pub fn wait_until<F: 'static + Fn() -> bool + Send>(&mut self, id: ViewId, condition: F) {
        if let Some(node) = self.tree.get_mut(id) {
            node.gate.conditions.push(Box::new(condition));
        }
        self.try_ready(id);
    }

    pub fn wait_for_view(&mut self, id: ViewId, key: &str) {
        if let Some(node) = self.tree.get_mut(id) {
            node.gate.wait_for_view(key);
        }
    }

    /// Re-evaluates readiness, e.g. after a ready condition may have changed.
    pub fn check_ready(&mut self, id: ViewId) {
        self.try_ready(id);
    }

    /// Removes a view and all its nested views.
    ///
    /// Unless `dont_empty` is set, the view’s element is emptied; component views are replaced
    /// with a placeholder instead. Removing a removed view does nothing.
    pub fn remove(&mut self, id: ViewId, dont_empty: bool) {
        let (children, tokens) = match self.tree.get_mut(id) {
            Some(node) => {
                if node.flags.being_rendered {
                    node.flags.cancel_render = true;
                }
                (
                    node.children.values().copied().collect::<Vec<_>>(),
                    node.pending.drain().map(|(_, token)| token).collect::<Vec<_>>(),
                )
            }
            None => {
                trace!(view = %id, "view already removed");
                return;
            }
        };
        debug!(view = %id, "removing view");

        for token in tokens {
            token.cancel();
        }
        // nested elements go away with ours
        for child in children {
            self.remove(child, true);
        }

        let events = match self.tree.get(id) {
            Some(node) => node.events.clone(),
            None => return,
        };
        events.trigger("remove", &[]);

        let (selector, is_component) = match self.tree.get_mut(id) {
            Some(node) => {
                node.view.on_remove();
                node.listening.stop_listening(None, None);
                (node.selector.clone(), node.options.is_component)
            }
            None => return,
        };
        events.off(None, None, None);

        if !dont_empty {
            if let Some(selector) = selector {
                self.empty_element(id, selector, is_component);
            }
        }

        self.tree.detach(id);
        self.tree.remove(id);
    }

    fn empty_element(&mut self, id: ViewId, selector: String, is_component: bool) {
        if !self.backend.contains(&selector) {
            trace!(view = %id, selector = %selector, "no element to empty");
            return;
        }
        let patch = if is_component {
            let cid = id.cid();
            Patch::ReplaceElement {
                selector,
                new_selector: cid_selector(&cid),
                markup: cid_placeholder(&cid),
            }
        } else {
            Patch::Empty { selector }
        };
        if let Err(err) = self.backend.apply(patch) {
            warn!(view = %id, error = %err, "failed to empty element");
        }
    }
}
