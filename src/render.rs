use crate::completion::Completion;
use crate::dom::{cid_placeholder, cid_selector, tag_root_element, Patch};
use crate::error::{Error, Result};
use crate::host::{Host, JobId, Message};
use crate::templator::{LayoutOptions, Template};
use crate::tree::{AfterRender, ViewCallback};
use crate::view::{TemplateRef, ViewId};
use core::mem;
use serde_json::{Map, Value};
use tracing::{debug, error, trace, warn};

/// Collects one view’s markup: first its nested views’, then its own.
pub(crate) struct HtmlJob {
    view: ViewId,
    /// The parent job and the key this markup is stored under there.
    link: Option<(JobId, String)>,
    pending: usize,
    parts: Map<String, Value>,
    data: Option<Value>,
}

/// What [`Host::re_render`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Started,
    /// The view is being rendered; it will render again right after.
    Deferred,
    /// Not rendered and not forced.
    Skipped,
}

enum Resolution {
    Ready(Template),
    Fetch {
        name: Option<String>,
        layout: Option<LayoutOptions>,
        no_cache: bool,
    },
}

impl Host {
    /// Renders a view and mounts its markup.
    ///
    /// Errors resolving this view’s own template are returned (right away, or from `poll`);
    /// nested views that fail to render are logged and contribute empty markup.
    pub fn render(&mut self, id: ViewId) -> Result<()> {
        self.start_render(id, None)
    }

    /// Like [`render`](Self::render); `callback` runs once the view is fully rendered.
    pub fn render_with<F>(&mut self, id: ViewId, callback: F) -> Result<()>
    where
        F: 'static + FnOnce(&mut Host, ViewId) + Send,
    {
        self.start_render(id, Some(Box::new(callback)))
    }

    /// Renders again if already rendered; while a render is running, renders again after it.
    pub fn re_render(&mut self, id: ViewId, force: bool) -> Result<RenderStatus> {
        self.re_render_inner(id, force, None)
    }

    pub fn re_render_with<F>(&mut self, id: ViewId, force: bool, callback: F) -> Result<RenderStatus>
    where
        F: 'static + FnOnce(&mut Host, ViewId) + Send,
    {
        self.re_render_inner(id, force, Some(Box::new(callback)))
    }

    fn re_render_inner(
        &mut self,
        id: ViewId,
        force: bool,
        callback: Option<ViewCallback>,
    ) -> Result<RenderStatus> {
        let (rendered, being_rendered) = match self.tree.get(id) {
            Some(node) => (node.flags.rendered, node.flags.being_rendered),
            None => return Ok(RenderStatus::Skipped),
        };

        if rendered || (force && !being_rendered) {
            self.start_render(id, callback)?;
            Ok(RenderStatus::Started)
        } else if being_rendered {
            if let Some(node) = self.tree.get_mut(id) {
                node.after_render.push(AfterRender::ReRender(callback));
            }
            trace!(view = %id, "re-render deferred");
            Ok(RenderStatus::Deferred)
        } else {
            Ok(RenderStatus::Skipped)
        }
    }

    /// Drops the markup of the running render instead of mounting it.
    pub fn cancel_render(&mut self, id: ViewId) {
        if let Some(node) = self.tree.get_mut(id) {
            if node.flags.being_rendered {
                debug!(view = %id, "canceling render");
                node.flags.cancel_render = true;
            }
        }
    }

    fn start_render(&mut self, id: ViewId, callback: Option<ViewCallback>) -> Result<()> {
        let node = match self.tree.get_mut(id) {
            Some(node) => node,
            None => {
                warn!(view = %id, "can’t render a missing view");
                return Ok(());
            }
        };
        node.flags.cancel_render = false;
        if let Some(callback) = callback {
            node.render_callbacks.push(callback);
        }
        let events = node.events.clone();

        debug!(view = %id, "rendering");
        events.trigger("render", &[]);
        self.start_html(id, None)
    }

    fn start_html(&mut self, view: ViewId, link: Option<(JobId, String)>) -> Result<()> {
        let children: Vec<(String, ViewId)> = match self.tree.get_mut(view) {
            Some(node) => {
                node.flags.rendered = false;
                node.flags.fully_rendered = false;
                node.flags.being_rendered = true;
                node.children.iter().map(|(key, child)| (key.clone(), *child)).collect()
            }
            None => return self.abandon(link),
        };

        let mut parts = Map::new();
        let mut nested = Vec::new();
        for (key, child) in children {
            match self.tree.get(child) {
                Some(node) if node.options.not_to_render => {
                    // renders itself later; keep a spot for it
                    if node.options.is_component {
                        parts.insert(key, Value::String(cid_placeholder(&child.cid())));
                    }
                }
                Some(_) => nested.push((key, child)),
                None => {}
            }
        }

        let job = JobId(self.next_id());
        self.jobs.insert(
            job,
            HtmlJob {
                view,
                link,
                pending: nested.len(),
                parts,
                data: None,
            },
        );

        if nested.is_empty() {
            return self.template_stage(job);
        }
        for (key, child) in nested {
            self.start_html(child, Some((job, key)))?;
        }
        Ok(())
    }

    fn abandon(&mut self, link: Option<(JobId, String)>) -> Result<()> {
        match link {
            Some((job, key)) => self.contribute(job, key, String::new()),
            None => Ok(()),
        }
    }

    fn contribute(&mut self, job: JobId, key: String, markup: String) -> Result<()> {
        let complete = match self.jobs.get_mut(&job) {
            Some(state) => {
                state.parts.insert(key, Value::String(markup));
                state.pending = state.pending.saturating_sub(1);
                state.pending == 0
            }
            None => false,
        };
        if complete {
            self.template_stage(job)
        } else {
            Ok(())
        }
    }

    /// Assembles template data and resolves the template.
    ///
    /// Template precedence: compiled (or literal) template, templator cache, precompiled
    /// templates, then the templator.
    fn template_stage(&mut self, job: JobId) -> Result<()> {
        let view = match self.jobs.get(&job) {
            Some(state) => state.view,
            None => return Ok(()),
        };
        let node = match self.tree.get(view) {
            Some(node) => node,
            None => {
                let link = self.jobs.remove(&job).and_then(|state| state.link);
                return self.abandon(link);
            }
        };

        let mut data = node.view.data();
        let parts = match self.jobs.get_mut(&job) {
            Some(state) => mem::take(&mut state.parts),
            None => Map::new(),
        };
        for (key, markup) in parts {
            data.insert(key, markup);
        }
        if let Some(model) = &node.options.model {
            data.insert("model".into(), model.to_json());
        }
        if let Some(collection) = &node.options.collection {
            data.insert("collection".into(), collection.to_json());
        }
        data.insert("viewObject".into(), Value::String(view.cid()));
        node.view.handle_data_before_render(&mut data);

        let resolution = match &node.compiled_template {
            Some(template) => Resolution::Ready(template.clone()),
            None => {
                let options = &node.options;
                let template_name = match &options.template {
                    Some(TemplateRef::Name(name)) => Some(name.clone()),
                    _ => None,
                };
                let hit = template_name.as_deref().and_then(|name| {
                    let cached = if options.no_cache {
                        None
                    } else {
                        self.templator.cached(name)
                    };
                    cached.or_else(|| self.precompiled.get(name).cloned())
                });

                match hit {
                    Some(template) => Resolution::Ready(template),
                    None if template_name.is_some() => Resolution::Fetch {
                        name: template_name,
                        layout: None,
                        no_cache: options.no_cache,
                    },
                    None => {
                        let layout_name = options.layout_name().map(str::to_string);
                        Resolution::Fetch {
                            name: layout_name.as_ref().map(|name| format!("built-{}", name)),
                            no_cache: options.no_cache || layout_name.is_none(),
                            layout: Some(LayoutOptions {
                                name: layout_name,
                                layout: node.layout.clone(),
                                data: options.layout_data.clone(),
                            }),
                        }
                    }
                }
            }
        };

        if let Some(state) = self.jobs.get_mut(&job) {
            state.data = Some(Value::Object(data));
        }

        match resolution {
            Resolution::Ready(template) => self.finish_template(job, Ok(template)),
            Resolution::Fetch {
                name,
                layout,
                no_cache,
            } => {
                trace!(view = %view, template = ?name, "fetching template");
                let sender = self.sender.clone();
                let requested = self.templator.get_template(
                    name.as_deref(),
                    layout.as_ref(),
                    no_cache,
                    Completion::new(move |result: Result<Template>| {
                        let _ = sender.send(Message::TemplateLoaded { job, result });
                    }),
                );
                match requested {
                    Ok(()) => Ok(()),
                    Err(err) => self.fail_job(job, err),
                }
            }
        }
    }

    pub(crate) fn finish_template(&mut self, job: JobId, template: Result<Template>) -> Result<()> {
        let data = match self.jobs.get_mut(&job) {
            Some(state) => state.data.take().unwrap_or(Value::Null),
            None => return Ok(()),
        };
        let rendered = template.and_then(|template| self.renderer.render(&template, &data));
        match rendered {
            Ok(markup) => self.complete_job(job, markup),
            Err(err) => self.fail_job(job, err),
        }
    }

    fn fail_job(&mut self, job: JobId, err: Error) -> Result<()> {
        let state = match self.jobs.remove(&job) {
            Some(state) => state,
            None => return Ok(()),
        };
        error!(view = %state.view, error = %err, "failed to render view");

        match state.link {
            Some((parent, key)) => {
                if let Some(node) = self.tree.get_mut(state.view) {
                    node.flags.being_rendered = false;
                }
                self.contribute(parent, key, String::new())
            }
            None => {
                self.abort_render(state.view);
                Err(err)
            }
        }
    }

    /// Resets a view and the nested views rendered inline with it after their markup was dropped.
    ///
    /// Pending callbacks and deferred re-renders are discarded; element bindings stay queued.
    fn abort_render(&mut self, view: ViewId) {
        let children: Vec<ViewId> = match self.tree.get_mut(view) {
            Some(node) => {
                node.flags.being_rendered = false;
                node.flags.cancel_render = false;
                node.render_callbacks.clear();
                node.after_render.retain(|action| !matches!(action, AfterRender::ReRender(_)));
                node.children.values().copied().collect()
            }
            None => return,
        };
        for child in children {
            let inline = self
                .tree
                .get(child)
                .map_or(false, |node| !node.options.not_to_render && node.flags.being_rendered);
            if inline {
                self.abort_render(child);
            }
        }
    }

    fn complete_job(&mut self, job: JobId, markup: String) -> Result<()> {
        let state = match self.jobs.remove(&job) {
            Some(state) => state,
            None => return Ok(()),
        };
        match state.link {
            Some((parent, key)) => {
                let markup = self.embed(state.view, markup);
                self.contribute(parent, key, markup)
            }
            None => self.mount(state.view, markup),
        }
    }

    /// Prepares a nested view’s markup for its parent’s template.
    fn embed(&mut self, view: ViewId, markup: String) -> String {
        let node = match self.tree.get_mut(view) {
            Some(node) if node.options.is_component => node,
            _ => return markup,
        };
        let cid = view.cid();
        match tag_root_element(&markup, &cid) {
            Ok(tagged) => {
                node.selector = Some(cid_selector(&cid));
                tagged
            }
            Err(err) => {
                warn!(view = %view, error = %err, "can’t tag component markup");
                markup
            }
        }
    }

    fn mount(&mut self, view: ViewId, markup: String) -> Result<()> {
        let (selector, is_component, canceled) = match self.tree.get(view) {
            Some(node) => (
                node.selector.clone(),
                node.options.is_component,
                node.flags.cancel_render,
            ),
            None => return Ok(()),
        };
        if canceled {
            debug!(view = %view, "render canceled");
            self.abort_render(view);
            return Ok(());
        }

        let mounted = match selector {
            None => Err(Error::Mount("view has no element".into())),
            Some(selector) if is_component => {
                let cid = view.cid();
                let new_selector = cid_selector(&cid);
                tag_root_element(&markup, &cid)
                    .and_then(|tagged| {
                        self.backend.apply(Patch::ReplaceElement {
                            selector,
                            new_selector: new_selector.clone(),
                            markup: tagged,
                        })
                    })
                    .map(|()| Some(new_selector))
            }
            Some(selector) => self
                .backend
                .apply(Patch::SetContent { selector, markup })
                .map(|()| None),
        };

        match mounted {
            Ok(moved) => {
                if let Some(node) = self.tree.get_mut(view) {
                    if let Some(new_selector) = moved {
                        node.selector = Some(new_selector);
                    }
                    node.flags.element_bound = true;
                }
            }
            Err(err) => warn!(view = %view, error = %err, "failed to mount markup"),
        }
        self.after_render(view)
    }

    /// Finishes a render, nested views first.
    fn after_render(&mut self, view: ViewId) -> Result<()> {
        let (children, actions, is_component) = match self.tree.get_mut(view) {
            Some(node) => {
                node.flags.rendered = true;
                node.flags.being_rendered = false;
                (
                    node.children.iter().map(|(key, child)| (key.clone(), *child)).collect::<Vec<_>>(),
                    mem::take(&mut node.after_render),
                    node.options.is_component,
                )
            }
            None => return Ok(()),
        };

        for (key, child) in children {
            let (inline, child_component) = match self.tree.get(child) {
                Some(node) => (!node.options.not_to_render, node.options.is_component),
                None => continue,
            };
            // our element moved, so did the declared ones inside it
            if is_component && !child_component {
                if let Some(selector) = self.declared_selector(view, &key) {
                    if let Some(node) = self.tree.get_mut(child) {
                        node.selector = Some(selector);
                    }
                }
            }
            if inline {
                if let Some(node) = self.tree.get_mut(child) {
                    node.flags.element_bound = true;
                }
                self.after_render(child)?;
            }
        }

        let mut re_render = Vec::new();
        for action in actions {
            match action {
                AfterRender::Bind(child) => {
                    if let Some(node) = self.tree.get_mut(child) {
                        node.flags.element_bound = true;
                    }
                }
                AfterRender::Rebind => {
                    let bound = match self.tree.get(view).and_then(|node| node.selector.as_deref()) {
                        Some(selector) => self.backend.contains(selector),
                        None => false,
                    };
                    trace!(view = %view, bound, "re-binding element");
                    if let Some(node) = self.tree.get_mut(view) {
                        node.flags.element_bound = bound;
                    }
                }
                AfterRender::ReRender(callback) => re_render.push(callback),
            }
        }

        let (events, callbacks) = match self.tree.get_mut(view) {
            Some(node) => {
                node.view.after_render();
                (node.events.clone(), mem::take(&mut node.render_callbacks))
            }
            None => return Ok(()),
        };
        events.trigger("after:render", &[]);
        if let Some(node) = self.tree.get_mut(view) {
            node.flags.fully_rendered = true;
        }
        trace!(view = %view, "rendered");

        for callback in callbacks {
            callback(self, view);
        }

        if !re_render.is_empty() && self.tree.contains(view) {
            if let Some(node) = self.tree.get_mut(view) {
                node.render_callbacks.extend(re_render.into_iter().flatten());
            }
            self.start_render(view, None)?;
        }
        Ok(())
    }
}
