//! Mounting markup.
//!
//! Views never touch a document directly; they emit [`Patch`]es that a [`Backend`] applies. The
//! [`MemoryBackend`] keeps everything in memory, which is enough for headless use and tests.

use crate::error::{Error, Result};
use html_parser::{Dom, Node};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Attribute used to re-select component views after they replaced their own element.
pub const CID_ATTRIBUTE: &str = "data-view-cid";

/// Attribute marking the default mount point of a nested view.
pub const VIEW_ATTRIBUTE: &str = "data-view";

/// DOM mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    /// Replaces the inner content of the element at `selector`.
    SetContent { selector: String, markup: String },
    /// Replaces the element at `selector` itself; afterwards it is found at `new_selector`.
    ReplaceElement {
        selector: String,
        new_selector: String,
        markup: String,
    },
    /// Empties the element at `selector`.
    Empty { selector: String },
}

/// A document implementation.
pub trait Backend: Send {
    /// Applies a patch. Missing targets are `Error::Mount`.
    fn apply(&mut self, patch: Patch) -> Result<()>;

    /// True if an element exists at `selector`.
    fn contains(&self, selector: &str) -> bool;
}

/// Lets the caller keep a handle on the document the host writes to.
impl<B: Backend> Backend for Arc<Mutex<B>> {
    fn apply(&mut self, patch: Patch) -> Result<()> {
        self.lock().apply(patch)
    }

    fn contains(&self, selector: &str) -> bool {
        self.lock().contains(selector)
    }
}

/// Selector for a component view’s element.
pub fn cid_selector(cid: &str) -> String {
    format!("[{}=\"{}\"]", CID_ATTRIBUTE, cid)
}

/// Placeholder markup for a component view that renders itself later.
pub fn cid_placeholder(cid: &str) -> String {
    format!("<div {}=\"{}\"></div>", CID_ATTRIBUTE, cid)
}

fn elements(markup: &str) -> Result<Vec<Node>> {
    let dom = Dom::parse(markup).map_err(|err| Error::Mount(format!("unparsable markup: {}", err)))?;
    Ok(dom
        .children
        .into_iter()
        .filter(|node| match node {
            Node::Element(_) => true,
            Node::Text(text) => !text.trim().is_empty(),
            Node::Comment(_) => false,
        })
        .collect())
}

/// Tags the single root element of `markup` with a component id.
///
/// Fails if the markup doesn’t consist of exactly one element.
pub fn tag_root_element(markup: &str, cid: &str) -> Result<String> {
    let roots = elements(markup)?;
    let name = match roots.as_slice() {
        [Node::Element(element)] => element.name.clone(),
        [] => return Err(Error::Mount("component markup has no root element".into())),
        _ => {
            return Err(Error::Mount(format!(
                "component markup must have exactly one root element, found {} nodes",
                roots.len()
            )))
        }
    };

    let start = root_tag_start(markup, &name)
        .ok_or_else(|| Error::Mount(format!("can’t locate <{}> in component markup", name)))?;
    let insert_at = start + 1 + name.len();
    let mut tagged = String::with_capacity(markup.len() + cid.len() + 20);
    tagged.push_str(&markup[..insert_at]);
    tagged.push_str(&format!(" {}=\"{}\"", CID_ATTRIBUTE, cid));
    tagged.push_str(&markup[insert_at..]);
    Ok(tagged)
}

/// Byte offset of the `<` opening the first element named `name`, skipping comments and
/// declarations.
fn root_tag_start(markup: &str, name: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(pos) = markup[offset..].find('<') {
        let at = offset + pos;
        let rest = &markup[at + 1..];
        if rest.starts_with("!--") {
            offset = at + rest.find("-->").map_or(markup.len() - at, |end| end + 4);
            continue;
        }
        if rest.len() >= name.len()
            && rest.is_char_boundary(name.len())
            && rest[..name.len()].eq_ignore_ascii_case(name)
        {
            return Some(at);
        }
        offset = at + 1;
    }
    None
}

/// An in-memory document.
///
/// Containers are registered up front with [`add_container`](Self::add_container); mounting
/// markup also registers the nested mount points it contains (`data-view`, `data-view-cid` and
/// `id` attributes), so nested views can be re-rendered on their own.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    known: HashSet<String>,
    contents: HashMap<String, String>,
    applied: Vec<Patch>,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }

    pub fn add_container(&mut self, selector: &str) {
        self.known.insert(selector.to_string());
    }

    pub fn with_container(mut self, selector: &str) -> Self {
        self.add_container(selector);
        self
    }

    /// The markup last written to (or as) the element at `selector`.
    pub fn content(&self, selector: &str) -> Option<&str> {
        self.contents.get(selector).map(String::as_str)
    }

    /// Returns an iterator over applied patches.
    ///
    /// Calling `next` will always remove a patch from the log.
    pub fn patches(&mut self) -> impl Iterator<Item = Patch> + '_ {
        self.applied.drain(..)
    }

    fn forget_descendants(&mut self, selector: &str) {
        let prefix = format!("{} ", selector);
        self.known.retain(|s| !s.starts_with(&prefix));
        self.contents.retain(|s, _| !s.starts_with(&prefix));
    }

    fn register_descendants(&mut self, selector: &str, markup: &str) {
        // unparsable markup just doesn’t contribute mount points
        if let Ok(nodes) = elements(markup) {
            self.register_nodes(selector, &nodes);
        }
    }

    fn register_nodes(&mut self, selector: &str, nodes: &[Node]) {
        for node in nodes {
            if let Node::Element(element) = node {
                for (attribute, value) in &element.attributes {
                    if let Some(value) = value {
                        if attribute == VIEW_ATTRIBUTE {
                            self.known
                                .insert(format!("{} [{}=\"{}\"]", selector, VIEW_ATTRIBUTE, value));
                        } else if attribute == CID_ATTRIBUTE {
                            self.known.insert(cid_selector(value));
                        }
                    }
                }
                if let Some(id) = &element.id {
                    self.known.insert(format!("#{}", id));
                }
                self.register_nodes(selector, &element.children);
            }
        }
    }
}

impl Backend for MemoryBackend {
    fn apply(&mut self, patch: Patch) -> Result<()> {
        match &patch {
            Patch::SetContent { selector, markup } => {
                if !self.contains(selector) {
                    return Err(Error::Mount(format!("no element at {}", selector)));
                }
                self.forget_descendants(selector);
                self.contents.insert(selector.clone(), markup.clone());
                self.register_descendants(selector, markup);
            }
            Patch::ReplaceElement {
                selector,
                new_selector,
                markup,
            } => {
                if !self.known.remove(selector) {
                    return Err(Error::Mount(format!("no element at {}", selector)));
                }
                self.contents.remove(selector);
                self.forget_descendants(selector);
                self.known.insert(new_selector.clone());
                self.contents.insert(new_selector.clone(), markup.clone());
                self.register_descendants(new_selector, markup);
            }
            Patch::Empty { selector } => {
                if !self.contains(selector) {
                    return Err(Error::Mount(format!("no element at {}", selector)));
                }
                self.forget_descendants(selector);
                self.contents.insert(selector.clone(), String::new());
            }
        }
        self.applied.push(patch);
        Ok(())
    }

    fn contains(&self, selector: &str) -> bool {
        self.known.contains(selector)
    }
}
