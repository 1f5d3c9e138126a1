//! A hierarchical view framework.
//!
//! Views form a tree. Each view may have a layout: a JSON document that declares the nested views
//! it is made of. Creating a view creates its nested views too, and a view becomes *ready* once
//! they (and whatever else it waits for) have arrived. Rendering combines each view’s template
//! with its nested views’ markup and mounts the result through a [`Backend`].
//!
//! All loading goes through collaborators ([`Loader`], [`ViewLoader`]) that report back
//! asynchronously; call [`Host::poll`] to apply what has arrived.

#[macro_use]
mod view;
mod completion;
mod config;
pub mod dom;
mod error;
pub mod events;
mod factory;
mod host;
pub mod interpolate;
mod layouter;
mod lifecycle;
pub mod loader;
mod model;
mod render;
mod renderer;
pub mod storage;
mod templator;
mod tree;

pub use completion::Completion;
pub use config::{Config, LoaderConfig, PathConfig};
pub use dom::{Backend, MemoryBackend, Patch};
pub use error::{Error, Result};
pub use events::{EventHandler, Events, ListenerId, Listening};
pub use factory::{Constructor, Registry, ViewLoader};
pub use host::{Host, HostBuilder, RequestId};
pub use layouter::{LayoutRef, Layouter, ViewDeclaration, ViewRef};
pub use loader::{DefaultLoader, Loader, MapLoader, Resource, ResourceKind};
pub use model::Model;
pub use render::RenderStatus;
pub use renderer::{RenderOptions, RenderStrategy, Renderer};
pub use templator::{Compiler, LayoutOptions, Template, TemplateFn, Templator};
pub use tree::ViewCallback;
pub use view::{BaseView, ReadyCondition, Setup, TemplateRef, View, ViewId, ViewOptions, Waiter};
