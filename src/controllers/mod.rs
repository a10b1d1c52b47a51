//! Behaviours bound to document elements and run once when attached.
//!
//! A controller declares the target roles and data keys it needs. The host
//! ([`Application`]) resolves those against the document into a
//! [`RawBindings`] lookup, the controller turns that into its own typed
//! bindings, and `on_attach` runs with them.
//!
//! Markup conventions, for a controller named `collapse`:
//!
//! ```html
//! <figure data-controller="collapse" data-collapse-display="none">
//!   <img data-collapse-target="image" src="/cover.png">
//! </figure>
//! ```

mod application;
mod code_highlighter;
mod collapse;

use std::collections::BTreeMap;

pub use application::{Application, Instance, Lifecycle};
pub use code_highlighter::{CodeBlocks, CodeHighlighter, HighlightVariant};
pub use collapse::{Collapse, CollapseBindings};

use crate::dom::{Document, NodeId};
use crate::highlight::HighlightEngine;

/// Attribute listing the controllers attached to an element.
pub const CONTROLLER_ATTR: &str = "data-controller";

/// `data-{identifier}-target`
pub fn target_attr(identifier: &str) -> String {
    format!("data-{identifier}-target")
}

/// `data-{identifier}-{key}`
pub fn data_attr(identifier: &str, key: &str) -> String {
    format!("data-{identifier}-{key}")
}

/// Elements per target role and data values per key, as resolved by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBindings {
    targets: BTreeMap<String, Vec<NodeId>>,
    data: BTreeMap<String, String>,
}

impl RawBindings {
    pub fn add_target(&mut self, role: &str, element: NodeId) {
        self.targets.entry(role.to_owned()).or_default().push(element);
    }

    pub fn set_data(&mut self, key: &str, value: &str) {
        self.data.insert(key.to_owned(), value.to_owned());
    }

    /// Every element bound to `role`, in document order.
    pub fn targets(&self, role: &str) -> &[NodeId] {
        self.targets.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First element bound to `role`.
    pub fn target(&self, role: &str) -> Option<NodeId> {
        self.targets(role).first().copied()
    }

    pub fn data(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// A behaviour attached to elements carrying its identifier in
/// `data-controller`.
pub trait Controller {
    /// Typed view of the elements and values this controller works on.
    type Bindings;

    fn identifier(&self) -> &'static str;

    fn target_roles(&self) -> &'static [&'static str];

    fn data_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Runs once when the controller is registered with the host, before any
    /// element is attached.
    fn initialize(&self, _engine: &mut dyn HighlightEngine) {}

    fn bind(&self, raw: &RawBindings) -> Self::Bindings;

    fn on_attach(
        &self,
        doc: &mut Document,
        bindings: &Self::Bindings,
        engine: &mut dyn HighlightEngine,
    );
}

/// Object-safe view of [`Controller`] so the host can store mixed controllers.
trait AnyController {
    fn identifier(&self) -> &'static str;
    fn target_roles(&self) -> &'static [&'static str];
    fn data_keys(&self) -> &'static [&'static str];
    fn initialize(&self, engine: &mut dyn HighlightEngine);
    fn attach(&self, doc: &mut Document, raw: &RawBindings, engine: &mut dyn HighlightEngine);
}

impl<C: Controller> AnyController for C {
    fn identifier(&self) -> &'static str {
        Controller::identifier(self)
    }

    fn target_roles(&self) -> &'static [&'static str] {
        Controller::target_roles(self)
    }

    fn data_keys(&self) -> &'static [&'static str] {
        Controller::data_keys(self)
    }

    fn initialize(&self, engine: &mut dyn HighlightEngine) {
        Controller::initialize(self, engine)
    }

    fn attach(&self, doc: &mut Document, raw: &RawBindings, engine: &mut dyn HighlightEngine) {
        let bindings = self.bind(raw);
        self.on_attach(doc, &bindings, engine);
    }
}
