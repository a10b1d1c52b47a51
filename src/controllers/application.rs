use tracing::{debug, warn};

use super::{data_attr, target_attr, AnyController, Controller, RawBindings, CONTROLLER_ATTR};
use crate::dom::{Document, NodeId};
use crate::highlight::HighlightEngine;

/// Where a controller instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unattached,
    Attached,
}

/// One controller bound to one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub element: NodeId,
    pub identifier: &'static str,
    state: Lifecycle,
}

impl Instance {
    pub fn new(element: NodeId, identifier: &'static str) -> Self {
        Self {
            element,
            identifier,
            state: Lifecycle::Unattached,
        }
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Drop back to unattached so a later [`Application::attach`] re-runs
    /// the controller.
    pub fn detach(&mut self) {
        self.state = Lifecycle::Unattached;
    }
}

/// Controller host: owns the highlighting engine and the registered
/// controllers, and attaches them to documents.
pub struct Application<E: HighlightEngine> {
    engine: E,
    controllers: Vec<Box<dyn AnyController>>,
}

impl<E: HighlightEngine> Application<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            controllers: Vec::new(),
        }
    }

    /// Register a controller and run its init hook. A second controller with
    /// an identifier that is already taken is ignored.
    pub fn register<C: Controller + 'static>(&mut self, controller: C) -> &mut Self {
        let identifier = Controller::identifier(&controller);
        if self.find(identifier).is_some() {
            warn!(identifier, "controller already registered, ignoring");
            return self;
        }
        Controller::initialize(&controller, &mut self.engine);
        debug!(identifier, "controller registered");
        self.controllers.push(Box::new(controller));
        self
    }

    pub fn is_registered(&self, identifier: &str) -> bool {
        self.find(identifier).is_some()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    fn find(&self, identifier: &str) -> Option<&dyn AnyController> {
        self.controllers
            .iter()
            .find(|c| c.identifier() == identifier)
            .map(|c| c.as_ref())
    }

    /// Attach every registered controller named by a `data-controller`
    /// attribute in `doc`, in document order. Returns the attached instances.
    pub fn connect(&mut self, doc: &mut Document) -> Vec<Instance> {
        let root = doc.root();
        let mut elements = vec![root];
        elements.extend(doc.descendants(root));

        let mut pending = Vec::new();
        for element in elements {
            let Some(names) = doc.attr(element, CONTROLLER_ATTR) else {
                continue;
            };
            for name in names.split_whitespace() {
                match self.find(name) {
                    Some(controller) => {
                        pending.push(Instance::new(element, controller.identifier()))
                    }
                    None => debug!(identifier = name, "no controller registered"),
                }
            }
        }

        let mut attached = Vec::with_capacity(pending.len());
        for mut instance in pending {
            if self.attach(doc, &mut instance) {
                attached.push(instance);
            }
        }
        attached
    }

    /// Move `instance` from unattached to attached, running its controller.
    ///
    /// Returns `false` without doing anything when the instance is already
    /// attached, its element is no longer in the document, or its controller
    /// is not registered.
    pub fn attach(&mut self, doc: &mut Document, instance: &mut Instance) -> bool {
        if instance.state == Lifecycle::Attached || !doc.is_connected(instance.element) {
            return false;
        }
        let Some(index) = self
            .controllers
            .iter()
            .position(|c| c.identifier() == instance.identifier)
        else {
            return false;
        };

        let controller = &self.controllers[index];
        let raw = resolve_bindings(doc, instance.element, controller.as_ref());
        controller.attach(doc, &raw, &mut self.engine);
        instance.state = Lifecycle::Attached;
        debug!(identifier = instance.identifier, element = ?instance.element, "attached");
        true
    }

    /// Detach every instance whose element has been removed from `doc`.
    /// Returns how many were detached.
    pub fn disconnect_removed(&self, doc: &Document, instances: &mut [Instance]) -> usize {
        let mut count = 0;
        for instance in instances {
            if instance.state == Lifecycle::Attached && !doc.is_connected(instance.element) {
                instance.detach();
                count += 1;
            }
        }
        count
    }
}

/// Whether `element` names `identifier` in its `data-controller` list.
fn controls(doc: &Document, element: NodeId, identifier: &str) -> bool {
    doc.attr(element, CONTROLLER_ATTR)
        .map(|names| names.split_whitespace().any(|n| n == identifier))
        .unwrap_or(false)
}

/// The root plus every descendant element not owned by a nested instance of
/// the same controller, in document order.
fn scope(doc: &Document, root: NodeId, identifier: &str) -> Vec<NodeId> {
    let mut out = vec![root];
    let mut stack: Vec<NodeId> = doc.children(root).iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        if doc.element(id).is_none() || controls(doc, id, identifier) {
            continue;
        }
        out.push(id);
        stack.extend(doc.children(id).iter().rev().copied());
    }
    out
}

fn resolve_bindings(doc: &Document, root: NodeId, controller: &dyn AnyController) -> RawBindings {
    let identifier = controller.identifier();
    let roles = controller.target_roles();
    let target_attr = target_attr(identifier);
    let mut raw = RawBindings::default();

    for element in scope(doc, root, identifier) {
        let Some(declared) = doc.attr(element, &target_attr) else {
            continue;
        };
        for role in declared.split_whitespace() {
            if roles.contains(&role) {
                raw.add_target(role, element);
            }
        }
    }

    for key in controller.data_keys() {
        if let Some(value) = doc.attr(root, &data_attr(identifier, key)) {
            raw.set_data(key, value);
        }
    }
    raw
}
