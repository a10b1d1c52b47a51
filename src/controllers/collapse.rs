use super::{Controller, RawBindings};
use crate::dom::{Document, NodeId};
use crate::highlight::HighlightEngine;

/// Sets the bound image's inline `display` from the `display` data value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Collapse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapseBindings {
    pub image: Option<NodeId>,
    pub display: Option<String>,
}

impl Collapse {
    pub const IDENTIFIER: &'static str = "collapse";
}

impl Controller for Collapse {
    type Bindings = CollapseBindings;

    fn identifier(&self) -> &'static str {
        Self::IDENTIFIER
    }

    fn target_roles(&self) -> &'static [&'static str] {
        &["image"]
    }

    fn data_keys(&self) -> &'static [&'static str] {
        &["display"]
    }

    fn bind(&self, raw: &RawBindings) -> CollapseBindings {
        CollapseBindings {
            image: raw.target("image"),
            display: raw.data("display").map(str::to_owned),
        }
    }

    /// The value is assigned verbatim. Without one, the inline `display` is
    /// cleared.
    fn on_attach(
        &self,
        doc: &mut Document,
        bindings: &CollapseBindings,
        _engine: &mut dyn HighlightEngine,
    ) {
        let Some(image) = bindings.image else {
            return;
        };
        match &bindings.display {
            Some(display) => doc.set_style_property(image, "display", display),
            None => doc.remove_style_property(image, "display"),
        }
    }
}
