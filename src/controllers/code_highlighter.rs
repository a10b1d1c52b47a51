use serde::Deserialize;

use super::{Controller, RawBindings};
use crate::dom::{Document, NodeId};
use crate::highlight::{GrammarDefinition, HighlightEngine, ERB, RUBY};

/// Which grammars the highlighter is configured with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HighlightVariant {
    /// Every `code` target is highlighted as Ruby.
    #[default]
    Ruby,
    /// `ruby` targets as Ruby, `erb` targets as ERB templates.
    RubyErb,
}

/// Highlights code elements in place when attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeHighlighter {
    variant: HighlightVariant,
}

/// Bound code elements grouped by the grammar they are highlighted with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlocks {
    pub groups: Vec<(&'static str, Vec<NodeId>)>,
}

impl CodeBlocks {
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, els)| els.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CodeHighlighter {
    pub const IDENTIFIER: &'static str = "code-highlighter";

    pub fn new(variant: HighlightVariant) -> Self {
        Self { variant }
    }

    pub fn variant(&self) -> HighlightVariant {
        self.variant
    }

    /// `(target role, grammar)` pairs.
    fn groups(&self) -> &'static [(&'static str, &'static str)] {
        match self.variant {
            HighlightVariant::Ruby => &[("code", RUBY)],
            HighlightVariant::RubyErb => &[("ruby", RUBY), ("erb", ERB)],
        }
    }

    /// Target role for a fenced code block's language, if it is one this
    /// highlighter handles.
    pub fn role_for_language(&self, language: &str) -> Option<&'static str> {
        let lang = language.to_ascii_lowercase();
        match (self.variant, lang.as_str()) {
            (HighlightVariant::Ruby, "ruby" | "rb" | "erb") => Some("code"),
            (HighlightVariant::RubyErb, "ruby" | "rb") => Some("ruby"),
            (HighlightVariant::RubyErb, "erb" | "html+erb" | "rhtml") => Some("erb"),
            _ => None,
        }
    }
}

impl Controller for CodeHighlighter {
    type Bindings = CodeBlocks;

    fn identifier(&self) -> &'static str {
        Self::IDENTIFIER
    }

    fn target_roles(&self) -> &'static [&'static str] {
        match self.variant {
            HighlightVariant::Ruby => &["code"],
            HighlightVariant::RubyErb => &["ruby", "erb"],
        }
    }

    fn initialize(&self, engine: &mut dyn HighlightEngine) {
        for &(_, grammar) in self.groups() {
            let definition = match grammar {
                ERB => GrammarDefinition::erb(),
                _ => GrammarDefinition::ruby(),
            };
            engine.register_grammar(grammar, definition);
        }
    }

    fn bind(&self, raw: &RawBindings) -> CodeBlocks {
        CodeBlocks {
            groups: self
                .groups()
                .iter()
                .map(|&(role, grammar)| (grammar, raw.targets(role).to_vec()))
                .collect(),
        }
    }

    fn on_attach(
        &self,
        doc: &mut Document,
        bindings: &CodeBlocks,
        engine: &mut dyn HighlightEngine,
    ) {
        for (grammar, elements) in &bindings.groups {
            for &element in elements {
                engine.highlight_element(doc, element, grammar);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::testing::{Call, RecordingEngine};
    use crate::controllers::{Application, CONTROLLER_ATTR};
    use crate::highlight::SyntectEngine;

    fn code(doc: &mut Document, role: &str, source: &str) -> NodeId {
        let root = doc.root();
        let pre = doc.append_element(root, "pre");
        let code = doc.append_element(pre, "code");
        doc.set_attr(code, "data-code-highlighter-target", role);
        doc.append_text(code, source);
        code
    }

    fn highlighter_root() -> Document {
        let mut doc = Document::new("article");
        let root = doc.root();
        doc.set_attr(root, CONTROLLER_ATTR, CodeHighlighter::IDENTIFIER);
        doc
    }

    #[test]
    fn two_code_targets_highlighted_once_each_after_registration() {
        let mut doc = highlighter_root();
        let first = code(&mut doc, "code", "puts 1");
        let second = code(&mut doc, "code", "puts 2");

        let mut app = Application::new(RecordingEngine::default());
        app.register(CodeHighlighter::new(HighlightVariant::Ruby));
        app.connect(&mut doc);

        assert_eq!(
            app.engine().calls,
            vec![
                Call::Register("ruby".into()),
                Call::Highlight(first, "ruby".into()),
                Call::Highlight(second, "ruby".into()),
            ]
        );
    }

    #[test]
    fn erb_variant_registers_both_and_routes_groups() {
        let mut doc = highlighter_root();
        let ruby = code(&mut doc, "ruby", "x = 1");
        let erb = code(&mut doc, "erb", "<%= x %>");
        let ruby2 = code(&mut doc, "ruby", "y = 2");

        let mut app = Application::new(RecordingEngine::default());
        app.register(CodeHighlighter::new(HighlightVariant::RubyErb));
        app.connect(&mut doc);

        let calls = &app.engine().calls;
        assert_eq!(
            &calls[..2],
            &[Call::Register("ruby".into()), Call::Register("erb".into())]
        );
        let mut highlights = calls[2..].to_vec();
        highlights.sort_by_key(|c| match c {
            Call::Highlight(id, _) => Some(*id),
            Call::Register(_) => None,
        });
        assert_eq!(
            highlights,
            vec![
                Call::Highlight(ruby, "ruby".into()),
                Call::Highlight(erb, "erb".into()),
                Call::Highlight(ruby2, "ruby".into()),
            ]
        );
    }

    #[test]
    fn no_targets_is_a_noop() {
        let mut doc = highlighter_root();
        let mut app = Application::new(RecordingEngine::default());
        app.register(CodeHighlighter::new(HighlightVariant::RubyErb));
        let instances = app.connect(&mut doc);
        assert_eq!(instances.len(), 1);
        assert_eq!(app.engine().calls.len(), 2);
    }

    #[test]
    fn language_routing() {
        let single = CodeHighlighter::new(HighlightVariant::Ruby);
        assert_eq!(single.role_for_language("Ruby"), Some("code"));
        assert_eq!(single.role_for_language("erb"), Some("code"));
        assert_eq!(single.role_for_language("python"), None);

        let dual = CodeHighlighter::new(HighlightVariant::RubyErb);
        assert_eq!(dual.role_for_language("rb"), Some("ruby"));
        assert_eq!(dual.role_for_language("erb"), Some("erb"));
        assert_eq!(dual.role_for_language(""), None);
    }

    #[test]
    fn highlights_with_syntect() {
        let mut doc = highlighter_root();
        let ruby = code(&mut doc, "ruby", "def greet; end\n");
        let erb = code(&mut doc, "erb", "<p><%= @name %></p>\n");

        let mut app = Application::new(SyntectEngine::new());
        app.register(CodeHighlighter::new(HighlightVariant::RubyErb));
        app.connect(&mut doc);

        assert_eq!(app.engine().highlighted(), 2);
        assert_eq!(doc.attr(ruby, "class"), Some("highlight language-ruby"));
        assert_eq!(doc.attr(erb, "class"), Some("highlight language-erb"));
        assert_eq!(doc.text_content(erb), "<p><%= @name %></p>\n");
        assert!(doc.node_html(ruby).contains("<span"));
    }
}
