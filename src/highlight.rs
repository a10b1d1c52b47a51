//! Grammar registry and the syntect-backed highlighting engine.
//!
//! Grammars are registered by name during start-up and looked up by name when
//! an element is highlighted. Highlighting never fails from the caller's point
//! of view: an unknown grammar or a tokenizer error degrades to escaped plain
//! text and a warning.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{css_for_theme_with_class_style, ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use tracing::{debug, warn};

use crate::dom::{Document, NodeId};
use crate::error::{Result, SiteError};
use crate::html::escape;

static SYNTAXES: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);

/// Theme used when none is configured.
pub const DEFAULT_THEME: &str = "InspiredGitHub";

/// Name of the plain Ruby grammar.
pub const RUBY: &str = "ruby";
/// Name of the ERB (Ruby embedded in HTML templates) grammar.
pub const ERB: &str = "erb";

/// How a grammar name maps onto a syntect syntax.
///
/// Holds candidate syntect tokens (file extension or syntax name); the first
/// one the syntax set knows wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarDefinition {
    tokens: Vec<String>,
}

impl GrammarDefinition {
    pub fn new(token: &str) -> Self {
        Self {
            tokens: vec![token.to_owned()],
        }
    }

    /// Add a fallback token.
    pub fn or(mut self, token: &str) -> Self {
        self.tokens.push(token.to_owned());
        self
    }

    pub fn ruby() -> Self {
        Self::new("rb").or("Ruby")
    }

    pub fn erb() -> Self {
        Self::new("erb").or("HTML (Rails)").or("rhtml")
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    fn resolve<'s>(&self, syntaxes: &'s SyntaxSet) -> Option<&'s SyntaxReference> {
        self.tokens
            .iter()
            .find_map(|token| syntaxes.find_syntax_by_token(token))
    }
}

/// Name → grammar table. The first registration of a name wins; repeating it
/// is a no-op.
#[derive(Debug, Clone, Default)]
pub struct GrammarRegistry {
    grammars: BTreeMap<String, GrammarDefinition>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when `name` was already registered.
    pub fn register(&mut self, name: &str, definition: GrammarDefinition) -> bool {
        if self.grammars.contains_key(name) {
            return false;
        }
        self.grammars.insert(name.to_owned(), definition);
        true
    }

    pub fn get(&self, name: &str) -> Option<&GrammarDefinition> {
        self.grammars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.grammars.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.grammars.keys().map(String::as_str)
    }
}

/// The highlighting facility controllers talk to.
pub trait HighlightEngine {
    /// Make `name` available to [`HighlightEngine::highlight_element`].
    /// Safe to call repeatedly; returns `false` when nothing changed.
    fn register_grammar(&mut self, name: &str, definition: GrammarDefinition) -> bool;

    /// Replace the content of `element` with its text highlighted as `grammar`.
    fn highlight_element(&mut self, doc: &mut Document, element: NodeId, grammar: &str);
}

/// [`HighlightEngine`] that emits class-based markup via syntect.
pub struct SyntectEngine {
    syntaxes: &'static SyntaxSet,
    theme: Theme,
    registry: GrammarRegistry,
    highlighted: usize,
}

impl SyntectEngine {
    /// Engine with the default theme.
    pub fn new() -> Self {
        let theme = ThemeSet::load_defaults()
            .themes
            .remove(DEFAULT_THEME)
            .unwrap_or_default();
        Self::from_theme(theme)
    }

    /// Engine with one of syntect's bundled themes.
    pub fn with_theme(name: &str) -> Result<Self> {
        let mut themes = ThemeSet::load_defaults().themes;
        let theme = themes.remove(name).ok_or_else(|| {
            let known: Vec<&String> = themes.keys().collect();
            SiteError::Config(format!("unknown highlight theme '{name}' (known: {known:?})"))
        })?;
        Ok(Self::from_theme(theme))
    }

    fn from_theme(theme: Theme) -> Self {
        Self {
            syntaxes: &SYNTAXES,
            theme,
            registry: GrammarRegistry::new(),
            highlighted: 0,
        }
    }

    pub fn registry(&self) -> &GrammarRegistry {
        &self.registry
    }

    /// Number of elements highlighted so far.
    pub fn highlighted(&self) -> usize {
        self.highlighted
    }

    /// Stylesheet for the classes emitted by this engine.
    pub fn stylesheet(&self) -> String {
        match css_for_theme_with_class_style(&self.theme, ClassStyle::Spaced) {
            Ok(css) => css,
            Err(e) => {
                warn!(error = %e, "theme stylesheet generation failed");
                String::new()
            }
        }
    }

    /// Highlight `text` as `grammar`, falling back to escaped plain text.
    pub fn highlight_text(&self, text: &str, grammar: &str) -> String {
        let Some(syntax) = self
            .registry
            .get(grammar)
            .and_then(|def| def.resolve(self.syntaxes))
        else {
            warn!(grammar, "grammar not available, emitting plain text");
            return escape(text);
        };

        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, self.syntaxes, ClassStyle::Spaced);
        for line in LinesWithEndings::from(text) {
            if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
                warn!(grammar, error = %e, "highlighting failed, emitting plain text");
                return escape(text);
            }
        }
        generator.finalize()
    }
}

impl Default for SyntectEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HighlightEngine for SyntectEngine {
    fn register_grammar(&mut self, name: &str, definition: GrammarDefinition) -> bool {
        let added = self.registry.register(name, definition);
        debug!(grammar = name, added, "register grammar");
        added
    }

    fn highlight_element(&mut self, doc: &mut Document, element: NodeId, grammar: &str) {
        let text = doc.text_content(element);
        let html = self.highlight_text(&text, grammar);
        doc.replace_children_with_markup(element, &html, &text);
        doc.add_class(element, "highlight");
        doc.add_class(element, &format!("language-{grammar}"));
        self.highlighted += 1;
    }
}
