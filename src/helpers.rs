//! Template helpers: display titles, article links and related articles.

use crate::article::{Article, ArticleCollection};
use crate::html::escape;

/// Builds link markup from a label and an href.
pub trait LinkRenderer {
    fn render_link(&self, label: &str, url: &str) -> String;
}

/// Renders a plain `<a href="…">…</a>` with both values HTML-escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlLinkRenderer;

impl LinkRenderer for HtmlLinkRenderer {
    fn render_link(&self, label: &str, url: &str) -> String {
        format!("<a href=\"{}\">{}</a>", escape(url), escape(label))
    }
}

impl<F> LinkRenderer for F
where
    F: Fn(&str, &str) -> String,
{
    fn render_link(&self, label: &str, url: &str) -> String {
        self(label, url)
    }
}

/// Display title: the priority title when set and non-empty, else the title.
pub fn title(article: &Article) -> &str {
    match article.data.priority_title.as_deref() {
        Some(priority) if !priority.is_empty() => priority,
        _ => &article.title,
    }
}

/// Link to `article` labelled with its display title.
pub fn article_link(article: &Article, renderer: &impl LinkRenderer) -> String {
    renderer.render_link(title(article), &article.url)
}

/// Other articles sharing `tag` with `current`, in collection order.
///
/// Identity is by title: every article whose title equals `current.title` is
/// left out, even a distinct article that happens to share the title.
pub fn other_articles<'a>(
    current: &Article,
    tag: &str,
    articles: &'a ArticleCollection,
) -> Vec<&'a Article> {
    articles.filter(|a| a.has_tag(tag) && a.title != current.title)
}
