//! Markdown rendering and page layouts.
//!
//! Article bodies are rendered with comrak using GFM extensions. Fenced code
//! blocks in a language the code highlighter handles are lifted out of the
//! rendered HTML and become `<pre><code>` target elements in the
//! [`Document`], so the highlighter can bind to them when the page is
//! connected. Everything else stays as pre-rendered markup.

use std::collections::BTreeMap;

use comrak::{
    format_html,
    nodes::{AstNode, NodeValue},
    parse_document, Arena, Options,
};
use tracing::debug;

use crate::article::{Article, ArticleCollection};
use crate::controllers::{data_attr, target_attr, CodeHighlighter, Collapse, CONTROLLER_ATTR};
use crate::dom::{Document, NodeId};
use crate::helpers::{article_link, other_articles, title, HtmlLinkRenderer};

/// Marks the position of a lifted code block inside comrak's output.
///
/// Raw HTML from the markdown source is never passed through (see
/// [`make_options`]), so authored comments cannot collide with it.
const CODE_MARKER: &str = "<!--blogsmith-code:";

/// Stylesheet href shared by every page.
pub const STYLESHEET_URL: &str = "/assets/site.css";

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Minimal HTML entity escaping for text content and attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Convert text to a URL-safe slug.
///
/// Lowercase the text, map spaces/hyphens/underscores to `-`, strip all other
/// non-alphanumeric characters, collapse consecutive hyphens, and trim
/// leading/trailing hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if (c == ' ' || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_owned()
}

/// Text of an HTML fragment: tags dropped, the entities [`escape`] produces
/// decoded.
fn plain_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// File name stem of the page for `tag`. Tags with no sluggable characters
/// share the `tag` page.
pub fn tag_slug(tag: &str) -> String {
    let slug = slugify(tag);
    if slug.is_empty() {
        "tag".to_owned()
    } else {
        slug
    }
}

/// Root-relative URL of the page listing every article tagged `tag`.
pub fn tag_url(tag: &str) -> String {
    format!("/tags/{}.html", tag_slug(tag))
}

/// Every tag in `articles`, grouped by [`tag_slug`]. Tags that differ only in
/// case or punctuation land on one page.
pub fn tag_groups(articles: &ArticleCollection) -> BTreeMap<String, Vec<&str>> {
    let mut groups: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for tag in articles.tags() {
        groups.entry(tag_slug(tag)).or_default().push(tag);
    }
    groups
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

/// comrak options: GFM extensions, raw HTML stripped.
fn make_options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.render.unsafe_ = false;
    options
}

/// First whitespace-delimited token of a fence info string.
fn fence_language(info: &str) -> &str {
    info.split_whitespace().next().unwrap_or("")
}

struct LiftedCode {
    role: &'static str,
    language: String,
    source: String,
}

/// Replace fenced code blocks the highlighter handles with numbered markers.
fn lift_code_blocks<'a>(root: &'a AstNode<'a>, highlighter: &CodeHighlighter) -> Vec<LiftedCode> {
    let mut lifted = Vec::new();

    for node in root.descendants() {
        let replacement = {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::CodeBlock(ncb) if ncb.fenced => {
                    let language = fence_language(&ncb.info);
                    highlighter.role_for_language(language).map(|role| LiftedCode {
                        role,
                        language: language.to_ascii_lowercase(),
                        source: ncb.literal.clone(),
                    })
                }
                _ => None,
            }
        };

        if let Some(code) = replacement {
            let marker = format!("{CODE_MARKER}{}-->\n", lifted.len());
            node.data.borrow_mut().value = NodeValue::Raw(marker);
            lifted.push(code);
        }
    }

    lifted
}

/// Render `input` as markdown and append the result to `parent`.
///
/// Returns the number of code target elements created.
pub fn render_markdown_into(
    doc: &mut Document,
    parent: NodeId,
    input: &str,
    highlighter: &CodeHighlighter,
) -> usize {
    let arena = Arena::new();
    let options = make_options();
    let root = parse_document(&arena, input, &options);
    let lifted = lift_code_blocks(root, highlighter);

    let mut html_bytes = Vec::new();
    if let Err(e) = format_html(root, &options, &mut html_bytes) {
        debug!(error = %e, "comrak formatting failed");
        return 0;
    }
    let html = String::from_utf8_lossy(&html_bytes);

    let mut rest: &str = &html;
    let mut created = 0usize;
    while let Some(start) = rest.find(CODE_MARKER) {
        push_markup(doc, parent, &rest[..start]);
        let after = &rest[start + CODE_MARKER.len()..];
        let Some(end) = after.find("-->") else {
            rest = &rest[start..];
            break;
        };
        let code = after[..end].parse::<usize>().ok().and_then(|i| lifted.get(i));
        if let Some(code) = code {
            append_code_block(doc, parent, code);
            created += 1;
        }
        let tail = &after[end + 3..];
        rest = tail.strip_prefix('\n').unwrap_or(tail);
    }
    push_markup(doc, parent, rest);

    debug!(code_blocks = created, lifted = lifted.len(), "markdown rendered");
    created
}

fn push_markup(doc: &mut Document, parent: NodeId, html: &str) {
    if !html.is_empty() {
        doc.append_markup(parent, html, &plain_text(html));
    }
}

fn append_code_block(doc: &mut Document, parent: NodeId, code: &LiftedCode) {
    let pre = doc.append_element(parent, "pre");
    let el = doc.append_element(pre, "code");
    doc.set_attr(el, &target_attr(CodeHighlighter::IDENTIFIER), code.role);
    doc.set_attr(el, "data-language", &code.language);
    doc.append_text(el, &code.source);
}

// ---------------------------------------------------------------------------
// Page layouts
// ---------------------------------------------------------------------------

/// Per-build values every page layout needs.
pub struct PageContext<'a> {
    pub site_title: &'a str,
    pub highlighter: &'a CodeHighlighter,
}

/// `<html>` with head and site header. Returns the document and its `<main>`.
fn page_shell(ctx: &PageContext, page_title: &str) -> (Document, NodeId) {
    let mut doc = Document::new("html");
    let html = doc.root();
    doc.set_attr(html, "lang", "en");

    let head = doc.append_element(html, "head");
    let charset = doc.append_element(head, "meta");
    doc.set_attr(charset, "charset", "utf-8");
    let viewport = doc.append_element(head, "meta");
    doc.set_attr(viewport, "name", "viewport");
    doc.set_attr(viewport, "content", "width=device-width, initial-scale=1");
    let title_el = doc.append_element(head, "title");
    let full_title = if page_title == ctx.site_title {
        page_title.to_owned()
    } else {
        format!("{page_title} · {}", ctx.site_title)
    };
    doc.append_text(title_el, &full_title);
    let css = doc.append_element(head, "link");
    doc.set_attr(css, "rel", "stylesheet");
    doc.set_attr(css, "href", STYLESHEET_URL);

    let body = doc.append_element(html, "body");
    let header = doc.append_element(body, "header");
    doc.set_attr(header, "class", "site-header");
    let home = doc.append_element(header, "a");
    doc.set_attr(home, "href", "/");
    doc.append_text(home, ctx.site_title);

    let main = doc.append_element(body, "main");
    doc.set_attr(main, "class", "content");
    (doc, main)
}

/// `<ul>` of article links.
fn append_article_list<'a, I>(doc: &mut Document, parent: NodeId, articles: I)
where
    I: IntoIterator<Item = &'a Article>,
{
    let list = doc.append_element(parent, "ul");
    doc.set_attr(list, "class", "article-list");
    for article in articles {
        let item = doc.append_element(list, "li");
        doc.append_markup(item, &article_link(article, &HtmlLinkRenderer), title(article));
    }
}

/// Full page for one article: heading, optional cover image, body, tags, and
/// one related-articles list per tag that has other articles.
pub fn article_page(ctx: &PageContext, article: &Article, articles: &ArticleCollection) -> Document {
    let display_title = title(article);
    let (mut doc, main) = page_shell(ctx, display_title);

    let el = doc.append_element(main, "article");
    doc.set_attr(el, "class", "article");
    doc.set_attr(el, CONTROLLER_ATTR, CodeHighlighter::IDENTIFIER);

    let h1 = doc.append_element(el, "h1");
    doc.append_text(h1, display_title);

    if let Some(src) = &article.data.image {
        let figure = doc.append_element(el, "figure");
        doc.set_attr(figure, "class", "cover");
        doc.set_attr(figure, CONTROLLER_ATTR, Collapse::IDENTIFIER);
        if let Some(display) = &article.data.image_display {
            doc.set_attr(figure, &data_attr(Collapse::IDENTIFIER, "display"), display);
        }
        let img = doc.append_element(figure, "img");
        doc.set_attr(img, &target_attr(Collapse::IDENTIFIER), "image");
        doc.set_attr(img, "src", src);
        doc.set_attr(img, "alt", display_title);
    }

    let body = doc.append_element(el, "div");
    doc.set_attr(body, "class", "article-body");
    render_markdown_into(&mut doc, body, &article.body, ctx.highlighter);

    if !article.tags.is_empty() {
        let tags = doc.append_element(el, "ul");
        doc.set_attr(tags, "class", "tags");
        for tag in &article.tags {
            let item = doc.append_element(tags, "li");
            let link = doc.append_element(item, "a");
            doc.set_attr(link, "href", &tag_url(tag));
            doc.append_text(link, tag);
        }
    }

    let related: Vec<(&String, Vec<&Article>)> = article
        .tags
        .iter()
        .map(|tag| (tag, other_articles(article, tag, articles)))
        .filter(|(_, others)| !others.is_empty())
        .collect();
    if !related.is_empty() {
        let section = doc.append_element(el, "section");
        doc.set_attr(section, "class", "related");
        for (tag, others) in related {
            let h2 = doc.append_element(section, "h2");
            doc.append_text(h2, &format!("More on {tag}"));
            append_article_list(&mut doc, section, others);
        }
    }

    doc
}

/// Page listing every article carrying any of `tags`, which share one slug.
pub fn tag_page(ctx: &PageContext, tags: &[&str], articles: &ArticleCollection) -> Document {
    let names: Vec<String> = tags.iter().map(|t| format!("“{t}”")).collect();
    let heading = format!("Tagged {}", names.join(" / "));
    let (mut doc, main) = page_shell(ctx, &heading);
    let h1 = doc.append_element(main, "h1");
    doc.append_text(h1, &heading);
    append_article_list(
        &mut doc,
        main,
        articles.filter(|a| tags.iter().any(|t| a.has_tag(t))),
    );
    doc
}

/// Front page: every article plus the tag list.
pub fn index_page(ctx: &PageContext, articles: &ArticleCollection) -> Document {
    let (mut doc, main) = page_shell(ctx, ctx.site_title);
    let h1 = doc.append_element(main, "h1");
    doc.append_text(h1, ctx.site_title);
    append_article_list(&mut doc, main, articles);

    let groups = tag_groups(articles);
    if !groups.is_empty() {
        let nav = doc.append_element(main, "nav");
        doc.set_attr(nav, "class", "tag-index");
        let list = doc.append_element(nav, "ul");
        for (slug, tags) in &groups {
            let item = doc.append_element(list, "li");
            let link = doc.append_element(item, "a");
            doc.set_attr(link, "href", &format!("/tags/{slug}.html"));
            doc.append_text(link, &tags.join(" / "));
        }
    }
    doc
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
