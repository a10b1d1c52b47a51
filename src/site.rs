//! Site build: load articles, render and connect every page, write the output.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::article::ArticleCollection;
use crate::config::SiteConfig;
use crate::controllers::{Application, CodeHighlighter, Collapse};
use crate::dom::Document;
use crate::error::{Result, SiteError};
use crate::highlight::SyntectEngine;
use crate::html::{self, PageContext, STYLESHEET_URL};
use crate::web_assets;

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub articles: usize,
    pub tags: usize,
    pub pages: usize,
    pub code_blocks: usize,
    pub output_dir: PathBuf,
}

/// Build the whole site described by `config`.
pub fn build_site(config: &SiteConfig) -> Result<BuildReport> {
    let articles = ArticleCollection::load_dir(&config.content_dir)?;
    build_collection(config, &articles)
}

/// Build pages for an already loaded collection.
pub fn build_collection(config: &SiteConfig, articles: &ArticleCollection) -> Result<BuildReport> {
    let out = &config.output_dir;
    fs::create_dir_all(out).map_err(|e| SiteError::io(out, e))?;

    let highlighter = CodeHighlighter::new(config.highlight);
    let mut app = Application::new(SyntectEngine::with_theme(&config.theme)?);
    app.register(highlighter).register(Collapse);

    let ctx = PageContext {
        site_title: &config.title,
        highlighter: &highlighter,
    };

    let mut pages = 0usize;
    for article in articles {
        let mut doc = html::article_page(&ctx, article, articles);
        let attached = app.connect(&mut doc);
        debug!(url = %article.url, controllers = attached.len(), "article page connected");
        write_page(out, &article.url, &doc)?;
        pages += 1;
    }

    let tags = html::tag_groups(articles);
    for (slug, names) in &tags {
        let mut doc = html::tag_page(&ctx, names, articles);
        app.connect(&mut doc);
        write_page(out, &format!("/tags/{slug}.html"), &doc)?;
        pages += 1;
    }

    let mut index = html::index_page(&ctx, articles);
    app.connect(&mut index);
    write_page(out, "/index.html", &index)?;
    pages += 1;

    let stylesheet = format!("{}\n{}", web_assets::CSS, app.engine().stylesheet());
    write_file(&out.join(STYLESHEET_URL.trim_start_matches('/')), &stylesheet)?;

    if config.static_dir.is_dir() {
        let copied = copy_dir(&config.static_dir, out)?;
        debug!(dir = %config.static_dir.display(), files = copied, "static files copied");
    }

    let report = BuildReport {
        articles: articles.len(),
        tags: tags.len(),
        pages,
        code_blocks: app.engine().highlighted(),
        output_dir: out.clone(),
    };
    info!(
        articles = report.articles,
        tags = report.tags,
        pages = report.pages,
        code_blocks = report.code_blocks,
        out = %out.display(),
        "site built"
    );
    Ok(report)
}

fn write_page(out: &Path, url: &str, doc: &Document) -> Result<()> {
    write_file(&out.join(url.trim_start_matches('/')), &doc.to_html())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SiteError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| SiteError::io(path, e))
}

/// Recursively copy `src` into `dst`. Returns the number of files copied.
fn copy_dir(src: &Path, dst: &Path) -> Result<usize> {
    fs::create_dir_all(dst).map_err(|e| SiteError::io(dst, e))?;
    let mut copied = 0usize;
    for entry in fs::read_dir(src).map_err(|e| SiteError::io(src, e))? {
        let entry = entry.map_err(|e| SiteError::io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| SiteError::io(&from, e))?;
        if file_type.is_dir() {
            copied += copy_dir(&from, &to)?;
        } else if from.is_file() {
            fs::copy(&from, &to).map_err(|e| SiteError::io(&from, e))?;
            copied += 1;
        } else {
            // Symlinked directories are not followed.
            debug!(path = %from.display(), "skipping static entry");
        }
    }
    Ok(copied)
}
