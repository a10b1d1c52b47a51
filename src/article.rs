//! Content model: articles with YAML front matter and the ordered collection
//! the template helpers read from.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, SiteError};
use crate::html::slugify;

/// Optional per-article data carried in front matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArticleData {
    /// Overrides [`Article::title`] for display when present and non-empty.
    #[serde(default)]
    pub priority_title: Option<String>,
    /// Cover image URL.
    #[serde(default)]
    pub image: Option<String>,
    /// CSS `display` value applied to the cover image on attach.
    #[serde(default)]
    pub image_display: Option<String>,
}

/// A single blog article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    /// Root-relative URL of the rendered page, e.g. `/articles/intro.html`.
    pub url: String,
    pub slug: String,
    pub tags: BTreeSet<String>,
    pub data: ArticleData,
    /// Markdown body with the front matter stripped.
    pub body: String,
    /// Source file the article was loaded from. Empty for in-memory articles.
    pub source: PathBuf,
}

impl Article {
    /// Build an in-memory article. The slug is derived from the title.
    pub fn new(title: &str, url: &str) -> Self {
        Self {
            title: title.to_owned(),
            url: url.to_owned(),
            slug: slugify(title),
            tags: BTreeSet::new(),
            data: ArticleData::default(),
            body: String::new(),
            source: PathBuf::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority_title(mut self, priority_title: &str) -> Self {
        self.data.priority_title = Some(priority_title.to_owned());
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_owned();
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// `tags:` may be written as a YAML list or as a comma-separated string.
#[derive(Deserialize)]
#[serde(untagged)]
enum TagList {
    List(Vec<String>),
    Csv(String),
}

impl TagList {
    fn into_set(self) -> BTreeSet<String> {
        let raw = match self {
            TagList::List(list) => list,
            TagList::Csv(csv) => csv.split(',').map(str::to_owned).collect(),
        };
        raw.into_iter()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Deserialize)]
struct FrontMatter {
    title: String,
    #[serde(default)]
    tags: Option<TagList>,
    #[serde(flatten)]
    data: ArticleData,
}

/// Split `source` into `(yaml, body)` when it opens with a `---` front matter
/// block. Returns `None` when the block is missing or never closed.
pub fn split_front_matter(source: &str) -> Option<(&str, &str)> {
    let rest = source.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0usize;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Parse one article from its markdown source.
pub fn parse_article(path: &Path, source: &str) -> Result<Article> {
    let (yaml, body) =
        split_front_matter(source).ok_or_else(|| SiteError::MissingFrontMatter(path.into()))?;
    let fm: FrontMatter = serde_yml::from_str(yaml).map_err(|source| SiteError::FrontMatter {
        path: path.into(),
        source,
    })?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(fm.title.as_str());
    let mut slug = slugify(stem);
    if slug.is_empty() {
        slug = slugify(&fm.title);
    }
    if slug.is_empty() {
        return Err(SiteError::EmptySlug(path.into()));
    }

    Ok(Article {
        url: format!("/articles/{slug}.html"),
        slug,
        title: fm.title,
        tags: fm.tags.map(TagList::into_set).unwrap_or_default(),
        data: fm.data,
        body: body.to_owned(),
        source: path.to_path_buf(),
    })
}

/// Ordered, read-only sequence of articles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleCollection {
    articles: Vec<Article>,
}

impl ArticleCollection {
    pub fn new(articles: Vec<Article>) -> Self {
        Self { articles }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Article> {
        self.articles.iter()
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// Articles matching `pred`, in collection order.
    pub fn filter<P>(&self, mut pred: P) -> Vec<&Article>
    where
        P: FnMut(&Article) -> bool,
    {
        self.articles.iter().filter(|a| pred(a)).collect()
    }

    /// Every article carrying `tag`.
    pub fn tagged(&self, tag: &str) -> Vec<&Article> {
        self.filter(|a| a.has_tag(tag))
    }

    pub fn find_by_title(&self, title: &str) -> Option<&Article> {
        self.articles.iter().find(|a| a.title == title)
    }

    pub fn find_by_slug(&self, slug: &str) -> Option<&Article> {
        self.articles.iter().find(|a| a.slug == slug)
    }

    /// The union of all tags, sorted.
    pub fn tags(&self) -> BTreeSet<&str> {
        self.articles
            .iter()
            .flat_map(|a| a.tags.iter().map(String::as_str))
            .collect()
    }

    /// Load every markdown article under `dir`.
    ///
    /// Recurses into subdirectories except `.git`, `node_modules` and hidden
    /// directories. Directory symlinks are not followed. Only `.md` /
    /// `.markdown` files are read, and the result is ordered by source path.
    /// Two files with the same slug are rejected.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = Vec::new();
        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        queue.push_back(dir.to_path_buf());

        while let Some(current) = queue.pop_front() {
            let entries = fs::read_dir(&current).map_err(|e| SiteError::io(&current, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| SiteError::io(&current, e))?;
                let path = entry.path();
                let name = entry.file_name();
                let name = name.to_string_lossy();

                let file_type = entry.file_type().map_err(|e| SiteError::io(&path, e))?;
                if file_type.is_dir() {
                    if name.starts_with('.') || name == "node_modules" {
                        debug!(path = %path.display(), "skipping directory");
                        continue;
                    }
                    queue.push_back(path);
                } else if is_markdown(&path) && path.is_file() {
                    files.push(path);
                } else if file_type.is_symlink() && path.is_dir() {
                    debug!(path = %path.display(), "not following directory symlink");
                }
            }
        }
        files.sort();

        let mut articles = Vec::with_capacity(files.len());
        let mut seen: HashMap<String, PathBuf> = HashMap::new();
        for path in files {
            let source = fs::read_to_string(&path).map_err(|e| SiteError::io(&path, e))?;
            let article = parse_article(&path, &source)?;
            if let Some(first) = seen.insert(article.slug.clone(), path.clone()) {
                return Err(SiteError::DuplicateSlug {
                    slug: article.slug,
                    first,
                    second: path,
                });
            }
            debug!(path = %path.display(), slug = %article.slug, tags = article.tags.len(), "loaded article");
            articles.push(article);
        }

        info!(dir = %dir.display(), articles = articles.len(), "content loaded");
        Ok(Self::new(articles))
    }
}

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("markdown")
    )
}

impl FromIterator<Article> for ArticleCollection {
    fn from_iter<I: IntoIterator<Item = Article>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ArticleCollection {
    type Item = &'a Article;
    type IntoIter = std::slice::Iter<'a, Article>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
