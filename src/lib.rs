//! Static blog generator: template helpers for titles, links and related
//! articles, plus build-time controllers that highlight code blocks and set
//! cover-image visibility.

pub mod article;
pub mod config;
pub mod controllers;
pub mod dom;
pub mod error;
pub mod helpers;
pub mod highlight;
pub mod html;
pub mod serve;
pub mod site;
pub mod web_assets;

pub use article::{Article, ArticleCollection, ArticleData};
pub use error::{Result, SiteError};
pub use helpers::{article_link, other_articles, title, HtmlLinkRenderer, LinkRenderer};
