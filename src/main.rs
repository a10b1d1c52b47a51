use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use blogsmith::config::SiteConfig;
use blogsmith::controllers::HighlightVariant;
use blogsmith::error::{Result, SiteError};
use blogsmith::{helpers, serve, site, Article, ArticleCollection, HtmlLinkRenderer};

/// Environment variable holding the log filter (e.g. `debug`, `blogsmith=trace`).
const LOG_ENV: &str = "BLOGSMITH_LOG";

#[derive(Clone, Copy, ValueEnum)]
enum HighlightArg {
    /// Highlight every code block as Ruby
    Ruby,
    /// Highlight Ruby and ERB blocks with separate grammars
    RubyErb,
}

impl From<HighlightArg> for HighlightVariant {
    fn from(arg: HighlightArg) -> Self {
        match arg {
            HighlightArg::Ruby => HighlightVariant::Ruby,
            HighlightArg::RubyErb => HighlightVariant::RubyErb,
        }
    }
}

/// Options shared by commands that read the site config.
#[derive(Args)]
struct SiteArgs {
    /// Path to the site config file (default: ./site.yml if present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory containing markdown articles
    #[arg(long)]
    source: Option<PathBuf>,
    /// Directory the built site is written to
    #[arg(long)]
    out: Option<PathBuf>,
    /// Grammar configuration for code highlighting
    #[arg(long, value_enum)]
    highlight: Option<HighlightArg>,
}

impl SiteArgs {
    /// Load the config file, then apply command-line overrides.
    fn resolve(self) -> Result<SiteConfig> {
        let mut config = SiteConfig::load(self.config.as_deref())?;
        if let Some(source) = self.source {
            config.content_dir = source;
        }
        if let Some(out) = self.out {
            config.output_dir = out;
        }
        if let Some(highlight) = self.highlight {
            config.highlight = highlight.into();
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render every article, tag page and the index into the output directory
    Build(SiteArgs),
    /// Build the site, then serve the output directory over HTTP
    Serve {
        #[command(flatten)]
        site: SiteArgs,
        /// Interface address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Starting port number for the HTTP server
        #[arg(long, default_value = "3333")]
        port: u16,
    },
    /// List the other articles sharing a tag with the given article
    Related {
        /// Title of the current article
        title: String,
        /// Tag to match
        #[arg(long)]
        tag: String,
        /// Print JSON instead of tab-separated lines
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        site: SiteArgs,
    },
}

#[derive(Parser)]
#[command(
    name = "blogsmith",
    version,
    about = "A static blog generator with build-time code highlighting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Build(args) => {
            let report = site::build_site(&args.resolve()?)?;
            println!(
                "built {} pages ({} articles, {} tags, {} code blocks) into {}",
                report.pages,
                report.articles,
                report.tags,
                report.code_blocks,
                report.output_dir.display()
            );
            Ok(())
        }
        Commands::Serve { site: args, bind, port } => {
            let config = args.resolve()?;
            let report = site::build_site(&config)?;
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| SiteError::Bind(e.to_string()))?;
            rt.block_on(serve::run_serve(report.output_dir, &bind, port))
        }
        Commands::Related {
            title,
            tag,
            json,
            site: args,
        } => {
            let config = args.resolve()?;
            let articles = ArticleCollection::load_dir(&config.content_dir)?;
            print_related(&articles, &title, &tag, json);
            Ok(())
        }
    }
}

/// The current article need not be part of the collection; only its title
/// is compared.
fn print_related(articles: &ArticleCollection, title: &str, tag: &str, json: bool) {
    let current = articles
        .find_by_title(title)
        .cloned()
        .unwrap_or_else(|| Article::new(title, ""));
    let related = helpers::other_articles(&current, tag, articles);

    if json {
        let items: Vec<serde_json::Value> = related
            .iter()
            .map(|a| {
                serde_json::json!({
                    "title": helpers::title(a),
                    "url": a.url,
                    "tags": a.tags,
                    "link": helpers::article_link(a, &HtmlLinkRenderer),
                })
            })
            .collect();
        println!("{}", serde_json::Value::Array(items));
    } else {
        for article in related {
            println!("{}\t{}", helpers::title(article), article.url);
        }
    }
}
