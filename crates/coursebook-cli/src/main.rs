use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use coursebook_config::{Config, SyncConfig};
use coursebook_engine::{
    Block, CachedChapterStore, ChapterId, ChapterStore, DefaultHtmlRenderer, EditorSession,
    EmbedProvider, EmbedUrl, FileChapterStore, RetryPolicy, SaveStatus, StoreError, SyncSettings,
    blocks_to_html, blocks_to_markdown, extract_src_from_iframe, markdown_to_blocks,
    render_snapshot,
};

#[derive(Parser)]
#[command(name = "coursebook", version, about = "Inspect and edit course chapters")]
struct Cli {
    /// Data directory (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a chapter's rich text as HTML
    Render { chapter: String },

    /// Print a chapter as Markdown
    Markdown { chapter: String },

    /// Replace a chapter's content with blocks parsed from a Markdown file
    Import { chapter: String, file: PathBuf },

    /// Check whether a URL is an accepted embed URL
    CheckEmbed {
        url: String,

        /// Provider name; detected from the URL when omitted
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Print the src attribute of iframe code (read from stdin when omitted)
    ExtractSrc { code: Option<String> },

    /// Append a paragraph to a chapter through an editor session
    Append { chapter: String, text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let config = Config::load_or_default().with_context(|| {
        format!(
            "Failed to load config file at {}",
            Config::config_path().display()
        )
    })?;
    let data_dir = cli.data_dir.clone().unwrap_or(config.data_dir.clone());
    log::debug!("Using data directory {}", data_dir.display());

    match cli.command {
        Command::Render { chapter } => {
            let chapter = FileChapterStore::new(&data_dir)
                .get(&ChapterId::from(chapter))
                .await?;
            println!("{}", blocks_to_html(&chapter.blocks));
        }
        Command::Markdown { chapter } => {
            let chapter = FileChapterStore::new(&data_dir)
                .get(&ChapterId::from(chapter))
                .await?;
            print!("{}", blocks_to_markdown(&chapter.blocks));
        }
        Command::Import { chapter, file } => {
            let markdown = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let chapter_id = ChapterId::from(chapter);
            let snapshot = render_snapshot(
                Arc::new(DefaultHtmlRenderer),
                chapter_id.clone(),
                markdown_to_blocks(&markdown),
            )
            .await;
            let saved = FileChapterStore::new(&data_dir)
                .save(&chapter_id, snapshot.blocks)
                .await?;
            log::info!("Imported {} blocks into chapter {chapter_id}", saved.blocks.len());
        }
        Command::CheckEmbed { url, provider } => check_embed(&url, provider.as_deref())?,
        Command::ExtractSrc { code } => {
            let code = match code {
                Some(code) => code,
                None => {
                    let mut code = String::new();
                    std::io::stdin().read_to_string(&mut code)?;
                    code
                }
            };
            match extract_src_from_iframe(&code) {
                Some(src) => println!("{src}"),
                None => bail!("No src attribute found"),
            }
        }
        Command::Append { chapter, text } => {
            append(data_dir, &config.sync, ChapterId::from(chapter), text).await?;
        }
    }

    Ok(())
}

fn check_embed(url: &str, provider: Option<&str>) -> Result<()> {
    let provider = match provider {
        Some(name) => EmbedProvider::from_name(name)
            .with_context(|| format!("Unknown embed provider '{name}'"))?,
        None => EmbedProvider::detect(url)
            .with_context(|| format!("'{url}' is not a recognised embed URL"))?,
    };
    let embed = EmbedUrl::parse(provider, url)?;
    println!("{provider}: {embed}");
    Ok(())
}

fn sync_settings(config: &SyncConfig) -> SyncSettings {
    SyncSettings {
        debounce: Duration::from_millis(config.debounce_ms),
        retry: RetryPolicy {
            max_attempts: config.retry.max_attempts,
            initial_backoff: Duration::from_millis(config.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.retry.max_backoff_ms),
            ..RetryPolicy::default()
        },
    }
}

async fn append(
    data_dir: PathBuf,
    config: &SyncConfig,
    chapter_id: ChapterId,
    text: String,
) -> Result<()> {
    let store = Arc::new(CachedChapterStore::new(FileChapterStore::new(data_dir)));
    match store.create(&chapter_id).await {
        Ok(_) => log::info!("Created chapter {chapter_id}"),
        Err(StoreError::AlreadyExists(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let session = EditorSession::spawn(
        store,
        Arc::new(DefaultHtmlRenderer),
        sync_settings(config),
    );
    session.open_chapter(chapter_id.clone())?;
    let status = session
        .wait_for(|status| matches!(status, SaveStatus::Saved | SaveStatus::LoadFailed))
        .await?;
    if status == SaveStatus::LoadFailed {
        bail!("Failed to load chapter {chapter_id}");
    }

    let mut blocks = session.document().await?.blocks;
    blocks.push(Block::paragraph(text));
    session.content_changed(blocks)?;

    match session.close().await? {
        SaveStatus::Saved => {
            log::info!("Saved chapter {chapter_id}");
            Ok(())
        }
        status => bail!("Chapter {chapter_id} was not saved ({status:?})"),
    }
}
