//! Operator commands for the Clyppy embed pipeline.
//!
//! Everything the bot does online has an offline counterpart here: URL
//! recognition, public-id derivation, a metadata probe with the admission
//! verdict it would produce, pending-queue inspection, and published-clip
//! lookups against the backing API.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use clyppy_api::ApiClient;
use clyppy_embedder::gate::{admission_for, Admission};
use clyppy_embedder::EmbedderConfig;
use clyppy_media::cookies::discover_firefox_profile;
use clyppy_media::{ProbeOptions, YtDlp};
use clyppy_models::limits::PUBLIC_URL_BASE;
use clyppy_models::{Clip, DeliveryStrategy, Service};
use clyppy_platforms::PlatformRegistry;
use clyppy_queue::TaskStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "Clyppy pipeline control interface", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Identify which platform claims a URL, without network traffic
    Recognize(UrlArgs),
    /// Resolve a URL to its canonical clip; share links are fetched
    Resolve(UrlArgs),
    /// Derive the public id for a platform clip
    Id(IdArgs),
    /// Probe media metadata and preview the admission verdict
    Probe(ProbeArgs),
    /// Pending-task file operations
    #[command(subcommand)]
    Queue(QueueCommands),
    /// Look up a published clip through the backing API
    Clip(ClipArgs),
}

#[derive(Args, Debug)]
pub struct UrlArgs {
    /// Video URL
    pub url: String,
}

#[derive(Args, Debug)]
pub struct IdArgs {
    /// Platform wire name (twitch, youtube, ...)
    pub service: String,
    /// Platform-native clip id
    pub source_id: String,
    /// Use the longer id issued to derivative clips
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Video URL
    pub url: String,
    /// Browser profile root for cookie-walled hosts
    #[arg(long)]
    pub cookies_root: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// List tasks waiting in the pending file
    Show(QueueArgs),
    /// Delete the pending file
    Clear(QueueArgs),
}

#[derive(Args, Debug)]
pub struct QueueArgs {
    /// Pending-task file; defaults to CLYPPY_QUEUE_PATH
    #[arg(long)]
    pub path: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ClipArgs {
    /// Public clip id
    pub clyppy_id: String,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Recognize(args) => render(&recognize(&args.url)?, cli.format),
        Commands::Resolve(args) => render(&resolve(&args.url).await?, cli.format),
        Commands::Id(args) => render(&derive_id(args)?, cli.format),
        Commands::Probe(args) => render(&probe(args).await?, cli.format),
        Commands::Queue(QueueCommands::Show(args)) => {
            render(&queue_show(queue_path(args)).await?, cli.format)
        }
        Commands::Queue(QueueCommands::Clear(args)) => {
            render(&queue_clear(queue_path(args)).await?, cli.format)
        }
        Commands::Clip(args) => render(&clip_status(&args.clyppy_id).await?, cli.format),
    }
}

fn recognize(url: &str) -> anyhow::Result<ClipReport> {
    let registry = PlatformRegistry::standard()?;
    let (platform, source_id) = registry
        .match_url(url)
        .context("no platform claims this URL")?;
    let clip = Clip::new(platform.service(), source_id, url.trim());
    Ok(ClipReport::new(&clip, platform.strategy()))
}

async fn resolve(url: &str) -> anyhow::Result<ClipReport> {
    let registry = PlatformRegistry::standard()?;
    let clip = registry
        .resolve(url)
        .await?
        .context("no platform claims this URL")?;
    let strategy = registry
        .by_service(clip.service)
        .map(|p| p.strategy())
        .unwrap_or(DeliveryStrategy::AttachOrReupload);
    Ok(ClipReport::new(&clip, strategy))
}

fn derive_id(args: &IdArgs) -> anyhow::Result<IdReport> {
    let service: Service = args.service.parse()?;
    let mut clip = Clip::new(service, args.source_id.as_str(), "");
    if args.extended {
        clip.regenerate_low_collision_id();
    }
    Ok(IdReport {
        platform: service.as_str().to_string(),
        source_id: args.source_id.clone(),
        clyppy_id: clip.clyppy_id,
    })
}

async fn probe(args: &ProbeArgs) -> anyhow::Result<ProbeReport> {
    let ytdlp = YtDlp::new()?;
    let cookies = match &args.cookies_root {
        Some(root) => discover_firefox_profile(root).await,
        None => None,
    };
    let opts = ProbeOptions::default().with_cookies(cookies);
    let media = ytdlp.probe(&args.url, &opts).await?;

    let duration_secs = media.duration_secs().map(|d| d.round() as u32);
    let admission = admission_for(duration_secs.unwrap_or(0), false, &EmbedderConfig::default());

    Ok(ProbeReport {
        url: args.url.clone(),
        title: media.title.clone(),
        uploader: media.uploader.clone(),
        duration_secs,
        width: media.width,
        height: media.height,
        filesize: media.filesize,
        is_hls: media.is_hls(),
        has_direct_url: media.format_url.is_some(),
        extractor: media.extractor.clone(),
        admission: admission_label(admission, duration_secs.is_none()),
    })
}

fn queue_path(args: &QueueArgs) -> PathBuf {
    args.path.clone().unwrap_or_else(|| {
        std::env::var("CLYPPY_QUEUE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| EmbedderConfig::default().queue_path)
    })
}

async fn queue_show(path: PathBuf) -> anyhow::Result<QueueReport> {
    let pending = TaskStore::new(&path).peek().await?;
    let quickembeds = pending
        .quickembeds
        .iter()
        .map(|t| QueueRow {
            url: t.url.clone(),
            channel_id: t.channel_id,
            user_id: t.author_id,
            user_name: t.author_name.clone(),
            created_at: t.created_at.to_rfc3339(),
        })
        .collect();
    let slash_commands = pending
        .slash_commands
        .iter()
        .map(|t| QueueRow {
            url: t.url.clone(),
            channel_id: t.channel_id,
            user_id: t.user_id,
            user_name: t.user_name.clone(),
            created_at: t.created_at.to_rfc3339(),
        })
        .collect();
    Ok(QueueReport {
        path: path.display().to_string(),
        quickembeds,
        slash_commands,
    })
}

async fn queue_clear(path: PathBuf) -> anyhow::Result<QueueClearReport> {
    let pending = TaskStore::new(&path).peek().await?;
    let removed = pending.len();
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(QueueClearReport {
        path: path.display().to_string(),
        removed,
    })
}

async fn clip_status(clyppy_id: &str) -> anyhow::Result<ClipStatusReport> {
    let api_url =
        std::env::var("CLYPPY_API_URL").unwrap_or_else(|_| PUBLIC_URL_BASE.to_string());
    let api_key = std::env::var("CLYPPY_API_KEY").context("CLYPPY_API_KEY is not set")?;
    let api = ApiClient::new(&api_url, &api_key)?;

    let Some(record) = api.get_clip(clyppy_id).await? else {
        return Ok(ClipStatusReport {
            clyppy_id: clyppy_id.to_string(),
            exists: false,
            title: None,
            duration_secs: None,
            filesize: None,
            is_redirect: false,
            expired: false,
            remote_url: None,
            expires_at: None,
        });
    };

    Ok(ClipStatusReport {
        clyppy_id: clyppy_id.to_string(),
        exists: true,
        title: record.title.clone(),
        duration_secs: record.duration,
        filesize: record.filesize,
        is_redirect: record.is_redirect,
        expired: record.is_expired(),
        remote_url: record.remote_url.clone(),
        expires_at: record.expires_at.map(|t| t.to_rfc3339()),
    })
}

fn admission_label(admission: Admission, unknown_duration: bool) -> String {
    if unknown_duration {
        return "unknown duration, would fall back to a capped download".to_string();
    }
    match admission {
        Admission::Free => "free".to_string(),
        Admission::Charge(tokens) => format!("{tokens} token(s)"),
        Admission::TooLong => "rejected: past the hard duration cap".to_string(),
    }
}

fn strategy_name(strategy: DeliveryStrategy) -> &'static str {
    match strategy {
        DeliveryStrategy::Redirect => "redirect",
        DeliveryStrategy::AttachOrReupload => "attach_or_reupload",
        DeliveryStrategy::AttachOnly => "attach_only",
        DeliveryStrategy::AlwaysReupload => "always_reupload",
    }
}

fn render<T>(value: &T, format: OutputFormat) -> anyhow::Result<()>
where
    T: Serialize + TextRender,
{
    match format {
        OutputFormat::Text => println!("{}", value.text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

trait TextRender {
    fn text(&self) -> String;
}

#[derive(Debug, Serialize)]
pub struct ClipReport {
    pub platform: String,
    pub source_id: String,
    pub source_url: String,
    pub clyppy_id: String,
    pub strategy: DeliveryStrategy,
    pub is_nsfw: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
    pub page_url: String,
}

impl ClipReport {
    fn new(clip: &Clip, strategy: DeliveryStrategy) -> Self {
        Self {
            platform: clip.service.as_str().to_string(),
            source_id: clip.source_id.clone(),
            source_url: clip.source_url.clone(),
            clyppy_id: clip.clyppy_id.clone(),
            strategy,
            is_nsfw: clip.is_nsfw,
            share_url: clip.share_url.clone(),
            page_url: clip.public_url(),
        }
    }
}

impl TextRender for ClipReport {
    fn text(&self) -> String {
        let mut lines = vec![
            format!("platform:  {}", self.platform),
            format!("source id: {}", self.source_id),
            format!("url:       {}", self.source_url),
            format!("clyppy id: {}", self.clyppy_id),
            format!("strategy:  {}", strategy_name(self.strategy)),
            format!("page:      {}", self.page_url),
        ];
        if self.is_nsfw {
            lines.push("nsfw:      yes".to_string());
        }
        if let Some(share) = &self.share_url {
            lines.push(format!("share:     {share}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct IdReport {
    pub platform: String,
    pub source_id: String,
    pub clyppy_id: String,
}

impl TextRender for IdReport {
    fn text(&self) -> String {
        self.clyppy_id.clone()
    }
}

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    pub duration_secs: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub filesize: Option<u64>,
    pub is_hls: bool,
    pub has_direct_url: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extractor: Option<String>,
    pub admission: String,
}

impl TextRender for ProbeReport {
    fn text(&self) -> String {
        let mut lines = Vec::new();
        if let Some(title) = &self.title {
            lines.push(format!("title:     {title}"));
        }
        if let Some(uploader) = &self.uploader {
            lines.push(format!("uploader:  {uploader}"));
        }
        lines.push(format!(
            "duration:  {}",
            self.duration_secs
                .map(|d| format!("{d}s"))
                .unwrap_or_else(|| "unknown".to_string())
        ));
        if let (Some(w), Some(h)) = (self.width, self.height) {
            lines.push(format!("size:      {w}x{h}"));
        }
        if let Some(bytes) = self.filesize {
            lines.push(format!("filesize:  {bytes} bytes"));
        }
        if self.is_hls {
            lines.push("format:    HLS playlist".to_string());
        } else if self.has_direct_url {
            lines.push("format:    direct URL".to_string());
        }
        if let Some(extractor) = &self.extractor {
            lines.push(format!("extractor: {extractor}"));
        }
        lines.push(format!("admission: {}", self.admission));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct QueueReport {
    pub path: String,
    pub quickembeds: Vec<QueueRow>,
    pub slash_commands: Vec<QueueRow>,
}

#[derive(Debug, Serialize)]
pub struct QueueRow {
    pub url: String,
    pub channel_id: u64,
    pub user_id: u64,
    pub user_name: String,
    pub created_at: String,
}

impl TextRender for QueueReport {
    fn text(&self) -> String {
        if self.quickembeds.is_empty() && self.slash_commands.is_empty() {
            return format!("{}: empty", self.path);
        }
        let mut lines = Vec::new();
        for row in &self.quickembeds {
            lines.push(format!(
                "quickembed | {} | channel={} user={} ({}) | {}",
                row.url, row.channel_id, row.user_id, row.user_name, row.created_at
            ));
        }
        for row in &self.slash_commands {
            lines.push(format!(
                "slash      | {} | channel={} user={} ({}) | {}",
                row.url, row.channel_id, row.user_id, row.user_name, row.created_at
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct QueueClearReport {
    pub path: String,
    pub removed: usize,
}

impl TextRender for QueueClearReport {
    fn text(&self) -> String {
        format!("removed {} pending task(s) from {}", self.removed, self.path)
    }
}

#[derive(Debug, Serialize)]
pub struct ClipStatusReport {
    pub clyppy_id: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub duration_secs: Option<u32>,
    pub filesize: Option<u64>,
    pub is_redirect: bool,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl TextRender for ClipStatusReport {
    fn text(&self) -> String {
        if !self.exists {
            return format!("{}: not published", self.clyppy_id);
        }
        let mut lines = vec![format!("{}: published", self.clyppy_id)];
        if let Some(title) = &self.title {
            lines.push(format!("title:    {title}"));
        }
        if let Some(duration) = self.duration_secs {
            lines.push(format!("duration: {duration}s"));
        }
        if let Some(bytes) = self.filesize {
            lines.push(format!("filesize: {bytes} bytes"));
        }
        if self.is_redirect {
            lines.push("delivery: redirect".to_string());
        }
        if let Some(expires) = &self.expires_at {
            let state = if self.expired { "expired" } else { "expires" };
            lines.push(format!("{state}:  {expires}"));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clyppy_models::{GuildContext, QuickembedTask, SlashCommandTask};
    use clyppy_queue::PendingTasks;
    use tempfile::TempDir;

    #[test]
    fn test_recognize_twitch_clip() {
        let report = recognize("https://clips.twitch.tv/FunnySlug-abc123").unwrap();
        assert_eq!(report.platform, "twitch");
        assert_eq!(report.source_id, "FunnySlug-abc123");
        assert_eq!(report.clyppy_id.len(), 8);
        assert_eq!(report.strategy, DeliveryStrategy::Redirect);
        assert!(!report.is_nsfw);
    }

    #[test]
    fn test_recognize_rejects_plain_text() {
        assert!(recognize("not a url").is_err());
    }

    #[test]
    fn test_id_matches_the_pipeline_derivation() {
        let report = derive_id(&IdArgs {
            service: "youtube".to_string(),
            source_id: "dQw4w9WgXcQ".to_string(),
            extended: false,
        })
        .unwrap();
        let clip = Clip::new(Service::YouTube, "dQw4w9WgXcQ", "");
        assert_eq!(report.clyppy_id, clip.clyppy_id);

        let extended = derive_id(&IdArgs {
            service: "youtube".to_string(),
            source_id: "dQw4w9WgXcQ".to_string(),
            extended: true,
        })
        .unwrap();
        assert_eq!(extended.clyppy_id.len(), 12);
        assert_ne!(extended.clyppy_id, report.clyppy_id);
    }

    #[test]
    fn test_unknown_service_name_rejected() {
        let result = derive_id(&IdArgs {
            service: "myspace".to_string(),
            source_id: "x".to_string(),
            extended: false,
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_queue_show_is_non_destructive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pending.clyq");
        let store = TaskStore::new(&path);

        let mut tasks = PendingTasks::new();
        tasks.push_quickembed(QuickembedTask::new(
            "https://clips.twitch.tv/One",
            1,
            2,
            3,
            "poster",
            GuildContext::guild(4, "G"),
        ));
        tasks.push_slash(SlashCommandTask::new(
            "https://youtu.be/abc",
            5,
            "tok",
            6,
            7,
            "caller",
            GuildContext::dm(),
        ));
        store.save(&tasks).await.unwrap();

        let report = queue_show(path.clone()).await.unwrap();
        assert_eq!(report.quickembeds.len(), 1);
        assert_eq!(report.slash_commands.len(), 1);
        assert_eq!(report.quickembeds[0].url, "https://clips.twitch.tv/One");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_queue_clear_removes_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pending.clyq");
        let store = TaskStore::new(&path);

        let mut tasks = PendingTasks::new();
        tasks.push_quickembed(QuickembedTask::new(
            "https://clips.twitch.tv/One",
            1,
            2,
            3,
            "poster",
            GuildContext::guild(4, "G"),
        ));
        store.save(&tasks).await.unwrap();

        let report = queue_clear(path.clone()).await.unwrap();
        assert_eq!(report.removed, 1);
        assert!(!path.exists());

        let again = queue_clear(path).await.unwrap();
        assert_eq!(again.removed, 0);
    }

    #[test]
    fn test_admission_labels() {
        assert_eq!(admission_label(Admission::Free, false), "free");
        assert_eq!(admission_label(Admission::Charge(2), false), "2 token(s)");
        assert!(admission_label(Admission::TooLong, false).starts_with("rejected"));
        assert!(admission_label(Admission::Free, true).contains("unknown duration"));
    }

    #[test]
    fn test_json_rendering_shape() {
        let report = recognize("https://youtu.be/dQw4w9WgXcQ").unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["platform"], "youtube");
        assert_eq!(json["strategy"], "attach_or_reupload");
    }
}
