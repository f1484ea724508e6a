//! The embed pipeline controller.
//!
//! Two entry points feed the shared pipeline tail: [`Embedder::handle_message`]
//! for reactive quickembeds and [`Embedder::handle_embed_command`] for the
//! `/embed` slash command. The tail resolves the clip, admits it through the
//! token gate, picks a delivery path, publishes the interaction row and sends
//! exactly one reply. Failures are reported to the user and to the backing
//! API, and any charge is refunded.

use std::mem;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use clyppy_api::{ApiClient, ClipRecord};
use clyppy_media::cookies::discover_firefox_profile;
use clyppy_media::fs_utils::remove_quiet;
use clyppy_media::thumbnail::extract_first_frame;
use clyppy_media::{
    probe_file, CookieSource, MediaError, ProbeOptions, ProbedMedia, ShardLock, ShardLockConfig,
    YtDlp,
};
use clyppy_models::limits::{
    API_TIMEOUT, DEFAULT_DOWNLOAD_TIMEOUT, DOWNLOAD_MAX_FILESIZE_BYTES, MAX_EMBEDS_PER_USER,
};
use clyppy_models::{
    Clip, DeliveryStrategy, DownloadResponse, EmbedErrorKind, ErrorReport, ExtendModel,
    GuildContext, InteractionEdit, InteractionPublish, QuickembedTask, Service, SlashCommandTask,
};
use clyppy_platforms::{Platform, PlatformRegistry, DISCORDBOT_USER_AGENT};
use clyppy_queue::{PendingTasks, TaskStore};
use clyppy_storage::CdnClient;

use crate::config::EmbedderConfig;
use crate::downloads::{fetch_clip_media, DownloadManager};
use crate::error::{EmbedError, EmbedResult};
use crate::extension::extend_video;
use crate::gate::{
    admission_for, charge_embed, charge_extension, refund_tokens, Admission, ChargeState,
};
use crate::gateway::{standard_buttons, ChannelPermissions, Gateway, Reply};
use crate::selector::{probes_before_admission, resolve_delivery, Delivery};
use crate::settings::GuildSettings;
use crate::shutdown::{drain_inflight, ShutdownFlag};
use crate::state::InflightSets;
use crate::webhook::WebhookEditor;

/// Every service the pipeline touches, wired once at startup and shared
/// behind an `Arc` by all handlers.
pub struct EmbedContext {
    pub config: EmbedderConfig,
    pub registry: PlatformRegistry,
    pub ytdlp: YtDlp,
    pub cdn: CdnClient,
    pub api: ApiClient,
    pub shard: ShardLock,
    pub downloads: DownloadManager,
    pub inflight: InflightSets,
    pub store: TaskStore,
    pub webhook: WebhookEditor,
    pub gateway: Arc<dyn Gateway>,
    pub settings: Arc<dyn GuildSettings>,
    pub shutdown: ShutdownFlag,
    /// No-redirect client for mirror `HEAD`/`GET` fetches. Redirects are read
    /// from the `Location` header, never followed blindly.
    pub mirror_http: reqwest::Client,
    pending: Mutex<PendingTasks>,
}

impl EmbedContext {
    /// Wire up the pipeline services from one config.
    pub fn new(
        config: EmbedderConfig,
        gateway: Arc<dyn Gateway>,
        settings: Arc<dyn GuildSettings>,
        shutdown: ShutdownFlag,
    ) -> EmbedResult<Self> {
        let registry = PlatformRegistry::standard()?;
        let ytdlp = YtDlp::new()?;
        let cdn = CdnClient::from_env()?;
        let api = ApiClient::new(&config.api_url, &config.api_key)?;

        let mut shard_config = ShardLockConfig::default();
        if let Some(dir) = &config.shard_lock_dir {
            shard_config.dir = dir.clone();
        }
        let shard = ShardLock::new(shard_config);

        let downloads = DownloadManager::new(config.max_downloads, &config.work_dir);
        let store = TaskStore::new(&config.queue_path);
        let webhook = WebhookEditor::new(config.test_mode)?;

        let mirror_http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(DISCORDBOT_USER_AGENT)
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| EmbedError::internal(format!("mirror client: {e}")))?;

        Ok(Self {
            config,
            registry,
            ytdlp,
            cdn,
            api,
            shard,
            downloads,
            inflight: InflightSets::new(),
            store,
            webhook,
            gateway,
            settings,
            shutdown,
            mirror_http,
            pending: Mutex::new(PendingTasks::new()),
        })
    }

    /// Delivery hint for a service, from the platform roster.
    pub fn strategy_for(&self, service: Service) -> DeliveryStrategy {
        self.registry
            .by_service(service)
            .map(|p| p.strategy())
            .unwrap_or(DeliveryStrategy::AttachOrReupload)
    }

    /// Cookie source for login-walled platforms, when a profile root is
    /// configured and holds a usable profile.
    pub async fn cookies_for(&self, service: Service) -> Option<CookieSource> {
        let needs = self
            .registry
            .by_service(service)
            .is_some_and(|p| p.needs_cookies());
        if !needs {
            return None;
        }
        let root = self.config.cookies_root.as_ref()?;
        discover_firefox_profile(root).await
    }

    fn download_timeout_for(&self, service: Service) -> Duration {
        self.registry
            .by_service(service)
            .map(|p| p.download_timeout())
            .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT)
    }

    fn pending_lock(&self) -> MutexGuard<'_, PendingTasks> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Defer a quickembed into the restart queue.
    pub fn queue_quickembed(&self, task: QuickembedTask) {
        self.pending_lock().push_quickembed(task);
    }

    /// Defer a slash command into the restart queue.
    pub fn queue_slash(&self, task: SlashCommandTask) {
        self.pending_lock().push_slash(task);
    }

    /// Drain the deferred-task lists for persistence.
    pub fn take_pending(&self) -> PendingTasks {
        mem::take(&mut *self.pending_lock())
    }

    pub fn pending_len(&self) -> usize {
        self.pending_lock().len()
    }
}

/// A gateway message event, as the hosting adapter hands it over.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub guild: GuildContext,
    pub content: String,
    pub in_thread: bool,
    /// True when the message was sent by this bot.
    pub is_own: bool,
}

/// A deferred `/embed` interaction.
#[derive(Debug, Clone)]
pub struct EmbedCommand {
    pub url: String,
    pub application_id: u64,
    pub interaction_token: String,
    pub channel_id: u64,
    pub user_id: u64,
    pub user_name: String,
    pub guild: GuildContext,
    pub extend_with: Option<ExtendModel>,
}

/// Where the pipeline's one reply goes.
#[derive(Debug, Clone)]
pub enum ReplyTarget {
    /// Reply to the triggering message, with an @mention channel send as the
    /// fallback when the message is gone.
    Message {
        channel_id: u64,
        message_id: u64,
        author_id: u64,
    },
    /// Edit the deferred interaction response through the gateway.
    Interaction {
        application_id: u64,
        token: String,
        channel_id: u64,
    },
    /// Edit the original deferred response over the webhook endpoint. Used by
    /// replay, where the live interaction handle is gone. Text only.
    Webhook {
        application_id: u64,
        token: String,
        channel_id: u64,
    },
}

impl ReplyTarget {
    fn channel_id(&self) -> u64 {
        match self {
            ReplyTarget::Message { channel_id, .. }
            | ReplyTarget::Interaction { channel_id, .. }
            | ReplyTarget::Webhook { channel_id, .. } => *channel_id,
        }
    }
}

/// The pipeline controller. Cheap to clone; handlers run concurrently over
/// one shared [`EmbedContext`].
#[derive(Clone)]
pub struct Embedder {
    ctx: Arc<EmbedContext>,
}

impl Embedder {
    pub fn new(ctx: EmbedContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &EmbedContext {
        &self.ctx
    }

    /// Reactive entry point: scan a message for embeddable URLs and run the
    /// pipeline once per recognized link.
    pub async fn handle_message(&self, event: MessageEvent) {
        if event.is_own {
            return;
        }

        let urls: Vec<(String, Arc<dyn Platform>)> = event
            .content
            .split_whitespace()
            .filter_map(|word| {
                self.ctx
                    .registry
                    .match_url(word)
                    .map(|(platform, _)| (word.to_string(), platform))
            })
            .collect();
        if urls.is_empty() {
            return;
        }

        let perms = match self.ctx.gateway.channel_permissions(event.channel_id).await {
            Ok(perms) => perms,
            Err(e) => {
                warn!(channel_id = event.channel_id, error = %e, "permission lookup failed");
                return;
            }
        };
        if !perms.can_reply(event.in_thread) {
            debug!(
                channel_id = event.channel_id,
                "missing reply permissions, skipping"
            );
            return;
        }

        for (url, platform) in urls {
            self.embed_from_message(&event, &url, &platform, perms).await;
        }
    }

    /// One quickembed: settings gate, resolve, NSFW check, dedupe, pipeline.
    async fn embed_from_message(
        &self,
        event: &MessageEvent,
        url: &str,
        platform: &Arc<dyn Platform>,
        perms: ChannelPermissions,
    ) {
        let ctx = &self.ctx;
        let service = platform.service();

        let enabled = match ctx
            .settings
            .is_platform_quickembed_enabled(event.guild.api_id(), event.channel_id, service.as_str())
            .await
        {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!(guild_id = event.guild.id, error = %e, "settings lookup failed, assuming enabled");
                true
            }
        };
        if !enabled {
            debug!(
                guild_id = event.guild.id,
                platform = %service,
                "quickembeds disabled here"
            );
            return;
        }

        let clip = match ctx.registry.resolve(url).await {
            Ok(Some(clip)) => clip,
            Ok(None) => return,
            Err(e) => {
                let target = ReplyTarget::Message {
                    channel_id: event.channel_id,
                    message_id: event.message_id,
                    author_id: event.author_id,
                };
                self.report_failure(
                    &target,
                    EmbedError::from(e),
                    url,
                    service.as_str(),
                    event.author_id,
                    &event.author_name,
                    &ChargeState::new(),
                )
                .await;
                return;
            }
        };

        if clip.is_nsfw {
            let nsfw_ok = ctx
                .gateway
                .is_nsfw_channel(event.channel_id)
                .await
                .unwrap_or(false);
            if !nsfw_ok {
                debug!(
                    clip_id = %clip.clyppy_id,
                    channel_id = event.channel_id,
                    "nsfw clip outside an age-restricted channel, skipping"
                );
                return;
            }
        }

        if ctx.shutdown.is_shutting_down() {
            info!(clip_id = %clip.clyppy_id, "shutting down, deferring quickembed");
            ctx.queue_quickembed(QuickembedTask::new(
                url,
                event.channel_id,
                event.message_id,
                event.author_id,
                event.author_name.clone(),
                event.guild.clone(),
            ));
            return;
        }

        // One active handler per source id on this host. A repost while the
        // first embed runs waits for it, then reuses the published row.
        if ctx.inflight.is_embedding(&clip.source_id) {
            debug!(source_id = %clip.source_id, "duplicate url, waiting for the active embed");
            if !ctx.inflight.wait_for_embedding_clear(&clip.source_id).await {
                warn!(source_id = %clip.source_id, "active embed never cleared, dropping duplicate");
                return;
            }
        }

        let target = ReplyTarget::Message {
            channel_id: event.channel_id,
            message_id: event.message_id,
            author_id: event.author_id,
        };
        self.run_pipeline(
            clip,
            target,
            event.author_id,
            &event.author_name,
            &event.guild,
            perms.attach_files,
            None,
            None,
        )
        .await;
    }

    /// Slash-command entry point. The interaction is already deferred; every
    /// outcome lands as an edit of the deferred response.
    pub async fn handle_embed_command(&self, command: EmbedCommand) {
        let ctx = &self.ctx;

        if ctx.inflight.user_at_cap(command.user_id) {
            let text = format!(
                "You already have {MAX_EMBEDS_PER_USER} embeds running. Please wait for one to finish."
            );
            self.edit_interaction(&command, &text).await;
            return;
        }

        if ctx.shutdown.is_shutting_down() {
            info!(user_id = command.user_id, "shutting down, deferring slash command");
            let mut task = SlashCommandTask::new(
                &command.url,
                command.application_id,
                &command.interaction_token,
                command.channel_id,
                command.user_id,
                &command.user_name,
                command.guild.clone(),
            );
            if let Some(model) = command.extend_with {
                task = task.with_extend(model);
            }
            ctx.queue_slash(task);
            return;
        }

        let clip = match ctx.registry.resolve(&command.url).await {
            Ok(Some(clip)) => clip,
            Ok(None) => {
                self.edit_interaction(&command, &EmbedErrorKind::Unsupported.user_reply())
                    .await;
                return;
            }
            Err(e) => {
                let service = ctx
                    .registry
                    .match_url(&command.url)
                    .map(|(p, _)| p.service().as_str())
                    .unwrap_or("unknown");
                self.report_failure(
                    &self.interaction_target(&command),
                    EmbedError::from(e),
                    &command.url,
                    service,
                    command.user_id,
                    &command.user_name,
                    &ChargeState::new(),
                )
                .await;
                return;
            }
        };

        // Attach permission is the only channel bit that matters here; the
        // reply itself rides the interaction token.
        let can_attach = match ctx.gateway.channel_permissions(command.channel_id).await {
            Ok(perms) => perms.attach_files,
            Err(e) => {
                warn!(channel_id = command.channel_id, error = %e, "permission lookup failed");
                false
            }
        };

        if ctx.inflight.is_embedding(&clip.source_id) {
            debug!(source_id = %clip.source_id, "duplicate url, waiting for the active embed");
            if !ctx.inflight.wait_for_embedding_clear(&clip.source_id).await {
                self.edit_interaction(
                    &command,
                    "That clip is still being processed from an earlier request. Please try again in a moment.",
                )
                .await;
                return;
            }
        }

        let timeout = ctx.download_timeout_for(clip.service);
        let target = self.interaction_target(&command);

        ctx.inflight.begin_user(command.user_id);
        self.run_pipeline(
            clip,
            target,
            command.user_id,
            &command.user_name,
            &command.guild,
            can_attach,
            command.extend_with,
            Some(timeout),
        )
        .await;
        ctx.inflight.end_user(command.user_id);
    }

    /// Shared pipeline tail.
    ///
    /// The charge state lives outside the timeout race so a cancelled task
    /// still refunds whatever it charged. In-flight bookkeeping brackets the
    /// race for the same reason.
    #[allow(clippy::too_many_arguments)]
    async fn run_pipeline(
        &self,
        clip: Clip,
        target: ReplyTarget,
        user_id: u64,
        user_name: &str,
        guild: &GuildContext,
        can_attach: bool,
        extend_with: Option<ExtendModel>,
        race_timeout: Option<Duration>,
    ) {
        let ctx = &self.ctx;
        let source_id = clip.source_id.clone();
        let source_url = clip.source_url.clone();
        let service = clip.service;
        let started = Instant::now();
        let charge = Arc::new(ChargeState::new());

        ctx.inflight.begin_embedding(&source_id);

        let outcome = match race_timeout {
            Some(limit) => {
                tokio::select! {
                    result = self.process_clip(
                        clip, &target, user_id, user_name, guild, can_attach, extend_with, &charge, started,
                    ) => result,
                    _ = tokio::time::sleep(limit) => Err(EmbedError::terminal(
                        EmbedErrorKind::Unknown,
                        format!("embed timed out after {}s", limit.as_secs()),
                    )),
                }
            }
            None => {
                self.process_clip(
                    clip, &target, user_id, user_name, guild, can_attach, extend_with, &charge, started,
                )
                .await
            }
        };

        ctx.inflight.end_embedding(&source_id);

        if let Err(error) = outcome {
            self.report_failure(
                &target,
                error,
                &source_url,
                service.as_str(),
                user_id,
                user_name,
                &charge,
            )
            .await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_clip(
        &self,
        mut clip: Clip,
        target: &ReplyTarget,
        user_id: u64,
        user_name: &str,
        guild: &GuildContext,
        can_attach: bool,
        extend_with: Option<ExtendModel>,
        charge: &ChargeState,
        started: Instant,
    ) -> EmbedResult<()> {
        let ctx = &self.ctx;

        let in_dl_server = matches!(
            (ctx.config.dl_server_id, guild.api_id()),
            (Some(a), Some(b)) if a == b
        );

        // Webhook posts in the dl-server are archived, not embedded.
        if in_dl_server && ctx.config.dl_webhook_id == Some(user_id) {
            return self
                .archive_clip(clip, target, user_id, user_name, guild, started)
                .await;
        }

        // Reuse the stored row when the clip is already published, unless the
        // caller wants a fresh AI-extended derivative.
        if extend_with.is_none() {
            let record = match ctx.api.get_clip(&clip.clyppy_id).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(clip_id = %clip.clyppy_id, error = %e, "clip lookup failed, resolving fresh");
                    None
                }
            };
            if let Some(record) = record.filter(|r| !r.is_expired()) {
                if let Some(response) = response_from_record(&record) {
                    info!(clip_id = %clip.clyppy_id, "reusing stored clip");
                    clip.uses_redirect = response.is_redirect;
                    clip.duration_secs = response.duration_secs;
                    self.admit_clip(&mut clip, in_dl_server, user_id, charge)
                        .await?;
                    return self
                        .publish_and_reply(
                            clip,
                            Delivery::remote(response),
                            None,
                            target,
                            user_id,
                            user_name,
                            guild,
                            started,
                        )
                        .await;
                }
            }
        }

        let needs_probe = probes_before_admission(clip.service);
        let mut probe = None;
        let mut predownloaded: Option<PathBuf> = None;

        if needs_probe {
            probe = self.probe_with_cookie_retry(&clip).await?;
        }

        let mut duration = probe
            .as_ref()
            .and_then(|p| p.duration_secs())
            .map(|d| d.round() as u32)
            .unwrap_or(0);

        // No usable duration from the probe. Fall back to a capped download
        // and read the duration off the file; the file is kept for delivery.
        if needs_probe && duration == 0 {
            let path = fetch_clip_media(ctx, &clip, Some(DOWNLOAD_MAX_FILESIZE_BYTES)).await?;
            let local = probe_file(&path).await?;
            duration = local
                .duration_secs()
                .map(|d| d.round() as u32)
                .unwrap_or(0);
            if duration == 0 {
                remove_quiet(&path).await;
                return Err(EmbedError::from(EmbedErrorKind::DefinitelyNoDuration));
            }
            predownloaded = Some(path);
        }

        clip.duration_secs = duration;
        self.admit_clip(&mut clip, in_dl_server, user_id, charge)
            .await?;

        if extend_with.is_some() {
            charge_extension(&ctx.api, user_id, charge).await?;
        }

        let mut delivery =
            resolve_delivery(ctx, &mut clip, probe.as_ref(), can_attach, predownloaded).await?;

        if let Some(model) = extend_with {
            delivery = self
                .extend_delivery(&mut clip, delivery, model, can_attach)
                .await?;
        }

        let thumbnail = self.make_thumbnail(&clip, &delivery, probe.as_ref()).await?;
        self.publish_and_reply(
            clip, delivery, thumbnail, target, user_id, user_name, guild, started,
        )
        .await
    }

    /// Probe, retrying once with browser cookies when the plain attempt
    /// fails and the platform has a cookie source.
    async fn probe_with_cookie_retry(&self, clip: &Clip) -> EmbedResult<Option<ProbedMedia>> {
        let ctx = &self.ctx;
        match ctx.ytdlp.probe(&clip.source_url, &ProbeOptions::default()).await {
            Ok(probe) => Ok(Some(probe)),
            Err(first) => {
                if let Some(cookies) = ctx.cookies_for(clip.service).await {
                    debug!(clip_id = %clip.clyppy_id, "probe failed, retrying with cookies");
                    let opts = ProbeOptions::default().with_cookies(Some(cookies));
                    match ctx.ytdlp.probe(&clip.source_url, &opts).await {
                        Ok(probe) => return Ok(Some(probe)),
                        Err(second) => return probe_error_to_fallback(second),
                    }
                }
                probe_error_to_fallback(first)
            }
        }
    }

    /// Gate the clip by duration, charging past the free tier.
    async fn admit_clip(
        &self,
        clip: &mut Clip,
        in_dl_server: bool,
        user_id: u64,
        charge: &ChargeState,
    ) -> EmbedResult<()> {
        match admission_for(clip.duration_secs, in_dl_server, &self.ctx.config) {
            Admission::Free => Ok(()),
            Admission::TooLong => Err(EmbedError::from(EmbedErrorKind::VideoTooLong)),
            Admission::Charge(cost) => {
                charge_embed(&self.ctx.api, user_id, cost, charge).await?;
                clip.tokens_used = cost;
                Ok(())
            }
        }
    }

    /// Replace the resolved delivery with an AI-extended derivative.
    async fn extend_delivery(
        &self,
        clip: &mut Clip,
        delivery: Delivery,
        model: ExtendModel,
        can_attach: bool,
    ) -> EmbedResult<Delivery> {
        let ctx = &self.ctx;

        let input = match delivery.local_artifact {
            Some(path) => path,
            None => fetch_clip_media(ctx, clip, None).await?,
        };

        // The derivative registers as its own clip; the longer id keeps it
        // from colliding with the source on the CDN.
        clip.regenerate_low_collision_id();

        let extended = extend_video(&ctx.config.extend_script, &input, model).await;
        remove_quiet(&input).await;
        let extended = extended?;

        clip.duration_secs = extended.duration_secs;
        clip.uses_redirect = false;

        if can_attach && extended.filesize_bytes <= ctx.config.attach_max_bytes {
            let response = DownloadResponse::local(&extended.path)
                .with_duration(extended.duration_secs)
                .with_filesize(Some(extended.filesize_bytes))
                .with_can_be_attached(true);
            return Ok(Delivery::backed(response, extended.path));
        }

        let url = ctx
            .cdn
            .upload_video(&extended.path, &clip.working_filename())
            .await?;
        info!(clip_id = %clip.clyppy_id, "extended clip rehosted on CDN");
        let response = DownloadResponse::remote(url)
            .with_duration(extended.duration_secs)
            .with_filesize(Some(extended.filesize_bytes));
        Ok(Delivery::backed(response, extended.path))
    }

    /// Dl-server ingestion: fetch the source, rehost it, publish, reply. The
    /// poster is our own webhook, so admission is skipped.
    async fn archive_clip(
        &self,
        mut clip: Clip,
        target: &ReplyTarget,
        user_id: u64,
        user_name: &str,
        guild: &GuildContext,
        started: Instant,
    ) -> EmbedResult<()> {
        let ctx = &self.ctx;
        info!(clip_id = %clip.clyppy_id, url = %clip.source_url, "archiving dl-server clip");

        let path = fetch_clip_media(ctx, &clip, Some(DOWNLOAD_MAX_FILESIZE_BYTES)).await?;
        let local = probe_file(&path).await?;
        clip.duration_secs = local
            .duration_secs()
            .map(|d| d.round() as u32)
            .unwrap_or(0);

        let url = ctx.cdn.upload_video(&path, &clip.working_filename()).await?;
        let response = DownloadResponse::remote(url)
            .with_duration(clip.duration_secs)
            .with_dimensions(Some(local.width), Some(local.height))
            .with_filesize(Some(local.size_bytes));
        let delivery = Delivery::backed(response, path);

        let thumbnail = self.make_thumbnail(&clip, &delivery, None).await?;
        self.publish_and_reply(
            clip, delivery, thumbnail, target, user_id, user_name, guild, started,
        )
        .await
    }

    /// First-frame thumbnail for locally-held files, the platform thumbnail
    /// for Twitch redirects, nothing otherwise.
    async fn make_thumbnail(
        &self,
        clip: &Clip,
        delivery: &Delivery,
        probe: Option<&ProbedMedia>,
    ) -> EmbedResult<Option<String>> {
        let ctx = &self.ctx;

        if let Some(video) = &delivery.local_artifact {
            let thumb = ctx.downloads.thumbnail_path(clip);
            if let Err(e) = extract_first_frame(video, &thumb).await {
                // InvalidFileType means the downloaded bytes are not video at
                // all; the extractor already removed them.
                if e.kind() == Some(EmbedErrorKind::InvalidFileType) {
                    return Err(e.into());
                }
                warn!(clip_id = %clip.clyppy_id, error = %e, "thumbnail extraction failed");
                return Ok(None);
            }
            let url = match ctx
                .cdn
                .upload_thumbnail(&thumb, &clip.thumbnail_filename())
                .await
            {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(clip_id = %clip.clyppy_id, error = %e, "thumbnail upload failed");
                    None
                }
            };
            remove_quiet(&thumb).await;
            return Ok(url);
        }

        if clip.service == Service::Twitch && delivery.response.is_redirect {
            return Ok(probe.and_then(|p| p.thumbnail.clone()));
        }

        Ok(None)
    }

    /// Publish the interaction row, send the one reply, then patch the row
    /// with the measured response time and the reply message id.
    #[allow(clippy::too_many_arguments)]
    async fn publish_and_reply(
        &self,
        mut clip: Clip,
        delivery: Delivery,
        thumbnail_url: Option<String>,
        target: &ReplyTarget,
        user_id: u64,
        user_name: &str,
        guild: &GuildContext,
        started: Instant,
    ) -> EmbedResult<()> {
        let ctx = &self.ctx;

        let row = InteractionPublish::build(
            &clip,
            &delivery.response,
            user_id,
            user_name,
            target.channel_id(),
            guild,
            started.elapsed().as_secs_f64(),
        )
        .with_thumbnail_url(thumbnail_url);

        let published = ctx.api.publish(&row).await?;

        // The server may hand back a fresh public id to bust stale chat
        // caches. Everything after this point uses the override.
        if let Some(new_id) = published.video_page_id {
            if new_id != clip.clyppy_id {
                debug!(old = %clip.clyppy_id, new = %new_id, "server re-keyed the clip");
                clip.clyppy_id = new_id;
            }
        }

        let reply = build_reply(&clip, &delivery, target);
        let message_id = self.send_reply(target, reply).await?;

        if let Some(row_id) = published.id {
            let edit = InteractionEdit::new(row_id, started.elapsed().as_secs_f64(), message_id);
            if let Err(e) = ctx.api.publish_edit(&edit).await {
                warn!(clip_id = %clip.clyppy_id, error = %e, "publish edit failed");
            }
        }

        if let Some(path) = &delivery.local_artifact {
            remove_quiet(path).await;
        }

        info!(
            clip_id = %clip.clyppy_id,
            platform = %clip.service,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "embedded"
        );
        Ok(())
    }

    async fn send_reply(&self, target: &ReplyTarget, reply: Reply) -> EmbedResult<u64> {
        let ctx = &self.ctx;
        match target {
            ReplyTarget::Message {
                channel_id,
                message_id,
                author_id,
            } => {
                match ctx.gateway.reply(*channel_id, *message_id, reply.clone()).await {
                    Ok(id) => Ok(id),
                    Err(e) => {
                        // The triggering message may have been deleted; fall
                        // back to a channel send that still pings the poster.
                        warn!(
                            channel_id = *channel_id,
                            message_id = *message_id,
                            error = %e,
                            "reply failed, sending with mention"
                        );
                        let mut fallback = reply;
                        fallback.text = if fallback.text.is_empty() {
                            format!("<@{author_id}>")
                        } else {
                            format!("<@{author_id}> {}", fallback.text)
                        };
                        ctx.gateway.send(*channel_id, fallback).await
                    }
                }
            }
            ReplyTarget::Interaction {
                application_id,
                token,
                ..
            } => ctx.gateway.edit_deferred(*application_id, token, reply).await,
            ReplyTarget::Webhook {
                application_id,
                token,
                ..
            } => {
                ctx.webhook
                    .edit_original(*application_id, token, &reply.text)
                    .await?;
                Ok(0)
            }
        }
    }

    /// Tell the user, file the error report, refund any charge.
    #[allow(clippy::too_many_arguments)]
    async fn report_failure(
        &self,
        target: &ReplyTarget,
        error: EmbedError,
        source_url: &str,
        service: &str,
        user_id: u64,
        user_name: &str,
        charge: &ChargeState,
    ) {
        let ctx = &self.ctx;
        let kind = error.kind();

        error!(
            url = source_url,
            platform = service,
            kind = %kind,
            error = %error,
            "embed failed"
        );

        if let Err(e) = self.send_reply(target, Reply::text(kind.user_reply())).await {
            warn!(error = %e, "failed to deliver the error message");
        }

        let report = ErrorReport {
            error_type: kind.as_str().to_string(),
            error_message: error.to_string(),
            video_url: source_url.to_string(),
            video_platform: service.to_string(),
            username: user_name.to_string(),
            user_id,
            handled: error.is_handled(),
        };
        if let Err(e) = ctx.api.report_error(&report).await {
            warn!(error = %e, "error report failed");
        }

        if kind.refunds_tokens() {
            if let Some(record) = charge.take() {
                refund_tokens(&ctx.api, record).await;
            }
        }
    }

    /// Replay one persisted quickembed through the normal entry point.
    pub(crate) async fn run_quickembed_task(&self, task: QuickembedTask) {
        let event = MessageEvent {
            channel_id: task.channel_id,
            message_id: task.message_id,
            author_id: task.author_id,
            author_name: task.author_name,
            guild: task.guild,
            content: task.url,
            in_thread: false,
            is_own: false,
        };
        self.handle_message(event).await;
    }

    /// Replay one persisted slash command. The reply edits the original
    /// deferred response over the webhook endpoint; after a restart the live
    /// interaction handle is gone, so attachments are off the table.
    pub(crate) async fn run_slash_task(&self, task: SlashCommandTask) {
        let ctx = &self.ctx;
        let target = ReplyTarget::Webhook {
            application_id: task.application_id,
            token: task.interaction_token.clone(),
            channel_id: task.channel_id,
        };

        let clip = match ctx.registry.resolve(&task.url).await {
            Ok(Some(clip)) => clip,
            Ok(None) => {
                let text = EmbedErrorKind::Unsupported.user_reply();
                if let Err(e) = ctx
                    .webhook
                    .edit_original(task.application_id, &task.interaction_token, &text)
                    .await
                {
                    warn!(error = %e, "replayed interaction edit failed");
                }
                return;
            }
            Err(e) => {
                self.report_failure(
                    &target,
                    EmbedError::from(e),
                    &task.url,
                    "unknown",
                    task.user_id,
                    &task.user_name,
                    &ChargeState::new(),
                )
                .await;
                return;
            }
        };

        self.run_pipeline(
            clip,
            target,
            task.user_id,
            &task.user_name,
            &task.guild,
            false,
            task.extend_with,
            None,
        )
        .await;
    }

    /// Drain in-flight work, then write the pending-task file.
    pub async fn shutdown_and_persist(&self) {
        let ctx = &self.ctx;
        let remaining = drain_inflight(&ctx.inflight).await;
        if remaining > 0 {
            warn!(remaining, "shutting down with work still in flight");
        }

        let pending = ctx.take_pending();
        if pending.is_empty() {
            return;
        }
        if let Err(e) = ctx.store.save(&pending).await {
            error!(error = %e, "failed to persist pending tasks");
        }
    }

    async fn edit_interaction(&self, command: &EmbedCommand, text: &str) {
        if let Err(e) = self
            .ctx
            .gateway
            .edit_deferred(
                command.application_id,
                &command.interaction_token,
                Reply::text(text),
            )
            .await
        {
            warn!(user_id = command.user_id, error = %e, "interaction edit failed");
        }
    }

    fn interaction_target(&self, command: &EmbedCommand) -> ReplyTarget {
        ReplyTarget::Interaction {
            application_id: command.application_id,
            token: command.interaction_token.clone(),
            channel_id: command.channel_id,
        }
    }
}

/// A probe that failed without a classifiable cause still gets the capped
/// download fallback; classified failures are terminal, except the missing
/// duration case the fallback exists for.
fn probe_error_to_fallback(error: MediaError) -> EmbedResult<Option<ProbedMedia>> {
    match error.kind() {
        None | Some(EmbedErrorKind::NoDuration) => {
            debug!(error = %error, "probe failed, falling back to download");
            Ok(None)
        }
        Some(_) => Err(error.into()),
    }
}

/// Attachment when the file fits and the target can carry one; the public
/// clip URL otherwise.
fn build_reply(clip: &Clip, delivery: &Delivery, target: &ReplyTarget) -> Reply {
    let response = &delivery.response;
    let attach_ok = response.can_be_attached
        && response.is_local()
        && !matches!(target, ReplyTarget::Webhook { .. });

    if attach_ok {
        if let Some(path) = response.local_path() {
            return Reply::file(path).with_buttons(standard_buttons(clip, None));
        }
    }

    let cdn_url = response.remote_url().filter(|_| !response.is_redirect);
    Reply::text(clip.public_url()).with_buttons(standard_buttons(clip, cdn_url))
}

/// Rebuild the selector output from a stored clip row. Rows without a hosted
/// artifact URL cannot be reused and force a fresh resolve.
fn response_from_record(record: &ClipRecord) -> Option<DownloadResponse> {
    let url = record.remote_url.as_deref()?;
    let base = if record.is_redirect {
        DownloadResponse::redirect(url)
    } else {
        DownloadResponse::remote(url)
    };
    Some(
        base.with_duration(record.duration.unwrap_or(0))
            .with_dimensions(record.width, record.height)
            .with_filesize(record.filesize)
            .with_video_name(record.title.clone())
            .with_expires_at(record.expires_at),
    )
}


#[cfg(test)]
mod tests {
    use super::testing::{context_with, context_with_defaults, test_config};
    use super::*;
    use crate::gateway::MockGateway;
    use crate::settings::MockGuildSettings;
    use chrono::Utc;
    use tempfile::TempDir;

    fn message(content: &str) -> MessageEvent {
        MessageEvent {
            channel_id: 100,
            message_id: 200,
            author_id: 300,
            author_name: "poster".to_string(),
            guild: GuildContext::guild(400, "Clip Lounge"),
            content: content.to_string(),
            in_thread: false,
            is_own: false,
        }
    }

    fn command(url: &str, user_id: u64) -> EmbedCommand {
        EmbedCommand {
            url: url.to_string(),
            application_id: 9000,
            interaction_token: "tok_test".to_string(),
            channel_id: 100,
            user_id,
            user_name: "caller".to_string(),
            guild: GuildContext::guild(400, "Clip Lounge"),
            extend_with: None,
        }
    }

    #[tokio::test]
    async fn test_messages_without_urls_touch_nothing() {
        let dir = TempDir::new().unwrap();
        // Zero mock expectations: any gateway call panics.
        let embedder = Embedder::new(context_with_defaults(&dir));
        embedder
            .handle_message(message("no links here, just chatter"))
            .await;
    }

    #[tokio::test]
    async fn test_own_messages_are_ignored() {
        let dir = TempDir::new().unwrap();
        let embedder = Embedder::new(context_with_defaults(&dir));
        let mut event = message("https://clips.twitch.tv/FunnySlug-abc123");
        event.is_own = true;
        embedder.handle_message(event).await;
    }

    #[tokio::test]
    async fn test_missing_permissions_skip_the_pipeline() {
        let dir = TempDir::new().unwrap();
        let mut gateway = MockGateway::new();
        gateway
            .expect_channel_permissions()
            .returning(|_| Ok(ChannelPermissions::default()));

        let (ctx, _controller) = context_with(test_config(&dir), Arc::new(gateway));
        let embedder = Embedder::new(ctx);
        embedder
            .handle_message(message("https://clips.twitch.tv/FunnySlug-abc123"))
            .await;
    }

    #[tokio::test]
    async fn test_disabled_platform_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut gateway = MockGateway::new();
        gateway
            .expect_channel_permissions()
            .returning(|_| Ok(ChannelPermissions::all()));

        let mut settings = MockGuildSettings::new();
        settings
            .expect_is_platform_quickembed_enabled()
            .withf(|guild_id, _, platform| *guild_id == Some(400) && platform == "twitch")
            .returning(|_, _, _| Ok(false));

        let (mut ctx, _controller) = context_with(test_config(&dir), Arc::new(gateway));
        ctx.settings = Arc::new(settings);

        let embedder = Embedder::new(ctx);
        embedder
            .handle_message(message("https://clips.twitch.tv/FunnySlug-abc123"))
            .await;
    }

    #[tokio::test]
    async fn test_nsfw_clip_skipped_outside_nsfw_channel() {
        let dir = TempDir::new().unwrap();
        let mut gateway = MockGateway::new();
        gateway
            .expect_channel_permissions()
            .returning(|_| Ok(ChannelPermissions::all()));
        gateway
            .expect_is_nsfw_channel()
            .returning(|_| Ok(false));

        let (ctx, _controller) = context_with(test_config(&dir), Arc::new(gateway));
        let embedder = Embedder::new(ctx);
        embedder
            .handle_message(message("https://www.xvideos.com/video1234567/title"))
            .await;
    }

    #[tokio::test]
    async fn test_shutdown_diverts_quickembeds_to_the_queue() {
        let dir = TempDir::new().unwrap();
        let mut gateway = MockGateway::new();
        gateway
            .expect_channel_permissions()
            .returning(|_| Ok(ChannelPermissions::all()));

        let (ctx, controller) = context_with(test_config(&dir), Arc::new(gateway));
        let embedder = Embedder::new(ctx);
        controller.signal();

        embedder
            .handle_message(message("https://clips.twitch.tv/FunnySlug-abc123"))
            .await;
        assert_eq!(embedder.context().pending_len(), 1);

        let pending = embedder.context().take_pending();
        assert_eq!(pending.quickembeds.len(), 1);
        assert_eq!(
            pending.quickembeds[0].url,
            "https://clips.twitch.tv/FunnySlug-abc123"
        );
        assert_eq!(pending.quickembeds[0].message_id, 200);
    }

    #[tokio::test]
    async fn test_shutdown_diverts_slash_commands_to_the_queue() {
        let dir = TempDir::new().unwrap();
        let (ctx, controller) =
            context_with(test_config(&dir), Arc::new(MockGateway::new()));
        let embedder = Embedder::new(ctx);
        controller.signal();

        let mut cmd = command("https://youtu.be/dQw4w9WgXcQ", 77);
        cmd.extend_with = Some(ExtendModel::Sora);
        embedder.handle_embed_command(cmd).await;

        let pending = embedder.context().take_pending();
        assert_eq!(pending.slash_commands.len(), 1);
        assert_eq!(pending.slash_commands[0].extend_with, Some(ExtendModel::Sora));
    }

    #[tokio::test]
    async fn test_user_cap_message() {
        let dir = TempDir::new().unwrap();
        let mut gateway = MockGateway::new();
        gateway
            .expect_edit_deferred()
            .withf(|_, _, reply| reply.text.contains("2 embeds"))
            .returning(|_, _, _| Ok(1));

        let (ctx, _controller) = context_with(test_config(&dir), Arc::new(gateway));
        ctx.inflight.begin_user(77);
        ctx.inflight.begin_user(77);

        let embedder = Embedder::new(ctx);
        embedder
            .handle_embed_command(command("https://clips.twitch.tv/FunnySlug-abc123", 77))
            .await;
    }

    #[tokio::test]
    async fn test_unrecognized_slash_url_gets_the_unsupported_reply() {
        let dir = TempDir::new().unwrap();
        let mut gateway = MockGateway::new();
        gateway
            .expect_edit_deferred()
            .withf(|_, _, reply| reply.text.contains("can't embed videos from that site"))
            .returning(|_, _, _| Ok(1));

        let (ctx, _controller) = context_with(test_config(&dir), Arc::new(gateway));
        let embedder = Embedder::new(ctx);
        embedder
            .handle_embed_command(command("https://example.com/about", 77))
            .await;
    }

    #[test]
    fn test_response_from_record_needs_a_hosted_url() {
        let record = ClipRecord {
            clip_id: "abcd1234".to_string(),
            video_url: Some("https://clips.twitch.tv/FunnySlug".to_string()),
            remote_url: None,
            duration: Some(30),
            width: None,
            height: None,
            filesize: None,
            is_redirect: false,
            expires_at: None,
            title: None,
            is_nsfw: false,
        };
        assert!(response_from_record(&record).is_none());
    }

    #[test]
    fn test_response_from_record_rebuilds_redirects() {
        let expires = Utc::now() + chrono::Duration::hours(4);
        let record = ClipRecord {
            clip_id: "abcd1234".to_string(),
            video_url: Some("https://clips.twitch.tv/FunnySlug".to_string()),
            remote_url: Some("https://production.assets.clips.twitchcdn.net/v.mp4".to_string()),
            duration: Some(27),
            width: Some(1280),
            height: Some(720),
            filesize: Some(4_000_000),
            is_redirect: true,
            expires_at: Some(expires),
            title: Some("clutch".to_string()),
            is_nsfw: false,
        };
        let response = response_from_record(&record).unwrap();
        assert!(response.is_redirect);
        assert_eq!(response.duration_secs, 27);
        assert_eq!(response.expires_at, Some(expires));
        assert_eq!(
            response.remote_url(),
            Some("https://production.assets.clips.twitchcdn.net/v.mp4")
        );
    }

    #[test]
    fn test_reply_shape_per_delivery() {
        let mut clip = Clip::new(Service::Twitch, "Slug", "https://clips.twitch.tv/Slug");
        let message_target = ReplyTarget::Message {
            channel_id: 1,
            message_id: 2,
            author_id: 3,
        };

        let attached = Delivery::backed(
            DownloadResponse::local("/tmp/twitch_x.mp4").with_can_be_attached(true),
            "/tmp/twitch_x.mp4",
        );
        let reply = build_reply(&clip, &attached, &message_target);
        assert!(reply.file.is_some());
        assert_eq!(reply.buttons.len(), 2);

        let rehosted = Delivery::remote(DownloadResponse::remote(
            "https://cdn.clyppy.io/temp/twitch_x.mp4",
        ));
        let reply = build_reply(&clip, &rehosted, &message_target);
        assert!(reply.file.is_none());
        assert_eq!(reply.text, clip.public_url());
        assert!(reply.buttons.iter().any(|b| b.label == "Download"));

        clip.uses_redirect = true;
        let redirected = Delivery::remote(DownloadResponse::redirect(
            "https://production.assets.clips.twitchcdn.net/v.mp4",
        ));
        let reply = build_reply(&clip, &redirected, &message_target);
        assert!(reply.text.contains("/e/"));
        assert!(reply.buttons.iter().all(|b| b.label != "Download"));
    }

    #[test]
    fn test_webhook_target_never_attaches() {
        let clip = Clip::new(Service::YouTube, "dQw4w9WgXcQ", "https://youtu.be/dQw4w9WgXcQ");
        let target = ReplyTarget::Webhook {
            application_id: 1,
            token: "t".to_string(),
            channel_id: 2,
        };
        let delivery = Delivery::backed(
            DownloadResponse::local("/tmp/youtube_x.mp4").with_can_be_attached(true),
            "/tmp/youtube_x.mp4",
        );
        let reply = build_reply(&clip, &delivery, &target);
        assert!(reply.file.is_none());
        assert_eq!(reply.text, clip.public_url());
    }
}
