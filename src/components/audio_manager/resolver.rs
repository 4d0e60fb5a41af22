//! Stem URL resolution.
//!
//! Stages run in order and the first hit wins: persisted cache, the track's
//! own stem metadata, a filename search over the uploaded asset listing, and
//! finally guessed URLs confirmed by an existence probe. Successful results are
//! written through to the cache; misses never are, so a later upload becomes
//! discoverable without manual intervention.

mod name_variants;

use crate::api::{pick_track, AssetMetadata, CdnRewriter, ContentApi, ContentApiError, UrlProber};
use crate::cache::{cache_key, UrlCache};
use crate::db::PlaybackSettings;
use crate::diagnostics::log_perf;
use crate::platform::{with_timeout, Clock};
use chrono::{DateTime, Utc};
use futures_util::future::{FutureExt, LocalBoxFuture, Shared};
use name_variants::{capitalized_joined, contains_any, snake, stem_variants, track_variants};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};

const LOG_TARGET: &str = "stemstore::resolver";

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    pub request_timeout: Duration,
    pub probe_timeout: Duration,
    /// Upload sub-paths under the media base tried by the pattern stage.
    pub upload_paths: Vec<String>,
    /// Per-deployment `tracks/{prefix}/stems` prefixes on the CDN.
    pub cdn_prefixes: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(4),
            probe_timeout: Duration::from_secs(3),
            upload_paths: vec!["uploads".to_string()],
            cdn_prefixes: Vec::new(),
        }
    }
}

impl From<&PlaybackSettings> for ResolverConfig {
    fn from(settings: &PlaybackSettings) -> Self {
        Self {
            request_timeout: Duration::from_secs(settings.request_timeout_secs as u64),
            probe_timeout: Duration::from_secs(settings.probe_timeout_secs as u64),
            upload_paths: settings.upload_paths.clone(),
            cdn_prefixes: settings.cdn_prefixes.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStage {
    Cache,
    Metadata,
    AssetListing,
    PatternProbe,
}

impl ResolutionStage {
    fn label(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Metadata => "metadata",
            Self::AssetListing => "asset listing",
            Self::PatternProbe => "pattern probe",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub url: String,
    pub stage: ResolutionStage,
}

type InFlight = Shared<LocalBoxFuture<'static, Option<Resolution>>>;

struct ResolverShared {
    api: Rc<dyn ContentApi>,
    prober: Rc<dyn UrlProber>,
    cdn: CdnRewriter,
    cache: RefCell<UrlCache>,
    config: ResolverConfig,
    clock: Rc<dyn Clock>,
    in_flight: RefCell<HashMap<String, InFlight>>,
}

/// Clonable handle; clones share the cache and in-flight lookups.
#[derive(Clone)]
pub struct MediaResolver {
    shared: Rc<ResolverShared>,
}

impl PartialEq for MediaResolver {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl MediaResolver {
    pub fn new(
        api: Rc<dyn ContentApi>,
        prober: Rc<dyn UrlProber>,
        cdn: CdnRewriter,
        cache: UrlCache,
        config: ResolverConfig,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Rc::new(ResolverShared {
                api,
                prober,
                cdn,
                cache: RefCell::new(cache),
                config,
                clock,
                in_flight: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Playable public URL for `stem_name` of `track_title`, or `None` when
    /// every stage came up empty.
    pub async fn resolve(&self, stem_name: &str, track_title: &str) -> Option<String> {
        self.resolve_traced(stem_name, track_title)
            .await
            .map(|resolution| resolution.url)
    }

    /// Like [`resolve`](Self::resolve), also reporting which stage answered.
    pub async fn resolve_traced(&self, stem_name: &str, track_title: &str) -> Option<Resolution> {
        if stem_name.trim().is_empty() || track_title.trim().is_empty() {
            return None;
        }

        let key = cache_key(track_title, stem_name);
        if let Some(url) = self.shared.cache.borrow().url(&key) {
            debug!(target: LOG_TARGET, "cache hit for {key}");
            return Some(Resolution {
                url: self.shared.cdn.to_public_url(&url),
                stage: ResolutionStage::Cache,
            });
        }

        let existing = self.shared.in_flight.borrow().get(&key).cloned();
        let pending = match existing {
            Some(pending) => {
                debug!(target: LOG_TARGET, "joining in-flight lookup for {key}");
                pending
            }
            None => {
                let pending = self.start_lookup(key.clone(), stem_name, track_title);
                self.shared
                    .in_flight
                    .borrow_mut()
                    .insert(key, pending.clone());
                pending
            }
        };
        pending.await
    }

    fn start_lookup(&self, key: String, stem_name: &str, track_title: &str) -> InFlight {
        let shared = self.shared.clone();
        let stem_name = stem_name.trim().to_string();
        let track_title = track_title.trim().to_string();

        let lookup: LocalBoxFuture<'static, Option<Resolution>> = Box::pin(async move {
            let started_at = shared.clock.now_ms();
            let outcome = shared.discover(&stem_name, &track_title).await;

            match &outcome {
                Some(resolution) => {
                    info!(
                        target: LOG_TARGET,
                        "resolved {key} via {}: {}",
                        resolution.stage.label(),
                        resolution.url
                    );
                    let resolved_at = DateTime::<Utc>::from_timestamp_millis(shared.clock.now_ms())
                        .unwrap_or_else(Utc::now);
                    shared
                        .cache
                        .borrow_mut()
                        .insert(key.clone(), resolution.url.clone(), resolved_at);
                }
                None => {
                    info!(target: LOG_TARGET, "no playable url found for {key}");
                }
            }
            shared.in_flight.borrow_mut().remove(&key);
            log_perf("resolver.resolve", started_at, shared.clock.now_ms(), &key);
            outcome
        });
        lookup.shared()
    }

    /// Cached URL without touching the network.
    pub fn cached(&self, stem_name: &str, track_title: &str) -> Option<String> {
        self.shared
            .cache
            .borrow()
            .url(&cache_key(track_title, stem_name))
    }

    /// Forget one cached URL so the next `resolve` runs the full pipeline.
    pub fn invalidate(&self, stem_name: &str, track_title: &str) -> bool {
        self.shared
            .cache
            .borrow_mut()
            .remove(&cache_key(track_title, stem_name))
    }

    pub fn clear_cache(&self) {
        self.shared.cache.borrow_mut().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.shared.cache.borrow().len()
    }
}

impl ResolverShared {
    async fn discover(&self, stem_name: &str, track_title: &str) -> Option<Resolution> {
        let stages = [
            ResolutionStage::Metadata,
            ResolutionStage::AssetListing,
            ResolutionStage::PatternProbe,
        ];
        for stage in stages {
            let started_at = self.clock.now_ms();
            let found = match stage {
                ResolutionStage::Metadata => self.from_metadata(stem_name, track_title).await,
                ResolutionStage::AssetListing => self.from_asset_listing(stem_name, track_title).await,
                ResolutionStage::PatternProbe => self.from_pattern_probe(stem_name, track_title).await,
                ResolutionStage::Cache => None,
            };
            log_perf(
                &format!("resolver.{}", stage.label()),
                started_at,
                self.clock.now_ms(),
                if found.is_some() { "hit" } else { "miss" },
            );
            if let Some(url) = found {
                return Some(Resolution { url, stage });
            }
        }
        None
    }

    async fn from_metadata(&self, stem_name: &str, track_title: &str) -> Option<String> {
        let tracks = with_timeout(self.config.request_timeout, self.api.tracks_by_title(track_title))
            .await
            .map_err(ContentApiError::from)
            .and_then(|result| result);
        let tracks = match tracks {
            Ok(tracks) => tracks,
            Err(err) => {
                debug!(target: LOG_TARGET, "track lookup for {track_title:?} failed: {err}");
                return None;
            }
        };

        let track = pick_track(&tracks, track_title)?;
        let stem = track.stems.iter().find(|stem| stem.matches_name(stem_name))?;
        stem.direct_url().map(|url| self.cdn.to_public_url(url))
    }

    async fn from_asset_listing(&self, stem_name: &str, track_title: &str) -> Option<String> {
        let assets = with_timeout(self.config.request_timeout, self.api.list_audio_assets())
            .await
            .map_err(ContentApiError::from)
            .and_then(|result| result);
        let assets = match assets {
            Ok(assets) => assets,
            Err(err) => {
                debug!(target: LOG_TARGET, "asset listing failed: {err}");
                return None;
            }
        };

        find_asset(&assets, stem_name, track_title).map(|asset| self.cdn.to_public_url(&asset.url))
    }

    async fn from_pattern_probe(&self, stem_name: &str, track_title: &str) -> Option<String> {
        for candidate in self.candidate_urls(stem_name, track_title) {
            let url = self.cdn.to_public_url(&candidate);
            match with_timeout(self.config.probe_timeout, self.prober.exists(&url)).await {
                Ok(true) => return Some(url),
                Ok(false) => debug!(target: LOG_TARGET, "probe miss: {url}"),
                Err(_) => debug!(target: LOG_TARGET, "probe timed out: {url}"),
            }
        }
        None
    }

    fn candidate_urls(&self, stem_name: &str, track_title: &str) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        let mut push = |url: String| {
            if !candidates.contains(&url) {
                candidates.push(url);
            }
        };

        let media_base = self.cdn.media_base();
        if !media_base.is_empty() {
            let file_names = [
                format!("{}_{}.mp3", snake(stem_name), snake(track_title)),
                format!(
                    "{}_{}.mp3",
                    capitalized_joined(stem_name, "_"),
                    capitalized_joined(track_title, "_")
                ),
            ];
            for sub_path in &self.config.upload_paths {
                for file_name in &file_names {
                    push(format!(
                        "{media_base}/{sub_path}/{}",
                        urlencoding::encode(file_name)
                    ));
                }
            }
        }

        let cdn_base = self.cdn.cdn_base();
        if !cdn_base.is_empty() {
            let file_name = format!(
                "{}_-_{}.mp3",
                capitalized_joined(stem_name, "_"),
                capitalized_joined(track_title, "_")
            );
            for prefix in &self.config.cdn_prefixes {
                push(format!(
                    "{cdn_base}/tracks/{prefix}/stems/{}",
                    urlencoding::encode(&file_name)
                ));
            }
        }

        candidates
    }
}

/// Audio asset whose filename carries both a stem and a track spelling,
/// else the first one carrying just the stem.
fn find_asset<'a>(
    assets: &'a [AssetMetadata],
    stem_name: &str,
    track_title: &str,
) -> Option<&'a AssetMetadata> {
    let stems = stem_variants(stem_name);
    let tracks = track_variants(track_title);
    let audio = || assets.iter().filter(|asset| asset.is_audio());

    audio()
        .find(|asset| contains_any(&asset.name, &stems) && contains_any(&asset.name, &tracks))
        .or_else(|| audio().find(|asset| contains_any(&asset.name, &stems)))
}
