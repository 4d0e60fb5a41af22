//! Audio Manager - playback arbitration, stem URL resolution and the media
//! element abstraction shared by web and native builds.
//! Everything here lives outside the component render cycle; components reach
//! it through the [`PlaybackServices`] context.

mod coordinator;
mod media;
mod resolver;
mod shortcuts;
mod types;

pub use coordinator::{CartActivity, CoordinatorConfig, PlaybackCoordinator, Subscription};
pub use media::*;
pub use resolver::{MediaResolver, ResolverConfig};
pub use types::*;

use crate::api::{CdnRewriter, CmsClient, ContentApi, HttpProber, UrlProber};
use crate::cache::UrlCache;
use crate::db::{load_settings, KeyValueStore, PlaybackSettings};
use crate::platform::{Clock, SystemClock};
use std::rc::Rc;

/// Process-wide playback services, created once at startup.
#[derive(Clone)]
pub struct PlaybackServices {
    pub settings: PlaybackSettings,
    pub api: Rc<dyn ContentApi>,
    pub coordinator: PlaybackCoordinator,
    pub resolver: MediaResolver,
    pub media_factory: Rc<dyn MediaElementFactory>,
    pub clock: Rc<dyn Clock>,
}

impl PlaybackServices {
    /// Load settings from `store` and wire the production collaborators.
    pub fn bootstrap(store: Rc<dyn KeyValueStore>) -> Self {
        let settings = load_settings(store.as_ref());
        let clock: Rc<dyn Clock> = Rc::new(SystemClock);
        let api: Rc<dyn ContentApi> = Rc::new(CmsClient::from_settings(&settings));
        let factory = default_media_factory(clock.clone());
        Self::with_parts(settings, store, clock, api, Rc::new(HttpProber), factory)
    }

    pub fn with_parts(
        settings: PlaybackSettings,
        store: Rc<dyn KeyValueStore>,
        clock: Rc<dyn Clock>,
        api: Rc<dyn ContentApi>,
        prober: Rc<dyn UrlProber>,
        media_factory: Rc<dyn MediaElementFactory>,
    ) -> Self {
        let coordinator =
            PlaybackCoordinator::new(CoordinatorConfig::from(&settings), clock.clone());
        let cache = UrlCache::load(store, settings.cache_storage_key.clone());
        let resolver = MediaResolver::new(
            api.clone(),
            prober,
            CdnRewriter::from_settings(&settings),
            cache,
            ResolverConfig::from(&settings),
            clock.clone(),
        );
        Self {
            settings,
            api,
            coordinator,
            resolver,
            media_factory,
            clock,
        }
    }
}
