//! Deterministic stand-ins for the browser, the CMS and the wall clock.

use crate::api::{AssetMetadata, ContentApi, ContentApiError, TrackMetadata, UrlProber};
use crate::components::audio_manager::{
    MediaElement, MediaElementFactory, MediaSignal, MediaSignalSink, PlaybackError,
};
use crate::db::{KeyValueStore, StoreError};
use crate::platform::Clock;
use futures_util::future::{self, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use tokio::sync::oneshot;

pub struct ManualClock {
    now: Cell<i64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }
}

/// Store whose writes always fail, as with a full or disabled localStorage.
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::backend("quota exceeded"))
    }

    fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::backend("storage disabled"))
    }
}

#[derive(Default)]
struct FakeElementState {
    position: f64,
    paused: bool,
    ended: bool,
    play_calls: usize,
    released: bool,
    pending_play: Option<oneshot::Sender<Result<(), PlaybackError>>>,
}

struct FakeElement {
    src: String,
    duration: f64,
    reject_with: Option<String>,
    /// Play calls stay pending until settled or aborted by a pause.
    defer_play: bool,
    state: RefCell<FakeElementState>,
}

fn aborted() -> PlaybackError {
    PlaybackError::Rejected("AbortError".to_string())
}

impl MediaElement for FakeElement {
    fn play(&self) -> LocalBoxFuture<'static, Result<(), PlaybackError>> {
        let mut state = self.state.borrow_mut();
        state.play_calls += 1;
        if let Some(reason) = &self.reject_with {
            return Box::pin(future::ready(Err(PlaybackError::Rejected(reason.clone()))));
        }
        if state.ended {
            state.ended = false;
            state.position = 0.0;
        }
        state.paused = false;
        if !self.defer_play {
            return Box::pin(future::ready(Ok(())));
        }
        // Replacing an earlier pending call drops its sender, which aborts it.
        let (settle, settled) = oneshot::channel();
        state.pending_play = Some(settle);
        Box::pin(async move { settled.await.unwrap_or_else(|_| Err(aborted())) })
    }

    fn pause(&self) {
        let mut state = self.state.borrow_mut();
        state.paused = true;
        if let Some(settle) = state.pending_play.take() {
            let _ = settle.send(Err(aborted()));
        }
    }

    fn current_time(&self) -> f64 {
        self.state.borrow().position
    }

    fn set_current_time(&self, seconds: f64) {
        let mut state = self.state.borrow_mut();
        state.position = seconds;
        state.ended = false;
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn paused(&self) -> bool {
        self.state.borrow().paused
    }

    fn ended(&self) -> bool {
        self.state.borrow().ended
    }

    fn src(&self) -> String {
        self.src.clone()
    }

    fn release(&self) {
        let mut state = self.state.borrow_mut();
        state.paused = true;
        state.released = true;
    }
}

/// Scriptable media element. Clones share the same element.
#[derive(Clone)]
pub struct FakeMedia {
    element: Rc<FakeElement>,
}

impl FakeMedia {
    fn build(src: &str, duration: f64, reject_with: Option<String>, defer_play: bool) -> Self {
        Self {
            element: Rc::new(FakeElement {
                src: src.to_string(),
                duration,
                reject_with,
                defer_play,
                state: RefCell::new(FakeElementState {
                    paused: true,
                    ..FakeElementState::default()
                }),
            }),
        }
    }

    pub fn new(duration: f64) -> Self {
        Self::build("fake://media", duration, None, false)
    }

    /// An element whose play call is refused, like an autoplay-blocked one.
    pub fn rejecting(duration: f64, reason: &str) -> Self {
        Self::build("fake://blocked", duration, Some(reason.to_string()), false)
    }

    /// An element whose play call stays pending until [`FakeMedia::resolve_play`],
    /// or is rejected with `AbortError` when the element is paused first.
    pub fn deferred(duration: f64) -> Self {
        Self::build("fake://slow", duration, None, true)
    }

    /// Let the pending play call succeed. Returns whether one was pending.
    pub fn resolve_play(&self) -> bool {
        let settle = self.element.state.borrow_mut().pending_play.take();
        settle.map(|settle| settle.send(Ok(())).is_ok()).unwrap_or(false)
    }

    pub fn handle(&self) -> Rc<dyn MediaElement> {
        self.element.clone()
    }

    pub fn set_position(&self, seconds: f64) {
        self.element.state.borrow_mut().position = seconds;
    }

    /// Play through to the end, as the browser does on natural completion.
    pub fn finish(&self) {
        let mut state = self.element.state.borrow_mut();
        state.position = self.element.duration;
        state.paused = true;
        state.ended = true;
    }

    pub fn paused(&self) -> bool {
        self.element.paused()
    }

    pub fn current_time(&self) -> f64 {
        self.element.current_time()
    }

    pub fn play_calls(&self) -> usize {
        self.element.state.borrow().play_calls
    }

    pub fn released(&self) -> bool {
        self.element.state.borrow().released
    }
}

struct CreatedMedia {
    media: FakeMedia,
    sink: MediaSignalSink,
}

/// Factory handing out [`FakeMedia`] and keeping their signal sinks so tests
/// can play the browser's part.
pub struct FakeMediaFactory {
    duration: Cell<f64>,
    reject_play: Cell<bool>,
    defer_play: Cell<bool>,
    fail_create: Cell<bool>,
    created: RefCell<Vec<CreatedMedia>>,
}

impl FakeMediaFactory {
    /// Elements start with `duration`; `0.0` means unknown until `CanPlay`.
    pub fn new(duration: f64) -> Self {
        Self {
            duration: Cell::new(duration),
            reject_play: Cell::new(false),
            defer_play: Cell::new(false),
            fail_create: Cell::new(false),
            created: RefCell::new(Vec::new()),
        }
    }

    pub fn reject_play(&self) {
        self.reject_play.set(true);
    }

    /// Elements created from now on hold their play calls open.
    pub fn set_defer_play(&self, defer: bool) {
        self.defer_play.set(defer);
    }

    pub fn fail_create(&self) {
        self.fail_create.set(true);
    }

    pub fn created_count(&self) -> usize {
        self.created.borrow().len()
    }

    pub fn last(&self) -> Option<FakeMedia> {
        self.created.borrow().last().map(|created| created.media.clone())
    }

    /// Deliver `signal` to the most recently created element's owner.
    pub fn emit(&self, signal: MediaSignal) {
        let sink = self.created.borrow().last().map(|created| created.sink.clone());
        if let Some(sink) = sink {
            sink(signal);
        }
    }
}

impl MediaElementFactory for FakeMediaFactory {
    fn create(
        &self,
        url: &str,
        sink: MediaSignalSink,
    ) -> Result<Rc<dyn MediaElement>, PlaybackError> {
        if self.fail_create.get() {
            return Err(PlaybackError::Rejected("unsupported source".to_string()));
        }
        let reject_with = self
            .reject_play
            .get()
            .then(|| "NotAllowedError".to_string());
        let media = FakeMedia::build(url, self.duration.get(), reject_with, self.defer_play.get());
        let handle = media.handle();
        self.created.borrow_mut().push(CreatedMedia { media, sink });
        Ok(handle)
    }
}

/// Content API with scripted responses and per-endpoint call counters.
/// Every call yields once before answering, like a real network round trip.
#[derive(Default)]
pub struct FakeContentApi {
    tracks: RefCell<Vec<TrackMetadata>>,
    assets: RefCell<Vec<AssetMetadata>>,
    hang_tracks: Cell<bool>,
    fail_assets: Cell<bool>,
    track_calls: Cell<usize>,
    asset_calls: Cell<usize>,
}

impl FakeContentApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tracks(&self, tracks: Vec<TrackMetadata>) {
        *self.tracks.borrow_mut() = tracks;
    }

    pub fn set_assets(&self, assets: Vec<AssetMetadata>) {
        *self.assets.borrow_mut() = assets;
    }

    /// Track lookups never answer.
    pub fn hang_track_lookups(&self) {
        self.hang_tracks.set(true);
    }

    pub fn fail_asset_listing(&self) {
        self.fail_assets.set(true);
    }

    pub fn track_calls(&self) -> usize {
        self.track_calls.get()
    }

    pub fn asset_calls(&self) -> usize {
        self.asset_calls.get()
    }

    pub fn total_calls(&self) -> usize {
        self.track_calls() + self.asset_calls()
    }
}

impl ContentApi for FakeContentApi {
    fn tracks_by_title<'a>(
        &'a self,
        title: &'a str,
    ) -> LocalBoxFuture<'a, Result<Vec<TrackMetadata>, ContentApiError>> {
        self.track_calls.set(self.track_calls.get() + 1);
        Box::pin(async move {
            if self.hang_tracks.get() {
                future::pending::<()>().await;
            }
            tokio::task::yield_now().await;
            let wanted = title.trim().to_lowercase();
            let words: Vec<&str> = wanted.split_whitespace().collect();
            Ok(self
                .tracks
                .borrow()
                .iter()
                .filter(|track| {
                    let title = track.title.to_lowercase();
                    words.iter().all(|word| title.contains(word))
                })
                .cloned()
                .collect())
        })
    }

    fn list_audio_assets(&self) -> LocalBoxFuture<'_, Result<Vec<AssetMetadata>, ContentApiError>> {
        self.asset_calls.set(self.asset_calls.get() + 1);
        Box::pin(async move {
            tokio::task::yield_now().await;
            if self.fail_assets.get() {
                return Err(ContentApiError::Status(503));
            }
            Ok(self.assets.borrow().clone())
        })
    }
}

/// HEAD prober answering from a fixed set of existing URLs.
#[derive(Default)]
pub struct FakeProber {
    existing: RefCell<HashSet<String>>,
    hanging: RefCell<HashSet<String>>,
    calls: RefCell<Vec<String>>,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_existing(&self, url: &str) {
        self.existing.borrow_mut().insert(url.to_string());
    }

    /// Probes of `url` never answer.
    pub fn add_hanging(&self, url: &str) {
        self.hanging.borrow_mut().insert(url.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl UrlProber for FakeProber {
    fn exists<'a>(&'a self, url: &'a str) -> LocalBoxFuture<'a, bool> {
        self.calls.borrow_mut().push(url.to_string());
        Box::pin(async move {
            if self.hanging.borrow().contains(url) {
                future::pending::<()>().await;
            }
            self.existing.borrow().contains(url)
        })
    }
}
