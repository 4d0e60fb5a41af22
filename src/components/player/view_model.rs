//! Per-player state: binds one media element to one playback identity and
//! derives what a stem player shows from coordinator events.

use crate::components::audio_manager::{
    MediaElement, MediaSignal, MediaSignalSink, PlaybackEvent, PlaybackIdentity,
    PlaybackServices, SimulatedMedia, Subscription, SIMULATED_PREVIEW_SECS,
};
use crate::utils::{clamp_position, finite_or_zero, format_time, progress_fraction};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

const LOG_TARGET: &str = "stemstore::player";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerStatus {
    /// Nothing resolved yet.
    #[default]
    Idle,
    Resolving,
    /// Element created, waiting for the media to become playable.
    Ready,
    Loaded,
    Playing,
    /// The media element failed to load its source.
    Errored,
    /// Every resolution stage failed; there is nothing to play.
    Unavailable,
}

impl PlayerStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Resolving => "Loading",
            Self::Ready => "Buffering",
            Self::Loaded => "Ready",
            Self::Playing => "Playing",
            Self::Errored => "Error",
            Self::Unavailable => "Unavailable",
        }
    }

    pub fn is_busy(self) -> bool {
        matches!(self, Self::Resolving | Self::Ready)
    }
}

/// What the UI renders for one player.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerSnapshot {
    pub status: PlayerStatus,
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub progress: f64,
    /// Playback is timer-driven without real audio.
    pub simulated: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct PlayerState {
    status: PlayerStatus,
    url: Option<String>,
    element: Option<Rc<dyn MediaElement>>,
    /// Bumped whenever `element` is replaced so stale signals are ignored.
    element_generation: u64,
    is_playing: bool,
    current_time: f64,
    duration: f64,
    simulated: bool,
    error: Option<String>,
    mounted: bool,
}

type ChangeCallback = Rc<dyn Fn(&PlayerSnapshot)>;
type CompleteCallback = Rc<dyn Fn()>;

struct PlayerShared {
    identity: PlaybackIdentity,
    stem_name: String,
    track_title: String,
    services: PlaybackServices,
    state: RefCell<PlayerState>,
    on_change: RefCell<Option<ChangeCallback>>,
    on_complete: RefCell<Option<CompleteCallback>>,
    subscription: RefCell<Option<Subscription>>,
}

#[derive(Clone)]
pub struct PlayerViewModel {
    shared: Rc<PlayerShared>,
}

impl PartialEq for PlayerViewModel {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl PlayerViewModel {
    pub fn new(
        services: &PlaybackServices,
        identity: PlaybackIdentity,
        stem_name: impl Into<String>,
        track_title: impl Into<String>,
    ) -> Self {
        let shared = Rc::new(PlayerShared {
            identity,
            stem_name: stem_name.into(),
            track_title: track_title.into(),
            services: services.clone(),
            state: RefCell::new(PlayerState {
                mounted: true,
                ..PlayerState::default()
            }),
            on_change: RefCell::new(None),
            on_complete: RefCell::new(None),
            subscription: RefCell::new(None),
        });

        let weak: Weak<PlayerShared> = Rc::downgrade(&shared);
        let subscription = services.coordinator.add_event_listener(move |event| {
            if let Some(shared) = weak.upgrade() {
                PlayerViewModel { shared }.on_playback_event(event);
            }
        });
        *shared.subscription.borrow_mut() = Some(subscription);

        Self { shared }
    }

    pub fn identity(&self) -> &PlaybackIdentity {
        &self.shared.identity
    }

    pub fn set_on_change(&self, callback: impl Fn(&PlayerSnapshot) + 'static) {
        *self.shared.on_change.borrow_mut() = Some(Rc::new(callback));
    }

    /// Fired each time this player's media plays through to the end.
    pub fn set_on_complete(&self, callback: impl Fn() + 'static) {
        *self.shared.on_complete.borrow_mut() = Some(Rc::new(callback));
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let state = self.shared.state.borrow();
        PlayerSnapshot {
            status: state.status,
            is_playing: state.is_playing,
            current_time: state.current_time,
            duration: state.duration,
            progress: progress_fraction(state.current_time, state.duration),
            simulated: state.simulated,
            error: state.error.clone(),
        }
    }

    pub fn url(&self) -> Option<String> {
        self.shared.state.borrow().url.clone()
    }

    pub fn progress_fraction(&self) -> f64 {
        self.snapshot().progress
    }

    pub fn format_time(seconds: f64) -> String {
        format_time(seconds)
    }

    fn notify(&self) {
        let callback = self.shared.on_change.borrow().clone();
        if let Some(callback) = callback {
            callback(&self.snapshot());
        }
    }

    fn is_mounted(&self) -> bool {
        self.shared.state.borrow().mounted
    }

    fn element(&self) -> Option<Rc<dyn MediaElement>> {
        self.shared.state.borrow().element.clone()
    }

    fn is_active(&self) -> bool {
        self.shared.services.coordinator.active_identity().as_ref() == Some(&self.shared.identity)
    }

    /// Resolve the stem URL and create the media element. Results arriving
    /// after `dispose` are dropped.
    pub async fn load(&self) {
        {
            let mut state = self.shared.state.borrow_mut();
            if !state.mounted || !matches!(state.status, PlayerStatus::Idle | PlayerStatus::Unavailable) {
                return;
            }
            state.status = PlayerStatus::Resolving;
            state.error = None;
        }
        self.notify();

        let url = self
            .shared
            .services
            .resolver
            .resolve(&self.shared.stem_name, &self.shared.track_title)
            .await;
        if !self.is_mounted() {
            debug!(target: LOG_TARGET, "{} unmounted before its url resolved", self.shared.identity);
            return;
        }

        match url {
            Some(url) => self.attach(url),
            None => {
                {
                    let mut state = self.shared.state.borrow_mut();
                    state.status = PlayerStatus::Unavailable;
                    state.error = Some("No audio file was found for this stem.".to_string());
                }
                self.notify();
                if self.shared.services.settings.simulate_missing_media {
                    self.enable_simulation(SIMULATED_PREVIEW_SECS);
                }
            }
        }
    }

    fn attach(&self, url: String) {
        let generation = {
            let mut state = self.shared.state.borrow_mut();
            state.element_generation += 1;
            state.element_generation
        };
        let weak = Rc::downgrade(&self.shared);
        let sink: MediaSignalSink = Rc::new(move |signal| {
            if let Some(shared) = weak.upgrade() {
                PlayerViewModel { shared }.on_media_signal(generation, signal);
            }
        });

        match self.shared.services.media_factory.create(&url, sink) {
            Ok(element) => {
                let duration = finite_or_zero(element.duration());
                let mut state = self.shared.state.borrow_mut();
                state.url = Some(url);
                state.simulated = element.is_simulated();
                state.element = Some(element);
                state.duration = duration;
                state.current_time = 0.0;
                state.status = if duration > 0.0 {
                    PlayerStatus::Loaded
                } else {
                    PlayerStatus::Ready
                };
            }
            Err(err) => {
                warn!(target: LOG_TARGET, "could not create media for {}: {err}", self.shared.identity);
                let mut state = self.shared.state.borrow_mut();
                state.url = Some(url);
                state.status = PlayerStatus::Errored;
                state.error = Some(err.to_string());
            }
        }
        self.notify();
    }

    fn on_media_signal(&self, generation: u64, signal: MediaSignal) {
        if self.shared.state.borrow().element_generation != generation {
            return;
        }
        match signal {
            MediaSignal::MetadataLoaded { duration } | MediaSignal::CanPlay { duration } => {
                {
                    let mut state = self.shared.state.borrow_mut();
                    if duration > 0.0 {
                        state.duration = duration;
                    }
                    if state.status == PlayerStatus::Ready {
                        state.status = PlayerStatus::Loaded;
                    }
                }
                self.notify();
            }
            MediaSignal::LoadError(message) => {
                warn!(target: LOG_TARGET, "media for {} failed to load: {message}", self.shared.identity);
                if let Some(element) = self.element() {
                    self.shared.services.coordinator.release(&element);
                }
                {
                    let mut state = self.shared.state.borrow_mut();
                    state.status = PlayerStatus::Errored;
                    state.is_playing = false;
                    state.error = Some(message);
                }
                self.notify();
                if self.shared.services.settings.simulate_missing_media {
                    self.enable_simulation(SIMULATED_PREVIEW_SECS);
                }
            }
            MediaSignal::Ended => {
                if let Some(element) = self.element() {
                    self.shared.services.coordinator.complete(&element);
                }
                // Not driven by the coordinator (e.g. played before it knew).
                if self.shared.state.borrow().is_playing {
                    self.finish();
                }
            }
        }
    }

    fn on_playback_event(&self, event: &PlaybackEvent) {
        if event.identity() != &self.shared.identity {
            if matches!(event, PlaybackEvent::Play { .. }) && self.shared.state.borrow().is_playing {
                self.set_stopped(None);
            }
            return;
        }

        match event {
            PlaybackEvent::Play { position, .. } => {
                {
                    let mut state = self.shared.state.borrow_mut();
                    state.is_playing = true;
                    state.status = PlayerStatus::Playing;
                    state.current_time = *position;
                    state.error = None;
                }
                self.notify();
            }
            PlaybackEvent::Pause { position, .. } => self.set_stopped(Some(*position)),
            PlaybackEvent::Stop { .. } => self.set_stopped(Some(0.0)),
            PlaybackEvent::Ended { .. } => self.finish(),
            PlaybackEvent::TimeUpdate { position, .. } => {
                let element_duration = self.element().map(|element| element.duration());
                {
                    let mut state = self.shared.state.borrow_mut();
                    state.current_time = *position;
                    if let Some(duration) = element_duration.filter(|d| *d > 0.0) {
                        state.duration = duration;
                    }
                }
                self.notify();
            }
        }
    }

    fn set_stopped(&self, position: Option<f64>) {
        {
            let mut state = self.shared.state.borrow_mut();
            state.is_playing = false;
            if state.status == PlayerStatus::Playing {
                state.status = PlayerStatus::Loaded;
            }
            if let Some(position) = position {
                state.current_time = position;
            }
        }
        self.notify();
    }

    fn finish(&self) {
        self.set_stopped(Some(0.0));
        let callback = self.shared.on_complete.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Start this player's media through the coordinator. A refused start is
    /// recorded in the snapshot rather than returned.
    pub async fn play(&self) {
        let element = {
            let state = self.shared.state.borrow();
            match state.status {
                PlayerStatus::Loaded => state.element.clone(),
                _ => None,
            }
        };
        let Some(element) = element else {
            return;
        };

        let result = self
            .shared
            .services
            .coordinator
            .play(&element, self.shared.identity.clone())
            .await;
        if let Err(err) = result {
            warn!(target: LOG_TARGET, "play for {} refused: {err}", self.shared.identity);
            {
                let mut state = self.shared.state.borrow_mut();
                state.is_playing = false;
                if state.status == PlayerStatus::Playing {
                    state.status = PlayerStatus::Loaded;
                }
                state.error = Some(err.to_string());
            }
            self.notify();
        }
    }

    pub fn pause(&self) {
        if self.is_active() {
            self.shared.services.coordinator.pause();
        } else if let Some(element) = self.element() {
            element.pause();
            self.set_stopped(Some(finite_or_zero(element.current_time())));
        }
    }

    pub async fn toggle(&self) {
        if self.shared.state.borrow().is_playing {
            self.pause();
        } else {
            self.play().await;
        }
    }

    /// Seek within `[0, duration]`.
    pub fn seek(&self, seconds: f64) {
        let Some(element) = self.element() else {
            return;
        };
        let duration = self.shared.state.borrow().duration.max(element.duration());
        let position = clamp_position(seconds, duration);
        if self.is_active() {
            self.shared.services.coordinator.seek(position);
        } else {
            element.set_current_time(position);
        }
        self.shared.state.borrow_mut().current_time = position;
        self.notify();
    }

    /// Switch to clearly-flagged simulated playback after a load failure.
    /// Returns whether the switch happened.
    pub fn enable_simulation(&self, duration: f64) -> bool {
        let allowed = {
            let state = self.shared.state.borrow();
            state.mounted
                && matches!(state.status, PlayerStatus::Errored | PlayerStatus::Unavailable)
                && self.shared.services.settings.simulate_missing_media
        };
        if !allowed {
            return false;
        }

        let simulated: Rc<dyn MediaElement> = Rc::new(SimulatedMedia::new(
            format!("simulated://{}", self.shared.identity),
            duration,
            self.shared.services.clock.clone(),
        ));
        let previous = {
            let mut state = self.shared.state.borrow_mut();
            state.element_generation += 1;
            state.simulated = true;
            state.duration = simulated.duration();
            state.current_time = 0.0;
            state.status = PlayerStatus::Loaded;
            state.element.replace(simulated)
        };
        if let Some(previous) = previous {
            self.shared.services.coordinator.release(&previous);
            previous.release();
        }
        debug!(target: LOG_TARGET, "{} switched to simulated playback", self.shared.identity);
        self.notify();
        true
    }

    /// Tear down: ignore in-flight results, detach from the coordinator and
    /// release the media element.
    pub fn dispose(&self) {
        let element = {
            let mut state = self.shared.state.borrow_mut();
            if !state.mounted {
                return;
            }
            state.mounted = false;
            state.is_playing = false;
            state.element_generation += 1;
            state.element.take()
        };
        self.shared.subscription.borrow_mut().take();
        self.shared.on_change.borrow_mut().take();
        self.shared.on_complete.borrow_mut().take();
        if let Some(element) = element {
            self.shared.services.coordinator.release(&element);
            element.release();
        }
    }
}
