//! Process-wide playback arbitration: at most one media element plays at a
//! time. Holds only non-owning references to elements; their owners create and
//! tear them down.

use super::media::MediaElement;
use super::shortcuts::{shortcut_action, KeyPress, ShortcutAction};
use super::types::{PlaybackError, PlaybackEvent, PlaybackIdentity, PlaybackState};
use crate::db::PlaybackSettings;
use crate::platform::{sleep, Clock};
use crate::utils::clamp_position;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::{closure::Closure, JsCast};
#[cfg(target_arch = "wasm32")]
use web_sys::{window, KeyboardEvent};

const LOG_TARGET: &str = "stemstore::coordinator";

/// Commerce-side source of the last cart add/remove time.
pub trait CartActivity {
    fn last_mutation_ms(&self) -> Option<i64>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub suppression_window_ms: i64,
    pub time_update_interval: Duration,
    pub seek_step_secs: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            suppression_window_ms: 1000,
            time_update_interval: Duration::from_millis(250),
            seek_step_secs: 5.0,
        }
    }
}

impl From<&PlaybackSettings> for CoordinatorConfig {
    fn from(settings: &PlaybackSettings) -> Self {
        Self {
            suppression_window_ms: settings.suppression_window_ms as i64,
            time_update_interval: Duration::from_millis(settings.time_update_interval_ms as u64),
            seek_step_secs: settings.seek_step_secs,
        }
    }
}

#[derive(Clone)]
struct ActiveMedia {
    element: Weak<dyn MediaElement>,
    identity: PlaybackIdentity,
    /// Set once the element's play call has succeeded.
    started: bool,
}

impl ActiveMedia {
    fn holds(&self, element: &Rc<dyn MediaElement>) -> bool {
        self.element
            .upgrade()
            .map(|held| Rc::ptr_eq(&held, element))
            .unwrap_or(false)
    }
}

type EventListener = Rc<dyn Fn(&PlaybackEvent)>;
type StateListener = Rc<dyn Fn(bool)>;

struct CoordinatorInner {
    config: CoordinatorConfig,
    clock: Rc<dyn Clock>,
    /// Element that is playing or whose play call is in flight.
    current: Option<ActiveMedia>,
    /// Most recently paused element, resumed by `toggle`.
    resumable: Option<ActiveMedia>,
    suppress_until_ms: i64,
    cart: Option<Rc<dyn CartActivity>>,
    next_listener_id: u64,
    event_listeners: Vec<(u64, EventListener)>,
    state_listeners: Vec<(u64, StateListener)>,
    last_published_playing: bool,
    shortcuts_enabled: bool,
    #[cfg(target_arch = "wasm32")]
    key_listener: Option<Closure<dyn FnMut(KeyboardEvent)>>,
    ticker_generation: u64,
    disposed: bool,
}

/// Cheap clonable handle to the shared coordinator.
#[derive(Clone)]
pub struct PlaybackCoordinator {
    inner: Rc<RefCell<CoordinatorInner>>,
}

impl PartialEq for PlaybackCoordinator {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Listener registration. Dropping it removes the listener.
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    inner: Weak<RefCell<CoordinatorInner>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut inner) = inner.try_borrow_mut() {
                inner.event_listeners.retain(|(id, _)| *id != self.id);
                inner.state_listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

impl PlaybackCoordinator {
    pub fn new(config: CoordinatorConfig, clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(CoordinatorInner {
                config,
                clock,
                current: None,
                resumable: None,
                suppress_until_ms: 0,
                cart: None,
                next_listener_id: 0,
                event_listeners: Vec::new(),
                state_listeners: Vec::new(),
                last_published_playing: false,
                shortcuts_enabled: false,
                #[cfg(target_arch = "wasm32")]
                key_listener: None,
                ticker_generation: 0,
                disposed: false,
            })),
        }
    }

    pub fn set_cart_activity(&self, cart: Rc<dyn CartActivity>) {
        self.inner.borrow_mut().cart = Some(cart);
    }

    /// Ignore `play`/`toggle` until the given wall-clock millisecond.
    pub fn suppress_until(&self, until_ms: i64) {
        self.inner.borrow_mut().suppress_until_ms = until_ms;
    }

    /// Open a suppression window starting now.
    pub fn note_cart_mutation(&self) {
        let mut inner = self.inner.borrow_mut();
        let until = inner.clock.now_ms() + inner.config.suppression_window_ms;
        inner.suppress_until_ms = inner.suppress_until_ms.max(until);
    }

    pub fn is_suppressed(&self) -> bool {
        let inner = self.inner.borrow();
        let now = inner.clock.now_ms();
        let cart_until = inner
            .cart
            .as_ref()
            .and_then(|cart| cart.last_mutation_ms())
            .map(|at| at + inner.config.suppression_window_ms)
            .unwrap_or(i64::MIN);
        now < inner.suppress_until_ms.max(cart_until)
    }

    /// Make `element` the single playing element. Whatever else is playing is
    /// paused, rewound and announced as stopped before the new element starts.
    pub async fn play(
        &self,
        element: &Rc<dyn MediaElement>,
        identity: PlaybackIdentity,
    ) -> Result<(), PlaybackError> {
        if self.is_suppressed() {
            debug!(target: LOG_TARGET, "play for {identity} suppressed after cart mutation");
            return Ok(());
        }

        // Stop-previous and claim-active happen before the first await so a
        // second play cannot interleave between them.
        self.claim(element, identity.clone());
        let outcome = element.play().await;
        self.settle_play(element, &identity, outcome)
    }

    fn claim(&self, element: &Rc<dyn MediaElement>, identity: PlaybackIdentity) {
        let previous = {
            let mut inner = self.inner.borrow_mut();
            let previous = inner.current.take();
            inner.resumable = None;
            inner.current = Some(ActiveMedia {
                element: Rc::downgrade(element),
                identity,
                started: false,
            });
            previous
        };

        let Some(previous) = previous else {
            return;
        };
        let previous_element = previous.element.upgrade();
        if let Some(previous_element) = &previous_element {
            if Rc::ptr_eq(previous_element, element) {
                return;
            }
            previous_element.pause();
            previous_element.set_current_time(0.0);
        }
        debug!(target: LOG_TARGET, "stopping {} for new playback", previous.identity);
        self.emit(PlaybackEvent::Stop {
            identity: previous.identity,
            position: 0.0,
        });
    }

    fn settle_play(
        &self,
        element: &Rc<dyn MediaElement>,
        identity: &PlaybackIdentity,
        outcome: Result<(), PlaybackError>,
    ) -> Result<(), PlaybackError> {
        let still_current = self
            .inner
            .borrow()
            .current
            .as_ref()
            .map(|active| active.holds(element))
            .unwrap_or(false);

        match outcome {
            Ok(()) => {
                if !still_current {
                    // Another play/pause/stop took over while this one was starting.
                    debug!(target: LOG_TARGET, "play for {identity} superseded before it started");
                    element.pause();
                    return Ok(());
                }
                if let Some(active) = self.inner.borrow_mut().current.as_mut() {
                    active.started = true;
                }
                self.emit(PlaybackEvent::Play {
                    identity: identity.clone(),
                    position: element.current_time(),
                });
                Ok(())
            }
            Err(err) => {
                if !still_current {
                    // Browsers abort a pending play when the element is paused,
                    // which is what taking over from it does.
                    debug!(target: LOG_TARGET, "superseded play for {identity} settled with {err}");
                    return Ok(());
                }
                self.inner.borrow_mut().current = None;
                warn!(target: LOG_TARGET, "play for {identity} failed: {err}");
                self.publish_playing_state();
                Err(err)
            }
        }
    }

    /// Pause the active element, keeping its position.
    pub fn pause(&self) {
        let Some(active) = self.inner.borrow_mut().current.take() else {
            return;
        };
        let Some(element) = active.element.upgrade() else {
            self.publish_playing_state();
            return;
        };
        element.pause();
        let position = element.current_time();
        self.inner.borrow_mut().resumable = Some(ActiveMedia {
            started: false,
            ..active.clone()
        });
        self.emit(PlaybackEvent::Pause {
            identity: active.identity,
            position,
        });
    }

    /// Pause and rewind the active (or paused) element and forget it.
    /// A no-op when nothing is loaded.
    pub fn stop(&self) {
        let target = {
            let mut inner = self.inner.borrow_mut();
            let current = inner.current.take();
            let resumable = inner.resumable.take();
            current.or(resumable)
        };
        let Some(target) = target else {
            return;
        };
        if let Some(element) = target.element.upgrade() {
            element.pause();
            element.set_current_time(0.0);
        }
        self.emit(PlaybackEvent::Stop {
            identity: target.identity,
            position: 0.0,
        });
    }

    /// Pause when playing, otherwise resume the most recently paused element.
    pub async fn toggle(&self) -> Result<(), PlaybackError> {
        if self.is_suppressed() {
            debug!(target: LOG_TARGET, "toggle suppressed after cart mutation");
            return Ok(());
        }
        if self.is_playing() {
            self.pause();
            return Ok(());
        }

        let resumable = self.inner.borrow().resumable.as_ref().and_then(|active| {
            active
                .element
                .upgrade()
                .map(|element| (element, active.identity.clone()))
        });
        match resumable {
            Some((element, identity)) => self.play(&element, identity).await,
            None => Ok(()),
        }
    }

    /// Seek the active or paused element, clamped to its duration.
    pub fn seek(&self, seconds: f64) {
        let target = {
            let inner = self.inner.borrow();
            inner
                .current
                .as_ref()
                .or(inner.resumable.as_ref())
                .and_then(|active| {
                    active
                        .element
                        .upgrade()
                        .map(|element| (element, active.identity.clone(), active.started))
                })
        };
        let Some((element, identity, started)) = target else {
            return;
        };
        let position = clamp_position(seconds, element.duration());
        element.set_current_time(position);
        if started {
            self.emit(PlaybackEvent::TimeUpdate { identity, position });
        }
    }

    pub fn seek_by(&self, delta: f64) {
        let position = self
            .active_element()
            .map(|element| element.current_time())
            .unwrap_or(0.0);
        self.seek(position + delta);
    }

    /// An element reported its native `ended`.
    pub fn complete(&self, element: &Rc<dyn MediaElement>) {
        let is_current = self
            .inner
            .borrow()
            .current
            .as_ref()
            .map(|active| active.holds(element))
            .unwrap_or(false);
        if is_current {
            self.finish_ended(element);
        }
    }

    fn finish_ended(&self, element: &Rc<dyn MediaElement>) {
        let Some(active) = self.inner.borrow_mut().current.take() else {
            return;
        };
        let position = element.duration();
        element.set_current_time(0.0);
        self.inner.borrow_mut().resumable = Some(ActiveMedia {
            started: false,
            ..active.clone()
        });
        self.emit(PlaybackEvent::Ended {
            identity: active.identity,
            position,
        });
    }

    /// Forget `element` before its owner tears it down.
    pub fn release(&self, element: &Rc<dyn MediaElement>) {
        let (was_current, identity) = {
            let mut inner = self.inner.borrow_mut();
            if inner
                .resumable
                .as_ref()
                .map(|active| active.holds(element))
                .unwrap_or(false)
            {
                inner.resumable = None;
            }
            match inner.current.as_ref() {
                Some(active) if active.holds(element) => {
                    let identity = active.identity.clone();
                    inner.current = None;
                    (true, Some(identity))
                }
                _ => (false, None),
            }
        };
        if let (true, Some(identity)) = (was_current, identity) {
            element.pause();
            element.set_current_time(0.0);
            self.emit(PlaybackEvent::Stop {
                identity,
                position: 0.0,
            });
        }
    }

    /// Periodic sync with the active element: time updates while playing,
    /// end detection, and pauses that happened outside the coordinator.
    pub fn tick(&self) {
        let active = self
            .inner
            .borrow()
            .current
            .clone()
            .filter(|active| active.started);
        let Some(active) = active else {
            return;
        };

        let Some(element) = active.element.upgrade() else {
            self.inner.borrow_mut().current = None;
            self.emit(PlaybackEvent::Stop {
                identity: active.identity,
                position: 0.0,
            });
            return;
        };

        if element.ended() {
            self.finish_ended(&element);
        } else if element.paused() {
            debug!(target: LOG_TARGET, "{} paused outside the coordinator", active.identity);
            self.pause();
        } else {
            self.emit(PlaybackEvent::TimeUpdate {
                identity: active.identity,
                position: element.current_time(),
            });
        }
    }

    /// Emit `tick`s at the configured interval until disposed or restarted.
    pub async fn run_ticker(&self) {
        let (generation, interval) = {
            let mut inner = self.inner.borrow_mut();
            inner.ticker_generation += 1;
            (inner.ticker_generation, inner.config.time_update_interval)
        };
        let weak = Rc::downgrade(&self.inner);

        loop {
            sleep(interval).await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            {
                let state = inner.borrow();
                if state.disposed || state.ticker_generation != generation {
                    break;
                }
            }
            PlaybackCoordinator { inner }.tick();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.inner
            .borrow()
            .current
            .as_ref()
            .filter(|active| active.started)
            .and_then(|active| active.element.upgrade())
            .map(|element| !element.paused())
            .unwrap_or(false)
    }

    pub fn active_identity(&self) -> Option<PlaybackIdentity> {
        self.inner
            .borrow()
            .current
            .as_ref()
            .filter(|active| active.element.strong_count() > 0)
            .map(|active| active.identity.clone())
    }

    fn active_element(&self) -> Option<Rc<dyn MediaElement>> {
        let inner = self.inner.borrow();
        inner
            .current
            .as_ref()
            .or(inner.resumable.as_ref())
            .and_then(|active| active.element.upgrade())
    }

    pub fn current_time(&self) -> f64 {
        self.inner
            .borrow()
            .current
            .as_ref()
            .and_then(|active| active.element.upgrade())
            .map(|element| element.current_time())
            .unwrap_or(0.0)
    }

    pub fn duration(&self) -> f64 {
        self.inner
            .borrow()
            .current
            .as_ref()
            .and_then(|active| active.element.upgrade())
            .map(|element| element.duration())
            .unwrap_or(0.0)
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            is_playing: self.is_playing(),
            current_time: self.current_time(),
            duration: self.duration(),
            identity: self.active_identity(),
        }
    }

    /// Full event stream.
    pub fn add_event_listener(&self, listener: impl Fn(&PlaybackEvent) + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        inner.next_listener_id += 1;
        let id = inner.next_listener_id;
        inner.event_listeners.push((id, Rc::new(listener)));
        Subscription {
            inner: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Playing/not-playing changes only.
    pub fn subscribe(&self, listener: impl Fn(bool) + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        inner.next_listener_id += 1;
        let id = inner.next_listener_id;
        inner.state_listeners.push((id, Rc::new(listener)));
        Subscription {
            inner: Rc::downgrade(&self.inner),
            id,
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        let listeners: Vec<EventListener> = self
            .inner
            .borrow()
            .event_listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
        self.publish_playing_state();
    }

    fn publish_playing_state(&self) {
        let playing = self.is_playing();
        let listeners: Vec<StateListener> = {
            let mut inner = self.inner.borrow_mut();
            if inner.last_published_playing == playing {
                return;
            }
            inner.last_published_playing = playing;
            inner
                .state_listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect()
        };
        for listener in listeners {
            listener(playing);
        }
    }

    /// Enable keyboard shortcuts (and on the web, attach the document listener).
    pub fn init(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.shortcuts_enabled {
                return;
            }
            inner.shortcuts_enabled = true;
        }
        #[cfg(target_arch = "wasm32")]
        self.attach_key_listener();
    }

    /// Disable keyboard shortcuts and detach the document listener.
    pub fn destroy(&self) {
        self.inner.borrow_mut().shortcuts_enabled = false;
        #[cfg(target_arch = "wasm32")]
        self.detach_key_listener();
    }

    /// Apply a shortcut. Returns whether the key was consumed.
    pub async fn handle_key(&self, press: &KeyPress) -> bool {
        let (enabled, step) = {
            let inner = self.inner.borrow();
            (inner.shortcuts_enabled, inner.config.seek_step_secs)
        };
        if !enabled {
            return false;
        }
        match shortcut_action(press, step) {
            Some(ShortcutAction::TogglePlay) => {
                if let Err(err) = self.toggle().await {
                    warn!(target: LOG_TARGET, "shortcut toggle failed: {err}");
                }
                true
            }
            Some(ShortcutAction::SeekBy(delta)) => {
                self.seek_by(delta);
                true
            }
            None => false,
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn attach_key_listener(&self) {
        let Some(doc) = window().and_then(|w| w.document()) else {
            return;
        };
        let weak = Rc::downgrade(&self.inner);
        let key_cb = Closure::wrap(Box::new(move |event: KeyboardEvent| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let Some(press) = KeyPress::from_keyboard_event(&event) else {
                return;
            };
            if shortcut_action(&press, 0.0).is_none() {
                return;
            }
            event.prevent_default();
            let coordinator = PlaybackCoordinator { inner };
            wasm_bindgen_futures::spawn_local(async move {
                coordinator.handle_key(&press).await;
            });
        }) as Box<dyn FnMut(KeyboardEvent)>);
        let _ = doc.add_event_listener_with_callback("keydown", key_cb.as_ref().unchecked_ref());
        self.inner.borrow_mut().key_listener = Some(key_cb);
    }

    #[cfg(target_arch = "wasm32")]
    fn detach_key_listener(&self) {
        let Some(key_cb) = self.inner.borrow_mut().key_listener.take() else {
            return;
        };
        if let Some(doc) = window().and_then(|w| w.document()) {
            let _ = doc
                .remove_event_listener_with_callback("keydown", key_cb.as_ref().unchecked_ref());
        }
    }

    /// Tear down: stop playback, detach shortcuts, end the ticker and drop
    /// every listener.
    pub fn dispose(&self) {
        self.destroy();
        self.stop();
        let mut inner = self.inner.borrow_mut();
        inner.disposed = true;
        inner.event_listeners.clear();
        inner.state_listeners.clear();
        inner.cart = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::audio_manager::types::PlaybackEventKind;
    use crate::test_support::{FakeMedia, ManualClock};
    use std::cell::Cell;

    fn coordinator() -> (Rc<ManualClock>, PlaybackCoordinator) {
        let clock = Rc::new(ManualClock::new(1_000_000));
        let coordinator = PlaybackCoordinator::new(CoordinatorConfig::default(), clock.clone());
        (clock, coordinator)
    }

    fn record_events(coordinator: &PlaybackCoordinator) -> (Rc<RefCell<Vec<PlaybackEvent>>>, Subscription) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let subscription = coordinator.add_event_listener(move |event| sink.borrow_mut().push(event.clone()));
        (events, subscription)
    }

    fn id(stem: &str) -> PlaybackIdentity {
        PlaybackIdentity::stem("track-1", stem)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn at_most_one_element_plays() {
        let (_clock, coordinator) = coordinator();
        let x = FakeMedia::new(60.0);
        let y = FakeMedia::new(60.0);
        let z = FakeMedia::new(60.0);
        let handles: Vec<Rc<dyn MediaElement>> = vec![x.handle(), y.handle(), z.handle()];
        let fakes = [&x, &y, &z];

        for (index, handle) in handles.iter().enumerate() {
            fakes[index].set_position(12.0);
            coordinator
                .play(handle, id(&format!("stem-{index}")))
                .await
                .unwrap();

            let unpaused: Vec<usize> = fakes
                .iter()
                .enumerate()
                .filter(|(_, fake)| !fake.paused())
                .map(|(i, _)| i)
                .collect();
            assert_eq!(unpaused, vec![index]);
            for earlier in fakes.iter().take(index) {
                assert_eq!(earlier.current_time(), 0.0);
            }
        }
        assert_eq!(coordinator.active_identity(), Some(id("stem-2")));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn play_emits_stop_for_previous_then_play() {
        let (_clock, coordinator) = coordinator();
        let (events, _subscription) = record_events(&coordinator);
        let a = FakeMedia::new(30.0);
        let b = FakeMedia::new(30.0);

        coordinator.play(&a.handle(), id("a")).await.unwrap();
        events.borrow_mut().clear();
        coordinator.play(&b.handle(), id("b")).await.unwrap();

        let kinds: Vec<(PlaybackEventKind, PlaybackIdentity)> = events
            .borrow()
            .iter()
            .map(|event| (event.kind(), event.identity().clone()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (PlaybackEventKind::Stop, id("a")),
                (PlaybackEventKind::Play, id("b")),
            ]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn first_play_emits_only_play() {
        let (_clock, coordinator) = coordinator();
        let (events, _subscription) = record_events(&coordinator);
        let b = FakeMedia::new(30.0);
        coordinator.play(&b.handle(), id("b")).await.unwrap();
        let kinds: Vec<PlaybackEventKind> = events.borrow().iter().map(PlaybackEvent::kind).collect();
        assert_eq!(kinds, vec![PlaybackEventKind::Play]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn time_updates_carry_the_playing_identity() {
        let (_clock, coordinator) = coordinator();
        let a = FakeMedia::new(30.0);
        let b = FakeMedia::new(30.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        coordinator.play(&b.handle(), id("b")).await.unwrap();

        let (events, _subscription) = record_events(&coordinator);
        for step in 1..=4 {
            b.set_position(step as f64 * 0.25);
            coordinator.tick();
        }

        let events = events.borrow();
        assert_eq!(events.len(), 4);
        assert!(events
            .iter()
            .all(|event| event.kind() == PlaybackEventKind::TimeUpdate && event.identity() == &id("b")));
        assert_eq!(events[3].position(), 1.0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rejected_play_clears_active_and_reports() {
        let (_clock, coordinator) = coordinator();
        let (events, _subscription) = record_events(&coordinator);
        let blocked = FakeMedia::rejecting(30.0, "NotAllowedError");

        let result = coordinator.play(&blocked.handle(), id("a")).await;
        assert_eq!(
            result,
            Err(PlaybackError::Rejected("NotAllowedError".to_string()))
        );
        assert!(!coordinator.is_playing());
        assert_eq!(coordinator.active_identity(), None);
        assert!(events.borrow().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn pending_play_claims_before_it_settles() {
        let (_clock, coordinator) = coordinator();
        let (events, _subscription) = record_events(&coordinator);
        let a = FakeMedia::deferred(30.0);
        let a_handle = a.handle();

        let (result, ()) = futures_util::future::join(coordinator.play(&a_handle, id("a")), async {
            assert_eq!(coordinator.active_identity(), Some(id("a")));
            assert!(events.borrow().is_empty(), "no play event before the element starts");
            assert!(a.resolve_play());
        })
        .await;

        assert_eq!(result, Ok(()));
        assert!(coordinator.is_playing());
        let kinds: Vec<PlaybackEventKind> = events.borrow().iter().map(PlaybackEvent::kind).collect();
        assert_eq!(kinds, vec![PlaybackEventKind::Play]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn superseded_pending_play_is_not_an_error() {
        let (_clock, coordinator) = coordinator();
        let (events, _subscription) = record_events(&coordinator);
        let a = FakeMedia::deferred(30.0);
        let b = FakeMedia::new(30.0);
        let a_handle = a.handle();
        let b_handle = b.handle();

        let (first, second) = futures_util::future::join(
            coordinator.play(&a_handle, id("a")),
            coordinator.play(&b_handle, id("b")),
        )
        .await;

        assert_eq!(first, Ok(()), "aborted start of a replaced element is swallowed");
        assert_eq!(second, Ok(()));
        assert!(a.paused());
        assert!(!b.paused());
        assert_eq!(coordinator.active_identity(), Some(id("b")));
        assert!(coordinator.is_playing());
        let kinds: Vec<(PlaybackEventKind, PlaybackIdentity)> = events
            .borrow()
            .iter()
            .map(|event| (event.kind(), event.identity().clone()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (PlaybackEventKind::Stop, id("a")),
                (PlaybackEventKind::Play, id("b")),
            ]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stop_is_idempotent() {
        let (_clock, coordinator) = coordinator();
        let (events, _subscription) = record_events(&coordinator);
        coordinator.stop();
        coordinator.stop();
        assert!(events.borrow().is_empty());
        assert_eq!(coordinator.state(), PlaybackState::default());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stop_rewinds_and_clears() {
        let (_clock, coordinator) = coordinator();
        let a = FakeMedia::new(30.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        a.set_position(7.0);
        coordinator.stop();
        assert!(a.paused());
        assert_eq!(a.current_time(), 0.0);
        assert_eq!(coordinator.active_identity(), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn pause_keeps_position_and_toggle_resumes() {
        let (_clock, coordinator) = coordinator();
        let (events, _subscription) = record_events(&coordinator);
        let a = FakeMedia::new(30.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        a.set_position(9.0);

        coordinator.toggle().await.unwrap();
        assert!(a.paused());
        assert_eq!(a.current_time(), 9.0);
        assert_eq!(coordinator.active_identity(), None);

        coordinator.toggle().await.unwrap();
        assert!(!a.paused());
        assert_eq!(coordinator.active_identity(), Some(id("a")));

        let kinds: Vec<PlaybackEventKind> = events.borrow().iter().map(PlaybackEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![PlaybackEventKind::Play, PlaybackEventKind::Pause, PlaybackEventKind::Play]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cart_mutation_suppresses_play_for_the_window() {
        let (clock, coordinator) = coordinator();
        let a = FakeMedia::new(30.0);

        coordinator.note_cart_mutation();
        clock.advance(500);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        assert!(a.paused());
        assert_eq!(a.play_calls(), 0);
        assert!(!coordinator.is_playing());

        clock.advance(600);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        assert!(!a.paused());
        assert!(coordinator.is_playing());
    }

    struct StubCart(Cell<Option<i64>>);

    impl CartActivity for StubCart {
        fn last_mutation_ms(&self) -> Option<i64> {
            self.0.get()
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cart_activity_source_suppresses_toggle() {
        let (clock, coordinator) = coordinator();
        let cart = Rc::new(StubCart(Cell::new(None)));
        coordinator.set_cart_activity(cart.clone());
        let a = FakeMedia::new(30.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();

        cart.0.set(Some(clock.now_ms()));
        coordinator.toggle().await.unwrap();
        assert!(coordinator.is_playing(), "toggle inside the window is a no-op");

        clock.advance(1_001);
        coordinator.toggle().await.unwrap();
        assert!(!coordinator.is_playing());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn explicit_suppression_deadline() {
        let (clock, coordinator) = coordinator();
        coordinator.suppress_until(clock.now_ms() + 200);
        assert!(coordinator.is_suppressed());
        clock.advance(200);
        assert!(!coordinator.is_suppressed());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn tick_detects_end_and_rewinds() {
        let (_clock, coordinator) = coordinator();
        let (events, _subscription) = record_events(&coordinator);
        let a = FakeMedia::new(30.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        a.finish();

        coordinator.tick();
        assert_eq!(coordinator.active_identity(), None);
        assert_eq!(a.current_time(), 0.0);
        let last = events.borrow().last().cloned().unwrap();
        assert_eq!(last, PlaybackEvent::Ended { identity: id("a"), position: 30.0 });
    }

    #[tokio::test(flavor = "current_thread")]
    async fn complete_ignores_inactive_elements() {
        let (_clock, coordinator) = coordinator();
        let a = FakeMedia::new(30.0);
        let b = FakeMedia::new(30.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        coordinator.complete(&b.handle());
        assert_eq!(coordinator.active_identity(), Some(id("a")));
        coordinator.complete(&a.handle());
        assert_eq!(coordinator.active_identity(), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn tick_turns_external_pause_into_pause_event() {
        let (_clock, coordinator) = coordinator();
        let (events, _subscription) = record_events(&coordinator);
        let a = FakeMedia::new(30.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        a.handle().pause();

        coordinator.tick();
        assert_eq!(coordinator.active_identity(), None);
        assert_eq!(events.borrow().last().map(PlaybackEvent::kind), Some(PlaybackEventKind::Pause));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn dropped_element_is_never_referenced() {
        let (_clock, coordinator) = coordinator();
        let a = FakeMedia::new(30.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        drop(a);

        assert!(!coordinator.is_playing());
        assert_eq!(coordinator.active_identity(), None);
        coordinator.tick();
        assert_eq!(coordinator.state(), PlaybackState::default());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn release_stops_only_the_owned_element() {
        let (_clock, coordinator) = coordinator();
        let a = FakeMedia::new(30.0);
        let b = FakeMedia::new(30.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        coordinator.release(&b.handle());
        assert!(coordinator.is_playing());
        coordinator.release(&a.handle());
        assert!(!coordinator.is_playing());
        assert!(a.paused());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn boolean_subscribers_see_changes_only() {
        let (_clock, coordinator) = coordinator();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let subscription = coordinator.subscribe(move |playing| sink.borrow_mut().push(playing));
        let a = FakeMedia::new(30.0);
        let b = FakeMedia::new(30.0);

        coordinator.play(&a.handle(), id("a")).await.unwrap();
        coordinator.play(&b.handle(), id("b")).await.unwrap();
        coordinator.tick();
        coordinator.pause();
        assert_eq!(*seen.borrow(), vec![true, false, true, false]);

        drop(subscription);
        coordinator.toggle().await.unwrap();
        assert_eq!(seen.borrow().len(), 4);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn seek_is_clamped_and_announced() {
        let (_clock, coordinator) = coordinator();
        let (events, _subscription) = record_events(&coordinator);
        let a = FakeMedia::new(20.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();

        coordinator.seek(50.0);
        assert_eq!(a.current_time(), 20.0);
        coordinator.seek_by(-25.0);
        assert_eq!(a.current_time(), 0.0);
        assert_eq!(
            events.borrow().last().cloned(),
            Some(PlaybackEvent::TimeUpdate { identity: id("a"), position: 0.0 })
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn shortcuts_only_work_between_init_and_destroy() {
        let (_clock, coordinator) = coordinator();
        let a = FakeMedia::new(60.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        a.set_position(10.0);

        assert!(!coordinator.handle_key(&KeyPress::new("ArrowRight")).await);
        coordinator.init();
        assert!(coordinator.handle_key(&KeyPress::new("ArrowRight")).await);
        assert_eq!(a.current_time(), 15.0);
        assert!(coordinator.handle_key(&KeyPress::new(" ")).await);
        assert!(a.paused());

        let typing = KeyPress {
            in_editable: true,
            ..KeyPress::new(" ")
        };
        assert!(!coordinator.handle_key(&typing).await);
        assert!(a.paused());

        coordinator.destroy();
        assert!(!coordinator.handle_key(&KeyPress::new(" ")).await);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn listeners_may_reenter_the_coordinator() {
        let (_clock, coordinator) = coordinator();
        let observed = Rc::new(Cell::new(false));
        let probe = coordinator.clone();
        let flag = observed.clone();
        let _subscription = coordinator.add_event_listener(move |event| {
            if event.kind() == PlaybackEventKind::Play {
                flag.set(probe.is_playing());
            }
        });
        let a = FakeMedia::new(30.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        assert!(observed.get());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn dispose_stops_and_silences() {
        let (_clock, coordinator) = coordinator();
        let (events, subscription) = record_events(&coordinator);
        let a = FakeMedia::new(30.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();
        coordinator.dispose();
        assert!(a.paused());
        let count = events.borrow().len();
        coordinator.tick();
        assert_eq!(events.borrow().len(), count);
        drop(subscription);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn ticker_stops_after_dispose() {
        let clock = Rc::new(ManualClock::new(0));
        let config = CoordinatorConfig {
            time_update_interval: Duration::from_millis(5),
            ..CoordinatorConfig::default()
        };
        let coordinator = PlaybackCoordinator::new(config, clock);
        let (events, _subscription) = record_events(&coordinator);
        let a = FakeMedia::new(30.0);
        coordinator.play(&a.handle(), id("a")).await.unwrap();

        let ticker = coordinator.clone();
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let handle = tokio::task::spawn_local(async move { ticker.run_ticker().await });
                sleep(Duration::from_millis(40)).await;
                assert!(events
                    .borrow()
                    .iter()
                    .any(|event| event.kind() == PlaybackEventKind::TimeUpdate));
                coordinator.dispose();
                handle.await.unwrap();
            })
            .await;
    }
}
