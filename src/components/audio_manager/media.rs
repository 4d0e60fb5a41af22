// Media element abstraction: the browser <audio> element on the web, and a
// clock-driven simulated element for degraded previews and native builds.
use super::types::PlaybackError;
use crate::platform::Clock;
use crate::utils::{clamp_position, finite_or_zero};
use futures_util::future::{self, LocalBoxFuture};
use std::cell::RefCell;
use std::rc::Rc;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::{closure::Closure, JsCast};
#[cfg(target_arch = "wasm32")]
use web_sys::HtmlAudioElement;

/// One playable media element. Owned by exactly one player; the coordinator
/// only ever holds a `Weak` to it.
pub trait MediaElement {
    /// Start playback. The native play call is issued before this returns;
    /// the future settles once the element has actually started or refused.
    fn play(&self) -> LocalBoxFuture<'static, Result<(), PlaybackError>>;
    fn pause(&self);
    fn current_time(&self) -> f64;
    fn set_current_time(&self, seconds: f64);
    /// Duration in seconds, `0` while unknown.
    fn duration(&self) -> f64;
    fn paused(&self) -> bool;
    fn ended(&self) -> bool;
    fn src(&self) -> String;

    /// Simulated elements advance on a timer without producing audio.
    fn is_simulated(&self) -> bool {
        false
    }

    /// Detach listeners and drop the source. Called once by the owner on teardown.
    fn release(&self) {}
}

/// Lifecycle signals raised by an element after creation.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSignal {
    /// Duration is known. With `preload="metadata"` some browsers stop here
    /// until a user gesture, so this alone makes the element playable.
    MetadataLoaded { duration: f64 },
    CanPlay { duration: f64 },
    LoadError(String),
    Ended,
}

pub type MediaSignalSink = Rc<dyn Fn(MediaSignal)>;

pub trait MediaElementFactory {
    /// Create an element for `url`. Signals are delivered asynchronously to `sink`.
    fn create(
        &self,
        url: &str,
        sink: MediaSignalSink,
    ) -> Result<Rc<dyn MediaElement>, PlaybackError>;
}

#[derive(Debug, Default)]
struct SimulatedState {
    offset: f64,
    started_at_ms: Option<i64>,
}

/// Timer-driven stand-in for a real element. Position advances with the clock
/// while playing and stops at `duration`.
pub struct SimulatedMedia {
    src: String,
    duration: f64,
    clock: Rc<dyn Clock>,
    state: RefCell<SimulatedState>,
}

impl SimulatedMedia {
    pub fn new(src: impl Into<String>, duration: f64, clock: Rc<dyn Clock>) -> Self {
        Self {
            src: src.into(),
            duration: finite_or_zero(duration).max(0.0),
            clock,
            state: RefCell::new(SimulatedState::default()),
        }
    }

    fn position(&self) -> f64 {
        let state = self.state.borrow();
        let running = state
            .started_at_ms
            .map(|started| (self.clock.now_ms() - started).max(0) as f64 / 1000.0)
            .unwrap_or(0.0);
        (state.offset + running).min(self.duration)
    }
}

impl MediaElement for SimulatedMedia {
    fn play(&self) -> LocalBoxFuture<'static, Result<(), PlaybackError>> {
        if self.duration <= 0.0 {
            return Box::pin(future::ready(Err(PlaybackError::Rejected(
                "simulated media has no duration".to_string(),
            ))));
        }
        let position = self.position();
        let mut state = self.state.borrow_mut();
        state.offset = if position >= self.duration { 0.0 } else { position };
        state.started_at_ms = Some(self.clock.now_ms());
        Box::pin(future::ready(Ok(())))
    }

    fn pause(&self) {
        let position = self.position();
        let mut state = self.state.borrow_mut();
        state.offset = position;
        state.started_at_ms = None;
    }

    fn current_time(&self) -> f64 {
        self.position()
    }

    fn set_current_time(&self, seconds: f64) {
        let target = clamp_position(seconds, self.duration);
        let now = self.clock.now_ms();
        let mut state = self.state.borrow_mut();
        state.offset = target;
        if state.started_at_ms.is_some() {
            state.started_at_ms = Some(now);
        }
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn paused(&self) -> bool {
        self.state.borrow().started_at_ms.is_none() || self.ended()
    }

    fn ended(&self) -> bool {
        self.duration > 0.0 && self.position() >= self.duration
    }

    fn src(&self) -> String {
        self.src.clone()
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Builds simulated elements of a fixed length.
pub struct SimulatedMediaFactory {
    clock: Rc<dyn Clock>,
    duration: f64,
}

impl SimulatedMediaFactory {
    pub fn new(clock: Rc<dyn Clock>, duration: f64) -> Self {
        Self { clock, duration }
    }
}

impl MediaElementFactory for SimulatedMediaFactory {
    fn create(
        &self,
        url: &str,
        _sink: MediaSignalSink,
    ) -> Result<Rc<dyn MediaElement>, PlaybackError> {
        Ok(Rc::new(SimulatedMedia::new(
            url,
            self.duration,
            self.clock.clone(),
        )))
    }
}

/// Simulated preview length when the real duration is unknown.
pub const SIMULATED_PREVIEW_SECS: f64 = 30.0;

/// The element factory for the current platform.
#[cfg(target_arch = "wasm32")]
pub fn default_media_factory(_clock: Rc<dyn Clock>) -> Rc<dyn MediaElementFactory> {
    Rc::new(WebAudioFactory)
}

#[cfg(not(target_arch = "wasm32"))]
pub fn default_media_factory(clock: Rc<dyn Clock>) -> Rc<dyn MediaElementFactory> {
    Rc::new(SimulatedMediaFactory::new(clock, SIMULATED_PREVIEW_SECS))
}

#[cfg(target_arch = "wasm32")]
fn js_error_message(value: &wasm_bindgen::JsValue) -> String {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    value
        .as_string()
        .unwrap_or_else(|| "unknown media error".to_string())
}

#[cfg(target_arch = "wasm32")]
fn media_error_message(audio: &HtmlAudioElement) -> String {
    let code = audio.error().map(|err| err.code()).unwrap_or(0);
    match code {
        1 => "Playback was aborted before the audio loaded.".to_string(),
        2 => "Network error while loading this stem.".to_string(),
        3 => "Audio playback failed due to a decode error.".to_string(),
        4 => "Failed to load audio because no supported source was found.".to_string(),
        _ => "Unable to load this audio source.".to_string(),
    }
}

/// `<audio>` element wrapper with its DOM listeners.
#[cfg(target_arch = "wasm32")]
pub struct WebAudioElement {
    audio: HtmlAudioElement,
    listeners: RefCell<Vec<(&'static str, Closure<dyn FnMut()>)>>,
}

#[cfg(target_arch = "wasm32")]
impl WebAudioElement {
    fn listen(&self, event: &'static str, callback: Closure<dyn FnMut()>) {
        let _ = self
            .audio
            .add_event_listener_with_callback(event, callback.as_ref().unchecked_ref());
        self.listeners.borrow_mut().push((event, callback));
    }
}

#[cfg(target_arch = "wasm32")]
impl MediaElement for WebAudioElement {
    fn play(&self) -> LocalBoxFuture<'static, Result<(), PlaybackError>> {
        match self.audio.play() {
            Ok(promise) => Box::pin(async move {
                wasm_bindgen_futures::JsFuture::from(promise)
                    .await
                    .map(|_| ())
                    .map_err(|err| PlaybackError::Rejected(js_error_message(&err)))
            }),
            Err(err) => Box::pin(future::ready(Err(PlaybackError::Rejected(
                js_error_message(&err),
            )))),
        }
    }

    fn pause(&self) {
        let _ = self.audio.pause();
    }

    fn current_time(&self) -> f64 {
        finite_or_zero(self.audio.current_time())
    }

    fn set_current_time(&self, seconds: f64) {
        self.audio
            .set_current_time(clamp_position(seconds, self.duration()));
    }

    fn duration(&self) -> f64 {
        finite_or_zero(self.audio.duration()).max(0.0)
    }

    fn paused(&self) -> bool {
        self.audio.paused()
    }

    fn ended(&self) -> bool {
        self.audio.ended()
    }

    fn src(&self) -> String {
        self.audio.src()
    }

    fn release(&self) {
        let _ = self.audio.pause();
        for (event, callback) in self.listeners.borrow_mut().drain(..) {
            let _ = self
                .audio
                .remove_event_listener_with_callback(event, callback.as_ref().unchecked_ref());
        }
        let _ = self.audio.remove_attribute("src");
        self.audio.load();
    }
}

#[cfg(target_arch = "wasm32")]
pub struct WebAudioFactory;

#[cfg(target_arch = "wasm32")]
impl MediaElementFactory for WebAudioFactory {
    fn create(
        &self,
        url: &str,
        sink: MediaSignalSink,
    ) -> Result<Rc<dyn MediaElement>, PlaybackError> {
        let audio = HtmlAudioElement::new_with_src(url)
            .map_err(|err| PlaybackError::Rejected(js_error_message(&err)))?;
        // Stream on demand instead of buffering whole stems.
        let _ = audio.set_attribute("preload", "metadata");

        let element = Rc::new(WebAudioElement {
            audio: audio.clone(),
            listeners: RefCell::new(Vec::new()),
        });

        {
            let sink = sink.clone();
            let audio = audio.clone();
            element.listen(
                "loadedmetadata",
                Closure::wrap(Box::new(move || {
                    sink(MediaSignal::MetadataLoaded {
                        duration: finite_or_zero(audio.duration()).max(0.0),
                    })
                }) as Box<dyn FnMut()>),
            );
        }
        {
            let sink = sink.clone();
            let audio = audio.clone();
            element.listen(
                "canplay",
                Closure::wrap(Box::new(move || {
                    sink(MediaSignal::CanPlay {
                        duration: finite_or_zero(audio.duration()).max(0.0),
                    })
                }) as Box<dyn FnMut()>),
            );
        }
        {
            let sink = sink.clone();
            let audio = audio.clone();
            element.listen(
                "error",
                Closure::wrap(Box::new(move || {
                    sink(MediaSignal::LoadError(media_error_message(&audio)))
                }) as Box<dyn FnMut()>),
            );
        }
        element.listen(
            "ended",
            Closure::wrap(Box::new(move || sink(MediaSignal::Ended)) as Box<dyn FnMut()>),
        );

        Ok(element)
    }
}
