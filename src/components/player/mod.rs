use crate::components::audio_manager::{PlaybackIdentity, PlaybackServices, SIMULATED_PREVIEW_SECS};
use crate::components::Icon;
#[cfg(target_arch = "wasm32")]
use dioxus::core::{Runtime, RuntimeGuard};
use dioxus::prelude::*;

mod controls;
mod view_model;

pub use view_model::{PlayerSnapshot, PlayerStatus, PlayerViewModel};

use controls::{PlayPauseButton, SeekBar};

/// One view model per component instance, mirrored into a signal.
#[derive(Clone)]
pub struct StemPlayerHandle {
    pub snapshot: Signal<PlayerSnapshot>,
    pub model: PlayerViewModel,
}

/// Create (once) the view model for `identity`, start resolving its URL and
/// dispose it when the component unmounts.
pub fn use_stem_player(
    identity: PlaybackIdentity,
    stem_name: String,
    track_title: String,
) -> StemPlayerHandle {
    let services = use_context::<PlaybackServices>();
    let snapshot = use_signal(PlayerSnapshot::default);

    let model = use_hook(move || {
        let model = PlayerViewModel::new(&services, identity, stem_name, track_title);
        // Media and keyboard callbacks fire outside the render cycle.
        #[cfg(target_arch = "wasm32")]
        let runtime = Runtime::current();
        model.set_on_change(move |next| {
            #[cfg(target_arch = "wasm32")]
            let _guard = RuntimeGuard::new(runtime.clone());
            let mut snapshot = snapshot;
            if *snapshot.peek() != *next {
                snapshot.set(next.clone());
            }
        });
        let loader = model.clone();
        spawn(async move {
            loader.load().await;
        });
        model
    });

    {
        let model = model.clone();
        use_drop(move || model.dispose());
    }

    StemPlayerHandle { snapshot, model }
}

/// Compact player row for a single stem of a track
#[component]
pub fn StemPlayer(
    track_id: String,
    track_title: String,
    stem_id: String,
    stem_name: String,
) -> Element {
    let services = use_context::<PlaybackServices>();
    let player = use_stem_player(
        PlaybackIdentity::stem(track_id, stem_id),
        stem_name.clone(),
        track_title.clone(),
    );
    let snapshot = (player.snapshot)();
    let can_simulate = services.settings.simulate_missing_media
        && !snapshot.simulated
        && matches!(snapshot.status, PlayerStatus::Errored | PlayerStatus::Unavailable);
    let unplayable = matches!(snapshot.status, PlayerStatus::Errored | PlayerStatus::Unavailable);
    let visible_error = snapshot.error.clone().filter(|_| !snapshot.simulated);

    let on_toggle = {
        let model = player.model.clone();
        move |_| {
            let model = model.clone();
            spawn(async move {
                model.toggle().await;
            });
        }
    };

    let on_seek = {
        let model = player.model.clone();
        move |seconds: f64| model.seek(seconds)
    };

    let on_simulate = {
        let model = player.model.clone();
        move |_| {
            model.enable_simulation(SIMULATED_PREVIEW_SECS);
        }
    };

    let row_class = if snapshot.is_playing {
        "flex items-center gap-3 p-3 rounded-xl bg-emerald-500/10 border border-emerald-500/40"
    } else {
        "flex items-center gap-3 p-3 rounded-xl bg-zinc-900/60 border border-zinc-800"
    };

    rsx! {
        div { class: "{row_class}", title: snapshot.status.label(),
            PlayPauseButton {
                playing: snapshot.is_playing,
                busy: snapshot.status.is_busy(),
                disabled: unplayable,
                ontoggle: on_toggle,
            }
            div { class: "flex-1 min-w-0 flex flex-col gap-1",
                div { class: "flex items-center gap-2",
                    span { class: "text-sm font-medium text-white truncate", "{stem_name}" }
                    if snapshot.simulated {
                        span {
                            class: "text-[10px] uppercase tracking-wide px-1.5 py-0.5 rounded bg-amber-500/20 text-amber-300",
                            title: "No audio file is available; progress is simulated.",
                            "Simulated preview"
                        }
                    }
                    if snapshot.status == PlayerStatus::Unavailable && !snapshot.simulated {
                        span { class: "text-[10px] uppercase tracking-wide px-1.5 py-0.5 rounded bg-zinc-700 text-zinc-300",
                            "Unavailable"
                        }
                    }
                }
                SeekBar {
                    current_time: snapshot.current_time,
                    duration: snapshot.duration,
                    disabled: unplayable,
                    onseek: on_seek,
                }
                if let Some(error) = visible_error {
                    p { class: "text-xs text-red-400 truncate", "{error}" }
                }
            }
            if can_simulate {
                button {
                    r#type: "button",
                    class: "p-2 text-zinc-400 hover:text-white transition-colors",
                    title: "Simulate playback",
                    onclick: on_simulate,
                    Icon { name: "wave".to_string(), class: "w-4 h-4".to_string() }
                }
            }
        }
    }
}
