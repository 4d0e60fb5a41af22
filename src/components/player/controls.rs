use crate::components::Icon;
use crate::utils::format_time;
use dioxus::prelude::*;

/// Play/pause button - spinner while the stem is still loading
#[component]
pub(super) fn PlayPauseButton(
    playing: bool,
    busy: bool,
    disabled: bool,
    ontoggle: EventHandler<MouseEvent>,
) -> Element {
    let class = if disabled {
        "w-10 h-10 rounded-full bg-zinc-700 flex items-center justify-center cursor-not-allowed opacity-60"
    } else {
        "w-10 h-10 rounded-full bg-white flex items-center justify-center hover:scale-105 transition-transform shadow-lg"
    };

    rsx! {
        button {
            r#type: "button",
            class: "{class}",
            disabled: disabled || busy,
            aria_label: if playing { "Pause" } else { "Play" },
            onclick: move |evt| ontoggle.call(evt),
            if busy {
                Icon { name: "loader".to_string(), class: "w-5 h-5 text-black".to_string() }
            } else if playing {
                Icon {
                    name: "pause".to_string(),
                    class: "w-5 h-5 text-black".to_string(),
                }
            } else {
                Icon {
                    name: "play".to_string(),
                    class: "w-5 h-5 text-black ml-0.5".to_string(),
                }
            }
        }
    }
}

/// Seek bar with elapsed and total time
#[component]
pub(super) fn SeekBar(
    current_time: f64,
    duration: f64,
    disabled: bool,
    onseek: EventHandler<f64>,
) -> Element {
    let percent = if duration > 0.0 {
        (current_time / duration * 100.0).round().clamp(0.0, 100.0) as i32
    } else {
        0
    };

    let on_seek_input = move |e: Event<FormData>| {
        if duration <= 0.0 {
            return;
        }
        if let Ok(percent) = e.value().parse::<f64>() {
            onseek.call(percent.clamp(0.0, 100.0) / 100.0 * duration);
        }
    };

    rsx! {
        div { class: "flex items-center gap-2 md:gap-3 w-full",
            span { class: "text-xs text-zinc-500 w-10 text-right", {format_time(current_time)} }
            input {
                r#type: "range",
                min: "0",
                max: "100",
                disabled: disabled || duration <= 0.0,
                value: percent,
                class: "flex-1 h-1.5 bg-zinc-800 rounded-full appearance-none cursor-pointer accent-emerald-500",
                oninput: on_seek_input,
            }
            span { class: "text-xs text-zinc-500 w-10",
                {if duration > 0.0 { format_time(duration) } else { "--:--".to_string() }}
            }
        }
    }
}
