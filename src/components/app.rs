use crate::api::{pick_track, StemMetadata, TrackMetadata};
use crate::components::audio_manager::{PlaybackIdentity, PlaybackServices, Subscription};
use crate::components::{Cart, CartItem, Icon, StemPlayer};
use crate::db::open_default_store;
#[cfg(target_arch = "wasm32")]
use dioxus::core::{Runtime, RuntimeGuard};
use dioxus::prelude::*;
use std::rc::Rc;

/// Cart size, bumped on every cart change so buttons re-render.
#[derive(Clone, Copy)]
pub struct CartCountSignal(pub Signal<usize>);

fn stem_key(stem: &StemMetadata) -> Option<(String, String)> {
    let name = stem.name.clone().or_else(|| stem.alt_name.clone())?;
    let id = stem.id.clone().unwrap_or_else(|| name.to_lowercase());
    Some((id, name))
}

#[component]
pub fn AppShell() -> Element {
    let services = use_hook(|| PlaybackServices::bootstrap(open_default_store()));
    let cart = use_hook(|| {
        let cart = Rc::new(Cart::new(services.clock.clone()));
        services.coordinator.set_cart_activity(cart.clone());
        cart
    });
    let cart_count = use_signal(|| 0usize);
    let now_playing = use_signal(|| None::<PlaybackIdentity>);

    // Provide state via context
    use_context_provider(|| services.clone());
    use_context_provider(|| cart.clone());
    use_context_provider(|| CartCountSignal(cart_count));

    // Shortcuts and the time-update ticker live as long as the shell.
    use_hook({
        let coordinator = services.coordinator.clone();
        move || {
            coordinator.init();
            let ticker = coordinator.clone();
            spawn(async move {
                ticker.run_ticker().await;
            });
        }
    });

    let _now_playing_subscription = use_hook({
        let coordinator = services.coordinator.clone();
        move || {
            #[cfg(target_arch = "wasm32")]
            let runtime = Runtime::current();
            let probe = coordinator.clone();
            let subscription: Subscription = coordinator.subscribe(move |playing| {
                #[cfg(target_arch = "wasm32")]
                let _guard = RuntimeGuard::new(runtime.clone());
                let mut now_playing = now_playing;
                now_playing.set(if playing { probe.active_identity() } else { None });
            });
            Rc::new(subscription)
        }
    });

    {
        let coordinator = services.coordinator.clone();
        use_drop(move || coordinator.dispose());
    }

    let featured_title = services.settings.featured_track.clone();
    let featured = use_resource({
        let services = services.clone();
        move || {
            let api = services.api.clone();
            let title = featured_title.clone();
            async move {
                let title = title?;
                match api.tracks_by_title(&title).await {
                    Ok(tracks) => pick_track(&tracks, &title).cloned(),
                    Err(err) => {
                        tracing::warn!(target: "stemstore::app", "could not load {title:?}: {err}");
                        None
                    }
                }
            }
        }
    });

    let body = match &*featured.read() {
        None => rsx! {
            div { class: "flex justify-center py-12",
                Icon { name: "loader".to_string(), class: "w-6 h-6 text-zinc-400".to_string() }
            }
        },
        Some(None) => rsx! {
            p { class: "text-zinc-400 text-sm",
                "No featured track is configured or it could not be loaded."
            }
        },
        Some(Some(track)) => rsx! {
            TrackStems { track: track.clone() }
        },
    };
    let playing_label = now_playing().map(|identity| identity.to_string());
    let count = cart_count();

    rsx! {
        div { class: "min-h-screen bg-zinc-950 text-white",
            header { class: "flex items-center justify-between px-6 py-4 border-b border-zinc-800",
                h1 { class: "text-lg font-semibold tracking-tight", "Stem Store" }
                div { class: "flex items-center gap-4",
                    if let Some(label) = playing_label {
                        span { class: "text-xs text-emerald-400", "Now playing: {label}" }
                    }
                    div { class: "flex items-center gap-1 text-zinc-300",
                        Icon { name: "cart".to_string(), class: "w-5 h-5".to_string() }
                        span { class: "text-sm", "{count}" }
                    }
                }
            }
            main { class: "max-w-3xl mx-auto p-6",
                {body}
            }
        }
    }
}

#[component]
fn TrackStems(track: TrackMetadata) -> Element {
    let stems: Vec<(String, String)> = track.stems.iter().filter_map(stem_key).collect();

    rsx! {
        section { class: "flex flex-col gap-3",
            h2 { class: "text-2xl font-bold mb-2", "{track.title}" }
            if stems.is_empty() {
                p { class: "text-zinc-400 text-sm", "This track has no stems listed." }
            }
            for (stem_id , stem_name) in stems {
                div { key: "{stem_id}", class: "flex items-center gap-2",
                    div { class: "flex-1",
                        StemPlayer {
                            track_id: track.id.clone(),
                            track_title: track.title.clone(),
                            stem_id: stem_id.clone(),
                            stem_name: stem_name.clone(),
                        }
                    }
                    CartButton {
                        track_id: track.id.clone(),
                        stem_id: stem_id.clone(),
                        label: format!("{} - {}", track.title, stem_name),
                    }
                }
            }
        }
    }
}

/// Add/remove a stem from the cart
#[component]
fn CartButton(track_id: String, stem_id: String, label: String) -> Element {
    let cart = use_context::<Rc<Cart>>();
    let mut cart_count = use_context::<CartCountSignal>().0;
    // Subscribe to cart changes.
    let _ = cart_count();
    let in_cart = cart.contains(&track_id, Some(&stem_id));

    let on_click = {
        let cart = cart.clone();
        move |_| {
            cart.toggle(CartItem {
                track_id: track_id.clone(),
                stem_id: Some(stem_id.clone()),
                label: label.clone(),
            });
            cart_count.set(cart.len());
        }
    };

    rsx! {
        button {
            r#type: "button",
            class: if in_cart { "p-2 rounded-lg bg-emerald-500/20 text-emerald-300 hover:bg-emerald-500/30 transition-colors" } else { "p-2 rounded-lg bg-zinc-800 text-zinc-300 hover:text-white transition-colors" },
            title: if in_cart { "Remove from cart" } else { "Add to cart" },
            onclick: on_click,
            if in_cart {
                Icon { name: "check".to_string(), class: "w-4 h-4".to_string() }
            } else {
                Icon { name: "plus".to_string(), class: "w-4 h-4".to_string() }
            }
        }
    }
}
