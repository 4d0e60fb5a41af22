use dioxus::prelude::*;

mod api;
mod cache;
mod components;
mod db;
mod diagnostics;
mod platform;
#[cfg(test)]
mod test_support;
mod utils;

use components::AppShell;

const TAILWIND_CDN: &str = "https://cdn.tailwindcss.com";

fn main() {
    dioxus::launch(App);
}

#[component]
fn App() -> Element {
    rsx! {
        document::Title { "Stem Store" }
        // Theme color for mobile browsers
        document::Meta { name: "theme-color", content: "#10b981" }
        document::Meta { name: "mobile-web-app-capable", content: "yes" }
        document::Script { src: TAILWIND_CDN }

        AppShell {}
    }
}
