// Global keyboard shortcuts: space toggles, arrows seek.
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsCast;
#[cfg(target_arch = "wasm32")]
use web_sys::KeyboardEvent;

/// Platform-neutral key press.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyPress {
    pub key: String,
    pub code: String,
    pub ctrl: bool,
    pub meta: bool,
    pub alt: bool,
    /// Focus is inside an input, textarea, select or contenteditable element.
    pub in_editable: bool,
}

impl KeyPress {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShortcutAction {
    TogglePlay,
    SeekBy(f64),
}

pub fn shortcut_action(press: &KeyPress, seek_step: f64) -> Option<ShortcutAction> {
    if press.in_editable || press.ctrl || press.meta || press.alt {
        return None;
    }

    if press.key == " " || press.key == "Spacebar" || press.code == "Space" {
        return Some(ShortcutAction::TogglePlay);
    }
    if press.key == "ArrowRight" {
        return Some(ShortcutAction::SeekBy(seek_step));
    }
    if press.key == "ArrowLeft" {
        return Some(ShortcutAction::SeekBy(-seek_step));
    }

    None
}

#[cfg(target_arch = "wasm32")]
fn is_editable_shortcut_target(event: &KeyboardEvent) -> bool {
    let Some(target) = event.target() else {
        return false;
    };

    let mut current = target.dyn_into::<web_sys::Element>().ok();
    while let Some(element) = current {
        let tag = element.tag_name().to_ascii_lowercase();
        if tag == "input" || tag == "textarea" || tag == "select" {
            return true;
        }
        if element.has_attribute("contenteditable")
            && element
                .get_attribute("contenteditable")
                .map(|v| v.to_ascii_lowercase() != "false")
                .unwrap_or(true)
        {
            return true;
        }
        current = element.parent_element();
    }

    false
}

#[cfg(target_arch = "wasm32")]
impl KeyPress {
    /// `None` for events another handler already consumed or IME composition.
    pub fn from_keyboard_event(event: &KeyboardEvent) -> Option<Self> {
        if event.default_prevented() || event.is_composing() {
            return None;
        }
        Some(Self {
            key: event.key(),
            code: event.code(),
            ctrl: event.ctrl_key(),
            meta: event.meta_key(),
            alt: event.alt_key(),
            in_editable: is_editable_shortcut_target(event),
        })
    }
}
