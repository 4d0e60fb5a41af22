//! The components module contains the playback core and the storefront UI built on it.

mod app;
pub mod audio_manager;
mod cart;
mod icons;
mod player;

pub use app::*;
pub use cart::*;
pub use icons::*;
pub use player::*;
