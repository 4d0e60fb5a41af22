//! External collaborators of the playback core: the CMS content API, CDN URL
//! rewriting and HTTP existence probes.

pub mod cdn;
pub mod content;
pub mod models;
pub mod probe;

pub use cdn::CdnRewriter;
pub use content::{pick_track, CmsClient, ContentApi, ContentApiError};
pub use models::*;
pub use probe::{HttpProber, UrlProber};

use once_cell::sync::Lazy;

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);
