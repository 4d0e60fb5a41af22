//! Lightweight existence checks for guessed media URLs.

use crate::api::HTTP_CLIENT;
use futures_util::future::LocalBoxFuture;

pub trait UrlProber {
    /// `true` when a HEAD request for `url` answers with a success status.
    fn exists<'a>(&'a self, url: &'a str) -> LocalBoxFuture<'a, bool>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpProber;

impl UrlProber for HttpProber {
    fn exists<'a>(&'a self, url: &'a str) -> LocalBoxFuture<'a, bool> {
        Box::pin(async move {
            match HTTP_CLIENT.head(url).send().await {
                Ok(response) => response.status().is_success(),
                Err(err) => {
                    tracing::debug!(target: "stemstore::resolver", "probe failed for {url}: {err}");
                    false
                }
            }
        })
    }
}
