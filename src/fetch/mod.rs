//! Network side of license resolution.
//!
//! - [`classifier`]: pure URL rules: how to fetch and where the text belongs.
//! - [`html`]: element extraction and body flattening.
//! - [`spdx`]: license texts by SPDX identifier from spdx.org.

pub mod classifier;
pub mod html;
pub mod spdx;
#[cfg(test)]
pub(crate) mod test_server;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use reqwest::{Client, Response};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::config::FetchConfig;
use crate::error::ResolveError;
use classifier::{classify, FetchContext, LicenseSource};

/// Selector name reported when flattening a page yields no text.
const FLATTEN_SELECTOR: &str = "body";

/// Redirect target per checked URL (`None`: no redirect, or the request failed).
type RedirectTable = HashMap<Url, Arc<OnceCell<Option<Url>>>>;

/// Classified URL, ready to be fetched.
#[derive(Debug)]
pub struct FetchPlan {
    /// URL as referenced by the package.
    pub origin: Url,
    pub source: LicenseSource,
    /// Response of the redirect check, reused instead of a second request.
    pub response: Option<Response>,
}

/// Shared HTTP client plus the classification pipeline.
#[derive(Debug, Clone)]
pub struct LicenseFetcher {
    client: Client,
    follow_redirects: bool,
    redirects: Arc<Mutex<RedirectTable>>,
}

impl LicenseFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(LicenseFetcher {
            client,
            follow_redirects: config.follow_redirects,
            redirects: Arc::default(),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Classify `url` without touching the network, updating `ctx.dest` when
    /// the rules move the file.
    pub fn classify(&self, url: &Url, ctx: &mut FetchContext) -> FetchPlan {
        FetchPlan {
            origin: url.clone(),
            source: classify(url, ctx),
            response: None,
        }
    }

    /// Give an unrecognized plan one chance through its redirect target.
    ///
    /// Each URL is requested at most once per run. When it redirects, the final
    /// URL is classified instead; the caller that issued the request keeps
    /// the response for the fetch.
    pub async fn follow_redirect(&self, plan: FetchPlan, ctx: &mut FetchContext) -> FetchPlan {
        if plan.source != LicenseSource::Unrecognized || !self.follow_redirects {
            return plan;
        }

        let (target, response) = self.redirect_target(&plan.origin).await;
        match target {
            Some(target) => FetchPlan {
                source: classify(&target, ctx),
                response,
                ..plan
            },
            None => plan,
        }
    }

    async fn redirect_target(&self, url: &Url) -> (Option<Url>, Option<Response>) {
        let cell = Arc::clone(self.redirects.lock().entry(url.clone()).or_default());

        let mut kept = None;
        let slot = &mut kept;
        let target = cell
            .get_or_init(move || async move {
                match self.client.get(url.clone()).send().await {
                    Ok(response) if response.url() != url => {
                        let target = response.url().clone();
                        debug!(%url, %target, "license url redirects");
                        *slot = Some(response);
                        Some(target)
                    }
                    Ok(_) => None,
                    Err(e) => {
                        debug!(%url, error = %e, "redirect check failed");
                        None
                    }
                }
            })
            .await
            .clone();

        (target, kept)
    }

    /// Produce the license text described by `plan`.
    pub async fn fetch(&self, plan: FetchPlan) -> Result<String, ResolveError> {
        let FetchPlan {
            origin,
            source,
            response,
        } = plan;

        let (text, fetched_from) = match source {
            LicenseSource::File(url) => {
                let text = self.get_text(&url, response).await?;
                (text, url)
            }
            LicenseSource::HtmlElement { url, selector } => {
                let page = self.get_text(&url, response).await?;
                let text = html::select_text(&page, selector).ok_or_else(|| {
                    ResolveError::Extraction {
                        url: url.to_string(),
                        selector: selector.to_string(),
                    }
                })?;
                (text, url)
            }
            LicenseSource::HtmlFlatten(url) => {
                let page = self.get_text(&url, response).await?;
                let text = html::flatten(&page);
                if text.is_empty() {
                    return Err(ResolveError::Extraction {
                        url: url.to_string(),
                        selector: FLATTEN_SELECTOR.to_string(),
                    });
                }
                (text, url)
            }
            LicenseSource::Unrecognized => {
                return Err(ResolveError::UnrecognizedSource {
                    url: origin.to_string(),
                })
            }
        };

        if fetched_from == origin {
            info!("Download from {origin} OK!");
        } else {
            info!("Download from {origin} OK! (via {fetched_from})");
        }

        Ok(text)
    }

    /// Body of a successful GET, reusing `response` when the redirect check already has it.
    async fn get_text(&self, url: &Url, response: Option<Response>) -> Result<String, ResolveError> {
        let response = match response {
            Some(response) => response,
            None => self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| ResolveError::transport(url, e))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::transport(url, format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| ResolveError::transport(url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use classifier::OPENSOURCE_SELECTOR;
    use test_server::{Route, TestServer};

    fn fetcher(follow_redirects: bool) -> LicenseFetcher {
        let config = FetchConfig {
            follow_redirects,
            ..FetchConfig::default()
        };
        LicenseFetcher::new(&config).unwrap()
    }

    fn direct(url: &Url, source: LicenseSource) -> FetchPlan {
        FetchPlan {
            origin: url.clone(),
            source,
            response: None,
        }
    }

    #[tokio::test]
    async fn test_unrecognized_stays_unrecognized_when_not_following() {
        let fetcher = fetcher(false);
        let url = Url::parse("https://intranet.contoso.com/eula").unwrap();
        let mut ctx = FetchContext::new("/l/Pkg.1.0.0/license.url.txt", "/l");

        let plan = fetcher.classify(&url, &mut ctx);
        let plan = fetcher.follow_redirect(plan, &mut ctx).await;

        assert_eq!(plan.source, LicenseSource::Unrecognized);
        assert!(plan.response.is_none());
        assert_eq!(ctx.dest, PathBuf::from("/l/Pkg.1.0.0/license.url.txt"));
    }

    #[tokio::test]
    async fn test_fetch_unrecognized_names_the_origin() {
        let fetcher = fetcher(false);
        let url = Url::parse("https://intranet.contoso.com/eula").unwrap();
        let mut ctx = FetchContext::new("/l/x.txt", "/l");
        let plan = fetcher.classify(&url, &mut ctx);

        let err = fetcher.fetch(plan).await.unwrap_err();
        match err {
            ResolveError::UnrecognizedSource { url } => {
                assert_eq!(url, "https://intranet.contoso.com/eula")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recognized_url_needs_no_network() {
        let fetcher = fetcher(true);
        let url = Url::parse("https://opensource.org/licenses/MIT").unwrap();
        let mut ctx = FetchContext::new("/l/Pkg.1.0.0/license.url.txt", "/l");

        let plan = fetcher.classify(&url, &mut ctx);
        let plan = fetcher.follow_redirect(plan, &mut ctx).await;

        assert!(matches!(plan.source, LicenseSource::HtmlElement { .. }));
        assert!(plan.response.is_none());
        assert_eq!(ctx.dest, PathBuf::from("/l/opensource.org/MIT.txt"));
    }

    #[tokio::test]
    async fn test_http_error_status_is_transport() {
        let server = TestServer::start(vec![]).await;
        let url = server.url("/LICENSE");

        let err = fetcher(false)
            .fetch(direct(&url, LicenseSource::File(url.clone())))
            .await
            .unwrap_err();

        match err {
            ResolveError::Transport { url: failed, detail } => {
                assert_eq!(failed, url.to_string());
                assert!(detail.contains("404"), "{detail}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_plain_file_body_is_the_text() {
        let server = TestServer::start(vec![Route::ok("/LICENSE", "MIT License\n")]).await;
        let url = server.url("/LICENSE");

        let text = fetcher(false)
            .fetch(direct(&url, LicenseSource::File(url.clone())))
            .await
            .unwrap();

        assert_eq!(text, "MIT License\n");
    }

    #[tokio::test]
    async fn test_selected_element_text() {
        let server = TestServer::start(vec![Route::ok(
            "/licenses/MIT",
            r#"<html><body><nav>Menu</nav><div id="LicenseText"> MIT License </div></body></html>"#,
        )])
        .await;
        let url = server.url("/licenses/MIT");
        let source = LicenseSource::HtmlElement {
            url: url.clone(),
            selector: OPENSOURCE_SELECTOR,
        };

        let text = fetcher(false).fetch(direct(&url, source)).await.unwrap();

        assert_eq!(text, "MIT License");
    }

    #[tokio::test]
    async fn test_missing_element_is_extraction() {
        let server = TestServer::start(vec![Route::ok(
            "/licenses/MIT",
            "<html><body><p>Page moved</p></body></html>",
        )])
        .await;
        let url = server.url("/licenses/MIT");
        let source = LicenseSource::HtmlElement {
            url: url.clone(),
            selector: OPENSOURCE_SELECTOR,
        };

        let err = fetcher(false).fetch(direct(&url, source)).await.unwrap_err();

        assert!(matches!(err, ResolveError::Extraction { .. }));
        let message = err.to_string();
        assert!(message.contains(OPENSOURCE_SELECTOR), "{message}");
        assert!(message.contains(url.as_str()), "{message}");
    }

    #[tokio::test]
    async fn test_blank_page_flatten_is_extraction() {
        let server = TestServer::start(vec![Route::ok(
            "/license.htm",
            "<html><head><title>License</title></head><body><script>track()</script></body></html>",
        )])
        .await;
        let url = server.url("/license.htm");

        let err = fetcher(false)
            .fetch(direct(&url, LicenseSource::HtmlFlatten(url.clone())))
            .await
            .unwrap_err();

        match err {
            ResolveError::Extraction { selector, .. } => assert_eq!(selector, FLATTEN_SELECTOR),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_kept_response_is_not_requested_again() {
        let server = TestServer::start(vec![Route::ok("/LICENSE", "MIT License")]).await;
        let url = server.url("/LICENSE");
        let fetcher = fetcher(false);
        let response = fetcher.client().get(url.clone()).send().await.unwrap();
        assert_eq!(server.hits(), 1);

        let plan = FetchPlan {
            origin: url.clone(),
            source: LicenseSource::File(url.clone()),
            response: Some(response),
        };
        let text = fetcher.fetch(plan).await.unwrap();

        assert_eq!(text, "MIT License");
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_redirect_is_checked_once_per_url() {
        let server = TestServer::start(vec![
            Route::redirect("/eula", "/legal/eula.txt"),
            Route::ok("/legal/eula.txt", "Contoso EULA"),
        ])
        .await;
        let url = server.url("/eula");
        let fetcher = fetcher(true);

        let mut first = FetchContext::new("/l/A.1.0.0/license.url.txt", "/l");
        let plan = fetcher.classify(&url, &mut first);
        let plan = fetcher.follow_redirect(plan, &mut first).await;
        // redirect plus its target
        assert_eq!(server.hits(), 2);
        assert!(plan.response.is_some());
        assert_eq!(plan.origin, url);

        let mut second = FetchContext::new("/l/B.1.0.0/license.url.txt", "/l");
        let plan = fetcher.classify(&url, &mut second);
        let plan = fetcher.follow_redirect(plan, &mut second).await;
        assert_eq!(server.hits(), 2);
        assert!(plan.response.is_none());
        assert_eq!(plan.source, LicenseSource::Unrecognized);
    }

    #[tokio::test]
    async fn test_url_without_redirect_is_requested_once() {
        let server = TestServer::start(vec![Route::ok("/eula", "Contoso EULA")]).await;
        let url = server.url("/eula");
        let fetcher = fetcher(true);

        for package in ["A", "B", "C"] {
            let mut ctx = FetchContext::new(format!("/l/{package}.1.0.0/license.url.txt"), "/l");
            let plan = fetcher.classify(&url, &mut ctx);
            let plan = fetcher.follow_redirect(plan, &mut ctx).await;
            assert_eq!(plan.source, LicenseSource::Unrecognized);
            assert!(plan.response.is_none());
        }

        assert_eq!(server.hits(), 1);
    }
}
