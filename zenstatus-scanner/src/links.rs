//! Link probes: broken-link status checks and manual redirect tracing.

use crate::fetch::{FetchRequest, Fetcher};
use crate::record::RedirectHop;
use std::time::Duration;
use tracing::debug;
use url::Url;

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// Status of `url` after following redirects. HEAD first, GET when HEAD is
/// refused or fails; 0 when the link is unreachable.
pub async fn check_link_status(fetcher: &dyn Fetcher, url: &str, timeout: Duration) -> u16 {
    match fetcher.fetch(FetchRequest::head(url, timeout)).await {
        Ok(response) if response.status < 400 => return response.status,
        Ok(response) => debug!("HEAD {} returned {}, retrying with GET", url, response.status),
        Err(e) => debug!("HEAD {} failed: {}", url, e),
    }
    match fetcher.fetch(FetchRequest::get(url, timeout)).await {
        Ok(response) => response.status,
        Err(e) => {
            debug!("GET {} failed: {}", url, e);
            0
        }
    }
}

/// Walk the redirect chain of `url` hop by hop without following.
///
/// Every response is recorded, the final non-redirect one included. A hop
/// that cannot be fetched is recorded with status 0 and ends the walk.
pub async fn redirect_chain(
    fetcher: &dyn Fetcher,
    url: &str,
    timeout: Duration,
    max_redirects: usize,
) -> Vec<RedirectHop> {
    let mut chain = Vec::new();
    let mut current = url.to_string();

    for _ in 0..max_redirects {
        let request = FetchRequest::head(current.clone(), timeout).with_follow_redirects(false);
        let response = match fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!("redirect probe {} failed: {}", current, e);
                chain.push(RedirectHop {
                    url: current,
                    status: 0,
                });
                break;
            }
        };

        chain.push(RedirectHop {
            url: current.clone(),
            status: response.status,
        });

        if !REDIRECT_STATUSES.contains(&response.status) {
            break;
        }
        let Some(location) = response.header("location") else {
            break;
        };
        let next = Url::parse(&current)
            .and_then(|base| base.join(location))
            .map(|u| u.to_string());
        match next {
            Ok(next) => current = next,
            Err(_) => break,
        }
    }

    chain
}

/// Number of hops in a chain: every entry after the first.
pub fn redirect_count(chain: &[RedirectHop]) -> usize {
    chain.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ReqwestFetcher;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const T: Duration = Duration::from_secs(3);

    #[tokio::test]
    async fn test_check_link_status_falls_back_to_get() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/no-head"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/no-head"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new().unwrap();
        let base = server.uri();
        assert_eq!(check_link_status(&fetcher, &format!("{}/ok", base), T).await, 200);
        assert_eq!(check_link_status(&fetcher, &format!("{}/no-head", base), T).await, 200);
        assert_eq!(check_link_status(&fetcher, &format!("{}/missing", base), T).await, 404);
    }

    #[tokio::test]
    async fn test_check_link_status_unreachable_is_zero() {
        let fetcher = ReqwestFetcher::new().unwrap();
        assert_eq!(check_link_status(&fetcher, "http://127.0.0.1:1/", T).await, 0);
    }

    #[tokio::test]
    async fn test_redirect_chain_follows_location() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/middle"))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/middle"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new().unwrap();
        let base = server.uri();
        let chain = redirect_chain(&fetcher, &format!("{}/old", base), T, 10).await;

        let statuses: Vec<u16> = chain.iter().map(|h| h.status).collect();
        assert_eq!(statuses, vec![301, 302, 200]);
        assert_eq!(chain[2].url, format!("{}/new", base));
        assert_eq!(redirect_count(&chain), 2);
    }

    #[tokio::test]
    async fn test_redirect_chain_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let fetcher = ReqwestFetcher::new().unwrap();
        let chain = redirect_chain(&fetcher, &format!("{}/loop", server.uri()), T, 4).await;
        assert_eq!(chain.len(), 4);
        assert_eq!(redirect_count(&chain), 3);
    }
}
