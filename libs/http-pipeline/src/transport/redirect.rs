//! Redirect policy for [`super::HyperTransport`].
//!
//! - At most `max_redirects` hops are followed; the last 3xx is returned as is
//! - HTTPS to HTTP downgrades are never followed
//! - `Authorization`, `Cookie` and `Proxy-Authorization` are dropped once the
//!   chain leaves the original origin

use http::{Request, Uri, header};
use tower_http::follow_redirect::policy::{Action, Attempt, Policy};

const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// Per-request redirect state; tower-http clones the policy for each request.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    max_redirects: usize,
    followed: usize,
    left_origin: bool,
}

impl RedirectPolicy {
    #[must_use]
    pub fn new(max_redirects: usize) -> Self {
        Self {
            max_redirects,
            followed: 0,
            left_origin: false,
        }
    }
}

fn origin(uri: &Uri) -> (&str, &str, u16) {
    // Scheme-less URIs count as HTTPS
    let scheme = uri.scheme_str().unwrap_or("https");
    let port = uri.port_u16().unwrap_or(match scheme {
        "http" => 80,
        "https" => 443,
        _ => 0,
    });
    (scheme, uri.host().unwrap_or(""), port)
}

fn is_same_origin(from: &Uri, to: &Uri) -> bool {
    origin(from) == origin(to)
}

fn is_downgrade(from: &Uri, to: &Uri) -> bool {
    origin(from).0 == "https" && origin(to).0 == "http"
}

impl<B: Clone, E> Policy<B, E> for RedirectPolicy {
    fn redirect(&mut self, attempt: &Attempt<'_>) -> Result<Action, E> {
        if self.followed >= self.max_redirects {
            tracing::debug!(max = self.max_redirects, "redirect limit reached");
            return Ok(Action::Stop);
        }

        let from = attempt.previous();
        let to = attempt.location();
        if is_downgrade(from, to) {
            tracing::warn!(from = %from, to = %to, "refusing HTTPS to HTTP redirect");
            return Ok(Action::Stop);
        }

        if !is_same_origin(from, to) {
            self.left_origin = true;
        }
        self.followed += 1;
        Ok(Action::Follow)
    }

    fn on_request(&mut self, request: &mut Request<B>) {
        if self.left_origin {
            let headers = request.headers_mut();
            for name in SENSITIVE_HEADERS {
                headers.remove(name);
            }
        }
    }

    fn clone_body(&self, body: &B) -> Option<B> {
        // 307/308 replay the body
        Some(body.clone())
    }
}
