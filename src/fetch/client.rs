//! Stateful per-host HTTP client
//!
//! One `HostClient` exists per host and owns everything that must be
//! serialized across requests to it: the cookie jar, the warm-up flag,
//! failure counters and timing metrics. The fetch protocol is a warm-up
//! gate followed by a bounded attempt loop with exponential backoff; see
//! the crate-level docs for the full state machine.

use crate::fetch::cookies::CookieJar;
use crate::fetch::solver::ChallengeSolver;
use crate::fetch::strategy::{RequestStrategy, DEFAULT_HEADERS};
use crate::state::HostState;
use crate::{Result, UnifeedError};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, ETAG, LAST_MODIFIED, RETRY_AFTER};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
    /// The server answered 304 to a conditional request; `body` is empty
    pub not_modified: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub final_url: String,
}

pub struct HostClient {
    host: String,
    strategy: Arc<RequestStrategy>,
    solver: Arc<dyn ChallengeSolver>,
    state: HostState,
    jar: CookieJar,
    client: reqwest::Client,
    proxy_index: usize,
    min_delay: Duration,
    jitter: Duration,
    last_request: Option<Instant>,
}

impl HostClient {
    /// Creates a client for one host, replaying cookies cached in `state`
    pub fn new(
        host: &str,
        strategy: Arc<RequestStrategy>,
        state: HostState,
        solver: Arc<dyn ChallengeSolver>,
        min_delay: Duration,
        jitter: Duration,
    ) -> Result<Self> {
        let jar = CookieJar::from_records(state.cookies.clone());
        let client = build_client(&strategy, None)?;
        Ok(HostClient {
            host: host.to_string(),
            strategy,
            solver,
            state,
            jar,
            client,
            proxy_index: 0,
            min_delay,
            jitter,
            last_request: None,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> &HostState {
        &self.state
    }

    /// Consumes the client, returning the host state to persist
    pub fn into_state(self) -> HostState {
        self.state
    }

    /// Fetches a URL under the host's strategy
    ///
    /// Runs the warm-up gate if needed, then attempts the GET up to
    /// `max_attempts` times with exponential backoff, rotating proxies and
    /// resetting the session on configured retry statuses. A 304 response
    /// to a conditional request is a success with `not_modified` set.
    ///
    /// # Errors
    ///
    /// `HostUnavailable` carrying the joined error history once every
    /// attempt is exhausted; callers are expected to catch it per source.
    pub async fn fetch(&mut self, url: &Url, headers: &[(String, String)]) -> Result<FetchedPage> {
        self.ensure_warmup(url).await?;
        self.politeness_pause().await;

        let mut errors: Vec<String> = Vec::new();
        let mut attempt: u32 = 0;
        let max_attempts = self.strategy.max_attempts.max(1);

        while attempt < max_attempts {
            attempt += 1;
            self.state.metrics.attempts = attempt;

            let client = self.next_client()?;
            let request_headers = self.build_headers(headers);

            let dns_ms = self.timed_dns_lookup().await;
            let started = Instant::now();
            let result = client
                .get(url.clone())
                .headers(request_headers)
                .send()
                .await;
            self.last_request = Some(Instant::now());

            match result {
                Ok(response) => {
                    let response_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.state.metrics.dns_ms = dns_ms;
                    self.state.metrics.response_ms = Some(response_ms);
                    self.state.metrics.connect_ms =
                        dns_ms.map(|dns| (response_ms - dns).max(0.0));

                    let status = response.status();
                    self.state.metrics.status = Some(status.as_u16());

                    if self.strategy.retry_statuses.contains(&status.as_u16())
                        && attempt < max_attempts
                    {
                        warn!(
                            "Status {} for {} -> session reset and retry",
                            status.as_u16(),
                            url
                        );
                        errors.push(format!("HTTP {}", status.as_u16()));
                        // a server wait hint trumps our own backoff schedule
                        let wait = if status == StatusCode::TOO_MANY_REQUESTS {
                            retry_after(response.headers())
                                .unwrap_or_else(|| self.strategy.backoff_delay(attempt))
                        } else {
                            self.strategy.backoff_delay(attempt)
                        };
                        self.reset_session()?;
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if status == StatusCode::NOT_MODIFIED {
                        self.absorb_cookies(response.headers());
                        self.record_success(url);
                        self.state.metrics.error = None;
                        return Ok(FetchedPage {
                            status: status.as_u16(),
                            body: String::new(),
                            not_modified: true,
                            etag: None,
                            last_modified: None,
                            final_url: url.to_string(),
                        });
                    }

                    if status.is_success() {
                        let response_headers = response.headers().clone();
                        let final_url = response.url().to_string();
                        let body = response
                            .text()
                            .await
                            .map_err(|source| UnifeedError::Http {
                                url: url.to_string(),
                                source,
                            })?;
                        self.absorb_cookies(&response_headers);
                        self.record_success(url);
                        self.state.metrics.error = None;
                        return Ok(FetchedPage {
                            status: status.as_u16(),
                            body,
                            not_modified: false,
                            etag: header_string(&response_headers, &ETAG),
                            last_modified: header_string(&response_headers, &LAST_MODIFIED),
                            final_url,
                        });
                    }

                    let reason = format!("HTTP {} for {}", status.as_u16(), url);
                    errors.push(reason.clone());
                    self.state.metrics.error = Some(reason.clone());
                    self.state.record_failure(&reason);

                    if attempt >= max_attempts {
                        break;
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let wait = retry_after(response.headers())
                            .unwrap_or_else(|| self.strategy.backoff_delay(attempt));
                        debug!("429 from {}, waiting {:?}", self.host, wait);
                        tokio::time::sleep(wait).await;
                    } else {
                        tokio::time::sleep(self.strategy.backoff_delay(attempt)).await;
                    }
                }
                Err(e) => {
                    let reason = e.to_string();
                    errors.push(reason.clone());
                    self.state.metrics.error = Some(reason.clone());
                    self.state.record_failure(&reason);
                    if attempt >= max_attempts {
                        break;
                    }
                    tokio::time::sleep(self.strategy.backoff_delay(attempt)).await;
                }
            }
        }

        let detail = if errors.is_empty() {
            "unknown error".to_string()
        } else {
            errors.join(", ")
        };
        Err(UnifeedError::HostUnavailable {
            host: self.host.clone(),
            detail,
        })
    }

    /// Warm-up gate, run once per host before real traffic
    ///
    /// Cached protection cookies short-circuit the warm-up entirely. A 4xx
    /// warm-up response that nonetheless sets protection cookies counts as
    /// a solved challenge; one without them escalates to the injected
    /// solver, and a solver failure makes the host unavailable.
    async fn ensure_warmup(&mut self, url: &Url) -> Result<()> {
        let Some(warmup) = self.strategy.warmup.clone() else {
            return Ok(());
        };
        if self.state.warmup_done {
            return Ok(());
        }

        if self.strategy.capture_cookies && self.jar.has_protection() {
            info!(
                "Warm-up for {} skipped: cached protection cookies present",
                self.host
            );
            self.state.warmup_result = Some("cached-cookies".to_string());
            self.state.warmup_done = true;
            return Ok(());
        }

        let warmup_url = warmup.url.clone().unwrap_or_else(|| url.to_string());
        info!("Warm-up {} using {}", self.host, warmup_url);

        let mut request = self.client.get(&warmup_url).headers(self.build_headers(&[]));
        if let Some(timeout) = warmup.timeout {
            request = request.timeout(timeout);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let headers = response.headers().clone();
                self.absorb_cookies(&headers);

                let protected = self.jar.has_protection();
                if status.as_u16() >= 400 && !protected {
                    warn!(
                        "Warm-up for {} returned {} without protection cookies",
                        self.host,
                        status.as_u16()
                    );
                    self.state.warmup_result = Some(format!("http-{}", status.as_u16()));
                    return self.escalate(&warmup_url);
                }

                if protected && status.as_u16() >= 400 {
                    info!(
                        "Warm-up for {} solved protection with status {}",
                        self.host,
                        status.as_u16()
                    );
                    self.state.warmup_result = Some("http-4xx-with-cookies".to_string());
                } else {
                    self.state.warmup_result = Some("http-success".to_string());
                }

                // randomized settle delay so real traffic does not follow
                // the challenge response instantly
                let delay = random_delay(warmup.delay_min_secs, warmup.delay_max_secs);
                tokio::time::sleep(delay).await;
                self.state.warmup_done = true;
                Ok(())
            }
            Err(e) => {
                warn!("Warm-up for {} failed: {}", self.host, e);
                self.state.warmup_result = Some("http-error".to_string());
                self.escalate(&warmup_url)
            }
        }
    }

    /// Invokes the challenge solver, or fails the host outright
    fn escalate(&mut self, url: &str) -> Result<()> {
        if !self.strategy.escalate {
            return Err(UnifeedError::HostUnavailable {
                host: self.host.clone(),
                detail: format!("warm-up failed for {}", url),
            });
        }
        match self.solver.solve(&self.host, url) {
            Ok(cookies) => {
                info!("Challenge solver acquired session for {}", self.host);
                self.jar.replace_all(cookies);
                self.persist_cookies();
                self.state.warmup_result = Some("solver".to_string());
                self.state.warmup_done = true;
                Ok(())
            }
            Err(e) => {
                self.state.warmup_result = Some("solver-failed".to_string());
                Err(UnifeedError::HostUnavailable {
                    host: self.host.clone(),
                    detail: format!("escalation failed: {}", e),
                })
            }
        }
    }

    /// Minimum inter-request delay plus randomized jitter
    async fn politeness_pause(&self) {
        let Some(last) = self.last_request else {
            return;
        };
        let elapsed = last.elapsed();
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            self.jitter.mul_f64(rand::thread_rng().gen::<f64>())
        };
        let target = self.min_delay + jitter;
        if elapsed < target {
            tokio::time::sleep(target - elapsed).await;
        }
    }

    /// Rotates through the proxy pool, or reuses the direct client
    fn next_client(&mut self) -> Result<reqwest::Client> {
        if self.strategy.proxies.is_empty() {
            return Ok(self.client.clone());
        }
        let proxy = self.strategy.proxies[self.proxy_index % self.strategy.proxies.len()].clone();
        self.proxy_index += 1;
        build_client(&self.strategy, Some(&proxy))
    }

    /// Drops the session and rebuilds it, reloading cached cookies
    fn reset_session(&mut self) -> Result<()> {
        self.client = build_client(&self.strategy, None)?;
        self.jar = CookieJar::from_records(self.state.cookies.clone());
        Ok(())
    }

    fn build_headers(&self, call_headers: &[(String, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in DEFAULT_HEADERS {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                map.insert(name, value);
            }
        }
        for (name, value) in &self.strategy.extra_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                map.insert(name, value);
            }
        }
        for (name, value) in call_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                map.insert(name, value);
            }
        }
        if let Some(cookie_header) = self.jar.header_value() {
            if let Ok(value) = HeaderValue::from_str(&cookie_header) {
                map.insert(COOKIE, value);
            }
        }
        map
    }

    fn absorb_cookies(&mut self, headers: &HeaderMap) {
        if !self.strategy.capture_cookies {
            return;
        }
        self.jar.absorb_response(headers, &self.host);
        self.persist_cookies();
    }

    fn persist_cookies(&mut self) {
        if self.strategy.capture_cookies && !self.jar.is_empty() {
            self.state.cookies = self.jar.snapshot();
        }
    }

    fn record_success(&mut self, url: &Url) {
        let path = self
            .strategy
            .record_path_on_success
            .then(|| url.path().to_string());
        self.state.record_success(path);
    }

    /// DNS time is measured separately so slow resolution shows up in the
    /// metrics distinct from a slow response
    async fn timed_dns_lookup(&self) -> Option<f64> {
        let started = Instant::now();
        match tokio::net::lookup_host((self.host.as_str(), 443)).await {
            Ok(mut addrs) => addrs
                .next()
                .map(|_| started.elapsed().as_secs_f64() * 1000.0),
            Err(e) => {
                debug!("DNS lookup failed for {}: {}", self.host, e);
                None
            }
        }
    }
}

fn build_client(strategy: &RequestStrategy, proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(strategy.connect_timeout)
        .timeout(strategy.read_timeout)
        .redirect(reqwest::redirect::Policy::limited(10));
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    Ok(builder.build()?)
}

fn header_string(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn random_delay(min_secs: f64, max_secs: f64) -> Duration {
    if max_secs <= min_secs {
        return Duration::from_secs_f64(min_secs.max(0.0));
    }
    Duration::from_secs_f64(rand::thread_rng().gen_range(min_secs..max_secs))
}
