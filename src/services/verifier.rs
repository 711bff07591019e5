use chrono::Utc;
use futures::{Stream, StreamExt};
use reqwest::header::{self as reqwest_header, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, timeout};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::models::{
    BatchProgress, ChannelEntry, CheckOutcome, LinkOptions, LinkStatus, VerifyConfig, VerifyStrategy,
    TRACE_SEPARATOR,
};

const PLAYLIST_MARKERS: &[&str] = &["#EXTM3U", "#EXTINF"];

/// Why a single attempt failed
#[derive(Debug)]
enum ProbeError {
    /// Worth another attempt (timeout, connection error)
    Transient(String),
    /// Certificate or handshake problem
    Tls(String),
    /// Retrying cannot help (bad status, redirect loop, not a playlist)
    Terminal(String),
}

fn is_tls_error(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        let text = e.to_string().to_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        source = e.source();
    }
    false
}

fn classify(err: reqwest::Error) -> ProbeError {
    if err.is_redirect() {
        ProbeError::Terminal(format!("too many redirects ({})", err))
    } else if is_tls_error(&err) {
        ProbeError::Tls(format!("TLS error ({})", err))
    } else if err.is_timeout() {
        ProbeError::Transient("request timed out".to_string())
    } else if err.is_connect() {
        ProbeError::Transient(format!("connection failed ({})", err))
    } else if err.is_builder() {
        ProbeError::Terminal(format!("invalid request ({})", err))
    } else {
        ProbeError::Transient(format!("request failed ({})", err))
    }
}

fn accept_status(status: StatusCode, label: &str) -> std::result::Result<String, ProbeError> {
    if status.is_success() || status.is_redirection() {
        Ok(format!("{} {}", label, status.as_u16()))
    } else {
        Err(ProbeError::Terminal(format!("{} HTTP {}", label, status)))
    }
}

/// Paths that should contain a playlist rather than media
fn is_sub_playlist(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".m3u")
}

/// Request headers derived from an entry's link options
pub fn headers_for(options: &LinkOptions, default_user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (key, value) in options.iter() {
        let name = match key.to_lowercase().as_str() {
            "http-user-agent" => reqwest_header::USER_AGENT,
            "http-referrer" | "http-referer" => reqwest_header::REFERER,
            "http-origin" => reqwest_header::ORIGIN,
            "http-cookie" => reqwest_header::COOKIE,
            _ => continue,
        };
        match HeaderValue::from_str(value) {
            Ok(v) => {
                headers.insert(name, v);
            }
            Err(_) => tracing::debug!("Ignoring unusable link option {}", key),
        }
    }

    if !headers.contains_key(reqwest_header::USER_AGENT) {
        if let Ok(v) = HeaderValue::from_str(default_user_agent) {
            headers.insert(reqwest_header::USER_AGENT, v);
        }
    }
    headers
}

/// Health checks for channel links
pub struct LinkVerifier {
    config: VerifyConfig,
    client: Client,
    /// Same settings, certificate validation disabled
    insecure_client: Client,
}

impl LinkVerifier {
    pub fn new(config: VerifyConfig) -> Result<Self> {
        let client = Self::build_client(&config, false)?;
        let insecure_client = Self::build_client(&config, true)?;
        Ok(Self {
            config,
            client,
            insecure_client,
        })
    }

    fn build_client(config: &VerifyConfig, insecure: bool) -> reqwest::Result<Client> {
        Client::builder()
            .connect_timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .danger_accept_invalid_certs(insecure)
            .build()
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Check one entry. Never fails: every problem becomes a `Broken` outcome.
    pub async fn verify(&self, entry: &ChannelEntry) -> CheckOutcome {
        let Some(raw_url) = entry.url.as_deref() else {
            return outcome(LinkStatus::NoLink, vec!["no link".to_string()], None);
        };

        let url = match Url::parse(raw_url) {
            Ok(url) => url,
            Err(e) => {
                return outcome(
                    LinkStatus::Broken,
                    vec![format!("attempt 1: malformed URL ({})", e)],
                    None,
                )
            }
        };

        match url.scheme() {
            "http" | "https" => {}
            "rtp" | "udp" => return format_only(&url, "multicast link, format check only"),
            other => {
                return outcome(
                    LinkStatus::Broken,
                    vec![format!("attempt 1: unsupported scheme '{}'", other)],
                    None,
                )
            }
        }

        if self.config.strategy == VerifyStrategy::FormatOnly {
            return format_only(&url, "format check only");
        }

        let headers = headers_for(&entry.link_options, &self.config.user_agent);
        let result = self.probe_with_retry(&url, &headers).await;
        tracing::debug!("verified" = %url, "status" = %result.status, "details" = %result.details);
        result
    }

    async fn probe_with_retry(&self, url: &Url, headers: &HeaderMap) -> CheckOutcome {
        let max_attempts = self.config.retries + 1;
        let mut trace = Vec::new();
        let mut failures = 0u32;
        let mut insecure = false;

        loop {
            let client = if insecure { &self.insecure_client } else { &self.client };
            let attempt = trace.len() + 1;
            let started = Instant::now();

            let result = match timeout(self.config.timeout, self.probe(client, url, headers)).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Transient(format!(
                    "timed out after {} ms",
                    self.config.timeout.as_millis()
                ))),
            };

            let suffix = if insecure { " (certificate check disabled)" } else { "" };
            match result {
                Ok(detail) => {
                    trace.push(format!("attempt {}: {}{}", attempt, detail, suffix));
                    let elapsed = started.elapsed().as_secs_f64();
                    return outcome(LinkStatus::Working, trace, Some(elapsed));
                }
                Err(ProbeError::Terminal(msg)) => {
                    trace.push(format!("attempt {}: {}{}", attempt, msg, suffix));
                    return outcome(LinkStatus::Broken, trace, None);
                }
                Err(ProbeError::Tls(msg)) if !insecure => {
                    trace.push(format!("attempt {}: {}, retrying without certificate check", attempt, msg));
                    insecure = true;
                    continue;
                }
                Err(ProbeError::Tls(msg)) | Err(ProbeError::Transient(msg)) => {
                    trace.push(format!("attempt {}: {}{}", attempt, msg, suffix));
                }
            }

            failures += 1;
            if failures >= max_attempts {
                return outcome(LinkStatus::Broken, trace, None);
            }
            sleep(self.config.backoff).await;
        }
    }

    async fn probe(&self, client: &Client, url: &Url, headers: &HeaderMap) -> std::result::Result<String, ProbeError> {
        match self.config.strategy {
            VerifyStrategy::HeadOnly => {
                let resp = client
                    .head(url.clone())
                    .headers(headers.clone())
                    .send()
                    .await
                    .map_err(classify)?;

                if resp.status() == StatusCode::FORBIDDEN {
                    let resp = client
                        .get(url.clone())
                        .headers(headers.clone())
                        .send()
                        .await
                        .map_err(classify)?;
                    return accept_status(resp.status(), "GET after HEAD 403:");
                }
                accept_status(resp.status(), "HEAD")
            }
            VerifyStrategy::GetAndSniff => {
                let resp = client
                    .get(url.clone())
                    .headers(headers.clone())
                    .send()
                    .await
                    .map_err(classify)?;

                let detail = accept_status(resp.status(), "GET")?;
                if is_sub_playlist(url) {
                    self.sniff(resp).await?;
                    return Ok(format!("{}, playlist marker found", detail));
                }
                Ok(detail)
            }
            VerifyStrategy::FormatOnly => Ok("format check only".to_string()),
        }
    }

    /// Read a bounded prefix and require a playlist marker
    async fn sniff(&self, resp: Response) -> std::result::Result<(), ProbeError> {
        let limit = self.config.sniff_bytes.max(16);
        let mut prefix: Vec<u8> = Vec::with_capacity(limit);
        let mut stream = resp.bytes_stream();

        while prefix.len() < limit {
            match stream.next().await {
                Some(Ok(chunk)) => prefix.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(classify(e)),
                None => break,
            }
        }

        let text = String::from_utf8_lossy(&prefix);
        if PLAYLIST_MARKERS.iter().any(|m| text.contains(m)) {
            Ok(())
        } else {
            Err(ProbeError::Terminal(format!(
                "no playlist marker in first {} bytes",
                prefix.len().min(limit)
            )))
        }
    }

    /// Verify entries on a fixed pool of workers, reporting each completion.
    ///
    /// Cancelling `cancel` stops handing out new entries; checks already in
    /// flight run to completion.
    pub fn verify_batch(self: &Arc<Self>, entries: Vec<ChannelEntry>, cancel: CancellationToken) -> VerifyBatch {
        let total = entries.len();
        let workers = self.config.workers.max(1).min(total.max(1));

        let (job_tx, job_rx) = mpsc::channel::<(usize, ChannelEntry)>(workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (progress_tx, progress_rx) = mpsc::channel::<BatchProgress>(workers * 2);
        let completed = Arc::new(AtomicUsize::new(0));

        let feeder_cancel = cancel.clone();
        tokio::spawn(async move {
            for job in entries.into_iter().enumerate() {
                if feeder_cancel.is_cancelled() {
                    break;
                }
                tokio::select! {
                    _ = feeder_cancel.cancelled() => break,
                    sent = job_tx.send(job) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        for _ in 0..workers {
            let verifier = Arc::clone(self);
            let job_rx = Arc::clone(&job_rx);
            let progress_tx = progress_tx.clone();
            let completed = Arc::clone(&completed);
            let cancel = cancel.clone();

            tokio::spawn(async move {
                loop {
                    let job = { job_rx.lock().await.recv().await };
                    let Some((index, entry)) = job else { break };
                    if cancel.is_cancelled() {
                        break;
                    }

                    let outcome = verifier.verify(&entry).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    let progress = BatchProgress {
                        index,
                        outcome,
                        completed: done,
                        total,
                    };
                    if progress_tx.send(progress).await.is_err() {
                        break;
                    }
                }
            });
        }

        tracing::info!("Verifying {} links with {} workers", total, workers);
        VerifyBatch {
            total,
            progress: progress_rx,
        }
    }
}

fn format_only(url: &Url, label: &str) -> CheckOutcome {
    if url.host_str().map_or(false, |h| !h.is_empty()) {
        outcome(LinkStatus::Working, vec![format!("attempt 1: {}", label)], None)
    } else {
        outcome(LinkStatus::Broken, vec!["attempt 1: URL has no host".to_string()], None)
    }
}

fn outcome(status: LinkStatus, trace: Vec<String>, response_time_secs: Option<f64>) -> CheckOutcome {
    CheckOutcome {
        status,
        details: trace.join(TRACE_SEPARATOR),
        response_time_secs,
        checked_at: Utc::now(),
    }
}

/// A running verification batch
pub struct VerifyBatch {
    pub total: usize,
    /// One message per completed entry, in completion order
    pub progress: mpsc::Receiver<BatchProgress>,
}

impl VerifyBatch {
    pub fn into_stream(self) -> impl Stream<Item = BatchProgress> {
        ReceiverStream::new(self.progress)
    }

    /// Drain the batch; `None` marks entries skipped by cancellation
    pub async fn finish(mut self) -> Vec<Option<CheckOutcome>> {
        let mut results = vec![None; self.total];
        while let Some(item) = self.progress.recv().await {
            if let Some(slot) = results.get_mut(item.index) {
                *slot = Some(item.outcome);
            }
        }
        let checked = results.iter().filter(|r| r.is_some()).count();
        tracing::info!("Verification batch finished: {}/{} checked", checked, self.total);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap as AxumHeaders, Method, StatusCode as AxumStatus};
    use axum::response::{IntoResponse, Redirect};
    use axum::routing::{any, get};
    use axum::Router;
    use std::time::Duration;

    async fn spawn_server() -> String {
        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route(
                "/guarded",
                any(|method: Method| async move {
                    if method == Method::HEAD {
                        AxumStatus::FORBIDDEN.into_response()
                    } else {
                        "stream".into_response()
                    }
                }),
            )
            .route("/playlist.m3u8", get(|| async { "#EXTM3U\n#EXT-X-VERSION:3\n" }))
            .route("/bad.m3u8", get(|| async { "<html>not a playlist</html>" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .route(
                "/brief",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    "stream"
                }),
            )
            .route("/loop", get(|| async { Redirect::temporary("/loop") }))
            .route("/missing", get(|| async { AxumStatus::NOT_FOUND }))
            .route(
                "/ua",
                get(|headers: AxumHeaders| async move {
                    let allowed = headers
                        .get(header::USER_AGENT)
                        .map(|v| v == "SecretAgent/1.0")
                        .unwrap_or(false);
                    if allowed {
                        AxumStatus::OK
                    } else {
                        AxumStatus::FORBIDDEN
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// HTTPS listener with a throwaway self-signed certificate; answers 200 to any request
    async fn spawn_self_signed_server() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio_rustls::rustls::crypto::ring;
        use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
        use tokio_rustls::rustls::ServerConfig;
        use tokio_rustls::TlsAcceptor;

        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));
        let tls = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![certified.cert.der().clone()], key)
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(tls));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    // Clients that validate certificates abort the handshake
                    let Ok(mut tls) = acceptor.accept(stream).await else { return };
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match tls.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let response = b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok";
                    let _ = tls.write_all(response).await;
                    let _ = tls.shutdown().await;
                });
            }
        });
        format!("https://127.0.0.1:{}", addr.port())
    }

    fn config(strategy: VerifyStrategy) -> VerifyConfig {
        VerifyConfig {
            strategy,
            timeout: Duration::from_millis(200),
            retries: 2,
            backoff: Duration::from_millis(10),
            workers: 3,
            ..VerifyConfig::default()
        }
    }

    fn entry(url: &str) -> ChannelEntry {
        ChannelEntry::new("Test", Some(url.to_string()))
    }

    #[tokio::test]
    async fn test_ok_is_working() {
        let base = spawn_server().await;
        let verifier = LinkVerifier::new(config(VerifyStrategy::GetAndSniff)).unwrap();
        let result = verifier.verify(&entry(&format!("{}/ok", base))).await;
        assert_eq!(result.status, LinkStatus::Working);
        assert!(result.response_time_secs.is_some());
        assert_eq!(result.attempts().count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_broken_with_one_segment_per_attempt() {
        let base = spawn_server().await;
        let verifier = LinkVerifier::new(config(VerifyStrategy::GetAndSniff)).unwrap();
        let result = verifier.verify(&entry(&format!("{}/slow", base))).await;
        assert_eq!(result.status, LinkStatus::Broken);
        let attempts: Vec<_> = result.attempts().collect();
        assert_eq!(attempts.len(), 3);
        assert!(attempts.iter().all(|a| a.contains("timed out")));
    }

    #[tokio::test]
    async fn test_head_403_falls_back_to_get() {
        let base = spawn_server().await;
        let verifier = LinkVerifier::new(config(VerifyStrategy::HeadOnly)).unwrap();
        let result = verifier.verify(&entry(&format!("{}/guarded", base))).await;
        assert_eq!(result.status, LinkStatus::Working);
        assert!(result.details.contains("GET after HEAD 403"));
    }

    #[tokio::test]
    async fn test_sniff_requires_playlist_marker() {
        let base = spawn_server().await;
        let verifier = LinkVerifier::new(config(VerifyStrategy::GetAndSniff)).unwrap();

        let good = verifier.verify(&entry(&format!("{}/playlist.m3u8", base))).await;
        assert_eq!(good.status, LinkStatus::Working);

        let bad = verifier.verify(&entry(&format!("{}/bad.m3u8", base))).await;
        assert_eq!(bad.status, LinkStatus::Broken);
        assert_eq!(bad.attempts().count(), 1);
    }

    #[tokio::test]
    async fn test_terminal_failures_are_not_retried() {
        let base = spawn_server().await;
        let verifier = LinkVerifier::new(config(VerifyStrategy::GetAndSniff)).unwrap();

        let missing = verifier.verify(&entry(&format!("{}/missing", base))).await;
        assert_eq!(missing.status, LinkStatus::Broken);
        assert_eq!(missing.attempts().count(), 1);

        let looping = verifier.verify(&entry(&format!("{}/loop", base))).await;
        assert_eq!(looping.status, LinkStatus::Broken);
        assert_eq!(looping.attempts().count(), 1);
        assert!(looping.details.contains("redirect"));
    }

    #[tokio::test]
    async fn test_link_options_become_headers() {
        let base = spawn_server().await;
        let verifier = LinkVerifier::new(config(VerifyStrategy::GetAndSniff)).unwrap();

        let mut with_agent = entry(&format!("{}/ua", base));
        with_agent.link_options.insert("http-user-agent", "SecretAgent/1.0");
        assert_eq!(verifier.verify(&with_agent).await.status, LinkStatus::Working);

        let without = verifier.verify(&entry(&format!("{}/ua", base))).await;
        assert_eq!(without.status, LinkStatus::Broken);
    }

    #[tokio::test]
    async fn test_no_network_cases() {
        let verifier = LinkVerifier::new(config(VerifyStrategy::FormatOnly)).unwrap();

        assert_eq!(
            verifier.verify(&ChannelEntry::new("Test", None)).await.status,
            LinkStatus::NoLink
        );
        assert_eq!(verifier.verify(&entry("not a url")).await.status, LinkStatus::Broken);
        assert_eq!(
            verifier.verify(&entry("http://example.invalid/x.m3u8")).await.status,
            LinkStatus::Working
        );

        let multicast = LinkVerifier::new(config(VerifyStrategy::GetAndSniff)).unwrap();
        let result = multicast.verify(&entry("udp://239.0.0.1:1234")).await;
        assert_eq!(result.status, LinkStatus::Working);
        assert!(result.details.contains("format check only"));
    }

    #[test]
    fn test_headers_for_options() {
        let mut options = LinkOptions::new();
        options.insert("http-referrer", "https://site.example/");
        options.insert("network-caching", "1000");
        let headers = headers_for(&options, "DefaultAgent");
        assert_eq!(headers.get(reqwest_header::REFERER).unwrap(), "https://site.example/");
        assert_eq!(headers.get(reqwest_header::USER_AGENT).unwrap(), "DefaultAgent");
        assert_eq!(headers.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_reports_every_entry() {
        let base = spawn_server().await;
        let verifier = Arc::new(LinkVerifier::new(config(VerifyStrategy::GetAndSniff)).unwrap());
        let entries = vec![
            entry(&format!("{}/ok", base)),
            entry(&format!("{}/missing", base)),
            entry(&format!("{}/playlist.m3u8", base)),
            ChannelEntry::new("Empty", None),
            entry(&format!("{}/ok", base)),
        ];

        let batch = verifier.verify_batch(entries, CancellationToken::new());
        let progress: Vec<BatchProgress> = batch.into_stream().collect().await;

        assert_eq!(progress.len(), 5);
        assert!(progress.iter().all(|p| p.total == 5));
        let mut completed: Vec<_> = progress.iter().map(|p| p.completed).collect();
        completed.sort_unstable();
        assert_eq!(completed, vec![1, 2, 3, 4, 5]);

        let mut indexes: Vec<_> = progress.iter().map(|p| p.index).collect();
        indexes.sort_unstable();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4]);

        let status_of = |i: usize| progress.iter().find(|p| p.index == i).unwrap().outcome.status;
        assert_eq!(status_of(0), LinkStatus::Working);
        assert_eq!(status_of(1), LinkStatus::Broken);
        assert_eq!(status_of(3), LinkStatus::NoLink);
    }

    #[tokio::test]
    async fn test_cancelled_batch_issues_nothing() {
        let verifier = Arc::new(LinkVerifier::new(config(VerifyStrategy::FormatOnly)).unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let entries = (0..4).map(|i| entry(&format!("http://host{}.example/x", i))).collect();
        let results = verifier.verify_batch(entries, cancel).finish().await;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_stops_new_checks() {
        let base = spawn_server().await;
        let verifier = Arc::new(
            LinkVerifier::new(VerifyConfig {
                workers: 1,
                ..config(VerifyStrategy::GetAndSniff)
            })
            .unwrap(),
        );
        let cancel = CancellationToken::new();
        let entries = (0..6).map(|_| entry(&format!("{}/brief", base))).collect();

        let mut batch = verifier.verify_batch(entries, cancel.clone());
        let first = batch.progress.recv().await.unwrap();
        assert_eq!(first.index, 0);
        cancel.cancel();

        let mut results = batch.finish().await;
        results[first.index] = Some(first.outcome);

        // One worker checks in order: a finished prefix, then nothing
        let checked = results.iter().filter(|r| r.is_some()).count();
        assert!(checked >= 1 && checked < results.len(), "checked {}", checked);
        assert!(results[..checked].iter().all(Option::is_some));
        assert!(results[checked..].iter().all(Option::is_none));
        assert!(results
            .iter()
            .flatten()
            .all(|o| o.status == LinkStatus::Working));
    }

    #[tokio::test]
    async fn test_self_signed_certificate_retried_insecurely() {
        let base = spawn_self_signed_server().await;
        let verifier = LinkVerifier::new(VerifyConfig {
            timeout: Duration::from_secs(2),
            retries: 0,
            ..config(VerifyStrategy::GetAndSniff)
        })
        .unwrap();

        let result = verifier.verify(&entry(&format!("{}/live", base))).await;
        assert_eq!(result.status, LinkStatus::Working, "{}", result.details);

        let attempts: Vec<_> = result.attempts().collect();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[0].contains("retrying without certificate check"));
        assert!(attempts[1].contains("GET 200 (certificate check disabled)"));
    }
}
