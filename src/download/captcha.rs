//! CAPTCHA solving: a paid solver service with an operator fallback.
//!
//! The engine hands a [`Challenge`] to a [`CaptchaSolver`]. The usual chain is
//! [`TwoCaptchaSolver`] first (bounded wait), then [`OperatorSolver`], which
//! waits for a person to paste a solved token into a file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::{ClientOptions, HttpClient};
use super::error::DownloadError;
use crate::adapter::{Challenge, ChallengeKind};
use crate::user_agent::service_user_agent;

const TWOCAPTCHA_BASE_URL: &str = "https://2captcha.com";
const SOLVER_POLL_INTERVAL: Duration = Duration::from_secs(5);
const SOLVER_TIMEOUT: Duration = Duration::from_secs(120);
const OPERATOR_POLL_INTERVAL: Duration = Duration::from_secs(2);
const OPERATOR_TIMEOUT: Duration = Duration::from_secs(300);
const NOT_READY: &str = "CAPCHA_NOT_READY";

/// Errors raised while obtaining a challenge token.
#[derive(Debug, Error)]
pub enum CaptchaError {
    /// No token arrived within the allowed window.
    #[error("CAPTCHA not solved within {}s", waited.as_secs())]
    Timeout { waited: Duration },

    /// The solver service rejected the task or reported an error code.
    #[error("CAPTCHA solver {solver} failed: {code}")]
    Solver { solver: &'static str, code: String },

    /// The solver service answered with something unparseable.
    #[error("unexpected CAPTCHA solver response: {0}")]
    InvalidResponse(String),

    /// Talking to the solver service failed.
    #[error("CAPTCHA solver request failed: {0}")]
    Http(#[from] DownloadError),

    /// The operator token file could not be read.
    #[error("failed to read CAPTCHA token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No solver is configured.
    #[error("no CAPTCHA solver configured\n  Suggestion: Set TWOCAPTCHA_API_KEY or solve manually via the token file")]
    NoSolver,
}

impl CaptchaError {
    /// True when the failure was running out of time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Produces a response token for a challenge.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Returns the token to submit with the challenge form.
    async fn solve(&self, challenge: &Challenge) -> Result<String, CaptchaError>;
}

#[derive(Debug, Deserialize)]
struct TwoCaptchaResponse {
    status: i64,
    #[serde(default)]
    request: serde_json::Value,
}

impl TwoCaptchaResponse {
    fn request_text(&self) -> String {
        match &self.request {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// 2captcha.com client (`in.php` submit, `res.php` poll).
#[derive(Debug, Clone)]
pub struct TwoCaptchaSolver {
    client: HttpClient,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl TwoCaptchaSolver {
    /// Creates a solver against the public service.
    ///
    /// # Errors
    ///
    /// Returns [`CaptchaError::Http`] if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, CaptchaError> {
        Self::with_base_url(api_key, TWOCAPTCHA_BASE_URL)
    }

    /// Creates a solver against a custom endpoint (for tests).
    ///
    /// # Errors
    ///
    /// Returns [`CaptchaError::Http`] if the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, CaptchaError> {
        let options = ClientOptions::default().with_user_agent(service_user_agent());
        Ok(Self {
            client: HttpClient::new(&options)?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: SOLVER_POLL_INTERVAL,
            timeout: SOLVER_TIMEOUT,
        })
    }

    /// Overall time allowed for one solve.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<String, CaptchaError> {
        let mut url = Url::parse(&format!("{}/{path}", self.base_url))
            .map_err(|_| DownloadError::invalid_url(&self.base_url))?;
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .extend_pairs(params.iter().copied())
            .append_pair("json", "1");
        Ok(url.into())
    }

    async fn call(&self, url: &str) -> Result<TwoCaptchaResponse, CaptchaError> {
        let page = self.client.get_page(url, None).await?;
        serde_json::from_str(&page.body)
            .map_err(|_| CaptchaError::InvalidResponse(page.body.chars().take(200).collect()))
    }

    /// Current account balance.
    ///
    /// # Errors
    ///
    /// Returns [`CaptchaError`] if the service rejects the key or is unreachable.
    pub async fn balance(&self) -> Result<f64, CaptchaError> {
        let url = self.endpoint("res.php", &[("action", "getbalance")])?;
        let response = self.call(&url).await?;
        let text = response.request_text();
        if response.status != 1 {
            return Err(CaptchaError::Solver {
                solver: "2captcha",
                code: text,
            });
        }
        text.trim()
            .parse()
            .map_err(|_| CaptchaError::InvalidResponse(text))
    }

    async fn submit(&self, challenge: &Challenge) -> Result<String, CaptchaError> {
        let params: Vec<(&str, &str)> = match challenge.kind {
            ChallengeKind::Recaptcha => vec![
                ("method", "userrecaptcha"),
                ("googlekey", challenge.site_key.as_str()),
                ("pageurl", challenge.page_url.as_str()),
            ],
            ChallengeKind::Turnstile => vec![
                ("method", "turnstile"),
                ("sitekey", challenge.site_key.as_str()),
                ("pageurl", challenge.page_url.as_str()),
            ],
        };
        let url = self.endpoint("in.php", &params)?;
        let response = self.call(&url).await?;
        let text = response.request_text();
        if response.status == 1 && !text.is_empty() {
            Ok(text)
        } else {
            Err(CaptchaError::Solver {
                solver: "2captcha",
                code: text,
            })
        }
    }
}

#[async_trait]
impl CaptchaSolver for TwoCaptchaSolver {
    fn name(&self) -> &'static str {
        "2captcha"
    }

    #[instrument(skip(self, challenge), fields(kind = ?challenge.kind, page = %challenge.page_url))]
    async fn solve(&self, challenge: &Challenge) -> Result<String, CaptchaError> {
        let started = Instant::now();
        let task_id = self.submit(challenge).await?;
        info!(task_id = %task_id, "submitted challenge to 2captcha");

        let poll_url = self.endpoint("res.php", &[("action", "get"), ("id", task_id.as_str())])?;
        loop {
            if started.elapsed() >= self.timeout {
                warn!(task_id = %task_id, "2captcha did not answer in time");
                return Err(CaptchaError::Timeout {
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;

            let response = match self.call(&poll_url).await {
                Ok(response) => response,
                Err(CaptchaError::Http(error)) => {
                    debug!(error = %error, "2captcha poll failed; will poll again");
                    continue;
                }
                Err(other) => return Err(other),
            };
            let text = response.request_text();
            if response.status == 1 {
                info!(
                    task_id = %task_id,
                    secs = started.elapsed().as_secs(),
                    "2captcha solved challenge"
                );
                return Ok(text);
            }
            if text != NOT_READY {
                return Err(CaptchaError::Solver {
                    solver: "2captcha",
                    code: text,
                });
            }
            debug!(task_id = %task_id, "2captcha still solving");
        }
    }
}

/// Waits for an operator to write a solved token into a file.
///
/// The file is removed before waiting (stale tokens are never reused) and
/// again once a token has been read.
#[derive(Debug, Clone)]
pub struct OperatorSolver {
    token_path: PathBuf,
    poll_interval: Duration,
    timeout: Duration,
}

impl OperatorSolver {
    #[must_use]
    pub fn new(token_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            token_path: token_path.into(),
            poll_interval: OPERATOR_POLL_INTERVAL,
            timeout,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    async fn take_token(&self) -> Result<Option<String>, CaptchaError> {
        match tokio::fs::read_to_string(&self.token_path).await {
            Ok(contents) => {
                let token = contents.trim().to_string();
                if token.is_empty() {
                    return Ok(None);
                }
                remove_if_present(&self.token_path).await?;
                Ok(Some(token))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CaptchaError::TokenFile {
                path: self.token_path.clone(),
                source: e,
            }),
        }
    }
}

impl Default for OperatorSolver {
    fn default() -> Self {
        Self::new("captcha_token.txt", OPERATOR_TIMEOUT)
    }
}

async fn remove_if_present(path: &Path) -> Result<(), CaptchaError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CaptchaError::TokenFile {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[async_trait]
impl CaptchaSolver for OperatorSolver {
    fn name(&self) -> &'static str {
        "operator"
    }

    #[instrument(skip(self, challenge), fields(page = %challenge.page_url))]
    async fn solve(&self, challenge: &Challenge) -> Result<String, CaptchaError> {
        remove_if_present(&self.token_path).await?;
        warn!(
            page = %challenge.page_url,
            site_key = %challenge.site_key,
            token_file = %self.token_path.display(),
            timeout_secs = self.timeout.as_secs(),
            "CAPTCHA needs a person: solve it in a browser and write the response token to the token file"
        );

        let started = Instant::now();
        loop {
            if let Some(token) = self.take_token().await? {
                info!(secs = started.elapsed().as_secs(), "operator token received");
                return Ok(token);
            }
            if started.elapsed() >= self.timeout {
                return Err(CaptchaError::Timeout {
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Tries each solver in order and returns the first token.
pub struct FallbackSolver {
    solvers: Vec<Box<dyn CaptchaSolver>>,
}

impl std::fmt::Debug for FallbackSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.solvers.iter().map(|s| s.name()).collect();
        f.debug_struct("FallbackSolver")
            .field("solvers", &names)
            .finish()
    }
}

impl FallbackSolver {
    #[must_use]
    pub fn new(solvers: Vec<Box<dyn CaptchaSolver>>) -> Self {
        Self { solvers }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.solvers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.solvers.is_empty()
    }
}

#[async_trait]
impl CaptchaSolver for FallbackSolver {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn solve(&self, challenge: &Challenge) -> Result<String, CaptchaError> {
        let mut last_error = CaptchaError::NoSolver;
        for solver in &self.solvers {
            match solver.solve(challenge).await {
                Ok(token) => return Ok(token),
                Err(error) => {
                    warn!(solver = solver.name(), error = %error, "solver failed; trying next");
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn challenge(kind: ChallengeKind) -> Challenge {
        Challenge {
            kind,
            site_key: "6LeSITEKEY".to_string(),
            page_url: "https://www.manualslib.com/download/1/".to_string(),
            submit_url: "https://www.manualslib.com/download/1/".to_string(),
            fields: Vec::new(),
        }
    }

    fn fast(solver: TwoCaptchaSolver) -> TwoCaptchaSolver {
        solver.with_polling(Duration::from_millis(10), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_two_captcha_submits_then_polls_until_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/in.php"))
            .and(query_param("method", "userrecaptcha"))
            .and(query_param("googlekey", "6LeSITEKEY"))
            .and(query_param("json", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status":1,"request":"777"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/res.php"))
            .and(query_param("id", "777"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/res.php"))
            .and(query_param("id", "777"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status":1,"request":"TOKEN"}"#),
            )
            .mount(&server)
            .await;

        let solver = fast(TwoCaptchaSolver::with_base_url("key", server.uri()).unwrap());
        let token = solver
            .solve(&challenge(ChallengeKind::Recaptcha))
            .await
            .unwrap();
        assert_eq!(token, "TOKEN");
    }

    #[tokio::test]
    async fn test_two_captcha_turnstile_uses_sitekey_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/in.php"))
            .and(query_param("method", "turnstile"))
            .and(query_param("sitekey", "6LeSITEKEY"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status":1,"request":"9"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/res.php"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status":1,"request":"TS"}"#),
            )
            .mount(&server)
            .await;

        let solver = fast(TwoCaptchaSolver::with_base_url("key", server.uri()).unwrap());
        let token = solver
            .solve(&challenge(ChallengeKind::Turnstile))
            .await
            .unwrap();
        assert_eq!(token, "TS");
    }

    #[tokio::test]
    async fn test_two_captcha_submit_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/in.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"status":0,"request":"ERROR_ZERO_BALANCE"}"#),
            )
            .mount(&server)
            .await;

        let solver = fast(TwoCaptchaSolver::with_base_url("key", server.uri()).unwrap());
        let err = solver
            .solve(&challenge(ChallengeKind::Recaptcha))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ERROR_ZERO_BALANCE"));
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn test_two_captcha_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/in.php"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status":1,"request":"1"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/res.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#),
            )
            .mount(&server)
            .await;

        let solver = TwoCaptchaSolver::with_base_url("key", server.uri())
            .unwrap()
            .with_polling(Duration::from_millis(10), Duration::from_millis(50));
        let err = solver
            .solve(&challenge(ChallengeKind::Recaptcha))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_two_captcha_balance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/res.php"))
            .and(query_param("action", "getbalance"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status":1,"request":"3.25"}"#),
            )
            .mount(&server)
            .await;

        let solver = TwoCaptchaSolver::with_base_url("key", server.uri()).unwrap();
        let balance = solver.balance().await.unwrap();
        assert!((balance - 3.25).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_operator_solver_reads_and_consumes_token() {
        let dir = TempDir::new().unwrap();
        let token_path = dir.path().join("token.txt");
        std::fs::write(&token_path, "stale").unwrap();

        let solver = OperatorSolver::new(&token_path, Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(10));
        let writer_path = token_path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::fs::write(&writer_path, "  fresh-token\n").await.unwrap();
        });

        let token = solver
            .solve(&challenge(ChallengeKind::Recaptcha))
            .await
            .unwrap();
        writer.await.unwrap();
        assert_eq!(token, "fresh-token");
        assert!(!token_path.exists());
    }

    #[tokio::test]
    async fn test_operator_solver_times_out() {
        let dir = TempDir::new().unwrap();
        let solver = OperatorSolver::new(dir.path().join("t.txt"), Duration::from_millis(30))
            .with_poll_interval(Duration::from_millis(10));
        let err = solver
            .solve(&challenge(ChallengeKind::Recaptcha))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    struct Fixed(Result<&'static str, ()>);

    #[async_trait]
    impl CaptchaSolver for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn solve(&self, _challenge: &Challenge) -> Result<String, CaptchaError> {
            match self.0 {
                Ok(token) => Ok(token.to_string()),
                Err(()) => Err(CaptchaError::Timeout {
                    waited: Duration::ZERO,
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_fallback_uses_first_success() {
        let solver = FallbackSolver::new(vec![
            Box::new(Fixed(Err(()))),
            Box::new(Fixed(Ok("second"))),
        ]);
        let token = solver
            .solve(&challenge(ChallengeKind::Recaptcha))
            .await
            .unwrap();
        assert_eq!(token, "second");
    }

    #[tokio::test]
    async fn test_fallback_empty_reports_no_solver() {
        let solver = FallbackSolver::new(Vec::new());
        assert!(solver.is_empty());
        let err = solver
            .solve(&challenge(ChallengeKind::Recaptcha))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptchaError::NoSolver));
    }
}
