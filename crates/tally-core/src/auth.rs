//! Sign-in / sign-up submission gate.
//!
//! The hosted auth service and the captcha widget live outside this crate.
//! [`AuthGate`] holds the per-session bookkeeping that decides whether a
//! submission may go out: field validation, the per-email rate limit, the
//! post-failure cooldown, the captcha token and the in-flight guard.
//!
//! Hosts with an async backend call [`AuthGate::begin`], run the request,
//! then hand the result to [`AuthGate::finish`]. Synchronous hosts can use
//! [`AuthGate::submit`].

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_WINDOW_SECS: i64 = 60;
pub const DEFAULT_COOLDOWN_SECS: i64 = 3;

const FALLBACK_REMOTE_MESSAGE: &str = "An error occurred during authentication";
const SIGN_UP_SUCCESS_MESSAGE: &str = "Account created successfully! You can now sign in.";
const CAPTCHA_FAILED_MESSAGE: &str = "Captcha verification failed. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("a submission is already in progress")]
    InFlight,
    #[error("please wait {remaining_secs}s before trying again")]
    CoolingDown { remaining_secs: i64 },
    #[error("Please enter both email and password")]
    MissingCredentials,
    #[error("Too many attempts. Please wait a minute and try again.")]
    RateLimited,
    #[error("Please complete the captcha verification")]
    CaptchaRequired,
    #[error("{0}")]
    Remote(RemoteAuthError),
}

/// Failure reported by the hosted auth service, surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteAuthError {
    message: String,
}

impl RemoteAuthError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            FALLBACK_REMOTE_MESSAGE.to_string()
        } else {
            message
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub captcha_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("captcha_token", &"<redacted>")
            .finish()
    }
}

pub trait AuthBackend {
    fn sign_in(&self, credentials: &Credentials) -> Result<(), RemoteAuthError>;
    fn sign_up(&self, credentials: &Credentials) -> Result<(), RemoteAuthError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    SignIn,
    SignUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    SignedIn,
    SignedUp,
}

/// Proof-of-human widget state. Only `Verified` lets a submission through.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CaptchaState {
    #[default]
    Pending,
    Verified(String),
    Expired,
    Failed,
}

impl CaptchaState {
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Verified(token) => Some(token),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthLimits {
    pub max_attempts: u32,
    pub window: Duration,
    pub cooldown: Duration,
}

impl Default for AuthLimits {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: Duration::seconds(DEFAULT_WINDOW_SECS),
            cooldown: Duration::seconds(DEFAULT_COOLDOWN_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AttemptRecord {
    count: u32,
    last_attempt: DateTime<Utc>,
}

/// Per-email attempt counter. The count resets once the last recorded
/// attempt is older than the window; rejected attempts are not recorded.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    attempts: HashMap<String, AttemptRecord>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            attempts: HashMap::new(),
        }
    }

    /// Records an attempt for `email` and reports whether it is allowed.
    pub fn check(&mut self, email: &str, now: DateTime<Utc>) -> bool {
        let mut count = match self.attempts.get(email) {
            Some(record) => record.count,
            None => 0,
        };
        if let Some(record) = self.attempts.get(email)
            && now - record.last_attempt > self.window
        {
            count = 0;
        }

        if count >= self.max_attempts {
            debug!(email, count, "attempt rejected by rate limit");
            return false;
        }

        self.attempts.insert(
            email.to_string(),
            AttemptRecord {
                count: count + 1,
                last_attempt: now,
            },
        );
        true
    }

    pub fn attempts(&self, email: &str) -> u32 {
        self.attempts.get(email).map(|r| r.count).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct AuthGate {
    mode: AuthMode,
    limiter: RateLimiter,
    cooldown: Duration,
    cooldown_until: Option<DateTime<Utc>>,
    captcha: CaptchaState,
    in_flight: bool,
    error: Option<String>,
    success: Option<String>,
}

impl Default for AuthGate {
    fn default() -> Self {
        Self::new(AuthLimits::default())
    }
}

impl AuthGate {
    pub fn new(limits: AuthLimits) -> Self {
        Self {
            mode: AuthMode::SignIn,
            limiter: RateLimiter::new(limits.max_attempts, limits.window),
            cooldown: limits.cooldown,
            cooldown_until: None,
            captcha: CaptchaState::Pending,
            in_flight: false,
            error: None,
            success: None,
        }
    }

    /// Gate using the `auth.*` limits from the user's configuration.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let limits = cfg.auth_limits()?;
        debug!(
            max_attempts = limits.max_attempts,
            window_secs = limits.window.num_seconds(),
            cooldown_secs = limits.cooldown.num_seconds(),
            "auth limits from config"
        );
        Ok(Self::new(limits))
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn captcha(&self) -> &CaptchaState {
        &self.captcha
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn success(&self) -> Option<&str> {
        self.success.as_deref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map(|until| now < until).unwrap_or(false)
    }

    /// Whether the submit control should be enabled.
    pub fn can_submit(&self, now: DateTime<Utc>) -> bool {
        !self.in_flight && !self.is_cooling_down(now) && self.captcha.token().is_some()
    }

    /// Switching between sign-in and sign-up starts from a clean form.
    pub fn set_mode(&mut self, mode: AuthMode) {
        if self.mode != mode {
            self.mode = mode;
            self.reset_form();
        }
    }

    pub fn reset_form(&mut self) {
        self.error = None;
        self.success = None;
        self.captcha = CaptchaState::Pending;
    }

    pub fn captcha_verified(&mut self, token: impl Into<String>) {
        self.captcha = CaptchaState::Verified(token.into());
    }

    pub fn captcha_expired(&mut self) {
        self.captcha = CaptchaState::Expired;
    }

    pub fn captcha_failed(&mut self) {
        warn!("captcha widget reported an error");
        self.captcha = CaptchaState::Failed;
        self.error = Some(CAPTCHA_FAILED_MESSAGE.to_string());
    }

    /// Runs every pre-submission check. On success the gate is marked in
    /// flight until [`AuthGate::finish`] is called.
    pub fn begin(
        &mut self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Credentials, AuthError> {
        if self.in_flight {
            return Err(AuthError::InFlight);
        }
        if let Some(until) = self.cooldown_until
            && now < until
        {
            return Err(AuthError::CoolingDown {
                remaining_secs: (until - now).num_seconds().max(1),
            });
        }

        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(self.reject(AuthError::MissingCredentials));
        }

        if !self.limiter.check(email, now) {
            self.start_cooldown(now);
            return Err(self.reject(AuthError::RateLimited));
        }

        let Some(token) = self.captcha.token().map(str::to_string) else {
            return Err(self.reject(AuthError::CaptchaRequired));
        };

        self.in_flight = true;
        self.error = None;
        self.success = None;
        debug!(email, mode = ?self.mode, "submission started");

        Ok(Credentials {
            email: email.to_string(),
            password: password.to_string(),
            captcha_token: token,
        })
    }

    /// Applies the backend's answer to an in-flight submission.
    pub fn finish(
        &mut self,
        result: Result<(), RemoteAuthError>,
        now: DateTime<Utc>,
    ) -> Result<AuthOutcome, AuthError> {
        self.in_flight = false;
        match result {
            Ok(()) => match self.mode {
                AuthMode::SignIn => {
                    info!("signed in");
                    Ok(AuthOutcome::SignedIn)
                }
                AuthMode::SignUp => {
                    info!("account created");
                    self.mode = AuthMode::SignIn;
                    self.reset_form();
                    self.success = Some(SIGN_UP_SUCCESS_MESSAGE.to_string());
                    Ok(AuthOutcome::SignedUp)
                }
            },
            Err(remote) => {
                warn!(error = %remote, "authentication failed");
                self.start_cooldown(now);
                self.captcha = CaptchaState::Pending;
                Err(self.reject(AuthError::Remote(remote)))
            }
        }
    }

    pub fn submit<B: AuthBackend>(
        &mut self,
        backend: &B,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthOutcome, AuthError> {
        let credentials = self.begin(email, password, now)?;
        let result = match self.mode {
            AuthMode::SignIn => backend.sign_in(&credentials),
            AuthMode::SignUp => backend.sign_up(&credentials),
        };
        self.finish(result, now)
    }

    fn start_cooldown(&mut self, now: DateTime<Utc>) {
        let until = now
            .checked_add_signed(self.cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.cooldown_until = Some(until);
    }

    fn reject(&mut self, err: AuthError) -> AuthError {
        self.error = Some(err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[derive(Default)]
    struct FakeBackend {
        fail_with: Option<String>,
        calls: RefCell<Vec<(AuthMode, String)>>,
    }

    impl FakeBackend {
        fn answer(&self, mode: AuthMode, credentials: &Credentials) -> Result<(), RemoteAuthError> {
            self.calls
                .borrow_mut()
                .push((mode, credentials.email.clone()));
            match &self.fail_with {
                Some(message) => Err(RemoteAuthError::new(message.clone())),
                None => Ok(()),
            }
        }
    }

    impl AuthBackend for FakeBackend {
        fn sign_in(&self, credentials: &Credentials) -> Result<(), RemoteAuthError> {
            self.answer(AuthMode::SignIn, credentials)
        }

        fn sign_up(&self, credentials: &Credentials) -> Result<(), RemoteAuthError> {
            self.answer(AuthMode::SignUp, credentials)
        }
    }

    #[test]
    fn sixth_attempt_in_window_is_rejected_until_window_passes() {
        let mut limiter = RateLimiter::new(5, Duration::seconds(60));
        for i in 0..5 {
            assert!(limiter.check("[email protected]", t0() + Duration::seconds(i)));
        }
        assert_eq!(limiter.attempts("[email protected]"), 5);
        assert!(!limiter.check("[email protected]", t0() + Duration::seconds(10)));
        assert!(limiter.check("[email protected]", t0() + Duration::seconds(4 + 61)));
        assert_eq!(limiter.attempts("[email protected]"), 1);
    }

    #[test]
    fn limits_are_tracked_per_email() {
        let mut limiter = RateLimiter::new(1, Duration::seconds(60));
        assert!(limiter.check("[email protected]", t0()));
        assert!(!limiter.check("[email protected]", t0()));
        assert!(limiter.check("[email protected]", t0()));
    }

    #[test]
    fn gate_rate_limit_message_and_cooldown() {
        let mut gate = AuthGate::default();
        gate.captcha_verified("tok");
        let backend = FakeBackend {
            fail_with: Some("Invalid login credentials".to_string()),
            ..FakeBackend::default()
        };

        let mut now = t0();
        for _ in 0..5 {
            let err = gate.submit(&backend, "[email protected]", "pw", now).unwrap_err();
            assert_eq!(err.to_string(), "Invalid login credentials");
            gate.captcha_verified("tok");
            now += Duration::seconds(4);
        }

        let err = gate.submit(&backend, "[email protected]", "pw", now).unwrap_err();
        assert_eq!(err, AuthError::RateLimited);
        assert_eq!(
            gate.error(),
            Some("Too many attempts. Please wait a minute and try again.")
        );
        assert_eq!(backend.calls.borrow().len(), 5);
        assert!(gate.is_cooling_down(now));
        assert!(matches!(
            gate.begin("[email protected]", "pw", now + Duration::seconds(1)),
            Err(AuthError::CoolingDown { .. })
        ));

        let later = now + Duration::seconds(61);
        let outcome = FakeBackend::default();
        assert_eq!(
            gate.submit(&outcome, "[email protected]", "pw", later),
            Ok(AuthOutcome::SignedIn)
        );
    }

    #[test]
    fn validation_runs_before_captcha() {
        let mut gate = AuthGate::default();
        assert_eq!(
            gate.begin("", "pw", t0()),
            Err(AuthError::MissingCredentials)
        );
        assert_eq!(gate.error(), Some("Please enter both email and password"));

        assert_eq!(
            gate.begin("[email protected]", "pw", t0()),
            Err(AuthError::CaptchaRequired)
        );
        assert!(!gate.can_submit(t0()));
    }

    #[test]
    fn expired_captcha_blocks_submission() {
        let mut gate = AuthGate::default();
        gate.captcha_verified("tok");
        assert!(gate.can_submit(t0()));
        gate.captcha_expired();
        assert!(!gate.can_submit(t0()));
        assert_eq!(
            gate.begin("[email protected]", "pw", t0()),
            Err(AuthError::CaptchaRequired)
        );

        gate.captcha_failed();
        assert_eq!(gate.captcha(), &CaptchaState::Failed);
        assert_eq!(
            gate.error(),
            Some("Captcha verification failed. Please try again.")
        );
    }

    #[test]
    fn duplicate_submission_blocked_while_in_flight() {
        let mut gate = AuthGate::default();
        gate.captcha_verified("tok");
        let creds = gate.begin("[email protected]", "pw", t0()).unwrap();
        assert_eq!(creds.captcha_token, "tok");
        assert!(gate.is_in_flight());
        assert!(!gate.can_submit(t0()));
        assert_eq!(gate.begin("[email protected]", "pw", t0()), Err(AuthError::InFlight));

        assert_eq!(gate.finish(Ok(()), t0()), Ok(AuthOutcome::SignedIn));
        assert!(!gate.is_in_flight());
    }

    #[test]
    fn remote_failure_resets_captcha_and_starts_cooldown() {
        let mut gate = AuthGate::default();
        gate.captcha_verified("tok");
        gate.begin("[email protected]", "pw", t0()).unwrap();

        let err = gate
            .finish(Err(RemoteAuthError::new("")), t0())
            .unwrap_err();
        assert_eq!(err.to_string(), "An error occurred during authentication");
        assert_eq!(gate.captcha(), &CaptchaState::Pending);
        assert!(gate.is_cooling_down(t0() + Duration::seconds(2)));
        assert!(!gate.is_cooling_down(t0() + Duration::seconds(3)));
    }

    #[test]
    fn cooldown_saturates_instead_of_overflowing() {
        let mut gate = AuthGate::new(AuthLimits {
            cooldown: Duration::MAX,
            ..AuthLimits::default()
        });
        gate.captcha_verified("tok");
        gate.begin("[email protected]", "pw", t0()).unwrap();

        assert!(gate.finish(Err(RemoteAuthError::new("nope")), t0()).is_err());
        assert!(gate.is_cooling_down(t0() + Duration::days(365 * 1000)));
        assert!(!gate.can_submit(t0()));
    }

    #[test]
    fn sign_up_success_switches_back_to_sign_in() {
        let mut gate = AuthGate::default();
        gate.set_mode(AuthMode::SignUp);
        gate.captcha_verified("tok");
        let backend = FakeBackend::default();

        let outcome = gate.submit(&backend, "  [email protected] ", "pw", t0());
        assert_eq!(outcome, Ok(AuthOutcome::SignedUp));
        assert_eq!(gate.mode(), AuthMode::SignIn);
        assert_eq!(
            gate.success(),
            Some("Account created successfully! You can now sign in.")
        );
        assert_eq!(gate.captcha(), &CaptchaState::Pending);
        assert_eq!(
            backend.calls.borrow().as_slice(),
            &[(AuthMode::SignUp, "[email protected]".to_string())]
        );
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let creds = Credentials {
            email: "[email protected]".to_string(),
            password: "hunter2".to_string(),
            captcha_token: "tok".to_string(),
        };
        let printed = format!("{creds:?}");
        assert!(printed.contains("[email protected]"));
        assert!(!printed.contains("hunter2"));
    }
}
