//! Verification session state machine
//!
//! A session drives one [`FingerprintDevice`] through the protocol
//!
//! ```text
//! Idle -> claim -> Claimed -> verify_start -> Verifying
//!   Verifying + match     -> release -> Succeeded
//!   Verifying + no-match  -> attempts += 1
//!       attempts == max   -> release -> Failed(AttemptsExhausted)
//!       otherwise         -> release -> claim -> verify_start -> Verifying
//!   Verifying + stream end / timeout -> release -> Failed(ConnectionLost)
//!   Verifying + shutdown  -> release -> Failed(Cancelled)
//! ```
//!
//! Every claim the session acquires is released exactly once before
//! [`VerificationSession::run`] returns. Remote call failures are terminal
//! and never retried; only completed non-matching scans are retried.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::{VerifyConfig, DEFAULT_MAX_ATTEMPTS};
use crate::device::{ClaimGuard, EventStream, FingerprintDevice, ANY_FINGER};
use crate::error::{Result, VerifyError};
use crate::event::{VerificationEvent, VerifyResult};

/// Why a session failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Remote,
    AttemptsExhausted,
    ConnectionLost,
    Cancelled,
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Claimed,
    Verifying,
    Succeeded,
    Failed(FailureKind),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

/// Progress notifications for whoever is prompting the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// The device was claimed for verify cycle `cycle` (1-based)
    Claimed { cycle: u32 },
    /// Verification started, the user should scan
    ScanRequested { cycle: u32 },
    /// The device asked for a rescan within the current cycle
    Hint(VerifyResult),
    /// A scan completed without matching
    NoMatch { attempts: u32, remaining: u32 },
    /// A scan matched
    Matched,
    /// The claim was given back
    Released,
}

/// Successful verification summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verified {
    /// Non-matching scans before the match
    pub attempts: u32,
    /// Claim/verify cycles used
    pub cycles: u32,
}

enum Wait {
    Event(VerificationEvent),
    Closed,
    TimedOut,
    Shutdown,
}

/// One authentication attempt against a device
pub struct VerificationSession<D: FingerprintDevice + ?Sized + 'static> {
    device: Arc<D>,
    username: String,
    finger: String,
    max_attempts: u32,
    event_timeout: Option<Duration>,
    attempts: u32,
    cycles: u32,
    state: SessionState,
    updates: broadcast::Sender<SessionUpdate>,
}

impl<D: FingerprintDevice + ?Sized + 'static> VerificationSession<D> {
    /// Create a session with default settings
    pub fn new(device: Arc<D>) -> Self {
        let (updates, _) = broadcast::channel(16);
        Self {
            device,
            username: String::new(),
            finger: ANY_FINGER.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            event_timeout: None,
            attempts: 0,
            cycles: 0,
            state: SessionState::Idle,
            updates,
        }
    }

    /// Create a session using the user, finger, bound and timeout in `config`
    pub fn from_config(device: Arc<D>, config: &VerifyConfig) -> Self {
        Self::new(device)
            .with_username(config.username.clone())
            .with_finger(config.finger.clone())
            .with_max_attempts(config.max_attempts)
            .with_event_timeout(config.event_timeout())
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_finger(mut self, finger: impl Into<String>) -> Self {
        self.finger = finger.into();
        self
    }

    /// Set the retry bound (at least one scan is always allowed)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_event_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.event_timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Subscribe to progress updates
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Run the session to a terminal outcome
    pub async fn run(&mut self) -> Result<Verified> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run the session, giving up with [`VerifyError::Cancelled`] once
    /// `shutdown` completes while waiting for a scan
    ///
    /// Running a session again starts over from `Idle` with a fresh
    /// attempt counter.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<Verified>
    where
        F: Future<Output = ()>,
    {
        self.state = SessionState::Idle;
        self.attempts = 0;
        self.cycles = 0;

        tokio::pin!(shutdown);

        info!(
            "Starting verification on {} (max {} attempts)",
            self.device.object_path(),
            self.max_attempts
        );

        let mut events = match self.device.events().await {
            Ok(events) => events,
            Err(e) => return Err(self.fail(e.into())),
        };

        let mut claim = self.begin_cycle().await?;

        loop {
            let event = match next_event(&mut events, self.event_timeout, &mut shutdown).await {
                Wait::Event(event) => event,
                Wait::Closed => {
                    warn!("Event stream ended before a scan outcome");
                    return Err(self.release_and_fail(claim, VerifyError::ConnectionLost).await);
                }
                Wait::TimedOut => {
                    warn!("Timed out waiting for a scan outcome");
                    return Err(self.release_and_fail(claim, VerifyError::ConnectionLost).await);
                }
                Wait::Shutdown => {
                    info!("Shutdown requested while waiting for a scan");
                    return Err(self.release_and_fail(claim, VerifyError::Cancelled).await);
                }
            };

            let Some(result) = event.result_for(self.device.object_path()).cloned() else {
                debug!("Ignoring out-of-scope event: {:?}", event);
                continue;
            };

            match result {
                VerifyResult::Match => {
                    info!("Scan matched after {} failed attempts", self.attempts);
                    self.notify(SessionUpdate::Matched);
                    return self.finish(claim).await;
                }
                VerifyResult::NoMatch => {
                    self.attempts += 1;
                    let remaining = self.max_attempts.saturating_sub(self.attempts);
                    info!(
                        "Scan did not match ({}/{})",
                        self.attempts, self.max_attempts
                    );
                    self.notify(SessionUpdate::NoMatch {
                        attempts: self.attempts,
                        remaining,
                    });

                    if remaining == 0 {
                        let err = VerifyError::AttemptsExhausted {
                            attempts: self.attempts,
                        };
                        return Err(self.release_and_fail(claim, err).await);
                    }

                    // The service drops verify state on release, so each
                    // retry gets a fresh claim.
                    if let Err(e) = claim.release().await {
                        return Err(self.fail(e.into()));
                    }
                    self.notify(SessionUpdate::Released);
                    claim = self.begin_cycle().await?;
                }
                hint if hint.is_retry_hint() => {
                    debug!("Device asked for a rescan: {}", hint);
                    self.notify(SessionUpdate::Hint(hint));
                }
                other => {
                    warn!("Ignoring verify status {}", other);
                }
            }
        }
    }

    /// Claim the device and start a verify cycle
    ///
    /// On failure the session is already in its terminal state and any
    /// claim taken here has been released.
    async fn begin_cycle(&mut self) -> Result<ClaimGuard<D>> {
        self.cycles += 1;

        let claim = match ClaimGuard::acquire(Arc::clone(&self.device), &self.username).await {
            Ok(claim) => claim,
            Err(e) => return Err(self.fail(e.into())),
        };
        self.state = SessionState::Claimed;
        self.notify(SessionUpdate::Claimed { cycle: self.cycles });

        if let Err(e) = self.device.verify_start(&self.finger).await {
            return Err(self.release_and_fail(claim, e.into()).await);
        }
        self.state = SessionState::Verifying;
        self.notify(SessionUpdate::ScanRequested { cycle: self.cycles });

        Ok(claim)
    }

    /// Release after a match
    ///
    /// A failed release turns the outcome into a failure.
    async fn finish(&mut self, claim: ClaimGuard<D>) -> Result<Verified> {
        if let Err(e) = claim.release().await {
            return Err(self.fail(e.into()));
        }
        self.notify(SessionUpdate::Released);
        self.state = SessionState::Succeeded;

        info!("Verification succeeded");
        Ok(Verified {
            attempts: self.attempts,
            cycles: self.cycles,
        })
    }

    async fn release_and_fail(&mut self, claim: ClaimGuard<D>, err: VerifyError) -> VerifyError {
        let err = match claim.release().await {
            Ok(()) => {
                self.notify(SessionUpdate::Released);
                err
            }
            Err(release) => err.with_release_failure(release),
        };
        self.fail(err)
    }

    fn fail(&mut self, err: VerifyError) -> VerifyError {
        self.state = SessionState::Failed(err.kind());
        warn!("Verification failed: {}", err);
        err
    }

    fn notify(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }
}

async fn next_event<F>(
    events: &mut EventStream,
    timeout: Option<Duration>,
    shutdown: &mut Pin<&mut F>,
) -> Wait
where
    F: Future<Output = ()>,
{
    let next = async {
        let event = match timeout {
            Some(limit) => match tokio::time::timeout(limit, events.next()).await {
                Ok(event) => event,
                Err(_) => return Wait::TimedOut,
            },
            None => events.next().await,
        };
        match event {
            Some(event) => Wait::Event(event),
            None => Wait::Closed,
        }
    };

    tokio::select! {
        wait = next => wait,
        _ = shutdown.as_mut() => Wait::Shutdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DEFAULT_DEVICE_PATH;
    use crate::error::RemoteErrorKind;
    use crate::mock::{MockCall, MockDevice};

    fn status(result: VerifyResult) -> VerificationEvent {
        VerificationEvent::status(DEFAULT_DEVICE_PATH, result, true)
    }

    #[tokio::test]
    async fn test_match_on_first_scan() {
        let device = Arc::new(MockDevice::new().with_events([status(VerifyResult::Match)]));
        let mut session = VerificationSession::new(Arc::clone(&device));

        let verified = session.run().await.unwrap();

        assert_eq!(verified, Verified { attempts: 0, cycles: 1 });
        assert_eq!(session.state(), SessionState::Succeeded);
        assert_eq!(
            device.calls(),
            vec![
                MockCall::Claim(String::new()),
                MockCall::VerifyStart("any".to_string()),
                MockCall::Release,
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_reclaims_between_scans() {
        let device = Arc::new(MockDevice::new().with_events([
            status(VerifyResult::NoMatch),
            status(VerifyResult::NoMatch),
            status(VerifyResult::Match),
        ]));
        let mut session = VerificationSession::new(Arc::clone(&device)).with_max_attempts(3);

        let verified = session.run().await.unwrap();

        assert_eq!(verified.attempts, 2);
        assert_eq!(verified.cycles, 3);
        assert_eq!(device.claims(), 3);
        assert_eq!(device.releases(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts() {
        let device = Arc::new(MockDevice::new().with_events([
            status(VerifyResult::NoMatch),
            status(VerifyResult::NoMatch),
            status(VerifyResult::NoMatch),
        ]));
        let mut session = VerificationSession::new(Arc::clone(&device));

        let err = session.run().await.unwrap_err();

        assert!(matches!(err, VerifyError::AttemptsExhausted { attempts: 3 }));
        assert_eq!(session.state(), SessionState::Failed(FailureKind::AttemptsExhausted));
        assert_eq!(device.claims(), 3);
        assert_eq!(device.releases(), 3);
    }

    #[tokio::test]
    async fn test_claim_failure_releases_nothing() {
        let device = Arc::new(MockDevice::new().fail_claim(1, "net.reactivated.Fprint.Error.AlreadyInUse"));
        let mut session = VerificationSession::new(Arc::clone(&device));

        let err = session.run().await.unwrap_err();

        match err {
            VerifyError::Remote(remote) => assert_eq!(remote.kind(), RemoteErrorKind::AlreadyInUse),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.state(), SessionState::Failed(FailureKind::Remote));
        assert_eq!(device.releases(), 0);
    }

    #[tokio::test]
    async fn test_verify_start_failure_releases() {
        let device = Arc::new(
            MockDevice::new().fail_verify_start(1, "net.reactivated.Fprint.Error.NoEnrolledPrints"),
        );
        let mut session = VerificationSession::new(Arc::clone(&device));

        let err = session.run().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Remote);
        assert_eq!(device.claims(), 1);
        assert_eq!(device.releases(), 1);
    }

    #[tokio::test]
    async fn test_stream_end_is_connection_lost() {
        let device = Arc::new(MockDevice::new());
        let mut session = VerificationSession::new(Arc::clone(&device));

        let err = session.run().await.unwrap_err();

        assert!(matches!(err, VerifyError::ConnectionLost));
        assert_eq!(device.releases(), 1);
    }

    #[tokio::test]
    async fn test_ignored_events_do_not_count() {
        let device = Arc::new(MockDevice::new().with_events([
            status(VerifyResult::RetryScan),
            status(VerifyResult::Unrecognized("verify-sneeze".to_string())),
            VerificationEvent::status("/net/reactivated/Fprint/Device/1", VerifyResult::NoMatch, true),
            VerificationEvent::Other {
                device: DEFAULT_DEVICE_PATH.to_string(),
                member: "EnrollStatus".to_string(),
            },
            status(VerifyResult::Match),
        ]));
        let mut session = VerificationSession::new(Arc::clone(&device));

        let verified = session.run().await.unwrap();

        assert_eq!(verified.attempts, 0);
        assert_eq!(verified.cycles, 1);
    }

    #[tokio::test]
    async fn test_updates_are_published() {
        let device = Arc::new(MockDevice::new().with_events([
            status(VerifyResult::SwipeTooShort),
            status(VerifyResult::NoMatch),
            status(VerifyResult::Match),
        ]));
        let mut session = VerificationSession::new(Arc::clone(&device));
        let mut updates = session.subscribe();

        session.run().await.unwrap();

        let mut seen = Vec::new();
        while let Ok(update) = updates.try_recv() {
            seen.push(update);
        }
        assert_eq!(
            seen,
            vec![
                SessionUpdate::Claimed { cycle: 1 },
                SessionUpdate::ScanRequested { cycle: 1 },
                SessionUpdate::Hint(VerifyResult::SwipeTooShort),
                SessionUpdate::NoMatch { attempts: 1, remaining: 2 },
                SessionUpdate::Released,
                SessionUpdate::Claimed { cycle: 2 },
                SessionUpdate::ScanRequested { cycle: 2 },
                SessionUpdate::Matched,
                SessionUpdate::Released,
            ]
        );
    }

    #[tokio::test]
    async fn test_release_failure_after_exhaustion_keeps_cause() {
        let device = Arc::new(
            MockDevice::new()
                .with_events([status(VerifyResult::NoMatch)])
                .fail_release(1, "net.reactivated.Fprint.Error.Internal"),
        );
        let mut session = VerificationSession::new(Arc::clone(&device)).with_max_attempts(1);

        let err = session.run().await.unwrap_err();

        match err {
            VerifyError::Cleanup { cause, release } => {
                assert!(matches!(*cause, VerifyError::AttemptsExhausted { attempts: 1 }));
                assert_eq!(release.kind(), RemoteErrorKind::Internal);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.state(), SessionState::Failed(FailureKind::AttemptsExhausted));
    }

    #[tokio::test]
    async fn test_release_failure_after_match_fails_closed() {
        let device = Arc::new(
            MockDevice::new()
                .with_events([status(VerifyResult::Match)])
                .fail_release(1, "net.reactivated.Fprint.Error.Internal"),
        );
        let mut session = VerificationSession::new(Arc::clone(&device));

        let err = session.run().await.unwrap_err();

        assert!(matches!(err, VerifyError::Remote(_)));
        assert_eq!(session.state(), SessionState::Failed(FailureKind::Remote));
    }

    #[tokio::test]
    async fn test_timeout_is_connection_lost() {
        let device = Arc::new(MockDevice::new().hold_open());
        let mut session = VerificationSession::new(Arc::clone(&device))
            .with_event_timeout(Some(Duration::from_millis(20)));

        let err = session.run().await.unwrap_err();

        assert!(matches!(err, VerifyError::ConnectionLost));
        assert_eq!(device.releases(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_releases() {
        let device = Arc::new(MockDevice::new().hold_open());
        let mut session = VerificationSession::new(Arc::clone(&device));

        let err = session
            .run_until(tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap_err();

        assert!(matches!(err, VerifyError::Cancelled));
        assert_eq!(session.state(), SessionState::Failed(FailureKind::Cancelled));
        assert_eq!(device.claims(), device.releases());
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = VerifyConfig {
            username: "alice".to_string(),
            finger: "right-index-finger".to_string(),
            max_attempts: 2,
            ..Default::default()
        };
        let device = Arc::new(MockDevice::new().with_events([status(VerifyResult::Match)]));
        let mut session = VerificationSession::from_config(Arc::clone(&device), &config);
        assert_eq!(session.max_attempts(), 2);

        session.run().await.unwrap();

        assert_eq!(
            device.calls()[..2],
            [
                MockCall::Claim("alice".to_string()),
                MockCall::VerifyStart("right-index-finger".to_string()),
            ]
        );
    }
}
