//! Scripted in-memory device for testing without fprintd
//!
//! The device behaves like the real service where it matters to a session:
//! a second claim while claimed is refused, releasing without a claim is an
//! error, and each `verify_start` delivers the scripted events up to and
//! including the next scan outcome for this device. When the script runs
//! out the event stream ends, unless [`MockDevice::hold_open`] was used.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::device::{EventStream, FingerprintDevice, DEFAULT_DEVICE_PATH};
use crate::error::{RemoteError, RemoteErrorKind};
use crate::event::VerificationEvent;

/// A call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Subscribe,
    Claim(String),
    VerifyStart(String),
    Release,
}

#[derive(Default)]
struct Failures {
    /// 1-based call number and error name
    claim: Option<(u32, String)>,
    verify_start: Option<(u32, String)>,
    release: Option<(u32, String)>,
    subscribe: Option<String>,
}

struct MockState {
    script: VecDeque<VerificationEvent>,
    sender: Option<mpsc::UnboundedSender<VerificationEvent>>,
    receiver: Option<mpsc::UnboundedReceiver<VerificationEvent>>,
    hold_open: bool,
    claimed: bool,
    calls: Vec<MockCall>,
    failures: Failures,
}

/// Scripted fingerprint device
pub struct MockDevice {
    path: String,
    state: Mutex<MockState>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// A device at the default fprintd path with an empty script
    pub fn new() -> Self {
        Self::with_path(DEFAULT_DEVICE_PATH)
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            path: path.into(),
            state: Mutex::new(MockState {
                script: VecDeque::new(),
                sender: Some(sender),
                receiver: Some(receiver),
                hold_open: false,
                claimed: false,
                calls: Vec::new(),
                failures: Failures::default(),
            }),
        }
    }

    /// Append events to the script
    pub fn with_events(self, events: impl IntoIterator<Item = VerificationEvent>) -> Self {
        self.lock().script.extend(events);
        self
    }

    /// Keep the event stream open once the script is exhausted
    pub fn hold_open(self) -> Self {
        self.lock().hold_open = true;
        self
    }

    /// Fail the `nth` claim with the given D-Bus error name
    pub fn fail_claim(self, nth: u32, error_name: &str) -> Self {
        self.lock().failures.claim = Some((nth, error_name.to_string()));
        self
    }

    /// Fail the `nth` verify start with the given D-Bus error name
    pub fn fail_verify_start(self, nth: u32, error_name: &str) -> Self {
        self.lock().failures.verify_start = Some((nth, error_name.to_string()));
        self
    }

    /// Fail the `nth` release with the given D-Bus error name
    ///
    /// A failed release still drops the claim, as fprintd does when the
    /// caller goes away.
    pub fn fail_release(self, nth: u32, error_name: &str) -> Self {
        self.lock().failures.release = Some((nth, error_name.to_string()));
        self
    }

    /// Refuse the event subscription
    pub fn fail_subscribe(self, error_name: &str) -> Self {
        self.lock().failures.subscribe = Some(error_name.to_string());
        self
    }

    /// Every call seen so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn claims(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Claim(_)))
    }

    pub fn releases(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Release))
    }

    pub fn verify_starts(&self) -> usize {
        self.count(|c| matches!(c, MockCall::VerifyStart(_)))
    }

    pub fn is_claimed(&self) -> bool {
        self.lock().claimed
    }

    /// Events not yet delivered
    pub fn remaining_events(&self) -> usize {
        self.lock().script.len()
    }

    fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock device state poisoned")
    }
}

impl MockState {
    fn nth_call(&self, pred: impl Fn(&MockCall) -> bool) -> u32 {
        self.calls.iter().filter(|c| pred(c)).count() as u32
    }

    /// Deliver scripted events for one verify cycle
    fn deliver_cycle(&mut self, path: &str) {
        let Some(sender) = self.sender.as_ref() else {
            return;
        };

        while let Some(event) = self.script.pop_front() {
            let ends_cycle = event
                .result_for(path)
                .map(|r| r.is_scan_outcome())
                .unwrap_or(false);
            let _ = sender.send(event);
            if ends_cycle {
                break;
            }
        }

        if self.script.is_empty() && !self.hold_open {
            self.sender = None;
        }
    }
}

fn failure(failure: &Option<(u32, String)>, call_number: u32) -> Option<RemoteError> {
    match failure {
        Some((nth, name)) if *nth == call_number => {
            Some(RemoteError::from_reply(name.clone(), "scripted failure"))
        }
        _ => None,
    }
}

#[async_trait]
impl FingerprintDevice for MockDevice {
    fn object_path(&self) -> &str {
        &self.path
    }

    async fn claim(&self, username: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.calls.push(MockCall::Claim(username.to_string()));
        let n = state.nth_call(|c| matches!(c, MockCall::Claim(_)));

        if let Some(err) = failure(&state.failures.claim, n) {
            return Err(err);
        }
        if state.claimed {
            return Err(RemoteError::from_reply(
                "net.reactivated.Fprint.Error.AlreadyInUse",
                "Device was already claimed",
            ));
        }
        state.claimed = true;
        Ok(())
    }

    async fn release(&self) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.calls.push(MockCall::Release);
        let n = state.nth_call(|c| matches!(c, MockCall::Release));

        if !state.claimed {
            return Err(RemoteError::from_reply(
                "net.reactivated.Fprint.Error.ClaimDevice",
                "Device was not claimed before use",
            ));
        }
        state.claimed = false;

        match failure(&state.failures.release, n) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn verify_start(&self, finger: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.calls.push(MockCall::VerifyStart(finger.to_string()));
        let n = state.nth_call(|c| matches!(c, MockCall::VerifyStart(_)));

        if let Some(err) = failure(&state.failures.verify_start, n) {
            return Err(err);
        }
        if !state.claimed {
            return Err(RemoteError::from_reply(
                "net.reactivated.Fprint.Error.ClaimDevice",
                "Device was not claimed before use",
            ));
        }

        state.deliver_cycle(&self.path);
        Ok(())
    }

    async fn events(&self) -> Result<EventStream, RemoteError> {
        let mut state = self.lock();
        state.calls.push(MockCall::Subscribe);

        if let Some(name) = state.failures.subscribe.clone() {
            return Err(RemoteError::from_reply(name, "scripted failure"));
        }

        let mut receiver = state.receiver.take().ok_or_else(|| {
            RemoteError::new(RemoteErrorKind::Other, "mock device supports one subscription")
        })?;

        Ok(Box::pin(futures_util::stream::poll_fn(move |cx| {
            receiver.poll_recv(cx)
        })))
    }
}
