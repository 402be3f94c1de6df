//! Console text for session progress and outcomes

use fprint_core::{SessionUpdate, VerifyError, Verified};

pub const SUCCESS_LINE: &str = "Verification successful ✅";
pub const FAILURE_LINE: &str = "Verification failed ❌";

/// Prompt for a progress update, if the user needs to see one
pub fn update_message(update: &SessionUpdate) -> Option<String> {
    match update {
        SessionUpdate::ScanRequested { cycle: 1 } => {
            Some("Place your finger on the scanner...".to_string())
        }
        SessionUpdate::ScanRequested { .. } => {
            Some("Please retry scanning your finger...".to_string())
        }
        SessionUpdate::Hint(result) => result.hint().map(|h| format!("{}...", h)),
        SessionUpdate::NoMatch { remaining: 0, .. } => None,
        SessionUpdate::NoMatch { remaining, .. } => Some(format!(
            "Verification failed. Retrying... ({} {} left)",
            remaining,
            if *remaining == 1 { "attempt" } else { "attempts" }
        )),
        SessionUpdate::Claimed { .. } | SessionUpdate::Matched | SessionUpdate::Released => None,
    }
}

/// Lines describing the final outcome
pub fn outcome_lines(outcome: &Result<Verified, VerifyError>) -> Vec<String> {
    match outcome {
        Ok(_) => vec![SUCCESS_LINE.to_string()],
        Err(e) => vec![failure_cause(e), FAILURE_LINE.to_string()],
    }
}

fn failure_cause(err: &VerifyError) -> String {
    match err {
        VerifyError::AttemptsExhausted { .. } => "Max attempts exhausted.".to_string(),
        VerifyError::Cleanup { cause, release } => format!(
            "{} Releasing the scanner also failed: {}",
            failure_cause(cause),
            release
        ),
        other => format!("An error occurred: {}", other),
    }
}

/// Exit status: 0 only for a verified match
pub fn exit_code(outcome: &Result<Verified, VerifyError>) -> u8 {
    match outcome {
        Ok(_) => 0,
        Err(_) => 1,
    }
}
