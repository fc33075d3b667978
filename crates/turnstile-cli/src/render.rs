//! Human-readable redemption output for interactive mode.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use turnstile_core::{RejectReason, Redemption};

/// Describe a redemption for a person at the desk.
pub fn describe(redemption: &Redemption, at: DateTime<Utc>, tz: Tz) -> String {
    let local = at.with_timezone(&tz).format("%d-%b-%Y %H:%M:%S %Z");
    let mut out = String::new();

    match redemption {
        Redemption::Accepted {
            user_id,
            event_type,
            exit,
            ..
        } => {
            let _ = writeln!(out, "CODE VALID ({local})");
            let _ = writeln!(out, "  User ID:    {user_id}");
            let _ = write!(out, "  Event Type: {event_type}");
            if let Some(exit) = exit {
                let _ = write!(out, "\n  Session:    {}", format_duration(exit.duration_secs));
            }
        }
        Redemption::Rejected(reason) => {
            let _ = write!(out, "CODE INVALID ({local}): {}", rejection_text(*reason));
        }
        Redemption::StoreError(err) if err.is_outcome_unknown() => {
            let _ = write!(
                out,
                "NOT CONFIRMED ({local}): the store did not answer in time; \
                 the code may already be used. Scan it again to check."
            );
        }
        Redemption::StoreError(err) => {
            let _ = write!(out, "NOT PROCESSED ({local}): store unavailable: {err}");
        }
        Redemption::DownstreamFailure {
            user_id,
            event_type,
            stage,
            ..
        } => {
            let _ = writeln!(out, "CODE VALID ({local}), but the {stage} update failed");
            let _ = writeln!(out, "  User ID:    {user_id}");
            let _ = write!(out, "  Event Type: {event_type}");
        }
    }

    out
}

const fn rejection_text(reason: RejectReason) -> &'static str {
    match reason {
        RejectReason::EmptyInput => "please enter an access code",
        RejectReason::NotFound => "code does not exist or was already used",
        RejectReason::Malformed => "code record is incomplete",
        RejectReason::Expired => "code has expired and has been removed",
    }
}

fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else {
        format!("{m}m {s:02}s")
    }
}
