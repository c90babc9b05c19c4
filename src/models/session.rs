use chrono::{DateTime, Duration, Utc};
use postgres_types::{FromSql, ToSql};
use serde::Serialize;
use uuid::Uuid;

/// The inactivity window in minutes. A session that keeps receiving traffic
/// never expires; one idle past this window does.
pub const IDLE_TIMEOUT_MINUTES: i64 = 15;

/// Why a session stopped being live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSql, FromSql)]
#[postgres(name = "session_end_reason")]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    #[postgres(name = "logout")]
    Logout,
    #[postgres(name = "timeout")]
    Timeout,
    #[postgres(name = "forced")]
    Forced,
}

/// Represents a server-side session backing an issued bearer token.
///
/// The token itself is never stored; `token_hash` is the lookup key.
#[derive(Debug, Clone)]
pub struct Session {
    /// The unique identifier for the session.
    pub id: Uuid,
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// SHA-256 hex digest of the issued bearer token.
    pub token_hash: String,
    /// Free-form device description captured at login.
    pub device: Option<String>,
    /// Client IP captured at login.
    pub ip_address: Option<String>,
    /// Whether the session is still live.
    pub is_active: bool,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The last time an authenticated request used this session.
    pub last_activity: DateTime<Utc>,
    /// The timestamp when the session expires; slid forward on activity.
    pub expires_at: DateTime<Utc>,
    /// When the session stopped being live.
    pub ended_at: Option<DateTime<Utc>>,
    /// Why the session stopped being live.
    pub end_reason: Option<EndReason>,
}

/// The outcome of assessing a session against the sliding window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// Still live; slide the window forward to these values.
    Extend {
        last_activity: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    /// No longer live; mark ended with reason timeout.
    TimedOut,
}

impl Session {
    /// The `expires_at` a session created or validated at `now` slides to.
    pub fn next_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::minutes(IDLE_TIMEOUT_MINUTES)
    }

    /// True when the inactivity window has been breached, regardless of the
    /// recorded `expires_at`. Covers clock-skew and extension races where
    /// `expires_at` outlives actual activity.
    pub fn idle_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.last_activity > Duration::minutes(IDLE_TIMEOUT_MINUTES)
    }

    /// Assesses the session at `now`: either it extends, or it timed out.
    pub fn assess(&self, now: DateTime<Utc>) -> Liveness {
        if !self.is_active || self.expires_at <= now || self.idle_expired(now) {
            Liveness::TimedOut
        } else {
            Liveness::Extend {
                last_activity: now,
                expires_at: Self::next_expiry(now),
            }
        }
    }
}

/// Session representation for API responses.
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub device: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Whether this is the session the request was authenticated with.
    pub current: bool,
}

impl SessionInfo {
    /// Builds the response shape, marking the caller's own session.
    pub fn from_session(session: &Session, current_id: Uuid) -> Self {
        Self {
            id: session.id,
            device: session.device.clone(),
            ip_address: session.ip_address.clone(),
            created_at: session.created_at,
            last_activity: session.last_activity,
            expires_at: session.expires_at,
            current: session.id == current_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(t0: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "ab".repeat(32),
            device: None,
            ip_address: None,
            is_active: true,
            created_at: t0,
            last_activity: t0,
            expires_at: Session::next_expiry(t0),
            ended_at: None,
            end_reason: None,
        }
    }

    #[test]
    fn traffic_inside_the_window_slides_expiry() {
        let t0 = Utc::now();
        let session = session_at(t0);
        let t1 = t0 + Duration::minutes(10);

        match session.assess(t1) {
            Liveness::Extend {
                last_activity,
                expires_at,
            } => {
                assert_eq!(last_activity, t1);
                assert_eq!(expires_at, t0 + Duration::minutes(25));
            }
            Liveness::TimedOut => panic!("session should still be live at t0+10m"),
        }
    }

    #[test]
    fn idle_past_the_window_times_out() {
        let t0 = Utc::now();
        let session = session_at(t0);
        assert_eq!(
            session.assess(t0 + Duration::minutes(16)),
            Liveness::TimedOut
        );
    }

    #[test]
    fn idle_threshold_beats_a_stale_expiry() {
        // expires_at still in the future but last_activity long past the
        // window: the inactivity check wins.
        let t0 = Utc::now();
        let mut session = session_at(t0);
        session.expires_at = t0 + Duration::hours(2);
        assert_eq!(
            session.assess(t0 + Duration::minutes(20)),
            Liveness::TimedOut
        );
    }

    #[test]
    fn inactive_sessions_never_extend() {
        let t0 = Utc::now();
        let mut session = session_at(t0);
        session.is_active = false;
        assert_eq!(session.assess(t0 + Duration::minutes(1)), Liveness::TimedOut);
    }

    #[test]
    fn boundary_is_exclusive() {
        // Exactly 15 minutes idle is still inside the window.
        let t0 = Utc::now();
        let session = session_at(t0);
        let t1 = t0 + Duration::minutes(IDLE_TIMEOUT_MINUTES);
        assert!(!session.idle_expired(t1));
        // expires_at == now is out.
        assert_eq!(session.assess(t1), Liveness::TimedOut);
    }
}
