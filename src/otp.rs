use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;

/// Fixed challenge lifetime: 5 minutes.
pub const OTP_TTL: Duration = Duration::from_secs(5 * 60);

/// What a challenge was issued for. Signup carries the not-yet-persisted
/// account data so nothing touches the user store until the code is confirmed.
#[derive(Debug, Clone)]
pub enum ChallengeKind {
    Signup(PendingProfile),
    PasswordReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Signup,
    PasswordReset,
}

impl ChallengeKind {
    pub fn purpose(&self) -> Purpose {
        match self {
            ChallengeKind::Signup(_) => Purpose::Signup,
            ChallengeKind::PasswordReset => Purpose::PasswordReset,
        }
    }
}

/// Candidate account fields held until signup confirmation.
#[derive(Debug, Clone)]
pub struct PendingProfile {
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct Challenge {
    pub code: String,
    pub kind: ChallengeKind,
    pub expires_at: Instant,
}

impl Challenge {
    fn expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Generate a 6-digit numeric code.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

/// Process-local store of pending verification challenges, one slot per email.
///
/// A timed key-value cache with latest-write-wins replacement and pull-based
/// (lazy) expiry: an expired entry is evicted by the next read that observes
/// it, never by a background sweeper. State does not survive restart.
///
/// `check` does not consume a matching challenge; `clear` is the sole
/// consumption point. The reset flow relies on this by checking twice
/// (once to gate the form, once to finalize) without re-issuing.
#[derive(Clone, Default)]
pub struct OtpLedger {
    store: Arc<DashMap<String, Challenge>>,
}

impl OtpLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a challenge for `email`, replacing any existing one.
    pub fn issue(&self, email: &str, code: &str, kind: ChallengeKind, ttl: Duration) {
        self.store.insert(
            email.to_string(),
            Challenge {
                code: code.to_string(),
                kind,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// True iff a live challenge for `email` matches `code` (and `purpose`,
    /// when supplied). Evicts the entry if it is found expired.
    pub fn check(&self, email: &str, code: &str, purpose: Option<Purpose>) -> bool {
        if let Some(entry) = self.store.get(email) {
            if !entry.expired() {
                if let Some(p) = purpose {
                    if entry.kind.purpose() != p {
                        return false;
                    }
                }
                return entry.code == code;
            }
        }
        // The read guard is gone, so an `issue` may have replaced the slot in
        // the meantime; re-test under the removal lock so only an entry that
        // is still expired can be evicted.
        self.store.remove_if(email, |_, c| c.expired());
        false
    }

    /// Clone of the stored challenge, if one is live. Same lazy eviction as
    /// `check`.
    pub fn peek(&self, email: &str) -> Option<Challenge> {
        if let Some(entry) = self.store.get(email) {
            if !entry.expired() {
                return Some(entry.value().clone());
            }
        }
        self.store.remove_if(email, |_, c| c.expired());
        None
    }

    /// Remove any challenge for `email`. No-op on a missing key.
    pub fn clear(&self, email: &str) {
        self.store.remove(email);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ChallengeKind {
        ChallengeKind::Signup(PendingProfile {
            username: "alice".into(),
            password_hash: "$2b$12$hash".into(),
        })
    }

    #[test]
    fn issue_then_check_matches() {
        let ledger = OtpLedger::new();
        ledger.issue("a@example.com", "123456", profile(), OTP_TTL);
        assert!(ledger.check("a@example.com", "123456", Some(Purpose::Signup)));
        assert!(ledger.check("a@example.com", "123456", None));
        assert!(!ledger.check("a@example.com", "654321", Some(Purpose::Signup)));
    }

    #[test]
    fn check_without_issue_is_false() {
        let ledger = OtpLedger::new();
        assert!(!ledger.check("nobody@example.com", "123456", None));
    }

    #[test]
    fn clear_invalidates_and_is_idempotent() {
        let ledger = OtpLedger::new();
        ledger.issue("a@example.com", "123456", profile(), OTP_TTL);
        ledger.clear("a@example.com");
        assert!(!ledger.check("a@example.com", "123456", None));
        // second clear on the now-missing key must not panic
        ledger.clear("a@example.com");
    }

    #[test]
    fn expired_challenge_is_rejected_and_evicted() {
        let ledger = OtpLedger::new();
        ledger.issue(
            "a@example.com",
            "123456",
            profile(),
            Duration::from_millis(20),
        );
        std::thread::sleep(Duration::from_millis(40));
        assert!(!ledger.check("a@example.com", "123456", None));
        // eviction happened on the read above
        assert!(ledger.peek("a@example.com").is_none());
    }

    // An expired slot may be replaced by a fresh issue between the read that
    // observed the expiry and the eviction; the eviction must then leave the
    // replacement alone.
    #[test]
    fn stale_expiry_read_does_not_evict_a_reissued_challenge() {
        let ledger = OtpLedger::new();
        for _ in 0..50 {
            ledger.issue("a@example.com", "111111", ChallengeKind::PasswordReset, Duration::ZERO);
            let reader = {
                let ledger = ledger.clone();
                std::thread::spawn(move || ledger.check("a@example.com", "111111", None))
            };
            let writer = {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    ledger.issue("a@example.com", "222222", ChallengeKind::PasswordReset, OTP_TTL)
                })
            };
            assert!(!reader.join().unwrap());
            writer.join().unwrap();
            assert!(
                ledger.check("a@example.com", "222222", None),
                "a live replacement must survive eviction of the expired slot"
            );
            ledger.clear("a@example.com");
        }
    }

    #[test]
    fn latest_issue_wins() {
        let ledger = OtpLedger::new();
        ledger.issue("a@example.com", "111111", profile(), OTP_TTL);
        ledger.issue("a@example.com", "222222", ChallengeKind::PasswordReset, OTP_TTL);
        assert!(!ledger.check("a@example.com", "111111", None));
        assert!(ledger.check("a@example.com", "222222", Some(Purpose::PasswordReset)));
    }

    #[test]
    fn purpose_mismatch_is_false_even_with_matching_code() {
        let ledger = OtpLedger::new();
        ledger.issue("a@example.com", "123456", profile(), OTP_TTL);
        assert!(!ledger.check("a@example.com", "123456", Some(Purpose::PasswordReset)));
        assert!(ledger.check("a@example.com", "123456", Some(Purpose::Signup)));
    }

    // Accepted design choice, not a bug: check never consumes, so the same
    // code stays valid for repeated checks until an explicit clear or expiry.
    // The reset flow (verify-reset-otp then reset-password) depends on it.
    #[test]
    fn check_is_non_consuming_until_cleared() {
        let ledger = OtpLedger::new();
        ledger.issue("a@example.com", "123456", ChallengeKind::PasswordReset, OTP_TTL);
        assert!(ledger.check("a@example.com", "123456", Some(Purpose::PasswordReset)));
        assert!(ledger.check("a@example.com", "123456", Some(Purpose::PasswordReset)));
        ledger.clear("a@example.com");
        assert!(!ledger.check("a@example.com", "123456", Some(Purpose::PasswordReset)));
    }

    #[test]
    fn peek_returns_pending_profile_for_signup() {
        let ledger = OtpLedger::new();
        ledger.issue("a@example.com", "123456", profile(), OTP_TTL);
        let ch = ledger.peek("a@example.com").expect("challenge present");
        assert_eq!(ch.code, "123456");
        match ch.kind {
            ChallengeKind::Signup(p) => assert_eq!(p.username, "alice"),
            ChallengeKind::PasswordReset => panic!("wrong purpose"),
        }
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
