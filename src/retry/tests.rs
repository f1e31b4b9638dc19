use super::*;
use std::fmt;

#[derive(Debug)]
struct FakeError {
    transient: bool,
}

impl fmt::Display for FakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fake error (transient: {})", self.transient)
    }
}

impl std::error::Error for FakeError {}

impl Transient for FakeError {
    fn is_transient(&self) -> bool {
        self.transient
    }
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1))
}

#[test]
fn success_on_first_attempt() {
    let mut calls = 0;
    let result = with_backoff(&fast_policy(3), "op", || {
        calls += 1;
        Ok::<_, FakeError>(42)
    });

    assert_eq!(result.expect("should succeed"), 42);
    assert_eq!(calls, 1);
}

#[test]
fn transient_errors_are_retried_until_success() {
    let mut calls = 0;
    let result = with_backoff(&fast_policy(3), "op", || {
        calls += 1;
        if calls < 3 {
            Err(FakeError { transient: true })
        } else {
            Ok(7)
        }
    });

    assert_eq!(result.expect("should succeed on third attempt"), 7);
    assert_eq!(calls, 3);
}

#[test]
fn permanent_errors_fail_immediately() {
    let mut calls = 0;
    let result: std::result::Result<u32, _> = with_backoff(&fast_policy(5), "op", || {
        calls += 1;
        Err(FakeError { transient: false })
    });

    assert!(matches!(result, Err(RetryError::Permanent(_))));
    assert_eq!(calls, 1);
}

#[test]
fn exhaustion_reports_attempt_count() {
    let mut calls = 0;
    let result: std::result::Result<u32, _> = with_backoff(&fast_policy(3), "op", || {
        calls += 1;
        Err(FakeError { transient: true })
    });

    assert_eq!(calls, 3);
    match result {
        Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn rate_limit_and_server_errors_are_transient() {
    assert!(ureq::Error::StatusCode(429).is_transient());
    assert!(ureq::Error::StatusCode(500).is_transient());
    assert!(ureq::Error::StatusCode(503).is_transient());
}

#[test]
fn client_errors_are_permanent() {
    assert!(!ureq::Error::StatusCode(400).is_transient());
    assert!(!ureq::Error::StatusCode(401).is_transient());
    assert!(!ureq::Error::StatusCode(404).is_transient());
}

#[test]
fn backoff_delay_doubles_per_attempt() {
    let policy = RetryPolicy::new(4, Duration::from_millis(100));

    assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
    assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
    assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
}

#[test]
fn zero_attempt_policy_is_clamped_to_one() {
    let policy = RetryPolicy::new(0, Duration::from_millis(1));
    assert_eq!(policy.max_attempts, 1);
}
