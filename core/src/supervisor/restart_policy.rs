//! Restart decision logic
//!
//! [`decide`] is a pure function of the policy and the termination error.
//! It never sleeps or spawns; the supervisor applies the relaunch delay.

use crate::{CoreError, Result};
use schema::RestartPolicy;
use tracing::{debug, warn};

/// Action to take when a process exits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartAction {
    /// Relaunch after the supervisor's restart delay
    Relaunch,
    /// Leave the record exited
    Halt,
}

/// Parse a policy name (`never`, `always`, `on-failure`).
///
/// Matching ignores case and surrounding whitespace; an empty string means
/// `never`.
pub fn parse_policy(raw: &str) -> Result<RestartPolicy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "never" => Ok(RestartPolicy::Never),
        "always" => Ok(RestartPolicy::Always),
        "on-failure" | "onfailure" | "on_failure" => Ok(RestartPolicy::OnFailure),
        _ => Err(CoreError::PolicyUnrecognized(raw.to_string())),
    }
}

/// Parse a policy name, falling back to `never` for unknown values
pub fn normalize_policy(raw: &str) -> RestartPolicy {
    parse_policy(raw).unwrap_or_else(|e| {
        warn!("{}; falling back to 'never'", e);
        RestartPolicy::Never
    })
}

/// Decide whether an exited process is relaunched.
///
/// `exit_error` is `None` for a clean exit and carries the termination
/// error (non-zero status, signal, failed spawn) otherwise.
pub fn decide(policy: RestartPolicy, exit_error: Option<&str>) -> RestartAction {
    let action = match (policy, exit_error) {
        (RestartPolicy::Never, _) => RestartAction::Halt,
        (RestartPolicy::Always, _) => RestartAction::Relaunch,
        (RestartPolicy::OnFailure, Some(_)) => RestartAction::Relaunch,
        (RestartPolicy::OnFailure, None) => RestartAction::Halt,
    };
    debug!(
        "Restart policy {} with exit error {:?}: {:?}",
        policy, exit_error, action
    );
    action
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_table() {
        let failed = Some("exit status 1");
        assert_eq!(decide(RestartPolicy::Never, None), RestartAction::Halt);
        assert_eq!(decide(RestartPolicy::Never, failed), RestartAction::Halt);
        assert_eq!(decide(RestartPolicy::Always, None), RestartAction::Relaunch);
        assert_eq!(decide(RestartPolicy::Always, failed), RestartAction::Relaunch);
        assert_eq!(decide(RestartPolicy::OnFailure, None), RestartAction::Halt);
        assert_eq!(
            decide(RestartPolicy::OnFailure, failed),
            RestartAction::Relaunch
        );
    }

    #[test]
    fn test_parse_known_policies() {
        assert_eq!(parse_policy("never").unwrap(), RestartPolicy::Never);
        assert_eq!(parse_policy("").unwrap(), RestartPolicy::Never);
        assert_eq!(parse_policy(" Always ").unwrap(), RestartPolicy::Always);
        assert_eq!(parse_policy("on-failure").unwrap(), RestartPolicy::OnFailure);
    }

    #[test]
    fn test_unrecognized_policy_normalizes_to_never() {
        assert!(matches!(
            parse_policy("sometimes"),
            Err(CoreError::PolicyUnrecognized(ref p)) if p == "sometimes"
        ));
        let policy = normalize_policy("sometimes");
        assert_eq!(policy, RestartPolicy::Never);
        assert_eq!(decide(policy, Some("exit status 2")), RestartAction::Halt);
    }
}
