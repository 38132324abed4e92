use scoring_cell::BlockTrigger;
use shared_utils::format_duration;

/// User-visible copy for a block. Every rate-limit message ends with the
/// formatted wait time.
pub fn block_reason(trigger: BlockTrigger, retry_after: u64) -> String {
    let wait = format_duration(retry_after);
    match trigger {
        BlockTrigger::TokenReplay => "Token replay attack detected.".to_string(),
        BlockTrigger::DuplicateEmail => format!(
            "This email address has already been registered, please wait {wait} before trying again."
        ),
        BlockTrigger::EmailFraud => format!(
            "This email address was flagged as high risk, please wait {wait} before trying again."
        ),
        BlockTrigger::EphemeralIdFraud => format!(
            "Too many submissions from this session, please wait {wait} before trying again."
        ),
        BlockTrigger::ValidationFrequency => format!(
            "Too many verification attempts detected, please wait {wait} before trying again."
        ),
        BlockTrigger::IpDiversity => format!(
            "This session was used from multiple networks, please wait {wait} before trying again."
        ),
        BlockTrigger::Ja4SessionHopping => format!(
            "Automated session cycling was detected, please wait {wait} before trying again."
        ),
        BlockTrigger::HeaderFingerprint => format!(
            "Your browser profile matches automated traffic, please wait {wait} before trying again."
        ),
        BlockTrigger::TlsAnomaly => format!(
            "Your connection failed consistency checks, please wait {wait} before trying again."
        ),
        BlockTrigger::LatencyMismatch => format!(
            "Your device claim does not match its network behavior, please wait {wait} before trying again."
        ),
        BlockTrigger::TurnstileFailed => format!(
            "Verification could not be completed, please wait {wait} before trying again."
        ),
    }
}

/// Copy for a blocklist hit where only the stored detection type string is
/// available. Unknown detection types get a generic message with the wait.
pub fn block_reason_for_detection(detection_type: Option<&str>, retry_after: u64) -> String {
    let trigger = detection_type.and_then(trigger_from_detection);
    match trigger {
        Some(trigger) => block_reason(trigger, retry_after),
        None => format!(
            "Too many attempts detected, please wait {} before trying again.",
            format_duration(retry_after)
        ),
    }
}

/// Map a persisted detection type back to its trigger. JA4 layer labels
/// all fold into the session-hopping trigger.
pub fn trigger_from_detection(detection_type: &str) -> Option<BlockTrigger> {
    match detection_type {
        "token_replay" | "token_replay_protection" => Some(BlockTrigger::TokenReplay),
        "ephemeral_id_fraud" => Some(BlockTrigger::EphemeralIdFraud),
        "ja4_session_hopping" | "ja4_ip_clustering" | "ja4_rapid_global"
        | "ja4_extended_global" => Some(BlockTrigger::Ja4SessionHopping),
        "ip_diversity" => Some(BlockTrigger::IpDiversity),
        "validation_frequency" => Some(BlockTrigger::ValidationFrequency),
        "duplicate_email" => Some(BlockTrigger::DuplicateEmail),
        "turnstile_failed" => Some(BlockTrigger::TurnstileFailed),
        "email_fraud" => Some(BlockTrigger::EmailFraud),
        "header_fingerprint" => Some(BlockTrigger::HeaderFingerprint),
        "tls_anomaly" => Some(BlockTrigger::TlsAnomaly),
        "latency_mismatch" => Some(BlockTrigger::LatencyMismatch),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_copy_ends_with_the_wait_time() {
        let triggers = [
            BlockTrigger::DuplicateEmail,
            BlockTrigger::EmailFraud,
            BlockTrigger::EphemeralIdFraud,
            BlockTrigger::ValidationFrequency,
            BlockTrigger::IpDiversity,
            BlockTrigger::Ja4SessionHopping,
            BlockTrigger::HeaderFingerprint,
            BlockTrigger::TlsAnomaly,
            BlockTrigger::LatencyMismatch,
            BlockTrigger::TurnstileFailed,
        ];
        for trigger in triggers {
            let message = block_reason(trigger, 14400);
            assert!(
                message.ends_with("please wait 4 hours before trying again."),
                "bad copy for {:?}: {}",
                trigger,
                message
            );
        }
    }

    #[test]
    fn messages_are_distinct_per_trigger() {
        let a = block_reason(BlockTrigger::DuplicateEmail, 3600);
        let b = block_reason(BlockTrigger::Ja4SessionHopping, 3600);
        let c = block_reason(BlockTrigger::LatencyMismatch, 3600);
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn ja4_layer_labels_fold_into_session_hopping() {
        assert_eq!(
            trigger_from_detection("ja4_rapid_global"),
            Some(BlockTrigger::Ja4SessionHopping)
        );
        assert_eq!(trigger_from_detection("unknown_label"), None);
    }

    #[test]
    fn unknown_detection_gets_generic_copy() {
        let message = block_reason_for_detection(Some("mystery"), 60);
        assert!(message.contains("1 minute"));
    }
}
