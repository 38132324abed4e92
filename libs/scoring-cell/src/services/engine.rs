use tracing::debug;

use shared_config::FraudConfig;

use crate::models::{BlockTrigger, ComponentScore, RiskBreakdown, RiskInputs};

/// Combine the collected signals into a normalized 0..100 risk score.
///
/// Token replay short-circuits to 100. A set block trigger promotes the
/// weighted base to at least the trigger's floor. Untriggered totals are
/// rounded to one decimal.
pub fn score(inputs: &RiskInputs, config: &FraudConfig) -> RiskBreakdown {
    let weights = &config.weights;
    let bt = config.block_threshold;

    let token_replay_score = if inputs.token_replay { 100.0 } else { 0.0 };
    let token_replay = ComponentScore::new(
        token_replay_score,
        weights.token_replay,
        if inputs.token_replay {
            "token hash seen in a prior validation"
        } else {
            "token not previously seen"
        },
    );

    let email_score = inputs.email_risk_score.unwrap_or(0.0).clamp(0.0, 100.0);
    let email_fraud = ComponentScore::new(
        email_score,
        weights.email_fraud,
        match inputs.email_risk_score {
            Some(s) => format!("reputation service scored {s:.0}/100"),
            None => "no reputation signal".to_string(),
        },
    );

    let ephemeral_score = normalize_ephemeral_count(
        inputs.ephemeral_id_count,
        config.ephemeral_id.submission_threshold,
        bt,
    );
    let ephemeral_id = ComponentScore::new(
        ephemeral_score,
        weights.ephemeral_id,
        format!(
            "{} submission(s) for this ephemeral id in 24h",
            inputs.ephemeral_id_count
        ),
    )
    .with_raw(inputs.ephemeral_id_count as f64);

    let validation_score = normalize_validation_count(
        inputs.validation_count,
        config.ephemeral_id.validation_warn_threshold,
        config.ephemeral_id.validation_block_threshold,
    );
    let validation_frequency = ComponentScore::new(
        validation_score,
        weights.validation_frequency,
        format!(
            "{} validation(s) for this ephemeral id in 1h",
            inputs.validation_count
        ),
    )
    .with_raw(inputs.validation_count as f64);

    let ip_diversity_score = normalize_unique_ip_count(
        inputs.unique_ip_count,
        config.ephemeral_id.ip_diversity_threshold,
    );
    let ip_diversity = ComponentScore::new(
        ip_diversity_score,
        weights.ip_diversity,
        format!("{} distinct IP(s) in 24h", inputs.unique_ip_count),
    )
    .with_raw(inputs.unique_ip_count as f64);

    let ja4_score = normalize_ja4(inputs.ja4_raw_score, bt);
    let ja4_session_hopping = ComponentScore::new(
        ja4_score,
        weights.ja4_session_hopping,
        format!("composite JA4 score {}/230", inputs.ja4_raw_score),
    )
    .with_raw(f64::from(inputs.ja4_raw_score));

    let ip_rate = ComponentScore::new(
        inputs.ip_rate_score.clamp(0.0, 100.0),
        weights.ip_rate,
        "submissions from this IP in the rate window",
    );
    let header_fingerprint = ComponentScore::new(
        inputs.header_fingerprint_score.clamp(0.0, 100.0),
        weights.header_fingerprint,
        "header fingerprint reuse check",
    );
    let tls_anomaly = ComponentScore::new(
        inputs.tls_anomaly_score.clamp(0.0, 100.0),
        weights.tls_anomaly,
        "TLS extension/JA4 pairing check",
    );
    let latency_mismatch = ComponentScore::new(
        inputs.latency_mismatch_score.clamp(0.0, 100.0),
        weights.latency_mismatch,
        "claimed device vs measured RTT check",
    );

    let base = token_replay.contribution
        + email_fraud.contribution
        + ephemeral_id.contribution
        + validation_frequency.contribution
        + ip_diversity.contribution
        + ja4_session_hopping.contribution
        + ip_rate.contribution
        + header_fingerprint.contribution
        + tls_anomaly.contribution
        + latency_mismatch.contribution;

    let total = if inputs.token_replay {
        100.0
    } else if let Some(trigger) = inputs.block_trigger {
        let floored = base.max(trigger.floor(bt));
        floored.min(100.0)
    } else {
        ((base * 10.0).round() / 10.0).min(100.0)
    };

    debug!(
        base = base,
        total = total,
        trigger = ?inputs.block_trigger,
        "risk score computed"
    );

    RiskBreakdown {
        token_replay,
        email_fraud,
        ephemeral_id,
        validation_frequency,
        ip_diversity,
        ja4_session_hopping,
        ip_rate,
        header_fingerprint,
        tls_anomaly,
        latency_mismatch,
        block_trigger: if inputs.token_replay {
            Some(BlockTrigger::TokenReplay)
        } else {
            inputs.block_trigger
        },
        total,
    }
}

/// 0 -> 0, 1 -> 10, at the threshold -> exactly the block threshold,
/// above it -> 100.
pub fn normalize_ephemeral_count(count: i64, threshold: i64, block_threshold: f64) -> f64 {
    if count <= 0 {
        0.0
    } else if count > threshold {
        100.0
    } else if count == threshold {
        block_threshold
    } else {
        10.0
    }
}

/// A single validation is clean, the warn threshold scores 40, the block
/// threshold and beyond score 100.
pub fn normalize_validation_count(count: i64, warn_threshold: i64, block_threshold: i64) -> f64 {
    if count >= block_threshold {
        100.0
    } else if count >= warn_threshold {
        40.0
    } else {
        0.0
    }
}

/// One IP is clean, the diversity threshold scores 50, anything above 100.
pub fn normalize_unique_ip_count(count: i64, threshold: i64) -> f64 {
    if count > threshold {
        100.0
    } else if count >= threshold && count > 1 {
        50.0
    } else {
        0.0
    }
}

/// Raw scores at or below the block threshold pass through unchanged; the
/// 0..230 range above it is squeezed into the remaining headroom to 100.
pub fn normalize_ja4(raw: u32, block_threshold: f64) -> f64 {
    let raw = f64::from(raw);
    if raw <= 0.0 {
        0.0
    } else if raw <= block_threshold {
        raw
    } else {
        let scaled =
            block_threshold + ((raw - block_threshold) / (230.0 - block_threshold)) * (100.0 - block_threshold);
        scaled.round()
    }
}
