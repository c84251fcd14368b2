pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else if ms < 3_600_000 {
        let mins = ms / 60_000;
        let secs = (ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    } else {
        let hours = ms / 3_600_000;
        let mins = (ms % 3_600_000) / 60_000;
        format!("{}h {}m", hours, mins)
    }
}

/// Signed variant for timestamp differences; clock skew can make them negative.
pub fn format_signed_duration(ms: i64) -> String {
    if ms < 0 {
        format!("-{}", format_duration(ms.unsigned_abs()))
    } else {
        format_duration(ms as u64)
    }
}

pub fn format_percentage(pct: f64) -> String {
    format!("{:.0}%", pct.clamp(0.0, 100.0))
}

pub fn format_score(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}
