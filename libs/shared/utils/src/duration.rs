/// Human-formatted wait time for block messaging: "45 seconds",
/// "5 minutes", "4 hours", "1 day". Rounds down to the largest whole unit.
pub fn format_duration(seconds: u64) -> String {
    let (value, unit) = if seconds < 60 {
        (seconds.max(1), "second")
    } else if seconds < 3600 {
        (seconds / 60, "minute")
    } else if seconds < 86400 {
        (seconds / 3600, "hour")
    } else {
        (seconds / 86400, "day")
    };
    if value == 1 {
        format!("1 {unit}")
    } else {
        format!("{value} {unit}s")
    }
}
