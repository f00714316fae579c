use chrono::Duration;

/// Parse a duration like "500ms", "45s", "90m", "1h", "30d", "2w" or "10y".
/// A bare number is taken as milliseconds. A year is 365 days.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    let value: i64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}': expected e.g. 90m, 1h, 30d", input))?;

    let millis_per_unit: i64 = match unit.trim().to_lowercase().as_str() {
        "" | "ms" => 1,
        "s" => 1_000,
        "m" => 60 * 1_000,
        "h" => 60 * 60 * 1_000,
        "d" => 24 * 60 * 60 * 1_000,
        "w" => 7 * 24 * 60 * 60 * 1_000,
        "y" => 365 * 24 * 60 * 60 * 1_000,
        other => return Err(format!("unknown duration unit '{}'", other)),
    };

    value
        .checked_mul(millis_per_unit)
        .and_then(Duration::try_milliseconds)
        .ok_or_else(|| format!("duration '{}' is too long", input))
}

/// Compact human form, largest two units: "2d 3h", "45m", "10s".
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let parts: Vec<String> = [(days, "d"), (hours, "h"), (minutes, "m"), (seconds, "s")]
        .iter()
        .filter(|(value, _)| *value > 0)
        .take(2)
        .map(|(value, unit)| format!("{}{}", value, unit))
        .collect();

    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}
