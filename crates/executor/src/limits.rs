//! Resource quantity parsing for container limits.

/// Parse a CPU quantity (`"2"`, `"0.5"`, `"500m"`) into Docker nano-CPUs.
pub fn parse_cpu(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Some(millis) = value.strip_suffix('m') {
        let millis: i64 = millis.parse().ok()?;
        if millis <= 0 {
            return None;
        }
        return millis.checked_mul(1_000_000);
    }
    let cores: f64 = value.parse().ok()?;
    let nanos = (cores * 1e9).round();
    (cores > 0.0 && nanos < i64::MAX as f64).then(|| nanos as i64)
}

/// Parse a memory quantity (`"512Mi"`, `"4Gi"`, `"1G"`, `"1048576"`) into bytes.
pub fn parse_memory(value: &str) -> Option<i64> {
    const UNITS: [(&str, i64); 8] = [
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("K", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
    ];

    let value = value.trim();
    let (number, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, mult)| value.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((value, 1));

    let number: i64 = number.trim().parse().ok()?;
    if number <= 0 {
        return None;
    }
    number.checked_mul(multiplier)
}
