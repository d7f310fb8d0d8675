//! Human readable sizes with binary scaling and the inverse conversion.

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Format `size` bytes the way the file views show it: whole bytes up to
/// 1000, otherwise one decimal in KB, MB or GB.
pub fn human_readable_size(size: u64) -> String {
    let mut unit = 0;
    let mut current = size;
    let mut previous = size;

    while current > 1000 && unit < UNITS.len() - 1 {
        unit += 1;
        previous = current;
        current /= 1024;
    }

    if unit == 0 {
        format!("{} {}", size, UNITS[0])
    } else {
        format!("{:.1} {}", previous as f64 / 1024.0, UNITS[unit])
    }
}

fn unit_exponent(unit: &str) -> Option<i32> {
    UNITS
        .iter()
        .position(|u| u.eq_ignore_ascii_case(unit))
        .map(|idx| idx as i32)
}

/// Inverse of [`human_readable_size`], within rounding of the displayed
/// decimal. A value without unit is taken as bytes.
pub fn convert_to_bytes(size: &str) -> Option<u64> {
    let mut parts = size.split_whitespace();
    let value: f64 = parts.next()?.parse().ok()?;
    let exponent = match parts.next() {
        Some(unit) => unit_exponent(unit)?,
        None => 0,
    };
    Some((value * 1024f64.powi(exponent)).round() as u64)
}

/// Split a formatted size into a unit weight (B=0 .. GB=3) and its value,
/// for ordering.
pub fn size_sort_key(size: &str) -> Option<(i32, f64)> {
    let mut parts = size.split_whitespace();
    let value: f64 = parts.next()?.parse().ok()?;
    let weight = match parts.next() {
        Some(unit) => unit_exponent(unit)?,
        None => 0,
    };
    Some((weight, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes() {
        assert_eq!(human_readable_size(0), "0 B");
        assert_eq!(human_readable_size(999), "999 B");
        assert_eq!(human_readable_size(1000), "1000 B");
        assert_eq!(human_readable_size(1024), "1.0 KB");
        assert_eq!(human_readable_size(1_048_576), "1.0 MB");
        assert_eq!(human_readable_size(5_368_709_120), "5.0 GB");
        // Stays in GB past the last unit.
        assert_eq!(human_readable_size(2 * 1024u64.pow(4)), "2048.0 GB");
    }

    #[test]
    fn round_trips_within_display_precision() {
        for n in [0u64, 999, 1000, 1024, 1_048_576, 5_368_709_120] {
            let shown = human_readable_size(n);
            let back = convert_to_bytes(&shown).unwrap();
            let (weight, _) = size_sort_key(&shown).unwrap();
            // One displayed decimal of the unit in use.
            let tolerance = 1024f64.powi(weight) * 0.05;
            assert!(
                (back as f64 - n as f64).abs() <= tolerance,
                "{} -> {} -> {}",
                n,
                shown,
                back
            );
        }
    }

    #[test]
    fn converts_without_unit() {
        assert_eq!(convert_to_bytes("512"), Some(512));
        assert_eq!(convert_to_bytes("1.5 KB"), Some(1536));
        assert_eq!(convert_to_bytes(""), None);
        assert_eq!(convert_to_bytes("3 TB"), None);
    }
}
