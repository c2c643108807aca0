//! Human-readable number formatting
//!
//! Thousands separators for nanosecond skews and binary SI suffixes for byte
//! volumes.

/// Format an unsigned integer with comma thousands separators
///
/// # Examples
///
/// ```
/// use clusterprobe::util::units::format_with_commas_u64;
///
/// assert_eq!(format_with_commas_u64(0), "0");
/// assert_eq!(format_with_commas_u64(1234567), "1,234,567");
/// ```
pub fn format_with_commas_u64(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Signed variant of [`format_with_commas_u64`]
///
/// ```
/// use clusterprobe::util::units::format_with_commas;
///
/// assert_eq!(format_with_commas(-800), "-800");
/// assert_eq!(format_with_commas(-1500000), "-1,500,000");
/// ```
pub fn format_with_commas(value: i64) -> String {
    if value < 0 {
        format!("-{}", format_with_commas_u64(value.unsigned_abs()))
    } else {
        format_with_commas_u64(value as u64)
    }
}

const SI_UNITS: [&str; 7] = ["", "K", "M", "G", "T", "P", "E"];

/// Format a byte count scaled by 1024 with a unit suffix
///
/// ```
/// use clusterprobe::util::units::format_bytes;
///
/// assert_eq!(format_bytes(512, 0), "512 B");
/// assert_eq!(format_bytes(4096, 2), "4.00 KB");
/// assert_eq!(format_bytes(4 * 1024 * 1024 * 1024, 1), "4.0 GB");
/// ```
pub fn format_bytes(value: u64, precision: usize) -> String {
    let mut scaled = value as f64;
    let mut unit = 0;
    while scaled >= 1024.0 && unit < SI_UNITS.len() - 1 {
        scaled /= 1024.0;
        unit += 1;
    }
    format!("{:.*} {}B", precision, scaled, SI_UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commas() {
        assert_eq!(format_with_commas_u64(999), "999");
        assert_eq!(format_with_commas_u64(1000), "1,000");
        assert_eq!(format_with_commas_u64(100000), "100,000");
        assert_eq!(format_with_commas_u64(u64::MAX), "18,446,744,073,709,551,615");
    }

    #[test]
    fn test_commas_signed() {
        assert_eq!(format_with_commas(800), "800");
        assert_eq!(format_with_commas(-1000), "-1,000");
        assert_eq!(format_with_commas(i64::MIN), "-9,223,372,036,854,775,808");
    }

    #[test]
    fn test_bytes() {
        assert_eq!(format_bytes(0, 2), "0.00 B");
        assert_eq!(format_bytes(1536, 1), "1.5 KB");
        assert_eq!(format_bytes(u64::MAX, 0), "16 EB");
    }
}
