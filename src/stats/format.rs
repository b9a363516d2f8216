//! Count formatting.

/// Format a count with en-US thousands grouping (`1234567` → `"1,234,567"`).
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero() {
        assert_eq!(group_thousands(0), "0");
    }

    #[test]
    fn below_grouping_threshold() {
        assert_eq!(group_thousands(999), "999");
    }

    #[test]
    fn exactly_four_digits() {
        assert_eq!(group_thousands(1_000), "1,000");
    }

    #[test]
    fn millions() {
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn group_boundary() {
        assert_eq!(group_thousands(100_000), "100,000");
        assert_eq!(group_thousands(999_999_999), "999,999,999");
    }
}
