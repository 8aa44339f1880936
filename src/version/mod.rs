//! Firmware version ordering.
//!
//! Vendor firmware versions are dot/letter-delimited identifiers such as
//! `OS1.0.10.0.VNBCNXM`. They are not semantic versions: ordering is defined
//! by extracting the embedded decimal runs and comparing them lexicographically
//! as integer tuples, so `OS1.0.10...` sorts after `OS1.0.2...` even though it
//! compares lower as text. Non-numeric separators are ignored for ordering.
//! This is a heuristic over what the vendor actually publishes, not a parser.

use std::cmp::Ordering;

/// Ordering key for a firmware version string.
///
/// Wraps the sequence of decimal runs embedded in the version. Two keys
/// compare like integer tuples; a key that is a strict prefix of another
/// sorts first.
///
/// # Examples
///
/// ```
/// use blobup::version::VersionKey;
///
/// let older = VersionKey::parse("OS1.0.2.0.VNBCNXM");
/// let newer = VersionKey::parse("OS1.0.10.0.VNBCNXM");
/// assert!(newer > older);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionKey(Vec<u64>);

impl VersionKey {
    /// Extract the numeric runs from a version string.
    ///
    /// Runs too long to fit a `u64` are saturated; the vendor has never come
    /// close to that many digits.
    #[must_use]
    pub fn parse(version: &str) -> Self {
        let mut runs = Vec::new();
        let mut current: Option<u64> = None;
        for ch in version.chars() {
            if let Some(digit) = ch.to_digit(10) {
                let prev = current.unwrap_or(0);
                current = Some(prev.saturating_mul(10).saturating_add(u64::from(digit)));
            } else if let Some(run) = current.take() {
                runs.push(run);
            }
        }
        if let Some(run) = current {
            runs.push(run);
        }
        Self(runs)
    }

    /// The extracted numeric runs, in order of appearance.
    #[must_use]
    pub fn runs(&self) -> &[u64] {
        &self.0
    }
}

impl PartialOrd for VersionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// Pick the highest version from an iterator of version strings.
///
/// Returns `None` for an empty input. Ties resolve to the later entry, which
/// matches a sort-then-take-last over the same input.
pub fn latest<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .map(|v| (VersionKey::parse(v), v))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_runs_beat_text_order() {
        // "10" < "2" as text but 10 > 2 numerically
        let a = VersionKey::parse("OS1.0.2.0.VNBCNXM");
        let b = VersionKey::parse("OS1.0.10.0.VNBCNXM");
        assert!(b > a);
    }

    #[test]
    fn test_separators_ignored() {
        assert_eq!(
            VersionKey::parse("OS1.0.3.0.VMACNXM"),
            VersionKey::parse("OS1-0-3-0-VMACNXM")
        );
    }

    #[test]
    fn test_prefix_sorts_first() {
        let short = VersionKey::parse("OS1.0");
        let long = VersionKey::parse("OS1.0.1");
        assert!(short < long);
    }

    #[test]
    fn test_runs_extraction() {
        assert_eq!(VersionKey::parse("OS1.0.10.0.VNBCNXM").runs(), &[1, 0, 10, 0]);
        assert_eq!(VersionKey::parse("no digits here").runs(), &[] as &[u64]);
    }

    #[test]
    fn test_latest() {
        let versions = ["OS1.0.1.0.VNBCNXM", "OS1.0.10.0.VNBCNXM", "OS1.0.9.0.VNBCNXM"];
        assert_eq!(latest(versions), Some("OS1.0.10.0.VNBCNXM"));
        assert_eq!(latest([]), None);
    }
}
