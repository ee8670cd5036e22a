//! Protocol version negotiation.

/// Protocol revisions this runtime speaks, newest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];

/// The newest supported revision.
pub const LATEST_VERSION: &str = SUPPORTED_VERSIONS[0];

/// Negotiate against a client's requested version.
///
/// If the requested revision is one we speak, the session runs at exactly
/// that revision. Otherwise the caller gets the supported list back, to be
/// surfaced as `InvalidParams` with `data.supported_versions`.
pub fn negotiate_version(requested: &str) -> Result<&'static str, &'static [&'static str]> {
    SUPPORTED_VERSIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .ok_or(SUPPORTED_VERSIONS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn exact_match_wins() {
        assert_eq!(negotiate_version("2025-03-26"), Ok("2025-03-26"));
        assert_eq!(negotiate_version("2024-11-05"), Ok("2024-11-05"));
    }

    #[test]
    fn mismatch_returns_supported_list() {
        let err = negotiate_version("1999-01-01").unwrap_err();
        assert_eq!(err, &["2025-03-26", "2024-11-05"]);
    }

    #[test]
    fn newest_is_first() {
        assert_eq!(LATEST_VERSION, "2025-03-26");
        assert!(SUPPORTED_VERSIONS.windows(2).all(|w| w[0] > w[1]));
    }
}
