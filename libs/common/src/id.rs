use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = relay_common::id::prefixed_ulid("usr");
/// assert!(id.starts_with("usr_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    /// Account ids issued at registration.
    pub const USER: &str = "usr";
    /// `jti` of refresh tokens.
    pub const REFRESH_TOKEN: &str = "rt";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_ulid_format() {
        let id = prefixed_ulid(prefix::USER);
        assert!(id.starts_with("usr_"));
        // ULID is 26 chars, plus prefix + underscore
        assert_eq!(id.len(), 4 + 26);
    }

    #[test]
    fn test_uniqueness() {
        let a = prefixed_ulid(prefix::REFRESH_TOKEN);
        let b = prefixed_ulid(prefix::REFRESH_TOKEN);
        assert_ne!(a, b);
    }
}
