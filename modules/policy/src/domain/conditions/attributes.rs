//! Verified-attribute evaluators. Comparison is on the string value;
//! numeric comparators parse it as floating point. Expiry is checked
//! unless the condition opts out.

use crate::domain::model::PolicyContext;

fn live_value<'a>(ctx: &'a PolicyContext, attribute: &str, check_expiry: bool) -> Option<&'a str> {
    let attr = ctx.subject.attributes.get(attribute)?;
    if !attr.is_live(ctx.timestamp, check_expiry) {
        return None;
    }
    Some(&attr.value)
}

#[must_use]
pub fn equals(ctx: &PolicyContext, attribute: &str, value: &str, check_expiry: bool) -> bool {
    live_value(ctx, attribute, check_expiry) == Some(value)
}

#[must_use]
pub fn exists(ctx: &PolicyContext, attribute: &str, check_expiry: bool) -> bool {
    live_value(ctx, attribute, check_expiry).is_some()
}

#[must_use]
pub fn is_in(ctx: &PolicyContext, attribute: &str, values: &[String], check_expiry: bool) -> bool {
    live_value(ctx, attribute, check_expiry)
        .is_some_and(|value| values.iter().any(|candidate| candidate == value))
}

/// Numeric view of a live attribute; expiry always enforced.
#[must_use]
pub fn numeric(ctx: &PolicyContext, attribute: &str) -> Option<f64> {
    live_value(ctx, attribute, true)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{SubjectAttributes, VerifiedAttribute};
    use chrono::{Duration, Utc};

    fn ctx() -> PolicyContext {
        let mut subject = SubjectAttributes {
            id: "user_123".to_owned(),
            ..Default::default()
        };
        subject.attributes.insert(
            "kyc".to_owned(),
            VerifiedAttribute {
                value: "passed".to_owned(),
                expires_at: None,
            },
        );
        subject.attributes.insert(
            "age".to_owned(),
            VerifiedAttribute {
                value: "21".to_owned(),
                expires_at: None,
            },
        );
        subject.attributes.insert(
            "stale".to_owned(),
            VerifiedAttribute {
                value: "yes".to_owned(),
                expires_at: Some(Utc::now() - Duration::days(1)),
            },
        );
        PolicyContext::new(subject, "read")
    }

    #[test]
    fn equals_compares_string_values() {
        let ctx = ctx();
        assert!(equals(&ctx, "kyc", "passed", true));
        assert!(!equals(&ctx, "kyc", "failed", true));
        assert!(!equals(&ctx, "missing", "passed", true));
    }

    #[test]
    fn expired_attributes_are_invisible_unless_opted_out() {
        let ctx = ctx();
        assert!(!exists(&ctx, "stale", true));
        assert!(exists(&ctx, "stale", false));
        assert!(equals(&ctx, "stale", "yes", false));
    }

    #[test]
    fn membership_check() {
        let ctx = ctx();
        assert!(is_in(
            &ctx,
            "kyc",
            &["passed".to_owned(), "exempt".to_owned()],
            true
        ));
        assert!(!is_in(&ctx, "kyc", &["exempt".to_owned()], true));
    }

    #[test]
    fn numeric_parses_floats_and_rejects_junk() {
        let ctx = ctx();
        assert_eq!(numeric(&ctx, "age"), Some(21.0));
        assert_eq!(numeric(&ctx, "kyc"), None);
        assert_eq!(numeric(&ctx, "missing"), None);
    }
}
