//! Rate-counter evaluators.
//!
//! The rule names counters by a glob with a single `*` wildcard; matching
//! counters are summed. `None` (no counter matched) makes every comparison
//! false.

use regex::Regex;

use crate::domain::model::PolicyContext;

fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let escaped: Vec<String> = pattern.split('*').map(|part| regex::escape(part)).collect();
    Regex::new(&format!("^{}$", escaped.join(".*"))).ok()
}

/// Total of the counters matching `pattern`, or `None` when nothing
/// matched.
#[must_use]
pub fn count(ctx: &PolicyContext, pattern: &str) -> Option<u64> {
    let re = glob_to_regex(pattern)?;
    let mut total: Option<u64> = None;
    for (key, value) in &ctx.environment.request_counts {
        if re.is_match(key) {
            total = Some(total.unwrap_or(0).saturating_add(*value));
        }
    }
    total
}
