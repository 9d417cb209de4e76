//! The rule engine.

use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::PolicyConfig;

use super::error::PolicyError;
use super::model::{Decision, Effect, PolicyContext, PolicyRule};

struct StoredRule {
    rule: PolicyRule,
    /// Insertion sequence; breaks priority ties deterministically.
    seq: u64,
}

/// Ordered rule list with first-match-wins evaluation and deny-by-default.
pub struct PolicyEngine {
    rules: RwLock<Vec<StoredRule>>,
    next_seq: RwLock<u64>,
    config: PolicyConfig,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

impl PolicyEngine {
    #[must_use]
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            next_seq: RwLock::new(0),
            config,
        }
    }

    /// Insert a rule into the priority-sorted list. The sort is stable:
    /// equal priorities keep insertion order.
    pub fn add_rule(&self, mut rule: PolicyRule) {
        for condition in &mut rule.conditions {
            condition.normalize();
        }

        let seq = {
            let mut next = self.next_seq.write();
            let seq = *next;
            *next += 1;
            seq
        };

        let mut rules = self.rules.write();
        rules.push(StoredRule { rule, seq });
        rules.sort_by(|a, b| {
            b.rule
                .priority
                .cmp(&a.rule.priority)
                .then(a.seq.cmp(&b.seq))
        });
    }

    /// Remove a rule by id.
    ///
    /// # Errors
    ///
    /// [`PolicyError::RuleNotFound`] when no rule carries the id.
    pub fn remove_rule(&self, id: Uuid) -> Result<(), PolicyError> {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|stored| stored.rule.id != id);
        if rules.len() == before {
            return Err(PolicyError::RuleNotFound { id });
        }
        Ok(())
    }

    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Scan rules in order and return the first whose conditions all hold;
    /// otherwise the configured default.
    #[instrument(skip_all, fields(action = %ctx.action))]
    #[must_use]
    pub fn evaluate(&self, ctx: &PolicyContext) -> Decision {
        let rules = self.rules.read();
        for stored in rules.iter() {
            let rule = &stored.rule;
            if rule.conditions.iter().all(|c| c.evaluate(ctx)) {
                debug!(rule = %rule.name, effect = ?rule.effect, "rule matched");
                return Decision {
                    allowed: rule.effect == Effect::Allow,
                    reason: if rule.description.is_empty() {
                        format!("matched rule {}", rule.name)
                    } else {
                        rule.description.clone()
                    },
                    decided_by: rule.name.clone(),
                    details: Some(json!({
                        "rule_id": rule.id,
                        "priority": rule.priority,
                    })),
                };
            }
        }

        Decision {
            allowed: self.config.default_decision == Effect::Allow,
            reason: "no rule matched".to_owned(),
            decided_by: "default".to_owned(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::PolicyCondition;
    use crate::domain::model::{RoleAssignment, RoleScope, SubjectAttributes};

    fn ctx() -> PolicyContext {
        PolicyContext::new(
            SubjectAttributes {
                id: "user_123".to_owned(),
                roles: vec![RoleAssignment {
                    role: "admin".to_owned(),
                    scope: RoleScope::Global,
                    scope_target: None,
                    expires_at: None,
                }],
                ..Default::default()
            },
            "read",
        )
    }

    fn admin_rule(name: &str, priority: i32, effect: Effect) -> PolicyRule {
        PolicyRule::new(name, priority, effect).with_condition(PolicyCondition::HasRole {
            role: "admin".to_owned(),
            scope: RoleScope::Global,
            scope_target: None,
        })
    }

    #[test]
    fn empty_rule_set_yields_the_default_deny() {
        let engine = PolicyEngine::default();
        let decision = engine.evaluate(&ctx());
        assert!(!decision.allowed);
        assert_eq!(decision.decided_by, "default");
    }

    #[test]
    fn default_decision_is_configurable() {
        let engine = PolicyEngine::new(PolicyConfig {
            default_decision: Effect::Allow,
        });
        assert!(engine.evaluate(&ctx()).allowed);
    }

    #[test]
    fn first_match_wins_by_priority() {
        let engine = PolicyEngine::default();
        engine.add_rule(admin_rule("low-allow", 10, Effect::Allow));
        engine.add_rule(admin_rule("high-deny", 100, Effect::Deny));

        let decision = engine.evaluate(&ctx());
        assert!(!decision.allowed);
        assert_eq!(decision.decided_by, "high-deny");
    }

    #[test]
    fn later_lower_priority_allow_cannot_flip_a_deny() {
        let engine = PolicyEngine::default();
        engine.add_rule(admin_rule("deny", 100, Effect::Deny));
        assert!(!engine.evaluate(&ctx()).allowed);

        engine.add_rule(admin_rule("allow", 10, Effect::Allow));
        let decision = engine.evaluate(&ctx());
        assert!(!decision.allowed);
        assert_eq!(decision.decided_by, "deny");
    }

    #[test]
    fn ties_keep_insertion_order() {
        let engine = PolicyEngine::default();
        engine.add_rule(admin_rule("first", 50, Effect::Allow));
        engine.add_rule(admin_rule("second", 50, Effect::Deny));

        let decision = engine.evaluate(&ctx());
        assert!(decision.allowed);
        assert_eq!(decision.decided_by, "first");
    }

    #[test]
    fn unconditional_rules_always_match() {
        let engine = PolicyEngine::default();
        engine.add_rule(PolicyRule::new("allow-all", 1, Effect::Allow));
        assert!(engine.evaluate(&ctx()).allowed);
    }

    #[test]
    fn non_matching_rules_fall_through() {
        let engine = PolicyEngine::default();
        engine.add_rule(
            PolicyRule::new("owners-only", 100, Effect::Allow)
                .with_condition(PolicyCondition::IsResourceOwner),
        );
        let decision = engine.evaluate(&ctx());
        assert!(!decision.allowed);
        assert_eq!(decision.decided_by, "default");
    }

    #[test]
    fn remove_rule_by_id() {
        let engine = PolicyEngine::default();
        let rule = admin_rule("allow", 10, Effect::Allow);
        let id = rule.id;
        engine.add_rule(rule);
        assert_eq!(engine.rule_count(), 1);

        engine.remove_rule(id).unwrap();
        assert_eq!(engine.rule_count(), 0);
        assert!(matches!(
            engine.remove_rule(id),
            Err(PolicyError::RuleNotFound { .. })
        ));
    }
}
