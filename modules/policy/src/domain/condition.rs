//! The condition vocabulary.
//!
//! Conditions are data: a tagged `kind` plus typed parameters. The serde
//! tag doubles as the registry — an unknown kind fails to parse instead of
//! silently skipping. Operand normalization (country casing) happens once
//! at insert time; evaluators work on canonical form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conditions::{attributes, geo, rate, roles, time};
use super::model::{PolicyContext, RoleScope};

fn default_check_expiry() -> bool {
    true
}

/// One typed condition. Every evaluator is a pure
/// `(params, context) -> bool` and tolerates missing data by returning
/// `false`; negative geo predicates return `true` when data is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyCondition {
    HasRole {
        role: String,
        scope: RoleScope,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope_target: Option<String>,
    },
    HasAnyRole {
        roles: Vec<String>,
        scope: RoleScope,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope_target: Option<String>,
    },
    HasAllRoles {
        roles: Vec<String>,
        scope: RoleScope,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope_target: Option<String>,
    },
    IsResourceOwner,
    SameOrganization,
    HasRelationship {
        allowed_types: Vec<String>,
    },
    UserTypeIs {
        allowed: Vec<String>,
    },
    PlanAllows {
        allowed: Vec<String>,
    },
    AttributeEquals {
        attribute: String,
        value: String,
        #[serde(default = "default_check_expiry", rename = "checkExpiry")]
        check_expiry: bool,
    },
    AttributeExists {
        attribute: String,
        #[serde(default = "default_check_expiry", rename = "checkExpiry")]
        check_expiry: bool,
    },
    AttributeIn {
        attribute: String,
        values: Vec<String>,
        #[serde(default = "default_check_expiry", rename = "checkExpiry")]
        check_expiry: bool,
    },
    TimeInRange {
        start_hour: u32,
        end_hour: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
    DayOfWeek {
        allowed_days: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
    ValidDuring {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<DateTime<Utc>>,
    },
    NumericGt { attribute: String, value: f64 },
    NumericGte { attribute: String, value: f64 },
    NumericLt { attribute: String, value: f64 },
    NumericLte { attribute: String, value: f64 },
    NumericEq { attribute: String, value: f64 },
    NumericBetween {
        attribute: String,
        min: f64,
        max: f64,
    },
    CountryIn {
        countries: Vec<String>,
    },
    CountryNotIn {
        countries: Vec<String>,
    },
    IpInRange {
        ranges: Vec<String>,
    },
    RequestCountLt { pattern: String, limit: u64 },
    RequestCountLte { pattern: String, limit: u64 },
    RequestCountGt { pattern: String, limit: u64 },
    RequestCountGte { pattern: String, limit: u64 },
}

impl PolicyCondition {
    /// Canonicalize operands once, at insert time.
    pub fn normalize(&mut self) {
        match self {
            Self::CountryIn { countries } | Self::CountryNotIn { countries } => {
                for country in countries.iter_mut() {
                    *country = country.to_ascii_uppercase();
                }
            }
            Self::DayOfWeek { allowed_days, .. } => {
                for day in allowed_days.iter_mut() {
                    *day = day.to_ascii_lowercase();
                }
            }
            _ => {}
        }
    }

    /// Evaluate against a context. Pure; never suspends.
    #[must_use]
    pub fn evaluate(&self, ctx: &PolicyContext) -> bool {
        match self {
            Self::HasRole {
                role,
                scope,
                scope_target,
            } => roles::has_role(ctx, role, *scope, scope_target.as_deref()),
            Self::HasAnyRole {
                roles: names,
                scope,
                scope_target,
            } => names
                .iter()
                .any(|name| roles::has_role(ctx, name, *scope, scope_target.as_deref())),
            Self::HasAllRoles {
                roles: names,
                scope,
                scope_target,
            } => {
                !names.is_empty()
                    && names
                        .iter()
                        .all(|name| roles::has_role(ctx, name, *scope, scope_target.as_deref()))
            }
            Self::IsResourceOwner => roles::is_resource_owner(ctx),
            Self::SameOrganization => roles::same_organization(ctx),
            Self::HasRelationship { allowed_types } => roles::has_relationship(ctx, allowed_types),
            Self::UserTypeIs { allowed } => ctx
                .subject
                .user_type
                .as_deref()
                .is_some_and(|t| allowed.iter().any(|candidate| candidate == t)),
            Self::PlanAllows { allowed } => ctx
                .subject
                .plan
                .as_deref()
                .is_some_and(|p| allowed.iter().any(|candidate| candidate == p)),
            Self::AttributeEquals {
                attribute,
                value,
                check_expiry,
            } => attributes::equals(ctx, attribute, value, *check_expiry),
            Self::AttributeExists {
                attribute,
                check_expiry,
            } => attributes::exists(ctx, attribute, *check_expiry),
            Self::AttributeIn {
                attribute,
                values,
                check_expiry,
            } => attributes::is_in(ctx, attribute, values, *check_expiry),
            Self::TimeInRange {
                start_hour,
                end_hour,
                timezone,
            } => time::in_hour_range(ctx, *start_hour, *end_hour, timezone.as_deref()),
            Self::DayOfWeek {
                allowed_days,
                timezone,
            } => time::day_of_week(ctx, allowed_days, timezone.as_deref()),
            Self::ValidDuring { from, to } => time::valid_during(ctx, *from, *to),
            Self::NumericGt { attribute, value } => {
                attributes::numeric(ctx, attribute).is_some_and(|v| v > *value)
            }
            Self::NumericGte { attribute, value } => {
                attributes::numeric(ctx, attribute).is_some_and(|v| v >= *value)
            }
            Self::NumericLt { attribute, value } => {
                attributes::numeric(ctx, attribute).is_some_and(|v| v < *value)
            }
            Self::NumericLte { attribute, value } => {
                attributes::numeric(ctx, attribute).is_some_and(|v| v <= *value)
            }
            Self::NumericEq { attribute, value } => {
                attributes::numeric(ctx, attribute)
                    .is_some_and(|v| (v - *value).abs() < f64::EPSILON)
            }
            Self::NumericBetween {
                attribute,
                min,
                max,
            } => attributes::numeric(ctx, attribute).is_some_and(|v| v >= *min && v <= *max),
            Self::CountryIn { countries } => geo::country_in(ctx, countries),
            Self::CountryNotIn { countries } => !geo::country_in(ctx, countries),
            Self::IpInRange { ranges } => geo::ip_in_ranges(ctx, ranges),
            Self::RequestCountLt { pattern, limit } => {
                rate::count(ctx, pattern).is_some_and(|c| c < *limit)
            }
            Self::RequestCountLte { pattern, limit } => {
                rate::count(ctx, pattern).is_some_and(|c| c <= *limit)
            }
            Self::RequestCountGt { pattern, limit } => {
                rate::count(ctx, pattern).is_some_and(|c| c > *limit)
            }
            Self::RequestCountGte { pattern, limit } => {
                rate::count(ctx, pattern).is_some_and(|c| c >= *limit)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_parse_by_snake_case_tag() {
        let condition: PolicyCondition = serde_json::from_value(json!({
            "kind": "has_role",
            "role": "admin",
            "scope": "org",
            "scope_target": "org_1"
        }))
        .unwrap();
        assert!(matches!(condition, PolicyCondition::HasRole { .. }));
    }

    #[test]
    fn unknown_kind_is_a_parse_error() {
        let err =
            serde_json::from_value::<PolicyCondition>(json!({"kind": "quantum_check"})).unwrap_err();
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn check_expiry_defaults_on() {
        let condition: PolicyCondition = serde_json::from_value(json!({
            "kind": "attribute_equals",
            "attribute": "kyc",
            "value": "passed"
        }))
        .unwrap();
        let PolicyCondition::AttributeEquals { check_expiry, .. } = condition else {
            panic!("wrong variant");
        };
        assert!(check_expiry);
    }

    #[test]
    fn normalization_uppercases_countries() {
        let mut condition: PolicyCondition = serde_json::from_value(json!({
            "kind": "country_in",
            "countries": ["de", "fr"]
        }))
        .unwrap();
        condition.normalize();
        let PolicyCondition::CountryIn { countries } = condition else {
            panic!("wrong variant");
        };
        assert_eq!(countries, vec!["DE".to_owned(), "FR".to_owned()]);
    }
}
