//! Relation algebra expressions.
//!
//! Expressions arrive as JSON (object or string), are parsed once into a
//! tagged sum type, and the evaluator pattern-matches over the variants.
//! The parser is pure and total: every malformed input maps to one of the
//! enumerated [`ExpressionParseError`] variants.

use serde::Serialize;
use serde_json::Value;

/// Default nesting limit for parsed expressions.
pub const DEFAULT_EXPRESSION_DEPTH_LIMIT: usize = 16;

/// A relation rewrite expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelationExpression {
    /// A stored tuple grants the relation.
    Direct,
    /// Any child grants the relation.
    Union { children: Vec<RelationExpression> },
    /// Every child must grant the relation.
    Intersection { children: Vec<RelationExpression> },
    /// `base` grants it and `subtract` does not.
    Exclusion {
        base: Box<RelationExpression>,
        subtract: Box<RelationExpression>,
    },
    /// The relation holds on some object reached through
    /// `tupleset_relation`, checked under `computed_userset_relation`.
    TupleToUserset {
        tupleset_relation: String,
        computed_userset_relation: String,
    },
    /// Placeholder for the defining relation itself; behaves as `Direct`.
    This,
}

/// Enumerated parse failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionParseError {
    #[error("expression node has no type discriminant")]
    MissingKind,

    #[error("unknown expression type: {kind}")]
    UnknownKind { kind: String },

    #[error("{kind} expects {expected}, got {got}")]
    BadArity {
        kind: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("field {field} of {kind} has the wrong type")]
    TypeMismatch {
        kind: &'static str,
        field: &'static str,
    },

    #[error("expression nesting exceeds the limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("expression is not valid json: {reason}")]
    NotJson { reason: String },
}

impl RelationExpression {
    /// Parse an expression from its JSON text.
    ///
    /// # Errors
    ///
    /// Any [`ExpressionParseError`]; the parser performs no I/O.
    pub fn parse_str(
        raw: &str,
        depth_limit: usize,
    ) -> Result<Self, ExpressionParseError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ExpressionParseError::NotJson {
                reason: e.to_string(),
            })?;
        Self::parse_value(&value, depth_limit)
    }

    /// Parse an expression from a JSON value. A JSON string is treated as
    /// embedded JSON text.
    ///
    /// # Errors
    ///
    /// Any [`ExpressionParseError`].
    pub fn parse_value(
        value: &Value,
        depth_limit: usize,
    ) -> Result<Self, ExpressionParseError> {
        match value {
            Value::String(raw) => Self::parse_str(raw, depth_limit),
            other => parse_node(other, 0, depth_limit),
        }
    }

    /// Serialize back to the JSON shape the parser accepts.
    #[must_use]
    pub fn to_value(&self) -> Value {
        // Serialize of this enum cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn parse_node(
    value: &Value,
    depth: usize,
    depth_limit: usize,
) -> Result<RelationExpression, ExpressionParseError> {
    if depth >= depth_limit {
        return Err(ExpressionParseError::DepthExceeded { limit: depth_limit });
    }

    let Value::Object(map) = value else {
        return Err(ExpressionParseError::MissingKind);
    };
    let kind = match map.get("type") {
        Some(Value::String(kind)) => kind.as_str(),
        Some(_) => {
            return Err(ExpressionParseError::TypeMismatch {
                kind: "node",
                field: "type",
            });
        }
        None => return Err(ExpressionParseError::MissingKind),
    };

    match kind {
        "direct" => Ok(RelationExpression::Direct),
        "this" => Ok(RelationExpression::This),
        "union" => Ok(RelationExpression::Union {
            children: parse_children(map, "union", depth, depth_limit)?,
        }),
        "intersection" => Ok(RelationExpression::Intersection {
            children: parse_children(map, "intersection", depth, depth_limit)?,
        }),
        "exclusion" => {
            let base = map.get("base").ok_or(ExpressionParseError::BadArity {
                kind: "exclusion",
                expected: "base and subtract",
                got: 0,
            })?;
            let subtract = map.get("subtract").ok_or(ExpressionParseError::BadArity {
                kind: "exclusion",
                expected: "base and subtract",
                got: 1,
            })?;
            Ok(RelationExpression::Exclusion {
                base: Box::new(parse_node(base, depth + 1, depth_limit)?),
                subtract: Box::new(parse_node(subtract, depth + 1, depth_limit)?),
            })
        }
        "tuple_to_userset" => {
            let tupleset = string_field(map, "tuple_to_userset", "tupleset_relation")?;
            let computed = string_field(map, "tuple_to_userset", "computed_userset_relation")?;
            Ok(RelationExpression::TupleToUserset {
                tupleset_relation: tupleset,
                computed_userset_relation: computed,
            })
        }
        other => Err(ExpressionParseError::UnknownKind {
            kind: other.to_owned(),
        }),
    }
}

fn parse_children(
    map: &serde_json::Map<String, Value>,
    kind: &'static str,
    depth: usize,
    depth_limit: usize,
) -> Result<Vec<RelationExpression>, ExpressionParseError> {
    let children = match map.get("children") {
        Some(Value::Array(children)) => children,
        Some(_) => {
            return Err(ExpressionParseError::TypeMismatch {
                kind,
                field: "children",
            });
        }
        None => {
            return Err(ExpressionParseError::BadArity {
                kind,
                expected: "at least 2 children",
                got: 0,
            });
        }
    };
    if children.len() < 2 {
        return Err(ExpressionParseError::BadArity {
            kind,
            expected: "at least 2 children",
            got: children.len(),
        });
    }
    children
        .iter()
        .map(|child| parse_node(child, depth + 1, depth_limit))
        .collect()
}

fn string_field(
    map: &serde_json::Map<String, Value>,
    kind: &'static str,
    field: &'static str,
) -> Result<String, ExpressionParseError> {
    match map.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(_) => Err(ExpressionParseError::TypeMismatch { kind, field }),
        None => Err(ExpressionParseError::TypeMismatch { kind, field }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<RelationExpression, ExpressionParseError> {
        RelationExpression::parse_value(&value, DEFAULT_EXPRESSION_DEPTH_LIMIT)
    }

    #[test]
    fn parses_direct_and_this() {
        assert_eq!(parse(json!({"type": "direct"})).unwrap(), RelationExpression::Direct);
        assert_eq!(parse(json!({"type": "this"})).unwrap(), RelationExpression::This);
    }

    #[test]
    fn parses_nested_algebra() {
        let expr = parse(json!({
            "type": "union",
            "children": [
                {"type": "direct"},
                {
                    "type": "exclusion",
                    "base": {"type": "this"},
                    "subtract": {
                        "type": "tuple_to_userset",
                        "tupleset_relation": "parent",
                        "computed_userset_relation": "banned"
                    }
                }
            ]
        }))
        .unwrap();

        let RelationExpression::Union { children } = expr else {
            panic!("expected union");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(children[1], RelationExpression::Exclusion { .. }));
    }

    #[test]
    fn accepts_embedded_json_strings() {
        let expr = RelationExpression::parse_value(
            &json!(r#"{"type":"direct"}"#),
            DEFAULT_EXPRESSION_DEPTH_LIMIT,
        )
        .unwrap();
        assert_eq!(expr, RelationExpression::Direct);
    }

    #[test]
    fn missing_discriminant() {
        assert_eq!(parse(json!({})).unwrap_err(), ExpressionParseError::MissingKind);
        assert_eq!(parse(json!(17)).unwrap_err(), ExpressionParseError::MissingKind);
    }

    #[test]
    fn unknown_discriminant() {
        let err = parse(json!({"type": "difference"})).unwrap_err();
        assert_eq!(
            err,
            ExpressionParseError::UnknownKind {
                kind: "difference".to_owned()
            }
        );
    }

    #[test]
    fn union_arity_is_enforced() {
        let err = parse(json!({"type": "union", "children": [{"type": "direct"}]})).unwrap_err();
        assert!(matches!(err, ExpressionParseError::BadArity { kind: "union", got: 1, .. }));

        let err = parse(json!({"type": "intersection"})).unwrap_err();
        assert!(matches!(err, ExpressionParseError::BadArity { kind: "intersection", got: 0, .. }));
    }

    #[test]
    fn exclusion_requires_both_operands() {
        let err = parse(json!({"type": "exclusion", "base": {"type": "direct"}})).unwrap_err();
        assert!(matches!(err, ExpressionParseError::BadArity { kind: "exclusion", .. }));
    }

    #[test]
    fn field_type_mismatch() {
        let err = parse(json!({"type": "union", "children": "direct"})).unwrap_err();
        assert!(matches!(err, ExpressionParseError::TypeMismatch { field: "children", .. }));

        let err = parse(json!({
            "type": "tuple_to_userset",
            "tupleset_relation": 3,
            "computed_userset_relation": "viewer"
        }))
        .unwrap_err();
        assert!(matches!(err, ExpressionParseError::TypeMismatch { field: "tupleset_relation", .. }));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut value = json!({"type": "direct"});
        for _ in 0..20 {
            value = json!({"type": "exclusion", "base": value, "subtract": {"type": "direct"}});
        }
        let err = parse(value).unwrap_err();
        assert_eq!(err, ExpressionParseError::DepthExceeded { limit: 16 });
    }

    #[test]
    fn serialization_round_trips() {
        let exprs = [
            RelationExpression::Direct,
            RelationExpression::This,
            RelationExpression::Union {
                children: vec![
                    RelationExpression::Direct,
                    RelationExpression::TupleToUserset {
                        tupleset_relation: "parent".to_owned(),
                        computed_userset_relation: "viewer".to_owned(),
                    },
                ],
            },
            RelationExpression::Intersection {
                children: vec![RelationExpression::Direct, RelationExpression::This],
            },
            RelationExpression::Exclusion {
                base: Box::new(RelationExpression::Direct),
                subtract: Box::new(RelationExpression::This),
            },
        ];

        for expr in exprs {
            let reparsed = RelationExpression::parse_value(
                &expr.to_value(),
                DEFAULT_EXPRESSION_DEPTH_LIMIT,
            )
            .unwrap();
            assert_eq!(reparsed, expr);
        }
    }
}
