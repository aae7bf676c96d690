//! Legality checks for model-proposed conditions.
//!
//! A condition is legal at a use site when it could be inserted there as a
//! Java guard and still compile: it parses, it is about the variable the
//! model was asked about, every name it touches is in scope, and its
//! comparisons agree with the variable's static type.

use std::collections::BTreeSet;

use thiserror::Error;

use super::expr::{parse_condition, BinaryOp, CondExpr, Literal, UnaryOp};

/// Qualifiers from `java.lang` that are always in scope.
const JAVA_LANG_TYPES: &[&str] = &[
    "Boolean",
    "Byte",
    "Character",
    "Double",
    "Float",
    "Integer",
    "Long",
    "Math",
    "Number",
    "Object",
    "Short",
    "StrictMath",
    "String",
    "System",
];

// ============================================================================
// Query and Verdict
// ============================================================================

/// One candidate condition to judge, with the context of its use site.
#[derive(Debug, Clone, Copy)]
pub struct LegalityQuery<'a> {
    /// Static type of the target variable, if it could be resolved.
    pub var_type: Option<&'a str>,
    /// The target variable.
    pub var_name: &'a str,
    /// Condition text with the placeholder already substituted.
    pub condition: &'a str,
    /// Variables in scope at the use site.
    pub legal_names: &'a BTreeSet<String>,
    /// Simple name of the enclosing class.
    pub class_name: Option<&'a str>,
}

/// Why a condition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("condition does not parse: {message}")]
    Malformed { message: String },

    #[error("variable '{name}' is not in scope")]
    UnknownVariable { name: String },

    #[error("type of '{name}' is unknown")]
    UnresolvedType { name: String },

    #[error("condition does not mention '{name}'")]
    MissingTarget { name: String },

    #[error("condition is not a boolean expression")]
    NotBoolean,

    #[error("name '{name}' is not in scope")]
    OutOfScope { name: String },

    #[error("call to unqualified method '{name}'")]
    UnqualifiedCall { name: String },

    #[error("member '{member}' of foreign type '{class}'")]
    ForeignMember { class: String, member: String },

    #[error("type mismatch: {reason}")]
    TypeMismatch { reason: String },
}

/// Pluggable legality policy.
///
/// Implementations are pure: no I/O, no shared state, and never panic on
/// malformed input. The trait is object-safe so a predictor can hold an
/// `Arc<dyn LegalityFilter>`.
pub trait LegalityFilter: Send + Sync {
    /// Judge a candidate, explaining any rejection.
    fn check(&self, query: &LegalityQuery<'_>) -> Result<(), Rejection>;

    /// Whether `condition` is legal for `var_name` at the use site.
    fn is_legal_expr(
        &self,
        var_type: Option<&str>,
        var_name: &str,
        condition: &str,
        legal_names: &BTreeSet<String>,
        class_name: Option<&str>,
    ) -> bool {
        self.check(&LegalityQuery {
            var_type,
            var_name,
            condition,
            legal_names,
            class_name,
        })
        .is_ok()
    }
}

// ============================================================================
// Java Types
// ============================================================================

/// Coarse value category of a Java type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Boolean,
    /// Integral, floating-point and `char` values.
    Numeric,
    Text,
    Array,
    Object,
}

/// A Java static type reduced to what legality checks need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JavaType {
    pub kind: ValueKind,
    pub primitive: bool,
}

impl JavaType {
    /// Classify a declared type name such as `int`, `java.lang.Integer`,
    /// `List<String>` or `byte[]`.
    pub fn classify(type_name: &str) -> JavaType {
        let name = type_name.trim();
        if name.ends_with("[]") || name.ends_with("...") {
            return JavaType {
                kind: ValueKind::Array,
                primitive: false,
            };
        }

        let base = name.split_once('<').map_or(name, |(base, _)| base).trim();
        let simple = base.strip_prefix("java.lang.").unwrap_or(base);
        let (kind, primitive) = match simple {
            "boolean" => (ValueKind::Boolean, true),
            "byte" | "short" | "int" | "long" | "float" | "double" | "char" => {
                (ValueKind::Numeric, true)
            }
            "Boolean" => (ValueKind::Boolean, false),
            "Byte" | "Short" | "Integer" | "Long" | "Float" | "Double" | "Character" => {
                (ValueKind::Numeric, false)
            }
            "String" => (ValueKind::Text, false),
            _ => (ValueKind::Object, false),
        };
        JavaType { kind, primitive }
    }

    fn describe(self) -> &'static str {
        match (self.kind, self.primitive) {
            (ValueKind::Boolean, true) => "primitive boolean",
            (ValueKind::Boolean, false) => "Boolean",
            (ValueKind::Numeric, true) => "primitive numeric",
            (ValueKind::Numeric, false) => "boxed numeric",
            (ValueKind::Text, _) => "String",
            (ValueKind::Array, _) => "array",
            (ValueKind::Object, _) => "reference",
        }
    }
}

// ============================================================================
// Java Policy
// ============================================================================

/// Default legality policy for Java guard conditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaLegalityFilter;

impl JavaLegalityFilter {
    pub fn new() -> Self {
        JavaLegalityFilter
    }
}

impl LegalityFilter for JavaLegalityFilter {
    fn check(&self, query: &LegalityQuery<'_>) -> Result<(), Rejection> {
        let var = query.var_name;
        if !query.legal_names.contains(var) {
            return Err(Rejection::UnknownVariable {
                name: var.to_string(),
            });
        }
        let ty = match query.var_type.map(str::trim) {
            Some(t) if !t.is_empty() => JavaType::classify(t),
            _ => {
                return Err(Rejection::UnresolvedType {
                    name: var.to_string(),
                })
            }
        };

        let expr = parse_condition(query.condition).map_err(|e| Rejection::Malformed {
            message: e.to_string(),
        })?;

        if !expr.references(var) {
            return Err(Rejection::MissingTarget {
                name: var.to_string(),
            });
        }

        let checker = Checker { query, ty };
        checker.check_scope(&expr)?;

        let mut mismatch = Ok(());
        expr.walk(&mut |node| {
            if mismatch.is_ok() {
                mismatch = checker.check_types(node);
            }
        });
        mismatch?;

        if !checker.is_boolean_shaped(&expr) {
            return Err(Rejection::NotBoolean);
        }
        Ok(())
    }
}

struct Checker<'q, 'a> {
    query: &'q LegalityQuery<'a>,
    ty: JavaType,
}

impl Checker<'_, '_> {
    fn is_target(&self, expr: &CondExpr) -> bool {
        expr.is_name(self.query.var_name)
    }

    fn mismatch(&self, reason: impl Into<String>) -> Rejection {
        Rejection::TypeMismatch {
            reason: reason.into(),
        }
    }

    // ------------------------------------------------------------------------
    // Scope
    // ------------------------------------------------------------------------

    fn check_scope(&self, expr: &CondExpr) -> Result<(), Rejection> {
        match expr {
            CondExpr::Literal(_) => Ok(()),
            CondExpr::Name(name) => self.check_value_name(name),
            CondExpr::Field { target, name } => self.check_receiver(target, name),
            CondExpr::Call {
                target: None,
                method,
                ..
            } => Err(Rejection::UnqualifiedCall {
                name: method.clone(),
            }),
            CondExpr::Call {
                target: Some(target),
                method,
                args,
            } => {
                self.check_receiver(target, method)?;
                args.iter().try_for_each(|arg| self.check_scope(arg))
            }
            CondExpr::Index { target, index } => {
                self.check_scope(target)?;
                self.check_scope(index)
            }
            CondExpr::Unary { operand, .. } | CondExpr::InstanceOf { operand, .. } => {
                self.check_scope(operand)
            }
            CondExpr::Binary { lhs, rhs, .. } => {
                self.check_scope(lhs)?;
                self.check_scope(rhs)
            }
        }
    }

    fn check_receiver(&self, target: &CondExpr, member: &str) -> Result<(), Rejection> {
        match target {
            CondExpr::Name(name) => self.check_qualifier(name, member),
            other => self.check_scope(other),
        }
    }

    fn is_value_name(&self, name: &str) -> bool {
        name == self.query.var_name || name == "this" || self.query.legal_names.contains(name)
    }

    fn check_value_name(&self, name: &str) -> Result<(), Rejection> {
        if self.is_value_name(name) {
            Ok(())
        } else {
            Err(Rejection::OutOfScope {
                name: name.to_string(),
            })
        }
    }

    /// A root name used as `name.member`: a value, the enclosing class, or
    /// a `java.lang` type.
    fn check_qualifier(&self, name: &str, member: &str) -> Result<(), Rejection> {
        if self.is_value_name(name)
            || self.query.class_name == Some(name)
            || JAVA_LANG_TYPES.contains(&name)
        {
            return Ok(());
        }
        if name.starts_with(|c: char| c.is_uppercase()) {
            Err(Rejection::ForeignMember {
                class: name.to_string(),
                member: member.to_string(),
            })
        } else {
            Err(Rejection::OutOfScope {
                name: name.to_string(),
            })
        }
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    /// Check one node in which the target variable is a direct operand.
    fn check_types(&self, node: &CondExpr) -> Result<(), Rejection> {
        let var = self.query.var_name;
        let ty = self.ty;
        match node {
            CondExpr::Field { target, name } if self.is_target(target) => {
                if ty.primitive {
                    return Err(self.mismatch(format!("cannot dereference {} '{var}'", ty.describe())));
                }
                if ty.kind == ValueKind::Array && name != "length" {
                    return Err(self.mismatch(format!("array '{var}' has no field '{name}'")));
                }
                Ok(())
            }
            CondExpr::Call {
                target: Some(target),
                method,
                ..
            } if self.is_target(target) => {
                if ty.primitive {
                    return Err(self.mismatch(format!(
                        "cannot call '{method}' on {} '{var}'",
                        ty.describe()
                    )));
                }
                Ok(())
            }
            CondExpr::Index { target, .. } if self.is_target(target) => {
                if ty.kind != ValueKind::Array {
                    return Err(self.mismatch(format!("cannot index {} '{var}'", ty.describe())));
                }
                Ok(())
            }
            CondExpr::InstanceOf { operand, .. } if self.is_target(operand) => {
                if ty.primitive {
                    return Err(self.mismatch(format!("instanceof on {} '{var}'", ty.describe())));
                }
                Ok(())
            }
            CondExpr::Unary { op, operand } if self.is_target(operand) => {
                let expected = match op {
                    UnaryOp::Not => ValueKind::Boolean,
                    UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot => ValueKind::Numeric,
                };
                if ty.kind != expected {
                    return Err(self.mismatch(format!(
                        "unary operator on {} '{var}'",
                        ty.describe()
                    )));
                }
                Ok(())
            }
            CondExpr::Binary { op, lhs, rhs } => {
                if self.is_target(lhs) {
                    self.check_binary(*op, rhs)?;
                }
                if self.is_target(rhs) {
                    self.check_binary(*op, lhs)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// The target variable is one operand of `op`; `other` is the other one.
    fn check_binary(&self, op: BinaryOp, other: &CondExpr) -> Result<(), Rejection> {
        let var = self.query.var_name;
        let ty = self.ty;
        let literal = other.as_literal();

        if op.is_equality() {
            let compatible = match literal {
                None => true,
                Some(Literal::Null) => !ty.primitive,
                Some(Literal::Bool(_)) => ty.kind == ValueKind::Boolean,
                Some(Literal::Int(_) | Literal::Float(_) | Literal::Char(_)) => {
                    ty.kind == ValueKind::Numeric
                }
                Some(Literal::Str(_)) => {
                    matches!(ty.kind, ValueKind::Text | ValueKind::Object)
                }
            };
            if !compatible {
                return Err(self.mismatch(format!(
                    "{} '{var}' compared with incompatible literal",
                    ty.describe()
                )));
            }
            return Ok(());
        }

        let allowed = if op.is_relational() || op.is_shift() {
            ty.kind == ValueKind::Numeric
        } else if op == BinaryOp::Add {
            matches!(ty.kind, ValueKind::Numeric | ValueKind::Text)
        } else if op.is_arithmetic() {
            ty.kind == ValueKind::Numeric
        } else if op.is_logical() {
            ty.kind == ValueKind::Boolean
        } else if op.is_bitwise() {
            matches!(ty.kind, ValueKind::Boolean | ValueKind::Numeric)
        } else {
            true
        };
        if !allowed {
            return Err(self.mismatch(format!("{op:?} applied to {} '{var}'", ty.describe())));
        }

        if op.is_relational()
            && matches!(
                literal,
                Some(Literal::Null | Literal::Bool(_) | Literal::Str(_))
            )
        {
            return Err(self.mismatch(format!("'{var}' ordered against a non-numeric literal")));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Shape
    // ------------------------------------------------------------------------

    fn is_boolean_shaped(&self, expr: &CondExpr) -> bool {
        match expr {
            CondExpr::Literal(Literal::Bool(_)) => true,
            CondExpr::Binary { op, lhs, rhs } => {
                if op.is_equality() || op.is_relational() || op.is_logical() {
                    true
                } else if op.is_bitwise() {
                    self.is_boolean_shaped(lhs) && self.is_boolean_shaped(rhs)
                } else {
                    false
                }
            }
            CondExpr::Unary {
                op: UnaryOp::Not,
                operand,
            } => match operand.as_ref() {
                CondExpr::Call { .. } => self.is_boolean_shaped(operand),
                _ => true,
            },
            CondExpr::InstanceOf { .. } => true,
            CondExpr::Call { method, .. } => is_predicate_method(method),
            CondExpr::Name(_) => self.is_target(expr) && self.ty.kind == ValueKind::Boolean,
            _ => false,
        }
    }
}

/// Prefixes of methods that read as yes/no questions (`isEmpty`, `hasNext`).
const PREDICATE_PREFIXES: &[&str] = &["is", "has", "can", "should", "contains", "equals"];

/// Methods returning `boolean` whose names carry no question prefix.
const PREDICATE_METHODS: &[&str] = &["startsWith", "endsWith", "matches", "exists", "test"];

/// Whether a method name reads as returning `boolean`.
///
/// Return types are unknown here, so `length()` or `hashCode()` are refused
/// rather than guessed at.
fn is_predicate_method(method: &str) -> bool {
    if PREDICATE_METHODS.contains(&method) {
        return true;
    }
    PREDICATE_PREFIXES.iter().any(|prefix| {
        method.strip_prefix(prefix).is_some_and(|rest| {
            rest.is_empty() || rest.starts_with(|c: char| c.is_ascii_uppercase())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn check(var_type: &str, var: &str, cond: &str, legal: &[&str]) -> Result<(), Rejection> {
        let legal = names(legal);
        JavaLegalityFilter::new().check(&LegalityQuery {
            var_type: Some(var_type),
            var_name: var,
            condition: cond,
            legal_names: &legal,
            class_name: Some("Foo"),
        })
    }

    fn legal(var_type: &str, var: &str, cond: &str) -> bool {
        check(var_type, var, cond, &[var, "other", "limit"]).is_ok()
    }

    // =========================================================================
    // Classification
    // =========================================================================

    #[test]
    fn classify_types() {
        let t = JavaType::classify;
        assert_eq!(t("int").kind, ValueKind::Numeric);
        assert!(t("int").primitive);
        assert_eq!(t("java.lang.Integer").kind, ValueKind::Numeric);
        assert!(!t("Integer").primitive);
        assert_eq!(t("boolean").kind, ValueKind::Boolean);
        assert_eq!(t("String").kind, ValueKind::Text);
        assert_eq!(t("int[]").kind, ValueKind::Array);
        assert_eq!(t("List<String>[]").kind, ValueKind::Array);
        assert_eq!(t("List<Integer>").kind, ValueKind::Object);
        assert_eq!(t("Object").kind, ValueKind::Object);
    }

    // =========================================================================
    // Accepted Conditions
    // =========================================================================

    #[test]
    fn null_check_on_string_is_legal() {
        let legal_names = names(&["x", "y"]);
        let filter = JavaLegalityFilter::new();
        assert!(filter.is_legal_expr(
            Some("String"),
            "x",
            "x == null",
            &legal_names,
            Some("Foo")
        ));
    }

    #[test]
    fn accepts_typical_guards() {
        assert!(legal("int", "i", "i < 0"));
        assert!(legal("int", "i", "i >= limit"));
        assert!(legal("int", "i", "i % 2 == 0"));
        assert!(legal("long", "n", "n != -1L"));
        assert!(legal("char", "c", "c == 'a'"));
        assert!(legal("boolean", "done", "!done"));
        assert!(legal("boolean", "done", "done"));
        assert!(legal("boolean", "done", "done && other != null"));
        assert!(legal("Integer", "count", "count == null || count > 3"));
        assert!(legal("String", "s", "s.isEmpty()"));
        assert!(legal("String", "s", "s.length() > 0"));
        assert!(legal("String", "s", "s.equals(\"abc\")"));
        assert!(legal("Object", "o", "o instanceof String"));
        assert!(legal("int[]", "arr", "arr.length == 0"));
        assert!(legal("int[]", "arr", "arr[0] > limit"));
        assert!(legal("double", "d", "Math.abs(d) < 1e-6"));
        assert!(legal("int", "i", "i > this.size"));
        assert!(legal("int", "i", "i > Foo.MAX"));
    }

    // =========================================================================
    // Rejected Conditions
    // =========================================================================

    #[test]
    fn rejects_unparseable() {
        assert!(matches!(
            check("int", "i", "i = 0", &["i"]),
            Err(Rejection::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_unknown_variable_and_type() {
        assert_eq!(
            check("int", "i", "i > 0", &["j"]),
            Err(Rejection::UnknownVariable {
                name: "i".to_string()
            })
        );
        let legal_names = names(&["i"]);
        let filter = JavaLegalityFilter::new();
        assert!(!filter.is_legal_expr(None, "i", "i > 0", &legal_names, None));
        assert!(!filter.is_legal_expr(Some("  "), "i", "i > 0", &legal_names, None));
    }

    #[test]
    fn rejects_condition_without_target() {
        assert_eq!(
            check("int", "i", "other > 0", &["i", "other"]),
            Err(Rejection::MissingTarget {
                name: "i".to_string()
            })
        );
        // A field named like the variable does not count.
        assert!(matches!(
            check("int", "i", "this.i > 0", &["i"]),
            Err(Rejection::MissingTarget { .. })
        ));
    }

    #[test]
    fn rejects_non_boolean() {
        assert_eq!(check("int", "i", "i + 1", &["i"]), Err(Rejection::NotBoolean));
        assert_eq!(check("int", "i", "i", &["i"]), Err(Rejection::NotBoolean));
        assert_eq!(check("int", "i", "i & 1", &["i"]), Err(Rejection::NotBoolean));
    }

    #[test]
    fn rejects_calls_that_are_not_predicates() {
        for cond in [
            "s.length()",
            "s.hashCode()",
            "s.toString()",
            "s.charAt(0)",
            "s.indexOf(\"a\")",
            "s.compareTo(\"a\")",
            "!s.length()",
            "s.issue()",
        ] {
            assert_eq!(
                check("String", "s", cond, &["s"]),
                Err(Rejection::NotBoolean),
                "should reject {cond:?}"
            );
        }
        assert!(!legal("List<String>", "xs", "xs.size()"));
        assert!(!legal("List<String>", "xs", "xs.get(0)"));
    }

    #[test]
    fn accepts_predicate_calls() {
        assert!(legal("String", "s", "!s.isEmpty()"));
        assert!(legal("String", "s", "s.startsWith(\"a\")"));
        assert!(legal("String", "s", "s.equalsIgnoreCase(\"a\")"));
        assert!(legal("String", "s", "s.contains(\"a\")"));
        assert!(legal("List<String>", "xs", "xs.containsAll(other)"));
        assert!(legal("Iterator<String>", "it", "it.hasNext()"));
        assert!(legal("char", "c", "Character.isDigit(c)"));
        assert!(legal("double", "d", "Double.isNaN(d)"));
    }

    #[test]
    fn rejects_out_of_scope_names() {
        assert_eq!(
            check("int", "i", "i > ghost", &["i"]),
            Err(Rejection::OutOfScope {
                name: "ghost".to_string()
            })
        );
        assert_eq!(
            check("int", "i", "isValid(i)", &["i"]),
            Err(Rejection::UnqualifiedCall {
                name: "isValid".to_string()
            })
        );
        assert_eq!(
            check("int", "i", "i > Other.LIMIT", &["i"]),
            Err(Rejection::ForeignMember {
                class: "Other".to_string(),
                member: "LIMIT".to_string()
            })
        );
        assert!(matches!(
            check("int", "i", "i > config.limit", &["i"]),
            Err(Rejection::OutOfScope { .. })
        ));
    }

    #[test]
    fn rejects_primitive_misuse() {
        for cond in ["i == null", "i.equals(0)", "i.value > 0", "i instanceof Integer"] {
            assert!(
                matches!(
                    check("int", "i", cond, &["i"]),
                    Err(Rejection::TypeMismatch { .. })
                ),
                "should reject {cond:?}"
            );
        }
    }

    #[test]
    fn rejects_boolean_arithmetic() {
        assert!(!legal("boolean", "b", "b > 0"));
        assert!(!legal("boolean", "b", "b + 1 == 2"));
        assert!(!legal("boolean", "b", "b == 1"));
        assert!(!legal("Boolean", "b", "-b == 1"));
    }

    #[test]
    fn rejects_reference_comparisons() {
        assert!(!legal("Object", "o", "o > 0"));
        assert!(!legal("Object", "o", "o == 1"));
        assert!(!legal("List<String>", "xs", "xs < other"));
        assert!(!legal("Object", "o", "o[0] == null"));
        assert!(!legal("Object", "o", "!o"));
    }

    #[test]
    fn rejects_literal_kind_mismatch() {
        assert!(!legal("int", "i", "i == \"0\""));
        assert!(!legal("int", "i", "i == true"));
        assert!(!legal("int", "i", "i < null"));
        assert!(!legal("String", "s", "s == 0"));
        assert!(!legal("String", "s", "s > \"a\""));
        assert!(!legal("int[]", "arr", "arr.size > 0"));
    }

    #[test]
    fn malformed_text_never_panics() {
        for cond in ["", "((((", "x.", "x[", "\"", "'", "x instanceof", "0x", "1e+"] {
            assert!(!legal("int", "x", cond), "should reject {cond:?}");
        }
    }
}
