//! Use sites: the places in Java source that feature rows describe.
//!
//! The Java parser lives outside this crate. It resolves locations into
//! [`Use`] values (a reference to a variable or an expression node) and
//! declarations into [`VariableBinding`] values, and hands them over either
//! directly or serialized as JSON. Both forms are wrapped in [`UseSite`], the
//! single input type every feature item accepts.
//!
//! All types here are immutable value objects; nothing in the extraction path
//! mutates a site.

use serde::{Deserialize, Serialize};

use crate::types::Location;

// ============================================================================
// Assignments and Bindings
// ============================================================================

/// One assignment to a variable, as seen by the parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    /// Line of the assignment (1-indexed).
    pub line: u32,
    /// Right-hand side text (`x = foo(y)` -> `foo(y)`).
    pub expr: String,
}

impl Assignment {
    pub fn new(line: u32, expr: impl Into<String>) -> Self {
        Assignment {
            line,
            expr: expr.into(),
        }
    }
}

/// A declared variable resolved by the parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariableBinding {
    /// Variable name.
    pub name: String,
    /// Declared static type (`int`, `String`, `List<Foo>`, ...).
    pub var_type: String,
    /// Declaration location.
    pub declared_at: Location,
    /// Enclosing method; `None` for fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Known assignments, including the declaration initializer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignments: Vec<Assignment>,
}

impl VariableBinding {
    /// Create a binding with no assignments.
    pub fn new(name: impl Into<String>, var_type: impl Into<String>, declared_at: Location) -> Self {
        VariableBinding {
            name: name.into(),
            var_type: var_type.into(),
            declared_at,
            method: None,
            assignments: Vec::new(),
        }
    }

    /// Set the enclosing method.
    pub fn in_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a known assignment.
    pub fn with_assignment(mut self, line: u32, expr: impl Into<String>) -> Self {
        self.assignments.push(Assignment::new(line, expr));
        self
    }

    /// The last assignment strictly before `line`.
    ///
    /// When several assignments share the winning line, the one listed last wins.
    pub fn last_assignment_before(&self, line: u32) -> Option<&Assignment> {
        self.assignments
            .iter()
            .filter(|a| a.line < line)
            .fold(None, |best: Option<&Assignment>, a| match best {
                Some(b) if b.line > a.line => Some(b),
                _ => Some(a),
            })
    }

    /// Whether the variable is declared strictly before `line`.
    pub fn is_declared_before(&self, line: u32) -> bool {
        self.declared_at.line < line
    }
}

// ============================================================================
// Uses
// ============================================================================

/// What a [`Use`] refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UseTarget {
    /// A reference to a named variable.
    #[default]
    Variable,
    /// An expression node (method call, field chain, ...).
    Expression,
}

/// A resolved syntactic use of a variable or expression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Use {
    /// Where the use occurs.
    pub location: Location,
    /// Variable name, or the expression text for expression uses.
    pub name: String,
    /// Variable reference or expression node.
    #[serde(default)]
    pub target: UseTarget,
    /// Enclosing method; `None` outside any method body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Static type, if the parser could resolve it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_type: Option<String>,
    /// Text of the smallest enclosing expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_expr: Option<String>,
    /// Binding of the referenced variable (variable uses only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<VariableBinding>,
}

impl Use {
    /// Create a variable use with nothing but a location and a name.
    pub fn variable(location: Location, name: impl Into<String>) -> Self {
        Use {
            location,
            name: name.into(),
            target: UseTarget::Variable,
            method: None,
            var_type: None,
            partial_expr: None,
            binding: None,
        }
    }

    /// Create an expression use.
    pub fn expression(location: Location, text: impl Into<String>) -> Self {
        Use {
            target: UseTarget::Expression,
            ..Use::variable(location, text)
        }
    }

    pub fn in_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_type(mut self, var_type: impl Into<String>) -> Self {
        self.var_type = Some(var_type.into());
        self
    }

    pub fn with_partial_expr(mut self, text: impl Into<String>) -> Self {
        self.partial_expr = Some(text.into());
        self
    }

    pub fn with_binding(mut self, binding: VariableBinding) -> Self {
        self.binding = Some(binding);
        self
    }
}

// ============================================================================
// UseSite
// ============================================================================

/// Input to every feature item.
///
/// JSON form is tagged by `kind`:
///
/// ```json
/// {"kind": "use", "location": {"file": "Foo.java", "line": 42, "col": 9}, "name": "x"}
/// {"kind": "variable", "binding": {...}, "line": 42}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UseSite {
    /// A resolved syntactic use.
    Use(Use),
    /// A declared variable considered at a target line, with no AST node.
    Variable { binding: VariableBinding, line: u32 },
}

impl UseSite {
    /// Wrap a `(variable, line)` pair.
    pub fn variable_at(binding: VariableBinding, line: u32) -> Self {
        UseSite::Variable { binding, line }
    }

    /// The line this site describes.
    pub fn line(&self) -> u32 {
        match self {
            UseSite::Use(u) => u.location.line,
            UseSite::Variable { line, .. } => *line,
        }
    }

    /// The variable or expression name this site describes.
    pub fn name(&self) -> &str {
        match self {
            UseSite::Use(u) => &u.name,
            UseSite::Variable { binding, .. } => &binding.name,
        }
    }
}

impl From<Use> for UseSite {
    fn from(u: Use) -> Self {
        UseSite::Use(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding() -> VariableBinding {
        VariableBinding::new("x", "int", Location::new("Foo.java", 10, 13))
            .in_method("compute")
            .with_assignment(10, "0")
            .with_assignment(14, "x + step")
            .with_assignment(20, "limit")
    }

    #[test]
    fn last_assignment_is_strictly_before_line() {
        let b = binding();
        assert_eq!(b.last_assignment_before(20).unwrap().expr, "x + step");
        assert_eq!(b.last_assignment_before(21).unwrap().expr, "limit");
        assert_eq!(b.last_assignment_before(11).unwrap().expr, "0");
        assert!(b.last_assignment_before(10).is_none());
    }

    #[test]
    fn last_assignment_on_shared_line_prefers_later_entry() {
        let b = VariableBinding::new("i", "int", Location::new("Foo.java", 3, 1))
            .with_assignment(5, "1")
            .with_assignment(5, "2");
        assert_eq!(b.last_assignment_before(6).unwrap().expr, "2");
    }

    #[test]
    fn declared_before_is_strict() {
        let b = binding();
        assert!(!b.is_declared_before(10));
        assert!(b.is_declared_before(11));
    }

    #[test]
    fn use_site_json_is_tagged_by_kind() {
        let json = r#"{"kind":"use","location":{"file":"Foo.java","line":42,"col":9},"name":"x","var_type":"String"}"#;
        let site: UseSite = serde_json::from_str(json).unwrap();
        match &site {
            UseSite::Use(u) => {
                assert_eq!(u.target, UseTarget::Variable);
                assert_eq!(u.var_type.as_deref(), Some("String"));
                assert!(u.binding.is_none());
            }
            _ => panic!("Expected Use variant"),
        }
        assert_eq!(site.line(), 42);
        assert_eq!(site.name(), "x");

        let json = r#"{"kind":"variable","binding":{"name":"n","var_type":"int","declared_at":{"file":"A.java","line":3,"col":5}},"line":7}"#;
        let site: UseSite = serde_json::from_str(json).unwrap();
        assert!(matches!(site, UseSite::Variable { line: 7, .. }));
        assert_eq!(site.name(), "n");
    }

    #[test]
    fn expression_use_keeps_builder_fields() {
        let u = Use::expression(Location::new("Foo.java", 8, 2), "list.size()")
            .in_method("run")
            .with_type("int");
        assert_eq!(u.target, UseTarget::Expression);
        assert_eq!(u.method.as_deref(), Some("run"));
        assert_eq!(u.name, "list.size()");
    }
}
