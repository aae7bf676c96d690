//! Built-in feature items.
//!
//! Each item is a plain function over [`UseSite`]. An item returns `None` only
//! when its property is genuinely undefined for the site; the registry then
//! drops the whole row.

use crate::site::{UseSite, UseTarget};
use crate::types::base_name;

use super::{FeatureItem, MISSING_VALUE};

pub const LINE: &str = "line";
pub const COLUMN: &str = "column";
pub const FILE_NAME: &str = "filename";
pub const METHOD_NAME: &str = "methodname";
pub const VAR_NAME: &str = "varname";
pub const VAR_TYPE: &str = "vartype";
pub const LAST_ASSIGN: &str = "lastassign";
pub const PARTIAL_EXPR: &str = "partialexpr";

/// The built-in items in canonical column order.
pub fn default_items() -> Vec<FeatureItem> {
    vec![
        FeatureItem::new(LINE, line_number),
        FeatureItem::new(COLUMN, column_number),
        FeatureItem::new(FILE_NAME, file_name),
        FeatureItem::new(METHOD_NAME, method_name),
        FeatureItem::new(VAR_NAME, var_name),
        FeatureItem::new(VAR_TYPE, var_type),
        FeatureItem::new(LAST_ASSIGN, last_assign),
        FeatureItem::new(PARTIAL_EXPR, partial_expr),
    ]
}

/// Line of the use, or the target line of a `(variable, line)` pair.
pub fn line_number(site: &UseSite) -> Option<String> {
    Some(site.line().to_string())
}

/// Column of the use; for a `(variable, line)` pair, the declaration column.
pub fn column_number(site: &UseSite) -> Option<String> {
    let col = match site {
        UseSite::Use(u) => u.location.col,
        UseSite::Variable { binding, .. } => binding.declared_at.col,
    };
    Some(col.to_string())
}

/// Base name of the source file.
pub fn file_name(site: &UseSite) -> Option<String> {
    let path = match site {
        UseSite::Use(u) => &u.location.file,
        UseSite::Variable { binding, .. } => &binding.declared_at.file,
    };
    let name = base_name(path);
    (!name.is_empty()).then(|| name.to_string())
}

/// Enclosing method name.
pub fn method_name(site: &UseSite) -> Option<String> {
    match site {
        UseSite::Use(u) => u.method.clone(),
        UseSite::Variable { binding, .. } => binding.method.clone(),
    }
}

/// Variable name, or expression text for expression uses.
pub fn var_name(site: &UseSite) -> Option<String> {
    Some(site.name().to_string())
}

/// Static type.
pub fn var_type(site: &UseSite) -> Option<String> {
    match site {
        UseSite::Use(u) => u
            .var_type
            .clone()
            .or_else(|| u.binding.as_ref().map(|b| b.var_type.clone())),
        UseSite::Variable { binding, .. } => Some(binding.var_type.clone()),
    }
}

/// Text of the last assignment strictly before the site's line.
///
/// A use with no earlier assignment (parameters, expression uses) yields
/// [`MISSING_VALUE`]. A `(variable, line)` pair whose variable is not yet
/// declared at that line has no defined last assignment.
pub fn last_assign(site: &UseSite) -> Option<String> {
    match site {
        UseSite::Use(u) => {
            let text = match (&u.target, &u.binding) {
                (UseTarget::Variable, Some(binding)) => binding
                    .last_assignment_before(u.location.line)
                    .map(|a| a.expr.clone()),
                _ => None,
            };
            Some(text.unwrap_or_else(|| MISSING_VALUE.to_string()))
        }
        UseSite::Variable { binding, line } => {
            if !binding.is_declared_before(*line) {
                return None;
            }
            Some(
                binding
                    .last_assignment_before(*line)
                    .map(|a| a.expr.clone())
                    .unwrap_or_else(|| MISSING_VALUE.to_string()),
            )
        }
    }
}

/// Smallest enclosing expression; a bare variable is its own expression.
pub fn partial_expr(site: &UseSite) -> Option<String> {
    match site {
        UseSite::Use(u) => u.partial_expr.clone(),
        UseSite::Variable { binding, .. } => Some(binding.name.clone()),
    }
}
