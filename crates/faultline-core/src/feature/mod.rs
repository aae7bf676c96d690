//! Feature schema and use-site extraction.
//!
//! A [`FeatureItem`] is a named function value computing one textual property
//! of a [`UseSite`]. The [`FeatureRegistry`] keeps items in a fixed order; that
//! order is the column order of every feature file and of the header line
//! written in front of it.
//!
//! Extraction is all-or-nothing: [`FeatureRegistry::extract`] either yields a
//! [`FeatureRow`] with exactly one value per registered item, or `None` when
//! any item cannot be computed for the site. Partial rows are never built.
//!
//! ## Usage
//!
//! ```
//! use faultline_core::feature::FeatureRegistry;
//! use faultline_core::site::{Use, UseSite};
//! use faultline_core::types::Location;
//!
//! let registry = FeatureRegistry::with_defaults();
//! let site = UseSite::from(
//!     Use::variable(Location::new("Foo.java", 42, 9), "x")
//!         .in_method("run")
//!         .with_type("String")
//!         .with_partial_expr("x.length()"),
//! );
//! let row = registry.extract(&site).unwrap();
//! assert_eq!(row.len(), registry.len());
//! ```

mod items;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::site::UseSite;

pub use items::{
    column_number, default_items, file_name, last_assign, line_number, method_name,
    partial_expr, var_name, var_type, COLUMN, FILE_NAME, LAST_ASSIGN, LINE, METHOD_NAME,
    PARTIAL_EXPR, VAR_NAME, VAR_TYPE,
};

/// Column separator in feature files and headers.
pub const SEP: char = '\t';

/// Emitted in place of an empty feature value so trimming never drops a column.
pub const MISSING_VALUE: &str = "NIL";

// ============================================================================
// Feature Item
// ============================================================================

type ExtractFn = dyn Fn(&UseSite) -> Option<String> + Send + Sync;

/// One named, independently computable property of a use site.
///
/// The function must be pure: it may return `None` to signal "not computable
/// for this site", but must not panic on a well-formed site or keep state
/// between calls.
#[derive(Clone)]
pub struct FeatureItem {
    name: String,
    extract: Arc<ExtractFn>,
}

impl FeatureItem {
    /// Create a feature item from a column name and an extraction function.
    pub fn new<F>(name: impl Into<String>, extract: F) -> Self
    where
        F: Fn(&UseSite) -> Option<String> + Send + Sync + 'static,
    {
        FeatureItem {
            name: name.into(),
            extract: Arc::new(extract),
        }
    }

    /// Column header for this item.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compute the raw value for a site.
    pub fn extract(&self, site: &UseSite) -> Option<String> {
        (self.extract)(site)
    }
}

impl fmt::Debug for FeatureItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureItem")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Feature Row
// ============================================================================

/// A complete row of feature values, one per registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureRow(Vec<String>);

impl FeatureRow {
    /// Split a tab-separated line back into values.
    pub fn parse(line: &str) -> Self {
        FeatureRow(line.split(SEP).map(str::to_string).collect())
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value at a column index.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    /// Tab-joined text, the form written to feature files and kept in the ledger.
    pub fn to_line(&self) -> String {
        self.0.join("\t")
    }
}

impl fmt::Display for FeatureRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Make a raw value safe to place in a tab-separated column.
///
/// Tabs and line breaks become spaces, surrounding whitespace is trimmed, and an
/// empty result becomes [`MISSING_VALUE`].
pub fn sanitize_value(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if matches!(c, '\t' | '\r' | '\n') { ' ' } else { c })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        MISSING_VALUE.to_string()
    } else {
        trimmed.to_string()
    }
}

// ============================================================================
// Feature Registry
// ============================================================================

/// Ordered, fixed list of feature items.
///
/// Items are registered up front; the first extraction (or an explicit
/// [`freeze`](FeatureRegistry::freeze)) locks the list and later registrations
/// fail with [`CoreError::RegistryFrozen`].
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    items: Vec<FeatureItem>,
    frozen: AtomicBool,
}

impl FeatureRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in items in their canonical order:
    /// `line`, `column`, `filename`, `methodname`, `varname`, `vartype`,
    /// `lastassign`, `partialexpr`.
    pub fn with_defaults() -> Self {
        FeatureRegistry {
            items: default_items(),
            frozen: AtomicBool::new(false),
        }
    }

    /// Build a registry from an explicit item list.
    pub fn from_items(items: impl IntoIterator<Item = FeatureItem>) -> CoreResult<Self> {
        let mut registry = Self::new();
        for item in items {
            registry.register(item)?;
        }
        Ok(registry)
    }

    /// Append an item; its position becomes its column index.
    pub fn register(&mut self, item: FeatureItem) -> CoreResult<()> {
        if self.is_frozen() {
            return Err(CoreError::RegistryFrozen {
                name: item.name().to_string(),
            });
        }
        validate_name(item.name())?;
        if self.index_of(item.name()).is_some() {
            return Err(CoreError::DuplicateFeature {
                name: item.name().to_string(),
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// Lock the item list.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Tab-joined item names, used as the first line of every feature file.
    pub fn header(&self) -> String {
        self.names().collect::<Vec<_>>().join("\t")
    }

    /// Column index of the item with this name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(FeatureItem::name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Run every item against `site` in registry order.
    ///
    /// Returns `None` as soon as one item cannot be computed.
    pub fn extract(&self, site: &UseSite) -> Option<FeatureRow> {
        self.freeze();
        let mut values = Vec::with_capacity(self.items.len());
        for item in &self.items {
            match item.extract(site) {
                Some(raw) => values.push(sanitize_value(&raw)),
                None => {
                    debug!(
                        feature = item.name(),
                        site = site.name(),
                        line = site.line(),
                        "feature not computable; dropping row"
                    );
                    return None;
                }
            }
        }
        Some(FeatureRow(values))
    }

    /// Extract every site, keeping only complete rows, in input order.
    pub fn extract_all<'a>(&self, sites: impl IntoIterator<Item = &'a UseSite>) -> Vec<FeatureRow> {
        sites.into_iter().filter_map(|s| self.extract(s)).collect()
    }
}

fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::InvalidFeatureName {
            name: name.to_string(),
            reason: "name is empty".to_string(),
        });
    }
    if name.chars().any(char::is_whitespace) {
        return Err(CoreError::InvalidFeatureName {
            name: name.to_string(),
            reason: "name contains whitespace".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::{Use, VariableBinding};
    use crate::types::Location;

    fn scenario_registry() -> FeatureRegistry {
        FeatureRegistry::from_items([
            FeatureItem::new(LINE, line_number),
            FeatureItem::new(FILE_NAME, file_name),
            FeatureItem::new(VAR_NAME, var_name),
        ])
        .unwrap()
    }

    #[test]
    fn header_lists_names_in_registration_order() {
        let registry = FeatureRegistry::with_defaults();
        assert_eq!(
            registry.header(),
            "line\tcolumn\tfilename\tmethodname\tvarname\tvartype\tlastassign\tpartialexpr"
        );
        assert!(!registry.header().starts_with('\t'));
        assert!(!registry.header().ends_with('\t'));
        assert_eq!(registry.header().split('\t').count(), registry.len());
    }

    #[test]
    fn index_of_finds_columns() {
        let registry = FeatureRegistry::with_defaults();
        assert_eq!(registry.index_of(LINE), Some(0));
        assert_eq!(registry.index_of(FILE_NAME), Some(2));
        assert_eq!(registry.index_of(PARTIAL_EXPR), Some(7));
        assert_eq!(registry.index_of("nosuch"), None);
    }

    #[test]
    fn extract_three_column_row() {
        let registry = scenario_registry();
        let site = UseSite::from(Use::variable(Location::new("Foo.java", 42, 5), "x"));
        let row = registry.extract(&site).unwrap();
        assert_eq!(row.to_line(), "42\tFoo.java\tx");
    }

    #[test]
    fn any_missing_item_voids_the_row() {
        let registry = FeatureRegistry::with_defaults();
        // No method, no type: methodname and vartype cannot be computed.
        let site = UseSite::from(Use::variable(Location::new("Foo.java", 42, 5), "x"));
        assert!(registry.extract(&site).is_none());
    }

    #[test]
    fn registration_after_extraction_is_rejected() {
        let mut registry = scenario_registry();
        let site = UseSite::from(Use::variable(Location::new("Foo.java", 1, 1), "x"));
        let _ = registry.extract(&site);
        let err = registry
            .register(FeatureItem::new(COLUMN, column_number))
            .unwrap_err();
        assert!(matches!(err, CoreError::RegistryFrozen { .. }));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn duplicate_and_invalid_names_are_rejected() {
        let mut registry = scenario_registry();
        assert!(matches!(
            registry.register(FeatureItem::new(LINE, line_number)),
            Err(CoreError::DuplicateFeature { .. })
        ));
        assert!(matches!(
            registry.register(FeatureItem::new("bad name", line_number)),
            Err(CoreError::InvalidFeatureName { .. })
        ));
        assert!(matches!(
            registry.register(FeatureItem::new("", line_number)),
            Err(CoreError::InvalidFeatureName { .. })
        ));
    }

    #[test]
    fn values_are_sanitized() {
        assert_eq!(sanitize_value("a\tb"), "a b");
        assert_eq!(sanitize_value("foo(\n  x)"), "foo(   x)");
        assert_eq!(sanitize_value("   "), MISSING_VALUE);
        assert_eq!(sanitize_value(""), MISSING_VALUE);

        let registry = FeatureRegistry::from_items([
            FeatureItem::new(LINE, line_number),
            FeatureItem::new("blank", |_: &UseSite| Some(String::new())),
        ])
        .unwrap();
        let site = UseSite::from(Use::variable(Location::new("Foo.java", 3, 1), "x"));
        let row = registry.extract(&site).unwrap();
        assert_eq!(row.to_line(), "3\tNIL");
        assert_eq!(row.len(), registry.len());
    }

    #[test]
    fn custom_item_closure_is_called_per_site() {
        let registry = FeatureRegistry::from_items([FeatureItem::new("upper", |s: &UseSite| {
            Some(s.name().to_uppercase())
        })])
        .unwrap();
        let a = UseSite::variable_at(
            VariableBinding::new("abc", "int", Location::new("A.java", 1, 1)),
            5,
        );
        let b = UseSite::from(Use::variable(Location::new("A.java", 2, 1), "q"));
        let rows = registry.extract_all([&a, &b]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].to_line(), "ABC");
        assert_eq!(rows[1].to_line(), "Q");
    }

    #[test]
    fn feature_row_parse_splits_columns() {
        let row = FeatureRow::parse("42\tFoo.java\tx");
        assert_eq!(row.len(), 3);
        assert_eq!(row.get(1), Some("Foo.java"));
        assert_eq!(row.get(3), None);
        assert_eq!(row.to_string(), "42\tFoo.java\tx");
    }
}
