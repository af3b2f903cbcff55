//! Live widget instances and wildcard widget names.
//!
//! A widget name of the form `"(TypeName)"` addresses every live instance
//! whose implementation type has that short name, compared
//! case-insensitively.  Expansion happens at emission time against whatever
//! the [`WidgetRegistry`] reports right then.

use serde::{Deserialize, Serialize};

/// One rendered widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetInstance {
    /// Literal instance name, unique within the layout.
    pub name: String,
    /// Implementation type, possibly qualified (`hud.widgets.SpeedoWidget`).
    pub type_name: String,
}

impl WidgetInstance {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Type name without any `.` or `::` qualification.
    pub fn short_type_name(&self) -> &str {
        self.type_name
            .rsplit(['.', ':'])
            .next()
            .unwrap_or(&self.type_name)
    }
}

/// Source of the live widget instances.
#[cfg_attr(test, mockall::automock)]
pub trait WidgetRegistry: Send + Sync {
    fn instances(&self) -> Vec<WidgetInstance>;
}

/// Fixed registry, e.g. loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticWidgetRegistry {
    instances: Vec<WidgetInstance>,
}

impl StaticWidgetRegistry {
    pub fn new(instances: Vec<WidgetInstance>) -> Self {
        Self { instances }
    }
}

impl WidgetRegistry for StaticWidgetRegistry {
    fn instances(&self) -> Vec<WidgetInstance> {
        self.instances.clone()
    }
}

/// A parsed `widget_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetName<'a> {
    Literal(&'a str),
    /// Short type name between the parentheses.
    Wildcard(&'a str),
}

impl<'a> WidgetName<'a> {
    pub fn parse(name: &'a str) -> Self {
        match name
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
        {
            Some(type_name) if !type_name.is_empty() => WidgetName::Wildcard(type_name),
            _ => WidgetName::Literal(name),
        }
    }
}

/// Expands `name` to the literal instance names it addresses.
///
/// Literal names are returned as-is without consulting the registry.  A
/// wildcard matching nothing yields an empty list.
pub fn resolve_widget_names(name: &str, registry: &dyn WidgetRegistry) -> Vec<String> {
    match WidgetName::parse(name) {
        WidgetName::Literal(literal) => vec![literal.to_string()],
        WidgetName::Wildcard(type_name) => {
            let wanted = type_name.to_lowercase();
            registry
                .instances()
                .into_iter()
                .filter(|w| w.short_type_name().to_lowercase() == wanted)
                .map(|w| w.name)
                .collect()
        }
    }
}
