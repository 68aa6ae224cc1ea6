//! Instance ordering.

use crate::instance::Instance;
use crate::options::{Comparator, CompareOption, ModelHooks};
use rowmodel_core::{Error, OrderBy, PRIMARY_KEY, Result, Row, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A model's resolved ordering rule.
#[derive(Clone, Default)]
pub enum CompareRule {
    #[default]
    None,
    /// Ordering supplied by the model hooks.
    Instance(Arc<dyn ModelHooks>),
    /// Column keys; can be pushed down to the store as ORDER BY.
    Keys(Vec<OrderBy>),
    Custom(Comparator),
}

impl fmt::Debug for CompareRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareRule::None => write!(f, "None"),
            CompareRule::Instance(_) => write!(f, "Instance"),
            CompareRule::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
            CompareRule::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

impl CompareRule {
    /// Resolve the `compare` option of `model`.
    ///
    /// Every key must name the primary key or a column accepted by
    /// `is_column`.
    pub fn build(
        model: &str,
        option: &CompareOption,
        hooks: Option<&Arc<dyn ModelHooks>>,
        is_column: impl Fn(&str) -> bool,
    ) -> Result<Self> {
        match option {
            CompareOption::None => Ok(CompareRule::None),
            CompareOption::Instance => hooks
                .map(|h| CompareRule::Instance(Arc::clone(h)))
                .ok_or_else(|| Error::config(model, "compare = true requires model hooks")),
            CompareOption::Custom(comparator) => Ok(CompareRule::Custom(Arc::clone(comparator))),
            CompareOption::Keys(keys) => {
                if keys.is_empty() {
                    return Err(Error::config(model, "empty compare key list"));
                }
                let parsed = keys
                    .iter()
                    .map(|key| {
                        let order = OrderBy::parse(key).ok_or_else(|| {
                            Error::config(model, format!("malformed compare key '{}'", key))
                        })?;
                        if order.column != PRIMARY_KEY && !is_column(&order.column) {
                            return Err(Error::config(
                                model,
                                format!("compare key '{}' is not a column", order.column),
                            ));
                        }
                        Ok(order)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompareRule::Keys(parsed))
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, CompareRule::None)
    }

    /// Keys a store can sort by, if the rule is key-based.
    pub fn order_by(&self) -> Option<&[OrderBy]> {
        match self {
            CompareRule::Keys(keys) => Some(keys),
            _ => None,
        }
    }

    /// Compare two instances; `None` when the model has no ordering.
    pub fn compare(&self, a: &Instance, b: &Instance) -> Option<Ordering> {
        match self {
            CompareRule::None => None,
            CompareRule::Instance(hooks) => Some(hooks.compare(a, b)),
            CompareRule::Keys(keys) => Some(compare_rows(keys, a.row(), b.row())),
            CompareRule::Custom(comparator) => Some(comparator(a, b)),
        }
    }
}

/// Multi-key row comparison; later keys break ties of earlier ones.
pub fn compare_rows(keys: &[OrderBy], a: &Row, b: &Row) -> Ordering {
    keys.iter().fold(Ordering::Equal, |acc, key| {
        acc.then_with(|| {
            let av = a.get(&key.column).unwrap_or(&Value::Null);
            let bv = b.get(&key.column).unwrap_or(&Value::Null);
            key.orient(av.sort_cmp(bv))
        })
    })
}
