//! Delete propagation over has-many associations.
//!
//! [`restrict_probe`] walks the cascade tree before anything is deleted
//! and reports the first `Restrict` association that still has rows.
//! [`delete_tree`] then removes the tree depth-first: join rows of
//! through-associations, cascaded (and, when forced, restricted)
//! children, nulled foreign keys, the instance's object attributes and
//! finally its row.

use crate::factory::Factory;
use crate::instance::Instance;
use crate::options::OnDelete;
use rowmodel_core::{Filter, FindOptions, Result, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn fresh() -> FindOptions {
    FindOptions::new().cache_ttl(Duration::ZERO)
}

/// The path to the first blocking `Restrict` association reachable from
/// row `id` of `factory` through `Cascade` edges, if any.
///
/// The path lists the cascade associations walked from the root and ends
/// with the restricting association.
pub fn restrict_probe(factory: &Factory, id: i64) -> Result<Option<Vec<String>>> {
    let mut path = Vec::new();
    let mut visited = HashSet::new();
    if probe_node(factory, id, &mut path, &mut visited)? {
        Ok(Some(path))
    } else {
        Ok(None)
    }
}

fn probe_node(
    factory: &Factory,
    id: i64,
    path: &mut Vec<String>,
    visited: &mut HashSet<(String, i64)>,
) -> Result<bool> {
    if !visited.insert((factory.table().to_string(), id)) {
        return Ok(false);
    }

    for assoc in factory.has_many() {
        if assoc.on_delete != Some(OnDelete::Restrict) {
            continue;
        }
        let remote = factory.remote(&assoc.remote_model)?;
        let referencing = Filter::eq(assoc.foreign_key.as_str(), id);
        if remote.store().exists(remote.table(), &referencing)? {
            path.push(assoc.name.clone());
            return Ok(true);
        }
    }

    for assoc in factory.has_many() {
        if assoc.on_delete != Some(OnDelete::Cascade) {
            continue;
        }
        let remote = factory.remote(&assoc.remote_model)?;
        let children = remote.store().find(
            remote.table(),
            &Filter::eq(assoc.foreign_key.as_str(), id),
            &fresh(),
        )?;
        for child in children.iter().filter_map(|row| row.id()) {
            path.push(assoc.name.clone());
            if probe_node(&remote, child, path, visited)? {
                return Ok(true);
            }
            path.pop();
        }
    }
    Ok(false)
}

fn children(remote: &Arc<Factory>, foreign_key: &str, id: i64) -> Result<Vec<Instance>> {
    remote.find(&Filter::eq(foreign_key, id), &fresh())
}

/// Delete `instance` and its has-many children by policy.
///
/// Runs inside the caller's transaction. `force` is passed to every nested
/// delete; join rows are always deleted forced. Rows already in `visited`
/// are skipped so cyclic data terminates.
pub fn delete_tree(
    instance: &mut Instance,
    force: bool,
    visited: &mut HashSet<(String, i64)>,
) -> Result<()> {
    let factory = Arc::clone(instance.factory());
    let Some(id) = instance.id() else {
        return Ok(());
    };
    if !visited.insert((factory.table().to_string(), id)) {
        return Ok(());
    }
    if let Some(hooks) = factory.hooks() {
        hooks.before_delete(instance)?;
    }

    for assoc in factory.has_many() {
        let fk = assoc.foreign_key.as_str();
        match (&assoc.through, assoc.on_delete) {
            (Some(join_model), _) => {
                let join = factory.remote(join_model)?;
                for mut link in children(&join, fk, id)? {
                    delete_tree(&mut link, true, visited)?;
                }
            }
            (None, Some(OnDelete::Cascade)) => {
                let remote = factory.remote(&assoc.remote_model)?;
                for mut child in children(&remote, fk, id)? {
                    delete_tree(&mut child, force, visited)?;
                }
            }
            (None, Some(OnDelete::Restrict)) if force => {
                let remote = factory.remote(&assoc.remote_model)?;
                for mut child in children(&remote, fk, id)? {
                    delete_tree(&mut child, true, visited)?;
                }
            }
            (None, Some(OnDelete::SetNull)) => {
                let remote = factory.remote(&assoc.remote_model)?;
                let nulled = remote.store().update_where(
                    remote.table(),
                    &Filter::eq(fk, id),
                    &[(assoc.foreign_key.clone(), Value::Null)],
                )?;
                tracing::trace!(association = %assoc.name, rows = nulled, "Nulled foreign keys");
            }
            (None, Some(OnDelete::Restrict) | None) => {}
        }
    }

    instance.release_object_attrs()?;
    factory.store().erase(factory.table(), instance.row())?;
    instance.mark_deleted();
    tracing::trace!(model = %factory.name(), id = id, "Erased");
    Ok(())
}
