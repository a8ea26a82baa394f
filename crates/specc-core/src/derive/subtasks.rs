//! Per-item fan-out: modules into import/init/test, bootstrap steps into
//! impl/verify, and one fix-dependency item per unresolved reference.

use crate::context::{PipelineContext, Stage};
use crate::item::{ChecklistItem, ItemHints, ItemKind, SubTaskKind};

fn subtask(parent: &ChecklistItem, parent_id: &str, task: SubTaskKind) -> ChecklistItem {
    ChecklistItem::new(
        ItemKind::SubTask { task },
        parent.pointer.clone(),
        format!("{task}: {}", parent.text),
        parent.evidence.clone(),
    )
    .with_value(parent.value.clone())
    .with_parent(parent_id)
    .with_hints(ItemHints {
        invariant_bound: parent.hints.invariant_bound,
        ..ItemHints::default()
    })
}

fn dependent_name(item: &ChecklistItem) -> String {
    match &item.kind {
        ItemKind::Module { name } | ItemKind::Agent { name } | ItemKind::Bootstrap { name } => {
            name.clone()
        }
        _ => item.pointer.clone(),
    }
}

pub fn derive_subtasks(items: Vec<ChecklistItem>, ctx: &mut PipelineContext) -> Vec<ChecklistItem> {
    let ns = ctx.namespace.clone();
    let mut out = Vec::with_capacity(items.len());
    let mut spawned = Vec::new();

    for mut item in items {
        let id = item.provisional_id(&ns);
        match &item.kind {
            ItemKind::Module { .. } => {
                let import = subtask(&item, &id, SubTaskKind::Import);
                let import_id = import.provisional_id(&ns);
                let init = subtask(&item, &id, SubTaskKind::Init)
                    .with_depends_on(vec![import_id]);
                let init_id = init.provisional_id(&ns);
                let test = subtask(&item, &id, SubTaskKind::Test)
                    .with_depends_on(vec![id.clone(), init_id.clone()]);
                item.depends_on.push(init_id);
                spawned.extend([import, init, test]);
            }
            ItemKind::Bootstrap { .. } => {
                let imp = subtask(&item, &id, SubTaskKind::Impl);
                let imp_id = imp.provisional_id(&ns);
                let verify = subtask(&item, &id, SubTaskKind::Verify)
                    .with_depends_on(vec![id.clone(), imp_id.clone()]);
                item.depends_on.push(imp_id);
                spawned.extend([imp, verify]);
            }
            _ => {}
        }

        if !item.generated {
            let missing: Vec<String> = item
                .blocked_by
                .iter()
                .filter_map(|b| b.strip_prefix("missing:"))
                .map(str::to_string)
                .collect();
            for name in missing {
                let fix = ChecklistItem::new(
                    ItemKind::FixDependency {
                        dependent: dependent_name(&item),
                        missing: name.clone(),
                    },
                    item.pointer.clone(),
                    format!("fix-dependency: '{name}' for {}", item.text),
                    item.evidence.clone(),
                )
                .with_value(item.value.clone())
                .with_parent(id.clone());
                item.depends_on.push(fix.provisional_id(&ns));
                spawned.push(fix);
            }
        }
        out.push(item);
    }

    ctx.record(
        Stage::Subtask,
        spawned.len(),
        format!("derived {} sub-items", spawned.len()),
    );
    out.extend(spawned);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::item::Evidence;

    fn module(name: &str) -> ChecklistItem {
        let p = "/architecture/modules/0";
        ChecklistItem::new(
            ItemKind::Module {
                name: name.to_string(),
            },
            p,
            format!("Define {p} '{name}'"),
            Evidence::at(p, name),
        )
    }

    #[test]
    fn module_fans_out_three_ways() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let items = derive_subtasks(vec![module("ledger")], &mut ctx);
        assert_eq!(items.len(), 4);
        let parent_id = module("ledger").provisional_id("ns");
        let tasks: Vec<_> = items[1..]
            .iter()
            .map(|i| match i.kind {
                ItemKind::SubTask { task } => task,
                _ => panic!("expected sub-task"),
            })
            .collect();
        assert_eq!(
            tasks,
            vec![SubTaskKind::Import, SubTaskKind::Init, SubTaskKind::Test]
        );
        assert!(items[1..]
            .iter()
            .all(|i| i.parent.as_deref() == Some(parent_id.as_str())));
        assert!(items[3].depends_on.contains(&parent_id));
        assert_eq!(items[3].text, "test: Define /architecture/modules/0 'ledger'");
    }

    #[test]
    fn unresolved_reference_spawns_fix_item() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let mut m = module("ledger");
        m.block("missing:ghost");
        m.block("missing_field:name");
        let items = derive_subtasks(vec![m], &mut ctx);
        let fixes: Vec<_> = items
            .iter()
            .filter(|i| matches!(i.kind, ItemKind::FixDependency { .. }))
            .collect();
        assert_eq!(fixes.len(), 1);
        assert!(items[0].depends_on.contains(&fixes[0].provisional_id("ns")));
    }

    #[test]
    fn fan_out_is_stable() {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        let a = derive_subtasks(vec![module("ledger")], &mut ctx);
        let b = derive_subtasks(vec![module("ledger")], &mut ctx);
        let ids = |v: &[ChecklistItem]| v.iter().map(|i| i.provisional_id("ns")).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }
}
