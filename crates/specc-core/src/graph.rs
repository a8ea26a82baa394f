//! Dependency graph over item ids: strongly connected components for cycle
//! detection, then a lexicographically tie-broken topological order for the
//! acyclic remainder.

use crate::context::{FindingLevel, PipelineContext, Stage};
use crate::digest::short;
use crate::enrich::enrich;
use crate::item::{ChecklistItem, ItemKind};
use crate::types::ItemStatus;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphReport {
    /// Each cycle's member ids, sorted.
    pub cycles: Vec<Vec<String>>,
    /// Acyclic items in execution order.
    pub execution_order: Vec<String>,
    /// `(item, missing prerequisite)` edges pointing outside the set.
    pub dangling: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// Tarjan
// ---------------------------------------------------------------------------

/// Strongly connected components of `adj`, nodes visited in index order.
/// Iterative, so deep chains cannot overflow the stack.
pub fn tarjan(adj: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adj.len();
    let mut index: Vec<Option<usize>> = vec![None; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next = 0usize;
    let mut sccs = Vec::new();

    for root in 0..n {
        if index[root].is_some() {
            continue;
        }
        let mut calls: Vec<(usize, usize)> = vec![(root, 0)];
        index[root] = Some(next);
        low[root] = next;
        next += 1;
        stack.push(root);
        on_stack[root] = true;

        while let Some(top) = calls.last_mut() {
            let v = top.0;
            if let Some(&w) = adj[v].get(top.1) {
                top.1 += 1;
                match index[w] {
                    None => {
                        index[w] = Some(next);
                        low[w] = next;
                        next += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        calls.push((w, 0));
                    }
                    Some(iw) if on_stack[w] => low[v] = low[v].min(iw),
                    Some(_) => {}
                }
                continue;
            }

            calls.pop();
            if let Some(&(u, _)) = calls.last() {
                low[u] = low[u].min(low[v]);
            }
            if Some(low[v]) == index[v] {
                let mut scc = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                scc.sort_unstable();
                sccs.push(scc);
            }
        }
    }
    sccs
}

/// Kahn's algorithm; among ready nodes the smallest key goes first.
pub fn topo_order(keys: &[String], adj: &[Vec<usize>], include: &[bool]) -> Vec<usize> {
    let mut in_degree = vec![0usize; keys.len()];
    for (v, outs) in adj.iter().enumerate() {
        if !include[v] {
            continue;
        }
        for &w in outs {
            if include[w] {
                in_degree[w] += 1;
            }
        }
    }
    let mut ready: BTreeSet<(&str, usize)> = (0..keys.len())
        .filter(|&v| include[v] && in_degree[v] == 0)
        .map(|v| (keys[v].as_str(), v))
        .collect();
    let mut order = Vec::new();
    while let Some((_, v)) = ready.pop_first() {
        order.push(v);
        for &w in &adj[v] {
            if !include[w] {
                continue;
            }
            in_degree[w] -= 1;
            if in_degree[w] == 0 {
                ready.insert((keys[w].as_str(), w));
            }
        }
    }
    order
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

/// Mark cycle members, synthesize one resolve-cycle item per cycle and
/// assign `execution_order` to everything else.
pub fn analyze(
    mut items: Vec<ChecklistItem>,
    ctx: &mut PipelineContext,
) -> (Vec<ChecklistItem>, GraphReport) {
    let ns = ctx.namespace.clone();
    let mut report = GraphReport::default();

    let ids: Vec<String> = items.iter().map(|i| i.provisional_id(&ns)).collect();
    let mut keys: Vec<String> = ids.clone();
    keys.sort();
    keys.dedup();
    let pos: BTreeMap<&str, usize> = keys.iter().enumerate().map(|(i, k)| (k.as_str(), i)).collect();

    // Edge prerequisite -> dependent.
    let mut adj: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); keys.len()];
    for (item, id) in items.iter().zip(&ids) {
        let Some(&to) = pos.get(id.as_str()) else {
            continue;
        };
        for dep in &item.depends_on {
            match pos.get(dep.as_str()) {
                Some(&from) => {
                    adj[from].insert(to);
                }
                None => report.dangling.push((id.clone(), dep.clone())),
            }
        }
    }
    let adj: Vec<Vec<usize>> = adj.into_iter().map(|s| s.into_iter().collect()).collect();

    let mut cyclic = vec![false; keys.len()];
    for scc in tarjan(&adj) {
        let self_loop = scc.len() == 1 && adj[scc[0]].contains(&scc[0]);
        if scc.len() < 2 && !self_loop {
            continue;
        }
        for &v in &scc {
            cyclic[v] = true;
        }
        report.cycles.push(scc.iter().map(|&v| keys[v].clone()).collect());
    }
    report.cycles.sort();

    for cycle in &report.cycles {
        let members: BTreeSet<&str> = cycle.iter().map(String::as_str).collect();
        let mut anchor = None;
        for (item, id) in items.iter_mut().zip(&ids) {
            if members.contains(id.as_str()) {
                item.status = ItemStatus::InCycle;
                if !item.blocked_by.iter().any(|b| b == "cycle") {
                    item.blocked_by.push("cycle".to_string());
                    *item = enrich(item.clone());
                }
                if anchor.is_none() && cycle.first() == Some(id) {
                    anchor = Some((item.pointer.clone(), item.evidence.clone(), item.value.clone()));
                }
            }
        }
        let Some((pointer, evidence, value)) = anchor else {
            continue;
        };
        let listed: Vec<&str> = cycle.iter().map(|id| short(id)).collect();
        let resolve = ChecklistItem::new(
            ItemKind::ResolveCycle {
                members: cycle.clone(),
            },
            pointer,
            format!("resolve-cycle: [{}]", listed.join(", ")),
            evidence,
        )
        .with_value(value)
        .with_parent(cycle[0].clone());
        ctx.finding(
            "dependency_cycle",
            FindingLevel::Blocking,
            short(&cycle[0]),
            format!("{} items form a dependency cycle", cycle.len()),
        );
        items.push(enrich(resolve));
    }

    // Resolve-cycle items have no prerequisites and are appended last.
    let include: Vec<bool> = cyclic.iter().map(|c| !c).collect();
    let mut order: Vec<String> = topo_order(&keys, &adj, &include)
        .into_iter()
        .map(|v| keys[v].clone())
        .collect();
    let extra: BTreeSet<String> = items[ids.len()..]
        .iter()
        .map(|i| i.provisional_id(&ns))
        .collect();
    order.extend(extra);

    let rank: BTreeMap<&str, u32> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i as u32 + 1))
        .collect();
    for item in items.iter_mut() {
        let id = item.provisional_id(&ns);
        item.execution_order = rank.get(id.as_str()).copied();
    }

    for (item, dep) in &report.dangling {
        ctx.finding(
            "dangling_dependency",
            FindingLevel::Warning,
            short(item),
            format!("prerequisite {} is not in the item set", short(dep)),
        );
    }
    ctx.record(
        Stage::Graph,
        report.cycles.len(),
        format!(
            "{} cycle(s), {} item(s) ordered",
            report.cycles.len(),
            order.len()
        ),
    );
    report.execution_order = order;
    (items, report)
}

// ---------------------------------------------------------------------------
// reorder
// ---------------------------------------------------------------------------

/// Recompute execution order over final ids after equivalence collapsing
/// removed items and remapped their dependents. A cycle introduced by the
/// remap leaves its members unordered and is reported like any other.
pub fn reorder(items: &mut [ChecklistItem], report: &mut GraphReport, ctx: &mut PipelineContext) {
    let ordered: Vec<usize> = (0..items.len())
        .filter(|&i| {
            items[i].execution_order.is_some()
                && !matches!(items[i].kind, ItemKind::ResolveCycle { .. })
        })
        .collect();
    let keys: Vec<String> = ordered.iter().map(|&i| items[i].id.clone()).collect();
    let pos: BTreeMap<&str, usize> = keys.iter().enumerate().map(|(k, id)| (id.as_str(), k)).collect();

    let mut adj: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); keys.len()];
    for (k, &i) in ordered.iter().enumerate() {
        for dep in &items[i].depends_on {
            if let Some(&from) = pos.get(dep.as_str()) {
                adj[from].insert(k);
            }
        }
    }
    let adj: Vec<Vec<usize>> = adj.into_iter().map(|s| s.into_iter().collect()).collect();
    let sorted = topo_order(&keys, &adj, &vec![true; keys.len()]);

    let mut order: Vec<String> = sorted.iter().map(|&k| keys[k].clone()).collect();
    let placed: BTreeSet<usize> = sorted.into_iter().collect();
    let mut stranded: Vec<String> = (0..keys.len())
        .filter(|k| !placed.contains(k))
        .map(|k| keys[k].clone())
        .collect();
    stranded.sort();
    if !stranded.is_empty() {
        ctx.finding(
            "dependency_cycle",
            FindingLevel::Blocking,
            short(&stranded[0]),
            format!("{} items form a dependency cycle after collapsing", stranded.len()),
        );
        report.cycles.push(stranded.clone());
        report.cycles.sort();
    }

    let mut resolve: Vec<String> = items
        .iter()
        .filter(|i| matches!(i.kind, ItemKind::ResolveCycle { .. }))
        .map(|i| i.id.clone())
        .collect();
    resolve.sort();
    order.extend(resolve);

    let rank: BTreeMap<&str, u32> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i as u32 + 1))
        .collect();
    let stranded: BTreeSet<&str> = stranded.iter().map(String::as_str).collect();
    for item in items.iter_mut() {
        if stranded.contains(item.id.as_str()) {
            item.status = ItemStatus::InCycle;
            if !item.blocked_by.iter().any(|b| b == "cycle") {
                item.blocked_by.push("cycle".to_string());
            }
        }
        item.execution_order = rank.get(item.id.as_str()).copied();
    }
    ctx.record(Stage::Graph, order.len(), "execution order recomputed");
    report.execution_order = order;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
