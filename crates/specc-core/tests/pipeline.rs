use serde_json::{json, Value};
use specc_core::config::{CompilerConfig, Enforcement};
use specc_core::coverage::RequirementState;
use specc_core::item::{compute_id, ItemKind};
use specc_core::persona::{Action, Persona, ReviewAction, ReviewBundle, ReviewRequest, Role};
use specc_core::types::{ConversionState, ItemStatus};
use specc_core::{compile, compile_core, CompileOptions, RunOutcome};

fn run(doc: &Value) -> RunOutcome {
    compile(doc, &CompileOptions::new("acme"), &CompilerConfig::default(), None).unwrap()
}

fn base() -> Value {
    json!({
        "metadata": {"name": "acme", "version": "1"},
        "model": {"account": {"id": "string"}},
        "instructions": "Build the ledger first.",
        "sections": [{"id": "intro", "title": "Intro", "content": "Accounts hold money."}],
        "architecture": {"modules": [{"name": "ledger"}]}
    })
}

// ---------------------------------------------------------------------------
// Idempotence and id purity
// ---------------------------------------------------------------------------

#[test]
fn identical_input_yields_byte_identical_manifests() {
    let a = run(&base()).manifest().unwrap().to_json().unwrap();
    let b = run(&base()).manifest().unwrap().to_json().unwrap();
    assert_eq!(a, b);
}

#[test]
fn replay_seed_never_changes_the_manifest() {
    let cfg = CompilerConfig::default();
    let plain = compile(&base(), &CompileOptions::new("acme"), &cfg, None).unwrap();
    let seeded = compile(
        &base(),
        &CompileOptions::new("acme").with_seed(Some(42)),
        &cfg,
        None,
    )
    .unwrap();
    assert_eq!(plain.manifest(), seeded.manifest());
    let evidence = &seeded.reports.as_ref().unwrap().evidence;
    assert_eq!(evidence.replay_seed, Some(42));
}

#[test]
fn every_id_is_the_digest_of_namespace_pointer_and_text() {
    let outcome = run(&base());
    let manifest = outcome.manifest().unwrap();
    for item in &manifest.items {
        assert_eq!(item.id, compute_id("acme", &item.pointer, &item.text), "{}", item.text);
    }
    let mut ids: Vec<&str> = manifest.items.iter().map(|i| i.id.as_str()).collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

#[test]
fn namespace_salts_every_id() {
    let cfg = CompilerConfig::default();
    let a = compile_core(&base(), "acme", &cfg, None).unwrap();
    let b = compile_core(&base(), "other", &cfg, None).unwrap();
    assert_eq!(a.items.len(), b.items.len());
    let ids: std::collections::BTreeSet<&str> = a.items.iter().map(|i| i.id.as_str()).collect();
    assert!(b.items.iter().all(|i| !ids.contains(i.id.as_str())));
}

#[test]
fn readiness_gates_pass_for_a_stable_spec() {
    let outcome = run(&base());
    let gates = &outcome.conversion.gates;
    assert_eq!(gates.len(), 4);
    assert!(gates.iter().all(|g| g.passed), "{gates:?}");
    let replay = gates
        .iter()
        .find(|g| g.gate.as_str() == "determinism_replay")
        .unwrap();
    assert!(replay.passed, "{}", replay.output);
    let fuzz = gates
        .iter()
        .find(|g| g.gate.as_str() == "fuzz_stability")
        .unwrap();
    assert!(fuzz.passed, "{}", fuzz.output);
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

#[test]
fn module_cycle_yields_one_resolve_item() {
    let mut doc = base();
    doc["architecture"] = json!({"modules": [
        {"name": "a", "depends_on": ["b"]},
        {"name": "b", "depends_on": ["c"]},
        {"name": "c", "depends_on": ["a"]}
    ]});
    let outcome = run(&doc);
    let manifest = outcome.manifest().unwrap();
    let graph = &outcome.reports.as_ref().unwrap().graph;

    let resolves: Vec<_> = manifest
        .items
        .iter()
        .filter(|i| matches!(i.kind, ItemKind::ResolveCycle { .. }))
        .collect();
    assert_eq!(resolves.len(), 1);
    let ItemKind::ResolveCycle { members } = &resolves[0].kind else {
        unreachable!()
    };

    let modules: Vec<_> = manifest
        .items
        .iter()
        .filter(|i| matches!(i.kind, ItemKind::Module { .. }))
        .collect();
    assert_eq!(modules.len(), 3);
    for module in modules {
        assert!(members.contains(&module.id));
        assert_eq!(module.status, ItemStatus::InCycle);
        assert!(module.execution_order.is_none());
        assert!(!graph.execution_order.contains(&module.id));
    }
    assert_ne!(outcome.conversion.state, ConversionState::Ready);
    assert!(outcome
        .conversion
        .blocker_codes()
        .iter()
        .any(|c| c.starts_with("dependency_cycle:")));
}

// ---------------------------------------------------------------------------
// Sufficiency
// ---------------------------------------------------------------------------

fn with_requirement(covered: bool) -> Value {
    let mut doc = base();
    doc["requirements"] = json!([{"id": "R1", "priority": "P0", "text": "ledger balances"}]);
    if covered {
        doc["architecture"]["modules"][0]["satisfies"] = json!(["R1"]);
    }
    doc
}

#[test]
fn removing_the_sole_covering_item_flips_sufficiency() {
    let covered = run(&with_requirement(true));
    let manifest = covered.manifest().unwrap();
    assert_eq!(
        manifest.coverage.state_of("R1"),
        Some(RequirementState::Complete)
    );
    assert!(manifest.sufficiency.blocking_requirements.is_empty());

    let uncovered = run(&with_requirement(false));
    let manifest = uncovered.manifest().unwrap();
    assert!(!manifest.sufficiency.ok);
    assert_eq!(manifest.sufficiency.blocking_requirements, vec!["R1"]);
    assert!(uncovered
        .conversion
        .blocker_codes()
        .contains(&"requirement_incomplete:R1"));
}

#[test]
fn prose_obligation_without_cover_blocks_readiness() {
    let mut doc = base();
    doc["sections"] = json!([
        {"id": "rules", "title": "Rules", "content": "The system must refuse X."}
    ]);
    let outcome = run(&doc);
    let reports = outcome.reports.as_ref().unwrap();
    assert_eq!(reports.requirements.len(), 1);
    let id = reports.requirements[0].id.clone();
    assert!(id.starts_with("REQ-"));
    assert!(!reports.sufficiency.ok);
    assert_eq!(reports.sufficiency.blocking_requirements, vec![id]);
    assert!(!outcome.conversion.is_ready());
}

// ---------------------------------------------------------------------------
// Minimality
// ---------------------------------------------------------------------------

#[test]
fn equivalent_items_collapse_without_changing_completeness() {
    let check = json!({
        "name": "refusal check",
        "claim": "refuses X",
        "risk_if_false": "x",
        "satisfies": ["R1"]
    });
    let mut doc = with_requirement(false);
    doc["checks"] = json!([check.clone(), check]);

    let outcome = run(&doc);
    let reports = outcome.reports.as_ref().unwrap();
    assert_eq!(reports.equivalence.groups.len(), 1);
    let group = &reports.equivalence.groups[0];
    assert_eq!(group.collapsed_from.len(), 1);
    assert_eq!(group.requirement_refs, vec!["R1"]);

    let manifest = outcome.manifest().unwrap();
    assert!(manifest.item(&group.primary_id).is_some());
    assert!(manifest.item(&group.collapsed_from[0]).is_none());
    assert_eq!(
        manifest.coverage.state_of("R1"),
        Some(RequirementState::Complete)
    );
}

// ---------------------------------------------------------------------------
// Conversion ordering
// ---------------------------------------------------------------------------

#[test]
fn missing_instructions_caps_at_structured() {
    let mut doc = base();
    doc.as_object_mut().unwrap().remove("instructions");
    let outcome = run(&doc);
    let conversion = &outcome.conversion;
    assert!(conversion.state <= ConversionState::Structured);
    assert!(conversion.blocker_codes().contains(&"missing_instructions"));
    assert!(!conversion.is_ready());
}

#[test]
fn empty_document_stays_accepted() {
    let outcome = run(&json!({}));
    assert!(outcome.manifest().is_some());
    assert_eq!(outcome.conversion.state, ConversionState::Accepted);
    assert!(outcome.conversion.blocker_codes().contains(&"empty_document"));
}

#[test]
fn empty_section_degrades_to_draft() {
    let mut doc = base();
    doc["sections"] = json!([{"id": "intro", "title": "Intro", "content": ""}]);
    let outcome = run(&doc);
    assert!(outcome.manifest().is_some());
    let conversion = &outcome.conversion;
    assert!(conversion.state < ConversionState::Valid);
    assert!(conversion.blocker_codes().contains(&"empty_section:intro"));
}

// ---------------------------------------------------------------------------
// Refusal
// ---------------------------------------------------------------------------

#[test]
fn structural_violation_is_the_only_artifact() {
    let outcome = run(&json!({"metadata": "not a map", "sections": [1]}));
    assert!(outcome.manifest().is_none());
    let refusal = outcome.refusal().unwrap();
    let pointers: Vec<&str> = refusal.violations.iter().map(|v| v.pointer.as_str()).collect();
    assert!(pointers.contains(&"/metadata"));
    assert!(pointers.contains(&"/sections/0"));
    assert!(refusal.evidence.verify().unwrap());
}

#[test]
fn requirements_keep_declaration_order_past_ten_entries() {
    let mut doc = base();
    let list: Vec<Value> = (0..12)
        .map(|i| {
            let id = if i == 10 { "R2".to_string() } else { format!("R{i}") };
            json!({"id": id, "text": format!("obligation {i}")})
        })
        .collect();
    doc["requirements"] = Value::Array(list);

    let outcome = run(&doc);
    let reqs = &outcome.reports.as_ref().unwrap().requirements;
    let ids: Vec<&str> = reqs.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["R0", "R1", "R2", "R3", "R4", "R5", "R6", "R7", "R8", "R9", "R11"]
    );
    assert_eq!(reqs[2].text, "obligation 2");
}

// ---------------------------------------------------------------------------
// Persona containment
// ---------------------------------------------------------------------------

fn reviews(role: Role, action: ReviewAction, item: &str) -> ReviewBundle {
    ReviewBundle {
        personas: vec![Persona {
            name: "qa".to_string(),
            role,
            allowed_actions: vec![Action::Observe, Action::Annotate, Action::Veto],
        }],
        requests: vec![ReviewRequest {
            persona: "qa".to_string(),
            phase: "review".to_string(),
            item: item.to_string(),
            action,
        }],
    }
}

fn veto() -> ReviewAction {
    ReviewAction::Veto {
        code: "UNSAFE".to_string(),
        explanation: "ledger lacks audit".to_string(),
        changes: Default::default(),
    }
}

#[test]
fn veto_without_capability_is_rejected() {
    let cfg = CompilerConfig::default();
    let first = run(&base());
    let target = first.manifest().unwrap().items[0].id.clone();

    let options = CompileOptions::new("acme").with_reviews(reviews(Role::Auditor, veto(), &target));
    let outcome = compile(&base(), &options, &cfg, None).unwrap();
    let ledger = &outcome.reports.as_ref().unwrap().governance;
    assert!(ledger.vetoes.is_empty());
    assert_eq!(ledger.rejected.len(), 1);
    assert_eq!(ledger.rejected[0].action, Action::Veto);
    // Checklist content is untouched by governance.
    assert_eq!(outcome.manifest().unwrap().items, first.manifest().unwrap().items);
}

#[test]
fn governance_persona_without_veto_action_cannot_veto() {
    let first = run(&base());
    let target = first.manifest().unwrap().items[0].id.clone();
    let mut bundle = reviews(Role::Governance, veto(), &target);
    bundle.personas[0].allowed_actions = vec![Action::Observe, Action::Annotate];

    let mut enforced = CompilerConfig::default();
    enforced.persona.enforcement = Enforcement::Enforce;
    let options = CompileOptions::new("acme").with_reviews(bundle);
    let outcome = compile(&base(), &options, &enforced, None).unwrap();

    let ledger = &outcome.reports.as_ref().unwrap().governance;
    assert!(ledger.vetoes.is_empty());
    assert_eq!(ledger.rejected.len(), 1);
    assert_eq!(ledger.rejected[0].action, Action::Veto);
    assert!(ledger.rejected[0].reason.contains("not allowed to veto"));
    assert!(!outcome
        .conversion
        .blocker_codes()
        .contains(&"gate_failed:persona_non_veto"));
    assert_eq!(outcome.manifest().unwrap().items, first.manifest().unwrap().items);
}

#[test]
fn governance_veto_holds_back_only_when_enforced() {
    let first = run(&base());
    let target = first.manifest().unwrap().items[0].id.clone();
    let options =
        CompileOptions::new("acme").with_reviews(reviews(Role::Governance, veto(), &target));

    let advisory = compile(&base(), &options, &CompilerConfig::default(), None).unwrap();
    assert_eq!(advisory.reports.as_ref().unwrap().governance.vetoes.len(), 1);
    assert!(!advisory
        .conversion
        .blocker_codes()
        .contains(&"gate_failed:persona_non_veto"));

    let mut enforced = CompilerConfig::default();
    enforced.persona.enforcement = Enforcement::Enforce;
    let outcome = compile(&base(), &options, &enforced, None).unwrap();
    assert!(outcome
        .conversion
        .blocker_codes()
        .contains(&"gate_failed:persona_non_veto"));
}

#[test]
fn annotation_cannot_touch_protected_fields() {
    let first = run(&base());
    let target = first.manifest().unwrap().items[0].id.clone();
    let mut changes = std::collections::BTreeMap::new();
    changes.insert("severity".to_string(), json!("low"));
    let action = ReviewAction::Annotate {
        note: "downgrade".to_string(),
        changes,
    };
    let options = CompileOptions::new("acme").with_reviews(reviews(Role::Auditor, action, &target));
    let outcome = compile(&base(), &options, &CompilerConfig::default(), None).unwrap();
    let ledger = &outcome.reports.as_ref().unwrap().governance;
    assert_eq!(ledger.annotations.len(), 1);
    assert!(ledger.annotations[0].suggestions.is_empty());
    assert_eq!(ledger.rejected.len(), 1);
    assert!(ledger.rejected[0].reason.contains("severity"));
    assert_eq!(outcome.manifest().unwrap().items, first.manifest().unwrap().items);
}

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

#[test]
fn drift_detects_added_module() {
    let cfg = CompilerConfig::default();
    let before = run(&base());
    let prior = before.manifest().unwrap();

    let mut doc = base();
    doc["architecture"]["modules"] = json!([{"name": "ledger"}, {"name": "audit"}]);
    let after = compile(&doc, &CompileOptions::new("acme"), &cfg, Some(prior)).unwrap();
    let drift = after.drift.unwrap();
    assert!(drift.fingerprint_changed);
    assert!(!drift.added.is_empty());
    assert!(drift.removed.is_empty());
}
