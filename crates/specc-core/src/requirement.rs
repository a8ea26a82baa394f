//! Requirements, read from the explicit `requirements` list and from
//! obligation-bearing prose in `sections`.

use crate::ast::{Ast, NodeKind};
use crate::context::{FindingLevel, PipelineContext, Stage};
use crate::digest::digest_str;
use crate::extract::ProseMatcher;
use crate::types::Priority;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_DIMENSION: &str = "behavior";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementOrigin {
    Explicit,
    Prose,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub text: String,
    pub dimensions: Vec<String>,
    pub priority: Priority,
    pub source_pointer: String,
    pub origin: RequirementOrigin,
}

impl Requirement {
    /// True when any referencing item satisfies the requirement.
    pub fn is_behavior_only(&self) -> bool {
        self.dimensions.len() == 1 && self.dimensions[0] == DEFAULT_DIMENSION
    }
}

/// Priority implied by the obligation keyword of a prose sentence.
pub fn keyword_priority(keyword: &str) -> Priority {
    match keyword {
        "must" | "shall" | "refuse" | "never" => Priority::P0,
        "should" | "required" => Priority::P1,
        _ => Priority::P2,
    }
}

/// Id of a prose requirement: `REQ-` plus eight hex chars of the digest of
/// its pointer and sentence.
pub fn prose_requirement_id(pointer: &str, sentence: &str) -> String {
    let d = digest_str(&format!("{pointer}|{sentence}"));
    format!("REQ-{}", &d[..8])
}

fn dimensions(list: Vec<String>) -> Vec<String> {
    let set: BTreeSet<String> = list
        .into_iter()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect();
    if set.is_empty() {
        vec![DEFAULT_DIMENSION.to_string()]
    } else {
        set.into_iter().collect()
    }
}

pub fn extract_requirements(ast: &Ast, ctx: &mut PipelineContext) -> Vec<Requirement> {
    let mut out: Vec<Requirement> = Vec::new();
    let mut ids = BTreeSet::new();

    for node in ast.matching("/requirements/*") {
        let id = match node.child_str("id").filter(|s| !s.trim().is_empty()) {
            Some(id) => id.to_string(),
            None => format!("REQ-{}", &digest_str(&node.path)[..8]),
        };
        if !ids.insert(id.clone()) {
            ctx.finding(
                "duplicate_requirement",
                FindingLevel::Warning,
                &id,
                format!("{} redeclares requirement {id}", node.path),
            );
            continue;
        }
        let priority = match node.child_str("priority") {
            Some(p) => match p.parse::<Priority>() {
                Ok(p) => p,
                Err(_) => {
                    ctx.finding(
                        "invalid_priority",
                        FindingLevel::Warning,
                        &id,
                        format!("unknown priority '{p}', using P1"),
                    );
                    Priority::P1
                }
            },
            None => Priority::P1,
        };
        out.push(Requirement {
            text: node
                .child_str("text")
                .or_else(|| node.child_str("description"))
                .unwrap_or_default()
                .to_string(),
            dimensions: dimensions(node.string_list("dimensions")),
            priority,
            source_pointer: node.path.clone(),
            origin: RequirementOrigin::Explicit,
            id,
        });
    }

    let matcher = ProseMatcher::new(&ctx.config.prose_keywords);
    for section in ast.matching("/sections/*") {
        let Some(content) = section.child("content").filter(|c| c.kind == NodeKind::Str) else {
            continue;
        };
        let text = content.value.as_str().unwrap_or_default();
        for (sentence, keyword) in matcher.sentences(text) {
            let id = prose_requirement_id(&content.path, &sentence);
            if !ids.insert(id.clone()) {
                continue;
            }
            out.push(Requirement {
                id,
                priority: keyword_priority(&keyword),
                text: sentence,
                dimensions: vec![DEFAULT_DIMENSION.to_string()],
                source_pointer: content.path.clone(),
                origin: RequirementOrigin::Prose,
            });
        }
    }

    ctx.record(
        Stage::Coverage,
        out.len(),
        format!("{} requirement(s)", out.len()),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use serde_json::json;

    fn run(doc: serde_json::Value) -> Vec<Requirement> {
        let cfg = CompilerConfig::default();
        let mut ctx = PipelineContext::new("ns", &cfg);
        extract_requirements(&Ast::build(&doc), &mut ctx)
    }

    #[test]
    fn explicit_requirements_default_dimension_and_priority() {
        let reqs = run(json!({"requirements": [
            {"id": "R1", "text": "log every call"},
            {"id": "R2", "text": "audit", "priority": "P0", "dimensions": ["audit", "retention"]}
        ]}));
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].dimensions, vec!["behavior"]);
        assert_eq!(reqs[0].priority, Priority::P1);
        assert!(reqs[0].is_behavior_only());
        assert_eq!(reqs[1].priority, Priority::P0);
        assert_eq!(reqs[1].dimensions, vec!["audit", "retention"]);
    }

    #[test]
    fn prose_requirements_from_sections() {
        let reqs = run(json!({"sections": [
            {"id": "s", "title": "S", "content": "The system must refuse X. It should log. It is blue."}
        ]}));
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].priority, Priority::P0);
        assert_eq!(reqs[1].priority, Priority::P1);
        assert!(reqs[0].id.starts_with("REQ-"));
        assert_eq!(reqs[0].id.len(), 12);
        assert_eq!(reqs[0].origin, RequirementOrigin::Prose);
        assert_eq!(
            reqs[0].id,
            prose_requirement_id("/sections/0/content", "The system must refuse X")
        );
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let reqs = run(json!({"requirements": [
            {"id": "R1", "text": "a"},
            {"id": "R1", "text": "b"}
        ]}));
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].text, "a");
    }

    #[test]
    fn declaration_order_survives_double_digit_indexes() {
        let list: Vec<serde_json::Value> = (0..12)
            .map(|i| match i {
                2 | 10 => json!({"id": "R-dup", "text": format!("text at index {i}")}),
                _ => json!({"id": format!("R{i}"), "text": format!("text at index {i}")}),
            })
            .collect();
        let reqs = run(json!({ "requirements": list }));

        let ids: Vec<_> = reqs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["R0", "R1", "R-dup", "R3", "R4", "R5", "R6", "R7", "R8", "R9", "R11"]
        );
        assert_eq!(reqs[2].text, "text at index 2");
    }

    #[test]
    fn keyword_priorities() {
        assert_eq!(keyword_priority("never"), Priority::P0);
        assert_eq!(keyword_priority("required"), Priority::P1);
        assert_eq!(keyword_priority("ought"), Priority::P2);
    }
}
