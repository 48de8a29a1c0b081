// Coverage heuristic applied after planning.
//
// Some instructions name a target so directly that a plan missing it is
// almost certainly a planner miss. For those, one restricted entry is
// injected at the front of its group. Re-running never duplicates an entry.

use std::sync::OnceLock;

use atelier_common::path::PathAddress;
use atelier_common::types::{MutationPlan, PlanTarget};
use regex::Regex;
use tracing::info;

use crate::scope::ScopeIndex;

const BUTTON_FIELDS: &[&str] =
    &["background", "text", "border", "hoverBackground", "hoverText", "radius"];

struct CoverageRule {
    name: &'static str,
    pattern: &'static str,
    path: &'static str,
    group: &'static str,
    allowed_fields: &'static [&'static str],
}

const RULES: &[CoverageRule] = &[
    CoverageRule {
        name: "primary-buttons",
        pattern: r"(?i)\bprimary\s+(?:buttons?|btns?|ctas?)\b",
        path: "buttons.primary",
        group: "primary",
        allowed_fields: BUTTON_FIELDS,
    },
    CoverageRule {
        name: "secondary-buttons",
        pattern: r"(?i)\bsecondary\s+(?:buttons?|btns?|ctas?)\b",
        path: "buttons.secondary",
        group: "secondary",
        allowed_fields: BUTTON_FIELDS,
    },
];

fn compiled_rules() -> &'static [(Regex, &'static CoverageRule)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static CoverageRule)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|rule| {
                (Regex::new(rule.pattern).expect("coverage pattern should compile"), rule)
            })
            .collect()
    })
}

/// Inject the entries `instruction` clearly calls for but `plan` omits.
///
/// A rule only fires when its path is in `index`. Returns the injected paths.
pub fn apply_coverage(
    instruction: &str,
    plan: &mut MutationPlan,
    index: &ScopeIndex,
) -> Vec<PathAddress> {
    let mut injected = Vec::new();
    for (pattern, rule) in compiled_rules() {
        if !pattern.is_match(instruction) {
            continue;
        }
        let Ok(path) = PathAddress::parse(rule.path) else {
            continue;
        };
        if plan.contains_path(&path) || !index.contains(&path) {
            continue;
        }
        plan.prepend(rule.group, PlanTarget::new(path.clone(), rule.allowed_fields));
        info!(rule = rule.name, path = %path, "coverage heuristic injected plan entry");
        injected.push(path);
    }
    injected
}
