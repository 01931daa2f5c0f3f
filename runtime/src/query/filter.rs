use tracing::warn;

use crate::model::SemanticKeyFilter;

/// EDM types whose literals are written without quotes.
const UNQUOTED_TYPES: &[&str] = &[
    "Edm.Byte",
    "Edm.SByte",
    "Edm.Int16",
    "Edm.Int32",
    "Edm.Int64",
    "Edm.Decimal",
    "Edm.Double",
    "Edm.Single",
    "Edm.Boolean",
    "Edm.Guid",
    "Edm.Date",
    "Edm.DateTimeOffset",
    "Edm.TimeOfDay",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Branch<'a> {
    Eq(&'a str),
    Range(&'a str, &'a str),
}

fn parse_branch(branch: &str) -> Option<Branch<'_>> {
    let parts: Vec<&str> = branch.split('-').map(str::trim).collect();
    match parts.as_slice() {
        [value] if !value.is_empty() => Some(Branch::Eq(*value)),
        [lower, upper] if !lower.is_empty() && !upper.is_empty() => {
            Some(Branch::Range(*lower, *upper))
        }
        _ => None,
    }
}

fn literal(edm_type: &str, raw: &str) -> String {
    if UNQUOTED_TYPES.contains(&edm_type) {
        raw.to_string()
    } else {
        format!("'{}'", raw.replace('\'', "''"))
    }
}

fn branch_filter(key: &SemanticKeyFilter, branch: &Branch<'_>) -> String {
    let name = &key.name;
    match branch {
        Branch::Eq(value) => format!("{name} eq {}", literal(&key.edm_type, value)),
        Branch::Range(lower, upper) => format!(
            "({name} ge {} and {name} le {})",
            literal(&key.edm_type, lower),
            literal(&key.edm_type, upper)
        ),
    }
}

/// Filter for one semantic key, `None` when it has no value or no usable branch.
pub fn key_filter(key: &SemanticKeyFilter) -> Option<String> {
    let value = key.value.as_deref()?.trim();
    if value.is_empty() {
        return None;
    }

    let mut filters = Vec::new();
    for raw_branch in value.split(',') {
        if raw_branch.trim().is_empty() {
            continue;
        }
        match parse_branch(raw_branch) {
            Some(branch) => filters.push(branch_filter(key, &branch)),
            None => warn!(
                key = %key.name,
                branch = %raw_branch.trim(),
                "ignoring malformed semantic key filter"
            ),
        }
    }

    match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(format!("({})", filters.join(" or "))),
    }
}

/// One filter per key that produced one, in key order.
pub fn semantic_key_filters(keys: &[SemanticKeyFilter]) -> Vec<String> {
    keys.iter().filter_map(key_filter).collect()
}

/// Combine per-key filters into one `$filter` value.
pub fn combine(filters: &[String]) -> Option<String> {
    if filters.is_empty() {
        None
    } else {
        Some(filters.join(" and "))
    }
}
