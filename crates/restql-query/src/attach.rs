//! Attaches filter, order and paging parameters to resolved tree nodes.
//!
//! A dotted key like `projects.tasks.id=eq.1` walks embed aliases from the
//! root; everything before the final segment must name an embedded resource.
//! The final segment is then an order/limit/offset keyword, a logic key, or
//! a filter column on the node it reached. A plain key is the same thing
//! with an empty path, so `projects=eq.1` filters a root *column* named
//! `projects` even when an embed of that name exists.

use crate::parse::filter::{is_logic_key, parse_filter, parse_logic};
use crate::parse::order::parse_order;
use crate::parse::parse_count;
use crate::resolve::ResolvedTree;
use restql_core::{ApiError, ErrorCode};

/// Keys consumed before attachment runs; never treated as filters.
const RESERVED: &[&str] = &["select", "columns", "on_conflict"];

/// Route every non-reserved query parameter to its tree node.
pub fn attach(tree: &mut ResolvedTree, pairs: &[(String, String)]) -> Result<(), ApiError> {
    for (key, value) in pairs {
        if RESERVED.contains(&key.as_str()) {
            continue;
        }
        attach_one(tree, key, value)?;
    }
    Ok(())
}

fn attach_one(tree: &mut ResolvedTree, key: &str, value: &str) -> Result<(), ApiError> {
    let segments: Vec<&str> = key.split('.').collect();
    let mut node = ResolvedTree::ROOT;
    let mut at = 0;
    loop {
        let rest = &segments[at..];
        if rest.len() == 1 || (rest.len() == 2 && is_logic_key(&rest.join("."))) {
            break;
        }
        match child_by_alias(tree, node, rest[0]) {
            Some(child) => {
                node = child;
                at += 1;
            }
            None => {
                return Err(ApiError::new(
                    ErrorCode::NotAnEmbeddedResource,
                    format!("'{}' is not an embedded resource in this request", rest[0]),
                )
                .with_hint(format!(
                    "Verify that '{}' is included in the 'select' query parameter",
                    rest[0]
                )));
            }
        }
    }

    let terminal = segments[at..].join(".");
    let target = &mut tree.nodes[node];
    match terminal.as_str() {
        "order" => target.order = parse_order(value).map_err(|e| e.into_api(key, value))?,
        "limit" => target.limit = Some(parse_count(key, value)?),
        "offset" => target.offset = Some(parse_count(key, value)?),
        logic if is_logic_key(logic) => target
            .filters
            .push(parse_logic(logic, value).map_err(|e| e.into_api(key, value))?),
        column => target
            .filters
            .push(parse_filter(column, value).map_err(|e| e.into_api(key, value))?),
    }
    Ok(())
}

fn child_by_alias(tree: &ResolvedTree, node: usize, alias: &str) -> Option<usize> {
    tree.nodes[node]
        .children
        .iter()
        .copied()
        .find(|&child| tree.nodes[child].alias == alias)
}
