//! Execution-plan reading
//!
//! Parses EXPLAIN (FORMAT JSON) documents into a small plan model and
//! derives, per plan, the set of referenced tables and the join dependency
//! edges between them. Pure functions, no I/O; malformed or absent input
//! yields empty results rather than an error, because plan analytics must
//! never take down the request that produced the plan.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Prefix for synthetic identifiers contributed by CTE scans, so plan-level
/// analytics can tell CTEs from base tables without a second schema lookup
pub const CTE_PREFIX: &str = "cte:";

/// A single node in the execution plan tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanNode {
    /// Operation name as reported by the planner (e.g. "Seq Scan")
    pub node_type: String,
    /// Relation/table name, if the node scans one
    pub relation: Option<String>,
    /// CTE name, for common-table-expression scans
    pub cte_name: Option<String>,
    /// Join, filter, and index condition text attached to the node
    pub conditions: Vec<String>,
    /// Total cost in planner cost units
    pub total_cost: Option<f64>,
    /// Estimated rows
    pub rows: Option<u64>,
    /// Child nodes
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    /// Depth-first iterator over this subtree (including self)
    pub fn iter(&self) -> PlanNodeIterator<'_> {
        PlanNodeIterator { stack: vec![self] }
    }

    /// Total number of nodes in this subtree
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }
}

/// A parsed plan document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanDocument {
    /// Root plan node; `None` for empty/malformed input
    pub root: Option<PlanNode>,
}

impl PlanDocument {
    /// Total cost of the plan, in planner cost units
    pub fn total_cost(&self) -> Option<f64> {
        self.root.as_ref().and_then(|r| r.total_cost)
    }

    /// Depth-first iterator over all nodes
    pub fn iter_nodes(&self) -> PlanNodeIterator<'_> {
        match &self.root {
            Some(root) => root.iter(),
            None => PlanNodeIterator { stack: Vec::new() },
        }
    }

    /// True if any node is a sequential scan
    pub fn has_sequential_scans(&self) -> bool {
        self.iter_nodes().any(|n| n.node_type == "Seq Scan")
    }

    /// The set of referenced table identifiers
    ///
    /// Relation-bearing nodes contribute their relation name; CTE scans
    /// contribute a [`CTE_PREFIX`]-prefixed synthetic identifier.
    pub fn referenced_tables(&self) -> HashSet<String> {
        let mut tables = HashSet::new();
        for node in self.iter_nodes() {
            if let Some(rel) = &node.relation {
                tables.insert(rel.clone());
            }
            if let Some(cte) = &node.cte_name {
                tables.insert(format!("{}{}", CTE_PREFIX, cte));
            }
        }
        tables
    }

    /// Join dependency edges derived from condition text
    ///
    /// Condition strings are tokenized for `identifier.identifier`-shaped
    /// references; every pair of distinct qualifiers in one condition is
    /// linked symmetrically, regardless of which side is the driving table.
    pub fn join_dependencies(&self) -> HashMap<String, HashSet<String>> {
        let mut deps: HashMap<String, HashSet<String>> = HashMap::new();
        for node in self.iter_nodes() {
            for condition in &node.conditions {
                let qualifiers = qualified_references(condition);
                for a in &qualifiers {
                    for b in &qualifiers {
                        if a != b {
                            deps.entry(a.clone()).or_default().insert(b.clone());
                        }
                    }
                }
            }
        }
        deps
    }
}

/// Depth-first iterator over plan nodes
pub struct PlanNodeIterator<'a> {
    stack: Vec<&'a PlanNode>,
}

impl<'a> Iterator for PlanNodeIterator<'a> {
    type Item = &'a PlanNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

/// Parses an EXPLAIN (FORMAT JSON) document
///
/// Accepts the wrapped single-element array form PostgreSQL emits
/// (`[{"Plan": {...}}]`), the bare object form (`{"Plan": {...}}`), and a
/// bare plan node. Null, empty, or unrecognized input produces a document
/// with no root.
pub fn parse_plan(doc: &Value) -> PlanDocument {
    let plan_obj = match doc {
        Value::Array(arr) => arr.first().and_then(|v| v.get("Plan")),
        // A bare node is recognizable by its "Node Type" key
        Value::Object(_) => doc
            .get("Plan")
            .or_else(|| doc.get("Node Type").is_some().then_some(doc)),
        _ => None,
    };

    PlanDocument {
        root: plan_obj.and_then(parse_plan_node),
    }
}

/// Parses a single plan node from JSON; `None` if it lacks a node type
fn parse_plan_node(value: &Value) -> Option<PlanNode> {
    let node_type = value.get("Node Type").and_then(|v| v.as_str())?;

    let mut node = PlanNode {
        node_type: node_type.to_string(),
        ..PlanNode::default()
    };

    if let Some(rel) = value.get("Relation Name").and_then(|v| v.as_str()) {
        node.relation = Some(rel.to_string());
    }

    if let Some(cte) = value.get("CTE Name").and_then(|v| v.as_str()) {
        node.cte_name = Some(cte.to_string());
    }

    node.total_cost = value.get("Total Cost").and_then(|v| v.as_f64());
    node.rows = value.get("Plan Rows").and_then(|v| v.as_u64());

    for key in [
        "Filter",
        "Index Cond",
        "Join Filter",
        "Hash Cond",
        "Merge Cond",
        "Recheck Cond",
    ] {
        if let Some(cond) = value.get(key).and_then(|v| v.as_str()) {
            node.conditions.push(cond.to_string());
        }
    }

    if let Some(plans) = value.get("Plans").and_then(|v| v.as_array()) {
        for child_value in plans {
            if let Some(child) = parse_plan_node(child_value) {
                node.children.push(child);
            }
        }
    }

    Some(node)
}

static QUALIFIED_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\.[A-Za-z_][A-Za-z0-9_]*").expect("valid regex")
});

/// Distinct qualifiers of `identifier.identifier` references in a condition
fn qualified_references(condition: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for cap in QUALIFIED_REF.captures_iter(condition) {
        let qualifier = cap[1].to_string();
        if !seen.contains(&qualifier) {
            seen.push(qualifier);
        }
    }
    seen
}

#[cfg(test)]
mod tests;
