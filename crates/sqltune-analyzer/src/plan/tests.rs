//! Tests for plan reading

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn parses_wrapped_array_form() {
    let doc = json!([{
        "Plan": {
            "Node Type": "Seq Scan",
            "Relation Name": "orders",
            "Startup Cost": 0.0,
            "Total Cost": 1540.0,
            "Plan Rows": 100_000
        }
    }]);

    let plan = parse_plan(&doc);
    assert_eq!(plan.total_cost(), Some(1540.0));
    assert!(plan.has_sequential_scans());
    assert_eq!(
        plan.referenced_tables(),
        HashSet::from(["orders".to_string()])
    );
}

#[test]
fn parses_bare_object_form() {
    let doc = json!({
        "Plan": {
            "Node Type": "Index Scan",
            "Relation Name": "users",
            "Total Cost": 8.3
        }
    });

    let plan = parse_plan(&doc);
    assert_eq!(plan.total_cost(), Some(8.3));
    assert!(!plan.has_sequential_scans());
}

#[test]
fn malformed_inputs_yield_empty_results() {
    for doc in [
        json!(null),
        json!({}),
        json!([]),
        json!("not a plan"),
        json!(42),
        json!([{"NotAPlan": true}]),
    ] {
        let plan = parse_plan(&doc);
        assert_eq!(plan.root, None, "input: {}", doc);
        assert!(plan.referenced_tables().is_empty());
        assert!(plan.join_dependencies().is_empty());
        assert_eq!(plan.total_cost(), None);
    }
}

#[test]
fn no_relation_bearing_nodes_means_empty_table_set() {
    let doc = json!([{
        "Plan": {
            "Node Type": "Result",
            "Total Cost": 0.01
        }
    }]);

    let plan = parse_plan(&doc);
    assert!(plan.referenced_tables().is_empty());
}

#[test]
fn cte_scans_contribute_prefixed_identifiers() {
    let doc = json!([{
        "Plan": {
            "Node Type": "Hash Join",
            "Total Cost": 950.0,
            "Hash Cond": "(o.user_id = recent.user_id)",
            "Plans": [
                {
                    "Node Type": "Seq Scan",
                    "Relation Name": "orders",
                    "Total Cost": 700.0
                },
                {
                    "Node Type": "CTE Scan",
                    "CTE Name": "recent",
                    "Total Cost": 120.0
                }
            ]
        }
    }]);

    let tables = parse_plan(&doc).referenced_tables();
    assert_eq!(
        tables,
        HashSet::from(["orders".to_string(), "cte:recent".to_string()])
    );
}

#[test]
fn join_dependencies_link_both_sides() {
    let doc = json!([{
        "Plan": {
            "Node Type": "Hash Join",
            "Total Cost": 2000.0,
            "Hash Cond": "(orders.user_id = users.id)",
            "Plans": [
                {"Node Type": "Seq Scan", "Relation Name": "orders", "Total Cost": 1500.0},
                {
                    "Node Type": "Hash",
                    "Total Cost": 400.0,
                    "Plans": [
                        {"Node Type": "Seq Scan", "Relation Name": "users", "Total Cost": 350.0}
                    ]
                }
            ]
        }
    }]);

    let deps = parse_plan(&doc).join_dependencies();
    assert_eq!(deps["orders"], HashSet::from(["users".to_string()]));
    assert_eq!(deps["users"], HashSet::from(["orders".to_string()]));
}

#[test]
fn filter_conditions_without_joins_produce_no_edges() {
    let doc = json!([{
        "Plan": {
            "Node Type": "Seq Scan",
            "Relation Name": "orders",
            "Total Cost": 1500.0,
            "Filter": "(user_id = 5678)"
        }
    }]);

    let plan = parse_plan(&doc);
    assert!(plan.join_dependencies().is_empty());
    assert_eq!(
        plan.referenced_tables(),
        HashSet::from(["orders".to_string()])
    );
}

#[test]
fn three_way_join_links_all_qualifier_pairs() {
    let doc = json!([{
        "Plan": {
            "Node Type": "Nested Loop",
            "Total Cost": 3000.0,
            "Join Filter": "((a.x = b.x) AND (b.y = c.y))",
            "Plans": []
        }
    }]);

    let deps = parse_plan(&doc).join_dependencies();
    assert_eq!(
        deps["b"],
        HashSet::from(["a".to_string(), "c".to_string()])
    );
    assert!(deps["a"].contains("b"));
    assert!(deps["c"].contains("b"));
}

#[test]
fn node_iteration_is_depth_first() {
    let doc = json!([{
        "Plan": {
            "Node Type": "Limit",
            "Total Cost": 10.0,
            "Plans": [
                {
                    "Node Type": "Sort",
                    "Total Cost": 9.0,
                    "Plans": [
                        {"Node Type": "Seq Scan", "Relation Name": "t", "Total Cost": 5.0}
                    ]
                }
            ]
        }
    }]);

    let plan = parse_plan(&doc);
    let order: Vec<_> = plan.iter_nodes().map(|n| n.node_type.as_str()).collect();
    assert_eq!(order, vec!["Limit", "Sort", "Seq Scan"]);
    assert_eq!(plan.root.as_ref().unwrap().node_count(), 3);
}
