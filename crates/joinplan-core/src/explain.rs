//! Explain output for an optimized plan.
//!
//! [`explain`] flattens an [`OptimizedPlan`] into the serializable
//! [`PlanSummary`] from `joinplan-proto`; [`explain_text`] renders the same
//! tree as an indented, human-readable report.

use joinplan_proto::{AccessSummary, ConditionId, JoinSummary, NodeSummary, PlanSummary};

use crate::picker::OptimizedPlan;
use crate::plan::{AccessPlan, PlanNode};
use crate::query::QueryContext;

/// Summarize the chosen plan, with predicates rendered as text.
pub fn explain(plan: &OptimizedPlan, ctx: &QueryContext<'_>) -> PlanSummary {
    PlanSummary {
        root: summarize_node(&plan.root, ctx),
        residual_conditions: render_conditions(&plan.residual_conditions, ctx),
        cost: plan.cost.to_summary(),
    }
}

fn summarize_node(node: &PlanNode, ctx: &QueryContext<'_>) -> NodeSummary {
    match node {
        PlanNode::Access(access) => NodeSummary::Access(summarize_access(access, ctx)),
        PlanNode::Join(join) => NodeSummary::Join(JoinSummary {
            join_type: join.join_type.to_string(),
            need_distinct: join.need_distinct,
            conditions: render_conditions(&join.conditions, ctx),
            left: Box::new(summarize_node(&join.left, ctx)),
            right: Box::new(summarize_node(&join.right, ctx)),
            cost: join.cost.to_summary(),
        }),
    }
}

fn summarize_access(access: &AccessPlan, ctx: &QueryContext<'_>) -> AccessSummary {
    AccessSummary {
        tables: access.tables.clone(),
        kind: access.kind.name().to_string(),
        index: access.kind.index_name(),
        equalities: access.equalities(),
        has_range: access.has_range(),
        ordering: access.ordering.as_str().to_string(),
        covering: access.covering,
        outer_tables: access.bound_tables.clone(),
        conditions: render_conditions(&access.conditions, ctx),
        required_tables: access.required_tables.clone(),
        cost: access.cost.to_summary(),
    }
}

fn render_conditions(ids: &[ConditionId], ctx: &QueryContext<'_>) -> Vec<String> {
    ids.iter().map(|id| ctx.condition(*id).to_string()).collect()
}

/// Render the chosen plan as a report.
pub fn explain_text(plan: &OptimizedPlan, ctx: &QueryContext<'_>) -> String {
    let summary = explain(plan, ctx);
    let mut lines = Vec::new();

    let tables: Vec<&str> = plan.root.tables();
    lines.push(format!("Join Plan for {}", tables.join(", ")));
    lines.push("=".repeat(40));
    if plan.passes > 1 {
        lines.push("Graph: DISCONNECTED (cross products added)".to_string());
    } else {
        lines.push("Graph: CONNECTED".to_string());
    }
    lines.push(String::new());

    render_node(&summary.root, 0, &mut lines);

    if !summary.residual_conditions.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "Residual Filter: {}",
            summary.residual_conditions.join(" AND ")
        ));
    }

    lines.push(String::new());
    lines.push("Cost Estimates:".to_string());
    lines.push(format!("  Estimated Rows: {}", summary.cost.estimated_rows));
    lines.push(format!("  I/O Cost: {:.2}", summary.cost.io_cost));
    lines.push(format!("  CPU Cost: {:.2}", summary.cost.cpu_cost));
    lines.push(format!("  Total Cost: {:.2}", summary.cost.total_cost));

    lines.join("\n")
}

fn render_node(node: &NodeSummary, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    match node {
        NodeSummary::Access(access) => {
            let mut line = format!("{}{} {}", indent, access.kind, access.tables.join("/"));
            if let Some(index) = &access.index {
                line.push_str(&format!(" using {}", index));
            }
            if access.equalities > 0 || access.has_range {
                line.push_str(&format!(
                    " (equalities: {}{})",
                    access.equalities,
                    if access.has_range { ", range" } else { "" }
                ));
            }
            if access.covering {
                line.push_str(" covering");
            }
            line.push_str(&format!(" rows={}", access.cost.estimated_rows));
            lines.push(line);
            if !access.outer_tables.is_empty() {
                lines.push(format!("{}  bound by: {}", indent, access.outer_tables.join(", ")));
            }
            if !access.conditions.is_empty() {
                lines.push(format!("{}  where: {}", indent, access.conditions.join(" AND ")));
            }
        }
        NodeSummary::Join(join) => {
            lines.push(format!(
                "{}{} JOIN{} rows={}",
                indent,
                join.join_type,
                if join.need_distinct { " DISTINCT" } else { "" },
                join.cost.estimated_rows
            ));
            if !join.conditions.is_empty() {
                lines.push(format!("{}  on: {}", indent, join.conditions.join(" AND ")));
            }
            render_node(&join.left, depth + 1, lines);
            render_node(&join.right, depth + 1, lines);
        }
    }
}
