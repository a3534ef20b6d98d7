//! Flowsheet decision logic: group activation coupling, successor
//! implications and raw-material source implications.
//!
//! The whole block is omitted in fixed-design mode, where the activation
//! pattern is frozen and these constraints would be vacuous or conflicting.

use super::DesignVars;
use crate::problem::FlowsheetProblem;
use good_lp::{constraint, Constraint, Expression};

pub(crate) fn add_decision_logic(
    problem: &FlowsheetProblem,
    design: &DesignVars,
    constraints: &mut Vec<Constraint>,
) {
    if problem.options.fixed_design.is_some() {
        return;
    }
    let ss = &problem.superstructure;

    // Units co-listed in a group activate together.
    for members in ss.groups().values() {
        for pair in members.windows(2) {
            let a = design.y[&pair[0]];
            let b = design.y[&pair[1]];
            constraints.push(constraint!(a == b));
        }
    }

    // An active unit needs at least one active permitted successor per
    // declared connection key.
    for (from, streams) in &ss.connections {
        let y_from = design.y[from];
        for targets in streams.values() {
            if targets.is_empty() {
                continue;
            }
            let mut active = Expression::from(0.0);
            for target in targets {
                active += design.y[target];
            }
            constraints.push(constraint!(active >= y_from));
        }
    }

    // A consumer restricted to specific raw-material sources needs at least
    // one of them active.
    for unit in &ss.units {
        if unit.possible_sources.is_empty() {
            continue;
        }
        let y_unit = design.y[&unit.id];
        let mut active = Expression::from(0.0);
        for source in &unit.possible_sources {
            active += design.y[source];
        }
        constraints.push(constraint!(active >= y_unit));
    }
}
