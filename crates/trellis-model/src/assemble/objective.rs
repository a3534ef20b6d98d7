//! Objective selection: probability-weighted dispatch on the configured
//! objective name. Specific objectives divide by the annual load target.

use super::ScenarioAccounts;
use crate::problem::{FlowsheetProblem, Scenario};
use good_lp::Expression;
use trellis_core::{Objective, TrellisError, TrellisResult};

pub(crate) fn build_objective(
    problem: &FlowsheetProblem,
    scenarios: &[Scenario],
    accounts: &[ScenarioAccounts],
    annual_load: f64,
) -> TrellisResult<(Expression, bool)> {
    if !(annual_load > 0.0) {
        return Err(TrellisError::Config(format!(
            "annual load must be positive, got {}",
            annual_load
        )));
    }

    let weighted = |select: &dyn Fn(&ScenarioAccounts) -> Expression| {
        let mut expr = Expression::from(0.0);
        for (scenario, acc) in scenarios.iter().zip(accounts) {
            expr += scenario.weight * select(acc);
        }
        expr
    };

    let specific = 1.0 / annual_load;
    match &problem.superstructure.objective {
        Objective::Npc => Ok((specific * weighted(&|a| a.tac.clone()), false)),
        Objective::Npe => Ok((specific * weighted(&|a| a.emissions.clone()), false)),
        Objective::Fwd => Ok((specific * weighted(&|a| a.freshwater.clone()), false)),
        Objective::Ebit => Ok((weighted(&|a| a.ebit.clone()), true)),
        Objective::Impact(category) => {
            for acc in accounts {
                if !acc.impacts.contains_key(category) {
                    return Err(TrellisError::Config(format!(
                        "impact category '{}' is not declared",
                        category
                    )));
                }
            }
            Ok((
                specific * weighted(&|a| a.impacts[category].clone()),
                false,
            ))
        }
    }
}
