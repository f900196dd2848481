use leadflow_core::{CompanyId, MemberId, RebalanceScope};

use crate::commands::{
    application_failure, build_engine, build_runtime, load_config, open_database, CommandResult,
};

pub fn run(company_id: &str, executives: &[String]) -> CommandResult {
    let config = match load_config("rebalance") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("rebalance") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let company_id = CompanyId(company_id.to_string());
    let scope = scope_from_args(executives);

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let engine = build_engine(&pool, &config);
        let outcome = engine.rebalance(&company_id, scope).await.map_err(application_failure);
        pool.close().await;
        outcome
    });

    match result {
        Ok(summary) => CommandResult::success_with_data(
            "rebalance",
            format!(
                "moved {} of {} pipeline leads across {} executives",
                summary.updated, summary.total_leads, summary.executive_count
            ),
            &summary,
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("rebalance", error_class, message, exit_code)
        }
    }
}

fn scope_from_args(executives: &[String]) -> RebalanceScope {
    if executives.is_empty() {
        RebalanceScope::All
    } else {
        RebalanceScope::Executives(executives.iter().map(|id| MemberId(id.clone())).collect())
    }
}
