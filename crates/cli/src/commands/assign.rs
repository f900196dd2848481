use leadflow_core::{LeadId, MemberId};

use crate::commands::{
    application_failure, build_engine, build_runtime, load_config, open_database, CommandResult,
};

pub fn run(lead_id: &str, requester: Option<&str>, performed_by: Option<&str>) -> CommandResult {
    let config = match load_config("assign") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("assign") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let lead_id = LeadId(lead_id.to_string());
    let requester = requester.map(|id| MemberId(id.to_string()));
    // Without an explicit actor the requester is recorded on the activity.
    let performed_by = performed_by.map(|id| MemberId(id.to_string())).or_else(|| requester.clone());

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let engine = build_engine(&pool, &config);
        let outcome = engine
            .auto_assign(&lead_id, requester.as_ref(), performed_by.as_ref())
            .await
            .map_err(application_failure);
        pool.close().await;
        outcome
    });

    match result {
        Ok(assignment) => {
            let message = match (&assignment.mode, &assignment.executive, &assignment.reason) {
                (Some(mode), Some(executive), _) => {
                    format!("lead `{}` assigned to `{executive}` via {mode}", assignment.lead_id)
                }
                (_, _, Some(reason)) => {
                    format!("lead `{}` left pending: {}", assignment.lead_id, reason.describe())
                }
                _ => format!("lead `{}` left pending", assignment.lead_id),
            };
            CommandResult::success_with_data("assign", message, &assignment)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("assign", error_class, message, exit_code)
        }
    }
}
