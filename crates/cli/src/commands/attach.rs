use leadflow_core::MemberId;

use crate::commands::{
    application_failure, build_engine, build_runtime, load_config, open_database, CommandResult,
};

pub fn run(member_id: &str) -> CommandResult {
    let config = match load_config("attach") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("attach") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let member_id = MemberId(member_id.to_string());

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let engine = build_engine(&pool, &config);
        let outcome =
            engine.attach_to_least_loaded_manager(&member_id).await.map_err(application_failure);
        pool.close().await;
        outcome
    });

    match result {
        Ok(Some(manager)) => CommandResult::success_with_data(
            "attach",
            format!("`{member_id}` now reports to `{}`", manager.id),
            &manager,
        ),
        Ok(None) => CommandResult::success(
            "attach",
            format!("`{member_id}` left unchanged: already has a manager or no manager exists"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("attach", error_class, message, exit_code)
        }
    }
}
