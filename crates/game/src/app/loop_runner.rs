use std::process::ExitCode;

use stepframe::run_app;
use tracing::error;

use super::bootstrap::AppWiring;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    if let Err(err) = run_app(app.config, app.world) {
        error!(error = %err, "loop_failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
