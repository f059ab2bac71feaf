use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use webstore::app;
use webstore::cli::Cli;
use webstore::logging;
use webstore::settings::Settings;
use webstore_web::ShutdownReason;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version go to stdout and are not failures
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    if let Err(e) = logging::init(cli.log.as_deref()) {
        eprintln!("webstore: {e}");
        return ExitCode::FAILURE;
    }

    let settings = match Settings::from_env(cli) {
        Ok(settings) => settings,
        Err(e) => {
            error!(cause = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match settings.server.threading.runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(cause = %e, "cannot start runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(app::run(settings)) {
        Ok(ShutdownReason::Signal) => ExitCode::SUCCESS,
        Ok(ShutdownReason::StoreLost) => {
            info!("exit after losing the store");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(cause = %e, "webstore failed");
            ExitCode::FAILURE
        }
    }
}
