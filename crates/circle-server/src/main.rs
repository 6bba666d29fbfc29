use std::process::ExitCode;

use circle_server::{ServerConfig, start_server};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    circle_core::logging::init("info");

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Environment misconfigured: {e}");
            return ExitCode::FAILURE;
        }
    };

    match start_server(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
