mod cli;
mod infra;
mod rank;
mod refresh;
mod routes;
mod server;

use skillboard::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
