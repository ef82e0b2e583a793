use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match rpa::cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("rpa: {err:#}");
            ExitCode::FAILURE
        }
    }
}
