use clap::Parser;
use labelmail::app;
use labelmail::cli::Cli;
use labelmail::errors::AppError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

// One message at a time; nothing here benefits from worker threads.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env file if it exists
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match app::run(cli).await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(err) => {
            eprintln!("Error: {err:#}");
            let setup = err
                .downcast_ref::<AppError>()
                .is_some_and(AppError::is_setup_failure);
            ExitCode::from(if setup { 2 } else { 1 })
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
