use color_eyre::Result;
use scheduler::Scheduler;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod configuration;
mod notifiers;
mod schedule;
mod scheduler;
mod threshold;
mod watchers;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // a missing .env file is fine, settings may come from userwatch.toml alone
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().compact().with_env_filter(filter).init();
    info!("starting up");

    let configuration = configuration::load()?;
    let mut scheduler = Scheduler::from_configuration(&configuration)?;

    tokio::select! {
        _ = scheduler.start() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
