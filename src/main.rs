use colored::Colorize;
use gce_subnet_routes::config::Config;
use gce_subnet_routes::{connect, reconcile};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use std::error::Error;

fn init_logging() -> Result<(), Box<dyn Error>> {
    if log4rs::init_file("log4rs.yml", Default::default()).is_ok() {
        return Ok(());
    }
    let stdout = ConsoleAppender::builder().build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))?;
    log4rs::init_config(config)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Do as little as possible in main.rs as it can't contain any tests
    dotenv::dotenv().ok();
    init_logging()?;
    log::info!("#Start main()");

    let config = Config::from_env()?;
    let (session, instance) = connect(&config).await?;
    let summary = reconcile(&session, &instance, &config).await?;

    log::info!(
        "{} subnet={} route={:?} ranges={:?}",
        "done".on_green(),
        config.subnet,
        summary.route,
        summary.ranges.map(|r| (r.secondary_range_added, r.alias_range_added))
    );
    Ok(())
}
