mod args;

use crate::args::Args;
use buildfarm::config;
use buildfarm::db;
use buildfarm_common::errors::*;
use clap::Parser;
use env_logger::Env;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let logging = match args.verbose {
        0 => "info",
        1 => "buildfarm=debug,buildfarm_common=debug,info",
        2 => "debug",
        3 => "buildfarm=trace,buildfarm_common=trace,debug",
        _ => "trace",
    };

    env_logger::init_from_env(Env::default().default_filter_or(logging));

    let mut config = config::load(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.database_path = database;
    }

    if args.check_config {
        println!("{:#?}", config);
    } else {
        let pool = db::setup_pool(&config.database_path)?;
        buildfarm::run_config(pool, config)?;
    }
    Ok(())
}
