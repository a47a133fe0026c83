#![forbid(unsafe_code)]
#![cfg_attr(feature = "strict", deny(warnings))]

mod network;
mod server_config;
mod server_main;

use clap::{Command, arg};
use server_config::ServerConfig;


fn main() -> anyhow::Result<()> {
    env_logger::Builder::new()
        .target(env_logger::Target::Stdout)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let matches = Command::new("Dice chess relay")
        .version(clap::crate_version!())
        .about("Session coordinator for two-player dice chess")
        .subcommand_required(true)
        .subcommand(Command::new("server").about("Run as server").arg(
            arg!([config_file] "Path to the configuration file: yaml-serialized ServerConfig."),
        ))
        .get_matches();

    match matches.subcommand() {
        Some(("server", sub_matches)) => {
            let config_file = sub_matches.get_one::<String>("config_file");
            let config = ServerConfig::load(config_file.map(String::as_str))?;
            server_main::run(config)
        }
        _ => unreachable!("Exhausted list of subcommands and subcommand_required prevents `None`"),
    }
}
