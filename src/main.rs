use std::env;
use std::process;

use mio::Poll;
use webserv::config::{HttpConfig, DEFAULT_CONFIG_PATH};
use webserv::error::Result;
use webserv::server::Server;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        eprintln!("Error: Invalid number of parameters");
        eprintln!("Usage: ./webserv OR ./webserv <config-file>");
        process::exit(1);
    }
    let config_path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);

    if let Err(err) = run(config_path) {
        eprintln!("{}", err);
        process::exit(2);
    }
}

fn run(config_path: &str) -> Result<()> {
    weblog::init_from_env();
    let config = HttpConfig::load(config_path)?;
    config.display_config();

    let poll = Poll::new()?;
    let mut server = Server::new(config, &poll)?;
    server.run(poll)
}
