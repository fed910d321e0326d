mod cli;

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use colored::Colorize;

fn main() -> ExitCode {
    // 初始化日志系统
    modtest::logger::init_logger();

    let cli = Cli::parse();
    match cli::execute(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::from(1)
        }
    }
}
