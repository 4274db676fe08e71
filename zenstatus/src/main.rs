use colored::Colorize;
use zenstatus::commands::command_argument_builder;
use zenstatus::handlers::{handle_audit, init_logging, print_banner};

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");
    init_logging(chosen_command.get_flag("verbose"));

    if !quiet {
        print_banner();
    }

    let result = match chosen_command.subcommand() {
        Some(("audit", primary_command)) => handle_audit(primary_command, quiet).await,
        None => return,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
