use std::process::exit;

use colored::Colorize;

fn main() {
    if let Err(e) = cdrview::app::run_cli() {
        eprintln!("{}", e.red());
        exit(1);
    }
}
