use std::process::ExitCode;

fn main() -> ExitCode {
    azops_cli::run()
}
