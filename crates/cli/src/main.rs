use std::process::ExitCode;

fn main() -> ExitCode {
    leadgate_cli::run()
}
