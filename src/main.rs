use std::process::ExitCode;

fn main() -> ExitCode {
    match data_unifier::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
