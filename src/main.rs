use std::process::ExitCode;

fn main() -> ExitCode {
    match scouse_decomp::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("scouse: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
