use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let outcome = yt_transcript::run(std::env::args_os()).await;

    println!("{}", outcome.output);

    if outcome.exit_code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(outcome.exit_code.clamp(1, 255) as u8)
    }
}
