// src/main.rs

use triggerd::errors::TriggerdError;
use triggerd::{cli, exit_code, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("triggerd error: {err:?}");
        std::process::exit(1);
    }

    let command = args.command.clone();
    if let Err(err) = run(args).await {
        match &err {
            TriggerdError::Validation(errors) => {
                eprintln!("trigger rejected:");
                for e in errors.iter() {
                    eprintln!("  {}: {}", e.field, e.reason);
                }
            }
            other => eprintln!("triggerd error: {other}"),
        }
        std::process::exit(exit_code(&command, &err));
    }
}
