// src/main.rs

use checktree::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("checktree error: {err:?}");
        std::process::exit(3);
    }
    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            // exit codes 0-2 report check results; 3 means the run itself
            // failed before producing any
            eprintln!("checktree error: {err:?}");
            std::process::exit(3);
        }
    }
}
