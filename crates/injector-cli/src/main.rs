use injector_cli::{execute, logging, CliArgs, CliError, Exit};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match CliArgs::try_parse_from(std::env::args_os()) {
        Ok(args) => args,
        Err(CliError::Usage(e)) => {
            let _ = e.print();
            return if e.use_stderr() {
                Exit::InvalidInput.into()
            } else {
                Exit::Success.into()
            };
        }
        Err(e) => {
            eprintln!("error: {e}");
            return Exit::InvalidInput.into();
        }
    };

    logging::init(args.log_format);

    match execute(args).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            tracing::error!("{:#}", e);
            let exit = Exit::for_error(&e);
            let report = serde_json::json!({ "error": format!("{e:#}") });
            println!("{report:#}");
            exit.into()
        }
    }
}
