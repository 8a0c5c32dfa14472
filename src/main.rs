//! casebus CLI: inspect the bus described by the active configuration.
//!
//! Usage: `casebus [status|rollcall|radio-check [ADDRESS]|codes] [--config PATH]`
//!
//! Output is JSON on stdout. Set `RUST_LOG` for log detail on stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use casebus_lib::catalog::{CalloutCatalog, DiagnosticCatalog};
use casebus_lib::config::load_config;
use casebus_lib::{BusError, MasterController, Payload, SignalEnvelope};

enum Command {
    Status,
    Rollcall,
    RadioCheck(Option<String>),
    Codes,
}

fn parse_args(args: &[String]) -> Result<(Command, Option<PathBuf>), String> {
    let mut command = None;
    let mut target = None;
    let mut config = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "status" | "rollcall" | "radio-check" | "codes" if command.is_none() => {
                command = Some(arg.clone());
            }
            other if command.as_deref() == Some("radio-check") && target.is_none() => {
                target = Some(other.to_string());
            }
            other => return Err(format!("Unexpected argument: {}", other)),
        }
    }

    let command = match command.as_deref() {
        None | Some("status") => Command::Status,
        Some("rollcall") => Command::Rollcall,
        Some("radio-check") => Command::RadioCheck(target),
        Some("codes") => Command::Codes,
        Some(other) => return Err(format!("Unknown command: {}", other)),
    };
    Ok((command, config))
}

fn run(command: Command, config_path: Option<PathBuf>) -> Result<serde_json::Value, BusError> {
    let config = load_config(config_path.as_deref())?;
    let controller = MasterController::new(
        &config,
        CalloutCatalog::embedded()?,
        DiagnosticCatalog::embedded()?,
    )?;

    // The bus answers for itself.
    let bus = controller.bus_address().to_string();
    let reply = Payload::text(format!("{} 10-4", bus));
    controller.bind_handler(&bus, Arc::new(move |_: &SignalEnvelope| Some(reply.clone())))?;

    let value = match command {
        Command::Status => serde_json::to_value(controller.system_status()),
        Command::Rollcall => serde_json::to_value(controller.rollcall()),
        Command::RadioCheck(Some(address)) => serde_json::to_value(controller.radio_check(&address)),
        Command::RadioCheck(None) => serde_json::to_value(controller.radio_check_all()),
        Command::Codes => Ok(serde_json::json!({
            "callouts": controller.callouts().iter().collect::<Vec<_>>(),
            "diagnostics": controller.diagnostics().iter().collect::<Vec<_>>(),
        })),
    };

    value.map_err(|e| BusError::Config(e.into()))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, config_path) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: casebus [status|rollcall|radio-check [ADDRESS]|codes] [--config PATH]");
            return ExitCode::from(2);
        }
    };

    match run(command, config_path) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(out) => {
                println!("{}", out);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to render output: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
