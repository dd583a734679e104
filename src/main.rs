use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use cli::collate::cmd_collate;
use cli::command::{Cli, Commands, LogFormat};
use cli::info::cmd_info;

mod cli;
mod index;
mod input;
pub(crate) mod timestamp;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_level = cli.loglevel.to_level_filter();

    let multi = MultiProgress::new();

    let mut env_builder = env_logger::Builder::from_default_env();
    env_builder.filter_level(base_level);
    match cli.log_format {
        LogFormat::Plain => {
            env_builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            env_builder.format(|buf, record| {
                use std::io::Write;
                let line = json_record(
                    &buf.timestamp().to_string(),
                    record.level(),
                    record.target(),
                    &record.args().to_string(),
                );
                writeln!(buf, "{line}")
            });
        }
    }

    let pb = if cli.progress {
        let logger = env_builder.build();
        LogWrapper::new(multi.clone(), logger).try_init()?;
        Some(&multi)
    } else {
        env_builder.try_init()?;
        None
    };

    log::debug!(
        "{} {} (lpcm {}, built {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("LPCM_VERSION"),
        env!("BUILD_TIMESTAMP")
    );

    match cli.command {
        Commands::Info(ref args) => cmd_info(args, &cli, pb)?,
        Commands::Collate(ref args) => cmd_collate(args, &cli, pb)?,
    }

    Ok(())
}

/// One log record as a JSON object, with message and target escaped.
fn json_record(ts: &str, level: log::Level, target: &str, msg: &str) -> serde_json::Value {
    serde_json::json!({
        "ts": ts,
        "lvl": level.as_str(),
        "target": target,
        "msg": msg,
    })
}

#[test]
fn json_record_escapes_message() -> Result<()> {
    let msg = "sub-stream \"0x80\" \\ rejected\x1b[0m\n";
    let line = json_record(
        "2026-01-01T00:00:00Z",
        log::Level::Warn,
        "lpcm::process::collate",
        msg,
    )
    .to_string();
    assert!(!line.contains('\n'));

    let value: serde_json::Value = serde_json::from_str(&line)?;
    assert_eq!(value["msg"], msg);
    assert_eq!(value["lvl"], "WARN");
    assert_eq!(value["target"], "lpcm::process::collate");
    assert_eq!(value["ts"], "2026-01-01T00:00:00Z");

    Ok(())
}
