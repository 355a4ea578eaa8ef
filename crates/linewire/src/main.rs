mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;
use linewire_channel::ChannelConfig;

use crate::cmd::Command;
use crate::exit::{channel_error, CliResult};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "linewire", version, about = "Line-framed message channel CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Channel config file (JSON). Flags below override its values.
    #[arg(long, value_name = "FILE", global = true, env = "LINEWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum text message length in characters.
    #[arg(long, value_name = "CHARS", global = true)]
    max_text: Option<usize>,

    /// Maximum binary message length in bytes.
    #[arg(long, value_name = "BYTES", global = true)]
    max_binary: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn channel_config(&self) -> CliResult<ChannelConfig> {
        let mut config = match &self.config {
            Some(path) => ChannelConfig::from_json_file(path)
                .map_err(|err| channel_error("config load failed", err))?,
            None => ChannelConfig::default(),
        };
        if let Some(max) = self.max_text {
            config.limits = config.limits.with_max_text_chars(max);
        }
        if let Some(max) = self.max_binary {
            config.limits = config.limits.with_max_binary_bytes(max);
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cli
        .channel_config()
        .and_then(|config| cmd::run(cli.command, format, config));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "linewire",
            "send",
            "/tmp/test.sock",
            "--text",
            "hello",
            "--wait",
        ])
        .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(ref args) if args.wait));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "linewire",
            "send",
            "/tmp/test.sock",
            "--text",
            "hello",
            "--binary-file",
            "/tmp/payload.bin",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn limit_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "linewire",
            "listen",
            "/tmp/test.sock",
            "--max-text",
            "5",
            "--count",
            "1",
        ])
        .expect("listen args should parse");

        let config = cli.channel_config().expect("config should build");
        assert_eq!(config.limits.max_text_chars, 5);
        assert_eq!(
            config.limits.max_binary_bytes,
            linewire_frame::DEFAULT_MAX_BINARY_BYTES
        );
    }

    #[test]
    fn limit_flags_override_config_file() {
        let path = std::env::temp_dir().join(format!("lw-cli-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "limits": { "max_text_chars": 10, "max_binary_bytes": 20 } }"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "linewire",
            "--config",
            path.to_str().unwrap(),
            "--max-binary",
            "30",
            "echo",
            "/tmp/test.sock",
        ])
        .expect("echo args should parse");
        let config = cli.channel_config().expect("config should load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.limits.max_text_chars, 10);
        assert_eq!(config.limits.max_binary_bytes, 30);
    }
}
