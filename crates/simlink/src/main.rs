mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "simlink", version, about = "Driving simulator link client")]
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

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

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
    fn parses_race_subcommand_with_defaults() {
        let cli = Cli::try_parse_from([
            "simlink",
            "race",
            "--model",
            "model.h5",
            "--host",
            "127.0.0.1",
            "--name",
            "paul",
        ])
        .expect("race args should parse");

        let Command::Race(args) = cli.command else {
            panic!("expected race command");
        };
        assert_eq!(args.port, 9091);
        assert_eq!(args.scene, "generated_track");
        assert_eq!(args.body_style, "dokney");
        assert_eq!(args.body_rgb, [64, 64, 64]);
        assert_eq!(args.font_size, 100);
    }

    #[test]
    fn race_requires_name() {
        let err = Cli::try_parse_from([
            "simlink",
            "race",
            "--model",
            "model.h5",
            "--host",
            "127.0.0.1",
        ])
        .expect_err("missing --name should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_bad_body_rgb() {
        let err = Cli::try_parse_from([
            "simlink",
            "race",
            "--model",
            "m",
            "--host",
            "h",
            "--name",
            "n",
            "--body-rgb",
            "300,0,0",
        ])
        .expect_err("out of range colour should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_listen_with_repeated_sends() {
        let cli = Cli::try_parse_from([
            "simlink",
            "--format",
            "json",
            "listen",
            "--host",
            "127.0.0.1",
            "--port",
            "9092",
            "--send",
            "{\"msg_type\":\"a\"}",
            "--send",
            "{\"msg_type\":\"b\"}",
            "--count",
            "2",
        ])
        .expect("listen args should parse");

        let Command::Listen(args) = cli.command else {
            panic!("expected listen command");
        };
        assert_eq!(args.port, 9092);
        assert_eq!(args.send.len(), 2);
        assert_eq!(args.count, Some(2));
    }
}
