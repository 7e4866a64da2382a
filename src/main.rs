// src/main.rs
// parabot binary entry point

use parabot::logging::LogFormat;

#[tokio::main]
async fn main() {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let (verbose, log_format) = peek_logging_flags(&raw_args);
    parabot::init_logging(verbose, log_format);

    let outcome = parabot::execute(raw_args).await;
    std::process::exit(parabot::exit_code(outcome));
}

/// Scans the raw argv for `--verbose`/`--log-format` ahead of full
/// partitioning and config assembly, so the logging subscriber is in
/// place before the first `tracing::error!` the orchestrator emits.
fn peek_logging_flags(raw_args: &[String]) -> (bool, LogFormat) {
    let verbose = raw_args.iter().any(|a| a == "--verbose");
    let mut log_format = LogFormat::Text;
    let mut iter = raw_args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--log-format=") {
            if value == "json" {
                log_format = LogFormat::Json;
            }
        } else if arg == "--log-format" {
            if let Some(value) = iter.next() {
                if value == "json" {
                    log_format = LogFormat::Json;
                }
            }
        }
    }
    (verbose, log_format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_verbose_and_space_separated_log_format() {
        let args: Vec<String> = ["--verbose", "--log-format", "json", "suite.robot"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (verbose, format) = peek_logging_flags(&args);
        assert!(verbose);
        assert_eq!(format, LogFormat::Json);
    }

    #[test]
    fn detects_equals_separated_log_format() {
        let args: Vec<String> = ["--log-format=json"].iter().map(|s| s.to_string()).collect();
        let (verbose, format) = peek_logging_flags(&args);
        assert!(!verbose);
        assert_eq!(format, LogFormat::Json);
    }

    #[test]
    fn defaults_to_text_and_non_verbose() {
        let args: Vec<String> = ["suite.robot"].iter().map(|s| s.to_string()).collect();
        let (verbose, format) = peek_logging_flags(&args);
        assert!(!verbose);
        assert_eq!(format, LogFormat::Text);
    }
}
