//! Command-line argument parsing with clap.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Source argument meaning standard input.
pub const STDIN_SOURCE: &str = "-";

/// Ingest structured logs, index them and serve search and live tail.
#[derive(Parser, Debug, Clone)]
#[command(name = "logscope")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log file to read; `-` reads standard input.
    #[arg(default_value = STDIN_SOURCE)]
    pub source: String,

    /// TOML configuration file.
    #[arg(short, long, env = "LOGSCOPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address for the HTTP server.
    #[arg(short, long, env = "LOGSCOPE_BIND")]
    pub bind: Option<SocketAddr>,

    /// Parser turning lines into entries.
    #[arg(short, long)]
    pub parser: Option<String>,

    /// Line filters applied before parsing, first innermost.
    #[arg(short, long, value_delimiter = ',')]
    pub filter: Vec<String>,

    /// Only keep entries matching `key=value` or `key!=value`.
    #[arg(short = 'w', long = "where", value_name = "KEY=VALUE")]
    pub predicates: Vec<String>,

    /// Directory for an on-disk index instead of memory.
    #[arg(long, env = "LOGSCOPE_INDEX_DIR")]
    pub index_dir: Option<PathBuf>,

    /// Log lines that fail to parse.
    #[arg(long)]
    pub show_parse_errors: bool,

    /// Stop on the first parse or processor error.
    #[arg(long)]
    pub strict: bool,

    /// Write every kept entry to stdout as a JSON line.
    #[arg(long)]
    pub echo: bool,

    /// Do not start the HTTP server.
    #[arg(long)]
    pub no_web: bool,
}

impl Cli {
    /// Returns true if the source is standard input.
    #[must_use]
    pub fn reads_stdin(&self) -> bool {
        self.source == STDIN_SOURCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["logscope"]);
        assert!(cli.reads_stdin());
        assert!(cli.config.is_none());
        assert!(cli.bind.is_none());
        assert!(cli.parser.is_none());
        assert!(cli.filter.is_empty());
        assert!(cli.predicates.is_empty());
        assert!(!cli.strict);
        assert!(!cli.echo);
        assert!(!cli.no_web);
    }

    #[test]
    fn test_source_path() {
        let cli = Cli::parse_from(["logscope", "/var/log/app.log"]);
        assert!(!cli.reads_stdin());
        assert_eq!(cli.source, "/var/log/app.log");
    }

    #[test]
    fn test_filters_repeat_and_split() {
        let cli = Cli::parse_from(["logscope", "--filter", "docker,cri", "-f", "none"]);
        assert_eq!(cli.filter, ["docker", "cri", "none"]);
    }

    #[test]
    fn test_where_predicates() {
        let cli = Cli::parse_from(["logscope", "--where", "level=error", "-w", "service!=db"]);
        assert_eq!(cli.predicates, ["level=error", "service!=db"]);
    }

    #[test]
    fn test_bind_and_flags() {
        let cli = Cli::parse_from([
            "logscope",
            "--bind",
            "0.0.0.0:9000",
            "--parser",
            "json",
            "--strict",
            "--show-parse-errors",
            "--echo",
            "--no-web",
        ]);
        assert_eq!(cli.bind, Some(SocketAddr::from(([0, 0, 0, 0], 9000))));
        assert_eq!(cli.parser.as_deref(), Some("json"));
        assert!(cli.strict);
        assert!(cli.show_parse_errors);
        assert!(cli.echo);
        assert!(cli.no_web);
    }

    #[test]
    fn test_bad_bind_rejected() {
        assert!(Cli::try_parse_from(["logscope", "--bind", "localhost"]).is_err());
    }
}
