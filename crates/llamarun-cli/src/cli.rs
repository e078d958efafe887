//! Command-line flags.

use std::path::PathBuf;

use clap::Parser;

use llamarun_core::ConfigSnapshot;
use llamarun_proxy::Dialect;

/// Run local model backends on demand behind Ollama and OpenAI front doors.
#[derive(Debug, Parser)]
#[command(name = "llamarun", version, about)]
pub struct Cli {
    /// JSON configuration snapshot.
    #[arg(short, long, env = "LLAMARUN_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Address the front doors bind to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Ollama front door port [default: from config, else 11434].
    #[arg(long)]
    pub ollama_port: Option<u16>,

    /// OpenAI front door port [default: from config, else 1234].
    #[arg(long)]
    pub openai_port: Option<u16>,

    /// Do not start the Ollama front door.
    #[arg(long)]
    pub no_ollama: bool,

    /// Do not start the OpenAI front door.
    #[arg(long)]
    pub no_openai: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Default tracing directive when `RUST_LOG` is unset.
    pub const fn default_log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    /// Front doors to open, with their ports. Flags win over the snapshot.
    pub fn front_doors(&self, config: &ConfigSnapshot) -> Vec<(Dialect, u16)> {
        let mut doors = Vec::with_capacity(2);
        if config.proxies.ollama.enabled && !self.no_ollama {
            let port = self.ollama_port.unwrap_or_else(|| config.proxies.ollama_port());
            doors.push((Dialect::Ollama, port));
        }
        if config.proxies.lmstudio.enabled && !self.no_openai {
            let port = self.openai_port.unwrap_or_else(|| config.proxies.openai_port());
            doors.push((Dialect::OpenAi, port));
        }
        doors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("llamarun").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn ports_default_to_snapshot() {
        let config = ConfigSnapshot::from_json(r#"{"proxies": {"ollama": {"port": 11500}}}"#).unwrap();
        let cli = parse(&[]);
        assert_eq!(
            cli.front_doors(&config),
            vec![(Dialect::Ollama, 11500), (Dialect::OpenAi, 1234)]
        );
    }

    #[test]
    fn flags_override_and_disable() {
        let config = ConfigSnapshot::default();
        let cli = parse(&["--openai-port", "9000", "--no-ollama", "-v"]);
        assert_eq!(cli.front_doors(&config), vec![(Dialect::OpenAi, 9000)]);
        assert_eq!(cli.default_log_level(), "debug");
    }

    #[test]
    fn disabled_in_snapshot_stays_closed() {
        let config =
            ConfigSnapshot::from_json(r#"{"proxies": {"lmstudio": {"enabled": false}}}"#).unwrap();
        let cli = parse(&["--openai-port", "9000"]);
        assert_eq!(cli.front_doors(&config), vec![(Dialect::Ollama, 11434)]);
    }
}
