use std::path::PathBuf;
use std::str::FromStr;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Keeps a Bluetooth link to the Mochila-Alarma backpack alarm")]
pub struct Args {
    /// Path to the JSON config file (defaults to the standard config location)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Name the alarm advertises, overrides the config file
    #[arg(long)]
    pub device_name: Option<String>,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Arm,
    Disarm,
    Status,
    Ping,
    Reconnect,
    Logs,
    Clear,
    Help,
    Quit,
}

pub const HELP: &str = "Commands: arm, disarm, status, ping, reconnect, logs, clear, help, quit";

impl FromStr for UserCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s.trim().to_ascii_lowercase().as_str() {
            "arm" => UserCommand::Arm,
            "disarm" => UserCommand::Disarm,
            "status" => UserCommand::Status,
            "ping" => UserCommand::Ping,
            "reconnect" | "retry" => UserCommand::Reconnect,
            "logs" | "log" => UserCommand::Logs,
            "clear" => UserCommand::Clear,
            "help" | "?" => UserCommand::Help,
            "quit" | "exit" | "q" => UserCommand::Quit,
            other => return Err(format!("Unknown command {:?}. {}", other, HELP)),
        };

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!("arm".parse(), Ok(UserCommand::Arm));
        assert_eq!(" DISARM \n".parse(), Ok(UserCommand::Disarm));
        assert_eq!("retry".parse(), Ok(UserCommand::Reconnect));
        assert_eq!("q".parse(), Ok(UserCommand::Quit));
    }

    #[test]
    fn rejects_unknown_command() {
        let err = "launch".parse::<UserCommand>().unwrap_err();
        assert!(err.contains("launch"));
        assert!(err.contains("arm, disarm"));
    }

    #[test]
    fn parses_arguments() {
        let args = Args::parse_from(["mochila-alarma", "--device-name", "Otra", "-v"]);
        assert_eq!(args.device_name.as_deref(), Some("Otra"));
        assert!(args.verbose);
        assert!(args.config.is_none());
    }
}
