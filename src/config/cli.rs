use crate::app::Operation;
use crate::config::Overrides;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "juggler")]
#[command(about = "Juggle your PCI devices among libvirt VMs")]
#[command(
    long_about = "juggler attaches and detaches a directory of PCI device XML files to/from libvirt domains in alphabetical order"
)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path of the libvirtd unix socket
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,

    /// Connection URI sent to the daemon
    #[arg(long, global = true)]
    pub uri: Option<String>,

    /// Seconds to wait for the socket connection
    #[arg(long, global = true, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Attach a set of devices to a domain
    Attach {
        /// The directory we will scan for device xml files
        #[arg(long)]
        dir: Option<PathBuf>,

        /// The name of the domain to attach the devices to
        #[arg(long)]
        domain_name: String,
    },

    /// Detach devices from all domains
    Detach {
        /// The directory we will scan for device xml files
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Also probe every domain for devices that could not be located
        #[arg(long)]
        sweep: bool,
    },

    /// Find which domain has the given devices
    Find {
        /// The directory we will scan for device xml files
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Print the result as a JSON object
        #[arg(long)]
        json: bool,
    },

    /// Try to detach the given devices from every domain
    Sweep {
        /// The directory we will scan for device xml files
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// List all domains known to the daemon
    Domains,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            socket: self.socket.clone(),
            uri: self.uri.clone(),
            connect_timeout_secs: self.connect_timeout,
            dir: self.command.dir().cloned(),
        }
    }
}

impl Command {
    pub fn dir(&self) -> Option<&PathBuf> {
        match self {
            Command::Attach { dir, .. }
            | Command::Detach { dir, .. }
            | Command::Find { dir, .. }
            | Command::Sweep { dir } => dir.as_ref(),
            Command::Domains => None,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Command::Attach { domain_name, .. } => Operation::Attach {
                domain_name: domain_name.clone(),
            },
            Command::Detach { sweep, .. } => Operation::Detach { sweep: *sweep },
            Command::Find { .. } => Operation::Find,
            Command::Sweep { .. } => Operation::Sweep,
            Command::Domains => Operation::ListDomains,
        }
    }

    pub fn wants_json(&self) -> bool {
        matches!(self, Command::Find { json: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attach() {
        let cli = Cli::try_parse_from([
            "juggler",
            "attach",
            "--dir",
            "/etc/juggler/gpu",
            "--domain-name",
            "win10",
        ])
        .unwrap();

        assert_eq!(
            cli.command.operation(),
            Operation::Attach {
                domain_name: "win10".to_string()
            }
        );
        assert_eq!(cli.overrides().dir, Some(PathBuf::from("/etc/juggler/gpu")));
    }

    #[test]
    fn test_attach_requires_domain_name() {
        assert!(Cli::try_parse_from(["juggler", "attach", "--dir", "x"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "juggler",
            "detach",
            "--dir",
            "devices",
            "--sweep",
            "--socket",
            "/tmp/libvirt-sock",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.command.operation(), Operation::Detach { sweep: true });
        assert_eq!(cli.overrides().socket, Some(PathBuf::from("/tmp/libvirt-sock")));
    }

    #[test]
    fn test_find_json_and_domains() {
        let cli = Cli::try_parse_from(["juggler", "find", "--dir", "d", "--json"]).unwrap();
        assert!(cli.command.wants_json());

        let cli = Cli::try_parse_from(["juggler", "domains"]).unwrap();
        assert_eq!(cli.command.operation(), Operation::ListDomains);
        assert!(cli.command.dir().is_none());
    }
}
