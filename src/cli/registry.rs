//! Container registry command implementation.

use clap::{Args, Subcommand};
use ocivisor::registry;

/// Manage the container name registry (test facility).
#[derive(Subcommand, Debug)]
pub enum RegistryCmd {
    /// List registered containers, optionally filtered to one network.
    List(ListArgs),

    /// Register or update a container's address.
    Register(RegisterArgs),

    /// Remove a container from the registry.
    #[command(alias = "rm")]
    Unregister(UnregisterArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only list entries on this network.
    #[arg(long)]
    pub network: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Network the container belongs to.
    pub network: String,
    /// Container name.
    pub name: String,
    /// Container IP address.
    pub ip_address: String,
}

#[derive(Args, Debug)]
pub struct UnregisterArgs {
    /// Network the container belongs to.
    pub network: String,
    /// Container name.
    pub name: String,
}

impl RegistryCmd {
    /// Execute the registry command.
    pub fn run(&self) -> ocivisor::Result<()> {
        match self {
            RegistryCmd::List(args) => {
                let entries = registry::list(args.network.as_deref())?;
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&entries).unwrap());
                    return Ok(());
                }
                if entries.is_empty() {
                    println!("No registered containers");
                    return Ok(());
                }
                println!("{:<20} {:<16} {:<15}", "NAME", "NETWORK", "IP ADDRESS");
                for entry in entries {
                    println!("{:<20} {:<16} {:<15}", entry.name, entry.network, entry.ip_address);
                }
                Ok(())
            }
            RegistryCmd::Register(args) => {
                registry::register(&args.network, &args.name, &args.ip_address)?;
                println!("Registered {} on {}", args.name, args.network);
                Ok(())
            }
            RegistryCmd::Unregister(args) => {
                match registry::unregister(&args.network, &args.name)? {
                    Some(_) => println!("Unregistered {} from {}", args.name, args.network),
                    None => println!("No entry named '{}' on {}", args.name, args.network),
                }
                Ok(())
            }
        }
    }
}
