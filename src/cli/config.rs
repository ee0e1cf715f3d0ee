//! Host config command implementation.

use clap::Subcommand;
use ocivisor::config::OcivisorConfig;

/// Inspect or adjust host-side defaults.
#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Print the current host configuration.
    Show,

    /// Set a default used when launching new containers.
    Set {
        #[command(subcommand)]
        field: SetField,
    },
}

#[derive(Subcommand, Debug)]
pub enum SetField {
    DefaultCpus { value: u8 },
    DefaultMem { value: u32 },
    DefaultDns { value: String },
}

impl ConfigCmd {
    /// Execute the config command.
    pub fn run(&self) -> ocivisor::Result<()> {
        match self {
            ConfigCmd::Show => {
                let config = OcivisorConfig::load()?;
                println!("{}", serde_json::to_string_pretty(&config).unwrap());
                Ok(())
            }
            ConfigCmd::Set { field } => {
                let mut config = OcivisorConfig::load()?;
                match field {
                    SetField::DefaultCpus { value } => config.default_cpus = *value,
                    SetField::DefaultMem { value } => config.default_mem = *value,
                    SetField::DefaultDns { value } => config.default_dns = value.clone(),
                }
                config.save()?;
                println!("Saved");
                Ok(())
            }
        }
    }
}
