use clap::{Parser, Subcommand};
use clusterbook::config_loader;
use clusterbook::ip::Family;
use clusterbook::model::Network;
use clusterbook::Inventory;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{debug, info, LevelFilter};
use serde::Serialize;
use std::net::IpAddr;
use std::path::PathBuf;

/// Inventory and provisioning bookkeeping for bare-metal clusters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration YAML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the cluster record
    Init {
        #[arg(long, default_value = "/trinity")]
        path: String,
        #[arg(long, default_value = "root")]
        user: String,
    },
    #[command(subcommand)]
    Network(NetworkCommand),
    #[command(subcommand)]
    Osimage(OsImageCommand),
    #[command(subcommand)]
    Bmcsetup(BmcSetupCommand),
    #[command(subcommand)]
    Group(GroupCommand),
    #[command(subcommand)]
    Node(NodeCommand),
    #[command(subcommand)]
    Switch(SwitchCommand),
}

#[derive(Subcommand, Debug)]
enum NetworkCommand {
    Add { name: String, cidr: String },
    Show { name: String },
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
enum OsImageCommand {
    Add {
        name: String,
        path: String,
        /// Skip querying the image for its kernel package
        #[arg(long)]
        kernel_version: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum BmcSetupCommand {
    Add { name: String },
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
    Add {
        name: String,
        #[arg(long)]
        osimage: String,
        /// Interfaces every node of the group gets
        #[arg(long = "interface", default_value = "BOOTIF")]
        interfaces: Vec<String>,
    },
    AddInterface { group: String, interface: String },
    SetNet {
        group: String,
        interface: String,
        network: String,
    },
    DelNet {
        group: String,
        interface: String,
        #[arg(long, default_value = "4")]
        family: Family,
    },
    /// Attach a BMC setup, or detach it when none is given
    SetBmcsetup { group: String, bmcsetup: Option<String> },
}

#[derive(Subcommand, Debug)]
enum NodeCommand {
    Add {
        group: String,
        /// Next free default name when omitted
        #[arg(long)]
        name: Option<String>,
    },
    Delete { name: String },
    SetGroup { node: String, group: String },
    /// Bind a MAC address; an empty string clears it
    SetMac { node: String, mac: String },
    SetSwitch {
        node: String,
        #[arg(long)]
        switch: Option<String>,
        #[arg(long)]
        port: Option<u32>,
    },
    Status {
        node: String,
        /// Print the step timestamp instead of the elapsed time
        #[arg(long)]
        absolute: bool,
    },
    UpdateStatus { node: String, step: String },
    BootParams { node: String },
    InstallParams { node: String },
}

#[derive(Subcommand, Debug)]
enum SwitchCommand {
    Add {
        name: String,
        network: String,
        ip: IpAddr,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).wrap_err("Failed to render output")?;
    println!("{}", out);
    Ok(())
}

fn run_network(inventory: &Inventory, command: NetworkCommand) -> Result<()> {
    match command {
        NetworkCommand::Add { name, cidr } => print_json(&inventory.create_network(&name, &cidr)?),
        NetworkCommand::Show { name } => print_json(&inventory.get::<Network>(&name)?),
        NetworkCommand::Delete { name } => Ok(inventory.delete_network(&name)?),
    }
}

fn run_group(inventory: &Inventory, command: GroupCommand) -> Result<()> {
    match command {
        GroupCommand::Add {
            name,
            osimage,
            interfaces,
        } => {
            let interfaces: Vec<&str> = interfaces.iter().map(String::as_str).collect();
            print_json(&inventory.create_group(&name, &osimage, &interfaces)?)
        }
        GroupCommand::AddInterface { group, interface } => {
            print_json(&inventory.add_interface(&group, &interface)?)
        }
        GroupCommand::SetNet {
            group,
            interface,
            network,
        } => Ok(inventory.set_net_to_if(&group, &interface, &network)?),
        GroupCommand::DelNet {
            group,
            interface,
            family,
        } => Ok(inventory.del_net_from_if(&group, &interface, family)?),
        GroupCommand::SetBmcsetup { group, bmcsetup } => {
            Ok(inventory.set_bmcsetup(&group, bmcsetup.as_deref())?)
        }
    }
}

fn run_node(inventory: &Inventory, command: NodeCommand) -> Result<()> {
    match command {
        NodeCommand::Add { group, name } => {
            print_json(&inventory.create_node(&group, name.as_deref())?)
        }
        NodeCommand::Delete { name } => Ok(inventory.delete_node(&name)?),
        NodeCommand::SetGroup { node, group } => {
            let moved = inventory.set_group(&node, &group)?;
            if !moved {
                info!("Node '{}' already belongs to group '{}'", node, group);
            }
            Ok(())
        }
        NodeCommand::SetMac { node, mac } => Ok(inventory.set_mac(&node, &mac)?),
        NodeCommand::SetSwitch { node, switch, port } => {
            Ok(inventory.set_switch(&node, switch.as_deref(), port)?)
        }
        NodeCommand::Status { node, absolute } => {
            print_json(&inventory.get_status(&node, !absolute)?)
        }
        NodeCommand::UpdateStatus { node, step } => {
            print_json(&inventory.update_status(&node, Some(&step))?)
        }
        NodeCommand::BootParams { node } => print_json(&inventory.boot_params(&node)?),
        NodeCommand::InstallParams { node } => print_json(&inventory.install_params(&node)?),
    }
}

fn run(inventory: &Inventory, command: Command) -> Result<()> {
    match command {
        Command::Init { path, user } => print_json(&inventory.init_cluster(&path, &user)?),
        Command::Network(command) => run_network(inventory, command),
        Command::Osimage(OsImageCommand::Add {
            name,
            path,
            kernel_version,
        }) => {
            inventory.create_osimage(&name, &path)?;
            let image = inventory.update_osimage(&name, |image| {
                image.kernel_version = kernel_version.clone();
                Ok(())
            })?;
            print_json(&image)
        }
        Command::Bmcsetup(BmcSetupCommand::Add { name }) => {
            print_json(&inventory.create_bmcsetup(&name)?)
        }
        Command::Group(command) => run_group(inventory, command),
        Command::Node(command) => run_node(inventory, command),
        Command::Switch(SwitchCommand::Add { name, network, ip }) => {
            print_json(&inventory.create_switch(&name, &network, ip)?)
        }
    }
}

/// Level from the config file; RUST_LOG wins when set
fn configured_level(level: Option<&str>, env_set: bool) -> Result<Option<LevelFilter>> {
    match level {
        Some(level) if !env_set => {
            let filter = level
                .parse()
                .wrap_err_with(|| format!("Invalid log level '{}' in configuration", level))?;
            Ok(Some(filter))
        }
        _ => Ok(None),
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logger before loading config so its warnings are visible.
    // Without RUST_LOG the filter stays open and the global cap decides.
    let env_set = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::from_env(Env::default().default_filter_or("trace")).init();
    if !env_set {
        log::set_max_level(LevelFilter::Info);
    }

    let args = Args::parse();
    let config = config_loader::load_or_default(args.config.as_deref())?;
    if let Some(level) = configured_level(config.general.log_level.as_deref(), env_set)? {
        log::set_max_level(level);
    }
    debug!("Configuration: {:?}", config);

    let inventory = Inventory::open(&config)
        .wrap_err_with(|| format!("Failed to open store {:?}", config.store.path))?;
    run(&inventory, args.command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_node_commands() {
        let args = Args::try_parse_from([
            "clusterbook",
            "--config",
            "/etc/clusterbook.yaml",
            "node",
            "set-switch",
            "node001",
            "--switch",
            "switch01",
            "--port",
            "7",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/clusterbook.yaml")));
        match args.command {
            Command::Node(NodeCommand::SetSwitch { node, switch, port }) => {
                assert_eq!(node, "node001");
                assert_eq!(switch.as_deref(), Some("switch01"));
                assert_eq!(port, Some(7));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_group_del_net_family() {
        let args =
            Args::try_parse_from(["clusterbook", "group", "del-net", "compute", "eth0", "--family", "6"])
                .unwrap();
        match args.command {
            Command::Group(GroupCommand::DelNet { family, .. }) => assert_eq!(family, Family::V6),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Args::try_parse_from(["clusterbook", "switch", "add", "sw1", "net1", "not-an-ip"]).is_err());
    }

    #[test]
    fn test_configured_level() {
        assert_eq!(configured_level(Some("debug"), false).unwrap(), Some(LevelFilter::Debug));
        assert_eq!(configured_level(Some("debug"), true).unwrap(), None);
        assert_eq!(configured_level(None, false).unwrap(), None);
        assert!(configured_level(Some("chatty"), false).is_err());
    }

    #[test]
    fn test_run_against_memory_inventory() {
        let inventory = Inventory::in_memory();
        run(&inventory, Command::Init { path: "/trinity".into(), user: "root".into() }).unwrap();
        run(
            &inventory,
            Command::Network(NetworkCommand::Add {
                name: "cluster".into(),
                cidr: "10.141.0.0/16".into(),
            }),
        )
        .unwrap();
        run(
            &inventory,
            Command::Osimage(OsImageCommand::Add {
                name: "compute".into(),
                path: "/trinity/images/compute".into(),
                kernel_version: Some("3.10-999-el0.x86_64".into()),
            }),
        )
        .unwrap();
        run(
            &inventory,
            Command::Group(GroupCommand::Add {
                name: "compute".into(),
                osimage: "compute".into(),
                interfaces: vec!["BOOTIF".into()],
            }),
        )
        .unwrap();
        run(&inventory, Command::Node(NodeCommand::Add { group: "compute".into(), name: None })).unwrap();

        assert_eq!(inventory.install_params("node001").unwrap().kernver, "3.10-999-el0.x86_64");
        assert!(run(
            &inventory,
            Command::Network(NetworkCommand::Delete { name: "missing".into() })
        )
        .is_err());
    }
}
