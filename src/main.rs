//! UE Lab Provisioner
//!
//! Main entry point: locates adb, loads the configuration, and runs the
//! operator REPL.

use std::io::Write as _;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ue_lab::commands::{
    ForwardCommand, InstallCommand, ListCommand, ReplCommand, RestartServerCommand, SshCommand,
};
use ue_lab::config::LabConfig;
use ue_lab::{APP_NAME, VERSION};
use ue_lab_device_bridge::AdbClient;
use ue_lab_netconfig::PortPlan;

type InputLines = Lines<BufReader<Stdin>>;

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("{} v{} starting...", APP_NAME, VERSION);

    // A lab host without adb cannot do anything useful
    let adb = match AdbClient::new() {
        Ok(adb) => adb,
        Err(err) => {
            eprintln!("{err}: install Android platform-tools first");
            std::process::exit(1);
        }
    };

    let config = LabConfig::load_or_create(&LabConfig::config_path()).await?;
    let adb = adb.with_timeout(Duration::from_secs(config.timeouts.command_secs));

    repl(adb, config).await
}

/// Operator loop. Ports collected by `ssh` feed the final `forward` step.
async fn repl(adb: AdbClient, config: LabConfig) -> Result<()> {
    let mut ports = PortPlan::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print_help();
    loop {
        prompt("> ")?;
        let Some(line) = lines.next_line().await? else {
            break; // stdin closed
        };

        let Some(command) = ReplCommand::parse(line.trim()) else {
            if !line.trim().is_empty() {
                println!("invalid command");
                print_help();
            }
            continue;
        };

        match command {
            ReplCommand::List => {
                ListCommand.execute(&adb).await?;
            }
            ReplCommand::Help => print_help(),
            ReplCommand::Exit => break,
            ReplCommand::Install { serial } => {
                if !serial_attached(&adb, &serial).await? {
                    continue;
                }
                if let Err(err) = (InstallCommand { serial }).execute(&adb, &config).await {
                    println!("install failed: {err}");
                }
            }
            ReplCommand::Ssh { serial } => {
                if !serial_attached(&adb, &serial).await? {
                    continue;
                }
                let Some(port) = read_port(&mut lines, &mut ports).await? else {
                    continue;
                };
                if let Err(err) = (SshCommand { serial, port }).execute(&adb, &config).await {
                    println!("ssh setup failed: {err}");
                }
            }
            ReplCommand::Forward => {
                if ports.is_empty() {
                    println!("no SSH ports collected yet, run `ssh <serial>` first");
                    continue;
                }
                let lab_interface =
                    ask(&mut lines, "Interface for SSH connections from the lab: ").await?;
                if lab_interface.is_empty() {
                    continue;
                }
                let delete_stale_bridge = ask_yes_no(
                    &mut lines,
                    "Delete a previously created bridge if there is any? (yes/no): ",
                )
                .await?;
                let command = ForwardCommand {
                    lab_interface,
                    delete_stale_bridge,
                };
                if let Err(err) = command.execute(&config, &ports).await {
                    println!("forwarding setup failed: {err}");
                }
            }
            ReplCommand::RestartServer => {
                let confirmed = ask_yes_no(
                    &mut lines,
                    "Restarting adb drops all forwarding rules. Continue? (yes/no): ",
                )
                .await?;
                if confirmed {
                    RestartServerCommand.execute(&adb).await?;
                }
            }
        }
    }

    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  list               list attached devices");
    println!("  install <serial>   install dropbearmulti, iperf3 and diag support");
    println!("  ssh <serial>       start tethering and the dropbear SSH server");
    println!("  forward            set up host bridge, NAT and port forwarding");
    println!("  restart-server     restart the adb server in root mode");
    println!("  exit");
}

fn prompt(text: &str) -> Result<()> {
    print!("{text}");
    std::io::stdout().flush()?;
    Ok(())
}

async fn ask(lines: &mut InputLines, question: &str) -> Result<String> {
    prompt(question)?;
    Ok(lines
        .next_line()
        .await?
        .unwrap_or_default()
        .trim()
        .to_string())
}

async fn ask_yes_no(lines: &mut InputLines, question: &str) -> Result<bool> {
    Ok(ask(lines, question).await?.starts_with('y'))
}

/// Prompt for an SSH port and reserve it in the session plan.
async fn read_port(lines: &mut InputLines, ports: &mut PortPlan) -> Result<Option<u16>> {
    let answer = ask(lines, "SSH port for the device (1-254): ").await?;
    let Ok(port) = answer.parse::<u16>() else {
        println!("not a port number: {answer}");
        return Ok(None);
    };

    match ports.reserve(port) {
        Ok(()) => Ok(Some(port)),
        Err(err) => {
            println!("{err}");
            Ok(None)
        }
    }
}

/// Reject serials that are not attached and online.
async fn serial_attached(adb: &AdbClient, serial: &str) -> Result<bool> {
    let devices = adb.list_devices().await?;
    let attached = devices
        .iter()
        .any(|device| device.serial == serial && device.is_usable());

    if !attached {
        let serials: Vec<&str> = devices.iter().map(|device| device.serial.as_str()).collect();
        println!("Serial {serial} not available. Attached: {serials:?}");
    }
    Ok(attached)
}
