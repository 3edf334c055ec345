// Ambiance CLI - Drive an Ambiance device from the command line

use ambiance::engine::{Engine, EngineConfig, EngineEvent, FileSink, SystemClock};
use ambiance::protocol::Command;
use ambiance::schedule::ScheduleStore;
use ambiance::transport::{Discovery, Endpoint, HardwareConnector, HardwareDiscovery, TransportKind};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Control an Ambiance playback device over UART or Bluetooth LE
#[derive(Parser, Debug)]
#[command(name = "ambiance", version, long_about = None)]
struct Args {
    /// Serial port of the device (e.g. /dev/ttyUSB0, COM3)
    #[arg(long, conflicts_with = "ble", global = true)]
    uart: Option<String>,

    /// Serial line speed
    #[arg(long, default_value_t = Endpoint::DEFAULT_BAUD_RATE, global = true)]
    baud: u32,

    /// BLE address or advertised name of the device
    #[arg(long, global = true)]
    ble: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List serial ports, or nearby BLE devices with --scan-ble
    Ports {
        #[arg(long)]
        scan_ble: bool,
    },
    /// Set playback volume (0-100)
    Volume { percent: u8 },
    /// Set amplifier duty cycle (0-100)
    Duty { percent: u8 },
    /// Play a track
    Track { folder: u8, file: u8 },
    /// Download the device log
    Log {
        /// Directory the log is saved into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Schedule file operations
    Schedule {
        #[command(subcommand)]
        action: ScheduleCmd,
    },
}

#[derive(Subcommand, Debug)]
enum ScheduleCmd {
    /// Validate a schedule file without touching the device
    Check { file: PathBuf },
    /// Import a schedule file and send it to the device
    Send { file: PathBuf },
}

impl Args {
    fn endpoint(&self) -> Option<Endpoint> {
        match (&self.uart, &self.ble) {
            (Some(port), _) => Some(Endpoint::uart(port, self.baud)),
            (None, Some(address)) => Some(Endpoint::ble(address)),
            (None, None) => None,
        }
    }
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::Connecting { endpoint } => println!("Connecting to {}...", endpoint),
        EngineEvent::Connected { endpoint, via } => println!("Connected via {} ({})", via, endpoint),
        EngineEvent::Reconnecting {
            attempt,
            max,
            reason,
        } => println!("Connection lost ({}), reconnecting {}/{}", reason, attempt, max),
        EngineEvent::Disconnected { reason: Some(reason) } => println!("Disconnected: {}", reason),
        EngineEvent::Disconnected { reason: None } => println!("Disconnected"),
        EngineEvent::DeviceOutput(text) => println!("[device] {}", text),
        EngineEvent::CommandSent(what) => println!("Sent {}", what),
        EngineEvent::SchedulesSent { count } => println!("Sent {} schedule(s)", count),
        EngineEvent::SchedulesImported { imported, skipped } => {
            println!("Imported {} schedule(s), skipped {} line(s)", imported, skipped)
        }
        EngineEvent::LogPreview { text, complete } => {
            if !complete {
                println!("Log incomplete, partial content follows");
            }
            println!("Log preview:\n{}", text);
        }
        EngineEvent::Saved(path) => println!("Saved to {}", path.display()),
        EngineEvent::SaveCancelled => println!("Save cancelled"),
    }
}

async fn list_ports(scan_ble: bool) -> Result<(), Box<dyn std::error::Error>> {
    let discovery = HardwareDiscovery::new();
    let kind = if scan_ble {
        TransportKind::Ble
    } else {
        TransportKind::Uart
    };
    for device in discovery.discover(kind).await? {
        match device.name {
            Some(name) => println!("{}  {}", device.endpoint, name),
            None => println!("{}", device.endpoint),
        }
    }
    Ok(())
}

fn check_schedule(file: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(file)?;
    let mut store = ScheduleStore::new();
    let report = store.import(text.as_bytes())?;

    for (index, entry) in store.entries().iter().enumerate() {
        println!("{:>3}. {}", index + 1, entry);
    }
    for skipped in &report.skipped {
        println!("skipped: {}", skipped);
    }
    println!("{} valid, {} skipped", report.imported, report.skipped.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ambiance=info")),
        )
        .init();

    match &args.command {
        Cmd::Ports { scan_ble } => return list_ports(*scan_ble).await,
        Cmd::Schedule {
            action: ScheduleCmd::Check { file },
        } => return check_schedule(file),
        _ => {}
    }

    let endpoint = args
        .endpoint()
        .ok_or("a device is required: pass --uart PORT or --ble ADDRESS")?;

    let out_dir = match &args.command {
        Cmd::Log { out_dir } => out_dir.clone(),
        _ => PathBuf::from("."),
    };

    let (handle, mut events, worker) = Engine::spawn(
        EngineConfig::default(),
        Box::new(HardwareConnector::new()),
        Box::new(FileSink::new(out_dir)),
        Box::new(SystemClock),
    )?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let outcome = async {
        handle.connect(endpoint).await?;
        match &args.command {
            Cmd::Volume { percent } => {
                handle.send(Command::SetVolume(*percent)).await?;
            }
            Cmd::Duty { percent } => {
                handle.send(Command::SetDutyCycle(*percent)).await?;
            }
            Cmd::Track { folder, file } => {
                handle
                    .send(Command::SelectTrack {
                        folder: *folder,
                        file: *file,
                    })
                    .await?;
            }
            Cmd::Log { .. } => {
                handle.download_log().await?;
            }
            Cmd::Schedule {
                action: ScheduleCmd::Send { file },
            } => {
                let text = fs::read_to_string(file)?;
                let report = handle.import_schedules(text).await?;
                info!(imported = report.imported, "schedule file loaded");
                handle.send_schedules().await?;
            }
            Cmd::Ports { .. } | Cmd::Schedule { .. } => {}
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    }
    .await;

    handle.disconnect().await?;
    handle.shutdown().await?;
    drop(handle);
    worker.await?;
    printer.await?;

    if let Err(e) = &outcome {
        error!(error = %e, "command failed");
    }
    outcome
}
