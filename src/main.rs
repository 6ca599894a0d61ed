use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use speck_lib::sample::{DataSample, csv_fields, csv_header};
use speck_lib::transport::HidTransport;
use speck_lib::wifi::network::{Encryption, EncryptionType, Network};
use speck_lib::wifi::upload::UploadUrl;
use speck_lib::{NusbHidTransport, Speck, SpeckFactory, SpeckKind};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod logging;

/// Command-line access to Speck particle sensors.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List attached Specks.
    List,
    /// Show the device config and capabilities.
    Info {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Read one sample.
    Sample {
        /// Read the oldest stored sample instead of the current one.
        #[arg(long)]
        historical: bool,
    },
    /// Poll the current sample and write new readings as CSV.
    Log {
        #[arg(short, long, default_value_t = 10)]
        count: u32,
        /// Seconds between polls.
        #[arg(short, long, default_value_t = 60)]
        interval: u64,
        /// CSV file to write; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write stored samples as CSV.
    Download {
        /// Delete each sample after writing it. Without this only the oldest sample
        /// can be read.
        #[arg(long)]
        delete: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Set the logging interval in seconds (clamped to 1-255).
    SetInterval { seconds: i64 },
    /// Wi-Fi network management.
    Wifi {
        #[command(subcommand)]
        command: WifiCommand,
    },
    /// Upload feed API key.
    FeedKey {
        #[command(subcommand)]
        command: FeedKeyCommand,
    },
    /// Where the Speck uploads its samples.
    UploadUrl {
        #[command(subcommand)]
        command: UploadUrlCommand,
    },
    /// Display color palette.
    Palette {
        #[command(subcommand)]
        command: ToggleCommand,
    },
    /// Display units.
    Scale {
        #[command(subcommand)]
        command: ToggleCommand,
    },
    /// Put the sensor into calibration mode.
    Calibrate,
    /// Restore factory settings and erase all samples and networks.
    FactoryReset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum WifiCommand {
    Status,
    /// Scan and list visible networks.
    Scan,
    Join {
        ssid: String,
        #[arg(short, long, value_enum, default_value_t = EncryptionArg::Wpa2)]
        encryption: EncryptionArg,
        #[arg(short, long)]
        key: Option<String>,
    },
    /// List stored networks.
    Stored,
    /// Remove every stored network.
    ForgetAll,
}

#[derive(Subcommand, Debug)]
enum FeedKeyCommand {
    Set {
        key: String,
        /// Store the key without enabling uploads.
        #[arg(long)]
        disabled: bool,
    },
    Clear,
}

#[derive(Subcommand, Debug)]
enum UploadUrlCommand {
    Get,
    Set {
        host: String,
        #[arg(long, default_value_t = speck_lib::wifi::upload::DEFAULT_PORT)]
        port: u32,
        #[arg(long, default_value = speck_lib::wifi::upload::DEFAULT_PATH)]
        path: String,
    },
}

#[derive(Subcommand, Debug)]
enum ToggleCommand {
    Toggle,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum EncryptionArg {
    Open,
    Wep,
    Wpa,
    Wpa2,
}

impl From<EncryptionArg> for EncryptionType {
    fn from(arg: EncryptionArg) -> Self {
        match arg {
            EncryptionArg::Open => EncryptionType::Open,
            EncryptionArg::Wep => EncryptionType::Wep,
            EncryptionArg::Wpa => EncryptionType::Wpa,
            EncryptionArg::Wpa2 => EncryptionType::Wpa2,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::setup_logging(cli.log_file.as_deref(), &cli.verbose)?;

    let result = tokio::select! {
        result = run(cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Command failed: {:?}", e);
        process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands) -> Result<()> {
    let factory = SpeckFactory::new(Arc::new(NusbHidTransport::new()));

    if let Commands::List = command {
        let devices = factory.enumerate().await?;
        if devices.is_empty() {
            info!("No Specks found.");
        }
        for device in devices {
            let kind = SpeckKind::from_usb_id(device.usb_id());
            println!(
                "{}  {}  {}",
                device.device_id,
                device.usb_id(),
                kind.map_or("unknown".to_string(), |k| k.to_string())
            );
        }
        return Ok(());
    }

    let speck = factory
        .create()
        .await
        .context("Failed to connect to a Speck")?
        .context("No Speck found")?;

    let result = execute(&speck, command).await;
    if let Err(e) = speck.disconnect().await {
        warn!("Failed to disconnect: {}", e);
    }
    result
}

async fn execute<T: HidTransport + 'static>(speck: &Speck<T>, command: Commands) -> Result<()> {
    match command {
        Commands::List => unreachable!("handled before connecting"),
        Commands::Info { json } => {
            let config = speck.get_config(false).await?;
            let caps = speck.capabilities();
            if json {
                let info = serde_json::json!({
                    "kind": speck.kind().to_string(),
                    "device_id": speck.descriptor().device_id,
                    "config": config,
                    "capabilities": caps,
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("{} {}", speck.kind(), config.id);
                println!("  Protocol version: {}", config.protocol_version);
                if let Some(hw) = config.hardware_version {
                    println!("  Hardware version: {}", hw);
                }
                if let Some(fw) = config.firmware_version {
                    println!("  Firmware version: {}", fw);
                }
                println!("  Logging interval: {} s", config.logging_interval_secs);
                if let Some(palette) = config.color_palette {
                    println!("  Color palette: {}", palette);
                }
                if let Some(scale) = config.scale {
                    println!("  Scale: {}", scale);
                }
            }
        }
        Commands::Sample { historical } => {
            let sample = if historical {
                speck.get_historical_sample().await?
            } else {
                speck.get_current_sample().await?
            };
            match sample {
                Some(sample) => print_sample(speck, &sample),
                None => println!("No sample available"),
            }
        }
        Commands::Log { count, interval, output } => {
            let mut writer = csv_writer(output.as_deref())?;
            writer.write_record(csv_header(&speck.capabilities()))?;
            writer.flush()?;

            let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
            let mut last_time = None;
            let mut written = 0;
            while written < count {
                ticker.tick().await;
                let Some(sample) = speck.get_current_sample().await? else {
                    continue;
                };
                // the device repeats its latest sample until a new one is taken
                if last_time == Some(sample.sample_time_secs) {
                    continue;
                }
                last_time = Some(sample.sample_time_secs);
                writer.write_record(sample.csv_values())?;
                writer.flush()?;
                written += 1;
            }
        }
        Commands::Download { delete, output } => {
            let mut writer = csv_writer(output.as_deref())?;
            writer.write_record(csv_header(&speck.capabilities()))?;
            let mut written = 0;
            while let Some(sample) = speck.get_historical_sample().await? {
                writer.write_record(sample.csv_values())?;
                written += 1;
                if !delete {
                    info!("Pass --delete to read past the oldest stored sample");
                    break;
                }
                if !speck.delete_sample(i64::from(sample.sample_time_secs)).await? {
                    warn!(time = sample.sample_time_secs, "Speck did not delete the sample, stopping");
                    break;
                }
            }
            writer.flush()?;
            info!(count = written, "Downloaded samples");
        }
        Commands::SetInterval { seconds } => {
            if speck.set_logging_interval(seconds).await? {
                let config = speck.get_config(false).await?;
                println!("Logging interval: {} s", config.logging_interval_secs);
            } else {
                bail!("Speck did not confirm the new logging interval");
            }
        }
        Commands::Wifi { command } => wifi_command(speck, command).await?,
        Commands::FeedKey { command } => {
            let wifi = speck.wifi()?;
            let update = match command {
                FeedKeyCommand::Set { key, disabled } => wifi.set_feed_api_key(&key, !disabled).await?,
                FeedKeyCommand::Clear => wifi.clear_feed_api_key().await?,
            };
            if !update.success {
                bail!("Speck stored a different feed key: {}", update.key);
            }
            println!("Feed key {} ({})", update.key, if update.is_enabled { "enabled" } else { "disabled" });
        }
        Commands::UploadUrl { command } => {
            let wifi = speck.wifi()?;
            let url = match command {
                UploadUrlCommand::Get => wifi.get_upload_url().await?,
                UploadUrlCommand::Set { host, port, path } => {
                    wifi.set_upload_url(&UploadUrl::new(host, port, path)).await?
                }
            };
            println!("{}", url);
        }
        Commands::Palette {
            command: ToggleCommand::Toggle,
        } => {
            let config = speck.wifi()?.toggle_color_palette().await?;
            if let Some(palette) = config.color_palette {
                println!("Color palette: {}", palette);
            }
        }
        Commands::Scale {
            command: ToggleCommand::Toggle,
        } => {
            let config = speck.wifi()?.toggle_scale().await?;
            if let Some(scale) = config.scale {
                println!("Scale: {} ({})", scale, scale.abbreviation());
            }
        }
        Commands::Calibrate => {
            if !speck.wifi()?.enter_calibration_mode().await? {
                bail!("Speck did not enter calibration mode");
            }
            println!("Calibration mode");
        }
        Commands::FactoryReset { yes } => {
            if !yes {
                bail!("Factory reset erases all settings, networks and samples; pass --yes to confirm");
            }
            speck
                .wifi()?
                .factory_reset(|percent| info!(percent, "Factory reset progress"))
                .await?;
            println!("Factory reset complete");
        }
    }
    Ok(())
}

async fn wifi_command<T: HidTransport + 'static>(speck: &Speck<T>, command: WifiCommand) -> Result<()> {
    let wifi = speck.wifi()?;
    match command {
        WifiCommand::Status => {
            let status = wifi.get_wifi_status().await?;
            println!("Connection: {}", status.connection_status);
            if let Some(ip) = status.ip_address {
                println!("IP address: {}", ip);
            }
            println!("MAC address: {}", status.mac_address);
            println!(
                "Networks: {} available, {} stored",
                status.num_available_networks, status.num_stored_networks
            );
            println!(
                "Uploads: {}",
                if status.is_feed_api_key_enabled { "enabled" } else { "disabled" }
            );
        }
        WifiCommand::Scan => {
            for network in wifi.scan_and_get_available_networks().await? {
                print_network(&network);
            }
        }
        WifiCommand::Join { ssid, encryption, key } => {
            let encryption = match EncryptionType::from(encryption) {
                EncryptionType::Open => Encryption::open(),
                kind => Encryption::with_key(kind, key.unwrap_or_default()),
            };
            if !wifi.join_network(&Network::new(ssid, encryption)).await? {
                bail!("Speck did not start joining the network");
            }
            println!("Joining");
        }
        WifiCommand::Stored => {
            for network in wifi.get_stored_networks().await? {
                print_network(&network);
            }
        }
        WifiCommand::ForgetAll => {
            if !wifi.remove_all_networks().await? {
                bail!("Speck did not start removing networks");
            }
            println!("Removing stored networks");
        }
    }
    Ok(())
}

fn print_sample<T: HidTransport + 'static>(speck: &Speck<T>, sample: &DataSample) {
    if let Some(time) = sample.sample_time() {
        println!("Sample taken {}", time.to_rfc3339());
    }
    for field in csv_fields(&speck.capabilities()) {
        if let Some(value) = sample.value(field) {
            println!("  {}: {}", field, value);
        }
    }
}

fn print_network(network: &Network) {
    match network.signal_strength {
        Some(signal) => println!(
            "{:<32} {:<5} {} dBm ({})",
            network.ssid, network.encryption.kind, signal.rssi, signal.level
        ),
        None => println!("{:<32} {}", network.ssid, network.encryption.kind),
    }
}

fn csv_writer(output: Option<&Path>) -> Result<csv::Writer<Box<dyn Write>>> {
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path).with_context(|| format!("Failed to create {:?}", path))?),
        None => Box::new(io::stdout()),
    };
    Ok(csv::Writer::from_writer(sink))
}
