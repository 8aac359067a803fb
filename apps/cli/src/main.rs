use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::error;

use unify_core::dongle::Dongle;
use unify_core::events::{DongleEvent, DongleObserver, LogLevel};
use unify_core::firmware::Firmware;
use unify_core::session::{FlashConfig, FlashSession, switch_and_open_bootloader};

mod hex;

#[derive(Parser, Debug)]
#[command(
    name = "unify",
    author,
    version,
    about = "Logitech Unifying receiver tool",
    long_about = "Inspect, pair, dump and reflash Logitech wireless receiver dongles over USB HID."
)]
struct Args {
    /// Enable verbose logging (raw USB reports included)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show receiver and paired device information
    Info,
    /// Open the pairing lock and wait for a new device
    Pair {
        /// Pairing lock timeout in seconds
        #[arg(short, long, default_value_t = 60)]
        timeout: u8,
    },
    /// Unpair one paired device
    Unpair,
    /// Unpair every paired device
    Unpairall,
    /// Dump receiver memory through the undocumented HID++ command
    Dump,
    /// Dump the firmware of a Nordic receiver via its bootloader
    Dumpnordic,
    /// Flash a firmware onto a TI receiver (experimental)
    Flash {
        /// Path to a firmware file in Logitech hex format
        #[arg(short = 'f', long = "hexfile")]
        hexfile: Option<PathBuf>,
        /// Path to a firmware file in raw binary format
        #[arg(short = 'r', long = "rawfile")]
        rawfile: Option<PathBuf>,
        /// Path to a detached 256-byte signature file
        #[arg(short = 's', long = "sigfile")]
        sigfile: Option<PathBuf>,
    },
}

/// Observer printing progress to stderr.
struct CliObserver {
    verbose: bool,
}

impl DongleObserver for CliObserver {
    fn on_event(&self, event: &DongleEvent) {
        match event {
            DongleEvent::ReceiverFound { pid } => {
                eprintln!("receiver found (046d:{pid:04x})");
            }
            DongleEvent::PhaseChanged { phase } => {
                eprintln!("-> {phase}");
            }
            DongleEvent::Progress {
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 { current * 100 / total } else { 0 };
                eprint!("\r[{pct:>3}%] {operation}");
                if current >= total {
                    eprintln!();
                }
                let _ = std::io::stderr().flush();
            }
            DongleEvent::Report { direction, raw } => {
                if self.verbose {
                    eprintln!("{direction}: {raw:02x?}");
                }
            }
            DongleEvent::Log { level, message } => match level {
                LogLevel::Error => eprintln!("error: {message}"),
                LogLevel::Warn => eprintln!("warning: {message}"),
                _ => eprintln!("{message}"),
            },
            DongleEvent::Complete => {
                eprintln!("done");
            }
        }
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::WARN.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let observer = Arc::new(CliObserver {
        verbose: args.verbose,
    });

    let result = match args.command {
        Command::Info => cmd_info(observer),
        Command::Pair { timeout } => cmd_pair(observer, timeout),
        Command::Unpair => cmd_unpair(observer),
        Command::Unpairall => cmd_unpairall(observer),
        Command::Dump => cmd_dump(observer),
        Command::Dumpnordic => cmd_dumpnordic(observer),
        Command::Flash {
            hexfile,
            rawfile,
            sigfile,
        } => cmd_flash(observer, hexfile, rawfile, sigfile),
    };

    if let Err(e) = result {
        error!("command failed: {e:#}");
        eprintln!("FAILED: {e:#}");
        std::process::exit(1);
    }
}

fn cmd_info(observer: Arc<CliObserver>) -> Result<()> {
    let dongle = Dongle::open_with_observer(observer)?;
    let set = dongle.get_set_info()?;
    println!("{set}");
    Ok(())
}

fn cmd_pair(observer: Arc<CliObserver>, timeout: u8) -> Result<()> {
    let dongle = Dongle::open_with_observer(observer)?;
    // Same value as the device index sent in 0x41 notifications; nothing
    // has been transmitted yet, so slot 1 is the conventional choice.
    let device_number = 0x01;
    dongle.pair(timeout, device_number)?;
    println!("device paired successfully");
    println!("{}", dongle.get_set_info()?);
    Ok(())
}

fn cmd_unpair(observer: Arc<CliObserver>) -> Result<()> {
    let dongle = Dongle::open_with_observer(observer)?;
    let set = dongle.get_set_info()?;
    if set.devices.is_empty() {
        bail!("no device paired to this receiver");
    }

    let device = choose_device(&set.devices)?;
    println!("removing device {} '{}'", device.index, device.name);
    dongle.unpair(device.index)?;
    Ok(())
}

fn cmd_unpairall(observer: Arc<CliObserver>) -> Result<()> {
    let dongle = Dongle::open_with_observer(observer)?;
    let set = dongle.get_set_info()?;
    for device in &set.devices {
        println!("removing device {} '{}'", device.index, device.name);
        dongle.unpair(device.index)?;
    }
    Ok(())
}

fn cmd_dump(observer: Arc<CliObserver>) -> Result<()> {
    let dongle = Dongle::open_with_observer(observer)?;
    let dump = dongle.dump_flash()?;

    let set = dongle.get_set_info()?;
    let serial = set.dongle.serial;
    let filename = format!(
        "rawdump_{:02x}{:02x}{:02x}{:02x}.dump",
        serial[0], serial[1], serial[2], serial[3]
    );
    std::fs::write(&filename, &dump).with_context(|| format!("writing {filename}"))?;
    println!("dumped data stored to '{filename}'");
    Ok(())
}

fn cmd_dumpnordic(observer: Arc<CliObserver>) -> Result<()> {
    let bootloader = switch_and_open_bootloader(observer, Duration::from_secs(3))?;
    let dump = bootloader.dump_nordic()?;
    std::fs::write(&dump.file_name, &dump.data)
        .with_context(|| format!("writing {}", dump.file_name))?;
    println!(
        "firmware dump (including device data and bootloader) stored to '{}'",
        dump.file_name
    );
    bootloader.reboot()?;
    Ok(())
}

fn cmd_flash(
    observer: Arc<CliObserver>,
    hexfile: Option<PathBuf>,
    rawfile: Option<PathBuf>,
    sigfile: Option<PathBuf>,
) -> Result<()> {
    let config = FlashConfig {
        firmware_path: rawfile.as_ref().map(|p| p.display().to_string()),
        signature_path: sigfile.as_ref().map(|p| p.display().to_string()),
        ..Default::default()
    };
    let session = FlashSession::new(config, observer);

    if let Some(hexfile) = hexfile {
        let text = std::fs::read_to_string(&hexfile)
            .with_context(|| format!("reading {}", hexfile.display()))?;
        let mut firmware = Firmware::parse(hex::assemble(&text)?)?;
        if let Some(sigfile) = sigfile {
            let signature = std::fs::read(&sigfile)
                .with_context(|| format!("reading {}", sigfile.display()))?;
            firmware.add_signature(&signature)?;
        }
        session.run_with(firmware)
    } else if rawfile.is_some() {
        session.run()
    } else {
        bail!(
            "no firmware file given: pass a Logitech hex file with -f or a raw binary with -r \
             (and a 256-byte signature blob with -s when the receiver has a signed bootloader)"
        );
    }
}

fn choose_device(devices: &[unify_core::DeviceInfo]) -> Result<&unify_core::DeviceInfo> {
    if devices.len() == 1 {
        return Ok(&devices[0]);
    }

    eprintln!("multiple devices paired, choose one:");
    for (i, device) in devices.iter().enumerate() {
        eprintln!(
            "  [{}] slot {} {} '{}'",
            i + 1,
            device.index,
            device.device_type,
            device.name
        );
    }
    loop {
        eprint!("device number: ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        let n = std::io::stdin().read_line(&mut line)?;
        if n == 0 {
            bail!("no selection made");
        }
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=devices.len()).contains(&n) => return Ok(&devices[n - 1]),
            _ => eprintln!("enter a number between 1 and {}", devices.len()),
        }
    }
}
