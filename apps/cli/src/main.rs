use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hid_core::{
    BackendKind, BluetoothAddress, BluetoothFilter, ErrorKind, HidConfig, HidDevice, HidError,
    ItemTag, ItemsDescriptor, UsbFilter, parse_items,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "HID device and report descriptor inspector", long_about = None)]
struct Args {
    /// TOML file with backend choice and default filters
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend to use (overrides the config file)
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    /// USB and Bluetooth
    Native,
    Usb,
    Bluetooth,
    Null,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Native => BackendKind::Native,
            BackendArg::Usb => BackendKind::Usb,
            BackendArg::Bluetooth => BackendKind::Bluetooth,
            BackendArg::Null => BackendKind::Null,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a report descriptor dump
    Parse {
        /// Descriptor file
        file: PathBuf,

        /// The file holds hex text instead of raw bytes
        #[arg(long)]
        hex: bool,
    },

    /// List USB HID interfaces and Bluetooth HID devices
    List,

    /// Open a USB HID device and print its report descriptor
    Usb {
        /// Vendor ID (hex)
        #[arg(long, value_parser = parse_hex_u16)]
        vendor: Option<u16>,

        /// Product ID (hex)
        #[arg(long, value_parser = parse_hex_u16)]
        product: Option<u16>,

        /// Serial number
        #[arg(long)]
        serial: Option<String>,

        /// Interface class (3 = HID)
        #[arg(long)]
        class: Option<u8>,

        /// Interface protocol (1 = keyboard, 2 = mouse)
        #[arg(long)]
        protocol: Option<u8>,
    },

    /// Open a Bluetooth HID device and print its report descriptor
    Bluetooth {
        /// Device address (AA:BB:CC:DD:EE:FF)
        #[arg(long)]
        address: Option<BluetoothAddress>,

        /// Device name, prefix or glob
        #[arg(long)]
        name: Option<String>,
    },
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex ID '{}': {}", s, e))
}

/// Decode hex text such as `05 01 09 06` or `0x05, 0x01`. Text after `#` or
/// `//` on a line is ignored.
fn parse_hex_dump(text: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("");
        let line = line.split("//").next().unwrap_or("");
        for token in line.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            let byte = u8::from_str_radix(digits, 16)
                .with_context(|| format!("invalid hex byte '{}'", token))?;
            bytes.push(byte);
        }
    }
    Ok(bytes)
}

fn read_dump(path: &Path, hex: bool) -> Result<Vec<u8>> {
    if hex {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        parse_hex_dump(&text)
    } else {
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))
    }
}

fn print_items(items: &ItemsDescriptor) {
    println!("{} items, {} bytes", items.len(), items.byte_len());

    let mut depth = 0usize;
    for item in items {
        if item.tag == ItemTag::EndCollection {
            depth = depth.saturating_sub(1);
        }
        println!("{:6}  {}{}", item.offset, "  ".repeat(depth), item);
        if item.tag == ItemTag::Collection {
            depth += 1;
        }
    }

    let nesting = items.nesting();
    if !nesting.is_balanced() {
        println!(
            "warning: unbalanced collections ({} unmatched end, {} unclosed)",
            nesting.unmatched_ends, nesting.unclosed
        );
    }

    for id in items.report_ids() {
        if let Some(size) = items.report_size(id) {
            println!(
                "report {:3}: input {} bytes, output {} bytes, feature {} bytes",
                id, size.input, size.output, size.feature
            );
        }
    }
}

fn dump_device(mut device: HidDevice) -> Result<()> {
    println!(
        "{} device {}{}",
        device.transport(),
        device.identifier(),
        device
            .name()
            .map(|name| format!(" ({})", name))
            .unwrap_or_default()
    );

    let items = hid_core::get_items(&mut device);
    hid_core::close(Some(device))?;
    print_items(&items?);
    Ok(())
}

/// Print what the active backend can enumerate. A transport the backend
/// does not handle is skipped.
fn list_devices() -> Result<()> {
    let backend = hid_core::active_backend();

    match backend.list_usb() {
        Ok(candidates) => {
            for candidate in candidates {
                println!(
                    "usb {:04X}:{:04X} interface {} class {:02X}/{:02X}/{:02X}  {} {}",
                    candidate.vendor_id,
                    candidate.product_id,
                    candidate.interface_number,
                    candidate.interface_class,
                    candidate.interface_subclass,
                    candidate.interface_protocol,
                    candidate.manufacturer.as_deref().unwrap_or("-"),
                    candidate.product.as_deref().unwrap_or("-"),
                );
            }
        }
        Err(e) if e.kind() == ErrorKind::NotSupported => info!("USB: {}", e),
        Err(e) => return Err(e.into()),
    }

    match backend.list_bluetooth() {
        Ok(candidates) => {
            for candidate in candidates {
                println!(
                    "bluetooth {}  {}",
                    candidate.address,
                    candidate.name.as_deref().unwrap_or("-"),
                );
            }
        }
        Err(e) if e.kind() == ErrorKind::NotSupported => info!("Bluetooth: {}", e),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => HidConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => HidConfig::default(),
    };
    let backend = args.backend.map(BackendKind::from).unwrap_or(config.backend);

    match args.command {
        Command::Parse { file, hex } => {
            let bytes = read_dump(&file, hex)?;
            print_items(&parse_items(&bytes)?);
        }
        Command::List => {
            hid_core::install(backend.create())?;
            list_devices()?;
        }
        Command::Usb {
            vendor,
            product,
            serial,
            class,
            protocol,
        } => {
            hid_core::install(backend.create())?;
            let filter = UsbFilter {
                vendor_id: vendor.or(config.usb.vendor_id),
                product_id: product.or(config.usb.product_id),
                serial_number: serial.or(config.usb.serial_number.clone()),
                interface_class: class.or(config.usb.interface_class),
                interface_protocol: protocol.or(config.usb.interface_protocol),
                ..config.usb
            };
            info!(?filter, "Opening USB device");
            dump_device(hid_core::open_usb(&filter)?)?;
        }
        Command::Bluetooth { address, name } => {
            hid_core::install(backend.create())?;
            let filter = BluetoothFilter {
                address: address.or(config.bluetooth.address),
                name_pattern: name.or(config.bluetooth.name_pattern.clone()),
                ..config.bluetooth
            };
            info!(?filter, "Opening Bluetooth device");
            dump_device(hid_core::open_bluetooth(&filter)?)?;
        }
    }

    Ok(())
}

fn guidance(e: &HidError) -> Option<&'static str> {
    match e.kind() {
        ErrorKind::NotSupported => Some("no HID backend for this transport on this platform"),
        ErrorKind::NotFound => Some("check that the device is connected"),
        ErrorKind::PermissionDenied => Some("check device permissions (udev rules)"),
        ErrorKind::Busy => Some("the device is in use, retry later"),
        _ => None,
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
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        if let Some(hint) = e.downcast_ref::<HidError>().and_then(guidance) {
            error!("{}", hint);
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_ids() {
        assert_eq!(parse_hex_u16("0x0F4E"), Ok(0x0F4E));
        assert_eq!(parse_hex_u16("f4e"), Ok(0x0F4E));
        assert!(parse_hex_u16("xyz").is_err());
    }

    #[test]
    fn test_parse_hex_dump() {
        let text = "0x05, 0x01, // Usage Page\n09 06 # Usage\n\nA1 01\n";
        assert_eq!(
            parse_hex_dump(text).unwrap(),
            vec![0x05, 0x01, 0x09, 0x06, 0xA1, 0x01]
        );
        assert!(parse_hex_dump("05 0G").is_err());
    }

    #[test]
    fn test_cli_args() {
        let args = Args::try_parse_from([
            "hidtool",
            "--backend",
            "null",
            "usb",
            "--vendor",
            "1234",
        ])
        .unwrap();
        assert!(matches!(args.backend, Some(BackendArg::Null)));
        assert!(matches!(
            args.command,
            Command::Usb {
                vendor: Some(0x1234),
                product: None,
                ..
            }
        ));

        let args = Args::try_parse_from(["hidtool", "usb", "--class", "3", "--protocol", "1"])
            .unwrap();
        assert!(args.backend.is_none());
        assert!(matches!(
            args.command,
            Command::Usb {
                class: Some(3),
                protocol: Some(1),
                ..
            }
        ));

        let args = Args::try_parse_from(["hidtool", "--backend", "bluetooth", "list"]).unwrap();
        assert!(matches!(args.backend, Some(BackendArg::Bluetooth)));
    }

    #[test]
    fn test_null_backend_run_reports_not_supported() {
        let args = Args::try_parse_from(["hidtool", "--backend", "null", "usb"]).unwrap();
        let err = run(args).unwrap_err();
        let hid = err.downcast_ref::<HidError>().unwrap();
        assert_eq!(hid.kind(), ErrorKind::NotSupported);
    }
}
