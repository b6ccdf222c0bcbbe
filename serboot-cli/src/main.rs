//! serboot - upload an ELF or raw image to a serial bootloader
//!
//! Usage: `serboot-cli firmware.elf` finds the single serial port whose
//! description matches the board's USB bridge, streams the image and starts
//! it. Can be used as a cargo runner.

use std::path::PathBuf;

use clap::Parser;
use log::{error, info};
use serboot::{
    BootError, BootLink, DEFAULT_BAUD_RATE, DEFAULT_PORT_FILTER, Image, ImageKind,
    ProgressCallback, SkippedSection, TransferUnit, UploadPlan,
};

#[derive(Parser)]
#[command(name = "serboot-cli")]
#[command(about = "Upload an ELF or raw image to a serial bootloader", long_about = None)]
struct Cli {
    /// ELF or raw binary image to upload
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Serial port to use instead of searching for one
    #[arg(short, long)]
    port: Option<String>,

    /// Port description substring used for discovery
    #[arg(short, long, default_value = DEFAULT_PORT_FILTER)]
    filter: String,

    /// Baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Print what would be sent without opening a port
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:?}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), BootError> {
    info!("Uploading image: {}", cli.image.display());
    let image = Image::read(&cli.image)?;

    if cli.dry_run {
        let plan = serboot::plan(&image)?;
        print_header(&plan);
        for step in &plan.steps {
            println!("{}", step);
        }
        print_summary(&plan);
        println!("{}", plan.start());
        return Ok(());
    }

    let port = match cli.port {
        Some(port) => port,
        None => serboot::find_serial_port(&cli.filter)?,
    };

    let mut link = BootLink::open(&port, cli.baud)?;
    if image.kind() == ImageKind::Raw {
        println!("Writing file as binary with entry point 0x0");
    }

    let progress: ProgressCallback = Box::new(|step| {
        if !matches!(step.unit, TransferUnit::Start { .. }) {
            println!("{}", step);
        }
    });
    let report = serboot::upload(&image, &mut link, Some(progress)).await?;

    if report.kind != ImageKind::Raw {
        println!("Skipped sections: {}", join(&report.skipped));
    }
    println!("Starting program at address: 0x{:02X}", report.entry);

    link.close().await?;
    info!("Sent {} frames to {}", report.frames, port);
    Ok(())
}

fn print_header(plan: &UploadPlan<'_>) {
    if plan.is_raw() {
        println!("Writing file as binary with entry point 0x0");
    }
}

fn print_summary(plan: &UploadPlan<'_>) {
    if !plan.is_raw() {
        println!("Skipped sections: {}", join(&plan.skipped));
    }
}

fn join(skipped: &[SkippedSection]) -> String {
    skipped
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["serboot-cli", "firmware.elf"]).unwrap();
        assert_eq!(cli.image, PathBuf::from("firmware.elf"));
        assert_eq!(cli.baud, 115200);
        assert_eq!(cli.filter, "USB Serial Port");
        assert!(cli.port.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_image_is_required() {
        assert!(Cli::try_parse_from(["serboot-cli"]).is_err());
    }

    #[test]
    fn test_explicit_port() {
        let cli = Cli::try_parse_from([
            "serboot-cli",
            "--port",
            "/dev/ttyUSB1",
            "-b",
            "9600",
            "app.bin",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(cli.baud, 9600);
    }

    #[test]
    fn test_skipped_summary() {
        let skipped = [
            SkippedSection {
                name: ".riscv.attributes".into(),
                kind: 0x7000_0003,
            },
            SkippedSection {
                name: ".note".into(),
                kind: 7,
            },
        ];
        assert_eq!(join(&skipped), ".riscv.attributes(0x70000003) .note(0x7)");
        assert_eq!(join(&[]), "");
    }
}
