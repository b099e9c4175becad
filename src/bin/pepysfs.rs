//! pepysfs disk tool
//!
//! Format, inspect and poke at a pepysfs device image.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use pepysfs::arena::FileKind;
use pepysfs::device::FileDevice;
use pepysfs::{Config, Disk, Vid};
use tracing_subscriber::{fmt, EnvFilter};

/// pepysfs disk tool
#[derive(Parser, Debug)]
#[command(name = "pepysfs")]
#[command(about = "Format and inspect pepysfs block devices")]
#[command(version)]
struct Args {
    /// Device or image file
    #[arg(short, long, default_value = "./pepys.img")]
    device: PathBuf,

    /// Reserved config region size in bytes
    #[arg(long, default_value = "0")]
    config_size: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an image of the given size and format it
    Format {
        /// Image size, e.g. 64M, 2G
        #[arg(short, long)]
        size: Option<String>,

        /// Target arena size, e.g. 1G
        #[arg(short, long, default_value = "1G")]
        arena_size: String,

        /// Reject the device instead of shrinking arenas
        #[arg(long)]
        strict: bool,
    },

    /// Print the live superblock and arena states
    Info,

    /// Look up a file version
    Lookup {
        /// Vid as server.file.version
        vid: String,
    },

    /// Store a small file
    Put {
        /// Vid as server.file.version
        vid: String,

        /// File contents
        data: String,

        /// Metadata
        #[arg(short, long, default_value = "")]
        meta: String,
    },

    /// List the records of an arena
    Scan {
        /// Arena number
        arena: usize,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pepysfs=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let base = Config::builder()
        .device_path(&args.device)
        .config_size(args.config_size);

    match args.command {
        Commands::Format {
            size,
            arena_size,
            strict,
        } => {
            let config = base
                .arena_size(parse_size(&arena_size)?)
                .scale_arenas(!strict)
                .build();
            if let Some(size) = size {
                FileDevice::create(&args.device, parse_size(&size)?)?;
            }
            let disk = Disk::format(config)?;
            print_super(&disk);
            disk.close()?;
        }

        Commands::Info => {
            let disk = Disk::mount(base.build())?;
            print_super(&disk);
            for arena in disk.arenas() {
                println!(
                    "arena {:4} {:#014x} {:?} wrp={:#x} allocations={}",
                    arena.id, arena.start, arena.state, arena.wrp, arena.allocations
                );
            }
        }

        Commands::Lookup { vid } => {
            let disk = Disk::mount(base.build())?;
            let vid = parse_vid(&vid)?;
            let addr = disk.lookup(&vid)?;
            println!(
                "{} daddr={:#x} doff={} dlen={}",
                vid, addr.disk_address, addr.disk_offset, addr.disk_length
            );
            let meta = disk.read_metadata(&vid)?;
            println!("meta: {}", String::from_utf8_lossy(&meta));
        }

        Commands::Put { vid, data, meta } => {
            let disk = Disk::mount(base.build())?;
            let vid = parse_vid(&vid)?;
            let addr = disk.write_file(vid, FileKind::File, data.as_bytes(), meta.as_bytes())?;
            println!("{} written at {:#x}", vid, addr.disk_address);
            disk.close()?;
        }

        Commands::Scan { arena } => {
            let disk = Disk::mount(base.build())?;
            for record in disk.scan_arena(arena)? {
                match (record.trailer, record.location) {
                    (Some(trailer), Some(location)) => println!(
                        "{:#014x} {:?} {} {:?} data={} meta={} dlen={}",
                        record.address,
                        record.header.kind,
                        trailer.vid,
                        trailer.kind,
                        trailer.data_length,
                        trailer.meta_length,
                        location.disk_length
                    ),
                    _ => println!("{:#014x} {:?} (empty)", record.address, record.header.kind),
                }
            }
        }
    }

    Ok(())
}

fn print_super(disk: &Disk) {
    let s = disk.superblock();
    println!("device      {}", disk.config().device_path.display());
    println!("current     {:?} (time {})", s.current, s.timestamp);
    println!("size        {:#x}", s.total_size);
    println!("index       {:#x} +{:#x}", s.index_location[0], s.index_size);
    println!("arena table {:#x} +{:#x}", s.arena_table_location, s.arena_table_size);
    println!(
        "arenas      {:#x} {} x {:#x}",
        s.arena_region_start, s.arena_count, s.arena_size
    );
    println!("block size  {}", s.block_size);
    println!("root        {}", s.root_vid);
    println!("snapshot    {:#x}", s.last_snapshot_offset);
    println!("files       {} / {}", disk.file_count(), disk.index_capacity());
}

/// "512", "64K", "2M", "1G", "1T"
fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, shift) = match s.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&s[..s.len() - 1], 10),
        Some('M') => (&s[..s.len() - 1], 20),
        Some('G') => (&s[..s.len() - 1], 30),
        Some('T') => (&s[..s.len() - 1], 40),
        _ => (s, 0),
    };
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(1u64 << shift))
        .ok_or_else(|| format!("bad size {:?}", s))
}

/// "server.file.version", decimal or 0x-prefixed hex
fn parse_vid(s: &str) -> Result<Vid, String> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 3 {
        return Err(format!("bad vid {:?}: want server.file.version", s));
    }
    let num = |p: &str| -> Result<u64, String> {
        match p.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => p.parse(),
        }
        .map_err(|e| format!("bad vid {:?}: {}", s, e))
    };
    let version = parts[2]
        .parse::<i64>()
        .map_err(|e| format!("bad vid {:?}: {}", s, e))?;
    Ok(Vid::new(num(parts[0])?, num(parts[1])?, version))
}
