use clap::{Parser, Subcommand};
use mobistrip::batch::{strip_many, Job};
use mobistrip::drm::KeySource;
use mobistrip::header::Encryption;
use mobistrip::info::BookInfo;
use mobistrip::stripper::{default_output_path, strip_file, Credential};
use mobistrip::pid_from_serial;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mobistrip", version, about = "Removes protection from Mobipocket books")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Credentials {
    /// PID to try; repeat or separate with commas for several
    #[arg(short, long)]
    pid: Vec<String>,
    /// Kindle or Kindle for iPhone serial number (16 or 40 characters)
    #[arg(short, long)]
    serial: Vec<String>,
}

impl Credentials {
    fn candidates(&self) -> Vec<Credential> {
        let mut out: Vec<Credential> = self.pid.iter().flat_map(|p| Credential::parse_list(p)).collect();
        out.extend(self.serial.iter().map(|s| Credential::Serial(s.clone())));
        out
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Decrypt one book
    Strip {
        input: PathBuf,
        /// Output path (default: input with a .mobi extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Print the PID for one or more device serials
    Pid {
        #[arg(required = true)]
        serial: Vec<String>,
    },
    /// Show header and DRM details of a book
    Info {
        input: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Decrypt several books into a directory
    Batch {
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        #[command(flatten)]
        credentials: Credentials,
        #[arg(required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Strip ────────────────────────────────────────────────────────────
        Commands::Strip { input, output, credentials } => {
            let output = output.unwrap_or_else(|| default_output_path(&input));
            let stripped = strip_file(&input, &output, &credentials.candidates())?;
            match stripped.key_source() {
                None                     => println!("Not encrypted, copied to: {}", output.display()),
                Some(KeySource::Pid)     => println!("Decrypted: {}", output.display()),
                Some(KeySource::Default) => println!("Decrypted (no PID needed): {}", output.display()),
            }
        }

        // ── Pid ──────────────────────────────────────────────────────────────
        Commands::Pid { serial } => {
            for s in &serial {
                println!("Mobipocket PID: {}", pid_from_serial(s)?);
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let info = BookInfo::inspect(&std::fs::read(&input)?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
                return Ok(());
            }
            let h = &info.header;
            println!("── Mobipocket book ──────────────────────────────────────");
            println!("  Path             {}", input.display());
            println!("  Name             {}", info.name);
            println!("  Size             {} B", info.size);
            println!("  Records          {}", info.records);
            println!("  Text records     {}", h.text_records);
            println!("  Header version   {}", h.mobi_version);
            println!("  Header length    {:#x}", h.mobi_length);
            println!("  Extra data flags {:#06b}", h.extra_data_flags);
            println!("  Encryption       {}", describe(h.encryption));
            if let Some(drm) = &info.drm {
                let d = &drm.descriptor;
                println!("  DRM table        offset {:#x}, {} entries, {} B, flags {:#x}",
                    d.offset, d.count, d.size, d.flags);
                for (i, e) in drm.entries.iter().enumerate() {
                    println!("    [{i}] verification {:08x}  checksum {:02x}  cookie {}…",
                        e.verification, e.checksum, hex::encode(&e.cookie[..8]));
                }
            }
        }

        // ── Batch ────────────────────────────────────────────────────────────
        Commands::Batch { output_dir, credentials, input } => {
            if !output_dir.exists() { std::fs::create_dir_all(&output_dir)?; }
            let jobs: Vec<Job> = input
                .into_iter()
                .map(|input| {
                    let name = default_output_path(&input);
                    let output = output_dir.join(name.file_name().unwrap_or(name.as_os_str()));
                    Job { input, output }
                })
                .collect();

            let reports = strip_many(&jobs, &credentials.candidates());
            let failed = reports.iter().filter(|r| !r.is_ok()).count();
            for r in &reports {
                match &r.error {
                    None    => println!("  ok      {} → {}", r.job.input.display(), r.job.output.display()),
                    Some(e) => println!("  failed  {}: {e}", r.job.input.display()),
                }
            }
            if failed > 0 {
                return Err(format!("{failed} of {} book(s) failed", reports.len()).into());
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn describe(e: Encryption) -> String {
    match e {
        Encryption::None       => "none".into(),
        Encryption::Legacy     => "type 1 (unsupported)".into(),
        Encryption::Pc1        => "type 2 (PC1)".into(),
        Encryption::Unknown(n) => format!("unknown ({n})"),
    }
}
