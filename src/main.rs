use clap::{Parser, Subcommand};
use chnk::chunk::{Chunk, PackOptions, decompress_chunk_file};
use chnk::codec::DEFAULT_ZLIB_LEVEL;
use chnk::Variant;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chnk", about = "Pack and unpack CHNK block containers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the header, block table and decoded block sizes
    Info {
        input: PathBuf,
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Rewrite a container with every block stored uncompressed
    Decompress {
        input:  PathBuf,
        output: PathBuf,
        /// Write only the concatenated payloads
        #[arg(long)]
        no_header: bool,
    },
    /// Write every decoded block to its own file
    Extract {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Pack files into a container, one block per file, in argument order
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Use the alternate (little-endian) layout
        #[arg(long)]
        alternate: bool,
        /// Deflate each block with zlib, optionally at LEVEL (0-9, default 6)
        #[arg(short, long, value_name = "LEVEL", value_parser = clap::value_parser!(u32).range(0..=9))]
        compress: Option<Option<u32>>,
        /// Write only the concatenated payloads
        #[arg(long)]
        no_header: bool,
        #[arg(required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match Cli::parse().command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let (info, _) = Chunk::inspect(BufReader::new(File::open(&input)?))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
                return Ok(());
            }
            let h = &info.header;
            println!("── CHNK container ───────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Variant        {}", h.variant.name());
            println!("  Flags          {:#010x}", h.flags);
            println!("  Blocks         {}", h.block_count);
            println!("  Max block size {} B", h.max_block_size);
            println!("  Version        {} / {}", h.version, h.secondary_tag);
            println!("{:>5} {:>10} {:>10} {:>10} {:>5} {:>8}  Preview",
                     "#", "Offset", "Stored", "Size", "Zlib", "CRC32");
            for b in &info.blocks {
                println!("{:>5} {:>10} {:>10} {:>10} {:>5} {:08x}  {}",
                    b.index, b.offset, b.stored_size, b.size,
                    if b.compressed { "yes" } else { "no" }, b.crc32, b.preview);
            }
        }

        // ── Decompress ───────────────────────────────────────────────────────
        Commands::Decompress { input, output, no_header } => {
            let chunk = decompress_chunk_file(&input, &output, !no_header)?;
            println!("Wrote {} block(s) to {}", chunk.len(), output.display());
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir } => {
            let chunk = Chunk::read_strict(BufReader::new(File::open(&input)?))?;
            std::fs::create_dir_all(&output_dir)?;
            for (i, block) in chunk.entries.iter().enumerate() {
                let path = output_dir.join(format!("block_{i:04}.bin"));
                std::fs::write(&path, &block.data)?;
                println!("  {}  {} B", path.display(), block.len());
            }
            println!("Extracted {} block(s)", chunk.len());
        }

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, alternate, compress, no_header, input } => {
            let opts = PackOptions {
                variant:        if alternate { Variant::Alternate } else { Variant::Standard },
                compression:    compress.map(|level| level.unwrap_or(DEFAULT_ZLIB_LEVEL)),
                include_header: !no_header,
            };
            let payloads = input
                .iter()
                .map(std::fs::read)
                .collect::<Result<Vec<_>, _>>()?;
            let chunk = Chunk::pack(payloads, &opts)?;
            chunk.write_to_file(&output, opts.include_header)?;
            println!("Created: {} ({} block(s), {}{})",
                output.display(), chunk.len(), opts.variant.name(),
                match opts.compression {
                    Some(level) => format!(", zlib level {level}"),
                    None        => String::new(),
                });
        }
    }

    Ok(())
}
