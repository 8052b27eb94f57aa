use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use ddw_core::format::{ddp2, ddp3, hxb};

#[derive(Parser, Debug)]
#[command(version, about = "Tooling for DDW engine archives and scripts")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract a DDP2 or DDP3 archive (or every *.dat in a folder)
    Extract { path: PathBuf },
    /// Pack a folder into a DDP2 archive
    Pack2 { path: PathBuf },
    /// Pack a folder into a DDP3 archive
    Pack3 { path: PathBuf },
    /// Export translatable strings from a script (or every *.hxb in a folder)
    Export {
        path: PathBuf,

        /// Export every string literal instead of the dialogue calls
        #[arg(long)]
        all: bool,
    },
    /// Rebuild a script, substituting translations from the matching .txt file
    Rebuild { path: PathBuf },
    /// Write a disassembly listing next to the script
    Disasm { path: PathBuf },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match args.command {
        Command::Extract { path } => for_each_file(&path, "dat", extract_archive),
        Command::Pack2 { path } => create_package(&path, 2),
        Command::Pack3 { path } => create_package(&path, 3),
        Command::Export { path, all } => for_each_file(&path, "hxb", |p| export_strings(p, all)),
        Command::Rebuild { path } => for_each_file(&path, "hxb", rebuild_script),
        Command::Disasm { path } => for_each_file(&path, "hxb", disasm_script),
    }
}

/// Apply `op` to one file, or to every `*.{ext}` in a folder. A failing
/// file is reported and the rest of the batch still runs.
fn for_each_file(path: &Path, ext: &str, mut op: impl FnMut(&Path) -> Result<()>) -> Result<()> {
    if !path.is_dir() {
        if let Err(e) = op(path) {
            log::error!("{}: {:#}", path.display(), e);
        }
        return Ok(());
    }

    let pattern = path.join(format!("*.{ext}"));
    for item in glob::glob(&pattern.to_string_lossy())? {
        match item {
            Ok(p) => {
                if let Err(e) = op(&p) {
                    log::error!("{}: {:#}", p.display(), e);
                }
            }
            Err(e) => log::error!("{e}"),
        }
    }

    Ok(())
}

fn extract_archive(path: &Path) -> Result<()> {
    log::info!("extracting {}", path.display());

    let output = path.with_extension("");
    if ddp2::valid(path)? {
        ddp2::extract(path, output)
    } else if ddp3::valid(path)? {
        ddp3::extract(path, output)
    } else {
        bail!("not a DDP2 or DDP3 archive");
    }
}

fn create_package(root: &Path, version: u32) -> Result<()> {
    let mut file_path = root.with_extension("dat");
    if file_path.exists() {
        file_path = root.with_extension("new.dat");
    }

    log::info!("creating package {}", file_path.display());

    match version {
        2 => ddp2::create(&file_path, root),
        _ => ddp3::create(&file_path, root),
    }
}

fn export_strings(path: &Path, all: bool) -> Result<()> {
    log::info!("exporting text from {}", path.display());

    let script = hxb::Script::load(path)?;
    let text = if all {
        script.export_all_strings()?
    } else {
        script.export_strings()?
    };

    fs::write(path.with_extension("txt"), text)?;
    Ok(())
}

fn rebuild_script(path: &Path) -> Result<()> {
    log::info!("rebuilding script {}", path.display());

    let text_path = path.with_extension("txt");
    let text = fs::read_to_string(&text_path)
        .with_context(|| format!("read {}", text_path.display()))?;

    let mut script = hxb::Script::load(path)?;
    script.import_strings(&text)?;

    let file_name = path.file_name().context("script path has no file name")?;
    let out_dir = path.parent().unwrap_or(Path::new(".")).join("rebuild");
    fs::create_dir_all(&out_dir)?;
    script.save(out_dir.join(file_name))?;

    Ok(())
}

fn disasm_script(path: &Path) -> Result<()> {
    log::info!("disassembling {}", path.display());

    let script = hxb::Script::load(path)?;
    let listing = script.disassembly_listing()?;

    fs::write(path.with_extension("asm.txt"), listing)?;
    Ok(())
}
