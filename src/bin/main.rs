//! This is the main entry point of the FAT explorer.
//!
//! The program opens a FAT12/16/32 volume image and runs the requested
//! commands in a fixed order: info, list, print, save.

use fat_explorer::commands::{save_destination, Command, CommandError, Invocation, USAGE};
use fat_explorer::render::TreePrinter;
use fat_explorer::traits::LayoutDisplay;
use fat_explorer::Volume;
use log::{error, info};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::{env, process};

fn main() {
    let invocation = Invocation::from_args(env::args().skip(1));
    let verbosity = invocation.as_ref().map_or(0, |inv| inv.verbosity);

    if let Err(err) = stderrlog::new()
        .module(module_path!())
        .module("fat_explorer")
        .verbosity(1 + verbosity)
        .init()
    {
        eprintln!("Logger initialization failed: {err}");
    }

    let invocation = match invocation {
        Ok(invocation) => invocation,
        Err(err) => {
            error!("{err}");
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    if invocation.help {
        println!("{USAGE}");
        return;
    }

    let Some(image) = &invocation.image else {
        error!("{}", CommandError::MissingImage);
        process::exit(2);
    };

    let volume = match Volume::<File>::from_path(image, invocation.validate) {
        Ok(volume) => volume,
        Err(err) => {
            error!("Cannot open {}: {err}", image.display());
            process::exit(1);
        }
    };

    let mut failed = false;
    for command in &invocation.commands {
        if let Err(err) = run(&volume, command) {
            error!("{err}");
            failed = true;
        }
    }

    if failed {
        process::exit(1);
    }
}

/// Runs one command against the opened volume.
fn run(volume: &Volume<File>, command: &Command) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::Info { path, depth } => {
            let path = match path {
                Some(path) => path.as_str(),
                None => {
                    let info = volume.describe()?;
                    write!(out, "{}", volume.geometry())?;
                    writeln!(out, "OEM name: {}", info.oem_name())?;
                    writeln!(out, "Volume ID: 0x{:08X}", info.volume_id())?;
                    if let Some(label) = info.label() {
                        writeln!(out, "Volume label: {label}")?;
                    }
                    writeln!(out)?;
                    write!(out, "{}", volume.display_layout(3)?)?;
                    writeln!(out, "======= Root Directory =======")?;
                    "/"
                }
            };
            let node = volume.resolve(path)?;
            TreePrinter::new(true, *depth).print(volume, node, &mut out)?;
        }
        Command::List { path, depth } => {
            let node = volume.resolve(path.as_deref().unwrap_or("/"))?;
            TreePrinter::new(false, *depth).print(volume, node, &mut out)?;
        }
        Command::Print { path } => {
            let node = volume.resolve(path)?;
            volume.read_file(node, &mut out)?;
            writeln!(out)?;
        }
        Command::Save { from, to } => {
            let node = volume.resolve(from.as_deref().unwrap_or("/"))?;
            let dest = save_destination(Path::new(to), &node.name(), node.is_dir())?;
            info!("Extracting `{}` to {}", node.name(), dest.display());
            volume.write_tree(node, &dest)?;
        }
    }

    out.flush()?;
    Ok(())
}
