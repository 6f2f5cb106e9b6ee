//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases de la generación y
//! expone una CLI.

use anyhow::{self, Context};
use clap::{self, crate_version, Arg, Command, ErrorKind};
use ipcgen::{
    output::{EmitOptions, Outputs, Provenance},
    target,
};

use std::{fs, path::PathBuf, process};

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let command = Command::new("ipcgen")
        .version(crate_version!())
        .about("Generates C server dispatchers and client stubs from an IPC interface file")
        .arg(path("input", "IDL", "Interface definition file"))
        .arg(path("c_output", "C_FILE", "Server implementation to write"))
        .arg(path("h_output", "H_FILE", "Header to write"));

    let args = match command.try_get_matches() {
        Ok(args) => args,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => error.exit(),
            _ => {
                // Un uso incorrecto termina con código 1, no con el 2 de clap
                let _ = error.print();
                process::exit(1);
            }
        },
    };

    // Se extraen argumentos necesarios
    let path_of = |name: &str| match args.get_one::<PathBuf>(name) {
        Some(path) => path.clone(),
        None => unreachable!(),
    };

    let input = path_of("input");
    let c_output = path_of("c_output");
    let h_output = path_of("h_output");

    let text = fs::read_to_string(&input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;

    let (program, warnings) = match ipcgen::compile(&text, &input.display().to_string()) {
        Ok(result) => result,
        Err(errors) => {
            eprint!("{}", errors);
            process::exit(1);
        }
    };

    if !warnings.is_empty() {
        eprint!("{}", warnings);
    }

    let provenance = Provenance::of(&input)
        .with_context(|| format!("Failed to stat input file: {}", input.display()))?;

    let mut outputs = Outputs::create(&c_output, &h_output)
        .context("Failed to open output files")?;
    let header_name = outputs.header_name().to_owned();

    let settings = target::Settings {
        options: EmitOptions::all(),
        provenance: &provenance,
        header_name: &header_name,
    };

    let (source, header) = outputs.streams();
    target::emit(&program, &settings, source, header).with_context(|| {
        format!(
            "Failed to emit to files: {}, {}",
            c_output.display(),
            h_output.display()
        )
    })?;

    outputs.finish().context("Failed to flush output files")?;
    Ok(())
}

fn path(name: &'static str, value_name: &'static str, help: &'static str) -> Arg<'static> {
    Arg::new(name)
        .required(true)
        .takes_value(true)
        .value_name(value_name)
        .value_parser(clap::value_parser!(PathBuf))
        .help(help)
}
