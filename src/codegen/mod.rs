//! Generación de código C.
//!
//! A partir de un mismo plan se producen dos unidades: el encabezado
//! ([`header`]) y la implementación del servidor ([`server`]). Ambas
//! implementan [`Emitter`] y se recorren interfaz por interfaz, en el
//! orden de declaración.

use std::{
    fmt,
    io::{self, Write},
};

use crate::{
    ir::{Interface, Program},
    output::{EmitOptions, Provenance},
};

mod allocs;
mod client;
mod dispatch;
mod header;
mod server;
mod types;

/// Parámetros comunes a ambas unidades.
pub struct Settings<'s> {
    pub options: EmitOptions,
    pub provenance: &'s Provenance,

    /// Nombre con el que la implementación incluye al encabezado.
    pub header_name: &'s str,
}

/// Emite implementación y encabezado para un programa ya planificado.
pub fn emit<S, H>(
    program: &Program,
    settings: &Settings<'_>,
    source: &mut S,
    header: &mut H,
) -> io::Result<()>
where
    S: Write,
    H: Write,
{
    write_unit::<_, header::Header<H>>(program, settings, header)?;
    write_unit::<_, server::Server<S>>(program, settings, source)
}

fn write_unit<'a, W, E>(
    program: &Program,
    settings: &Settings<'_>,
    output: &'a mut W,
) -> io::Result<()>
where
    W: Write,
    E: Emitter<'a, W>,
{
    let mut emitter = E::new(Context::new(output), program, settings)?;
    for interface in &program.interfaces {
        emitter.interface(interface)?;
    }

    emitter.finish()
}

/// Emisión de una unidad de C.
pub trait Emitter<'a, W: Write>: Sized {
    /// Construye a partir de un contexto de emisión.
    ///
    /// El preámbulo de la unidad, incluyendo lo que dependa de todas
    /// las interfaces a la vez, se emite aquí.
    fn new(cx: Context<'a, W>, program: &Program, settings: &Settings<'_>) -> io::Result<Self>;

    /// Emite las declaraciones o definiciones de una interfaz.
    fn interface(&mut self, interface: &Interface) -> io::Result<()>;

    /// Termina la unidad.
    fn finish(self) -> io::Result<()>;
}

/// Flujo de salida con sangría.
pub struct Context<'a, W> {
    output: &'a mut W,
    indent: usize,
}

impl<'a, W: Write> Context<'a, W> {
    pub fn new(output: &'a mut W) -> Self {
        Context { output, indent: 0 }
    }

    pub fn output(&mut self) -> &mut W {
        &mut *self.output
    }

    /// Escribe una línea al nivel de sangría actual.
    pub fn line(&mut self, line: fmt::Arguments<'_>) -> io::Result<()> {
        for _ in 0..self.indent {
            self.output.write_all(b"\t")?;
        }

        self.output.write_fmt(line)?;
        self.output.write_all(b"\n")
    }

    /// Escribe una línea vacía, sin sangría.
    pub fn blank(&mut self) -> io::Result<()> {
        self.output.write_all(b"\n")
    }

    /// Emite `body` con un nivel adicional de sangría.
    pub fn nested<F>(&mut self, body: F) -> io::Result<()>
    where
        F: FnOnce(&mut Self) -> io::Result<()>,
    {
        self.indent += 1;
        let result = body(self);
        self.indent -= 1;

        result
    }

    /// Comentario de procedencia al inicio de una unidad.
    fn provenance(&mut self, settings: &Settings<'_>, unit: &str) -> io::Result<()> {
        if !settings.options.contains(EmitOptions::PROVENANCE) {
            return Ok(());
        }

        let provenance = settings.provenance;
        emit!(self, "// Autogenerated IPC {}, do not edit.", unit)?;
        emit!(self, "// Source: {}", provenance.input())?;

        match provenance.modified() {
            Some(seconds) => emit!(self, "// Source timestamp: {}", seconds)?,
            None => emit!(self, "// Source timestamp: unknown")?,
        }

        emit!(self)
    }
}

#[cfg(test)]
mod tests;
