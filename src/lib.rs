//! Generador de stubs IPC.
//!
//! # Front end
//! Cada ejecución deriva de un único archivo IDL. Este archivo se
//! somete primero a análisis léxico en [`lex`], de lo cual se obtiene
//! un flujo de tokens. El flujo de tokens se dispone en bloques y
//! sentencias por medio de análisis sintáctico en [`parse`]. Los
//! bloques crudos son validados y clasificados por análisis semántico
//! en [`semantic`], lo cual produce el modelo de interfaces.
//!
//! # Back end
//! El modelo se asigna a los slots del formato de mensaje en
//! [`layout`], resultando en el plan descrito en [`ir`]. Finalmente,
//! [`target`] emite un encabezado y una implementación en C, los
//! cuales [`output`] escribe a disco.

#[macro_use]
mod macros;

pub mod error;
pub mod ir;
pub mod layout;
pub mod lex;
pub mod output;
pub mod parse;
pub mod semantic;
pub mod source;

mod codegen;

use error::Diagnostics;
use lex::Lexer;

/// Emisión de código.
///
/// Este módulo reexporta suficientes ítems internos relacionados a
/// generación de código para traducir un plan a C.
pub mod target {
    pub use crate::codegen::{emit, Settings};
}

/// Ejecuta todas las fases delanteras sobre un texto IDL.
///
/// En caso de éxito se obtiene el plan junto con las advertencias
/// acumuladas, posiblemente vacías. Los errores de una fase detienen
/// el proceso antes de la siguiente.
pub fn compile(text: &str, name: &str) -> Result<(ir::Program, Diagnostics), Diagnostics> {
    let (start, stream) = source::consume(text, name);

    let tokens = Lexer::new(start.clone(), stream).try_exhaustive()?;
    let idl = parse::parse(start, &tokens)?;
    let model = idl.resolve()?;

    let warnings = Diagnostics::from(model.notices).kind("warning");
    let program = layout::plan(&model.interfaces)?;

    Ok((program, warnings))
}
