//! Seguimiento de buffers temporales dentro de un caso del despachador.
//!
//! Cada buffer reservado para una llamada debe liberarse en toda ruta
//! de salida. Las rutas de salida anticipada se emiten en el momento
//! en que ocurre una reserva, por lo cual solo liberan lo que ya
//! existía hasta ese punto.

use std::io::{self, Write};

use super::Context;
use crate::semantic::Identifier;

#[derive(Default)]
pub struct Allocations {
    buffers: Vec<Identifier>,
}

impl Allocations {
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl<W: Write> Context<'_, W> {
    /// Reserva `name` con capacidad `{name}_len` más un byte final.
    ///
    /// Si la reserva falla se responde con falta de memoria y se
    /// abandona el caso.
    pub fn allocate(
        &mut self,
        allocs: &mut Allocations,
        name: &Identifier,
        ty: &str,
    ) -> io::Result<()> {
        emit!(self, "{} *{1} = calloc({1}_len + 1, 1);", ty, name)?;
        emit!(self, "if (!{}) {{", name)?;

        self.nested(|cx| {
            emit!(cx, "ipcb_answer_nomem(msg);")?;
            cx.release(allocs)?;
            emit!(cx, "break;")
        })?;

        emit!(self, "}}")?;
        emit!(self)?;

        allocs.buffers.push(name.clone());
        Ok(())
    }

    /// Libera todo buffer reservado hasta ahora, en orden inverso.
    pub fn release(&mut self, allocs: &Allocations) -> io::Result<()> {
        for buffer in allocs.buffers.iter().rev() {
            emit!(self, "free({});", buffer)?;
        }

        Ok(())
    }
}
