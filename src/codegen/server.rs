//! Implementación del servidor: opcodes, estructuras de desborde,
//! despachador y esqueletos de cliente.

use std::io::{self, Write};

use super::{dispatch::overflow_field, types, Context, Emitter, Settings};
use crate::{
    ir::{Interface, Method, Program, Side},
    output::EmitOptions,
    semantic::Class,
};

pub struct Server<'a, W> {
    cx: Context<'a, W>,
    options: EmitOptions,
}

impl<'a, W: Write> Emitter<'a, W> for Server<'a, W> {
    fn new(
        mut cx: Context<'a, W>,
        _program: &Program,
        settings: &Settings<'_>,
    ) -> io::Result<Self> {
        cx.provenance(settings, "server implementation")?;

        emit!(cx, "#include \"{}\"", settings.header_name)?;
        emit!(cx, "#include <stdbool.h>")?;

        Ok(Server {
            cx,
            options: settings.options,
        })
    }

    fn interface(&mut self, interface: &Interface) -> io::Result<()> {
        let cx = &mut self.cx;

        emit!(cx)?;
        emit!(cx, "enum {}_methods {{", interface.name)?;
        cx.nested(|cx| {
            emit!(cx, "_{}_op_undef,", interface.name)?;
            for method in &interface.methods {
                emit!(cx, "{},", types::opcode(interface, method))?;
            }

            Ok(())
        })?;

        emit!(cx, "}};")?;

        for method in &interface.methods {
            cx.overflow_structs(interface, method)?;
        }

        emit!(cx)?;
        cx.dispatcher(interface)?;

        if self.options.contains(EmitOptions::CLIENT_STUBS) {
            for method in &interface.methods {
                emit!(cx)?;
                cx.client_stub(interface, method)?;
            }
        }

        Ok(())
    }

    fn finish(mut self) -> io::Result<()> {
        self.cx.output().flush()
    }
}

impl<W: Write> Context<'_, W> {
    /// Declara las estructuras empacadas de un método.
    ///
    /// Los campos siguen el orden de declaración de los argumentos; las
    /// capacidades nunca forman parte de ellas.
    fn overflow_structs(&mut self, interface: &Interface, method: &Method) -> io::Result<()> {
        for (side, suffix) in [(Side::Request, "indata"), (Side::Reply, "outdata")] {
            if method.frame(side).overflow.is_none() {
                continue;
            }

            let name = types::overflow_struct(interface, method, suffix);

            emit!(self)?;
            emit!(self, "struct __attribute__((packed)) {} {{", name)?;

            self.nested(|cx| {
                for arg in method.overflow_fields(side) {
                    let field = overflow_field(arg, side);
                    match &arg.class {
                        Class::Scalar { ty, .. } => emit!(cx, "{} {};", ty, field)?,
                        _ => emit!(cx, "size_t {};", field)?,
                    }
                }

                Ok(())
            })?;

            emit!(self, "}};")?;
        }

        Ok(())
    }
}
