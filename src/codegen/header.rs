//! Encabezado público: tipos opacos, tabla de operaciones y prototipos.

use std::io::{self, Write};

use super::{types, Context, Emitter, Settings};
use crate::ir::{Interface, Program};

pub struct Header<'a, W> {
    cx: Context<'a, W>,
}

impl<'a, W: Write> Emitter<'a, W> for Header<'a, W> {
    fn new(mut cx: Context<'a, W>, program: &Program, settings: &Settings<'_>) -> io::Result<Self> {
        cx.provenance(settings, "interface declarations")?;

        emit!(cx, "#pragma once")?;
        emit!(cx)?;
        emit!(cx, "#include <stddef.h>")?;
        emit!(cx, "#include <stdlib.h>")?;
        emit!(cx, "#include <ipc_b.h>")?;

        // Toda interfaz puede aparecer como tipo de capacidad en otra
        for interface in &program.interfaces {
            let name = &interface.name;

            let this = types::impl_type(name);

            emit!(cx)?;
            emit!(cx, "typedef struct {}_impl {};", name, this)?;
            emit!(cx, "typedef struct {} {};", name, types::handle_type(name))?;
            emit!(cx, "typedef struct {}_ops {};", name, types::ops_type(name))?;
        }

        Ok(Header { cx })
    }

    fn interface(&mut self, interface: &Interface) -> io::Result<()> {
        let cx = &mut self.cx;
        let name = &interface.name;
        let this = types::impl_type(name);

        emit!(cx)?;
        emit!(cx, "struct {}_ops {{", name)?;
        cx.nested(|cx| {
            emit!(cx, "size_t _sizeof;")?;
            emit!(
                cx,
                "void (*_handle_message)({} *self, const ipc_message_t *msg);",
                this
            )?;
            emit!(cx, "void (*_destroy)({} *self);", this)?;

            for method in &interface.methods {
                let retval = types::retval(method);
                let params = types::param_list(&this, method);
                emit!(cx, "{} (*{})({});", retval, method.name, params)?;
            }

            Ok(())
        })?;

        emit!(cx, "}};")?;
        emit!(cx)?;
        emit!(cx, "{};", types::handle_message(name))?;
        emit!(cx)?;

        let handle = types::handle_type(name);
        for method in &interface.methods {
            let stub = format!("{}_{}", name, method.name);
            emit!(cx, "{};", types::prototype(&stub, &handle, method))?;
        }

        Ok(())
    }

    fn finish(mut self) -> io::Result<()> {
        self.cx.output().flush()
    }
}
