//! Despachador del servidor.
//!
//! Para cada mensaje entrante:
//!
//! 1. Los mensajes marcados con error de protocolo se descartan sin
//!    respuesta.
//! 2. Los mensajes automáticos nunca se responden; si además indican
//!    que el objeto fue soltado, se invoca `_destroy`.
//! 3. El opcode en el slot 1 selecciona un caso. Un opcode desconocido,
//!    un handler nulo o un handler que no cabe en el `_sizeof` que
//!    reporta la tabla producen un error de protocolo.
//! 4. Cada caso reconstruye argumentos según el plan, invoca al handler,
//!    responde y libera sus buffers.
//! 5. Si el mensaje original indicaba que el objeto fue soltado, se
//!    invoca `_destroy` solo después de responder.

use std::io::{self, Write};

use super::{allocs::Allocations, types, Context};
use crate::{
    ir::{Arg, Interface, Method, Placement, Side},
    semantic::{Class, Direction, Payload},
};

impl<W: Write> Context<'_, W> {
    pub fn dispatcher(&mut self, interface: &Interface) -> io::Result<()> {
        let ops = types::ops_type(&interface.name);

        emit!(self, "{}", types::handle_message(&interface.name))?;
        emit!(self, "{{")?;

        self.nested(|cx| {
            emit!(cx, "{0} *ops = *({0} **) self;", ops)?;
            emit!(cx, "bool dropped = ipcb_is_dropped(msg);")?;
            emit!(cx)?;
            emit!(cx, "if (ipcb_is_protocol_error(msg))")?;
            cx.nested(|cx| emit!(cx, "return;"))?;
            emit!(cx)?;
            emit!(cx, "if (ipcb_is_automatic(msg)) {{")?;

            cx.nested(|cx| {
                cx.destroy()?;
                emit!(cx)?;
                emit!(cx, "return;")
            })?;

            emit!(cx, "}}")?;
            emit!(cx)?;
            emit!(cx, "switch (ipcb_get_val_1(msg)) {{")?;

            for method in &interface.methods {
                emit!(cx, "case {}: {{", types::opcode(interface, method))?;
                cx.nested(|cx| cx.case(interface, method))?;
                emit!(cx, "}}")?;
                emit!(cx)?;
            }

            emit!(cx, "default:")?;
            cx.nested(|cx| {
                emit!(cx, "ipcb_answer_protocol_error(msg);")?;
                emit!(cx, "break;")
            })?;

            emit!(cx, "}}")?;
            emit!(cx)?;
            cx.destroy()
        })?;

        emit!(self, "}}")
    }

    fn destroy(&mut self) -> io::Result<()> {
        emit!(self, "if (dropped && ops->_destroy)")?;
        self.nested(|cx| emit!(cx, "ops->_destroy(self);"))
    }

    fn case(&mut self, interface: &Interface, method: &Method) -> io::Result<()> {
        let name = &method.name;
        let ops = types::ops_type(&interface.name);

        // La tabla puede provenir de una versión anterior y más pequeña
        emit!(
            self,
            "if (offsetof({0}, {1}) + sizeof(ops->{1}) > ops->_sizeof || !ops->{1}) {{",
            ops,
            name
        )?;

        self.nested(|cx| {
            emit!(cx, "ipcb_answer_protocol_error(msg);")?;
            emit!(cx, "break;")
        })?;

        emit!(self, "}}")?;
        emit!(self)?;

        if let Some(slot) = method.indata_index() {
            let indata = types::overflow_struct(interface, method, "indata");
            emit!(self, "struct {} _indata;", indata)?;
            emit!(
                self,
                "ipcb_blob_read_{}(msg, &_indata, sizeof(_indata));",
                slot
            )?;
            emit!(self)?;
        }

        let mut allocs = Allocations::default();
        let mut pending = false;

        for arg in &method.args {
            match &arg.class {
                Class::Bulk(payload) => {
                    if pending {
                        emit!(self)?;
                        pending = false;
                    }

                    self.receive_bulk(arg, *payload, &mut allocs)?;
                }

                _ => {
                    self.receive(arg)?;
                    pending = true;
                }
            }
        }

        if pending {
            emit!(self)?;
        }

        self.invoke(method)?;

        for arg in &method.args {
            if let (Class::Bulk(_), true) = (&arg.class, arg.direction.is_output()) {
                self.write_back(arg)?;
            }
        }

        self.answer(interface, method)?;

        if !allocs.is_empty() {
            emit!(self)?;
            self.release(&allocs)?;
        }

        emit!(self, "break;")
    }

    /// Declara e inicializa la local de un escalar o una capacidad.
    fn receive(&mut self, arg: &Arg) -> io::Result<()> {
        let name = &arg.name;

        match (&arg.class, arg.request) {
            (Class::Scalar { ty, .. }, Placement::Direct(slot)) => {
                emit!(self, "{} {} = ipcb_get_val_{}(msg);", ty, name, slot)
            }

            (Class::Scalar { ty, .. }, Placement::Wide(slot)) => {
                emit!(self, "{} {} = ipcb_get_val64_{}(msg);", ty, name, slot)
            }

            (Class::Scalar { ty, .. }, Placement::Overflow) => {
                emit!(self, "{} {1} = _indata.{1};", ty, name)
            }

            (Class::Scalar { ty, .. }, _) => emit!(self, "{} {} = {{0}};", ty, name),

            (Class::Object { ty }, Placement::Object(slot)) => {
                emit!(self, "{}_t *{} = ipcb_get_obj_{}(msg);", ty, name, slot)
            }

            (Class::Object { ty }, _) => emit!(self, "{}_t *{} = NULL;", ty, name),

            (Class::Bulk(_), _) => unreachable!(),
        }
    }

    /// Reconstruye datos variables en un buffer propio.
    ///
    /// Las entradas se leen como blob. Las salidas llegan como un buffer
    /// prestado por el cliente, del cual las entradas-salidas toman su
    /// contenido inicial.
    fn receive_bulk(
        &mut self,
        arg: &Arg,
        payload: Payload,
        allocs: &mut Allocations,
    ) -> io::Result<()> {
        let name = &arg.name;
        let (descriptor, transfer) = match arg.request {
            Placement::Bulk {
                descriptor,
                transfer,
            } => (descriptor, transfer),

            _ => unreachable!(),
        };

        match descriptor {
            Some(slot) => emit!(self, "size_t {}_slice = ipcb_get_val_{}(msg);", name, slot)?,
            None => emit!(self, "size_t {0}_slice = _indata.{0}_slice;", name)?,
        }

        emit!(self, "size_t {0}_len = ipcb_slice_len({0}_slice);", name)?;
        self.allocate(allocs, name, types::buffer_type(payload))?;

        if arg.direction == Direction::In {
            emit!(
                self,
                "ipcb_bulk_read_{}(msg, {1}, {1}_slice);",
                transfer,
                name
            )?;
        } else {
            emit!(
                self,
                "ipc_buffer_t *{}_obj = ipcb_get_obj_{}(msg);",
                name,
                transfer
            )?;

            emit!(self, "size_t {0}_cap = {0}_len;", name)?;

            if arg.direction == Direction::InOut {
                emit!(
                    self,
                    "ipcb_buffer_read({0}_obj, {0}_slice, {0}, {0}_len);",
                    name
                )?;
            }
        }

        if payload == Payload::CString && arg.direction.is_input() {
            emit!(self, "{0}[{0}_len] = '\\0';", name)?;
        }

        emit!(self)
    }

    fn invoke(&mut self, method: &Method) -> io::Result<()> {
        let mut args = vec![String::from("self")];
        args.extend(method.args.iter().flat_map(types::call_args));

        let call = format!("ops->{}({})", method.name, args.join(", "));
        match &method.retval {
            Some(ty) => emit!(self, "{} rc = {};", ty, call)?,
            None => emit!(self, "{};", call)?,
        }

        emit!(self)
    }

    /// Devuelve un resultado variable a través del buffer prestado,
    /// sin exceder su capacidad.
    fn write_back(&mut self, arg: &Arg) -> io::Result<()> {
        let name = &arg.name;

        emit!(self, "if ({0}_len > {0}_cap)", name)?;
        self.nested(|cx| emit!(cx, "{0}_len = {0}_cap;", name))?;
        emit!(self)?;
        emit!(
            self,
            "ipcb_buffer_write({0}_obj, {0}_slice, {0}, {0}_len);",
            name
        )?;
        emit!(self)
    }

    fn answer(&mut self, interface: &Interface, method: &Method) -> io::Result<()> {
        let rc = if method.retval.is_some() { "rc" } else { "0" };
        emit!(
            self,
            "ipc_message_t answer = ipcb_start_answer(msg, {});",
            rc
        )?;

        if let Some(slot) = method.outdata_index() {
            let outdata = types::overflow_struct(interface, method, "outdata");
            emit!(self, "struct {} _outdata = {{", outdata)?;

            self.nested(|cx| {
                for arg in method.overflow_fields(Side::Reply) {
                    let field = overflow_field(arg, Side::Reply);
                    emit!(cx, ".{0} = {0},", field)?;
                }

                Ok(())
            })?;

            emit!(self, "}};")?;
            emit!(
                self,
                "ipcb_blob_write_{}(&answer, &_outdata, sizeof(_outdata));",
                slot
            )?;
        }

        for arg in &method.args {
            let name = &arg.name;

            match arg.reply {
                Placement::Direct(n) => emit!(self, "ipcb_set_val_{}(&answer, {});", n, name)?,
                Placement::Wide(n) => emit!(self, "ipcb_set_val64_{}(&answer, {});", n, name)?,
                Placement::Object(n) => emit!(self, "ipcb_set_obj_{}(&answer, {});", n, name)?,

                Placement::Bulk {
                    descriptor,
                    transfer,
                } => {
                    if let Some(slot) = descriptor {
                        emit!(self, "ipcb_set_val_{}(&answer, {}_len);", slot, name)?;
                    }

                    emit!(self, "ipcb_set_obj_{}(&answer, {}_obj);", transfer, name)?;
                }

                Placement::Absent | Placement::Overflow => (),
            }
        }

        emit!(self, "ipcb_send_answer(msg, answer);")
    }
}

/// Nombre del campo que un argumento ocupa en una estructura de desborde.
pub fn overflow_field(arg: &Arg, side: Side) -> String {
    match (&arg.class, side) {
        (Class::Bulk(_), Side::Request) => format!("{}_slice", arg.name),
        (Class::Bulk(_), Side::Reply) => format!("{}_len", arg.name),
        _ => arg.name.to_string(),
    }
}
