//! Esqueletos de stubs de cliente.
//!
//! El transporte que construye la solicitud queda fuera de este
//! generador. Cada esqueleto documenta el plan de slots que su
//! implementación debe seguir y retorna un valor nulo.

use std::io::{self, Write};

use super::{types, Context};
use crate::{
    ir::{Interface, Method, Placement, Side, Slot},
    semantic::Direction,
};

impl<W: Write> Context<'_, W> {
    pub fn client_stub(&mut self, interface: &Interface, method: &Method) -> io::Result<()> {
        let stub = format!("{}_{}", interface.name, method.name);
        let handle = types::handle_type(&interface.name);

        emit!(self, "{}", types::prototype(&stub, &handle, method))?;
        emit!(self, "{{")?;

        self.nested(|cx| {
            let opcode = types::opcode(interface, method);
            emit!(cx, "// Request, {} in slot 1:", opcode)?;
            cx.layout_comment(interface, method, Side::Request)?;
            emit!(cx, "// Reply:")?;
            cx.layout_comment(interface, method, Side::Reply)?;

            if let Some(ty) = &method.retval {
                emit!(cx)?;
                emit!(cx, "{} rc = {{0}};", ty)?;
                emit!(cx, "return rc;")?;
            }

            Ok(())
        })?;

        emit!(self, "}}")
    }

    fn layout_comment(
        &mut self,
        interface: &Interface,
        method: &Method,
        side: Side,
    ) -> io::Result<()> {
        let mut slots = Vec::new();

        if side == Side::Reply && method.retval.is_some() {
            slots.push((Slot(0), String::from("return value")));
        }

        if let Some(slot) = method.frame(side).overflow {
            let suffix = match side {
                Side::Request => "indata",
                Side::Reply => "outdata",
            };

            let overflow = types::overflow_struct(interface, method, suffix);
            slots.push((slot, format!("struct {}", overflow)));
        }

        for arg in &method.args {
            let name = &arg.name;

            match arg.placement(side) {
                Placement::Direct(slot) => slots.push((slot, name.to_string())),
                Placement::Wide(Slot(slot)) => {
                    let what = format!("{} (wide, also slot {})", name, slot + 1);
                    slots.push((Slot(slot), what));
                }

                Placement::Object(slot) => slots.push((slot, format!("{} (capability)", name))),

                Placement::Bulk {
                    descriptor,
                    transfer,
                } => {
                    let (length, payload) = match (side, arg.direction) {
                        (Side::Request, Direction::In) => ("slice", "bulk payload"),
                        (Side::Request, _) => ("slice", "lent buffer"),
                        (Side::Reply, _) => ("len", "returned buffer"),
                    };

                    if let Some(slot) = descriptor {
                        slots.push((slot, format!("{}_{}", name, length)));
                    }

                    slots.push((transfer, format!("{} ({})", name, payload)));
                }

                Placement::Absent | Placement::Overflow => (),
            }
        }

        if slots.is_empty() {
            return emit!(self, "//   nothing");
        }

        slots.sort_by_key(|(slot, _)| *slot);
        for (slot, what) in slots {
            emit!(self, "//   slot {}: {}", slot, what)?;
        }

        Ok(())
    }
}
