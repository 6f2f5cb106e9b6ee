//! Representación intermedia: el plan de slots.
//!
//! Este es el modelo semántico con cada decisión de transporte ya
//! resuelta. La generación de código recorre estas estructuras sin
//! volver a calcular índices ni demandas.

use std::fmt::{self, Display};

use crate::semantic::{Class, Direction, Identifier};

/// Cantidad de slots de propósito general por mensaje.
pub const SLOT_COUNT: usize = 6;

/// Primer slot de argumentos en una solicitud; el 0 es el destino de
/// la respuesta y el 1 lleva el opcode.
pub const REQUEST_BASE: usize = 2;

/// Demanda máxima en línea de una solicitud antes de fusionar.
pub const REQUEST_INLINE: usize = 4;

/// Demanda máxima en línea de una respuesta sin valor de retorno.
pub const REPLY_INLINE: usize = 6;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(pub usize);

impl Display for Slot {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

/// Sentido de un mensaje.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    Request,
    Reply,
}

impl Display for Side {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Request => fmt.write_str("request"),
            Side::Reply => fmt.write_str("reply"),
        }
    }
}

#[derive(Debug)]
pub struct Program {
    pub interfaces: Vec<Interface>,
}

#[derive(Debug)]
pub struct Interface {
    pub name: Identifier,
    pub methods: Vec<Method>,
}

#[derive(Debug)]
pub struct Method {
    pub name: Identifier,
    pub opcode: u32,
    pub retval: Option<Identifier>,
    pub args: Vec<Arg>,
    pub request: Frame,
    pub reply: Frame,
}

/// Resumen del plan para un sentido.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Slots equivalentes que pedirían los argumentos en línea.
    pub demand: usize,

    /// Algún escalar por referencia obliga a usar estructura de desborde.
    pub indirect: bool,

    /// Todos los campos elegibles viajan en la estructura de desborde.
    pub merged: bool,

    /// Slot de la estructura de desborde, si existe.
    pub overflow: Option<Slot>,

    /// Uno más que el último slot ocupado.
    pub used: usize,
}

#[derive(Clone, Debug)]
pub struct Arg {
    pub name: Identifier,
    pub direction: Direction,
    pub class: Class,
    pub request: Placement,
    pub reply: Placement,
}

/// Ubicación de un argumento dentro de un mensaje.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    /// No participa en este sentido.
    Absent,

    /// Escalar en un único slot.
    Direct(Slot),

    /// Escalar de doble ancho en este slot y el siguiente.
    Wide(Slot),

    /// Capacidad transferida en su propio slot.
    Object(Slot),

    /// Campo de la estructura de desborde.
    Overflow,

    /// Datos variables. `descriptor` es `None` cuando la longitud viaja
    /// en la estructura de desborde; `transfer` lleva el blob o la
    /// capacidad de buffer.
    Bulk {
        descriptor: Option<Slot>,
        transfer: Slot,
    },
}

impl Placement {
    /// Índice principal, o `None` si el valor vive solo en la
    /// estructura de desborde.
    pub fn index(&self) -> Option<Slot> {
        match *self {
            Placement::Absent | Placement::Overflow => None,
            Placement::Direct(slot) | Placement::Wide(slot) | Placement::Object(slot) => Some(slot),
            Placement::Bulk {
                descriptor,
                transfer,
            } => descriptor.or(Some(transfer)),
        }
    }

    /// Todos los slots que ocupa.
    pub fn slots(&self) -> Vec<Slot> {
        match *self {
            Placement::Absent | Placement::Overflow => vec![],
            Placement::Direct(slot) | Placement::Object(slot) => vec![slot],
            Placement::Wide(Slot(slot)) => vec![Slot(slot), Slot(slot + 1)],
            Placement::Bulk {
                descriptor,
                transfer,
            } => descriptor.into_iter().chain(Some(transfer)).collect(),
        }
    }
}

impl Method {
    pub fn merge_inputs(&self) -> bool {
        self.request.merged
    }

    pub fn merge_outputs(&self) -> bool {
        self.reply.merged
    }

    pub fn has_indata(&self) -> bool {
        self.request.overflow.is_some()
    }

    pub fn has_outdata(&self) -> bool {
        self.reply.overflow.is_some()
    }

    pub fn indata_index(&self) -> Option<Slot> {
        self.request.overflow
    }

    pub fn outdata_index(&self) -> Option<Slot> {
        self.reply.overflow
    }

    /// Argumentos que forman la estructura de desborde de un sentido.
    pub fn overflow_fields(&self, side: Side) -> impl Iterator<Item = &Arg> {
        self.args.iter().filter(move |arg| match arg.placement(side) {
            Placement::Overflow => true,
            Placement::Bulk { descriptor, .. } => descriptor.is_none(),
            _ => false,
        })
    }

    /// Slots ocupados en un sentido, incluyendo los reservados.
    pub fn slots(&self, side: Side) -> Vec<Slot> {
        let frame = self.frame(side);
        let reserved = match side {
            Side::Request => None,
            Side::Reply => self.retval.as_ref().map(|_| Slot(0)),
        };

        reserved
            .into_iter()
            .chain(frame.overflow)
            .chain(self.args.iter().flat_map(|arg| arg.placement(side).slots()))
            .collect()
    }

    pub fn frame(&self, side: Side) -> &Frame {
        match side {
            Side::Request => &self.request,
            Side::Reply => &self.reply,
        }
    }
}

impl Arg {
    pub fn in_slot_index(&self) -> Option<Slot> {
        self.request.index()
    }

    pub fn out_slot_index(&self) -> Option<Slot> {
        self.reply.index()
    }

    pub fn placement(&self, side: Side) -> Placement {
        match side {
            Side::Request => self.request,
            Side::Reply => self.reply,
        }
    }
}
