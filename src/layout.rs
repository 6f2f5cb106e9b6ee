//! Asignación de slots.
//!
//! # Demanda
//! Cada argumento pide una cantidad de slots equivalentes en cada
//! sentido en el que participa:
//!
//! - datos variables: 2 (descriptor y transferencia), fusionados o no;
//! - capacidades: 1, nunca se fusionan;
//! - escalares por referencia: 0, pero activan la bandera `indirect`;
//! - escalares directos: 1, o 2 si son anchos.
//!
//! Un sentido se fusiona cuando `demanda + indirect` excede su límite
//! en línea: 4 para solicitudes, 6 para respuestas (5 si hay valor de
//! retorno). Al fusionar, todo escalar y todo descriptor de datos
//! variables de ese sentido pasa a la estructura de desborde.
//!
//! # Índices
//! Las solicitudes inician en el slot 2 y las respuestas en el 0. Se
//! asigna primero el valor de retorno (solo respuestas), luego la
//! estructura de desborde y por último cada argumento en orden de
//! declaración. Un plan que requiera más de [`SLOT_COUNT`] slots es
//! inexpresable en el formato de mensaje.

use thiserror::Error;

use crate::{
    ir::{
        self, Frame, Placement, Side, Slot, REPLY_INLINE, REQUEST_BASE, REQUEST_INLINE, SLOT_COUNT,
    },
    semantic::{self, Class, Identifier, Passing, Width},
    source::Located,
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error(
        "Method `{method}` needs {used} {side} slots, the message format has {}",
        SLOT_COUNT
    )]
    SlotBudget {
        method: Identifier,
        side: Side,
        used: usize,
    },
}

/// Planifica todas las interfaces que declaran al menos un método.
///
/// Los métodos inexpresables se reportan todos juntos.
pub fn plan(interfaces: &[semantic::ObjType]) -> Result<ir::Program, Vec<Located<LayoutError>>> {
    let mut errors = Vec::new();
    let mut planned = Vec::new();

    let declared = interfaces
        .iter()
        .filter(|interface| !interface.methods.is_empty());

    for interface in declared {
        let mut methods = Vec::new();
        for (opcode, method) in (1..).zip(&interface.methods) {
            match plan_method(method, opcode) {
                Ok(method) => methods.push(method),
                Err(error) => errors.push(error),
            }
        }

        planned.push(ir::Interface {
            name: interface.name.val().clone(),
            methods,
        });
    }

    if errors.is_empty() {
        Ok(ir::Program {
            interfaces: planned,
        })
    } else {
        Err(errors)
    }
}

fn plan_method(method: &semantic::Method, opcode: u32) -> Result<ir::Method, Located<LayoutError>> {
    let args = &method.args;

    let mut request = Planner::new(Side::Request, args, REQUEST_BASE, REQUEST_INLINE);
    let requests: Vec<_> = args.iter().map(|arg| request.place(arg)).collect();

    let reply_inline = REPLY_INLINE - method.retval.is_some() as usize;
    let reply_base = method.retval.is_some() as usize;

    let mut reply = Planner::new(Side::Reply, args, reply_base, reply_inline);
    let replies: Vec<_> = args.iter().map(|arg| reply.place(arg)).collect();

    let args = args
        .iter()
        .zip(requests.into_iter().zip(replies))
        .map(|(arg, (request, reply))| ir::Arg {
            name: arg.name.val().clone(),
            direction: arg.direction,
            class: arg.class.clone(),
            request,
            reply,
        })
        .collect();

    let (request, reply) = (request.finish(), reply.finish());
    for (side, frame) in [(Side::Request, &request), (Side::Reply, &reply)] {
        if frame.used > SLOT_COUNT {
            let error = LayoutError::SlotBudget {
                method: method.name.val().clone(),
                side,
                used: frame.used,
            };

            return Err(Located::at(error, method.name.location().clone()));
        }
    }

    Ok(ir::Method {
        name: method.name.val().clone(),
        opcode,
        retval: method.retval.clone(),
        args,
        request,
        reply,
    })
}

/// Determina si un argumento viaja en un sentido.
///
/// Los datos variables de salida también aparecen en la solicitud: el
/// cliente presta el buffer donde se escribirá el resultado.
pub fn participates(arg: &semantic::Arg, side: Side) -> bool {
    match (side, &arg.class) {
        (Side::Request, Class::Bulk(_)) => true,
        (Side::Request, _) => arg.direction.is_input(),
        (Side::Reply, _) => arg.direction.is_output(),
    }
}

/// Asignador de slots para un sentido.
struct Planner {
    side: Side,
    frame: Frame,
    next: usize,
}

impl Planner {
    fn new(side: Side, args: &[semantic::Arg], base: usize, inline: usize) -> Self {
        let mut demand = 0;
        let mut indirect = false;
        let mut eligible = false;

        for arg in args.iter().filter(|arg| participates(arg, side)) {
            demand += match &arg.class {
                Class::Bulk(_) => 2,
                Class::Object { .. } => 1,
                Class::Scalar {
                    passing: Passing::Reference,
                    ..
                } => {
                    indirect = true;
                    0
                }

                Class::Scalar {
                    width: Width::Wide, ..
                } => 2,

                Class::Scalar { .. } => 1,
            };

            eligible |= !matches!(arg.class, Class::Object { .. });
        }

        let merged = demand + indirect as usize > inline;
        let mut planner = Planner {
            side,
            frame: Frame {
                demand,
                indirect,
                merged,
                overflow: None,
                used: base,
            },
            next: base,
        };

        // Una estructura sin campos no es expresable en C
        if (merged || indirect) && eligible {
            planner.frame.overflow = Some(planner.take(1));
        }

        planner
    }

    fn place(&mut self, arg: &semantic::Arg) -> Placement {
        if !participates(arg, self.side) {
            return Placement::Absent;
        }

        let merged = self.frame.merged;
        match &arg.class {
            Class::Bulk(_) => Placement::Bulk {
                descriptor: (!merged).then(|| self.take(1)),
                transfer: self.take(1),
            },

            Class::Object { .. } => Placement::Object(self.take(1)),

            Class::Scalar { passing, .. } if merged || *passing == Passing::Reference => {
                Placement::Overflow
            }

            Class::Scalar {
                width: Width::Wide, ..
            } => Placement::Wide(self.take(2)),

            Class::Scalar { .. } => Placement::Direct(self.take(1)),
        }
    }

    fn take(&mut self, count: usize) -> Slot {
        let slot = Slot(self.next);
        self.next += count;

        slot
    }

    fn finish(self) -> Frame {
        Frame {
            used: self.next,
            ..self.frame
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lex::Lexer,
        parse,
        semantic::{Direction, Payload},
        source,
    };

    use proptest::prelude::*;

    fn plan_str(text: &str) -> Result<ir::Program, Vec<Located<LayoutError>>> {
        let (start, stream) = source::consume(text, "test.ipc");
        let tokens = Lexer::new(start.clone(), stream).try_exhaustive().unwrap();
        let model = parse::parse(start, &tokens).unwrap().resolve().unwrap();

        plan(&model.interfaces)
    }

    fn method(text: &str) -> ir::Method {
        let mut program = plan_str(text).unwrap();
        program.interfaces.remove(0).methods.remove(0)
    }

    fn scalars(direction: &str, count: usize) -> String {
        (0..count)
            .map(|i| format!(", {} int32 a{}", direction, i))
            .collect()
    }

    #[test]
    fn calc_add_stays_inline() {
        let add = method("obj calc { add, int32, in int32 a, in int32 b, out int32 result; }");

        assert_eq!(add.opcode, 1);
        assert!(!add.merge_inputs() && !add.merge_outputs());
        assert!(!add.has_indata() && !add.has_outdata());
        assert_eq!((add.request.demand, add.reply.demand), (2, 1));

        let indices: Vec<_> = add
            .args
            .iter()
            .map(|arg| (arg.in_slot_index(), arg.out_slot_index()))
            .collect();

        assert_eq!(
            indices,
            vec![
                (Some(Slot(2)), None),
                (Some(Slot(3)), None),
                (None, Some(Slot(1))),
            ]
        );
    }

    #[test]
    fn input_merge_boundary() {
        let four = method(&format!("obj x {{ m, void{} }}", scalars("in", 4)));
        assert!(!four.merge_inputs());
        assert_eq!(four.request.used, 6);

        let five = method(&format!("obj x {{ m, void{} }}", scalars("in", 5)));
        assert!(five.merge_inputs());
        assert_eq!(five.indata_index(), Some(Slot(2)));

        let overflowed = |arg: &ir::Arg| arg.request == Placement::Overflow;
        assert!(five.args.iter().all(overflowed));
    }

    #[test]
    fn output_merge_boundary() {
        let six = method(&format!("obj x {{ m, void{} }}", scalars("out", 6)));
        assert!(!six.merge_outputs());
        assert_eq!(six.args[5].out_slot_index(), Some(Slot(5)));

        let seven = method(&format!("obj x {{ m, void{} }}", scalars("out", 7)));
        assert!(seven.merge_outputs());
        assert_eq!(seven.outdata_index(), Some(Slot(0)));

        let seven = method(&format!("obj x {{ m, int32{} }}", scalars("out", 7)));
        assert!(seven.merge_outputs());
        assert_eq!(seven.outdata_index(), Some(Slot(1)));

        let six = method(&format!("obj x {{ m, int32{} }}", scalars("out", 6)));
        assert!(six.merge_outputs());

        let five = method(&format!("obj x {{ m, int32{} }}", scalars("out", 5)));
        assert!(!five.merge_outputs());
        assert!(!five.has_outdata());

        let inputs = scalars("in", 4);
        let outputs: String = (0..5).map(|i| format!(", out int32 r{}", i)).collect();
        let both = method(&format!("obj x {{ m, int32{}{} }}", inputs, outputs));
        assert!(!both.has_indata() && !both.has_outdata());
        assert_eq!(both.args[3].in_slot_index(), Some(Slot(5)));
        assert_eq!(both.args[8].out_slot_index(), Some(Slot(5)));
    }

    #[test]
    fn indirect_input_forces_overflow() {
        let m = method("obj x { m, void, in int32 a, in int32 *b; }");

        assert!(!m.merge_inputs());
        assert!(m.has_indata());
        assert_eq!(m.indata_index(), Some(Slot(2)));
        assert_eq!(m.args[0].request, Placement::Direct(Slot(3)));
        assert_eq!(m.args[1].request, Placement::Overflow);
    }

    #[test]
    fn wide_scalars_take_two_slots() {
        let m = method("obj x { m, void, in64 uint64_t a, in int32 b; }");
        assert_eq!(m.args[0].request, Placement::Wide(Slot(2)));
        assert_eq!(m.args[1].request, Placement::Direct(Slot(4)));
        assert_eq!(m.request.demand, 3);
    }

    #[test]
    fn strings_cost_two_per_direction() {
        let m = method("obj fs { echo, errno_t, str in_text, out str out_text; }");

        assert_eq!(m.request.demand, 4);
        assert_eq!(m.reply.demand, 2);
        assert!(!m.merge_inputs() && !m.merge_outputs());

        assert_eq!(m.args[0].class, Class::Bulk(Payload::CString));
        assert_eq!(
            m.args[0].request,
            Placement::Bulk {
                descriptor: Some(Slot(2)),
                transfer: Slot(3),
            }
        );

        assert_eq!(
            m.args[1].request,
            Placement::Bulk {
                descriptor: Some(Slot(4)),
                transfer: Slot(5),
            }
        );

        assert_eq!(
            m.args[1].reply,
            Placement::Bulk {
                descriptor: Some(Slot(1)),
                transfer: Slot(2),
            }
        );
    }

    #[test]
    fn objects_never_merge() {
        let m = method(
            "obj x { m, void, in obj file f, in int32 a, in int32 b, in int32 c, in int32 d; }",
        );

        assert!(m.merge_inputs());
        assert_eq!(m.args[0].request, Placement::Object(Slot(3)));

        let fields: Vec<_> = m
            .overflow_fields(Side::Request)
            .map(|arg| arg.name.as_str())
            .collect();

        assert_eq!(fields, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn merged_bulk_keeps_its_transfer_slot() {
        let m = method("obj x { m, void, data, in int32 a, in int32 b, in int32 c; }");

        assert!(m.merge_inputs());
        assert_eq!(
            m.args[0].request,
            Placement::Bulk {
                descriptor: None,
                transfer: Slot(3),
            }
        );

        assert_eq!(m.overflow_fields(Side::Request).count(), 4);
    }

    #[test]
    fn rejects_inexpressible_methods() {
        let errors = plan_str(
            "obj x { ok; m, void, in obj a t, in obj b u, in obj c v, in obj d w, in obj e y; }",
        )
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].as_ref().to_string(),
            "Method `m` needs 7 request slots, the message format has 6"
        );

        assert_eq!(errors[0].location().start().column(), 13);
    }

    #[test]
    fn empty_interfaces_are_skipped() {
        let program = plan_str("obj a { } obj b { m; }").unwrap();
        assert_eq!(program.interfaces.len(), 1);
        assert_eq!(program.interfaces[0].name.as_str(), "b");
    }

    fn arb_direction() -> impl Strategy<Value = Direction> {
        prop_oneof![
            Just(Direction::In),
            Just(Direction::Out),
            Just(Direction::InOut)
        ]
    }

    fn arb_class() -> impl Strategy<Value = Class> {
        let ty = || Identifier::new("int32").unwrap();
        prop_oneof![
            Just(Class::Bulk(Payload::Bytes)),
            Just(Class::Bulk(Payload::CString)),
            Just(Class::Object {
                ty: Identifier::new("file").unwrap(),
            }),
            (any::<bool>(), any::<bool>()).prop_map(move |(wide, reference)| Class::Scalar {
                ty: ty(),
                width: if wide { Width::Wide } else { Width::Narrow },
                passing: if reference {
                    Passing::Reference
                } else {
                    Passing::Value
                },
            }),
        ]
    }

    fn arb_method() -> impl Strategy<Value = semantic::Method> {
        (
            any::<bool>(),
            prop::collection::vec((arb_direction(), arb_class()), 0..8),
        )
            .prop_map(|(retval, args)| {
                let (start, _) = source::consume("m", "prop.ipc");
                let at = |name: String| Located::at(Identifier::new(&name).unwrap(), start.clone());

                semantic::Method {
                    name: at(String::from("m")),
                    retval: retval.then(|| Identifier::new("int32").unwrap()),
                    args: args
                        .into_iter()
                        .enumerate()
                        .map(|(i, (direction, class))| semantic::Arg {
                            name: at(format!("a{}", i)),
                            direction,
                            class,
                        })
                        .collect(),
                }
            })
    }

    proptest! {
        #[test]
        fn indices_are_distinct_and_in_range(method in arb_method()) {
            let planned = match plan_method(&method, 1) {
                Ok(planned) => planned,
                Err(_) => return Ok(()),
            };

            let ranges = [
                (Side::Request, REQUEST_BASE..SLOT_COUNT),
                (Side::Reply, 0..SLOT_COUNT),
            ];

            for (side, range) in ranges {
                let mut slots = planned.slots(side);
                prop_assert!(slots.iter().all(|Slot(slot)| range.contains(slot)));

                let total = slots.len();
                slots.sort();
                slots.dedup();
                prop_assert_eq!(slots.len(), total);
            }
        }

        #[test]
        fn small_direct_inputs_stay_inline(method in arb_method()) {
            let planned = match plan_method(&method, 1) {
                Ok(planned) => planned,
                Err(_) => return Ok(()),
            };

            if planned.request.demand <= REQUEST_INLINE && !planned.request.indirect {
                prop_assert!(!planned.merge_inputs());
                prop_assert!(!planned.has_indata());

                let direct = |arg: &&ir::Arg| {
                    let inline = matches!(arg.class, Class::Scalar { .. } | Class::Object { .. });
                    arg.direction.is_input() && inline
                };

                let scalars = planned.args.iter().filter(direct);

                let mut last = None;
                for arg in scalars {
                    let index = arg.in_slot_index();
                    prop_assert!(index.is_some());
                    prop_assert!(index > last);
                    last = index;
                }
            }

            if planned.request.indirect {
                prop_assert!(planned.has_indata());
            }
        }
    }
}
