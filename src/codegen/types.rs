//! Nombres y firmas de C derivados del modelo.

use crate::{
    ir::{Arg, Interface, Method},
    semantic::{Class, Identifier, Passing, Payload},
};

pub fn impl_type(interface: &Identifier) -> String {
    format!("{}_impl_t", interface)
}

pub fn handle_type(interface: &Identifier) -> String {
    format!("{}_t", interface)
}

pub fn ops_type(interface: &Identifier) -> String {
    format!("{}_ops_t", interface)
}

/// Firma del despachador de una interfaz.
pub fn handle_message(interface: &Identifier) -> String {
    format!(
        "void {}_handle_message({} *self, const ipc_message_t *msg)",
        interface,
        impl_type(interface)
    )
}

pub fn opcode(interface: &Interface, method: &Method) -> String {
    format!("_{}_op_{}", interface.name, method.name)
}

pub fn overflow_struct(interface: &Interface, method: &Method, suffix: &str) -> String {
    format!("{}_{}_{}", interface.name, method.name, suffix)
}

pub fn retval(method: &Method) -> &str {
    method.retval.as_ref().map_or("void", Identifier::as_str)
}

/// Parámetros de C de un método, sin incluir `self`.
pub fn params(method: &Method) -> Vec<String> {
    method.args.iter().flat_map(param).collect()
}

/// Lista completa de parámetros, con `self` de tipo `this`.
pub fn param_list(this: &str, method: &Method) -> String {
    let mut params = vec![format!("{} *self", this)];
    params.extend(self::params(method));

    params.join(", ")
}

/// Firma de un handler o de un stub de cliente.
pub fn prototype(name: &str, this: &str, method: &Method) -> String {
    format!("{} {}({})", retval(method), name, param_list(this, method))
}

fn param(arg: &Arg) -> Vec<String> {
    let name = &arg.name;
    let output = arg.direction.is_output();

    match (&arg.class, output) {
        (
            Class::Scalar {
                ty,
                passing: Passing::Value,
                ..
            },
            false,
        ) => vec![format!("{} {}", ty, name)],

        (Class::Scalar { ty, .. }, false) => vec![format!("const {} *{}", ty, name)],
        (Class::Scalar { ty, .. }, true) => vec![format!("{} *{}", ty, name)],

        (Class::Object { ty }, false) => vec![format!("{}_t *{}", ty, name)],
        (Class::Object { ty }, true) => vec![format!("{}_t **{}", ty, name)],

        (Class::Bulk(Payload::Bytes), false) => vec![
            format!("const void *{}", name),
            format!("size_t {}_len", name),
        ],

        (Class::Bulk(Payload::CString), false) => vec![format!("const char *{}", name)],

        (Class::Bulk(payload), true) => vec![
            format!("{} *{}", buffer_type(*payload), name),
            format!("size_t *{}_len", name),
        ],
    }
}

/// Argumentos con los que el despachador invoca a un handler.
pub fn call_args(arg: &Arg) -> Vec<String> {
    let name = &arg.name;
    let output = arg.direction.is_output();

    match (&arg.class, output) {
        (Class::Bulk(Payload::Bytes), false) => vec![name.to_string(), format!("{}_len", name)],
        (Class::Bulk(Payload::CString), false) => vec![name.to_string()],
        (Class::Bulk(_), true) => vec![name.to_string(), format!("&{}_len", name)],

        (
            Class::Scalar {
                passing: Passing::Value,
                ..
            }
            | Class::Object { .. },
            false,
        ) => vec![name.to_string()],

        _ => vec![format!("&{}", name)],
    }
}

/// Tipo de los buffers de recepción.
pub fn buffer_type(payload: Payload) -> &'static str {
    match payload {
        Payload::Bytes => "void",
        Payload::CString => "char",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{layout, lex::Lexer, parse, source};

    fn methods(text: &str) -> Vec<Method> {
        let (start, stream) = source::consume(text, "test.ipc");
        let tokens = Lexer::new(start.clone(), stream).try_exhaustive().unwrap();
        let model = parse::parse(start, &tokens).unwrap().resolve().unwrap();

        layout::plan(&model.interfaces)
            .unwrap()
            .interfaces
            .remove(0)
            .methods
    }

    #[test]
    fn signatures_follow_direction_and_class() {
        let methods = methods(
            "obj fs { \
                scalars, errno_t, in int32 a, in stat_t *st, obj file f, \
                    out obj file g, inout int64_t pos; \
                bulk, errno_t, data, str path, out buf; \
                rename, errno_t, inout str name; \
            }",
        );

        assert_eq!(
            prototype("scalars", "fs_impl_t", &methods[0]),
            "errno_t scalars(fs_impl_t *self, int32 a, const stat_t *st, file_t *f, \
             file_t **g, int64_t *pos)"
        );

        let bulk: Vec<_> = methods[1..].iter().flat_map(params).collect();
        assert_eq!(
            bulk,
            vec![
                "const void *data",
                "size_t data_len",
                "const char *path",
                "void *buf",
                "size_t *buf_len",
                "char *name",
                "size_t *name_len",
            ]
        );

        let args = methods.iter().flat_map(|method| &method.args);
        let calls: Vec<_> = args.flat_map(call_args).collect();
        assert_eq!(
            calls.join(", "),
            "a, &st, f, &g, &pos, data, data_len, path, buf, &buf_len, name, &name_len"
        );
    }

    #[test]
    fn void_methods() {
        let m = methods("obj x { ping; }").remove(0);
        assert_eq!(prototype("x_ping", "x_t", &m), "void x_ping(x_t *self)");
        assert_eq!(param_list("x_impl_t", &m), "x_impl_t *self");
    }
}
