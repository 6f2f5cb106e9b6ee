use super::*;
use crate::{layout, lex::Lexer, parse, source};

const CALC: &str = "obj calc { add, int32, in int32 a, in int32 b, out int32 result; }";

fn generate_at(text: &str, options: EmitOptions, modified: u64) -> (String, String) {
    let (start, stream) = source::consume(text, "calc.ipc");
    let tokens = Lexer::new(start.clone(), stream).try_exhaustive().unwrap();
    let model = parse::parse(start, &tokens).unwrap().resolve().unwrap();
    let program = layout::plan(&model.interfaces).unwrap();

    let provenance = Provenance::new("calc.ipc", Some(modified));
    let settings = Settings {
        options,
        provenance: &provenance,
        header_name: "calc.h",
    };

    let (mut source, mut header) = (Vec::new(), Vec::new());
    emit(&program, &settings, &mut source, &mut header).unwrap();

    let text = |bytes: Vec<u8>| String::from_utf8(bytes).unwrap().replace('\t', "    ");
    (text(source), text(header))
}

fn generate(text: &str, options: EmitOptions) -> (String, String) {
    generate_at(text, options, 1_700_000_000)
}

#[test]
fn calc_header() {
    let (_, header) = generate(CALC, EmitOptions::empty());

    let expected = r##"#pragma once

#include <stddef.h>
#include <stdlib.h>
#include <ipc_b.h>

typedef struct calc_impl calc_impl_t;
typedef struct calc calc_t;
typedef struct calc_ops calc_ops_t;

struct calc_ops {
    size_t _sizeof;
    void (*_handle_message)(calc_impl_t *self, const ipc_message_t *msg);
    void (*_destroy)(calc_impl_t *self);
    int32 (*add)(calc_impl_t *self, int32 a, int32 b, int32 *result);
};

void calc_handle_message(calc_impl_t *self, const ipc_message_t *msg);

int32 calc_add(calc_t *self, int32 a, int32 b, int32 *result);
"##;

    assert_eq!(header, expected);
}

#[test]
fn calc_dispatcher() {
    let (source, _) = generate(CALC, EmitOptions::empty());

    let expected = r##"#include "calc.h"
#include <stdbool.h>

enum calc_methods {
    _calc_op_undef,
    _calc_op_add,
};

void calc_handle_message(calc_impl_t *self, const ipc_message_t *msg)
{
    calc_ops_t *ops = *(calc_ops_t **) self;
    bool dropped = ipcb_is_dropped(msg);

    if (ipcb_is_protocol_error(msg))
        return;

    if (ipcb_is_automatic(msg)) {
        if (dropped && ops->_destroy)
            ops->_destroy(self);

        return;
    }

    switch (ipcb_get_val_1(msg)) {
    case _calc_op_add: {
        if (offsetof(calc_ops_t, add) + sizeof(ops->add) > ops->_sizeof || !ops->add) {
            ipcb_answer_protocol_error(msg);
            break;
        }

        int32 a = ipcb_get_val_2(msg);
        int32 b = ipcb_get_val_3(msg);
        int32 result = {0};

        int32 rc = ops->add(self, a, b, &result);

        ipc_message_t answer = ipcb_start_answer(msg, rc);
        ipcb_set_val_1(&answer, result);
        ipcb_send_answer(msg, answer);
        break;
    }

    default:
        ipcb_answer_protocol_error(msg);
        break;
    }

    if (dropped && ops->_destroy)
        ops->_destroy(self);
}
"##;

    assert_eq!(source, expected);
}

#[test]
fn destroy_runs_after_the_answer() {
    let (source, _) = generate(CALC, EmitOptions::empty());

    let sent = source.find("ipcb_send_answer(msg, answer);").unwrap();
    let destroyed = source.rfind("ops->_destroy(self);").unwrap();
    assert!(sent < destroyed);
}

#[test]
fn strings_are_terminated_and_released() {
    let (source, header) = generate(
        "obj fs { echo, errno_t, str text, out str reply; }",
        EmitOptions::empty(),
    );

    assert!(header.contains(
        "errno_t (*echo)(fs_impl_t *self, const char *text, char *reply, size_t *reply_len);"
    ));

    let receive = r##"
        size_t text_slice = ipcb_get_val_2(msg);
        size_t text_len = ipcb_slice_len(text_slice);
        char *text = calloc(text_len + 1, 1);
        if (!text) {
            ipcb_answer_nomem(msg);
            break;
        }

        ipcb_bulk_read_3(msg, text, text_slice);
        text[text_len] = '\0';

        size_t reply_slice = ipcb_get_val_4(msg);
        size_t reply_len = ipcb_slice_len(reply_slice);
        char *reply = calloc(reply_len + 1, 1);
        if (!reply) {
            ipcb_answer_nomem(msg);
            free(text);
            break;
        }

        ipc_buffer_t *reply_obj = ipcb_get_obj_5(msg);
        size_t reply_cap = reply_len;

        errno_t rc = ops->echo(self, text, reply, &reply_len);

        if (reply_len > reply_cap)
            reply_len = reply_cap;

        ipcb_buffer_write(reply_obj, reply_slice, reply, reply_len);

        ipc_message_t answer = ipcb_start_answer(msg, rc);
        ipcb_set_val_1(&answer, reply_len);
        ipcb_set_obj_2(&answer, reply_obj);
        ipcb_send_answer(msg, answer);

        free(reply);
        free(text);
        break;
"##;

    assert!(source.contains(receive), "{}", source);
}

#[test]
fn overflow_fields_keep_declaration_order() {
    let (source, _) = generate(
        "obj x { m, void, in int32 a, in obj file f, in uint64_t *b, data, in int32 c; }",
        EmitOptions::empty(),
    );

    let indata = r##"
struct __attribute__((packed)) x_m_indata {
    int32 a;
    uint64_t b;
    size_t data_slice;
    int32 c;
};
"##;

    assert!(source.contains(indata), "{}", source);

    let expected = [
        "struct x_m_indata _indata;\n        ipcb_blob_read_2(msg, &_indata, sizeof(_indata));",
        "int32 a = _indata.a;",
        "file_t *f = ipcb_get_obj_3(msg);",
        "size_t data_slice = _indata.data_slice;",
        "ipcb_bulk_read_4(msg, data, data_slice);",
        "ops->m(self, a, f, &b, data, data_len, c);",
        "ipcb_start_answer(msg, 0);",
    ];

    for line in expected {
        assert!(source.contains(line), "{}", line);
    }
}

#[test]
fn merged_outputs_travel_in_outdata() {
    let args: String = (0..7).map(|i| format!(", out int32 r{}", i)).collect();
    let idl = format!("obj x {{ m, int32{} }}", args);
    let (source, _) = generate(&idl, EmitOptions::empty());

    let expected = [
        "struct __attribute__((packed)) x_m_outdata {\n    int32 r0;",
        "struct x_m_outdata _outdata = {\n            .r0 = r0,",
        "ipcb_blob_write_1(&answer, &_outdata, sizeof(_outdata));",
    ];

    for line in expected {
        assert!(source.contains(line), "{}", line);
    }

    assert!(!source.contains("ipcb_set_val_"));
}

#[test]
fn capabilities_and_wide_values() {
    let idl = "obj vfs { open, errno_t, in64 aoff64_t pos, out obj file f, out64 aoff64_t size; } \
               obj file { close; }";

    let (source, header) = generate(idl, EmitOptions::empty());

    let stub = "errno_t vfs_open(vfs_t *self, aoff64_t pos, file_t **f, aoff64_t *size);";
    assert!(header.contains(stub));
    assert!(header.contains("typedef struct file file_t;"));

    // Las declaraciones adelantadas preceden a toda tabla de operaciones
    let typedef = header.find("typedef struct file_ops file_ops_t;").unwrap();
    assert!(typedef < header.find("struct vfs_ops {").unwrap());

    assert!(source.contains("aoff64_t pos = ipcb_get_val64_2(msg);"));
    assert!(source.contains("file_t *f = NULL;"));
    assert!(source.contains("ipcb_set_obj_1(&answer, f);"));
    assert!(source.contains("ipcb_set_val64_2(&answer, size);"));

    let dispatcher = "void file_handle_message(file_impl_t *self, const ipc_message_t *msg)";
    assert!(source.contains(dispatcher));
    assert!(source.contains("        ops->close(self);\n"));
}

#[test]
fn client_skeletons_describe_the_layout() {
    let (source, _) = generate(CALC, EmitOptions::CLIENT_STUBS);

    let stub = r##"
int32 calc_add(calc_t *self, int32 a, int32 b, int32 *result)
{
    // Request, _calc_op_add in slot 1:
    //   slot 2: a
    //   slot 3: b
    // Reply:
    //   slot 0: return value
    //   slot 1: result

    int32 rc = {0};
    return rc;
}
"##;

    assert!(source.ends_with(stub), "{}", source);
}

#[test]
fn output_is_stable_except_for_the_timestamp() {
    let first = generate_at(CALC, EmitOptions::all(), 100);
    let second = generate_at(CALC, EmitOptions::all(), 100);
    assert_eq!(first, second);

    let (later_source, later_header) = generate_at(CALC, EmitOptions::all(), 200);
    for (a, b) in [(&first.0, &later_source), (&first.1, &later_header)] {
        let differing: Vec<_> = a.lines().zip(b.lines()).filter(|(x, y)| x != y).collect();
        let expected = ("// Source timestamp: 100", "// Source timestamp: 200");
        assert_eq!(differing, vec![expected]);
    }

    let banner = "// Autogenerated IPC interface declarations, do not edit.\n// Source: calc.ipc\n";
    assert!(first.1.starts_with(banner));
}
