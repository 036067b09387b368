//! The generic marshal/unmarshal algorithms, plus the behavioral
//! refinements for requests, replies, events, errors, and unions.
//!
//! This is the one piece of code hundreds of schema-derived message classes
//! share: everything else in this crate is either vocabulary
//! (`crate::descriptor`, `crate::expr`) or values (`crate::value`) that this
//! module interprets.

use crate::descriptor::{ClassDescriptor, ClassKind, ElementType, FieldDescriptor, FieldKind, PrimType};
use crate::error::{Error, Result};
use crate::primitive::{self, ByteOrder, Width};
use crate::value::{Instance, Value};

/// Generic event code.
const GENERIC_EVENT_CODE: u8 = 35;
/// Minimum marshalled length of any event.
const EVENT_MIN_LEN: usize = 32;

/// Marshals `instance` to its exact wire byte sequence.
///
/// `parent` supplies parent-field context for `Expr::ParentField`
/// references inside `instance`'s own field expressions, mirroring
/// `unmarshal`'s `parent` parameter; top-level callers pass `None`.
pub fn marshal(instance: &Instance, parent: Option<&Instance>) -> Result<Vec<u8>> {
    log::trace!("marshal: entering class `{}`", instance.class.name);
    let mut out = Vec::new();
    let bias = match instance.class.kind {
        ClassKind::Union => return marshal_union(instance),
        ClassKind::Request { .. } => 2,
        _ => 0,
    };

    write_preamble(instance, &mut out)?;
    encode_fields(instance.class.fields, instance, parent, instance.byte_order, &mut out, bias)?;

    if let Some(expr) = &instance.class.declared_size {
        let expected = expr.eval_size(instance, parent)?;
        if out.len() != expected {
            return Err(Error::SizeMismatch {
                class: instance.class.name,
                expected,
                actual: out.len(),
            });
        }
    }

    if matches!(instance.class.kind, ClassKind::Event | ClassKind::GenericEvent) && out.len() < EVENT_MIN_LEN {
        out.resize(EVENT_MIN_LEN, 0);
    }

    log::trace!("marshal: leaving class `{}`, {} bytes", instance.class.name, out.len());
    Ok(out)
}

/// Unmarshals an instance of `class` from `bytes`, returning the instance
/// and the number of bytes consumed.
///
/// `parent` supplies parent-field context; `total_len` is the length of the
/// original buffer this `bytes` slice is a sub-view of, needed for
/// pad-align's offset math when the caller handed over a suffix of a
/// larger message.
pub fn unmarshal(
    class: &'static ClassDescriptor,
    byte_order: ByteOrder,
    bytes: &[u8],
    parent: Option<&Instance>,
    total_len: Option<usize>,
) -> Result<(Instance, usize)> {
    if class.kind == ClassKind::Union {
        return unmarshal_union(class, byte_order, bytes);
    }

    let mut instance = Instance::new(class, byte_order);
    let mut p = 0usize;
    read_preamble(class, byte_order, bytes, &mut p, &mut instance)?;
    let bias = if matches!(class.kind, ClassKind::Request { .. }) { 2 } else { 0 };

    decode_fields(class.fields, &mut instance, parent, byte_order, bytes, &mut p, total_len, bias)?;

    if let Some(expr) = &class.declared_size {
        let declared = expr.eval_size(&instance, parent)?;
        if declared < p {
            return Err(Error::DeclaredSizeTooSmall { declared, parsed: p });
        }
        if declared > bytes.len() {
            return Err(Error::InputTooShort {
                declared,
                available: bytes.len(),
            });
        }
        p = declared;
    }

    Ok((instance, p))
}

fn write_preamble(instance: &Instance, out: &mut Vec<u8>) -> Result<()> {
    match instance.class.kind {
        ClassKind::Struct => {}
        ClassKind::Request { opcode } => out.push(opcode),
        ClassKind::Reply => out.push(1),
        ClassKind::Error { code } => {
            out.push(0);
            out.push(code);
            let sequence = instance.get("sequence").and_then(Value::as_int).unwrap_or(0);
            out.extend(primitive::pack(sequence, Width::W2, instance.byte_order));
        }
        ClassKind::Event => {
            let code = instance
                .get("code")
                .and_then(Value::as_int)
                .ok_or_else(|| Error::MissingField { field: "code".to_string() })?;
            out.push(code as u8);
        }
        ClassKind::GenericEvent => {
            out.push(GENERIC_EVENT_CODE);
            let extension = instance
                .get("extension")
                .and_then(Value::as_int)
                .ok_or_else(|| Error::MissingField { field: "extension".to_string() })?;
            let evtype = instance
                .get("evtype")
                .and_then(Value::as_int)
                .ok_or_else(|| Error::MissingField { field: "evtype".to_string() })?;
            out.extend(primitive::pack(extension, Width::W2, instance.byte_order));
            out.extend(primitive::pack(evtype, Width::W2, instance.byte_order));
        }
        ClassKind::Union => unreachable!("handled by marshal_union"),
    }
    Ok(())
}

fn read_preamble(
    class: &'static ClassDescriptor,
    byte_order: ByteOrder,
    bytes: &[u8],
    p: &mut usize,
    instance: &mut Instance,
) -> Result<()> {
    match class.kind {
        ClassKind::Struct => {}
        ClassKind::Request { .. } => *p += 1,
        ClassKind::Reply => *p += 1,
        ClassKind::Error { .. } => {
            let code = bytes[*p + 1];
            let sequence = primitive::unpack_unsigned(&bytes[*p + 2..*p + 4], Width::W2, byte_order);
            instance.set("code", Value::Int(code as i128));
            instance.set("sequence", Value::Int(sequence as i128));
            *p += 4;
        }
        ClassKind::Event => {
            instance.set("code", Value::Int(bytes[*p] as i128));
            *p += 1;
        }
        ClassKind::GenericEvent => {
            let extension = primitive::unpack_unsigned(&bytes[*p + 1..*p + 3], Width::W2, byte_order);
            let evtype = primitive::unpack_unsigned(&bytes[*p + 3..*p + 5], Width::W2, byte_order);
            instance.set("code", Value::Int(GENERIC_EVENT_CODE as i128));
            instance.set("extension", Value::Int(extension as i128));
            instance.set("evtype", Value::Int(evtype as i128));
            *p += 5;
        }
        ClassKind::Union => unreachable!("handled by unmarshal_union"),
    }
    Ok(())
}

fn encode_fields(
    fields: &'static [FieldDescriptor],
    obj: &Instance,
    ctx: Option<&Instance>,
    byte_order: ByteOrder,
    out: &mut Vec<u8>,
    bias: usize,
) -> Result<()> {
    for field in fields {
        if let FieldKind::Ignore = field.kind {
            continue;
        }
        if let FieldKind::Switch(switch) = &field.kind {
            let discriminant = switch.discriminant.eval(obj, ctx)?;
            for f in matched_switch_fields(switch, discriminant) {
                encode_field(f, obj, ctx, byte_order, out, bias)?;
            }
            return Ok(()); // a switch is always the last field a struct emits
        }
        encode_field(field, obj, ctx, byte_order, out, bias)?;
    }
    Ok(())
}

/// The union, in declared order, of every case whose condition matches
/// `discriminant` — a field named by more than one matching case is only
/// emitted/consumed once, the first time it appears.
fn matched_switch_fields(
    switch: &crate::descriptor::SwitchDescriptor,
    discriminant: i64,
) -> Vec<&'static FieldDescriptor> {
    let mut matched: Vec<&'static FieldDescriptor> = Vec::new();
    for case in switch.cases {
        if case.condition.matches(discriminant) {
            for f in case.fields {
                if !matched.iter().any(|m| m.name == f.name) {
                    matched.push(f);
                }
            }
        }
    }
    matched
}

fn encode_field(
    field: &FieldDescriptor,
    obj: &Instance,
    ctx: Option<&Instance>,
    byte_order: ByteOrder,
    out: &mut Vec<u8>,
    bias: usize,
) -> Result<()> {
    match &field.kind {
        FieldKind::Ignore => {}
        FieldKind::Prim(prim) => {
            encode_prim_value(*prim, field.name, obj, byte_order, out)?;
        }
        FieldKind::Pad(expr) => {
            let len = expr.eval_size(obj, ctx)?;
            out.resize(out.len() + len, 0);
        }
        FieldKind::PadAlign { align, offset_correction } => {
            let mut offset = out.len() + bias;
            if let Some(correction) = offset_correction {
                offset -= correction.eval_size(obj, ctx)?;
            }
            let align = *align as usize;
            let pad = (align - (offset % align)) % align;
            out.resize(out.len() + pad, 0);
        }
        FieldKind::List { element, size } => {
            let expected = size.eval_size(obj, ctx)?;
            let value = field_value(obj, field.name)?;
            encode_list(*element, field.name, value, expected, obj, byte_order, out)?;
        }
        FieldKind::Switch(_) => unreachable!("switch is handled by encode_fields"),
        FieldKind::Nested(_) => {
            let value = field_value(obj, field.name)?;
            let Value::Struct(nested) = value else {
                return Err(Error::MissingField { field: field.name.to_string() });
            };
            out.extend(marshal(nested, Some(obj))?);
        }
    }
    Ok(())
}

fn field_value<'a>(obj: &'a Instance, name: &str) -> Result<&'a Value> {
    obj.get(name).ok_or_else(|| Error::MissingField { field: name.to_string() })
}

fn encode_prim_value(
    prim: PrimType,
    field_name: &str,
    obj: &Instance,
    byte_order: ByteOrder,
    out: &mut Vec<u8>,
) -> Result<()> {
    let value = obj.get(field_name);
    match prim {
        PrimType::F32 => {
            let Some(Value::F32(v)) = value else {
                return Err(Error::MissingField { field: field_name.to_string() });
            };
            out.extend(primitive::pack_f32(*v, byte_order));
        }
        PrimType::F64 => {
            let Some(Value::F64(v)) = value else {
                return Err(Error::MissingField { field: field_name.to_string() });
            };
            out.extend(primitive::pack_f64(*v, byte_order));
        }
        _ => {
            let int = value
                .and_then(Value::as_int)
                .or_else(|| default_sequence(field_name, obj))
                .ok_or_else(|| Error::MissingField { field: field_name.to_string() })?;
            out.extend(primitive::pack(int, prim.width(), byte_order));
        }
    }
    Ok(())
}

/// An event's `sequence` field, if declared as a plain field rather than
/// stamped by `write_preamble`, defaults to 0 rather than requiring every
/// caller to set it before marshalling.
fn default_sequence(field_name: &str, obj: &Instance) -> Option<i128> {
    if field_name == "sequence" && matches!(obj.class.kind, ClassKind::Event | ClassKind::GenericEvent) {
        Some(0)
    } else {
        None
    }
}

fn encode_list(
    element: ElementType,
    field_name: &str,
    value: &Value,
    expected: usize,
    obj: &Instance,
    byte_order: ByteOrder,
    out: &mut Vec<u8>,
) -> Result<()> {
    // BYTE/void elements backed by a byte string copy directly rather than
    // walking element by element.
    if let (ElementType::Prim(PrimType::Void | PrimType::U1), Value::Bytes(bytes)) = (element, value) {
        if bytes.len() != expected {
            return Err(Error::ListSizeMismatch {
                field: field_name.to_string(),
                expected: expected as i64,
                actual: bytes.len(),
            });
        }
        out.extend_from_slice(bytes);
        return Ok(());
    }
    if let (ElementType::Prim(PrimType::Char), Value::Text(text)) = (element, value) {
        let bytes: Vec<u8> = text.chars().map(|c| c as u8).collect();
        if bytes.len() != expected {
            return Err(Error::ListSizeMismatch {
                field: field_name.to_string(),
                expected: expected as i64,
                actual: bytes.len(),
            });
        }
        out.extend(bytes);
        return Ok(());
    }

    let Value::List(items) = value else {
        return Err(Error::MissingField { field: field_name.to_string() });
    };
    if items.len() != expected {
        return Err(Error::ListSizeMismatch {
            field: field_name.to_string(),
            expected: expected as i64,
            actual: items.len(),
        });
    }
    for item in items {
        match element {
            ElementType::Prim(PrimType::F32) => {
                let Value::F32(v) = item else {
                    return Err(Error::UnsupportedType { tag: "f32" });
                };
                out.extend(primitive::pack_f32(*v, byte_order));
            }
            ElementType::Prim(PrimType::F64) => {
                let Value::F64(v) = item else {
                    return Err(Error::UnsupportedType { tag: "f64" });
                };
                out.extend(primitive::pack_f64(*v, byte_order));
            }
            ElementType::Prim(prim) => {
                let int = item.as_int().ok_or(Error::UnsupportedType { tag: "int" })?;
                out.extend(primitive::pack(int, prim.width(), byte_order));
            }
            ElementType::Class(_) => {
                let Value::Struct(nested) = item else {
                    return Err(Error::UnsupportedType { tag: "struct" });
                };
                out.extend(marshal(nested, Some(obj))?);
            }
        }
    }
    Ok(())
}

fn decode_fields(
    fields: &'static [FieldDescriptor],
    obj: &mut Instance,
    ctx: Option<&Instance>,
    byte_order: ByteOrder,
    bytes: &[u8],
    p: &mut usize,
    total_len: Option<usize>,
    bias: usize,
) -> Result<()> {
    for field in fields {
        if let FieldKind::Ignore = field.kind {
            continue;
        }
        if let FieldKind::Switch(switch) = &field.kind {
            let discriminant = switch.discriminant.eval(obj, ctx)?;
            for f in matched_switch_fields(switch, discriminant) {
                decode_field(f, obj, ctx, byte_order, bytes, p, total_len, bias)?;
            }
            return Ok(());
        }
        decode_field(field, obj, ctx, byte_order, bytes, p, total_len, bias)?;
    }
    Ok(())
}

fn decode_field(
    field: &FieldDescriptor,
    obj: &mut Instance,
    ctx: Option<&Instance>,
    byte_order: ByteOrder,
    bytes: &[u8],
    p: &mut usize,
    total_len: Option<usize>,
    bias: usize,
) -> Result<()> {
    match &field.kind {
        FieldKind::Ignore => {}
        FieldKind::Prim(prim) => {
            let width = prim.width().bytes();
            let slice = &bytes[*p..*p + width];
            let value = match prim {
                PrimType::F32 => Value::F32(primitive::unpack_f32(slice, byte_order)?),
                PrimType::F64 => Value::F64(primitive::unpack_f64(slice, byte_order)?),
                _ if prim.is_signed() => Value::Int(primitive::unpack_signed(slice, prim.width(), byte_order)),
                _ => Value::Int(primitive::unpack_unsigned(slice, prim.width(), byte_order) as i128),
            };
            obj.set(field.name, value);
            *p += width;
        }
        FieldKind::Pad(expr) => {
            let len = expr.eval_size(obj, ctx)?;
            *p += len;
        }
        FieldKind::PadAlign { align, offset_correction } => {
            let t = total_len.unwrap_or(bytes.len());
            let mut offset = (t - (bytes.len() - *p)) + bias;
            if let Some(correction) = offset_correction {
                offset -= correction.eval_size(obj, ctx)?;
            }
            let align = *align as usize;
            let pad = (align - (offset % align)) % align;
            *p += pad;
        }
        FieldKind::List { element, size } => {
            let n = size.eval_size(obj, ctx)?;
            let value = decode_list(*element, bytes, p, n, byte_order)?;
            obj.set(field.name, value);
        }
        FieldKind::Switch(_) => unreachable!("switch is handled by decode_fields"),
        FieldKind::Nested(class) => {
            let (nested, consumed) = unmarshal(class, byte_order, &bytes[*p..], Some(&*obj), None)?;
            *p += consumed;
            obj.set(field.name, Value::Struct(nested));
        }
    }
    Ok(())
}

fn decode_list(
    element: ElementType,
    bytes: &[u8],
    p: &mut usize,
    n: usize,
    byte_order: ByteOrder,
) -> Result<Value> {
    match element {
        ElementType::Prim(PrimType::Void) => {
            let slice = bytes[*p..*p + n].to_vec();
            *p += n;
            Ok(Value::Bytes(slice))
        }
        ElementType::Prim(PrimType::Char) => {
            let slice = &bytes[*p..*p + n];
            let text: String = slice.iter().map(|&b| b as char).collect();
            *p += n;
            Ok(Value::Text(text))
        }
        ElementType::Prim(prim) => {
            let width = prim.width().bytes();
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                let slice = &bytes[*p..*p + width];
                let value = match prim {
                    PrimType::F32 => Value::F32(primitive::unpack_f32(slice, byte_order)?),
                    PrimType::F64 => Value::F64(primitive::unpack_f64(slice, byte_order)?),
                    _ if prim.is_signed() => Value::Int(primitive::unpack_signed(slice, prim.width(), byte_order)),
                    _ => Value::Int(primitive::unpack_unsigned(slice, prim.width(), byte_order) as i128),
                };
                items.push(value);
                *p += width;
            }
            Ok(Value::List(items))
        }
        ElementType::Class(class) => {
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                // A nested struct is always self-contained, the same way
                // `decode_field`'s `Nested` arm treats it: its pad-align math
                // starts fresh at its own start, not the enclosing buffer's
                // total length.
                let (nested, consumed) = unmarshal(class, byte_order, &bytes[*p..], None, None)?;
                *p += consumed;
                items.push(Value::Struct(nested));
            }
            Ok(Value::List(items))
        }
    }
}

fn marshal_union(instance: &Instance) -> Result<Vec<u8>> {
    let size_expr = instance
        .class
        .declared_size
        .as_ref()
        .expect("union classes must declare a size");
    let size = size_expr.eval_size(instance, None)?;

    let bound = instance
        .class
        .fields
        .iter()
        .find(|f| instance.get(f.name).is_some());
    let Some(field) = bound else {
        return Ok(vec![0; size]);
    };

    let mut out = Vec::new();
    encode_field(field, instance, None, instance.byte_order, &mut out, 0)?;
    if out.len() > size {
        return Err(Error::UnionOverflow {
            class: instance.class.name,
            size,
            actual: out.len(),
        });
    }
    out.resize(size, 0);
    Ok(out)
}

fn unmarshal_union(
    class: &'static ClassDescriptor,
    byte_order: ByteOrder,
    bytes: &[u8],
) -> Result<(Instance, usize)> {
    let size_expr = class
        .declared_size
        .as_ref()
        .expect("union classes must declare a size");
    let mut instance = Instance::new(class, byte_order);
    let size = size_expr.eval_size(&instance, None)?;
    if size > bytes.len() {
        return Err(Error::InputTooShort {
            declared: size,
            available: bytes.len(),
        });
    }
    let slice = &bytes[..size];
    for field in class.fields {
        let mut p = 0usize;
        decode_field(field, &mut instance, None, byte_order, slice, &mut p, Some(size), 0)?;
    }
    Ok((instance, size))
}
