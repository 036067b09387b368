#![forbid(unsafe_code)]
//! A generic, schema-driven marshal/unmarshal core for the X11 wire
//! protocol and its extensions.
//!
//! Hundreds of request/reply/event/error classes are *data* to this crate: a
//! [`descriptor::ClassDescriptor`] naming an ordered list of
//! [`descriptor::FieldDescriptor`]s. The [`engine`] module is the single
//! piece of code that walks that table to produce or consume the exact byte
//! stream the protocol defines — callers never write a per-message codec by
//! hand. Socket I/O, request sequencing, extension negotiation, event
//! dispatch, connection authentication, and whatever XML-to-schema
//! generator emits the descriptor tables are all external collaborators;
//! [`event::EventNumberResolver`] is the one seam this crate exposes to
//! them.

pub mod descriptor;
pub mod engine;
pub mod error;
pub mod event;
pub mod expr;
pub mod primitive;
pub mod value;

pub use descriptor::{
    ClassDescriptor, ClassKind, ElementType, FieldDescriptor, FieldKind, PrimType, SwitchCase,
    SwitchDescriptor,
};
pub use engine::{marshal, unmarshal};
pub use error::{Error, Result};
pub use event::{marshal_event, EventNumber, EventNumberResolver};
pub use expr::{BinOp, Expr, SwitchCondition};
pub use primitive::ByteOrder;
pub use value::{Instance, Value};

/// The fixed suffix a request class's name gets for its reply class's name.
pub const REPLY_SUFFIX: &str = "Reply";

/// `request-class → reply-class`, following the protocol's fixed naming
/// convention.
pub fn reply_class_name(request_class: &str) -> String {
    format!("{request_class}{REPLY_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ClassDescriptor, ClassKind, ElementType, FieldDescriptor, FieldKind, PrimType};
    use crate::expr::Expr;

    #[test]
    fn reply_name_uses_fixed_suffix() {
        assert_eq!(reply_class_name("GetWindowAttributes"), "GetWindowAttributesReply");
    }

    // len: u2, data: list<u1> sized by a sibling field reference.
    static SIZED_LIST_CLASS: ClassDescriptor = ClassDescriptor {
        name: "SizedList",
        kind: ClassKind::Struct,
        fields: &[
            FieldDescriptor {
                name: "len",
                kind: FieldKind::Prim(PrimType::U2),
            },
            FieldDescriptor {
                name: "data",
                kind: FieldKind::List {
                    element: ElementType::Prim(PrimType::U1),
                    size: Expr::SelfField("len"),
                },
            },
        ],
        declared_size: None,
    };

    #[test]
    fn list_sized_by_sibling_field_reference() {
        let mut instance = Instance::new(&SIZED_LIST_CLASS, ByteOrder::LittleEndian);
        instance.set("len", Value::Int(3));
        instance.set(
            "data",
            Value::List(vec![Value::Int(0x61), Value::Int(0x62), Value::Int(0x63)]),
        );
        let bytes = marshal(&instance, None).unwrap();
        assert_eq!(bytes, vec![0x03, 0x00, 0x61, 0x62, 0x63]);

        let (decoded, consumed) =
            unmarshal(&SIZED_LIST_CLASS, ByteOrder::LittleEndian, &bytes, None, None).unwrap();
        assert_eq!(consumed, 5);
        assert_eq!(decoded.get("len"), Some(&Value::Int(3)));
        assert_eq!(
            decoded.get("data"),
            Some(&Value::List(vec![Value::Int(0x61), Value::Int(0x62), Value::Int(0x63)]))
        );
    }
}
