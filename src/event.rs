//! The event-number lookup external interface.
//!
//! The engine knows nothing about extension negotiation; it only needs *a*
//! code (and, for generic/XKB events, an extension id and evtype) to stamp
//! into the instance before marshalling. That number comes from whatever
//! connection collaborator the caller plugs in here.

use crate::descriptor::ClassKind;
use crate::error::{Error, Result};
use crate::value::{Instance, Value};

/// The result of resolving an event class to its wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventNumber {
    /// A core event: just its 1-byte code.
    Core(u8),
    /// A generic (`XGE`) event: the owning extension id and its evtype.
    Generic { extension_id: u8, evtype: u16 },
    /// An XKB-style event: the fixed XKB event code plus an `xkbType`
    /// sub-discriminant.
    Xkb { code: u8, xkb_type: u8 },
}

/// `event-class → number`, supplied by the connection layer. Implementations
/// are free to hold whatever connection state they need; the engine only
/// ever calls `resolve`.
pub trait EventNumberResolver {
    fn resolve(&self, class_name: &str) -> Option<EventNumber>;
}

/// Resolves `instance`'s event number through `resolver` and stamps the
/// result into its reserved `code`/`extension`/`evtype`/`xkbType` slots,
/// then marshals it.
pub fn marshal_event(instance: &mut Instance, resolver: &dyn EventNumberResolver) -> Result<Vec<u8>> {
    if !matches!(instance.class.kind, ClassKind::Event | ClassKind::GenericEvent) {
        return Err(Error::UnsupportedType {
            tag: "marshal_event called on a non-event class",
        });
    }
    let number = resolver
        .resolve(instance.class.name)
        .ok_or_else(|| Error::MissingField {
            field: format!("event number for `{}`", instance.class.name),
        })?;
    match number {
        EventNumber::Core(code) => {
            instance.set("code", Value::Int(code as i128));
        }
        EventNumber::Generic { extension_id, evtype } => {
            instance.set("extension", Value::Int(extension_id as i128));
            instance.set("evtype", Value::Int(evtype as i128));
        }
        EventNumber::Xkb { code, xkb_type } => {
            instance.set("code", Value::Int(code as i128));
            instance.set("xkbType", Value::Int(xkb_type as i128));
        }
    }
    crate::engine::marshal(instance, None)
}
