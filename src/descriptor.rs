//! The type descriptor model: the tables the engine interprets.
//!
//! These are plain data: schema generators would emit `&'static` tables of
//! these types for each of the hundreds of message classes. The engine
//! (`crate::engine`) is the only code that interprets them.

use crate::expr::{Expr, SwitchCondition};

/// One of the fixed-width primitive wire types, after alias resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimType {
    U1,
    I1,
    U2,
    I2,
    U4,
    I4,
    U8,
    F32,
    F64,
    /// A single opaque byte, used as a list element type for raw blobs.
    Void,
    /// A list element type whose bytes decode to ISO-8859-1 text.
    Char,
}

impl PrimType {
    pub fn width(self) -> crate::primitive::Width {
        use crate::primitive::Width;
        match self {
            PrimType::U1 | PrimType::I1 | PrimType::Void | PrimType::Char => Width::W1,
            PrimType::U2 | PrimType::I2 => Width::W2,
            PrimType::U4 | PrimType::I4 | PrimType::F32 => Width::W4,
            PrimType::U8 | PrimType::F64 => Width::W8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, PrimType::I1 | PrimType::I2 | PrimType::I4)
    }
}

/// Resolves one of the schema's type-tag aliases to a concrete [`PrimType`].
/// Aliases are chased transitively by the descriptor builder at construction
/// time: this is a flat lookup, not a recursive one, because every alias in
/// the closed set already names a concrete tag.
pub fn resolve_alias(tag: &str) -> Option<PrimType> {
    Some(match tag {
        "u1" | "BYTE" | "CARD8" => PrimType::U1,
        "i1" | "INT8" => PrimType::I1,
        "u2" | "CARD16" => PrimType::U2,
        "i2" | "INT16" => PrimType::I2,
        "u4" | "CARD32" | "fd" => PrimType::U4,
        "i4" | "INT32" => PrimType::I4,
        "u8" | "CARD64" => PrimType::U8,
        "f32" | "float" => PrimType::F32,
        "f64" | "double" => PrimType::F64,
        "void" => PrimType::Void,
        "char" => PrimType::Char,
        "BOOL" => PrimType::U1,
        _ => return None,
    })
}

/// The element type of a `list` field: either a primitive or a nested class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Prim(PrimType),
    Class(&'static ClassDescriptor),
}

/// A matching rule paired with the fields it emits/consumes. A case's fields
/// are declared here, not in the enclosing class's `fields` table, so a
/// switch target is encoded exactly once: when its case matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCase {
    pub condition: SwitchCondition,
    pub fields: &'static [FieldDescriptor],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchDescriptor {
    pub discriminant: Expr,
    pub cases: &'static [SwitchCase],
}

/// The shape a single field descriptor can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Prim(PrimType),
    Pad(Expr),
    PadAlign {
        align: u32,
        offset_correction: Option<Expr>,
    },
    List {
        element: ElementType,
        size: Expr,
    },
    Switch(SwitchDescriptor),
    Nested(&'static ClassDescriptor),
    /// Present in the object model but absent from the wire.
    Ignore,
}

/// A single ordered field declaration. Order within a class's `fields` table
/// is the wire layout order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// The behavioral refinement a class belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Struct,
    Request { opcode: u8 },
    Reply,
    Event,
    /// The X11 `XGE` event format: code 35, extension id + evtype preamble.
    GenericEvent,
    Error { code: u8 },
    /// Declared size is mandatory; it is the size of the largest member.
    Union,
}

/// The full, order-significant description of one message class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub name: &'static str,
    pub kind: ClassKind,
    pub fields: &'static [FieldDescriptor],
    pub declared_size: Option<Expr>,
}

impl ClassDescriptor {
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolution_covers_known_aliases() {
        assert_eq!(resolve_alias("CARD32"), Some(PrimType::U4));
        assert_eq!(resolve_alias("BOOL"), Some(PrimType::U1));
        assert_eq!(resolve_alias("double"), Some(PrimType::F64));
        assert_eq!(resolve_alias("fd"), Some(PrimType::U4));
        assert_eq!(resolve_alias("nonsense"), None);
    }

    #[test]
    fn widths_match_tag_table() {
        assert_eq!(PrimType::U1.width().bytes(), 1);
        assert_eq!(PrimType::I2.width().bytes(), 2);
        assert_eq!(PrimType::U4.width().bytes(), 4);
        assert_eq!(PrimType::F64.width().bytes(), 8);
    }
}
