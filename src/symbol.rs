//! Symbol value model: symbols, locations, relations and occurrences.
//!
//! Occurrences are immutable and shared behind [`Arc`]. A location or a
//! relation is only ever handed out as a borrow of its occurrence, so it
//! cannot outlive it.

use crate::roles::SymbolRoleSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Kind of a symbol. Discriminants are part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum SymbolKind {
    #[default]
    Unknown = 0,
    Module = 1,
    Namespace = 2,
    NamespaceAlias = 3,
    Macro = 4,
    Enum = 5,
    Struct = 6,
    Class = 7,
    Protocol = 8,
    Extension = 9,
    Union = 10,
    TypeAlias = 11,
    Function = 12,
    Variable = 13,
    Field = 14,
    EnumConstant = 15,
    InstanceMethod = 16,
    ClassMethod = 17,
    StaticMethod = 18,
    InstanceProperty = 19,
    ClassProperty = 20,
    StaticProperty = 21,
    Constructor = 22,
    Destructor = 23,
    ConversionFunction = 24,
    Parameter = 25,
    Using = 26,
    CommentTag = 1000,
}

const ALL_KINDS: &[SymbolKind] = &[
    SymbolKind::Unknown,
    SymbolKind::Module,
    SymbolKind::Namespace,
    SymbolKind::NamespaceAlias,
    SymbolKind::Macro,
    SymbolKind::Enum,
    SymbolKind::Struct,
    SymbolKind::Class,
    SymbolKind::Protocol,
    SymbolKind::Extension,
    SymbolKind::Union,
    SymbolKind::TypeAlias,
    SymbolKind::Function,
    SymbolKind::Variable,
    SymbolKind::Field,
    SymbolKind::EnumConstant,
    SymbolKind::InstanceMethod,
    SymbolKind::ClassMethod,
    SymbolKind::StaticMethod,
    SymbolKind::InstanceProperty,
    SymbolKind::ClassProperty,
    SymbolKind::StaticProperty,
    SymbolKind::Constructor,
    SymbolKind::Destructor,
    SymbolKind::ConversionFunction,
    SymbolKind::Parameter,
    SymbolKind::Using,
    SymbolKind::CommentTag,
];

impl SymbolKind {
    /// Decodes a raw kind value. Unknown values map to [`SymbolKind::Unknown`].
    pub fn from_raw(raw: u32) -> SymbolKind {
        ALL_KINDS
            .iter()
            .copied()
            .find(|kind| kind.as_raw() == raw)
            .unwrap_or(SymbolKind::Unknown)
    }

    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Lowercase label, used by the CLI and JSON output.
    pub const fn label(self) -> &'static str {
        match self {
            SymbolKind::Unknown => "unknown",
            SymbolKind::Module => "module",
            SymbolKind::Namespace => "namespace",
            SymbolKind::NamespaceAlias => "namespace-alias",
            SymbolKind::Macro => "macro",
            SymbolKind::Enum => "enum",
            SymbolKind::Struct => "struct",
            SymbolKind::Class => "class",
            SymbolKind::Protocol => "protocol",
            SymbolKind::Extension => "extension",
            SymbolKind::Union => "union",
            SymbolKind::TypeAlias => "type-alias",
            SymbolKind::Function => "function",
            SymbolKind::Variable => "variable",
            SymbolKind::Field => "field",
            SymbolKind::EnumConstant => "enum-constant",
            SymbolKind::InstanceMethod => "instance-method",
            SymbolKind::ClassMethod => "class-method",
            SymbolKind::StaticMethod => "static-method",
            SymbolKind::InstanceProperty => "instance-property",
            SymbolKind::ClassProperty => "class-property",
            SymbolKind::StaticProperty => "static-property",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Destructor => "destructor",
            SymbolKind::ConversionFunction => "conversion-function",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Using => "using",
            SymbolKind::CommentTag => "comment-tag",
        }
    }

    /// Parses a label produced by [`SymbolKind::label`].
    pub fn from_label(label: &str) -> Option<SymbolKind> {
        let wanted = label.trim().to_ascii_lowercase().replace('_', "-");
        ALL_KINDS.iter().copied().find(|kind| kind.label() == wanted)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A symbol, identified by its USR.
///
/// Two symbols are equal when their USRs are equal; name and kind do not
/// take part in comparisons.
#[derive(Debug, Clone)]
pub struct Symbol {
    usr: String,
    name: String,
    kind: SymbolKind,
}

pub type SymbolRef = Arc<Symbol>;

impl Symbol {
    pub fn new(usr: impl Into<String>, name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            usr: usr.into(),
            name: name.into(),
            kind,
        }
    }

    pub fn usr(&self) -> &str {
        &self.usr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.usr == other.usr
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.usr.hash(state);
    }
}

/// Position of an occurrence: 1-based line and UTF-8 column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolLocation {
    path: String,
    line: u32,
    column: u32,
    is_system: bool,
}

impl SymbolLocation {
    pub fn new(path: impl Into<String>, line: u32, column: u32, is_system: bool) -> Self {
        Self {
            path: path.into(),
            line,
            column,
            is_system,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column_utf8(&self) -> u32 {
        self.column
    }

    pub fn is_system(&self) -> bool {
        self.is_system
    }

    /// True if this location starts exactly at `line`:`column` of `path`.
    pub fn is_at(&self, path: &str, line: u32, column: u32) -> bool {
        self.line == line && self.column == column && self.path == path
    }
}

impl fmt::Display for SymbolLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.column)
    }
}

/// Edge from an occurrence's symbol to another symbol.
#[derive(Debug, Clone)]
pub struct SymbolRelation {
    roles: SymbolRoleSet,
    symbol: SymbolRef,
}

impl SymbolRelation {
    /// Creates a relation. Non-relation bits are dropped from `roles`.
    pub fn new(roles: SymbolRoleSet, symbol: SymbolRef) -> Self {
        Self {
            roles: roles.relation_roles(),
            symbol,
        }
    }

    pub fn roles(&self) -> SymbolRoleSet {
        self.roles
    }

    pub fn symbol(&self) -> &SymbolRef {
        &self.symbol
    }
}

/// One recorded appearance of a symbol.
#[derive(Debug, Clone)]
pub struct SymbolOccurrence {
    symbol: SymbolRef,
    roles: SymbolRoleSet,
    location: SymbolLocation,
    relations: Vec<SymbolRelation>,
}

pub type SymbolOccurrenceRef = Arc<SymbolOccurrence>;

impl SymbolOccurrence {
    /// Creates an occurrence. The roles of `relations` are added to `roles`.
    pub fn new(
        symbol: SymbolRef,
        roles: SymbolRoleSet,
        location: SymbolLocation,
        relations: Vec<SymbolRelation>,
    ) -> Self {
        let roles = relations.iter().fold(roles, |acc, rel| acc | rel.roles);
        Self {
            symbol,
            roles,
            location,
            relations,
        }
    }

    pub fn symbol(&self) -> &SymbolRef {
        &self.symbol
    }

    pub fn roles(&self) -> SymbolRoleSet {
        self.roles
    }

    pub fn location(&self) -> &SymbolLocation {
        &self.location
    }

    pub fn relations(&self) -> &[SymbolRelation] {
        &self.relations
    }

    /// Streams the relations in order. Returns false if `applier` stopped early.
    pub fn foreach_relation(&self, mut applier: impl FnMut(&SymbolRelation) -> bool) -> bool {
        for relation in &self.relations {
            if !applier(relation) {
                return false;
            }
        }
        true
    }

    /// Relations of this occurrence that point at `usr`.
    pub fn relations_to<'a>(&'a self, usr: &'a str) -> impl Iterator<Item = &'a SymbolRelation> + 'a {
        self.relations.iter().filter(move |rel| rel.symbol.usr() == usr)
    }
}
