//! Symbol role and relation bit sets.
//!
//! The bit positions are a wire contract shared with the C boundary and with
//! persisted stores: occurrence roles occupy bits 0-8, relation roles bits
//! 9-18 and bit 63 marks the canonical occurrence of a symbol.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Set of roles attached to an occurrence or a relation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
    pub struct SymbolRoleSet: u64 {
        const DECLARATION = 1 << 0;
        const DEFINITION  = 1 << 1;
        const REFERENCE   = 1 << 2;
        const READ        = 1 << 3;
        const WRITE       = 1 << 4;
        const CALL        = 1 << 5;
        const DYNAMIC     = 1 << 6;
        const ADDRESS_OF  = 1 << 7;
        const IMPLICIT    = 1 << 8;

        const REL_CHILD_OF          = 1 << 9;
        const REL_BASE_OF           = 1 << 10;
        const REL_OVERRIDE_OF       = 1 << 11;
        const REL_RECEIVED_BY       = 1 << 12;
        const REL_CALLED_BY         = 1 << 13;
        const REL_EXTENDED_BY       = 1 << 14;
        const REL_ACCESSOR_OF       = 1 << 15;
        const REL_CONTAINED_BY      = 1 << 16;
        const REL_IBTYPE_OF         = 1 << 17;
        const REL_SPECIALIZATION_OF = 1 << 18;

        const CANONICAL = 1 << 63;
    }
}

/// Bits describing how a symbol is used at one occurrence.
pub const OCCURRENCE_ROLES: SymbolRoleSet = SymbolRoleSet::from_bits_retain(0x1ff);

/// Bits describing an edge between two symbols.
pub const RELATION_ROLES: SymbolRoleSet = SymbolRoleSet::from_bits_retain(0x7fe00);

const ROLE_NAMES: &[(&str, SymbolRoleSet)] = &[
    ("declaration", SymbolRoleSet::DECLARATION),
    ("definition", SymbolRoleSet::DEFINITION),
    ("reference", SymbolRoleSet::REFERENCE),
    ("read", SymbolRoleSet::READ),
    ("write", SymbolRoleSet::WRITE),
    ("call", SymbolRoleSet::CALL),
    ("dynamic", SymbolRoleSet::DYNAMIC),
    ("addressOf", SymbolRoleSet::ADDRESS_OF),
    ("implicit", SymbolRoleSet::IMPLICIT),
    ("childOf", SymbolRoleSet::REL_CHILD_OF),
    ("baseOf", SymbolRoleSet::REL_BASE_OF),
    ("overrideOf", SymbolRoleSet::REL_OVERRIDE_OF),
    ("receivedBy", SymbolRoleSet::REL_RECEIVED_BY),
    ("calledBy", SymbolRoleSet::REL_CALLED_BY),
    ("extendedBy", SymbolRoleSet::REL_EXTENDED_BY),
    ("accessorOf", SymbolRoleSet::REL_ACCESSOR_OF),
    ("containedBy", SymbolRoleSet::REL_CONTAINED_BY),
    ("ibTypeOf", SymbolRoleSet::REL_IBTYPE_OF),
    ("specializationOf", SymbolRoleSet::REL_SPECIALIZATION_OF),
    ("canonical", SymbolRoleSet::CANONICAL),
];

impl SymbolRoleSet {
    /// Returns true when this set passes a query's role filter.
    ///
    /// An empty filter matches every set; any other filter requires at least
    /// one shared bit.
    pub fn matches_filter(self, filter: SymbolRoleSet) -> bool {
        filter.is_empty() || self.intersects(filter)
    }

    /// The occurrence-role part of this set.
    pub fn occurrence_roles(self) -> SymbolRoleSet {
        self & OCCURRENCE_ROLES
    }

    /// The relation-role part of this set.
    pub fn relation_roles(self) -> SymbolRoleSet {
        self & RELATION_ROLES
    }

    pub fn is_canonical(self) -> bool {
        self.contains(SymbolRoleSet::CANONICAL)
    }

    /// Looks up a single role by its stable name (`definition`, `calledBy`, ...).
    ///
    /// Matching ignores ASCII case and accepts `-`/`_` separators, so
    /// `called-by` and `CALLED_BY` both resolve to [`SymbolRoleSet::REL_CALLED_BY`].
    pub fn from_role_name(name: &str) -> Option<SymbolRoleSet> {
        let wanted: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        ROLE_NAMES
            .iter()
            .find(|(n, _)| n.to_ascii_lowercase() == wanted)
            .map(|(_, role)| *role)
    }

    /// Parses a comma-separated role list. An empty string yields the empty set.
    pub fn parse_list(list: &str) -> Result<SymbolRoleSet, String> {
        let mut roles = SymbolRoleSet::empty();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match SymbolRoleSet::from_role_name(part) {
                Some(role) => roles |= role,
                None => return Err(format!("unknown symbol role '{}'", part)),
            }
        }
        Ok(roles)
    }

    /// Stable names of the known roles in this set, lowest bit first.
    pub fn names(self) -> Vec<&'static str> {
        ROLE_NAMES
            .iter()
            .filter(|(_, role)| self.contains(*role))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl fmt::Display for SymbolRoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            return write!(f, "-");
        }
        write!(f, "{}", names.join(","))
    }
}
