//! Three-valued logic used wherever static analysis may not be able to decide a
//! question from schema information alone.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bool3 {
    True,
    False,
    Unknown,
}

impl Bool3 {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Bool3::True
        } else {
            Bool3::False
        }
    }

    /// FALSE dominates, otherwise UNKNOWN propagates.
    pub fn and(self, other: Bool3) -> Bool3 {
        match (self, other) {
            (Bool3::False, _) | (_, Bool3::False) => Bool3::False,
            (Bool3::True, Bool3::True) => Bool3::True,
            _ => Bool3::Unknown,
        }
    }

    /// TRUE dominates, otherwise UNKNOWN propagates.
    pub fn or(self, other: Bool3) -> Bool3 {
        match (self, other) {
            (Bool3::True, _) | (_, Bool3::True) => Bool3::True,
            (Bool3::False, Bool3::False) => Bool3::False,
            _ => Bool3::Unknown,
        }
    }

    pub fn always(self) -> bool {
        self == Bool3::True
    }

    pub fn never(self) -> bool {
        self == Bool3::False
    }

    pub fn maybe(self) -> bool {
        self != Bool3::False
    }

    pub fn maybe_not(self) -> bool {
        self != Bool3::True
    }

    pub fn is_unknown(self) -> bool {
        self == Bool3::Unknown
    }

    /// Known truth value, if any.
    pub fn to_option(self) -> Option<bool> {
        match self {
            Bool3::True => Some(true),
            Bool3::False => Some(false),
            Bool3::Unknown => None,
        }
    }
}

impl From<bool> for Bool3 {
    fn from(b: bool) -> Self {
        Bool3::from_bool(b)
    }
}

impl Not for Bool3 {
    type Output = Bool3;

    fn not(self) -> Bool3 {
        match self {
            Bool3::True => Bool3::False,
            Bool3::False => Bool3::True,
            Bool3::Unknown => Bool3::Unknown,
        }
    }
}

impl BitAnd for Bool3 {
    type Output = Bool3;

    fn bitand(self, rhs: Bool3) -> Bool3 {
        self.and(rhs)
    }
}

impl BitOr for Bool3 {
    type Output = Bool3;

    fn bitor(self, rhs: Bool3) -> Bool3 {
        self.or(rhs)
    }
}

impl fmt::Display for Bool3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bool3::True => write!(f, "true"),
            Bool3::False => write!(f, "false"),
            Bool3::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectives_with_unknown() {
        assert_eq!(Bool3::True.and(Bool3::Unknown), Bool3::Unknown);
        assert_eq!(Bool3::False.and(Bool3::Unknown), Bool3::False);
        assert_eq!(Bool3::Unknown.and(Bool3::False), Bool3::False);
        assert_eq!(Bool3::True.or(Bool3::Unknown), Bool3::True);
        assert_eq!(Bool3::False.or(Bool3::Unknown), Bool3::Unknown);
        assert_eq!(!Bool3::Unknown, Bool3::Unknown);
    }

    #[test]
    fn test_operator_forms_match_methods() {
        assert_eq!(Bool3::True & Bool3::True, Bool3::True);
        assert_eq!(Bool3::False | Bool3::False, Bool3::False);
        assert!(Bool3::Unknown.maybe());
        assert!(Bool3::Unknown.maybe_not());
        assert!(!Bool3::True.maybe_not());
    }
}
