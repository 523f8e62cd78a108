use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::AHasher;
use fastpath_ast::Value;

/// Cache key summarizing the stable inputs of a call.
///
/// Which variant a builder picks decides the comparison semantics: `Hashed`
/// trusts a 64-bit digest, `Values` compares the inputs themselves, and
/// `Constant` never changes so only an explicit refresh rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    Constant,
    Hashed(u64),
    Values(Arc<[Value]>),
}

impl Fingerprint {
    pub fn constant() -> Self {
        Fingerprint::Constant
    }

    pub fn hashed(values: &[Value]) -> Self {
        let mut hasher = AHasher::default();
        values.len().hash(&mut hasher);
        for value in values {
            value.hash(&mut hasher);
        }
        Fingerprint::Hashed(hasher.finish())
    }

    pub fn of_values(values: &[Value]) -> Self {
        Fingerprint::Values(values.into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Constant => f.write_str("constant"),
            Fingerprint::Hashed(digest) => write!(f, "hash:{digest:016x}"),
            Fingerprint::Values(values) => {
                f.write_str("values(")?;
                for (position, value) in values.iter().enumerate() {
                    if position > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_fingerprints_are_stable_and_sensitive() {
        let a = [Value::Int(10), Value::str("eu")];
        let b = [Value::Int(20), Value::str("eu")];
        assert_eq!(Fingerprint::hashed(&a), Fingerprint::hashed(&a));
        assert_ne!(Fingerprint::hashed(&a), Fingerprint::hashed(&b));
    }

    #[test]
    fn value_fingerprints_compare_exactly() {
        let float = Fingerprint::of_values(&[Value::Float(1.0)]);
        let int = Fingerprint::of_values(&[Value::Int(1)]);
        assert_ne!(float, int);
        assert_eq!(float.to_string(), "values(1.0)");
        assert_eq!(Fingerprint::constant().to_string(), "constant");
    }
}
