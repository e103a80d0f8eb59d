//! Element kinds and shape arithmetic.

use std::fmt;

/// Element type of a tensor exchanged with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Single-byte boolean, only ever used as a scalar.
    Bool,
    /// Unsigned 8-bit integer.
    UInt8,
    /// 32-bit IEEE-754 float.
    Float32,
}

impl ElementKind {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            ElementKind::Bool | ElementKind::UInt8 => 1,
            ElementKind::Float32 => 4,
        }
    }

    /// Kind used for a host typed buffer whose elements are `width` bytes wide.
    pub const fn for_element_width(width: usize) -> Self {
        if width == 1 {
            ElementKind::UInt8
        } else {
            ElementKind::Float32
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Bool => "bool",
            ElementKind::UInt8 => "uint8",
            ElementKind::Float32 => "float32",
        };
        f.write_str(name)
    }
}

/// Number of elements described by `dims`.
///
/// Zero dimensions is the empty product and yields 1. Returns `None` for a
/// negative extent or on overflow.
pub fn element_count(dims: &[i64]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| {
        let d = usize::try_from(d).ok()?;
        acc.checked_mul(d)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dims_is_one_element() {
        assert_eq!(element_count(&[]), Some(1));
    }

    #[test]
    fn test_element_count_product() {
        assert_eq!(element_count(&[1, 28, 28, 1]), Some(784));
        assert_eq!(element_count(&[3, 0, 5]), Some(0));
    }

    #[test]
    fn test_element_count_rejects_negative_and_overflow() {
        assert_eq!(element_count(&[2, -1]), None);
        assert_eq!(element_count(&[i64::MAX, i64::MAX]), None);
    }

    #[test]
    fn test_kind_for_element_width() {
        assert_eq!(ElementKind::for_element_width(1), ElementKind::UInt8);
        assert_eq!(ElementKind::for_element_width(4), ElementKind::Float32);
        assert_eq!(ElementKind::for_element_width(8), ElementKind::Float32);
    }
}
