/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

/// Bounds on the number of bytes a body will produce
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct SizeHint {
    lower: u64,
    upper: Option<u64>,
}

impl SizeHint {
    /// A size hint with no known bounds
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Set an exact size hint with upper and lower set to `size` bytes.
    pub fn exact(size: u64) -> Self {
        Self {
            lower: size,
            upper: Some(size),
        }
    }

    /// Set the lower bound on the body size
    pub fn with_lower(self, lower: u64) -> Self {
        Self { lower, ..self }
    }

    /// Set the upper bound on the body size
    pub fn with_upper(self, upper: Option<u64>) -> Self {
        Self { upper, ..self }
    }

    /// Get the lower bound of the body size
    pub fn lower(&self) -> u64 {
        self.lower
    }

    /// Get the upper bound of the body size if known.
    pub fn upper(&self) -> Option<u64> {
        self.upper
    }

    /// The exact size, when both bounds agree
    pub fn exact_len(&self) -> Option<u64> {
        self.upper.filter(|upper| *upper == self.lower)
    }
}

#[cfg(test)]
mod test {
    use super::SizeHint;

    #[test]
    fn exact_only_when_bounds_agree() {
        assert_eq!(Some(10), SizeHint::exact(10).exact_len());
        assert_eq!(None, SizeHint::unknown().exact_len());
        assert_eq!(
            None,
            SizeHint::unknown().with_lower(3).with_upper(Some(5)).exact_len()
        );
        assert_eq!(3, SizeHint::exact(5).with_lower(3).lower());
    }
}
