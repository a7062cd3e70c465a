//! Bounded sets of option numbers.
use bit_set::BitSet;

use crate::pdu::Pdu;

/// Largest option number a filter can hold.
pub const MAX_FILTER_OPTION: u16 = 63;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionFilter {
    bits: BitSet,
}

impl OptionFilter {
    pub fn new() -> OptionFilter {
        OptionFilter {
            bits: BitSet::with_capacity(MAX_FILTER_OPTION as usize + 1),
        }
    }

    /// Adds `number`. Returns `false` if it lies beyond the filter range.
    pub fn set(&mut self, number: u16) -> bool {
        if number > MAX_FILTER_OPTION {
            return false;
        }
        self.bits.insert(number as usize);
        true
    }

    pub fn unset(&mut self, number: u16) {
        self.bits.remove(number as usize);
    }

    pub fn contains(&self, number: u16) -> bool {
        self.bits.contains(number as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.bits.iter().map(|n| n as u16)
    }
}

impl Default for OptionFilter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_critical(number: u16) -> bool {
    number & 0x01 == 1
}

/// Checks every critical option of `pdu` against `known`.
///
/// Unknown critical options are recorded in `unknown`; recording stops at the
/// first one beyond the filter range. Returns `true` if all are known.
pub fn check_critical(known: &OptionFilter, pdu: &Pdu, unknown: &mut OptionFilter) -> bool {
    let mut ok = true;
    for (number, _) in pdu.options() {
        if is_critical(number) && !known.contains(number) {
            log::debug!("unknown critical option {}", number);
            ok = false;
            if !unknown.set(number) {
                break;
            }
        }
    }
    ok
}
