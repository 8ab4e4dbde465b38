//! Regional variants of the asset store, each with its own compiled-in
//! prefix, canonical V3 name sum, and V3 key table.
//!
//! | Region | Prefix                 | Name sum |
//! |--------|------------------------|----------|
//! | EN/WW  | `BFd3EnkcKa`           | 844      |
//! | JP     | `Hello`                | 500      |
//! | TW     | `M2o2B7i3M6o6N88`      | 1051     |
//! | CN     | `iLbs0LpvJrXm3zjdhAr4` | 1847     |

use crate::tables::{self, LcgParams};

/// One of the four known regional variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// English / Worldwide.
    En,
    /// Japan.
    Jp,
    /// Taiwan.
    Tw,
    /// China.
    Cn,
}

impl Region {
    /// All known regions, in the order `decrypt_init_auto_region` tries
    /// them.
    pub const ALL: [Region; 4] = [Region::En, Region::Jp, Region::Tw, Region::Cn];

    /// The region's compiled-in prefix string (the regional secret).
    pub fn prefix(self) -> &'static str {
        match self {
            Region::En => "BFd3EnkcKa",
            Region::Jp => "Hello",
            Region::Tw => "M2o2B7i3M6o6N88",
            Region::Cn => "iLbs0LpvJrXm3zjdhAr4",
        }
    }

    /// The region's canonical V3 name sum (the unsigned byte sum of its
    /// prefix).
    pub fn name_sum(self) -> u32 {
        match self {
            Region::En => 844,
            Region::Jp => 500,
            Region::Tw => 1051,
            Region::Cn => 1847,
        }
    }

    /// The region's 64-entry V3 key table.
    pub fn key_table(self) -> &'static [u32; 64] {
        match self {
            Region::En => &tables::EN_V3_KEYTABLE,
            Region::Jp => &tables::JP_V3_KEYTABLE,
            Region::Tw => &tables::TW_V3_KEYTABLE,
            Region::Cn => &tables::CN_V3_KEYTABLE,
        }
    }
}

/// Selects a table entry `(index + signed_sum) & 3` from [`tables::LCG_TABLE`].
///
/// Shared by V5/V6 key derivation (`init.rs`) - kept here since it's purely
/// a lookup over this module's data.
pub(crate) fn lcg_params_at(index: usize) -> LcgParams {
    tables::LCG_TABLE[index & 3]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::byte_sum;

    #[test]
    fn name_sums_match_prefix_byte_sums() {
        for region in Region::ALL {
            assert_eq!(byte_sum(region.prefix()), region.name_sum());
        }
    }
}
