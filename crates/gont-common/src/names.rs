//! Name validation and the word list used for generated network names.

use rand::Rng;

use crate::{GontError, GontResult};

/// Longest accepted network or node name.
///
/// Keeps `gont-<network>-<node>` well below the filesystem name limit.
pub const MAX_NAME_LEN: usize = 64;

/// Longest accepted interface name (`IFNAMSIZ` minus the NUL byte).
pub const MAX_IFNAME_LEN: usize = 15;

// From: https://en.wikipedia.org/wiki/List_of_Internet_pioneers
//  and  https://www.internethalloffame.org/inductees/all
/// Curated word list for generated network names.
pub static NAMES: &[&str] = &[
    "akkerhuis",
    "akplogan",
    "allman",
    "andreessen",
    "andres",
    "armour-polly",
    "baker",
    "banks",
    "baran",
    "barlow",
    "berners-lee",
    "bina",
    "brandenburg",
    "bukhalid",
    "bush",
    "cailliau",
    "cerf",
    "chon",
    "cioffi",
    "claffy",
    "clark",
    "cohen",
    "comer",
    "crocker",
    "dalal",
    "davies",
    "dias",
    "elgamal",
    "emtage",
    "engelbart",
    "esterhuysen",
    "estrada",
    "farber",
    "feinler",
    "floyd",
    "flueckiger",
    "frank",
    "fuchs",
    "gerich",
    "getschko",
    "goldstein",
    "gore",
    "goto",
    "hafkin",
    "hagen",
    "heart",
    "herzfeld",
    "hirabaru",
    "holz",
    "hu",
    "huizer",
    "huston",
    "huter",
    "induruwa",
    "irving",
    "ishida",
    "jacobson",
    "jennings",
    "jensen",
    "kahle",
    "kahn",
    "kanchanasut",
    "karrenberg",
    "kent",
    "kirstein",
    "kleinrock",
    "klensin",
    "krol",
    "landweber",
    "laquey-parker",
    "leiner",
    "licklider",
    "loewinder",
    "lynch",
    "mccahill",
    "metcalfe",
    "mills",
    "mockapetris",
    "murai",
    "muthoni",
    "neggers",
    "nelson",
    "newmark",
    "nordhagen",
    "partridge",
    "pellow",
    "perlman",
    "pietrosemoli",
    "postel",
    "pouzin",
    "pun",
    "qian",
    "quaynor",
    "ramani",
    "reynolds",
    "ricart",
    "roberts",
    "sadowsky",
    "schulzrinne",
    "segal",
    "shannon",
    "soriano",
    "stallman",
    "stanton",
    "swartz",
    "takahashi",
    "taylor",
    "tin-wee",
    "tomlinson",
    "torvalds",
    "utreras",
    "van-houweling",
    "vixie",
    "wales",
    "wierenga",
    "wolff",
    "wu",
    "yamaguchi",
    "zimmermann",
    "zorn",
];

/// Draw one random entry from [`NAMES`].
#[must_use]
pub fn random_name() -> &'static str {
    let index = rand::thread_rng().gen_range(0..NAMES.len());
    NAMES[index]
}

/// Check that a name is usable for a network or node.
///
/// # Errors
///
/// Returns [`GontError::InvalidName`] if the name is empty, longer than
/// [`MAX_NAME_LEN`], a relative-path component, or contains `/`, NUL, or
/// whitespace.
pub fn validate_name(name: &str) -> GontResult<()> {
    let ok = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name != "."
        && name != ".."
        && !name
            .chars()
            .any(|c| c == '/' || c == '\0' || c.is_whitespace());
    if ok {
        Ok(())
    } else {
        Err(GontError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Check that a name is usable for a network interface.
///
/// # Errors
///
/// Returns [`GontError::InvalidName`] unless the name fits in `IFNAMSIZ`
/// and is free of `/`, NUL, and whitespace.
pub fn validate_ifname(name: &str) -> GontResult<()> {
    validate_name(name)?;
    if name.len() <= MAX_IFNAME_LEN {
        Ok(())
    } else {
        Err(GontError::InvalidName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        for name in ["h1", "sw-1", "r_0", "host.left", "a"] {
            assert!(validate_name(name).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn invalid_names() {
        for name in ["", ".", "..", "a/b", "a b", "a\tb", "a\0b", &"x".repeat(65)] {
            assert!(validate_name(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn ifname_length_bound() {
        assert!(validate_ifname("veth0").is_ok());
        assert!(validate_ifname("abcdefghijklmno").is_ok());
        assert!(validate_ifname("abcdefghijklmnop").is_err());
    }

    #[test]
    fn word_list_entries_are_valid_names() {
        for name in NAMES {
            assert!(validate_name(name).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn random_name_draws_from_list() {
        for _ in 0..16 {
            assert!(NAMES.contains(&random_name()));
        }
    }
}
