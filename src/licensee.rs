//! Cartridge licensee (publisher) code lookup.
//!
//! The header carries either an "old" one-byte licensee code at 0x014B or,
//! when that byte is 0x33, a "new" two-character ASCII code at 0x0144-0x0145.
//! Only a small, well-known subset of the official code table is resolved to
//! a name; anything else is reported by its raw code.

use std::fmt::{self, Display, Formatter};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Licensee {
    Known(&'static str),
    UnknownOld(u8),
    UnknownNew([u8; 2]),
}

impl Licensee {
    pub fn from_data(old_code: u8, new_code: &[u8]) -> Self {
        if old_code == 0x33 {
            let code = std::str::from_utf8(new_code).unwrap_or("").trim();
            return match NEW_LICENSEES.iter().find(|(c, _)| *c == code) {
                Some((_, name)) => Licensee::Known(name),
                None => Licensee::UnknownNew([new_code[0], new_code[1]]),
            };
        }
        match OLD_LICENSEES.iter().find(|(c, _)| *c == old_code) {
            Some((_, name)) => Licensee::Known(name),
            None => Licensee::UnknownOld(old_code),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Licensee::Known(name) => name.to_string(),
            Licensee::UnknownOld(code) => format!("Unknown (0x{code:02x})"),
            Licensee::UnknownNew(code) => {
                format!("Unknown ({})", String::from_utf8_lossy(code))
            }
        }
    }
}

impl Display for Licensee {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

const OLD_LICENSEES: &[(u8, &str)] = &[
    (0x00, "None"),
    (0x01, "Nintendo"),
    (0x08, "Capcom"),
    (0x09, "Hot-B"),
    (0x0a, "Jaleco"),
    (0x13, "Electronic Arts"),
    (0x18, "Hudson Soft"),
    (0x19, "ITC Entertainment"),
    (0x20, "KSS"),
    (0x24, "PCM Complete"),
    (0x28, "Kemco Japan"),
    (0x30, "Viacom"),
    (0x31, "Nintendo"),
    (0x33, "(new licensee code)"),
    (0x34, "Konami"),
    (0x38, "Capcom"),
    (0x41, "Ubi Soft"),
    (0x46, "Angel"),
    (0x49, "Irem"),
    (0x50, "Absolute"),
    (0x56, "LJN"),
    (0x5a, "Mindscape"),
    (0x69, "Electronic Arts"),
    (0x70, "Infogrames"),
    (0x78, "THQ"),
    (0x83, "Lozc"),
    (0x8c, "Vic Tokai"),
    (0x91, "Chunsoft"),
    (0x99, "Pack in soft"),
    (0xa4, "Konami"),
];

const NEW_LICENSEES: &[(&str, &str)] = &[
    ("00", "None"),
    ("01", "Nintendo"),
    ("08", "Capcom"),
    ("13", "Electronic Arts"),
    ("18", "Hudson Soft"),
    ("19", "B-AI"),
    ("20", "KSS"),
    ("22", "POW"),
    ("24", "PCM Complete"),
    ("25", "San-X"),
    ("28", "Kemco Japan"),
    ("29", "Seta"),
    ("30", "Viacom"),
    ("31", "Nintendo"),
    ("32", "Bandai"),
    ("33", "Ocean/Acclaim"),
    ("34", "Konami"),
    ("35", "Hector"),
    ("37", "Taito"),
    ("38", "Hudson"),
    ("39", "Banpresto"),
    ("41", "Ubi Soft"),
    ("42", "Atlus"),
    ("44", "Malibu"),
    ("46", "Angel"),
    ("47", "Bullet-Proof"),
    ("49", "Irem"),
    ("50", "Absolute"),
    ("51", "Acclaim"),
    ("52", "Activision"),
    ("53", "American sammy"),
    ("54", "Konami"),
    ("55", "Hi tech entertainment"),
    ("56", "LJN"),
    ("57", "Matchbox"),
    ("58", "Mattel"),
    ("59", "Milton Bradley"),
    ("60", "Titus"),
    ("61", "Virgin"),
    ("64", "LucasArts"),
    ("67", "Ocean"),
    ("69", "Electronic Arts"),
    ("70", "Infogrames"),
    ("71", "Interplay"),
    ("72", "Broderbund"),
    ("73", "Sculptured"),
    ("75", "Sci"),
    ("78", "THQ"),
    ("79", "Accolade"),
    ("80", "Misawa"),
    ("83", "Lozc"),
    ("86", "Tokuma Shoten"),
    ("87", "Tsukuda Original"),
    ("91", "Chunsoft"),
    ("92", "Video system"),
    ("93", "Ocean/Acclaim"),
    ("95", "Varie"),
    ("96", "Yonezawa/s'pal"),
    ("97", "Kaneko"),
    ("99", "Pack in soft"),
    ("A4", "Konami (Yu-Gi-Oh!)"),
];
