use sha2::{Digest, Sha256};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RowColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RowColor {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

const WELL_KNOWN: &[(&str, RowColor)] = &[
    ("claude", RowColor::rgb(255, 159, 26)),
    ("codex", RowColor::rgb(96, 165, 250)),
    ("gemini", RowColor::rgb(167, 139, 250)),
    ("opencode", RowColor::rgb(52, 211, 153)),
    ("cursor", RowColor::rgb(244, 114, 182)),
    ("copilot", RowColor::rgb(148, 163, 184)),
];

// Kept away from the well-known hues so hashed rows stay distinguishable.
const HASHED: &[RowColor] = &[
    RowColor::rgb(251, 191, 36),
    RowColor::rgb(45, 212, 191),
    RowColor::rgb(129, 140, 248),
    RowColor::rgb(248, 113, 113),
    RowColor::rgb(163, 230, 53),
    RowColor::rgb(56, 189, 248),
    RowColor::rgb(232, 121, 249),
    RowColor::rgb(253, 186, 116),
    RowColor::rgb(134, 239, 172),
    RowColor::rgb(196, 181, 253),
    RowColor::rgb(252, 165, 165),
    RowColor::rgb(103, 232, 249),
];

pub fn source_color(source: &str) -> RowColor {
    WELL_KNOWN
        .iter()
        .find(|(name, _)| *name == source)
        .map(|(_, color)| *color)
        .unwrap_or_else(|| hashed_color(source))
}

/// Stable across runs and platforms.
pub fn hashed_color(key: &str) -> RowColor {
    let digest = Sha256::digest(key.as_bytes());
    let index = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize;
    HASHED[index % HASHED.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_sources_have_fixed_colors() {
        assert_eq!(source_color("claude"), RowColor::rgb(255, 159, 26));
        assert_eq!(source_color("codex"), RowColor::rgb(96, 165, 250));
    }

    #[test]
    fn hashed_colors_are_deterministic() {
        assert_eq!(hashed_color("aider"), hashed_color("aider"));
        assert!(HASHED.contains(&source_color("some-new-agent")));
    }
}
