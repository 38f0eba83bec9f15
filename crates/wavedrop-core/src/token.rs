//! Share token generation and validation.
//!
//! A share token is two words from a fixed list concatenated into one
//! lowercase string, e.g. `oceanriver` or `quietmoon`. Tokens are easy to
//! read out loud and easy to type, and validity is a pure syntactic check:
//! 6 to 30 lowercase ASCII letters.

use crate::error::{Error, Result};

/// Minimum token length (two three-letter words).
pub const TOKEN_MIN_LEN: usize = 6;

/// Maximum token length.
pub const TOKEN_MAX_LEN: usize = 30;

/// Word list for token generation.
const WORDS: &[&str] = &[
    "happy", "quiet", "bright", "swift", "calm", "fresh", "cool", "warm",
    "soft", "bold", "ocean", "river", "cloud", "storm", "breeze", "rain",
    "snow", "wind", "fire", "wave", "moon", "star", "sun", "sky", "dawn",
    "dusk", "night", "day", "light", "dark", "blue", "red", "green", "gold",
    "silver", "pink", "purple", "orange", "white", "black", "forest",
    "mountain", "valley", "desert", "jungle", "meadow", "field", "lake",
    "pond", "hill", "tiger", "eagle", "wolf", "bear", "deer", "fox", "owl",
    "hawk", "lion", "dove", "fast", "slow", "high", "low", "big", "small",
    "long", "short", "wide", "thin", "music", "dance", "song", "rhythm",
    "melody", "harmony", "beat", "tune", "note", "chord", "dream", "hope",
    "wish", "joy", "peace", "love", "care", "trust", "faith", "grace",
    "spring", "summer", "autumn", "winter", "season", "bloom", "leaf",
    "seed", "root", "branch", "crystal", "pearl", "gem", "jade", "ruby",
    "amber", "coral", "opal", "topaz", "onyx", "magic", "mystic", "cosmic",
    "astral", "lunar", "solar", "stellar", "zen", "flow", "alpha", "beta",
    "gamma", "delta", "omega", "sigma", "theta", "kappa", "lambda",
    "phoenix", "dragon", "griffin", "sphinx", "hydra", "kraken", "titan",
    "atlas", "orion", "noble", "royal", "prime", "ultra", "mega", "super",
    "hyper", "neo", "nova", "apex", "echo", "pulse", "sonic", "flash",
    "spark", "blaze", "frost", "mist", "haze", "north", "south", "east",
    "west", "zenith", "nadir", "horizon", "wisdom", "valor", "honor",
    "glory", "pride", "courage", "spirit", "power", "energy", "force",
    "arrow", "blade", "crown", "throne", "shield", "sword", "lance", "helm",
    "armor", "castle", "tower", "citadel", "bastion", "palace", "temple",
    "shrine", "altar", "vault", "quest", "voyage", "journey", "odyssey",
    "trek", "safari", "cruise", "tour", "legend", "myth", "fable", "tale",
    "story", "epic", "saga", "lore", "cipher", "code", "key", "lock",
    "seal", "mark", "sign", "symbol", "emblem", "circle", "square",
    "sphere", "cube", "pyramid", "prism", "cone", "spiral", "anchor",
    "compass", "mast", "sail", "oar", "rudder", "deck", "hull", "keel",
    "summit", "peak", "crest", "ridge", "cliff", "canyon", "gorge",
    "ravine", "chasm", "abyss", "portal", "gateway", "passage", "path",
    "road", "trail", "route", "course", "way", "street", "nexus", "vertex",
    "quantum", "photon", "neutron", "proton", "electron", "quark", "atom",
    "ion", "plasma", "vector", "matrix", "tensor", "scalar", "formula",
    "theorem", "axiom", "lemma", "proof", "logic", "rapid", "agile",
    "nimble", "quick", "fleet", "speedy", "brisk", "lively", "active",
    "gentle", "tender", "mild", "kind", "sweet", "smooth", "silky",
    "velvet", "satin", "silk", "crisp", "sharp", "keen", "acute", "vivid",
    "lucid", "clear", "pure", "clean", "pristine", "silent", "still",
    "hushed", "serene", "placid", "thunder", "tempest", "gale", "cyclone",
    "tornado", "typhoon", "monsoon", "blizzard", "haven", "refuge",
    "shelter", "harbor", "port", "bay", "cove", "inlet", "oasis",
    "paradise", "eden", "utopia", "nirvana", "arcadia", "sentinel",
    "guardian", "watcher", "keeper", "champion", "warrior", "knight",
    "paladin", "enigma", "riddle", "puzzle", "mystery", "secret", "hidden",
    "arcane", "spectrum", "rainbow", "aurora", "halo", "corona", "nimbus",
    "aura", "glow", "shimmer", "radiant", "luminous", "brilliant",
    "gleaming", "shining", "dazzling", "eclipse", "equinox", "solstice",
    "transit", "phase", "cycle", "period", "epoch", "era", "nebula",
    "galaxy", "cosmos", "comet", "meteor", "planet",
];

/// A validated share token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShareToken {
    token: String,
}

impl ShareToken {
    /// Parse and validate a share token from a string.
    ///
    /// Input is trimmed and lowercased before validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTokenFormat`] if the token is not 6-30
    /// lowercase ASCII letters.
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().to_lowercase();

        if normalized.len() < TOKEN_MIN_LEN || normalized.len() > TOKEN_MAX_LEN {
            return Err(Error::InvalidTokenFormat(format!(
                "token must be {TOKEN_MIN_LEN}-{TOKEN_MAX_LEN} characters, got {}",
                normalized.len()
            )));
        }

        if !normalized.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(Error::InvalidTokenFormat(
                "token must contain only lowercase letters".to_string(),
            ));
        }

        Ok(Self { token: normalized })
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Display for ShareToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token)
    }
}

/// Generator for share tokens.
#[derive(Debug, Default)]
pub struct TokenGenerator;

impl TokenGenerator {
    /// Create a new token generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generate a new random two-word share token.
    pub fn generate(&self) -> ShareToken {
        use rand::seq::SliceRandom;

        let mut rng = rand::thread_rng();
        let first = WORDS.choose(&mut rng).copied().unwrap_or("ocean");
        let second = WORDS.choose(&mut rng).copied().unwrap_or("river");

        ShareToken {
            token: format!("{first}{second}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_validate() {
        let generator = TokenGenerator::new();
        for _ in 0..100 {
            let token = generator.generate();
            assert!(ShareToken::parse(token.as_str()).is_ok(), "{token}");
        }
    }

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let token = ShareToken::parse("  OceanRiver  ").expect("valid");
        assert_eq!(token.as_str(), "oceanriver");
    }

    #[test]
    fn parse_rejects_bad_formats() {
        assert!(ShareToken::parse("short").is_err());
        assert!(ShareToken::parse("has space").is_err());
        assert!(ShareToken::parse("digit42mixed").is_err());
        assert!(ShareToken::parse(&"a".repeat(31)).is_err());
    }

    #[test]
    fn word_list_is_lowercase_ascii() {
        for word in WORDS {
            assert!(
                word.chars().all(|c| c.is_ascii_lowercase()),
                "word list entry '{word}' would produce an invalid token"
            );
            assert!(word.len() >= 3, "word '{word}' too short");
        }
    }
}
