//! Commitment primitives: pre-game salts and the hash that binds a player
//! to a layout they haven't revealed yet.
//!
//! A side commits to `sha256(server_salt | "|" | client_salt | "|" |
//! canonical_layout)` before play starts, and only reveals the actual
//! layout once the game ends. Verification recomputes the hash from the
//! revealed layout and the two salts and compares.

use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    pub fn as_identifier(&self) -> &'static str {
        match self {
            Orientation::Horizontal => "horizontal",
            Orientation::Vertical => "vertical",
        }
    }

    fn flag(&self) -> u8 {
        match self {
            Orientation::Horizontal => 0,
            Orientation::Vertical => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipPlacement {
    pub size: u8,
    pub x: u8,
    pub y: u8,
    pub orientation: Orientation,
}

impl ShipPlacement {
    /// Every cell this ship occupies on a 10x10 board.
    pub fn cells(&self) -> Vec<(u8, u8)> {
        (0..self.size)
            .map(|i| match self.orientation {
                Orientation::Horizontal => (self.x + i, self.y),
                Orientation::Vertical => (self.x, self.y + i),
            })
            .collect()
    }
}

/// Generates a fresh random salt for a new commitment.
pub fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect()
}

/// Canonical ordering for hashing: largest ship first, ties broken by
/// descending (x, y). Declaration order on the wire must not affect the
/// commitment hash, so every layout is sorted the same way before hashing.
pub fn canonical_layout(ships: &[ShipPlacement]) -> Vec<ShipPlacement> {
    let mut sorted = ships.to_vec();
    sorted.sort_by(|a, b| {
        (b.size, b.x, b.y).cmp(&(a.size, a.x, a.y))
    });
    sorted
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Computes the commitment hash for a layout given both sides' salts.
/// `layout` is hashed as declared — callers pass `canonical_layout(..)`
/// output so that declaration order never changes the digest.
pub fn commitment_hash(server_salt: &str, client_salt: &str, layout: &[ShipPlacement]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(server_salt.as_bytes());
    hasher.update(b"|");
    hasher.update(client_salt.as_bytes());
    hasher.update(b"|");
    for ship in layout {
        hasher.update(
            format!(
                "{},{},{},{}|",
                ship.size,
                ship.x,
                ship.y,
                ship.orientation.flag()
            )
            .as_bytes(),
        );
    }
    to_hex(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ShipPlacement> {
        vec![
            ShipPlacement { size: 5, x: 0, y: 0, orientation: Orientation::Horizontal },
            ShipPlacement { size: 4, x: 0, y: 2, orientation: Orientation::Vertical },
            ShipPlacement { size: 3, x: 5, y: 5, orientation: Orientation::Horizontal },
            ShipPlacement { size: 3, x: 1, y: 8, orientation: Orientation::Vertical },
            ShipPlacement { size: 2, x: 9, y: 9, orientation: Orientation::Horizontal },
        ]
    }

    #[test]
    fn hash_is_deterministic() {
        let layout = canonical_layout(&sample());
        let a = commitment_hash("ssalt", "csalt", &layout);
        let b = commitment_hash("ssalt", "csalt", &layout);
        assert_eq!(a, b);
    }

    #[test]
    fn canonicalization_is_permutation_invariant() {
        let mut permuted = sample();
        permuted.reverse();
        assert_eq!(canonical_layout(&sample()), canonical_layout(&permuted));
        let h1 = commitment_hash("s", "c", &canonical_layout(&sample()));
        let h2 = commitment_hash("s", "c", &canonical_layout(&permuted));
        assert_eq!(h1, h2);
    }

    #[test]
    fn single_field_change_changes_the_hash() {
        let layout = canonical_layout(&sample());
        let mut mutated = layout.clone();
        mutated[0].x += 1;
        let h1 = commitment_hash("s", "c", &layout);
        let h2 = commitment_hash("s", "c", &mutated);
        assert_ne!(h1, h2);
    }

    #[test]
    fn different_salts_change_the_hash() {
        let layout = canonical_layout(&sample());
        let h1 = commitment_hash("s1", "c", &layout);
        let h2 = commitment_hash("s2", "c", &layout);
        assert_ne!(h1, h2);
    }
}
