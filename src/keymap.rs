use std::collections::HashMap;
use std::convert::TryFrom;

use serde::Deserialize;

use crate::error::CatalogError;
use crate::vm::KEYPAD_SIZE;

/// symbol wired straight to a hard reset, bypassing the keypad mapping
pub const RESET_SYMBOL: &str = "Backspace";

/// left-hand side of a qwerty keyboard laid over the COSMAC hex keypad
///   1 2 3 4      1 2 3 C
///   q w e r  =>  4 5 6 D
///   a s d f      7 8 9 E
///   z x c v      A 0 B F
const CHIP8_CONVENTIONAL_KEYMAP: [(&str, u8); 16] = [
    ("x", 0x00),
    ("1", 0x01),
    ("2", 0x02),
    ("3", 0x03),
    ("q", 0x04),
    ("w", 0x05),
    ("e", 0x06),
    ("a", 0x07),
    ("s", 0x08),
    ("d", 0x09),
    ("z", 0x0a),
    ("c", 0x0b),
    ("4", 0x0c),
    ("r", 0x0d),
    ("f", 0x0e),
    ("v", 0x0f),
];

/// Input symbol to keypad id. Every value is in 0x0-0xf, checked when the
/// mapping is built; several symbols may share an id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "HashMap<String, u8>")]
pub struct KeyMapping {
    keys: HashMap<String, u8>,
}

impl KeyMapping {
    /// look up the keypad id for a symbol; unmapped symbols are ignored
    pub fn resolve(&self, symbol: &str) -> Option<u8> {
        self.keys.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for KeyMapping {
    fn default() -> Self {
        KeyMapping {
            keys: CHIP8_CONVENTIONAL_KEYMAP
                .iter()
                .map(|(symbol, id)| (symbol.to_string(), *id))
                .collect(),
        }
    }
}

impl TryFrom<HashMap<String, u8>> for KeyMapping {
    type Error = CatalogError;

    fn try_from(keys: HashMap<String, u8>) -> Result<Self, Self::Error> {
        if let Some((symbol, value)) = keys.iter().find(|(_, v)| **v as usize >= KEYPAD_SIZE) {
            return Err(CatalogError::KeyOutOfRange {
                symbol: symbol.clone(),
                value: *value,
            });
        }
        Ok(KeyMapping { keys })
    }
}

/// free-standing form of `KeyMapping::resolve`
pub fn resolve(mapping: &KeyMapping, symbol: &str) -> Option<u8> {
    mapping.resolve(symbol)
}
