// Wallet-level libraries for bitcoin protocol by LNP/BP Association
//
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// This software is distributed without any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

//! BIP174 wire codec for the three key-value map collections constituting a
//! PSBT v2 document.

use std::io::Cursor;

use bitcoin::consensus::encode::{self, Decodable, ReadExt, VarInt, MAX_VEC_SIZE};
use indexmap::IndexMap;

use crate::keytype::*;
use crate::util::{compact_size, u32_from_le};
use crate::{raw, ValidationError};

/// Magic prefix of every serialized PSBT: `psbt` followed by a 0xff
/// separator byte.
pub const PSBT_MAGIC: [u8; 5] = *b"psbt\xff";

/// Errors of the BIP174 map-framing layer.
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ParseError {
    /// byte string does not start with the `psbt\xff` magic prefix
    InvalidMagic,

    /// map key or value length {0} exceeds the maximal supported
    /// allocation size
    Oversized(u64),

    /// duplicate key {0} within a single PSBT map
    DuplicateKey(raw::Key),

    /// excess bytes left after the last PSBT output map
    DataNotConsumed,

    /// invalid key, value or separator framing
    #[from]
    #[display(inner)]
    Encoding(encode::Error),

    /// invalid hex encoding of a PSBT string
    #[from]
    #[display(inner)]
    Hex(amplify::hex::Error),

    /// invalid base64 encoding of a PSBT string
    #[from]
    #[display(inner)]
    Base64(base64::DecodeError),

    /// PSBT string is neither hex- nor base64-encoded
    UnrecognizedFormat,

    #[from]
    #[display(inner)]
    /// structural requirements on the parsed maps are violated
    Validation(ValidationError),
}

/// Single PSBT key-value map preserving the key insertion order.
///
/// Insertion order is what makes byte-exact re-serialization of a parsed
/// document possible: BIP174 does not demand any particular key order, so
/// the only lossless policy is to write entries back exactly as they were
/// read.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct KeyMap(IndexMap<raw::Key, Vec<u8>>);

impl KeyMap {
    /// Constructs an empty map.
    pub fn new() -> KeyMap { KeyMap::default() }

    /// Returns the number of key-value entries.
    pub fn len(&self) -> usize { self.0.len() }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Returns `true` if an entry under the exact key is present.
    pub fn contains_key(&self, key: &raw::Key) -> bool { self.0.contains_key(key) }

    /// Returns value stored under the exact key.
    pub fn get(&self, key: &raw::Key) -> Option<&Vec<u8>> { self.0.get(key) }

    /// Inserts a value under a key, replacing and returning the previous
    /// value if the key was already present.
    pub fn insert(&mut self, key: raw::Key, value: Vec<u8>) -> Option<Vec<u8>> {
        self.0.insert(key, value)
    }

    /// Removes the entry under the exact key, preserving the order of the
    /// remaining entries.
    pub fn remove(&mut self, key: &raw::Key) -> Option<Vec<u8>> { self.0.shift_remove(key) }

    /// Iterates over all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&raw::Key, &Vec<u8>)> { self.0.iter() }

    /// Returns the value of a singular field: a key consisting of the type
    /// byte alone, with no key data.
    pub fn singular(&self, type_value: u8) -> Option<&Vec<u8>> {
        self.0.get(&raw::Key {
            type_value,
            key: vec![],
        })
    }

    /// Sets the value of a singular field, replacing any previous value.
    pub fn set_singular(&mut self, type_value: u8, value: Vec<u8>) {
        self.0.insert(
            raw::Key {
                type_value,
                key: vec![],
            },
            value,
        );
    }

    /// Removes a singular field.
    pub fn remove_singular(&mut self, type_value: u8) -> Option<Vec<u8>> {
        self.0.shift_remove(&raw::Key {
            type_value,
            key: vec![],
        })
    }

    /// Enumerates all entries whose key type byte matches `type_value`.
    ///
    /// This linear scan is the only correct lookup for non-unique key types
    /// (partial signatures, derivation paths, xpubs and similar), where
    /// multiple keys share one type byte and differ in their key data.
    pub fn by_keytype(&self, type_value: u8) -> impl Iterator<Item = (&raw::Key, &Vec<u8>)> {
        self.0.iter().filter(move |(key, _)| key.type_value == type_value)
    }

    /// Removes every entry whose key type byte matches `type_value`,
    /// returning the number of removed entries.
    pub fn remove_keytype(&mut self, type_value: u8) -> usize {
        let prev = self.0.len();
        self.0.retain(|key, _| key.type_value != type_value);
        prev - self.0.len()
    }
}

/// The three ordered map collections of a PSBT v2 document.
///
/// This is the raw, non-validated representation: any key may be present or
/// absent, and input/output map sequences are index-aligned with the
/// transaction inputs/outputs they describe.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct PsbtV2Maps {
    /// Document-wide fields.
    pub global: KeyMap,
    /// One map per transaction input.
    pub inputs: Vec<KeyMap>,
    /// One map per transaction output.
    pub outputs: Vec<KeyMap>,
}

impl PsbtV2Maps {
    /// Constructs map collections with an empty global map and no inputs or
    /// outputs.
    pub fn new() -> PsbtV2Maps { PsbtV2Maps::default() }

    /// Parses the BIP174 wire format.
    ///
    /// Reads the magic prefix, the global map, and then exactly as many
    /// input and output maps as the global `PSBT_GLOBAL_INPUT_COUNT` and
    /// `PSBT_GLOBAL_OUTPUT_COUNT` fields declare. No other structural
    /// validation is performed here; see [`crate::PsbtV2::with`].
    pub fn parse(bytes: &[u8]) -> Result<PsbtV2Maps, ParseError> {
        let mut cursor = Cursor::new(bytes);

        let mut magic = [0u8; 5];
        cursor.read_slice(&mut magic)?;
        if magic != PSBT_MAGIC {
            return Err(ParseError::InvalidMagic);
        }

        let global = read_map(&mut cursor)?;

        let input_count = declared_count(
            &global,
            PSBT_GLOBAL_INPUT_COUNT,
            "PSBT_GLOBAL_INPUT_COUNT",
        )?;
        let output_count = declared_count(
            &global,
            PSBT_GLOBAL_OUTPUT_COUNT,
            "PSBT_GLOBAL_OUTPUT_COUNT",
        )?;

        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(read_map(&mut cursor)?);
        }
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(read_map(&mut cursor)?);
        }

        if cursor.position() as usize != bytes.len() {
            return Err(ParseError::DataNotConsumed);
        }

        Ok(PsbtV2Maps {
            global,
            inputs,
            outputs,
        })
    }

    /// Serializes into the BIP174 wire format: magic prefix, then each map
    /// as its key-value pairs in insertion order terminated by a zero byte,
    /// global map first, then input maps, then output maps.
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = PSBT_MAGIC.to_vec();
        write_map(&mut data, &self.global);
        for map in &self.inputs {
            write_map(&mut data, map);
        }
        for map in &self.outputs {
            write_map(&mut data, map);
        }
        data
    }

    /// Deep copy of all maps into `target`, replacing its previous content.
    ///
    /// Performs no validation: the target receives the source maps verbatim
    /// even if they violate v2 structural requirements, so the caller is
    /// responsible for re-validating the result.
    pub fn copy_into(&self, target: &mut PsbtV2Maps) { *target = self.clone(); }
}

/// Extracts the `PSBT_GLOBAL_VERSION` value from raw PSBT bytes without
/// requiring the document to pass v2 validation.
///
/// An absent version field is reported as version 0, matching BIP174
/// semantics for legacy documents. Used to dispatch between v0 and v2
/// codecs before committing to a full parse.
pub fn psbt_version_number(bytes: &[u8]) -> Result<u32, ParseError> {
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; 5];
    cursor.read_slice(&mut magic)?;
    if magic != PSBT_MAGIC {
        return Err(ParseError::InvalidMagic);
    }

    let global = read_map(&mut cursor)?;
    match global.singular(PSBT_GLOBAL_VERSION) {
        None => Ok(0),
        Some(value) => Ok(u32_from_le("PSBT_GLOBAL_VERSION", value)
            .map_err(ValidationError::from)?),
    }
}

fn declared_count(
    global: &KeyMap,
    type_value: u8,
    field: &'static str,
) -> Result<usize, ParseError> {
    let value = global
        .singular(type_value)
        .ok_or(ValidationError::MissingGlobalField(field))?;
    let count = compact_size(field, value).map_err(ValidationError::from)?;
    if count > MAX_VEC_SIZE as u64 {
        return Err(ParseError::Oversized(count));
    }
    Ok(count as usize)
}

fn read_map(cursor: &mut Cursor<&[u8]>) -> Result<KeyMap, ParseError> {
    let mut map = KeyMap::new();
    loop {
        let VarInt(key_len) = Decodable::consensus_decode(cursor)?;
        if key_len == 0 {
            break;
        }
        if key_len > MAX_VEC_SIZE as u64 {
            return Err(ParseError::Oversized(key_len));
        }
        let type_value = cursor.read_u8()?;
        let mut key_data = vec![0u8; key_len as usize - 1];
        cursor.read_slice(&mut key_data)?;

        let VarInt(value_len) = Decodable::consensus_decode(cursor)?;
        if value_len > MAX_VEC_SIZE as u64 {
            return Err(ParseError::Oversized(value_len));
        }
        let mut value = vec![0u8; value_len as usize];
        cursor.read_slice(&mut value)?;

        let key = raw::Key {
            type_value,
            key: key_data,
        };
        if map.contains_key(&key) {
            return Err(ParseError::DuplicateKey(key));
        }
        map.insert(key, value);
    }
    Ok(map)
}

fn write_map(data: &mut Vec<u8>, map: &KeyMap) {
    for (key, value) in map.iter() {
        data.extend(encode::serialize(&VarInt(key.key.len() as u64 + 1)));
        data.push(key.type_value);
        data.extend_from_slice(&key.key);
        data.extend(encode::serialize(&VarInt(value.len() as u64)));
        data.extend_from_slice(value);
    }
    data.push(0x00);
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;

    use super::*;

    fn minimal_maps() -> PsbtV2Maps {
        let mut maps = PsbtV2Maps::new();
        maps.global
            .set_singular(PSBT_GLOBAL_VERSION, 2u32.to_le_bytes().to_vec());
        maps.global
            .set_singular(PSBT_GLOBAL_TX_VERSION, 2u32.to_le_bytes().to_vec());
        maps.global.set_singular(PSBT_GLOBAL_INPUT_COUNT, vec![0]);
        maps.global.set_singular(PSBT_GLOBAL_OUTPUT_COUNT, vec![0]);
        maps
    }

    #[test]
    fn roundtrip_bytes() {
        let maps = minimal_maps();
        let bytes = maps.serialize();
        let parsed = PsbtV2Maps::parse(&bytes).unwrap();
        assert_eq!(parsed, maps);
        assert_eq!(parsed.serialize(), bytes);
    }

    #[test]
    fn roundtrip_with_terminals() {
        let mut maps = minimal_maps();
        let mut input = KeyMap::new();
        input.set_singular(PSBT_IN_PREVIOUS_TXID, vec![0xaa; 32]);
        input.set_singular(PSBT_IN_OUTPUT_INDEX, 1u32.to_le_bytes().to_vec());
        maps.inputs.push(input);
        let mut output = KeyMap::new();
        output.set_singular(PSBT_OUT_AMOUNT, 1000u64.to_le_bytes().to_vec());
        output.set_singular(PSBT_OUT_SCRIPT, vec![0x00, 0x14]);
        maps.outputs.push(output);
        maps.global.set_singular(PSBT_GLOBAL_INPUT_COUNT, vec![1]);
        maps.global.set_singular(PSBT_GLOBAL_OUTPUT_COUNT, vec![1]);

        let bytes = maps.serialize();
        let parsed = PsbtV2Maps::parse(&bytes).unwrap();
        assert_eq!(parsed, maps);
        assert_eq!(parsed.serialize(), bytes);
    }

    #[test]
    fn wrong_magic() {
        let mut bytes = minimal_maps().serialize();
        bytes[4] = 0x00;
        assert!(matches!(
            PsbtV2Maps::parse(&bytes),
            Err(ParseError::InvalidMagic)
        ));
    }

    #[test]
    fn trailing_garbage() {
        let mut bytes = minimal_maps().serialize();
        bytes.push(0xde);
        assert!(matches!(
            PsbtV2Maps::parse(&bytes),
            Err(ParseError::DataNotConsumed)
        ));
    }

    #[test]
    fn duplicate_key_rejected() {
        // Global map with PSBT_GLOBAL_VERSION written twice.
        let mut bytes = PSBT_MAGIC.to_vec();
        let entry = Vec::from_hex("01fb0402000000").unwrap();
        bytes.extend(&entry);
        bytes.extend(&entry);
        bytes.push(0x00);
        assert!(matches!(
            PsbtV2Maps::parse(&bytes),
            Err(ParseError::DuplicateKey(_))
        ));
    }

    #[test]
    fn missing_count_rejected() {
        let mut maps = minimal_maps();
        maps.global.remove_singular(PSBT_GLOBAL_INPUT_COUNT);
        let bytes = maps.serialize();
        assert!(matches!(
            PsbtV2Maps::parse(&bytes),
            Err(ParseError::Validation(ValidationError::MissingGlobalField(
                "PSBT_GLOBAL_INPUT_COUNT"
            )))
        ));
    }

    #[test]
    fn version_probe() {
        let maps = minimal_maps();
        assert_eq!(psbt_version_number(&maps.serialize()).unwrap(), 2);

        let mut legacy = minimal_maps();
        legacy.global.remove_singular(PSBT_GLOBAL_VERSION);
        assert_eq!(psbt_version_number(&legacy.serialize()).unwrap(), 0);
    }

    #[test]
    fn keytype_scan() {
        let mut map = KeyMap::new();
        for byte in 0u8..3 {
            map.insert(
                raw::Key {
                    type_value: PSBT_IN_PARTIAL_SIG,
                    key: vec![byte],
                },
                vec![byte, byte],
            );
        }
        map.set_singular(PSBT_IN_SIGHASH_TYPE, vec![1, 0, 0, 0]);
        assert_eq!(map.by_keytype(PSBT_IN_PARTIAL_SIG).count(), 3);
        assert_eq!(map.remove_keytype(PSBT_IN_PARTIAL_SIG), 3);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn copy_bypasses_validation() {
        let mut source = minimal_maps();
        source.global.remove_singular(PSBT_GLOBAL_TX_VERSION);
        let mut target = PsbtV2Maps::new();
        source.copy_into(&mut target);
        assert_eq!(target, source);
    }
}
