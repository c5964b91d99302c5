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

//! PSBT v2 document type with structural validation and global map
//! accessors.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use amplify::hex::{FromHex, ToHex};
use base64::Engine;
use bitcoin::blockdata::locktime::{Height, LockTime, Time, LOCK_TIME_THRESHOLD};
use bitcoin::util::bip32::{ExtendedPubKey, KeySource};

use crate::keytype::*;
use crate::maps::{KeyMap, ParseError, PsbtV2Maps};
use crate::util::{
    compact_size, compact_size_to_vec, key_source_from_slice, proprietary_from_key_data,
    proprietary_to_key_data, u32_from_le,
};
use crate::{raw, FieldError, ValidationError};

/// Extended public key from the global map together with the master key
/// fingerprint and derivation path it originates from.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct GlobalXpub {
    /// Serialized extended public key from the key data.
    pub xpub: ExtendedPubKey,
    /// Master fingerprint and derivation path from the value data.
    pub source: KeySource,
}

/// Decoded `PSBT_GLOBAL_TX_MODIFIABLE` bitmask.
///
/// Governs which structural mutations are still legal given the signatures
/// already attached to the document. An absent global field means nothing is
/// modifiable, which [`Default`] reproduces.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub struct ModifiableFlags {
    /// Inputs may still be added or removed.
    pub inputs_modifiable: bool,
    /// Outputs may still be added or removed.
    pub outputs_modifiable: bool,
    /// The document carries a `SIGHASH_SINGLE` signature, so input and
    /// output pairing at the signed indexes must be preserved.
    pub sighash_single: bool,
}

impl ModifiableFlags {
    /// Creator-role defaults: inputs and outputs modifiable, no
    /// `SIGHASH_SINGLE` signature present.
    pub fn modifiable() -> ModifiableFlags {
        ModifiableFlags {
            inputs_modifiable: true,
            outputs_modifiable: true,
            sighash_single: false,
        }
    }

    /// Flags of a fully locked-down transaction.
    pub fn unmodifiable() -> ModifiableFlags { ModifiableFlags::default() }

    /// Decodes the flags from the BIP370 bitmask byte. Bits above the three
    /// defined ones are ignored.
    pub fn from_standard_u8(value: u8) -> ModifiableFlags {
        ModifiableFlags {
            inputs_modifiable: value & 0x01 != 0,
            outputs_modifiable: value & 0x02 != 0,
            sighash_single: value & 0x04 != 0,
        }
    }

    /// Encodes the flags as the BIP370 bitmask byte.
    pub fn to_standard_u8(self) -> u8 {
        (self.inputs_modifiable as u8)
            | ((self.outputs_modifiable as u8) << 1)
            | ((self.sighash_single as u8) << 2)
    }
}

/// Validated PSBT v2 document.
///
/// Wraps [`PsbtV2Maps`] and guarantees the structural requirements of
/// BIP370: required global fields present, version and transaction version
/// at least 2, declared counts matching the number of input/output maps,
/// required per-input and per-output fields present, and required locktimes
/// on the correct side of the 500000000 threshold.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PsbtV2 {
    maps: PsbtV2Maps,
}

impl PsbtV2 {
    /// Constructs an empty document with Creator-role defaults: version 2,
    /// transaction version 2, fallback locktime 0, no inputs or outputs,
    /// and inputs and outputs modifiable.
    pub fn create() -> PsbtV2 {
        let mut maps = PsbtV2Maps::new();
        maps.global
            .set_singular(PSBT_GLOBAL_VERSION, 2u32.to_le_bytes().to_vec());
        maps.global
            .set_singular(PSBT_GLOBAL_TX_VERSION, 2u32.to_le_bytes().to_vec());
        maps.global.set_singular(
            PSBT_GLOBAL_FALLBACK_LOCKTIME,
            0u32.to_le_bytes().to_vec(),
        );
        maps.global.set_singular(PSBT_GLOBAL_INPUT_COUNT, vec![0]);
        maps.global.set_singular(PSBT_GLOBAL_OUTPUT_COUNT, vec![0]);
        maps.global.set_singular(
            PSBT_GLOBAL_TX_MODIFIABLE,
            vec![ModifiableFlags::modifiable().to_standard_u8()],
        );
        PsbtV2 { maps }
    }

    /// Constructs a document from raw maps, checking all v2 structural
    /// requirements.
    pub fn with(maps: PsbtV2Maps) -> Result<PsbtV2, ValidationError> {
        PsbtV2::with_flags(maps, false)
    }

    /// Escape hatch accepting transaction version 1 documents produced by
    /// pre-BIP370 software. All other requirements are still enforced.
    pub fn with_tx_version_1(maps: PsbtV2Maps) -> Result<PsbtV2, ValidationError> {
        PsbtV2::with_flags(maps, true)
    }

    fn with_flags(
        maps: PsbtV2Maps,
        allow_tx_version_1: bool,
    ) -> Result<PsbtV2, ValidationError> {
        validate(&maps, allow_tx_version_1)?;
        Ok(PsbtV2 { maps })
    }

    /// Parses and validates a document from BIP174 wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<PsbtV2, ParseError> {
        let maps = PsbtV2Maps::parse(bytes)?;
        Ok(PsbtV2::with(maps)?)
    }

    /// Parses and validates a document from a hex string.
    pub fn from_hex(s: &str) -> Result<PsbtV2, ParseError> {
        PsbtV2::from_bytes(&Vec::<u8>::from_hex(s)?)
    }

    /// Parses and validates a document from a standard base64 string.
    pub fn from_base64(s: &str) -> Result<PsbtV2, ParseError> {
        let engine = base64::engine::GeneralPurpose::new(
            &base64::alphabet::STANDARD,
            base64::engine::GeneralPurposeConfig::new(),
        );
        PsbtV2::from_bytes(&engine.decode(s)?)
    }

    /// Serializes into the BIP174 wire format.
    pub fn serialize(&self) -> Vec<u8> { self.maps.serialize() }

    /// Serializes into a lowercase hex string.
    pub fn to_hex(&self) -> String { self.serialize().to_hex() }

    /// Borrows the underlying raw maps.
    pub fn as_maps(&self) -> &PsbtV2Maps { &self.maps }

    /// Consumes the document, returning the underlying raw maps.
    pub fn into_maps(self) -> PsbtV2Maps { self.maps }

    /// Deep copy of all maps into another document without re-validation.
    ///
    /// Used for one-off derived-document workflows; the target must be
    /// re-validated before serialization if its maps were mutated further.
    pub fn copy_into(&self, target: &mut PsbtV2) { self.maps.copy_into(&mut target.maps) }

    pub(crate) fn global(&self) -> &KeyMap { &self.maps.global }

    pub(crate) fn global_mut(&mut self) -> &mut KeyMap { &mut self.maps.global }

    pub(crate) fn maps_mut(&mut self) -> &mut PsbtV2Maps { &mut self.maps }

    pub(crate) fn input_map(&self, index: usize) -> Result<&KeyMap, FieldError> {
        let count = self.maps.inputs.len();
        self.maps
            .inputs
            .get(index)
            .ok_or(FieldError::InputOutOfRange(index, count))
    }

    pub(crate) fn input_map_mut(&mut self, index: usize) -> Result<&mut KeyMap, FieldError> {
        let count = self.maps.inputs.len();
        self.maps
            .inputs
            .get_mut(index)
            .ok_or(FieldError::InputOutOfRange(index, count))
    }

    pub(crate) fn output_map(&self, index: usize) -> Result<&KeyMap, FieldError> {
        let count = self.maps.outputs.len();
        self.maps
            .outputs
            .get(index)
            .ok_or(FieldError::OutputOutOfRange(index, count))
    }

    pub(crate) fn output_map_mut(&mut self, index: usize) -> Result<&mut KeyMap, FieldError> {
        let count = self.maps.outputs.len();
        self.maps
            .outputs
            .get_mut(index)
            .ok_or(FieldError::OutputOutOfRange(index, count))
    }

    /// Number of input maps.
    pub fn num_inputs(&self) -> usize { self.maps.inputs.len() }

    /// Number of output maps.
    pub fn num_outputs(&self) -> usize { self.maps.outputs.len() }

    /// Returns `PSBT_GLOBAL_VERSION`.
    pub fn version(&self) -> Result<u32, FieldError> {
        let value = self
            .global()
            .singular(PSBT_GLOBAL_VERSION)
            .ok_or(FieldError::Missing("PSBT_GLOBAL_VERSION"))?;
        u32_from_le("PSBT_GLOBAL_VERSION", value)
    }

    /// Sets `PSBT_GLOBAL_VERSION`, rejecting versions below 2.
    pub fn set_version(&mut self, version: u32) -> Result<(), FieldError> {
        if version < 2 {
            return Err(FieldError::VersionTooLow(version));
        }
        self.global_mut()
            .set_singular(PSBT_GLOBAL_VERSION, version.to_le_bytes().to_vec());
        Ok(())
    }

    /// Returns `PSBT_GLOBAL_TX_VERSION`.
    pub fn tx_version(&self) -> Result<u32, FieldError> {
        let value = self
            .global()
            .singular(PSBT_GLOBAL_TX_VERSION)
            .ok_or(FieldError::Missing("PSBT_GLOBAL_TX_VERSION"))?;
        u32_from_le("PSBT_GLOBAL_TX_VERSION", value)
    }

    /// Sets `PSBT_GLOBAL_TX_VERSION`, rejecting versions below 2 as
    /// required from Creator-role software by BIP370.
    pub fn set_tx_version(&mut self, version: u32) -> Result<(), FieldError> {
        if version < 2 {
            return Err(FieldError::TxVersionTooLow(version));
        }
        self.set_tx_version_unchecked(version);
        Ok(())
    }

    pub(crate) fn set_tx_version_unchecked(&mut self, version: u32) {
        self.global_mut()
            .set_singular(PSBT_GLOBAL_TX_VERSION, version.to_le_bytes().to_vec());
    }

    /// Returns `PSBT_GLOBAL_FALLBACK_LOCKTIME`, if present.
    pub fn fallback_locktime(&self) -> Result<Option<LockTime>, FieldError> {
        match self.global().singular(PSBT_GLOBAL_FALLBACK_LOCKTIME) {
            None => Ok(None),
            Some(value) => {
                let raw = u32_from_le("PSBT_GLOBAL_FALLBACK_LOCKTIME", value)?;
                Ok(Some(LockTime::from_consensus(raw)))
            }
        }
    }

    /// Sets `PSBT_GLOBAL_FALLBACK_LOCKTIME`.
    pub fn set_fallback_locktime(&mut self, lock_time: LockTime) {
        self.global_mut().set_singular(
            PSBT_GLOBAL_FALLBACK_LOCKTIME,
            lock_time.to_consensus_u32().to_le_bytes().to_vec(),
        );
    }

    /// Returns the input count declared by `PSBT_GLOBAL_INPUT_COUNT`.
    pub fn input_count(&self) -> Result<usize, FieldError> {
        let value = self
            .global()
            .singular(PSBT_GLOBAL_INPUT_COUNT)
            .ok_or(FieldError::Missing("PSBT_GLOBAL_INPUT_COUNT"))?;
        Ok(compact_size("PSBT_GLOBAL_INPUT_COUNT", value)? as usize)
    }

    /// Returns the output count declared by `PSBT_GLOBAL_OUTPUT_COUNT`.
    pub fn output_count(&self) -> Result<usize, FieldError> {
        let value = self
            .global()
            .singular(PSBT_GLOBAL_OUTPUT_COUNT)
            .ok_or(FieldError::Missing("PSBT_GLOBAL_OUTPUT_COUNT"))?;
        Ok(compact_size("PSBT_GLOBAL_OUTPUT_COUNT", value)? as usize)
    }

    /// Re-declares the global counts from the actual number of input and
    /// output maps.
    pub(crate) fn sync_counts(&mut self) {
        let inputs = self.maps.inputs.len() as u64;
        let outputs = self.maps.outputs.len() as u64;
        self.global_mut()
            .set_singular(PSBT_GLOBAL_INPUT_COUNT, compact_size_to_vec(inputs));
        self.global_mut()
            .set_singular(PSBT_GLOBAL_OUTPUT_COUNT, compact_size_to_vec(outputs));
    }

    /// Returns decoded `PSBT_GLOBAL_TX_MODIFIABLE` flags, if the field is
    /// present. An absent field means the transaction is not modifiable.
    pub fn tx_modifiable(&self) -> Result<Option<ModifiableFlags>, FieldError> {
        match self.global().singular(PSBT_GLOBAL_TX_MODIFIABLE) {
            None => Ok(None),
            Some(value) if value.len() == 1 => {
                Ok(Some(ModifiableFlags::from_standard_u8(value[0])))
            }
            Some(value) => Err(FieldError::InvalidLen(
                "PSBT_GLOBAL_TX_MODIFIABLE",
                value.len(),
            )),
        }
    }

    /// Sets `PSBT_GLOBAL_TX_MODIFIABLE`.
    pub fn set_tx_modifiable(&mut self, flags: ModifiableFlags) {
        self.global_mut()
            .set_singular(PSBT_GLOBAL_TX_MODIFIABLE, vec![flags.to_standard_u8()]);
    }

    /// Enumerates all `PSBT_GLOBAL_XPUB` entries.
    pub fn global_xpubs(&self) -> Result<Vec<GlobalXpub>, FieldError> {
        self.global()
            .by_keytype(PSBT_GLOBAL_XPUB)
            .map(|(key, value)| {
                let xpub = ExtendedPubKey::decode(&key.key)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_GLOBAL_XPUB"))?;
                let source = key_source_from_slice("PSBT_GLOBAL_XPUB", value)?;
                Ok(GlobalXpub { xpub, source })
            })
            .collect()
    }

    /// Enumerates all `PSBT_GLOBAL_PROPRIETARY` entries.
    pub fn global_proprietary(
        &self,
    ) -> Result<Vec<(raw::ProprietaryKey, Vec<u8>)>, FieldError> {
        self.global()
            .by_keytype(PSBT_GLOBAL_PROPRIETARY)
            .map(|(key, value)| {
                let prop = proprietary_from_key_data("PSBT_GLOBAL_PROPRIETARY", &key.key)?;
                Ok((prop, value.clone()))
            })
            .collect()
    }

    /// Stores a value under a global proprietary key.
    pub fn set_global_proprietary(&mut self, key: raw::ProprietaryKey, value: Vec<u8>) {
        self.global_mut().insert(
            raw::Key {
                type_value: PSBT_GLOBAL_PROPRIETARY,
                key: proprietary_to_key_data(&key),
            },
            value,
        );
    }

    /// Enumerates global entries with key types not defined by BIP174 or
    /// BIP370.
    pub fn global_unknown(&self) -> Vec<(raw::Key, Vec<u8>)> {
        self.global()
            .iter()
            .filter(|(key, _)| {
                !matches!(
                    key.type_value,
                    PSBT_GLOBAL_UNSIGNED_TX
                        | PSBT_GLOBAL_XPUB
                        | PSBT_GLOBAL_TX_VERSION
                        | PSBT_GLOBAL_FALLBACK_LOCKTIME
                        | PSBT_GLOBAL_INPUT_COUNT
                        | PSBT_GLOBAL_OUTPUT_COUNT
                        | PSBT_GLOBAL_TX_MODIFIABLE
                        | PSBT_GLOBAL_VERSION
                        | PSBT_GLOBAL_PROPRIETARY
                )
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Computes the effective `nLockTime` of the transaction under
    /// construction, per BIP370.
    ///
    /// If no input requires a locktime the global fallback (default 0) is
    /// used. Otherwise the lock type required by more inputs wins, with
    /// height-based locks preferred on a tie, and the resulting value is the
    /// maximum among inputs requiring that lock type.
    pub fn lock_time(&self) -> Result<LockTime, FieldError> {
        let mut max_height: Option<Height> = None;
        let mut max_time: Option<Time> = None;
        let mut height_count = 0usize;
        let mut time_count = 0usize;

        for index in 0..self.num_inputs() {
            if let Some(height) = self.required_height_locktime(index)? {
                height_count += 1;
                if max_height.map(|max| height > max).unwrap_or(true) {
                    max_height = Some(height);
                }
            }
            if let Some(time) = self.required_time_locktime(index)? {
                time_count += 1;
                if max_time.map(|max| time > max).unwrap_or(true) {
                    max_time = Some(time);
                }
            }
        }

        if height_count == 0 && time_count == 0 {
            return Ok(self
                .fallback_locktime()?
                .unwrap_or_else(|| LockTime::from_consensus(0)));
        }
        if height_count >= time_count {
            if let Some(height) = max_height {
                return Ok(height.into());
            }
        }
        match max_time {
            Some(time) => Ok(time.into()),
            // Unreachable: at least one of the counters is non-zero and the
            // height branch did not return.
            None => Ok(LockTime::from_consensus(0)),
        }
    }
}

impl Display for PsbtV2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let engine = base64::engine::GeneralPurpose::new(
            &base64::alphabet::STANDARD,
            base64::engine::GeneralPurposeConfig::new(),
        );
        f.write_str(&engine.encode(self.serialize()))
    }
}

impl FromStr for PsbtV2 {
    type Err = ParseError;

    /// Auto-detects the string encoding: an even-length string of hex
    /// digits parses as hex, any other ASCII string as standard base64.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_ascii() {
            return Err(ParseError::UnrecognizedFormat);
        }
        if s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            PsbtV2::from_hex(s)
        } else {
            PsbtV2::from_base64(s)
        }
    }
}

fn validate(maps: &PsbtV2Maps, allow_tx_version_1: bool) -> Result<(), ValidationError> {
    if maps.global.singular(PSBT_GLOBAL_UNSIGNED_TX).is_some() {
        return Err(ValidationError::ReservedGlobalKey);
    }

    let version = maps
        .global
        .singular(PSBT_GLOBAL_VERSION)
        .ok_or(ValidationError::MissingGlobalField("PSBT_GLOBAL_VERSION"))?;
    let version = u32_from_le("PSBT_GLOBAL_VERSION", version)?;
    if version < 2 {
        return Err(FieldError::VersionTooLow(version).into());
    }

    let tx_version = maps
        .global
        .singular(PSBT_GLOBAL_TX_VERSION)
        .ok_or(ValidationError::MissingGlobalField("PSBT_GLOBAL_TX_VERSION"))?;
    let tx_version = u32_from_le("PSBT_GLOBAL_TX_VERSION", tx_version)?;
    if tx_version < 2 && !(allow_tx_version_1 && tx_version == 1) {
        return Err(FieldError::TxVersionTooLow(tx_version).into());
    }

    let declared = maps
        .global
        .singular(PSBT_GLOBAL_INPUT_COUNT)
        .ok_or(ValidationError::MissingGlobalField("PSBT_GLOBAL_INPUT_COUNT"))?;
    let declared = compact_size("PSBT_GLOBAL_INPUT_COUNT", declared)? as usize;
    if declared != maps.inputs.len() {
        return Err(ValidationError::InputCountMismatch {
            declared,
            actual: maps.inputs.len(),
        });
    }

    let declared = maps
        .global
        .singular(PSBT_GLOBAL_OUTPUT_COUNT)
        .ok_or(ValidationError::MissingGlobalField("PSBT_GLOBAL_OUTPUT_COUNT"))?;
    let declared = compact_size("PSBT_GLOBAL_OUTPUT_COUNT", declared)? as usize;
    if declared != maps.outputs.len() {
        return Err(ValidationError::OutputCountMismatch {
            declared,
            actual: maps.outputs.len(),
        });
    }

    for (index, input) in maps.inputs.iter().enumerate() {
        if input.singular(PSBT_IN_PREVIOUS_TXID).is_none() {
            return Err(ValidationError::MissingInputField(
                index,
                "PSBT_IN_PREVIOUS_TXID",
            ));
        }
        if input.singular(PSBT_IN_OUTPUT_INDEX).is_none() {
            return Err(ValidationError::MissingInputField(
                index,
                "PSBT_IN_OUTPUT_INDEX",
            ));
        }
        if let Some(value) = input.singular(PSBT_IN_REQUIRED_TIME_LOCKTIME) {
            let time = u32_from_le("PSBT_IN_REQUIRED_TIME_LOCKTIME", value)?;
            if time < LOCK_TIME_THRESHOLD {
                return Err(FieldError::InvalidTimeLocktime(time).into());
            }
        }
        if let Some(value) = input.singular(PSBT_IN_REQUIRED_HEIGHT_LOCKTIME) {
            let height = u32_from_le("PSBT_IN_REQUIRED_HEIGHT_LOCKTIME", value)?;
            if height >= LOCK_TIME_THRESHOLD {
                return Err(FieldError::InvalidHeightLocktime(height).into());
            }
        }
    }

    for (index, output) in maps.outputs.iter().enumerate() {
        if output.singular(PSBT_OUT_AMOUNT).is_none() {
            return Err(ValidationError::MissingOutputField(index, "PSBT_OUT_AMOUNT"));
        }
        if output.singular(PSBT_OUT_SCRIPT).is_none() {
            return Err(ValidationError::MissingOutputField(index, "PSBT_OUT_SCRIPT"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn minimal_maps() -> PsbtV2Maps {
        PsbtV2::create().into_maps()
    }

    #[test]
    fn creator_defaults() {
        let psbt = PsbtV2::create();
        assert_eq!(psbt.version().unwrap(), 2);
        assert_eq!(psbt.tx_version().unwrap(), 2);
        assert_eq!(
            psbt.fallback_locktime().unwrap().map(|lock| lock.to_consensus_u32()),
            Some(0)
        );
        assert_eq!(psbt.input_count().unwrap(), 0);
        assert_eq!(psbt.output_count().unwrap(), 0);
        assert_eq!(psbt.tx_modifiable().unwrap(), Some(ModifiableFlags::modifiable()));
        assert_eq!(psbt.lock_time().unwrap().to_consensus_u32(), 0);
    }

    #[test]
    fn create_validates() {
        let maps = minimal_maps();
        PsbtV2::with(maps).unwrap();
    }

    #[test]
    fn tx_version_1_requires_escape_hatch() {
        let mut maps = minimal_maps();
        maps.global
            .set_singular(PSBT_GLOBAL_TX_VERSION, 1u32.to_le_bytes().to_vec());
        assert!(matches!(
            PsbtV2::with(maps.clone()),
            Err(ValidationError::Field(FieldError::TxVersionTooLow(1)))
        ));
        let psbt = PsbtV2::with_tx_version_1(maps).unwrap();
        assert_eq!(psbt.tx_version().unwrap(), 1);
    }

    #[test]
    fn tx_version_0_always_rejected() {
        let mut maps = minimal_maps();
        maps.global
            .set_singular(PSBT_GLOBAL_TX_VERSION, 0u32.to_le_bytes().to_vec());
        assert!(matches!(
            PsbtV2::with_tx_version_1(maps),
            Err(ValidationError::Field(FieldError::TxVersionTooLow(0)))
        ));
    }

    #[test]
    fn reserved_global_key_rejected() {
        let mut maps = minimal_maps();
        maps.global.set_singular(PSBT_GLOBAL_UNSIGNED_TX, vec![0x01]);
        assert!(matches!(
            PsbtV2::with(maps),
            Err(ValidationError::ReservedGlobalKey)
        ));
    }

    #[test]
    fn count_mismatch_rejected() {
        let mut maps = minimal_maps();
        maps.global.set_singular(PSBT_GLOBAL_INPUT_COUNT, vec![2]);
        assert!(matches!(
            PsbtV2::with(maps),
            Err(ValidationError::InputCountMismatch {
                declared: 2,
                actual: 0
            })
        ));
    }

    #[test]
    fn setters_reject_low_versions() {
        let mut psbt = PsbtV2::create();
        assert!(matches!(
            psbt.set_version(1),
            Err(FieldError::VersionTooLow(1))
        ));
        assert!(matches!(
            psbt.set_tx_version(1),
            Err(FieldError::TxVersionTooLow(1))
        ));
        psbt.set_tx_version(3).unwrap();
        assert_eq!(psbt.tx_version().unwrap(), 3);
    }

    #[test]
    fn modifiable_flags_bitmask_roundtrip() {
        for mask in 0u8..8 {
            let flags = ModifiableFlags::from_standard_u8(mask);
            assert_eq!(flags.to_standard_u8(), mask);
        }
        assert_eq!(ModifiableFlags::modifiable().to_standard_u8(), 0x03);
        assert_eq!(ModifiableFlags::unmodifiable().to_standard_u8(), 0x00);
    }

    fn input_map_with_terminals() -> KeyMap {
        let mut map = KeyMap::new();
        map.set_singular(PSBT_IN_PREVIOUS_TXID, vec![0xaa; 32]);
        map.set_singular(PSBT_IN_OUTPUT_INDEX, 0u32.to_le_bytes().to_vec());
        map
    }

    #[test]
    fn locktime_prefers_height() {
        let mut psbt = PsbtV2::create();
        let mut first = input_map_with_terminals();
        first.set_singular(
            PSBT_IN_REQUIRED_HEIGHT_LOCKTIME,
            700_000u32.to_le_bytes().to_vec(),
        );
        psbt.maps.inputs.push(first);
        psbt.maps.inputs.push(input_map_with_terminals());
        psbt.sync_counts();

        assert_eq!(psbt.lock_time().unwrap().to_consensus_u32(), 700_000);
    }

    #[test]
    fn locktime_takes_maximum() {
        let mut psbt = PsbtV2::create();
        for height in [650_000u32, 700_000, 600_000] {
            let mut input = input_map_with_terminals();
            input.set_singular(
                PSBT_IN_REQUIRED_HEIGHT_LOCKTIME,
                height.to_le_bytes().to_vec(),
            );
            psbt.maps.inputs.push(input);
        }
        psbt.sync_counts();
        assert_eq!(psbt.lock_time().unwrap().to_consensus_u32(), 700_000);
    }

    #[test]
    fn locktime_falls_back() {
        let mut psbt = PsbtV2::create();
        psbt.set_fallback_locktime(LockTime::from_consensus(500));
        psbt.maps.inputs.push(input_map_with_terminals());
        psbt.sync_counts();
        assert_eq!(psbt.lock_time().unwrap().to_consensus_u32(), 500);
    }

    #[test]
    fn locktime_time_majority() {
        let mut psbt = PsbtV2::create();
        for time in [1_600_000_000u32, 1_700_000_000] {
            let mut input = input_map_with_terminals();
            input.set_singular(
                PSBT_IN_REQUIRED_TIME_LOCKTIME,
                time.to_le_bytes().to_vec(),
            );
            psbt.maps.inputs.push(input);
        }
        let mut with_height = input_map_with_terminals();
        with_height.set_singular(
            PSBT_IN_REQUIRED_HEIGHT_LOCKTIME,
            700_000u32.to_le_bytes().to_vec(),
        );
        psbt.maps.inputs.push(with_height);
        psbt.sync_counts();

        assert_eq!(psbt.lock_time().unwrap().to_consensus_u32(), 1_700_000_000);
    }

    #[test]
    fn required_time_locktime_threshold_validated() {
        let mut maps = minimal_maps();
        let mut input = input_map_with_terminals();
        input.set_singular(PSBT_IN_REQUIRED_TIME_LOCKTIME, 100u32.to_le_bytes().to_vec());
        maps.inputs.push(input);
        maps.global.set_singular(PSBT_GLOBAL_INPUT_COUNT, vec![1]);
        assert!(matches!(
            PsbtV2::with(maps),
            Err(ValidationError::Field(FieldError::InvalidTimeLocktime(100)))
        ));
    }

    #[test]
    fn proprietary_oversized_prefix_rejected() {
        let mut psbt = PsbtV2::create();
        // Key data whose compact size prefix length claims u64::MAX bytes.
        psbt.global_mut().insert(
            raw::Key {
                type_value: PSBT_GLOBAL_PROPRIETARY,
                key: vec![0xff; 9],
            },
            vec![],
        );
        assert!(matches!(
            psbt.global_proprietary(),
            Err(FieldError::InvalidKeyData("PSBT_GLOBAL_PROPRIETARY"))
        ));

        // Prefix length leaving no room for the subtype byte.
        psbt.global_mut().remove_keytype(PSBT_GLOBAL_PROPRIETARY);
        psbt.global_mut().insert(
            raw::Key {
                type_value: PSBT_GLOBAL_PROPRIETARY,
                key: vec![0x01, 0xab],
            },
            vec![],
        );
        assert!(matches!(
            psbt.global_proprietary(),
            Err(FieldError::InvalidKeyData("PSBT_GLOBAL_PROPRIETARY"))
        ));
    }

    #[test]
    fn string_codecs_roundtrip() {
        let psbt = PsbtV2::create();

        let hex = psbt.to_hex();
        assert_eq!(PsbtV2::from_str(&hex).unwrap(), psbt);

        let b64 = psbt.to_string();
        assert_eq!(PsbtV2::from_str(&b64).unwrap(), psbt);

        assert!(matches!(
            PsbtV2::from_str("нет"),
            Err(ParseError::UnrecognizedFormat)
        ));
    }
}
