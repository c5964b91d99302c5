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

//! Typed accessors for per-output map fields (`PSBT_OUT_*` key types).

use bitcoin::{PublicKey, Script, XOnlyPublicKey};

use crate::input::{tap_bip32_derivation, tap_bip32_derivation_entry};
use crate::keytype::*;
use crate::util::{
    key_source_from_slice, key_source_to_vec, proprietary_from_key_data,
    proprietary_to_key_data, u64_from_le,
};
use crate::{raw, Bip32Derivation, FieldError, PsbtV2, TapBip32Derivation};

impl PsbtV2 {
    /// Returns the required `PSBT_OUT_AMOUNT` field in satoshis.
    pub fn amount(&self, index: usize) -> Result<u64, FieldError> {
        let value = self
            .output_map(index)?
            .singular(PSBT_OUT_AMOUNT)
            .ok_or(FieldError::Missing("PSBT_OUT_AMOUNT"))?;
        u64_from_le("PSBT_OUT_AMOUNT", value)
    }

    /// Sets `PSBT_OUT_AMOUNT`.
    pub fn set_amount(&mut self, index: usize, amount: u64) -> Result<(), FieldError> {
        self.output_map_mut(index)?
            .set_singular(PSBT_OUT_AMOUNT, amount.to_le_bytes().to_vec());
        Ok(())
    }

    /// Returns the required `PSBT_OUT_SCRIPT` field.
    pub fn script(&self, index: usize) -> Result<Script, FieldError> {
        let value = self
            .output_map(index)?
            .singular(PSBT_OUT_SCRIPT)
            .ok_or(FieldError::Missing("PSBT_OUT_SCRIPT"))?;
        Ok(Script::from(value.clone()))
    }

    /// Sets `PSBT_OUT_SCRIPT`.
    pub fn set_script(&mut self, index: usize, script: Script) -> Result<(), FieldError> {
        self.output_map_mut(index)?
            .set_singular(PSBT_OUT_SCRIPT, script.into_bytes());
        Ok(())
    }

    /// Returns `PSBT_OUT_REDEEM_SCRIPT`, if present.
    pub fn output_redeem_script(&self, index: usize) -> Result<Option<Script>, FieldError> {
        Ok(self
            .output_map(index)?
            .singular(PSBT_OUT_REDEEM_SCRIPT)
            .map(|value| Script::from(value.clone())))
    }

    /// Sets `PSBT_OUT_REDEEM_SCRIPT`.
    pub fn set_output_redeem_script(
        &mut self,
        index: usize,
        script: Script,
    ) -> Result<(), FieldError> {
        self.output_map_mut(index)?
            .set_singular(PSBT_OUT_REDEEM_SCRIPT, script.into_bytes());
        Ok(())
    }

    /// Returns `PSBT_OUT_WITNESS_SCRIPT`, if present.
    pub fn output_witness_script(&self, index: usize) -> Result<Option<Script>, FieldError> {
        Ok(self
            .output_map(index)?
            .singular(PSBT_OUT_WITNESS_SCRIPT)
            .map(|value| Script::from(value.clone())))
    }

    /// Sets `PSBT_OUT_WITNESS_SCRIPT`.
    pub fn set_output_witness_script(
        &mut self,
        index: usize,
        script: Script,
    ) -> Result<(), FieldError> {
        self.output_map_mut(index)?
            .set_singular(PSBT_OUT_WITNESS_SCRIPT, script.into_bytes());
        Ok(())
    }

    /// Enumerates all `PSBT_OUT_BIP32_DERIVATION` entries of an output.
    pub fn output_bip32_derivations(
        &self,
        index: usize,
    ) -> Result<Vec<Bip32Derivation>, FieldError> {
        self.output_map(index)?
            .by_keytype(PSBT_OUT_BIP32_DERIVATION)
            .map(|(key, value)| {
                let pubkey = PublicKey::from_slice(&key.key)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_OUT_BIP32_DERIVATION"))?;
                let source = key_source_from_slice("PSBT_OUT_BIP32_DERIVATION", value)?;
                Ok(Bip32Derivation { pubkey, source })
            })
            .collect()
    }

    /// Adds or replaces a `PSBT_OUT_BIP32_DERIVATION` entry keyed by its
    /// public key.
    pub fn set_output_bip32_derivation(
        &mut self,
        index: usize,
        derivation: &Bip32Derivation,
    ) -> Result<(), FieldError> {
        self.output_map_mut(index)?.insert(
            raw::Key {
                type_value: PSBT_OUT_BIP32_DERIVATION,
                key: derivation.pubkey.to_bytes(),
            },
            key_source_to_vec(&derivation.source),
        );
        Ok(())
    }

    /// Returns `PSBT_OUT_TAP_INTERNAL_KEY`, if present.
    pub fn output_tap_internal_key(
        &self,
        index: usize,
    ) -> Result<Option<XOnlyPublicKey>, FieldError> {
        match self.output_map(index)?.singular(PSBT_OUT_TAP_INTERNAL_KEY) {
            None => Ok(None),
            Some(value) => Ok(Some(
                XOnlyPublicKey::from_slice(value)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_OUT_TAP_INTERNAL_KEY"))?,
            )),
        }
    }

    /// Sets `PSBT_OUT_TAP_INTERNAL_KEY`.
    pub fn set_output_tap_internal_key(
        &mut self,
        index: usize,
        pubkey: XOnlyPublicKey,
    ) -> Result<(), FieldError> {
        self.output_map_mut(index)?
            .set_singular(PSBT_OUT_TAP_INTERNAL_KEY, pubkey.serialize().to_vec());
        Ok(())
    }

    /// Returns the raw `PSBT_OUT_TAP_TREE` depth-first tree serialization,
    /// if present.
    pub fn output_tap_tree(&self, index: usize) -> Result<Option<Vec<u8>>, FieldError> {
        Ok(self.output_map(index)?.singular(PSBT_OUT_TAP_TREE).cloned())
    }

    /// Sets `PSBT_OUT_TAP_TREE`.
    pub fn set_output_tap_tree(
        &mut self,
        index: usize,
        tree: Vec<u8>,
    ) -> Result<(), FieldError> {
        self.output_map_mut(index)?
            .set_singular(PSBT_OUT_TAP_TREE, tree);
        Ok(())
    }

    /// Enumerates all `PSBT_OUT_TAP_BIP32_DERIVATION` entries of an output.
    pub fn output_tap_bip32_derivations(
        &self,
        index: usize,
    ) -> Result<Vec<TapBip32Derivation>, FieldError> {
        self.output_map(index)?
            .by_keytype(PSBT_OUT_TAP_BIP32_DERIVATION)
            .map(|(key, value)| {
                tap_bip32_derivation(key, value, "PSBT_OUT_TAP_BIP32_DERIVATION")
            })
            .collect()
    }

    /// Adds or replaces a `PSBT_OUT_TAP_BIP32_DERIVATION` entry keyed by
    /// its x-only public key.
    pub fn set_output_tap_bip32_derivation(
        &mut self,
        index: usize,
        derivation: &TapBip32Derivation,
    ) -> Result<(), FieldError> {
        let (key, value) = tap_bip32_derivation_entry(PSBT_OUT_TAP_BIP32_DERIVATION, derivation);
        self.output_map_mut(index)?.insert(key, value);
        Ok(())
    }

    /// Enumerates all `PSBT_OUT_PROPRIETARY` entries of an output.
    pub fn output_proprietary(
        &self,
        index: usize,
    ) -> Result<Vec<(raw::ProprietaryKey, Vec<u8>)>, FieldError> {
        self.output_map(index)?
            .by_keytype(PSBT_OUT_PROPRIETARY)
            .map(|(key, value)| {
                let prop = proprietary_from_key_data("PSBT_OUT_PROPRIETARY", &key.key)?;
                Ok((prop, value.clone()))
            })
            .collect()
    }

    /// Stores a value under an output proprietary key.
    pub fn set_output_proprietary(
        &mut self,
        index: usize,
        key: raw::ProprietaryKey,
        value: Vec<u8>,
    ) -> Result<(), FieldError> {
        self.output_map_mut(index)?.insert(
            raw::Key {
                type_value: PSBT_OUT_PROPRIETARY,
                key: proprietary_to_key_data(&key),
            },
            value,
        );
        Ok(())
    }

    /// Enumerates output entries with key types not defined by BIP174,
    /// BIP370 or BIP371.
    pub fn output_unknown(&self, index: usize) -> Result<Vec<(raw::Key, Vec<u8>)>, FieldError> {
        Ok(self
            .output_map(index)?
            .iter()
            .filter(|(key, _)| {
                key.type_value > PSBT_OUT_TAP_BIP32_DERIVATION
                    && key.type_value != PSBT_OUT_PROPRIETARY
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
