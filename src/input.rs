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

//! Typed accessors for per-input map fields (`PSBT_IN_*` key types).

use bitcoin::blockdata::locktime::{Height, Time};
use bitcoin::consensus::encode::{deserialize, serialize, Decodable, VarInt};
use bitcoin::hashes::{hash160, ripemd160, sha256, sha256d, Hash};
use bitcoin::util::bip32::KeySource;
use bitcoin::util::schnorr::SchnorrSig;
use bitcoin::util::taproot::{ControlBlock, LeafVersion, TapBranchHash, TapLeafHash};
use bitcoin::{
    PublicKey, Script, Sequence, Transaction, TxOut, Txid, Witness, XOnlyPublicKey,
};

use crate::keytype::*;
use crate::util::{
    key_source_from_slice, key_source_to_vec, proprietary_from_key_data,
    proprietary_to_key_data, u32_from_le,
};
use crate::{raw, FieldError, PsbtV2};

/// BIP32 key derivation entry: an ECDSA public key together with the master
/// fingerprint and path it was derived under.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Bip32Derivation {
    /// Public key from the key data.
    pub pubkey: PublicKey,
    /// Master fingerprint and derivation path from the value data.
    pub source: KeySource,
}

/// Partial signature entry of an input map.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PartialSig {
    /// Public key of the signer from the key data.
    pub pubkey: PublicKey,
    /// DER-encoded ECDSA signature followed by the sighash type byte.
    pub signature: Vec<u8>,
}

/// Taproot script path signature entry.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TapScriptSig {
    /// X-only public key from the key data.
    pub pubkey: XOnlyPublicKey,
    /// Leaf hash of the script being signed, from the key data.
    pub leaf_hash: TapLeafHash,
    /// BIP340 signature with optional sighash type byte.
    pub signature: SchnorrSig,
}

/// Taproot leaf script revealed for a script path spend.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TapLeafScript {
    /// Control block proving script inclusion, from the key data.
    pub control_block: ControlBlock,
    /// The leaf script itself.
    pub script: Script,
    /// Leaf version from the trailing value byte.
    pub leaf_version: LeafVersion,
}

/// Taproot BIP32 derivation entry: an x-only key, the leaf hashes it signs
/// for, and its key origin.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TapBip32Derivation {
    /// X-only public key from the key data.
    pub pubkey: XOnlyPublicKey,
    /// Hashes of the taproot leaves this key participates in.
    pub leaf_hashes: Vec<TapLeafHash>,
    /// Master fingerprint and derivation path.
    pub source: KeySource,
}

impl PsbtV2 {
    /// Returns the required `PSBT_IN_PREVIOUS_TXID` field.
    pub fn previous_txid(&self, index: usize) -> Result<Txid, FieldError> {
        let value = self
            .input_map(index)?
            .singular(PSBT_IN_PREVIOUS_TXID)
            .ok_or(FieldError::Missing("PSBT_IN_PREVIOUS_TXID"))?;
        Txid::from_slice(value)
            .map_err(|_| FieldError::InvalidLen("PSBT_IN_PREVIOUS_TXID", value.len()))
    }

    /// Sets `PSBT_IN_PREVIOUS_TXID`.
    pub fn set_previous_txid(&mut self, index: usize, txid: Txid) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_PREVIOUS_TXID, txid.into_inner().to_vec());
        Ok(())
    }

    /// Returns the required `PSBT_IN_OUTPUT_INDEX` field.
    pub fn spent_output_index(&self, index: usize) -> Result<u32, FieldError> {
        let value = self
            .input_map(index)?
            .singular(PSBT_IN_OUTPUT_INDEX)
            .ok_or(FieldError::Missing("PSBT_IN_OUTPUT_INDEX"))?;
        u32_from_le("PSBT_IN_OUTPUT_INDEX", value)
    }

    /// Sets `PSBT_IN_OUTPUT_INDEX`.
    pub fn set_spent_output_index(
        &mut self,
        index: usize,
        vout: u32,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_OUTPUT_INDEX, vout.to_le_bytes().to_vec());
        Ok(())
    }

    /// Returns `PSBT_IN_SEQUENCE`, if present.
    pub fn sequence(&self, index: usize) -> Result<Option<Sequence>, FieldError> {
        match self.input_map(index)?.singular(PSBT_IN_SEQUENCE) {
            None => Ok(None),
            Some(value) => Ok(Some(Sequence(u32_from_le("PSBT_IN_SEQUENCE", value)?))),
        }
    }

    /// Sets `PSBT_IN_SEQUENCE`.
    pub fn set_sequence(&mut self, index: usize, sequence: Sequence) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_SEQUENCE, sequence.0.to_le_bytes().to_vec());
        Ok(())
    }

    /// Returns the `PSBT_IN_NON_WITNESS_UTXO` transaction, if present.
    pub fn non_witness_utxo(&self, index: usize) -> Result<Option<Transaction>, FieldError> {
        match self.input_map(index)?.singular(PSBT_IN_NON_WITNESS_UTXO) {
            None => Ok(None),
            Some(value) => Ok(Some(
                deserialize(value).map_err(|_| FieldError::Consensus("PSBT_IN_NON_WITNESS_UTXO"))?,
            )),
        }
    }

    /// Sets `PSBT_IN_NON_WITNESS_UTXO`.
    pub fn set_non_witness_utxo(
        &mut self,
        index: usize,
        tx: &Transaction,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_NON_WITNESS_UTXO, serialize(tx));
        Ok(())
    }

    /// Returns the `PSBT_IN_WITNESS_UTXO` output, if present.
    pub fn witness_utxo(&self, index: usize) -> Result<Option<TxOut>, FieldError> {
        match self.input_map(index)?.singular(PSBT_IN_WITNESS_UTXO) {
            None => Ok(None),
            Some(value) => Ok(Some(
                deserialize(value).map_err(|_| FieldError::Consensus("PSBT_IN_WITNESS_UTXO"))?,
            )),
        }
    }

    /// Sets `PSBT_IN_WITNESS_UTXO`.
    pub fn set_witness_utxo(&mut self, index: usize, txout: &TxOut) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_WITNESS_UTXO, serialize(txout));
        Ok(())
    }

    /// Returns `PSBT_IN_REDEEM_SCRIPT`, if present.
    pub fn input_redeem_script(&self, index: usize) -> Result<Option<Script>, FieldError> {
        Ok(self
            .input_map(index)?
            .singular(PSBT_IN_REDEEM_SCRIPT)
            .map(|value| Script::from(value.clone())))
    }

    /// Sets `PSBT_IN_REDEEM_SCRIPT`.
    pub fn set_input_redeem_script(
        &mut self,
        index: usize,
        script: Script,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_REDEEM_SCRIPT, script.into_bytes());
        Ok(())
    }

    /// Returns `PSBT_IN_WITNESS_SCRIPT`, if present.
    pub fn input_witness_script(&self, index: usize) -> Result<Option<Script>, FieldError> {
        Ok(self
            .input_map(index)?
            .singular(PSBT_IN_WITNESS_SCRIPT)
            .map(|value| Script::from(value.clone())))
    }

    /// Sets `PSBT_IN_WITNESS_SCRIPT`.
    pub fn set_input_witness_script(
        &mut self,
        index: usize,
        script: Script,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_WITNESS_SCRIPT, script.into_bytes());
        Ok(())
    }

    /// Enumerates all `PSBT_IN_BIP32_DERIVATION` entries of an input.
    pub fn input_bip32_derivations(
        &self,
        index: usize,
    ) -> Result<Vec<Bip32Derivation>, FieldError> {
        self.input_map(index)?
            .by_keytype(PSBT_IN_BIP32_DERIVATION)
            .map(|(key, value)| {
                let pubkey = PublicKey::from_slice(&key.key)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_BIP32_DERIVATION"))?;
                let source = key_source_from_slice("PSBT_IN_BIP32_DERIVATION", value)?;
                Ok(Bip32Derivation { pubkey, source })
            })
            .collect()
    }

    /// Adds or replaces a `PSBT_IN_BIP32_DERIVATION` entry keyed by its
    /// public key.
    pub fn set_input_bip32_derivation(
        &mut self,
        index: usize,
        derivation: &Bip32Derivation,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?.insert(
            raw::Key {
                type_value: PSBT_IN_BIP32_DERIVATION,
                key: derivation.pubkey.to_bytes(),
            },
            key_source_to_vec(&derivation.source),
        );
        Ok(())
    }

    /// Enumerates all `PSBT_IN_PARTIAL_SIG` entries of an input.
    pub fn partial_sigs(&self, index: usize) -> Result<Vec<PartialSig>, FieldError> {
        self.input_map(index)?
            .by_keytype(PSBT_IN_PARTIAL_SIG)
            .map(|(key, value)| {
                let pubkey = PublicKey::from_slice(&key.key)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_PARTIAL_SIG"))?;
                Ok(PartialSig {
                    pubkey,
                    signature: value.clone(),
                })
            })
            .collect()
    }

    /// Returns the partial signature made by `pubkey` on the given input,
    /// if present.
    pub fn partial_sig(
        &self,
        index: usize,
        pubkey: &PublicKey,
    ) -> Result<Option<Vec<u8>>, FieldError> {
        Ok(self
            .input_map(index)?
            .get(&raw::Key {
                type_value: PSBT_IN_PARTIAL_SIG,
                key: pubkey.to_bytes(),
            })
            .cloned())
    }

    /// Returns `PSBT_IN_SIGHASH_TYPE`, if present.
    pub fn sighash_type(&self, index: usize) -> Result<Option<u32>, FieldError> {
        match self.input_map(index)?.singular(PSBT_IN_SIGHASH_TYPE) {
            None => Ok(None),
            Some(value) => Ok(Some(u32_from_le("PSBT_IN_SIGHASH_TYPE", value)?)),
        }
    }

    /// Sets `PSBT_IN_SIGHASH_TYPE`.
    pub fn set_sighash_type(&mut self, index: usize, sighash: u32) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_SIGHASH_TYPE, sighash.to_le_bytes().to_vec());
        Ok(())
    }

    /// Returns `PSBT_IN_FINAL_SCRIPTSIG`, if present.
    pub fn final_script_sig(&self, index: usize) -> Result<Option<Script>, FieldError> {
        Ok(self
            .input_map(index)?
            .singular(PSBT_IN_FINAL_SCRIPTSIG)
            .map(|value| Script::from(value.clone())))
    }

    /// Sets `PSBT_IN_FINAL_SCRIPTSIG`.
    pub fn set_final_script_sig(
        &mut self,
        index: usize,
        script: Script,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_FINAL_SCRIPTSIG, script.into_bytes());
        Ok(())
    }

    /// Returns `PSBT_IN_FINAL_SCRIPTWITNESS`, if present.
    pub fn final_script_witness(&self, index: usize) -> Result<Option<Witness>, FieldError> {
        match self.input_map(index)?.singular(PSBT_IN_FINAL_SCRIPTWITNESS) {
            None => Ok(None),
            Some(value) => Ok(Some(deserialize(value).map_err(|_| {
                FieldError::Consensus("PSBT_IN_FINAL_SCRIPTWITNESS")
            })?)),
        }
    }

    /// Sets `PSBT_IN_FINAL_SCRIPTWITNESS`.
    pub fn set_final_script_witness(
        &mut self,
        index: usize,
        witness: &Witness,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_FINAL_SCRIPTWITNESS, serialize(witness));
        Ok(())
    }

    /// Returns the raw `PSBT_IN_POR_COMMITMENT` proof-of-reserves
    /// commitment, if present.
    pub fn por_commitment(&self, index: usize) -> Result<Option<Vec<u8>>, FieldError> {
        Ok(self.input_map(index)?.singular(PSBT_IN_POR_COMMITMENT).cloned())
    }

    /// Sets `PSBT_IN_POR_COMMITMENT`.
    pub fn set_por_commitment(
        &mut self,
        index: usize,
        commitment: Vec<u8>,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_POR_COMMITMENT, commitment);
        Ok(())
    }

    /// Enumerates all `PSBT_IN_RIPEMD160` hash-to-preimage entries.
    pub fn ripemd160_preimages(
        &self,
        index: usize,
    ) -> Result<Vec<(ripemd160::Hash, Vec<u8>)>, FieldError> {
        self.input_map(index)?
            .by_keytype(PSBT_IN_RIPEMD160)
            .map(|(key, value)| {
                let hash = ripemd160::Hash::from_slice(&key.key)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_RIPEMD160"))?;
                Ok((hash, value.clone()))
            })
            .collect()
    }

    /// Adds or replaces a `PSBT_IN_RIPEMD160` preimage keyed by its hash.
    pub fn set_ripemd160_preimage(
        &mut self,
        index: usize,
        hash: ripemd160::Hash,
        preimage: Vec<u8>,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?.insert(
            raw::Key {
                type_value: PSBT_IN_RIPEMD160,
                key: hash.into_inner().to_vec(),
            },
            preimage,
        );
        Ok(())
    }

    /// Enumerates all `PSBT_IN_SHA256` hash-to-preimage entries.
    pub fn sha256_preimages(
        &self,
        index: usize,
    ) -> Result<Vec<(sha256::Hash, Vec<u8>)>, FieldError> {
        self.input_map(index)?
            .by_keytype(PSBT_IN_SHA256)
            .map(|(key, value)| {
                let hash = sha256::Hash::from_slice(&key.key)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_SHA256"))?;
                Ok((hash, value.clone()))
            })
            .collect()
    }

    /// Adds or replaces a `PSBT_IN_SHA256` preimage keyed by its hash.
    pub fn set_sha256_preimage(
        &mut self,
        index: usize,
        hash: sha256::Hash,
        preimage: Vec<u8>,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?.insert(
            raw::Key {
                type_value: PSBT_IN_SHA256,
                key: hash.into_inner().to_vec(),
            },
            preimage,
        );
        Ok(())
    }

    /// Enumerates all `PSBT_IN_HASH160` hash-to-preimage entries.
    pub fn hash160_preimages(
        &self,
        index: usize,
    ) -> Result<Vec<(hash160::Hash, Vec<u8>)>, FieldError> {
        self.input_map(index)?
            .by_keytype(PSBT_IN_HASH160)
            .map(|(key, value)| {
                let hash = hash160::Hash::from_slice(&key.key)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_HASH160"))?;
                Ok((hash, value.clone()))
            })
            .collect()
    }

    /// Adds or replaces a `PSBT_IN_HASH160` preimage keyed by its hash.
    pub fn set_hash160_preimage(
        &mut self,
        index: usize,
        hash: hash160::Hash,
        preimage: Vec<u8>,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?.insert(
            raw::Key {
                type_value: PSBT_IN_HASH160,
                key: hash.into_inner().to_vec(),
            },
            preimage,
        );
        Ok(())
    }

    /// Enumerates all `PSBT_IN_HASH256` hash-to-preimage entries.
    pub fn hash256_preimages(
        &self,
        index: usize,
    ) -> Result<Vec<(sha256d::Hash, Vec<u8>)>, FieldError> {
        self.input_map(index)?
            .by_keytype(PSBT_IN_HASH256)
            .map(|(key, value)| {
                let hash = sha256d::Hash::from_slice(&key.key)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_HASH256"))?;
                Ok((hash, value.clone()))
            })
            .collect()
    }

    /// Adds or replaces a `PSBT_IN_HASH256` preimage keyed by its hash.
    pub fn set_hash256_preimage(
        &mut self,
        index: usize,
        hash: sha256d::Hash,
        preimage: Vec<u8>,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?.insert(
            raw::Key {
                type_value: PSBT_IN_HASH256,
                key: hash.into_inner().to_vec(),
            },
            preimage,
        );
        Ok(())
    }

    /// Returns `PSBT_IN_REQUIRED_TIME_LOCKTIME`, if present. Values below
    /// the 500000000 threshold are rejected.
    pub fn required_time_locktime(&self, index: usize) -> Result<Option<Time>, FieldError> {
        match self.input_map(index)?.singular(PSBT_IN_REQUIRED_TIME_LOCKTIME) {
            None => Ok(None),
            Some(value) => {
                let time = u32_from_le("PSBT_IN_REQUIRED_TIME_LOCKTIME", value)?;
                Ok(Some(
                    Time::from_consensus(time)
                        .map_err(|_| FieldError::InvalidTimeLocktime(time))?,
                ))
            }
        }
    }

    /// Sets `PSBT_IN_REQUIRED_TIME_LOCKTIME`.
    pub fn set_required_time_locktime(
        &mut self,
        index: usize,
        time: Time,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?.set_singular(
            PSBT_IN_REQUIRED_TIME_LOCKTIME,
            time.to_consensus_u32().to_le_bytes().to_vec(),
        );
        Ok(())
    }

    /// Returns `PSBT_IN_REQUIRED_HEIGHT_LOCKTIME`, if present. Values at or
    /// above the 500000000 threshold are rejected.
    pub fn required_height_locktime(
        &self,
        index: usize,
    ) -> Result<Option<Height>, FieldError> {
        match self
            .input_map(index)?
            .singular(PSBT_IN_REQUIRED_HEIGHT_LOCKTIME)
        {
            None => Ok(None),
            Some(value) => {
                let height = u32_from_le("PSBT_IN_REQUIRED_HEIGHT_LOCKTIME", value)?;
                Ok(Some(
                    Height::from_consensus(height)
                        .map_err(|_| FieldError::InvalidHeightLocktime(height))?,
                ))
            }
        }
    }

    /// Sets `PSBT_IN_REQUIRED_HEIGHT_LOCKTIME`.
    pub fn set_required_height_locktime(
        &mut self,
        index: usize,
        height: Height,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?.set_singular(
            PSBT_IN_REQUIRED_HEIGHT_LOCKTIME,
            height.to_consensus_u32().to_le_bytes().to_vec(),
        );
        Ok(())
    }

    /// Returns the `PSBT_IN_TAP_KEY_SIG` key path signature, if present.
    pub fn tap_key_sig(&self, index: usize) -> Result<Option<SchnorrSig>, FieldError> {
        match self.input_map(index)?.singular(PSBT_IN_TAP_KEY_SIG) {
            None => Ok(None),
            Some(value) => Ok(Some(
                SchnorrSig::from_slice(value)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_TAP_KEY_SIG"))?,
            )),
        }
    }

    /// Sets `PSBT_IN_TAP_KEY_SIG`.
    pub fn set_tap_key_sig(&mut self, index: usize, sig: &SchnorrSig) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_TAP_KEY_SIG, sig.to_vec());
        Ok(())
    }

    /// Enumerates all `PSBT_IN_TAP_SCRIPT_SIG` entries. Key data is an
    /// x-only public key followed by the leaf hash being signed.
    pub fn tap_script_sigs(&self, index: usize) -> Result<Vec<TapScriptSig>, FieldError> {
        self.input_map(index)?
            .by_keytype(PSBT_IN_TAP_SCRIPT_SIG)
            .map(|(key, value)| {
                if key.key.len() != 64 {
                    return Err(FieldError::InvalidKeyData("PSBT_IN_TAP_SCRIPT_SIG"));
                }
                let pubkey = XOnlyPublicKey::from_slice(&key.key[..32])
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_TAP_SCRIPT_SIG"))?;
                let leaf_hash = TapLeafHash::from_slice(&key.key[32..])
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_TAP_SCRIPT_SIG"))?;
                let signature = SchnorrSig::from_slice(value)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_TAP_SCRIPT_SIG"))?;
                Ok(TapScriptSig {
                    pubkey,
                    leaf_hash,
                    signature,
                })
            })
            .collect()
    }

    /// Adds or replaces a `PSBT_IN_TAP_SCRIPT_SIG` entry keyed by its
    /// public key and leaf hash.
    pub fn set_tap_script_sig(
        &mut self,
        index: usize,
        sig: &TapScriptSig,
    ) -> Result<(), FieldError> {
        let mut key_data = sig.pubkey.serialize().to_vec();
        key_data.extend(sig.leaf_hash.into_inner());
        self.input_map_mut(index)?.insert(
            raw::Key {
                type_value: PSBT_IN_TAP_SCRIPT_SIG,
                key: key_data,
            },
            sig.signature.to_vec(),
        );
        Ok(())
    }

    /// Enumerates all `PSBT_IN_TAP_LEAF_SCRIPT` entries. Key data is the
    /// control block; the value is the script followed by the leaf version
    /// byte.
    pub fn tap_leaf_scripts(&self, index: usize) -> Result<Vec<TapLeafScript>, FieldError> {
        self.input_map(index)?
            .by_keytype(PSBT_IN_TAP_LEAF_SCRIPT)
            .map(|(key, value)| {
                let control_block = ControlBlock::from_slice(&key.key)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_TAP_LEAF_SCRIPT"))?;
                let (version_byte, script) = value
                    .split_last()
                    .ok_or(FieldError::InvalidLen("PSBT_IN_TAP_LEAF_SCRIPT", 0))?;
                let leaf_version = LeafVersion::from_consensus(*version_byte)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_TAP_LEAF_SCRIPT"))?;
                Ok(TapLeafScript {
                    control_block,
                    script: Script::from(script.to_vec()),
                    leaf_version,
                })
            })
            .collect()
    }

    /// Adds or replaces a `PSBT_IN_TAP_LEAF_SCRIPT` entry keyed by its
    /// control block.
    pub fn set_tap_leaf_script(
        &mut self,
        index: usize,
        leaf: &TapLeafScript,
    ) -> Result<(), FieldError> {
        let mut value = leaf.script.to_bytes();
        value.push(leaf.leaf_version.to_consensus());
        self.input_map_mut(index)?.insert(
            raw::Key {
                type_value: PSBT_IN_TAP_LEAF_SCRIPT,
                key: leaf.control_block.serialize(),
            },
            value,
        );
        Ok(())
    }

    /// Enumerates all `PSBT_IN_TAP_BIP32_DERIVATION` entries. The value is
    /// a compact-size-prefixed list of leaf hashes followed by the key
    /// source.
    pub fn input_tap_bip32_derivations(
        &self,
        index: usize,
    ) -> Result<Vec<TapBip32Derivation>, FieldError> {
        self.input_map(index)?
            .by_keytype(PSBT_IN_TAP_BIP32_DERIVATION)
            .map(|(key, value)| tap_bip32_derivation(key, value, "PSBT_IN_TAP_BIP32_DERIVATION"))
            .collect()
    }

    /// Adds or replaces a `PSBT_IN_TAP_BIP32_DERIVATION` entry keyed by its
    /// x-only public key.
    pub fn set_input_tap_bip32_derivation(
        &mut self,
        index: usize,
        derivation: &TapBip32Derivation,
    ) -> Result<(), FieldError> {
        let (key, value) = tap_bip32_derivation_entry(PSBT_IN_TAP_BIP32_DERIVATION, derivation);
        self.input_map_mut(index)?.insert(key, value);
        Ok(())
    }

    /// Returns `PSBT_IN_TAP_INTERNAL_KEY`, if present.
    pub fn input_tap_internal_key(
        &self,
        index: usize,
    ) -> Result<Option<XOnlyPublicKey>, FieldError> {
        match self.input_map(index)?.singular(PSBT_IN_TAP_INTERNAL_KEY) {
            None => Ok(None),
            Some(value) => Ok(Some(
                XOnlyPublicKey::from_slice(value)
                    .map_err(|_| FieldError::InvalidKeyData("PSBT_IN_TAP_INTERNAL_KEY"))?,
            )),
        }
    }

    /// Sets `PSBT_IN_TAP_INTERNAL_KEY`.
    pub fn set_input_tap_internal_key(
        &mut self,
        index: usize,
        pubkey: XOnlyPublicKey,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_TAP_INTERNAL_KEY, pubkey.serialize().to_vec());
        Ok(())
    }

    /// Returns `PSBT_IN_TAP_MERKLE_ROOT`, if present.
    pub fn tap_merkle_root(&self, index: usize) -> Result<Option<TapBranchHash>, FieldError> {
        match self.input_map(index)?.singular(PSBT_IN_TAP_MERKLE_ROOT) {
            None => Ok(None),
            Some(value) => Ok(Some(TapBranchHash::from_slice(value).map_err(|_| {
                FieldError::InvalidLen("PSBT_IN_TAP_MERKLE_ROOT", value.len())
            })?)),
        }
    }

    /// Sets `PSBT_IN_TAP_MERKLE_ROOT`.
    pub fn set_tap_merkle_root(
        &mut self,
        index: usize,
        root: TapBranchHash,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?
            .set_singular(PSBT_IN_TAP_MERKLE_ROOT, root.into_inner().to_vec());
        Ok(())
    }

    /// Enumerates all `PSBT_IN_PROPRIETARY` entries of an input.
    pub fn input_proprietary(
        &self,
        index: usize,
    ) -> Result<Vec<(raw::ProprietaryKey, Vec<u8>)>, FieldError> {
        self.input_map(index)?
            .by_keytype(PSBT_IN_PROPRIETARY)
            .map(|(key, value)| {
                let prop = proprietary_from_key_data("PSBT_IN_PROPRIETARY", &key.key)?;
                Ok((prop, value.clone()))
            })
            .collect()
    }

    /// Stores a value under an input proprietary key.
    pub fn set_input_proprietary(
        &mut self,
        index: usize,
        key: raw::ProprietaryKey,
        value: Vec<u8>,
    ) -> Result<(), FieldError> {
        self.input_map_mut(index)?.insert(
            raw::Key {
                type_value: PSBT_IN_PROPRIETARY,
                key: proprietary_to_key_data(&key),
            },
            value,
        );
        Ok(())
    }

    /// Enumerates input entries with key types not defined by BIP174,
    /// BIP370 or BIP371.
    pub fn input_unknown(&self, index: usize) -> Result<Vec<(raw::Key, Vec<u8>)>, FieldError> {
        Ok(self
            .input_map(index)?
            .iter()
            .filter(|(key, _)| {
                key.type_value > PSBT_IN_TAP_MERKLE_ROOT
                    && key.type_value != PSBT_IN_PROPRIETARY
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

pub(crate) fn tap_bip32_derivation(
    key: &raw::Key,
    value: &[u8],
    field: &'static str,
) -> Result<TapBip32Derivation, FieldError> {
    let pubkey = XOnlyPublicKey::from_slice(&key.key)
        .map_err(|_| FieldError::InvalidKeyData(field))?;
    let mut cursor = value;
    let VarInt(count) =
        Decodable::consensus_decode(&mut cursor).map_err(|_| FieldError::InvalidKeyData(field))?;
    // The count is attacker-controlled; a plain multiplication could wrap.
    let hashes_len = count
        .checked_mul(32)
        .and_then(|len| usize::try_from(len).ok())
        .filter(|len| *len <= cursor.len())
        .ok_or(FieldError::InvalidLen(field, value.len()))?;
    let leaf_hashes = cursor[..hashes_len]
        .chunks_exact(32)
        .map(|chunk| TapLeafHash::from_slice(chunk).map_err(|_| FieldError::InvalidKeyData(field)))
        .collect::<Result<Vec<_>, _>>()?;
    let source = key_source_from_slice(field, &cursor[hashes_len..])?;
    Ok(TapBip32Derivation {
        pubkey,
        leaf_hashes,
        source,
    })
}

pub(crate) fn tap_bip32_derivation_entry(
    type_value: u8,
    derivation: &TapBip32Derivation,
) -> (raw::Key, Vec<u8>) {
    let mut value = serialize(&VarInt(derivation.leaf_hashes.len() as u64));
    for leaf_hash in &derivation.leaf_hashes {
        value.extend(leaf_hash.into_inner());
    }
    value.extend(key_source_to_vec(&derivation.source));
    (
        raw::Key {
            type_value,
            key: derivation.pubkey.serialize().to_vec(),
        },
        value,
    )
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use amplify::hex::FromHex;
    use bitcoin::util::bip32::{DerivationPath, Fingerprint};

    use super::*;
    use crate::maps::KeyMap;

    const PUBKEYS: [&str; 3] = [
        "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5",
        "02f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9",
    ];

    fn psbt_with_one_input() -> PsbtV2 {
        let mut psbt = PsbtV2::create();
        let mut map = KeyMap::new();
        map.set_singular(PSBT_IN_PREVIOUS_TXID, vec![0xaa; 32]);
        map.set_singular(PSBT_IN_OUTPUT_INDEX, 0u32.to_le_bytes().to_vec());
        psbt.maps_mut().inputs.push(map);
        psbt.sync_counts();
        psbt
    }

    #[test]
    fn terminal_fields() {
        let psbt = psbt_with_one_input();
        assert_eq!(psbt.previous_txid(0).unwrap().into_inner(), [0xaa; 32]);
        assert_eq!(psbt.spent_output_index(0).unwrap(), 0);
        assert!(matches!(
            psbt.previous_txid(1),
            Err(FieldError::InputOutOfRange(1, 1))
        ));
    }

    #[test]
    fn sequence_and_sighash() {
        let mut psbt = psbt_with_one_input();
        assert_eq!(psbt.sequence(0).unwrap(), None);
        psbt.set_sequence(0, Sequence(0xFFFF_FFFD)).unwrap();
        assert_eq!(psbt.sequence(0).unwrap(), Some(Sequence(0xFFFF_FFFD)));

        assert_eq!(psbt.sighash_type(0).unwrap(), None);
        psbt.set_sighash_type(0, 0x81).unwrap();
        assert_eq!(psbt.sighash_type(0).unwrap(), Some(0x81));
    }

    #[test]
    fn bip32_derivation_enumeration() {
        let mut psbt = psbt_with_one_input();
        let path = DerivationPath::from_str("m/84'/0'/0'/0/0").unwrap();
        for hex in PUBKEYS {
            let derivation = Bip32Derivation {
                pubkey: PublicKey::from_str(hex).unwrap(),
                source: (Fingerprint::from(&[0xde, 0xad, 0xbe, 0xef][..]), path.clone()),
            };
            psbt.set_input_bip32_derivation(0, &derivation).unwrap();
        }

        let derivations = psbt.input_bip32_derivations(0).unwrap();
        assert_eq!(derivations.len(), 3);
        for (derivation, hex) in derivations.iter().zip(PUBKEYS) {
            assert_eq!(derivation.pubkey, PublicKey::from_str(hex).unwrap());
            assert_eq!(derivation.source.1, path);
        }
    }

    #[test]
    fn preimages() {
        let mut psbt = psbt_with_one_input();
        let preimage = b"preimage".to_vec();
        let hash = sha256::Hash::hash(&preimage);
        psbt.set_sha256_preimage(0, hash, preimage.clone()).unwrap();
        assert_eq!(psbt.sha256_preimages(0).unwrap(), vec![(hash, preimage)]);
    }

    #[test]
    fn required_locktime_threshold() {
        let mut psbt = psbt_with_one_input();
        psbt.input_map_mut(0)
            .unwrap()
            .set_singular(PSBT_IN_REQUIRED_TIME_LOCKTIME, 100u32.to_le_bytes().to_vec());
        assert!(matches!(
            psbt.required_time_locktime(0),
            Err(FieldError::InvalidTimeLocktime(100))
        ));

        psbt.set_required_height_locktime(0, Height::from_consensus(700_000).unwrap())
            .unwrap();
        assert_eq!(
            psbt.required_height_locktime(0).unwrap(),
            Some(Height::from_consensus(700_000).unwrap())
        );
    }

    #[test]
    fn tap_bip32_derivation_roundtrip() {
        let mut psbt = psbt_with_one_input();
        let pubkey = Vec::from_hex(
            "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();
        let derivation = TapBip32Derivation {
            pubkey: XOnlyPublicKey::from_slice(&pubkey).unwrap(),
            leaf_hashes: vec![TapLeafHash::from_slice(&[0x11; 32]).unwrap()],
            source: (
                Fingerprint::from(&[0u8; 4][..]),
                DerivationPath::from_str("m/86'/0'/0'").unwrap(),
            ),
        };
        psbt.set_input_tap_bip32_derivation(0, &derivation).unwrap();
        assert_eq!(
            psbt.input_tap_bip32_derivations(0).unwrap(),
            vec![derivation]
        );
    }

    #[test]
    fn tap_bip32_oversized_leaf_count_rejected() {
        let mut psbt = psbt_with_one_input();
        let pubkey = Vec::from_hex(
            "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();
        let key = raw::Key {
            type_value: PSBT_IN_TAP_BIP32_DERIVATION,
            key: pubkey,
        };

        // Compact size declaring u64::MAX leaf hashes.
        psbt.input_map_mut(0).unwrap().insert(key.clone(), vec![0xff; 9]);
        assert!(matches!(
            psbt.input_tap_bip32_derivations(0),
            Err(FieldError::InvalidLen("PSBT_IN_TAP_BIP32_DERIVATION", 9))
        ));

        // Declared count exceeding the remaining value bytes.
        psbt.input_map_mut(0).unwrap().insert(key, vec![0x05]);
        assert!(matches!(
            psbt.input_tap_bip32_derivations(0),
            Err(FieldError::InvalidLen("PSBT_IN_TAP_BIP32_DERIVATION", 1))
        ));
    }

    #[test]
    fn scripts_roundtrip() {
        let mut psbt = psbt_with_one_input();
        let script = Script::from(vec![0x00, 0x14]);
        psbt.set_input_redeem_script(0, script.clone()).unwrap();
        assert_eq!(psbt.input_redeem_script(0).unwrap(), Some(script));
        assert_eq!(psbt.input_witness_script(0).unwrap(), None);
    }
}
