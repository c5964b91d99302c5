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

//! Bridge from legacy BIP174 v0 documents, replaying the embedded unsigned
//! transaction and all per-input and per-output metadata through the v2
//! construction protocol.

use bitcoin::consensus::encode;
use bitcoin::util::psbt::serialize::Serialize;
use bitcoin::util::psbt::PartiallySignedTransaction;
use bitcoin::PublicKey;

use crate::{
    Bip32Derivation, ConstructError, FieldError, InputFields, OutputFields, PsbtV2, SignError,
    TapBip32Derivation, TapLeafScript, TapScriptSig,
};

/// Errors of converting a legacy v0 document into the v2 model.
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum FromV0Error {
    /// invalid consensus encoding of a legacy PSBT
    #[from]
    #[display(inner)]
    Encoding(encode::Error),

    /// legacy transaction version {0} cannot be carried into a v2 document
    TxVersion(i32),

    /// failure replaying legacy inputs and outputs
    #[from]
    #[display(inner)]
    Construct(ConstructError),

    /// failure replaying legacy partial signatures
    #[from]
    #[display(inner)]
    Sign(SignError),

    /// invalid field value
    #[from]
    #[display(inner)]
    Field(FieldError),
}

impl PsbtV2 {
    /// Converts a consensus-serialized legacy (v0) PSBT into a v2 document.
    ///
    /// A fresh fully-modifiable document is created and the legacy content
    /// is replayed through the ordinary construction operations: global
    /// xpubs, then every input and output with its metadata, and partial
    /// signatures last, since attaching them collapses the modifiable
    /// flags.
    ///
    /// Legacy documents with transaction version 1 are rejected unless
    /// `allow_tx_version_1` is set.
    pub fn from_v0(bytes: &[u8], allow_tx_version_1: bool) -> Result<PsbtV2, FromV0Error> {
        let v0: PartiallySignedTransaction = encode::deserialize(bytes)?;
        let tx = &v0.unsigned_tx;

        let mut psbt = PsbtV2::create();

        match tx.version {
            version if version >= 2 => psbt.set_tx_version(version as u32)?,
            1 if allow_tx_version_1 => psbt.set_tx_version_unchecked(1),
            version => return Err(FromV0Error::TxVersion(version)),
        }
        if tx.lock_time.0 != 0 {
            psbt.set_fallback_locktime(bitcoin::LockTime::from_consensus(tx.lock_time.0));
        }
        for (xpub, source) in &v0.xpub {
            psbt.add_global_xpub(*xpub, source.clone());
        }
        for (key, value) in &v0.proprietary {
            psbt.set_global_proprietary(key.clone(), value.clone());
        }

        for (txin, input) in tx.input.iter().zip(&v0.inputs) {
            let index = psbt.add_input(
                txin.previous_output.txid,
                txin.previous_output.vout,
                InputFields {
                    sequence: Some(txin.sequence),
                    non_witness_utxo: input.non_witness_utxo.clone(),
                    witness_utxo: input.witness_utxo.clone(),
                    redeem_script: input.redeem_script.clone(),
                    witness_script: input.witness_script.clone(),
                    bip32_derivations: input
                        .bip32_derivation
                        .iter()
                        .map(|(pubkey, source)| Bip32Derivation {
                            pubkey: PublicKey::new(*pubkey),
                            source: source.clone(),
                        })
                        .collect(),
                },
            )?;

            if let Some(sighash_type) = input.sighash_type {
                psbt.set_sighash_type(index, sighash_type.to_u32())?;
            }
            if let Some(script) = &input.final_script_sig {
                psbt.set_final_script_sig(index, script.clone())?;
            }
            if let Some(witness) = &input.final_script_witness {
                psbt.set_final_script_witness(index, witness)?;
            }
            for (hash, preimage) in &input.ripemd160_preimages {
                psbt.set_ripemd160_preimage(index, *hash, preimage.clone())?;
            }
            for (hash, preimage) in &input.sha256_preimages {
                psbt.set_sha256_preimage(index, *hash, preimage.clone())?;
            }
            for (hash, preimage) in &input.hash160_preimages {
                psbt.set_hash160_preimage(index, *hash, preimage.clone())?;
            }
            for (hash, preimage) in &input.hash256_preimages {
                psbt.set_hash256_preimage(index, *hash, preimage.clone())?;
            }
            if let Some(sig) = &input.tap_key_sig {
                psbt.set_tap_key_sig(index, sig)?;
            }
            for ((pubkey, leaf_hash), signature) in &input.tap_script_sigs {
                psbt.set_tap_script_sig(index, &TapScriptSig {
                    pubkey: *pubkey,
                    leaf_hash: *leaf_hash,
                    signature: signature.clone(),
                })?;
            }
            for (control_block, (script, leaf_version)) in &input.tap_scripts {
                psbt.set_tap_leaf_script(index, &TapLeafScript {
                    control_block: control_block.clone(),
                    script: script.clone(),
                    leaf_version: *leaf_version,
                })?;
            }
            for (pubkey, (leaf_hashes, source)) in &input.tap_key_origins {
                psbt.set_input_tap_bip32_derivation(index, &TapBip32Derivation {
                    pubkey: *pubkey,
                    leaf_hashes: leaf_hashes.clone(),
                    source: source.clone(),
                })?;
            }
            if let Some(pubkey) = input.tap_internal_key {
                psbt.set_input_tap_internal_key(index, pubkey)?;
            }
            if let Some(root) = input.tap_merkle_root {
                psbt.set_tap_merkle_root(index, root)?;
            }
            for (key, value) in &input.proprietary {
                psbt.set_input_proprietary(index, key.clone(), value.clone())?;
            }
        }

        for (txout, output) in tx.output.iter().zip(&v0.outputs) {
            let index = psbt.add_output(txout.value, txout.script_pubkey.clone(), OutputFields {
                redeem_script: output.redeem_script.clone(),
                witness_script: output.witness_script.clone(),
                bip32_derivations: output
                    .bip32_derivation
                    .iter()
                    .map(|(pubkey, source)| Bip32Derivation {
                        pubkey: PublicKey::new(*pubkey),
                        source: source.clone(),
                    })
                    .collect(),
            })?;

            if let Some(pubkey) = output.tap_internal_key {
                psbt.set_output_tap_internal_key(index, pubkey)?;
            }
            if let Some(tree) = &output.tap_tree {
                psbt.set_output_tap_tree(index, tree.serialize())?;
            }
            for (pubkey, (leaf_hashes, source)) in &output.tap_key_origins {
                psbt.set_output_tap_bip32_derivation(index, &TapBip32Derivation {
                    pubkey: *pubkey,
                    leaf_hashes: leaf_hashes.clone(),
                    source: source.clone(),
                })?;
            }
            for (key, value) in &output.proprietary {
                psbt.set_output_proprietary(index, key.clone(), value.clone())?;
            }
        }

        // Signatures go last: attaching them collapses the modifiable
        // flags, which would make the construction calls above fail.
        for (index, input) in v0.inputs.iter().enumerate() {
            for (pubkey, sig) in &input.partial_sigs {
                psbt.add_partial_sig(index, *pubkey, &sig.to_vec())?;
            }
        }

        Ok(psbt)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use bitcoin::hashes::Hash;
    use bitcoin::secp256k1::ecdsa::Signature;
    use bitcoin::util::psbt::PartiallySignedTransaction;
    use bitcoin::{
        EcdsaSig, OutPoint, PackedLockTime, Script, Sequence, Transaction, TxIn, TxOut, Txid,
        Witness,
    };

    use super::*;
    use crate::ModifiableFlags;

    fn unsigned_tx(version: i32) -> Transaction {
        Transaction {
            version,
            lock_time: PackedLockTime(0),
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_slice(&[0xaa; 32]).unwrap(),
                    vout: 1,
                },
                script_sig: Script::new(),
                sequence: Sequence(0xFFFF_FFFD),
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: 1000,
                script_pubkey: Script::from(vec![0x00, 0x14]),
            }],
        }
    }

    fn legacy_bytes(version: i32) -> Vec<u8> {
        let v0 = PartiallySignedTransaction::from_unsigned_tx(unsigned_tx(version)).unwrap();
        encode::serialize(&v0)
    }

    #[test]
    fn replays_structure() {
        let psbt = PsbtV2::from_v0(&legacy_bytes(2), false).unwrap();

        assert_eq!(psbt.version().unwrap(), 2);
        assert_eq!(psbt.tx_version().unwrap(), 2);
        assert_eq!(psbt.input_count().unwrap(), 1);
        assert_eq!(psbt.output_count().unwrap(), 1);
        assert_eq!(psbt.previous_txid(0).unwrap().into_inner(), [0xaa; 32]);
        assert_eq!(psbt.spent_output_index(0).unwrap(), 1);
        assert_eq!(psbt.sequence(0).unwrap(), Some(Sequence(0xFFFF_FFFD)));
        assert_eq!(psbt.amount(0).unwrap(), 1000);
        assert_eq!(psbt.script(0).unwrap(), Script::from(vec![0x00, 0x14]));
    }

    #[test]
    fn tx_version_1_gate() {
        assert!(matches!(
            PsbtV2::from_v0(&legacy_bytes(1), false),
            Err(FromV0Error::TxVersion(1))
        ));
        let psbt = PsbtV2::from_v0(&legacy_bytes(1), true).unwrap();
        assert_eq!(psbt.tx_version().unwrap(), 1);
    }

    #[test]
    fn locktime_carried_as_fallback() {
        let mut tx = unsigned_tx(2);
        tx.lock_time = PackedLockTime(700_000);
        let v0 = PartiallySignedTransaction::from_unsigned_tx(tx).unwrap();
        let psbt = PsbtV2::from_v0(&encode::serialize(&v0), false).unwrap();
        assert_eq!(
            psbt.fallback_locktime().unwrap().map(|lock| lock.to_consensus_u32()),
            Some(700_000)
        );
    }

    #[test]
    fn signatures_replayed_last() {
        let mut v0 = PartiallySignedTransaction::from_unsigned_tx(unsigned_tx(2)).unwrap();
        let pubkey = PublicKey::from_str(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();
        let sig = EcdsaSig::sighash_all(Signature::from_compact(&[0x01; 64]).unwrap());
        let sig_bytes = sig.to_vec();
        v0.inputs[0].partial_sigs.insert(pubkey, sig);

        let psbt = PsbtV2::from_v0(&encode::serialize(&v0), false).unwrap();
        assert_eq!(psbt.partial_sig(0, &pubkey).unwrap(), Some(sig_bytes));
        // A SIGHASH_ALL signature locks down both flag bits.
        assert_eq!(
            psbt.tx_modifiable().unwrap(),
            Some(ModifiableFlags::unmodifiable())
        );
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            PsbtV2::from_v0(&[0x00, 0x01, 0x02], false),
            Err(FromV0Error::Encoding(_))
        ));
    }
}
