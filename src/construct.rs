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

//! Constructor- and Updater-role operations: adding and removing inputs,
//! outputs and global xpubs under the transaction modifiable flags.

use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::Hash;
use bitcoin::util::bip32::{ExtendedPubKey, KeySource};
use bitcoin::{Script, Sequence, Transaction, TxOut, Txid};

use crate::keytype::*;
use crate::maps::KeyMap;
use crate::util::key_source_to_vec;
use crate::{raw, Bip32Derivation, FieldError, PsbtV2};

/// Errors of the construction and mutation operations.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ConstructError {
    /// inputs can no longer be added to or removed from the transaction
    /// since it contains signatures committing to the input set
    InputsNotModifiable,

    /// outputs can no longer be added to or removed from the transaction
    /// since it contains signatures committing to the output set
    OutputsNotModifiable,

    /// invalid or missing field value
    #[from]
    #[display(inner)]
    Field(FieldError),
}

/// Optional per-input fields attached by [`PsbtV2::add_input`] alongside
/// the required previous txid and output index.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct InputFields {
    /// `PSBT_IN_SEQUENCE` value.
    pub sequence: Option<Sequence>,
    /// `PSBT_IN_NON_WITNESS_UTXO` transaction.
    pub non_witness_utxo: Option<Transaction>,
    /// `PSBT_IN_WITNESS_UTXO` output.
    pub witness_utxo: Option<TxOut>,
    /// `PSBT_IN_REDEEM_SCRIPT` value.
    pub redeem_script: Option<Script>,
    /// `PSBT_IN_WITNESS_SCRIPT` value.
    pub witness_script: Option<Script>,
    /// `PSBT_IN_BIP32_DERIVATION` entries.
    pub bip32_derivations: Vec<Bip32Derivation>,
}

/// Optional per-output fields attached by [`PsbtV2::add_output`] alongside
/// the required amount and script.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct OutputFields {
    /// `PSBT_OUT_REDEEM_SCRIPT` value.
    pub redeem_script: Option<Script>,
    /// `PSBT_OUT_WITNESS_SCRIPT` value.
    pub witness_script: Option<Script>,
    /// `PSBT_OUT_BIP32_DERIVATION` entries.
    pub bip32_derivations: Vec<Bip32Derivation>,
}

impl PsbtV2 {
    /// Appends a new input map spending `vout` of `txid`, returning the
    /// index of the added input.
    ///
    /// Fails if the inputs-modifiable flag is unset (or the modifiable
    /// field is absent altogether), leaving the document unchanged.
    pub fn add_input(
        &mut self,
        txid: Txid,
        vout: u32,
        fields: InputFields,
    ) -> Result<usize, ConstructError> {
        let flags = self.tx_modifiable()?.unwrap_or_default();
        if !flags.inputs_modifiable {
            return Err(ConstructError::InputsNotModifiable);
        }

        let mut map = KeyMap::new();
        map.set_singular(PSBT_IN_PREVIOUS_TXID, txid.into_inner().to_vec());
        map.set_singular(PSBT_IN_OUTPUT_INDEX, vout.to_le_bytes().to_vec());
        if let Some(sequence) = fields.sequence {
            map.set_singular(PSBT_IN_SEQUENCE, sequence.0.to_le_bytes().to_vec());
        }
        if let Some(tx) = &fields.non_witness_utxo {
            map.set_singular(PSBT_IN_NON_WITNESS_UTXO, serialize(tx));
        }
        if let Some(txout) = &fields.witness_utxo {
            map.set_singular(PSBT_IN_WITNESS_UTXO, serialize(txout));
        }
        if let Some(script) = fields.redeem_script {
            map.set_singular(PSBT_IN_REDEEM_SCRIPT, script.into_bytes());
        }
        if let Some(script) = fields.witness_script {
            map.set_singular(PSBT_IN_WITNESS_SCRIPT, script.into_bytes());
        }
        for derivation in &fields.bip32_derivations {
            map.insert(
                raw::Key {
                    type_value: PSBT_IN_BIP32_DERIVATION,
                    key: derivation.pubkey.to_bytes(),
                },
                key_source_to_vec(&derivation.source),
            );
        }

        self.maps_mut().inputs.push(map);
        self.sync_counts();
        Ok(self.num_inputs() - 1)
    }

    /// Appends a new output map paying `amount` satoshis to `script`,
    /// returning the index of the added output.
    ///
    /// Fails if the outputs-modifiable flag is unset, leaving the document
    /// unchanged.
    pub fn add_output(
        &mut self,
        amount: u64,
        script: Script,
        fields: OutputFields,
    ) -> Result<usize, ConstructError> {
        let flags = self.tx_modifiable()?.unwrap_or_default();
        if !flags.outputs_modifiable {
            return Err(ConstructError::OutputsNotModifiable);
        }

        let mut map = KeyMap::new();
        map.set_singular(PSBT_OUT_AMOUNT, amount.to_le_bytes().to_vec());
        map.set_singular(PSBT_OUT_SCRIPT, script.into_bytes());
        if let Some(script) = fields.redeem_script {
            map.set_singular(PSBT_OUT_REDEEM_SCRIPT, script.into_bytes());
        }
        if let Some(script) = fields.witness_script {
            map.set_singular(PSBT_OUT_WITNESS_SCRIPT, script.into_bytes());
        }
        for derivation in &fields.bip32_derivations {
            map.insert(
                raw::Key {
                    type_value: PSBT_OUT_BIP32_DERIVATION,
                    key: derivation.pubkey.to_bytes(),
                },
                key_source_to_vec(&derivation.source),
            );
        }

        self.maps_mut().outputs.push(map);
        self.sync_counts();
        Ok(self.num_outputs() - 1)
    }

    /// Removes the input map at `index`, shifting subsequent inputs down.
    pub fn delete_input(&mut self, index: usize) -> Result<(), ConstructError> {
        let flags = self.tx_modifiable()?.unwrap_or_default();
        if !flags.inputs_modifiable {
            return Err(ConstructError::InputsNotModifiable);
        }
        let count = self.num_inputs();
        if index >= count {
            return Err(FieldError::InputOutOfRange(index, count).into());
        }
        self.maps_mut().inputs.remove(index);
        self.sync_counts();
        Ok(())
    }

    /// Removes the output map at `index`, shifting subsequent outputs down.
    ///
    /// If the document carries a `SIGHASH_SINGLE` signature, the paired
    /// input at the same index loses its partial signatures: they committed
    /// to the output being removed.
    pub fn delete_output(&mut self, index: usize) -> Result<(), ConstructError> {
        let flags = self.tx_modifiable()?.unwrap_or_default();
        if !flags.outputs_modifiable {
            return Err(ConstructError::OutputsNotModifiable);
        }
        let count = self.num_outputs();
        if index >= count {
            return Err(FieldError::OutputOutOfRange(index, count).into());
        }
        self.maps_mut().outputs.remove(index);
        if flags.sighash_single {
            if let Some(input) = self.maps_mut().inputs.get_mut(index) {
                input.remove_keytype(PSBT_IN_PARTIAL_SIG);
            }
        }
        self.sync_counts();
        Ok(())
    }

    /// Adds or replaces a `PSBT_GLOBAL_XPUB` entry keyed by the serialized
    /// extended public key.
    pub fn add_global_xpub(&mut self, xpub: ExtendedPubKey, source: KeySource) {
        self.global_mut().insert(
            raw::Key {
                type_value: PSBT_GLOBAL_XPUB,
                key: xpub.encode().to_vec(),
            },
            key_source_to_vec(&source),
        );
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use bitcoin::util::bip32::DerivationPath;
    use bitcoin::util::bip32::Fingerprint;

    use super::*;
    use crate::ModifiableFlags;

    fn test_txid() -> Txid { Txid::from_slice(&[0xaa; 32]).unwrap() }

    fn witness_v0_script() -> Script {
        let mut bytes = vec![0x00, 0x14];
        bytes.extend([0u8; 20]);
        Script::from(bytes)
    }

    #[test]
    fn count_invariant() {
        let mut psbt = PsbtV2::create();
        psbt.add_input(test_txid(), 0, InputFields::default()).unwrap();
        psbt.add_input(test_txid(), 1, InputFields::default()).unwrap();
        psbt.add_output(1000, witness_v0_script(), OutputFields::default())
            .unwrap();
        assert_eq!(psbt.input_count().unwrap(), 2);
        assert_eq!(psbt.output_count().unwrap(), 1);

        psbt.delete_input(0).unwrap();
        assert_eq!(psbt.input_count().unwrap(), 1);
        assert_eq!(psbt.spent_output_index(0).unwrap(), 1);

        psbt.delete_output(0).unwrap();
        assert_eq!(psbt.output_count().unwrap(), 0);
    }

    #[test]
    fn role_enforcement() {
        let mut psbt = PsbtV2::create();
        psbt.set_tx_modifiable(ModifiableFlags {
            inputs_modifiable: false,
            outputs_modifiable: true,
            sighash_single: false,
        });
        let before = psbt.as_maps().clone();

        assert!(matches!(
            psbt.add_input(test_txid(), 0, InputFields::default()),
            Err(ConstructError::InputsNotModifiable)
        ));
        assert_eq!(psbt.as_maps(), &before);

        psbt.set_tx_modifiable(ModifiableFlags::unmodifiable());
        assert!(matches!(
            psbt.add_output(1000, witness_v0_script(), OutputFields::default()),
            Err(ConstructError::OutputsNotModifiable)
        ));
    }

    #[test]
    fn absent_flags_mean_unmodifiable() {
        let mut psbt = PsbtV2::create();
        psbt.global_mut().remove_singular(PSBT_GLOBAL_TX_MODIFIABLE);
        assert!(matches!(
            psbt.add_input(test_txid(), 0, InputFields::default()),
            Err(ConstructError::InputsNotModifiable)
        ));
    }

    #[test]
    fn delete_out_of_range() {
        let mut psbt = PsbtV2::create();
        assert!(matches!(
            psbt.delete_input(0),
            Err(ConstructError::Field(FieldError::InputOutOfRange(0, 0)))
        ));
    }

    #[test]
    fn sighash_single_cascade_on_delete_output() {
        let mut psbt = PsbtV2::create();
        psbt.add_input(test_txid(), 0, InputFields::default()).unwrap();
        psbt.add_input(test_txid(), 1, InputFields::default()).unwrap();
        psbt.add_output(1000, witness_v0_script(), OutputFields::default())
            .unwrap();
        psbt.add_output(2000, witness_v0_script(), OutputFields::default())
            .unwrap();

        let pk1 = bitcoin::PublicKey::from_str(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();
        let pk2 = bitcoin::PublicKey::from_str(
            "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5",
        )
        .unwrap();
        psbt.add_partial_sig(0, pk1, &[0x30, 0x01, 0x03]).unwrap();
        psbt.add_partial_sig(1, pk2, &[0x30, 0x01, 0x03]).unwrap();

        // Combined document where outputs remained modifiable alongside
        // the single flag.
        psbt.set_tx_modifiable(ModifiableFlags {
            inputs_modifiable: false,
            outputs_modifiable: true,
            sighash_single: true,
        });
        psbt.delete_output(0).unwrap();

        // The input paired with the removed output loses its signature;
        // the other input keeps its own.
        assert!(psbt.partial_sigs(0).unwrap().is_empty());
        assert_eq!(psbt.partial_sigs(1).unwrap().len(), 1);
        assert_eq!(psbt.output_count().unwrap(), 1);
        assert_eq!(psbt.amount(0).unwrap(), 2000);
    }

    #[test]
    fn input_fields_attached() {
        let mut psbt = PsbtV2::create();
        let derivation = Bip32Derivation {
            pubkey: bitcoin::PublicKey::from_str(
                "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
            )
            .unwrap(),
            source: (
                Fingerprint::from(&[0u8; 4][..]),
                DerivationPath::from_str("m/84'/0'/0'/0/0").unwrap(),
            ),
        };
        let index = psbt
            .add_input(test_txid(), 3, InputFields {
                sequence: Some(Sequence(0xFFFF_FFFD)),
                bip32_derivations: vec![derivation.clone()],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(psbt.sequence(index).unwrap(), Some(Sequence(0xFFFF_FFFD)));
        assert_eq!(psbt.input_bip32_derivations(index).unwrap(), vec![derivation]);
    }

    #[test]
    fn end_to_end_scenario() {
        let mut psbt = PsbtV2::create();
        psbt.add_input(test_txid(), 0, InputFields::default()).unwrap();
        psbt.add_output(1000, witness_v0_script(), OutputFields::default())
            .unwrap();

        let hex = psbt.to_hex();
        let reparsed = PsbtV2::from_hex(&hex).unwrap();

        assert_eq!(reparsed.input_count().unwrap(), 1);
        assert_eq!(reparsed.output_count().unwrap(), 1);
        assert_eq!(reparsed.previous_txid(0).unwrap(), test_txid());
        assert_eq!(reparsed.amount(0).unwrap(), 1000);
        assert_eq!(reparsed, psbt);
    }
}
