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

//! Signer-role operations: attaching and removing partial signatures, with
//! the BIP370 modifiable-flags collapse driven by the signature's sighash
//! type byte.

use bitcoin::PublicKey;

use crate::keytype::*;
use crate::{raw, FieldError, PsbtV2};

const SIGHASH_NONE: u8 = 0x02;
const SIGHASH_SINGLE: u8 = 0x03;
const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Errors of partial signature attachment and removal.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum SignError {
    /// signature data is empty; a partial signature must carry at least
    /// the sighash type byte
    EmptySignature,

    /// input #{1} already carries a signature for public key {0}
    DuplicateSignature(PublicKey, usize),

    /// input #{1} carries no signature for public key {0}
    NoSignature(PublicKey, usize),

    /// invalid or missing field value
    #[from]
    #[display(inner)]
    Field(FieldError),
}

impl PsbtV2 {
    /// Attaches a partial signature made by `pubkey` to the input at
    /// `index` and collapses the transaction modifiable flags according to
    /// the signature's trailing sighash type byte:
    ///
    /// - without `ANYONECANPAY`, inputs are no longer modifiable;
    /// - unless the masked type is `NONE`, outputs are no longer
    ///   modifiable;
    /// - a masked type of `SINGLE` raises the has-`SIGHASH_SINGLE` flag.
    ///
    /// The operation is atomic: if the flag update fails, the signature is
    /// removed and the previous flags restored before the error propagates.
    pub fn add_partial_sig(
        &mut self,
        index: usize,
        pubkey: PublicKey,
        signature: &[u8],
    ) -> Result<(), SignError> {
        if signature.is_empty() {
            return Err(SignError::EmptySignature);
        }
        let sighash_byte = signature[signature.len() - 1];

        let key = raw::Key {
            type_value: PSBT_IN_PARTIAL_SIG,
            key: pubkey.to_bytes(),
        };
        if self.input_map(index)?.contains_key(&key) {
            return Err(SignError::DuplicateSignature(pubkey, index));
        }

        let flags_snapshot = self.global().singular(PSBT_GLOBAL_TX_MODIFIABLE).cloned();
        self.input_map_mut(index)?.insert(key.clone(), signature.to_vec());

        if let Err(err) = self.collapse_modifiable(sighash_byte) {
            // Revert both map mutations so the document is left exactly as
            // it was before the call.
            if let Ok(input) = self.input_map_mut(index) {
                input.remove(&key);
            }
            match flags_snapshot {
                Some(value) => self
                    .global_mut()
                    .set_singular(PSBT_GLOBAL_TX_MODIFIABLE, value),
                None => {
                    self.global_mut().remove_singular(PSBT_GLOBAL_TX_MODIFIABLE);
                }
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn collapse_modifiable(&mut self, sighash_byte: u8) -> Result<(), FieldError> {
        let mut flags = self.tx_modifiable()?.unwrap_or_default();
        if sighash_byte & SIGHASH_ANYONECANPAY == 0 {
            flags.inputs_modifiable = false;
        }
        let masked = sighash_byte & !SIGHASH_ANYONECANPAY;
        if masked != SIGHASH_NONE {
            flags.outputs_modifiable = false;
        }
        if masked == SIGHASH_SINGLE {
            flags.sighash_single = true;
        }
        self.set_tx_modifiable(flags);
        Ok(())
    }

    /// Removes the partial signature made by `pubkey` from the input at
    /// `index`, failing if no such signature is present.
    pub fn remove_partial_sig(
        &mut self,
        index: usize,
        pubkey: &PublicKey,
    ) -> Result<(), SignError> {
        let removed = self.input_map_mut(index)?.remove(&raw::Key {
            type_value: PSBT_IN_PARTIAL_SIG,
            key: pubkey.to_bytes(),
        });
        match removed {
            Some(_) => Ok(()),
            None => Err(SignError::NoSignature(*pubkey, index)),
        }
    }

    /// Removes all partial signatures from the input at `index`.
    pub fn clear_partial_sigs(&mut self, index: usize) -> Result<(), SignError> {
        self.input_map_mut(index)?.remove_keytype(PSBT_IN_PARTIAL_SIG);
        Ok(())
    }
}
