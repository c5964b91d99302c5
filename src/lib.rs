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

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code, /* missing_docs, */ warnings)]

//! Partially signed bitcoin transaction v2 library.
//!
//! Models a PSBT as the three ordered key-value map collections defined by
//! BIP174 (one global map plus per-input and per-output maps), provides typed
//! accessors for every BIP174/BIP370/BIP371-defined key type, and implements
//! the constructor/signer mutation protocol of BIP370: transaction
//! modifiable flags, locktime resolution and partial signature attachment
//! with sighash-driven modifiability collapse.

#[macro_use]
extern crate amplify;

mod construct;
mod errors;
mod global;
mod input;
pub mod keytype;
mod maps;
mod output;
mod sign;
mod util;
mod v0;

pub use bitcoin::util::psbt::raw;
pub use construct::{ConstructError, InputFields, OutputFields};
pub use errors::{FieldError, ValidationError};
pub use global::{GlobalXpub, ModifiableFlags, PsbtV2};
pub use input::{
    Bip32Derivation, PartialSig, TapBip32Derivation, TapLeafScript, TapScriptSig,
};
pub use maps::{psbt_version_number, KeyMap, ParseError, PsbtV2Maps, PSBT_MAGIC};
pub use sign::SignError;
pub use v0::FromV0Error;
