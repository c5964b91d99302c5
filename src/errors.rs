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

/// Errors decoding a typed field out of PSBT key-value map data.
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum FieldError {
    /// required field {0} is absent from the PSBT map
    Missing(&'static str),

    /// field {0} has invalid value length {1}
    InvalidLen(&'static str, usize),

    /// field {0} contains excess bytes after the encoded value
    TrailingData(&'static str),

    /// field {0} does not contain a valid public key, signature or script
    /// commitment encoding
    InvalidKeyData(&'static str),

    /// field {0} can't be decoded as bitcoin consensus-serialized data
    Consensus(&'static str),

    /// PSBT version {0} is less than 2, which is not allowed for a v2
    /// document
    VersionTooLow(u32),

    /// transaction version {0} is less than 2; BIP370 requires creators to
    /// use version 2 or higher
    TxVersionTooLow(u32),

    /// required time-based locktime {0} is below the 500000000 threshold
    /// separating UNIX timestamps from block heights
    InvalidTimeLocktime(u32),

    /// required height-based locktime {0} is not below the 500000000
    /// threshold separating block heights from UNIX timestamps
    InvalidHeightLocktime(u32),

    /// input at index {0} exceeds the number of inputs {1}
    InputOutOfRange(usize, usize),

    /// output at index {0} exceeds the number of outputs {1}
    OutputOutOfRange(usize, usize),
}

/// Errors of structural PSBT v2 validation, checked when a document is
/// constructed from raw maps and re-checked after deserialization.
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ValidationError {
    /// reserved key type 0x00 is present in the global map of a v2 document
    ReservedGlobalKey,

    /// required global field {0} is absent
    MissingGlobalField(&'static str),

    /// input #{0} misses required field {1}
    MissingInputField(usize, &'static str),

    /// output #{0} misses required field {1}
    MissingOutputField(usize, &'static str),

    /// declared input count {declared} does not match the number of input
    /// maps {actual}
    InputCountMismatch {
        /// Count declared in the global map.
        declared: usize,
        /// Actual number of input maps.
        actual: usize,
    },

    /// declared output count {declared} does not match the number of output
    /// maps {actual}
    OutputCountMismatch {
        /// Count declared in the global map.
        declared: usize,
        /// Actual number of output maps.
        actual: usize,
    },

    /// invalid field value
    #[from]
    #[display(inner)]
    Field(FieldError),
}
