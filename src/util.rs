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

//! Scalar value codecs shared by the typed field accessors.

use bitcoin::consensus::encode::{self, Decodable, VarInt};
use bitcoin::util::bip32::{ChildNumber, DerivationPath, Fingerprint, KeySource};

use crate::raw::ProprietaryKey;
use crate::FieldError;

pub(crate) fn u32_from_le(field: &'static str, value: &[u8]) -> Result<u32, FieldError> {
    let bytes: [u8; 4] = value
        .try_into()
        .map_err(|_| FieldError::InvalidLen(field, value.len()))?;
    Ok(u32::from_le_bytes(bytes))
}

pub(crate) fn u64_from_le(field: &'static str, value: &[u8]) -> Result<u64, FieldError> {
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| FieldError::InvalidLen(field, value.len()))?;
    Ok(u64::from_le_bytes(bytes))
}

/// Decodes a bitcoin compact size integer occupying the whole value buffer.
pub(crate) fn compact_size(field: &'static str, value: &[u8]) -> Result<u64, FieldError> {
    let mut cursor = value;
    let VarInt(count) = Decodable::consensus_decode(&mut cursor)
        .map_err(|_| FieldError::InvalidLen(field, value.len()))?;
    if !cursor.is_empty() {
        return Err(FieldError::TrailingData(field));
    }
    Ok(count)
}

pub(crate) fn compact_size_to_vec(count: u64) -> Vec<u8> {
    encode::serialize(&VarInt(count))
}

/// Decodes a BIP32 key source (master fingerprint followed by little-endian
/// derivation indexes) from PSBT map value data.
pub(crate) fn key_source_from_slice(
    field: &'static str,
    data: &[u8],
) -> Result<KeySource, FieldError> {
    if data.len() < 4 || (data.len() - 4) % 4 != 0 {
        return Err(FieldError::InvalidLen(field, data.len()));
    }
    let fingerprint = Fingerprint::from(&data[..4]);
    let path = data[4..]
        .chunks_exact(4)
        .map(|chunk| {
            let index = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            ChildNumber::from(index)
        })
        .collect::<Vec<_>>();
    Ok((fingerprint, DerivationPath::from(path)))
}

pub(crate) fn key_source_to_vec(source: &KeySource) -> Vec<u8> {
    let (fingerprint, path) = source;
    let mut data = fingerprint.as_bytes().to_vec();
    for child in path {
        data.extend(u32::from(*child).to_le_bytes());
    }
    data
}

/// Decodes proprietary key data: compact size prefix length, identifier
/// prefix, subtype byte and the remaining subkey data.
pub(crate) fn proprietary_from_key_data(
    field: &'static str,
    data: &[u8],
) -> Result<ProprietaryKey, FieldError> {
    let mut cursor = data;
    let VarInt(prefix_len) = Decodable::consensus_decode(&mut cursor)
        .map_err(|_| FieldError::InvalidKeyData(field))?;
    // The prefix length is attacker-controlled; at least one byte must
    // remain after the prefix for the subtype.
    let prefix_len = usize::try_from(prefix_len)
        .ok()
        .filter(|len| *len < cursor.len())
        .ok_or(FieldError::InvalidKeyData(field))?;
    Ok(ProprietaryKey {
        prefix: cursor[..prefix_len].to_vec(),
        subtype: cursor[prefix_len],
        key: cursor[prefix_len + 1..].to_vec(),
    })
}

pub(crate) fn proprietary_to_key_data(key: &ProprietaryKey) -> Vec<u8> {
    let mut data = encode::serialize(&VarInt(key.prefix.len() as u64));
    data.extend_from_slice(&key.prefix);
    data.push(key.subtype);
    data.extend_from_slice(&key.key);
    data
}
