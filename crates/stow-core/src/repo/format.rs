use stow_types::error::{Result, StowError};
use stow_types::BlobType;

use crate::crypto::CryptoEngine;

/// Domain-separation marker for object identity binding in AEAD AAD.
const OBJECT_CONTEXT_AAD_PREFIX: &[u8] = b"stow:object-context:v1\0";

/// Object type tags for the repo envelope format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    Snapshot = 2,
    DataBlob = 3,
    TreeBlob = 4,
    PackHeader = 5,
    Index = 6,
}

impl ObjectType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            2 => Ok(Self::Snapshot),
            3 => Ok(Self::DataBlob),
            4 => Ok(Self::TreeBlob),
            5 => Ok(Self::PackHeader),
            6 => Ok(Self::Index),
            _ => Err(StowError::UnknownObjectType(v)),
        }
    }

    /// Envelope tag used for a blob of the given kind inside a pack.
    pub fn for_blob(blob_type: BlobType) -> Self {
        match blob_type {
            BlobType::Data => Self::DataBlob,
            BlobType::Tree => Self::TreeBlob,
        }
    }
}

fn tag_aad(tag: u8) -> [u8; 1] {
    [tag]
}

fn contextual_aad(tag: u8, context: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + OBJECT_CONTEXT_AAD_PREFIX.len() + context.len());
    aad.push(tag);
    aad.extend_from_slice(OBJECT_CONTEXT_AAD_PREFIX);
    aad.extend_from_slice(context);
    aad
}

fn parse_object_envelope(data: &[u8]) -> Result<(u8, ObjectType, &[u8])> {
    if data.is_empty() {
        return Err(StowError::InvalidFormat("empty object".into()));
    }
    let tag = data[0];
    let obj_type = ObjectType::from_u8(tag)?;
    Ok((tag, obj_type, &data[1..]))
}

fn check_type(expected: ObjectType, actual: ObjectType) -> Result<()> {
    if expected != actual {
        return Err(StowError::InvalidFormat(format!(
            "unexpected object type: expected {expected:?}, got {actual:?}"
        )));
    }
    Ok(())
}

/// Serialize a typed payload into an encrypted repo object.
///
/// Wire format: `[1-byte type_tag][engine output]`. The type tag is passed as
/// AAD so it cannot be swapped without failing authentication.
pub fn pack_object(
    obj_type: ObjectType,
    plaintext: &[u8],
    crypto: &dyn CryptoEngine,
) -> Result<Vec<u8>> {
    let tag = obj_type as u8;
    let encrypted = crypto.encrypt(plaintext, &tag_aad(tag))?;

    let mut out = Vec::with_capacity(1 + encrypted.len());
    out.push(tag);
    out.extend_from_slice(&encrypted);
    Ok(out)
}

/// Like [`pack_object`], additionally binding the object to `context`
/// (blobs use their own ID) so a blob moved under another ID fails to decrypt.
pub fn pack_object_with_context(
    obj_type: ObjectType,
    context: &[u8],
    plaintext: &[u8],
    crypto: &dyn CryptoEngine,
) -> Result<Vec<u8>> {
    let tag = obj_type as u8;
    let encrypted = crypto.encrypt(plaintext, &contextual_aad(tag, context))?;

    let mut out = Vec::with_capacity(1 + encrypted.len());
    out.push(tag);
    out.extend_from_slice(&encrypted);
    Ok(out)
}

/// Deserialize and decrypt a repo object, ensuring its type tag matches.
pub fn unpack_object_expect(
    data: &[u8],
    expected_type: ObjectType,
    crypto: &dyn CryptoEngine,
) -> Result<Vec<u8>> {
    let (tag, obj_type, encrypted) = parse_object_envelope(data)?;
    check_type(expected_type, obj_type)?;
    crypto.decrypt(encrypted, &tag_aad(tag))
}

/// Context-bound variant of [`unpack_object_expect`].
pub fn unpack_object_expect_with_context(
    data: &[u8],
    expected_type: ObjectType,
    context: &[u8],
    crypto: &dyn CryptoEngine,
) -> Result<Vec<u8>> {
    let (tag, obj_type, encrypted) = parse_object_envelope(data)?;
    // Decrypt before the type check: AEAD must authenticate the tag first.
    let plaintext = crypto.decrypt(encrypted, &contextual_aad(tag, context))?;
    check_type(expected_type, obj_type)?;
    Ok(plaintext)
}
