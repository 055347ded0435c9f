//! Security handler interface for encrypted documents.
//!
//! The reader does not ship a concrete handler. It asks the handler (when one
//! is installed) to decrypt every string read from the file and to put a
//! decrypting stage at the head of every stream's decoder chain. Callers that
//! need to read encrypted files install their own implementation with
//! [`crate::document::PdfDocument::set_security_handler`].

use crate::decoders::BoxedDecoder;
use crate::error::{Error, Result};
use crate::object::Object;

/// Decrypts the strings and streams of one document.
pub trait SecurityHandler {
    /// Try `password`. Returns true once the document can be decrypted.
    fn unlock(&mut self, password: &[u8]) -> bool;

    /// True if a previous [`SecurityHandler::unlock`] succeeded.
    fn is_unlocked(&self) -> bool;

    /// Decrypt a string that belongs to object `id`/`gen`.
    fn decrypt_string(&self, data: &[u8], id: u32, gen: u16) -> Vec<u8>;

    /// Wrap `upstream` (raw stream bytes of object `id`/`gen`) in a
    /// decrypting stage.
    ///
    /// The decrypter is optional: handing `upstream` back unchanged means
    /// the stream has no decrypting stage and is read as stored. That is
    /// what the default does. `is_metadata` is set for `/Type /Metadata`
    /// streams, which may be stored in clear text (`/EncryptMetadata false`).
    fn create_stream_decrypter(
        &self,
        _is_metadata: bool,
        _id: u32,
        _gen: u16,
        upstream: BoxedDecoder,
    ) -> BoxedDecoder {
        upstream
    }
}

/// Pick a handler for the trailer's `/Encrypt` dictionary.
///
/// Returns `Ok(None)` when no handler is available for the named security
/// filter; the document is then read as stored.
///
/// # Errors
///
/// `/Encrypt` is not a dictionary or has no name `/Filter`.
pub fn create_handler(encrypt: &Object) -> Result<Option<Box<dyn SecurityHandler>>> {
    if encrypt.as_dict().is_none() {
        return Err(Error::InvalidEncryption(format!(
            "/Encrypt is a {}, expected a dictionary",
            encrypt.type_name()
        )));
    }
    let filter = encrypt
        .get("Filter")
        .and_then(|f| f.as_name())
        .ok_or_else(|| Error::InvalidEncryption("missing /Filter name".to_string()))?;

    log::warn!(
        "no security handler available for /{}; strings and streams are read as stored",
        filter
    );
    Ok(None)
}
