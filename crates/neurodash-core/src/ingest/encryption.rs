//! Encrypted workbook detection and decryption.
//!
//! Password-protected Office files are OLE compound documents wrapping the
//! encrypted package, while plain XLSX files are ZIP archives. Decryption
//! itself is delegated to an injected [`Decryptor`]; [`OfficeDecryptor`]
//! handles ECMA-376 standard and agile encryption.

use tracing::info;

use super::{identify_filetype, FileType, IngestError, IngestResult, UploadedFile};

/// Leading bytes of an OLE compound document.
pub const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Leading bytes of a ZIP archive.
pub const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Decrypts password-protected Office files.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, bytes: &[u8], password: &str) -> Result<Vec<u8>, String>;
}

/// Decryptor for password-protected Office workbooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfficeDecryptor;

impl Decryptor for OfficeDecryptor {
    fn decrypt(&self, bytes: &[u8], password: &str) -> Result<Vec<u8>, String> {
        office_crypto::decrypt_from_bytes(bytes.to_vec(), password).map_err(|e| format!("{:?}", e))
    }
}

/// Whether an XLSX payload is an encrypted Office container.
pub fn is_encrypted(bytes: &[u8]) -> bool {
    bytes.starts_with(&OLE_SIGNATURE)
}

/// Encryption status per uploaded file. CSV files are never encrypted.
pub fn check_file_encryption(files: &[UploadedFile]) -> IngestResult<Vec<bool>> {
    files
        .iter()
        .map(|f| {
            Ok(match identify_filetype(&f.name)? {
                FileType::Xlsx => is_encrypted(&f.bytes),
                FileType::Csv => false,
            })
        })
        .collect()
}

/// Decrypt the files flagged as encrypted, passing the others through.
pub fn decrypt_files(
    files: Vec<UploadedFile>,
    encrypted: &[bool],
    password: &str,
    decryptor: Option<&dyn Decryptor>,
) -> IngestResult<Vec<UploadedFile>> {
    files
        .into_iter()
        .zip(encrypted.iter().copied().chain(std::iter::repeat(false)))
        .map(|(file, is_enc)| {
            if !is_enc {
                return Ok(file);
            }
            let decryptor = decryptor.ok_or_else(|| IngestError::Decryption {
                file: file.name.clone(),
                reason: "no decryptor configured".into(),
            })?;
            let bytes = decryptor
                .decrypt(&file.bytes, password)
                .map_err(|reason| IngestError::Decryption {
                    file: file.name.clone(),
                    reason,
                })?;
            if !bytes.starts_with(&ZIP_SIGNATURE) {
                return Err(IngestError::Decryption {
                    file: file.name,
                    reason: "decrypted payload is not a workbook".into(),
                });
            }
            info!(file = %file.name, "decrypted upload");
            Ok(UploadedFile::new(file.name, bytes))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Strips the OLE header when given the right password.
    struct HeaderDecryptor;

    impl Decryptor for HeaderDecryptor {
        fn decrypt(&self, bytes: &[u8], password: &str) -> Result<Vec<u8>, String> {
            if password != "secret" {
                return Err("wrong password".into());
            }
            Ok(bytes[OLE_SIGNATURE.len()..].to_vec())
        }
    }

    fn encrypted_file() -> UploadedFile {
        let mut bytes = OLE_SIGNATURE.to_vec();
        bytes.extend_from_slice(&ZIP_SIGNATURE);
        bytes.extend_from_slice(b"rest");
        UploadedFile::new("locked.xlsx", bytes)
    }

    #[test]
    fn test_check_file_encryption() {
        let files = vec![
            encrypted_file(),
            UploadedFile::new("plain.xlsx", ZIP_SIGNATURE.to_vec()),
            UploadedFile::new("data.csv", OLE_SIGNATURE.to_vec()),
        ];
        assert_eq!(check_file_encryption(&files).unwrap(), vec![true, false, false]);
    }

    #[test]
    fn test_decrypt_files() {
        let files = vec![encrypted_file(), UploadedFile::new("data.csv", b"a\n1\n".to_vec())];
        let out = decrypt_files(files, &[true, false], "secret", Some(&HeaderDecryptor)).unwrap();
        assert!(out[0].bytes.starts_with(&ZIP_SIGNATURE));
        assert_eq!(out[1].bytes, b"a\n1\n");
    }

    #[test]
    fn test_wrong_password_is_decryption_error() {
        let err = decrypt_files(vec![encrypted_file()], &[true], "guess", Some(&HeaderDecryptor))
            .unwrap_err();
        assert!(matches!(err, IngestError::Decryption { .. }));

        let err = decrypt_files(vec![encrypted_file()], &[true], "secret", None).unwrap_err();
        assert!(matches!(err, IngestError::Decryption { .. }));
    }

    #[test]
    fn test_office_decryptor_rejects_unreadable_container() {
        let err = decrypt_files(vec![encrypted_file()], &[true], "guess", Some(&OfficeDecryptor))
            .unwrap_err();
        match err {
            IngestError::Decryption { file, .. } => assert_eq!(file, "locked.xlsx"),
            other => panic!("expected decryption error, got {other:?}"),
        }
    }
}
